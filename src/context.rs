//! Per-task scratchpad.
//!
//! A [`Context`] is created when a task is dispatched and dropped after the
//! tasks and items it accumulated have been harvested. It is owned by exactly
//! one worker.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::item::Item;
use crate::net::{Meta, Request, Response};
use crate::task::{Handler, Task};

/// Mutable state of one dispatched task.
pub struct Context {
    request: Request,
    response: Option<Response>,
    tasks: Vec<Task>,
    items: Vec<Item>,
    meta: Meta,
    handlers: Vec<Handler>,
    aborted: bool,
    held: Vec<Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub(crate) fn new(task: Task) -> Self {
        let (request, handlers, meta) = task.into_parts();
        Self {
            request,
            response: None,
            tasks: Vec::new(),
            items: Vec::new(),
            meta,
            handlers,
            aborted: false,
            held: Vec::new(),
        }
    }

    /// Returns the request as it was (or will be) sent.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn set_request(&mut self, request: Request) {
        self.request = request;
    }

    /// Returns the response; `None` before the fetch and after a failed one.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    pub(crate) fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    /// Returns the task meta.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// Stops the remaining handlers of this task. Other tasks are unaffected.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Queues a follow-up task for admission after this task's handlers finish.
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Shorthand for a follow-up task with a single handler.
    pub fn new_task<F>(&mut self, request: Request, handler: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_task(Task::new(request).with_handler(handler));
    }

    /// Like [`new_task`](Self::new_task) with one task meta entry.
    pub fn new_task_with_meta<F>(
        &mut self,
        request: Request,
        key: impl Into<String>,
        value: impl Into<Value>,
        handler: F,
    ) where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_task(Task::new(request).with_handler(handler).with_meta(key, value));
    }

    /// Re-queues `request` with this task's handlers and meta.
    pub fn resubmit(&mut self, request: Request) {
        let task = Task::from_parts(request, self.handlers.clone(), self.meta.clone());
        self.add_task(task);
    }

    /// Like [`resubmit`](Self::resubmit), admitted only after `delay`.
    pub fn resubmit_after(&mut self, request: Request, delay: Duration) {
        let task = Task::from_parts(request, self.handlers.clone(), self.meta.clone());
        self.add_task(task.after(delay));
    }

    /// Records a produced item.
    pub fn add_item<T: Any + Send + Sync>(&mut self, value: T) {
        self.items.push(Item::new(value));
    }

    /// Records an already wrapped item.
    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Returns the tasks produced so far.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the items produced so far.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Attaches a resource that lives as long as this context.
    pub fn hold<T: Any + Send + Sync>(&mut self, resource: T) {
        self.held.push(Box::new(resource));
    }

    /// Detaches the most recently held resource of type `T`.
    pub fn release<T: Any + Send + Sync>(&mut self) -> Option<T> {
        let index = self.held.iter().rposition(|held| held.is::<T>())?;
        self.held
            .remove(index)
            .downcast::<T>()
            .ok()
            .map(|boxed| *boxed)
    }

    /// URL that relative follow-up requests are resolved against.
    ///
    /// The final URL of the response when there is one, else the request URL.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.response
            .as_ref()
            .map(Response::url)
            .or_else(|| self.request.url())
    }

    pub(crate) fn handlers(&self) -> Vec<Handler> {
        self.handlers.iter().map(Arc::clone).collect()
    }

    pub(crate) fn take_tasks(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.tasks)
    }

    pub(crate) fn take_items(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.items)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("has_response", &self.response.is_some())
            .field("tasks", &self.tasks.len())
            .field("items", &self.items.len())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
