//! Adapters turning plain closures into single-point extensions.
//!
//! Created by the `Spider::on_*` registration methods.

use async_trait::async_trait;

use super::{CrawlError, Extension};
use crate::context::Context;
use crate::item::Item;
use crate::net::Request;
use crate::spider::CrawlHandle;
use crate::task::Task;

pub(crate) struct OnStartFn<F>(pub(crate) F);
pub(crate) struct OnNewTaskFn<F>(pub(crate) F);
pub(crate) struct OnRequestFn<F>(pub(crate) F);
pub(crate) struct OnResponseFn<F>(pub(crate) F);
pub(crate) struct OnItemFn<F>(pub(crate) F);
pub(crate) struct OnErrorFn<F>(pub(crate) F);
pub(crate) struct OnFinishFn<F>(pub(crate) F);

#[async_trait]
impl<F> Extension for OnStartFn<F>
where
    F: Fn(&CrawlHandle) + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_start"
    }

    async fn on_start(&self, crawl: &CrawlHandle) {
        (self.0)(crawl);
    }
}

#[async_trait]
impl<F> Extension for OnNewTaskFn<F>
where
    F: Fn(Option<&Context>, Task) -> Option<Task> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_new_task"
    }

    async fn on_new_task(&self, ctx: Option<&Context>, task: Task) -> Option<Task> {
        (self.0)(ctx, task)
    }
}

#[async_trait]
impl<F> Extension for OnRequestFn<F>
where
    F: Fn(&mut Context, Request) -> Option<Request> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_request"
    }

    async fn on_request(&self, ctx: &mut Context, request: Request) -> Option<Request> {
        (self.0)(ctx, request)
    }
}

#[async_trait]
impl<F> Extension for OnResponseFn<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_response"
    }

    async fn on_response(&self, ctx: &mut Context) {
        (self.0)(ctx);
    }
}

#[async_trait]
impl<F> Extension for OnItemFn<F>
where
    F: Fn(Item) -> Option<Item> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_item"
    }

    async fn on_item(&self, item: Item) -> Option<Item> {
        (self.0)(item)
    }
}

#[async_trait]
impl<F> Extension for OnErrorFn<F>
where
    F: Fn(&mut Context, &CrawlError) + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_error"
    }

    async fn on_error(&self, ctx: &mut Context, error: &CrawlError) {
        (self.0)(ctx, error);
    }
}

#[async_trait]
impl<F> Extension for OnFinishFn<F>
where
    F: Fn(&CrawlHandle) + Send + Sync,
{
    fn name(&self) -> &'static str {
        "on_finish"
    }

    async fn on_finish(&self, crawl: &CrawlHandle) {
        (self.0)(crawl);
    }
}
