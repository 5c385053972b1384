//! In-process scheduler backed by two [`TaskQueue`]s.

use async_trait::async_trait;

use super::queue::TaskQueue;
use super::{Placement, Scheduler};
use crate::item::Item;
use crate::task::Task;

/// Default scheduler: pending tasks and produced items live in memory.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    tasks: TaskQueue<Task>,
    items: TaskQueue<Item>,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of items waiting for the item hooks.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl Scheduler for MemoryScheduler {
    async fn add_task(&self, task: Task, placement: Placement) {
        match placement {
            Placement::Tail => self.tasks.push(task),
            Placement::Head => self.tasks.push_front(task),
        }
    }

    async fn get_task(&self) -> Option<Task> {
        self.tasks.pop()
    }

    async fn add_item(&self, item: Item) {
        self.items.push(item);
    }

    async fn get_item(&self) -> Option<Item> {
        self.items.pop()
    }

    async fn is_task_queue_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    async fn is_item_queue_empty(&self) -> bool {
        self.items.is_empty()
    }
}
