//! Storage for pending tasks and produced items.
//!
//! The runtime only talks to `dyn Scheduler`, so a store shared between
//! processes can replace [`MemoryScheduler`] without touching the dispatch
//! loop. Implementations must tolerate concurrent calls from the dispatch
//! loop, every worker, and the item loop.

mod memory;
mod queue;

use async_trait::async_trait;

use crate::item::Item;
use crate::task::Task;

pub use memory::MemoryScheduler;
pub use queue::TaskQueue;

/// Where an admitted task is placed in the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Behind everything already queued (breadth-first).
    Tail,
    /// Ahead of everything already queued (depth-first).
    Head,
}

impl Placement {
    /// Placement used for a crawl in the given order.
    #[must_use]
    pub fn for_order(depth_first: bool) -> Self {
        if depth_first { Self::Head } else { Self::Tail }
    }
}

/// Task and item store used by the spider runtime.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Queues an admitted task.
    async fn add_task(&self, task: Task, placement: Placement);

    /// Takes the next task, or `None` if nothing is pending right now.
    async fn get_task(&self) -> Option<Task>;

    /// Stores a produced item for the item hooks.
    async fn add_item(&self, item: Item);

    /// Takes the next item, or `None` if nothing is pending right now.
    async fn get_item(&self) -> Option<Item>;

    async fn is_task_queue_empty(&self) -> bool;

    async fn is_item_queue_empty(&self) -> bool;
}
