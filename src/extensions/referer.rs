//! Referer propagation.

use async_trait::async_trait;
use reqwest::header::REFERER;

use crate::context::Context;
use crate::hooks::Extension;
use crate::task::Task;

/// Sets `Referer` on follow-up tasks to the URL of the request that produced
/// them. Seeds and tasks that already carry a `Referer` are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Referer;

#[async_trait]
impl Extension for Referer {
    fn name(&self) -> &'static str {
        "referer"
    }

    async fn on_new_task(&self, ctx: Option<&Context>, mut task: Task) -> Option<Task> {
        if let Some(parent) = ctx
            && !task.request().headers().contains_key(REFERER)
        {
            let referer = parent.request().raw_url().to_string();
            task.request_mut().set_header(REFERER.as_str(), &referer);
        }
        Some(task)
    }
}
