//! Regex filter on absolute task URLs.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::context::Context;
use crate::hooks::Extension;
use crate::task::Task;

/// Queues only tasks whose absolute URL matches a regex.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    pattern: Regex,
}

impl UrlFilter {
    /// # Errors
    ///
    /// Returns the regex error if `pattern` does not compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::from_regex(Regex::new(pattern)?))
    }

    #[must_use]
    pub fn from_regex(pattern: Regex) -> Self {
        Self { pattern }
    }
}

#[async_trait]
impl Extension for UrlFilter {
    fn name(&self) -> &'static str {
        "url_filter"
    }

    async fn on_new_task(&self, ctx: Option<&Context>, task: Task) -> Option<Task> {
        let matched = task
            .request()
            .resolve(ctx.and_then(Context::base_url))
            .is_some_and(|url| self.pattern.is_match(url.as_str()));
        if !matched {
            debug!(url = %task.request().raw_url(), pattern = %self.pattern, "url filtered");
        }
        matched.then_some(task)
    }
}
