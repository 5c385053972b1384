//! Allow/deny lists of exact hosts.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::context::Context;
use crate::hooks::Extension;
use crate::net::host_with_port;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Allow,
    Deny,
}

/// Vetoes tasks by host before they are queued.
///
/// Entries match either `host` or `host:port`, case insensitively. Relative
/// task URLs are resolved against the parent response first.
#[derive(Debug, Clone)]
pub struct HostFilter {
    hosts: HashSet<String>,
    mode: Mode,
}

impl HostFilter {
    /// Only tasks for these hosts are queued.
    #[must_use]
    pub fn allow<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_mode(hosts, Mode::Allow)
    }

    /// Tasks for these hosts are dropped.
    #[must_use]
    pub fn deny<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_mode(hosts, Mode::Deny)
    }

    fn with_mode<I, S>(hosts: I, mode: Mode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_lowercase())
                .collect(),
            mode,
        }
    }

    fn listed(&self, url: &Url) -> bool {
        let bare = url.host_str().map(str::to_lowercase);
        let with_port = host_with_port(url);
        [bare, with_port]
            .into_iter()
            .flatten()
            .any(|host| self.hosts.contains(&host))
    }

    /// Returns whether a task for `url` may be queued.
    #[must_use]
    pub fn permits(&self, url: &Url) -> bool {
        match self.mode {
            Mode::Allow => self.listed(url),
            Mode::Deny => !self.listed(url),
        }
    }
}

#[async_trait]
impl Extension for HostFilter {
    fn name(&self) -> &'static str {
        "host_filter"
    }

    async fn on_new_task(&self, ctx: Option<&Context>, task: Task) -> Option<Task> {
        let permitted = match task.request().resolve(ctx.and_then(Context::base_url)) {
            Some(url) => self.permits(&url),
            // An allow list cannot vouch for a URL it cannot read.
            None => self.mode == Mode::Deny,
        };
        if !permitted {
            debug!(url = %task.request().raw_url(), "host filtered");
        }
        permitted.then_some(task)
    }
}
