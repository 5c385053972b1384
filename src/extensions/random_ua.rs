//! Random browser User-Agent per request.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::context::Context;
use crate::hooks::Extension;
use crate::net::Request;
use crate::user_agent::BROWSER_USER_AGENTS;

/// Replaces the User-Agent of every outgoing request with a random pick.
#[derive(Debug, Clone)]
pub struct RandomUserAgent {
    agents: Vec<String>,
}

impl Default for RandomUserAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomUserAgent {
    /// Picks from a built-in pool of current desktop browsers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_agents(BROWSER_USER_AGENTS.iter().copied())
    }

    /// Picks from `agents`; an empty pool leaves requests untouched.
    #[must_use]
    pub fn with_agents<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Extension for RandomUserAgent {
    fn name(&self) -> &'static str {
        "random_user_agent"
    }

    async fn on_request(&self, _ctx: &mut Context, mut request: Request) -> Option<Request> {
        let agent = self.agents.choose(&mut rand::thread_rng()).cloned();
        if let Some(agent) = agent {
            request = request.with_user_agent(&agent);
        }
        Some(request)
    }
}
