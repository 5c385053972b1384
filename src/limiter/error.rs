//! Error types for limiter configuration.

use thiserror::Error;

/// Errors raised while compiling limiter rules.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// The host pattern does not compile.
    #[error("invalid host pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A rule has neither a glob nor a regex.
    #[error("limit rule #{index} has no glob or regex pattern")]
    MissingPattern {
        /// Position of the rule in the configuration.
        index: usize,
    },

    /// A rule sets more than one of delay, rate and parallelism.
    #[error("limit rule '{pattern}' sets more than one throttling mode")]
    ConflictingModes {
        /// The rule's pattern as written.
        pattern: String,
    },
}

impl LimiterError {
    /// Creates an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}
