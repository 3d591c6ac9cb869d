//! Load balancing error types.

use thiserror::Error;

/// Errors raised while building pickers or balancers.
///
/// Selection misses are not errors: a picker that finds no instance
/// returns `None`. These variants cover construction only. The type is
/// `Clone` so a single failed build can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("picker build failed for {key:?}: {reason}")]
    Build { key: String, reason: String },

    #[error("build for {0:?} aborted before completion")]
    BuildAborted(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors found while validating a balancer configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tag selector requires a non-empty tag name")]
    EmptyTag,

    #[error("tag selector on {0:?} configured without a tag function")]
    MissingTagFn(String),
}

pub type BalanceResult<T> = Result<T, BalanceError>;
