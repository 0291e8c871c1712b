//! Error types for the tally pools, configuration and harness.

use std::path::PathBuf;

use thiserror::Error;

use crate::pool::PoolKind;

/// Error returned by pool operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A non-blocking acquire asked for more units than are free
    #[error("insufficient resources: requested {requested}, free {free}")]
    Insufficient {
        /// Units requested by the caller
        requested: usize,
        /// Units free when the request was evaluated
        free: usize,
    },

    /// The caller was cancelled while suspended in a blocking acquire
    #[error("acquire cancelled while waiting")]
    Cancelled,

    /// The requested amount is not a positive integer
    #[error("invalid amount {amount}: must be at least 1")]
    InvalidArgument {
        /// The rejected amount
        amount: usize,
    },

    /// A blocking acquire asked for more units than can ever be free
    #[error("requested {requested} exceeds pool capacity {capacity}")]
    ExceedsCapacity {
        /// Units requested by the caller
        requested: usize,
        /// Capacity of the pool
        capacity: usize,
    },

    /// The pool variant does not provide the operation
    #[error("{operation} is not supported by the {pool} pool")]
    Unsupported {
        /// Name of the operation
        operation: &'static str,
        /// Variant that rejected it
        pool: PoolKind,
    },
}

/// Error loading or validating a harness configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Error raised while driving a harness run
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The configuration was rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A worker could not be handed to the thread pool
    #[error("failed to schedule worker: {0}")]
    Schedule(#[from] crate::executor::ThreadPoolError),

    /// The requested pool variant cannot be driven by workers
    #[error("{0} pool does not block and cannot be driven by workers")]
    NotBlocking(PoolKind),
}

/// Result alias for pool operations
pub type Result<T, E = PoolError> = std::result::Result<T, E>;

impl From<crate::sync::Cancelled> for PoolError {
    fn from(_: crate::sync::Cancelled) -> Self {
        Self::Cancelled
    }
}
