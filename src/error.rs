use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by timed operations and subtasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Rejected configuration, detected before any benchmark runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(option: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Where in a benchmark's lifecycle an operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Warmup,
    Measurement,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Warmup => write!(f, "warmup"),
            Phase::Measurement => write!(f, "measurement"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("{benchmark}: operation failed during {phase} (fork {fork}, iteration {iteration}): {source}")]
    Operation {
        benchmark: String,
        phase: Phase,
        fork: u32,
        iteration: u64,
        #[source]
        source: BoxError,
    },

    #[error("{benchmark}: fork {fork} panicked: {message}")]
    ForkPanicked {
        benchmark: String,
        fork: u32,
        message: String,
    },

    #[error("{benchmark}: no samples were recorded")]
    NoSamples { benchmark: String },

    #[error("statistics unavailable: {0}")]
    Stats(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a fan-out task group.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("task group has no subtasks")]
    Empty,

    #[error("subtask {index} failed: {source}")]
    Failed {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("all {} subtasks failed", .0.len())]
    AllFailed(Vec<BoxError>),

    #[error("a subtask panicked")]
    Panicked,
}

/// Returned by a subtask that observed cancellation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("subtask cancelled")]
pub struct Cancelled;
