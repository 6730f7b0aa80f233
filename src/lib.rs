use clap::ValueEnum;

pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod options;
pub mod report;
pub mod schema;
pub mod scope;
pub mod stats;
pub mod timer;

/// Collection-building idiom to benchmark.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum CollectVariant {
    /// Run every idiom, sequential and parallel.
    #[default]
    All,
    /// `iter().copied().collect::<Vec<_>>()`.
    Collect,
    /// `Vec::extend` from an iterator.
    Extend,
    /// rayon `par_iter().copied().collect::<Vec<_>>()`.
    ParCollect,
    /// rayon `Vec::par_extend`.
    ParExtend,
}

/// Fan-out join policy to benchmark.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum PolicyVariant {
    /// Both policies.
    #[default]
    All,
    /// First success wins, the rest are cancelled.
    FirstSuccess,
    /// Wait for all; the first failure cancels the rest.
    AllOrFirstFailure,
}
