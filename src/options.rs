//! Per-benchmark run options: mode, output unit, phases, forks, state scope.

use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::ConfigError;

/// What a benchmark run reports.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Mode {
    /// Operations per output time unit.
    #[value(name = "thrpt")]
    Throughput,
    /// Mean time per operation.
    #[value(name = "avgt")]
    AverageTime,
    /// Every sample kept; mean plus percentile ladder.
    #[value(name = "sample")]
    SampleTime,
    /// One batch per iteration, no time budget.
    #[value(name = "ss")]
    SingleShot,
    /// Every concrete mode, one after another.
    #[default]
    All,
}

impl Mode {
    pub const CONCRETE: [Mode; 4] = [
        Mode::Throughput,
        Mode::AverageTime,
        Mode::SampleTime,
        Mode::SingleShot,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Throughput => "thrpt",
            Mode::AverageTime => "avgt",
            Mode::SampleTime => "sample",
            Mode::SingleShot => "ss",
            Mode::All => "all",
        }
    }

    /// Concrete modes this mode stands for.
    pub fn expand(&self) -> Vec<Mode> {
        match self {
            Mode::All => Mode::CONCRETE.to_vec(),
            m => vec![*m],
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thrpt" | "throughput" => Ok(Mode::Throughput),
            "avgt" | "average" | "average-time" => Ok(Mode::AverageTime),
            "sample" | "sample-time" => Ok(Mode::SampleTime),
            "ss" | "single-shot" => Ok(Mode::SingleShot),
            "all" => Ok(Mode::All),
            _ => Err(ConfigError::invalid(
                "mode",
                format!("unknown mode: {s} (thrpt|avgt|sample|ss|all)"),
            )),
        }
    }
}

/// Unit used for reported scores.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum TimeUnit {
    #[value(name = "ns")]
    Nanoseconds,
    #[value(name = "us")]
    Microseconds,
    #[default]
    #[value(name = "ms")]
    Milliseconds,
    #[value(name = "s")]
    Seconds,
}

impl TimeUnit {
    pub fn as_nanos(&self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1.0,
            TimeUnit::Microseconds => 1e3,
            TimeUnit::Milliseconds => 1e6,
            TimeUnit::Seconds => 1e9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ns" => Ok(TimeUnit::Nanoseconds),
            "us" => Ok(TimeUnit::Microseconds),
            "ms" => Ok(TimeUnit::Milliseconds),
            "s" => Ok(TimeUnit::Seconds),
            _ => Err(ConfigError::invalid(
                "time_unit",
                format!("unknown time unit: {s} (ns|us|ms|s)"),
            )),
        }
    }
}

/// Lifetime of the state an operation closes over.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum ThreadScope {
    /// Built fresh inside every fork.
    #[default]
    Thread,
    /// Built once and shared by every fork.
    Benchmark,
}

impl FromStr for ThreadScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thread" => Ok(ThreadScope::Thread),
            "benchmark" | "shared" => Ok(ThreadScope::Benchmark),
            _ => Err(ConfigError::invalid(
                "threads_scope",
                format!("unknown scope: {s} (thread|benchmark)"),
            )),
        }
    }
}

/// Shape of a warmup or measurement phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseSpec {
    pub iterations: u64,
    /// Wall-clock budget per iteration. `None` means one batch per iteration.
    pub time: Option<Duration>,
    /// Invocations timed together as one sample.
    pub batch_size: u64,
}

impl PhaseSpec {
    pub fn iterations(iterations: u64) -> Self {
        Self {
            iterations,
            time: None,
            batch_size: 1,
        }
    }

    pub fn timed(iterations: u64, time: Duration) -> Self {
        Self {
            iterations,
            time: Some(time),
            batch_size: 1,
        }
    }

    pub fn with_batch(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn validate(&self, phase: &str, allow_zero_iterations: bool) -> Result<(), ConfigError> {
        if self.iterations == 0 && !allow_zero_iterations {
            return Err(ConfigError::invalid(
                format!("{phase}.iterations"),
                "must be > 0",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                format!("{phase}.batch_size"),
                "must be > 0",
            ));
        }
        if self.time == Some(Duration::ZERO) {
            return Err(ConfigError::invalid(
                format!("{phase}.time_ms"),
                "must be > 0 when set",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchOptions {
    pub mode: Mode,
    pub time_unit: TimeUnit,
    pub forks: u32,
    pub warmup: PhaseSpec,
    pub measurement: PhaseSpec,
    pub threads_scope: ThreadScope,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            mode: Mode::AverageTime,
            time_unit: TimeUnit::Milliseconds,
            forks: 1,
            warmup: PhaseSpec::iterations(5),
            measurement: PhaseSpec::iterations(10),
            threads_scope: ThreadScope::Thread,
        }
    }
}

impl BenchOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forks == 0 {
            return Err(ConfigError::invalid("forks", "must be > 0"));
        }
        self.warmup.validate("warmup", true)?;
        self.measurement.validate("measurement", false)?;
        Ok(())
    }
}
