//! Run-level configuration: profile, seed, and the override layers applied
//! on top of each payload's default options.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::options::{BenchOptions, Mode, PhaseSpec, ThreadScope, TimeUnit};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
}

impl BenchConfig {
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseOverrides {
    pub iterations: Option<u64>,
    pub time_ms: Option<u64>,
    pub batch_size: Option<u64>,
}

impl PhaseOverrides {
    fn apply(&self, spec: &mut PhaseSpec) {
        if let Some(n) = self.iterations {
            spec.iterations = n;
        }
        // Zero clears the budget: one batch per iteration.
        if let Some(ms) = self.time_ms {
            spec.time = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(b) = self.batch_size {
            spec.batch_size = b;
        }
    }

    fn or(self, lower: PhaseOverrides) -> PhaseOverrides {
        PhaseOverrides {
            iterations: self.iterations.or(lower.iterations),
            time_ms: self.time_ms.or(lower.time_ms),
            batch_size: self.batch_size.or(lower.batch_size),
        }
    }
}

/// Partial options; unset fields keep whatever the lower layer chose.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub mode: Option<Mode>,
    pub time_unit: Option<TimeUnit>,
    pub forks: Option<u32>,
    pub threads_scope: Option<ThreadScope>,
    pub warmup: PhaseOverrides,
    pub measurement: PhaseOverrides,
}

impl OptionOverrides {
    /// Layer `self` over `lower`: fields set here win.
    pub fn over(self, lower: OptionOverrides) -> OptionOverrides {
        OptionOverrides {
            mode: self.mode.or(lower.mode),
            time_unit: self.time_unit.or(lower.time_unit),
            forks: self.forks.or(lower.forks),
            threads_scope: self.threads_scope.or(lower.threads_scope),
            warmup: self.warmup.or(lower.warmup),
            measurement: self.measurement.or(lower.measurement),
        }
    }

    pub fn apply(&self, opts: &BenchOptions) -> BenchOptions {
        let mut out = opts.clone();
        if let Some(m) = self.mode {
            out.mode = m;
        }
        if let Some(u) = self.time_unit {
            out.time_unit = u;
        }
        if let Some(f) = self.forks {
            out.forks = f;
        }
        if let Some(s) = self.threads_scope {
            out.threads_scope = s;
        }
        self.warmup.apply(&mut out.warmup);
        self.measurement.apply(&mut out.measurement);
        out
    }

    /// Apply and validate in one step.
    pub fn resolve(&self, defaults: &BenchOptions) -> Result<BenchOptions, ConfigError> {
        let opts = self.apply(defaults);
        opts.validate()?;
        Ok(opts)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.into_overrides()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilePhase {
    iterations: Option<u64>,
    time_ms: Option<u64>,
    batch_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    mode: Option<String>,
    time_unit: Option<String>,
    forks: Option<u32>,
    threads_scope: Option<String>,
    warmup: Option<FilePhase>,
    measurement: Option<FilePhase>,
}

impl FileConfig {
    fn into_overrides(self) -> Result<OptionOverrides, ConfigError> {
        let phase = |p: Option<FilePhase>| {
            let p = p.unwrap_or_default();
            PhaseOverrides {
                iterations: p.iterations,
                time_ms: p.time_ms,
                batch_size: p.batch_size,
            }
        };
        Ok(OptionOverrides {
            mode: self.mode.as_deref().map(str::parse).transpose()?,
            time_unit: self.time_unit.as_deref().map(str::parse).transpose()?,
            forks: self.forks,
            threads_scope: self.threads_scope.as_deref().map(str::parse).transpose()?,
            warmup: phase(self.warmup),
            measurement: phase(self.measurement),
        })
    }
}
