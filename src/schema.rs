use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub seed: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentile {
    pub p: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub mode: String,
    pub unit: String,

    pub forks: u32,
    pub warmup_iters: u64,
    pub iters: u64,
    pub batch_size: u64,

    pub samples: usize,
    pub score: Option<f64>,
    pub error: Option<f64>,
    pub mean_ns: Option<f64>,
    pub percentiles: Vec<Percentile>,

    pub failure: Option<String>,

    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdiomBenchReport {
    pub run: RunMeta,
    pub records: Vec<Record>,
}
