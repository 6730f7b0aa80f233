use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use idiom_bench::benches::{self, fan_out::FanOutArgs};
use idiom_bench::config::{BenchConfig, OptionOverrides, PhaseOverrides, Profile};
use idiom_bench::harness::{self, Benchmark};
use idiom_bench::options::{BenchOptions, Mode, ThreadScope, TimeUnit};
use idiom_bench::report;
use idiom_bench::schema::{IdiomBenchReport, RunMeta};
use idiom_bench::{CollectVariant, PolicyVariant};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collection building: collect vs extend, sequential and parallel.
    Collect {
        #[arg(long, value_enum, default_value_t = CollectVariant::All)]
        idiom: CollectVariant,

        /// Data set sizes; one benchmark per idiom per size.
        #[arg(long, value_delimiter = ',', default_values_t = benches::collect::DEFAULT_SIZES)]
        sizes: Vec<usize>,
    },

    /// Fan-out join policies over short-lived concurrent subtasks.
    FanOut {
        #[arg(long, value_enum, default_value_t = PolicyVariant::All)]
        policy: PolicyVariant,

        #[arg(long, default_value_t = 3)]
        subtasks: usize,

        /// Simulated latency of each subtask.
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,

        /// Extra uniform random latency in `0..=jitter_ms`.
        #[arg(long, default_value_t = 0)]
        jitter_ms: u64,
    },

    /// Run both benchmark families with their defaults.
    Suite,

    /// Print the benchmarks that would run, with resolved options.
    List,
}

/// Overrides for every benchmark's options. Unset flags keep the payload's
/// defaults (or the config file's value).
#[derive(ClapArgs, Debug, Default)]
struct OptionArgs {
    #[arg(long, value_enum, global = true)]
    mode: Option<Mode>,

    #[arg(long, value_enum, global = true)]
    time_unit: Option<TimeUnit>,

    #[arg(long, global = true)]
    forks: Option<u32>,

    #[arg(long, value_enum, global = true)]
    threads_scope: Option<ThreadScope>,

    #[arg(long, global = true)]
    warmup_iterations: Option<u64>,

    /// Wall-clock budget per warmup iteration; 0 runs one batch per iteration.
    #[arg(long, global = true)]
    warmup_time_ms: Option<u64>,

    #[arg(long, global = true)]
    warmup_batch: Option<u64>,

    #[arg(long, global = true)]
    iterations: Option<u64>,

    /// Wall-clock budget per measurement iteration; 0 runs one batch per
    /// iteration.
    #[arg(long, global = true)]
    time_ms: Option<u64>,

    #[arg(long, global = true)]
    batch: Option<u64>,
}

impl From<&OptionArgs> for OptionOverrides {
    fn from(a: &OptionArgs) -> Self {
        OptionOverrides {
            mode: a.mode,
            time_unit: a.time_unit,
            forks: a.forks,
            threads_scope: a.threads_scope,
            warmup: PhaseOverrides {
                iterations: a.warmup_iterations,
                time_ms: a.warmup_time_ms,
                batch_size: a.warmup_batch,
            },
            measurement: PhaseOverrides {
                iterations: a.iterations,
                time_ms: a.time_ms,
                batch_size: a.batch,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "idiom-bench")]
#[command(about = "Microbenchmarks for collection-building idioms and fan-out join policies")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    /// TOML file with option overrides; CLI flags win over it.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    /// Where to write the report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(flatten)]
    options: OptionArgs,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn resolve(overrides: &OptionOverrides, defaults: &BenchOptions) -> anyhow::Result<BenchOptions> {
    overrides
        .resolve(defaults)
        .context("invalid benchmark configuration")
}

fn collect_benches(
    cfg: &BenchConfig,
    overrides: &OptionOverrides,
    idiom: CollectVariant,
    sizes: &[usize],
) -> anyhow::Result<Vec<Benchmark>> {
    let opts = resolve(overrides, &benches::collect::default_options(cfg))?;
    Ok(benches::collect::benchmarks(cfg, idiom, sizes, &opts))
}

fn fan_out_benches(
    cfg: &BenchConfig,
    overrides: &OptionOverrides,
    policy: PolicyVariant,
    args: &FanOutArgs,
) -> anyhow::Result<Vec<Benchmark>> {
    let opts = resolve(overrides, &benches::fan_out::default_options(cfg))?;
    benches::fan_out::benchmarks(cfg, policy, args, &opts).context("invalid fan-out configuration")
}

fn describe(b: &Benchmark) -> String {
    let o = b.options();
    let phase = |p: &idiom_bench::options::PhaseSpec| match p.time {
        Some(t) => format!("{}x{}ms batch {}", p.iterations, t.as_millis(), p.batch_size),
        None => format!("{}x batch {}", p.iterations, p.batch_size),
    };
    let params: Vec<String> = b.params().iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(
        "{} [{}] mode={} unit={} forks={} scope={:?} warmup={} measurement={}",
        b.name(),
        params.join(","),
        o.mode.label(),
        o.time_unit.label(),
        o.forks,
        o.threads_scope,
        phase(&o.warmup),
        phase(&o.measurement),
    )
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let cfg = BenchConfig {
        profile: args.profile.into(),
        seed: args.seed,
    };

    let file_overrides = match &args.config {
        Some(path) => OptionOverrides::load(path).context("invalid benchmark configuration")?,
        None => OptionOverrides::default(),
    };
    let overrides = OptionOverrides::from(&args.options).over(file_overrides);

    // Everything is resolved and validated before the first benchmark runs.
    let to_run = match &args.cmd {
        Command::Collect { idiom, sizes } => collect_benches(&cfg, &overrides, *idiom, sizes)?,
        Command::FanOut {
            policy,
            subtasks,
            latency_ms,
            jitter_ms,
        } => {
            let fan = FanOutArgs {
                subtasks: *subtasks,
                latency: Duration::from_millis(*latency_ms),
                jitter: Duration::from_millis(*jitter_ms),
            };
            fan_out_benches(&cfg, &overrides, *policy, &fan)?
        }
        Command::Suite | Command::List => {
            let mut all = collect_benches(
                &cfg,
                &overrides,
                CollectVariant::All,
                &benches::collect::DEFAULT_SIZES,
            )?;
            all.extend(fan_out_benches(
                &cfg,
                &overrides,
                PolicyVariant::All,
                &FanOutArgs::default(),
            )?);
            all
        }
    };

    if matches!(args.cmd, Command::List) {
        for b in &to_run {
            println!("{}", describe(b));
        }
        return Ok(());
    }

    tracing::info!(
        benchmarks = to_run.len(),
        profile = cfg.profile.as_str(),
        seed = cfg.seed,
        "starting run"
    );
    let outcomes = harness::run_all(&to_run);
    tracing::info!("{}", report::summary_line(&outcomes));

    let text = match args.format {
        Format::Text => report::format_table(&outcomes),
        Format::Json => {
            let doc = IdiomBenchReport {
                run: RunMeta {
                    schema_version: 1,
                    bench_version: env!("CARGO_PKG_VERSION").to_string(),
                    profile: cfg.profile.as_str().to_string(),
                    seed: cfg.seed,
                    timestamp_utc: now_utc_rfc3339(),
                    git_sha: git_sha_short(),
                },
                records: outcomes.iter().map(report::to_record).collect(),
            };
            serde_json::to_string_pretty(&doc)?
        }
    };

    if let Some(out) = &args.out {
        fs::write(out, &text).with_context(|| format!("writing report to {}", out.display()))?;
    } else {
        println!("{text}");
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{failed} benchmark run(s) failed");
    }
    Ok(())
}
