use std::any::Any;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{BenchError, BoxError, Phase};
use crate::options::{BenchOptions, Mode, PhaseSpec, ThreadScope};
use crate::stats::{self, Score, Summary};
use crate::timer::SampleRecorder;

/// Something the harness can invoke and time. Return values are passed
/// through `black_box` so the work is not optimized away.
pub trait Operation: Send + Sync {
    fn invoke(&self) -> Result<(), BoxError>;
}

impl<F, T> Operation for F
where
    F: Fn() -> Result<T, BoxError> + Send + Sync,
{
    fn invoke(&self) -> Result<(), BoxError> {
        black_box(self()?);
        Ok(())
    }
}

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Operation>, BoxError> + Send + Sync>;

/// A named operation plus the options it runs under.
#[derive(Clone)]
pub struct Benchmark {
    name: String,
    options: BenchOptions,
    params: Vec<(String, String)>,
    factory: Factory,
}

impl std::fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Benchmark {
    /// A stateless operation.
    pub fn new<F, T>(name: impl Into<String>, options: BenchOptions, op: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let op: Arc<dyn Operation> = Arc::new(op);
        Self {
            name: name.into(),
            options,
            params: Vec::new(),
            factory: Arc::new(move || Ok::<_, BoxError>(Arc::clone(&op))),
        }
    }

    /// An operation over state built by `init`. Where `init` runs is
    /// decided by the options' [`ThreadScope`].
    pub fn with_state<S, I, F, T>(name: impl Into<String>, options: BenchOptions, init: I, op: F) -> Self
    where
        S: Send + Sync + 'static,
        I: Fn() -> Result<S, BoxError> + Send + Sync + 'static,
        F: Fn(&S) -> Result<T, BoxError> + Send + Sync + 'static,
        T: 'static,
    {
        let op = Arc::new(op);
        let factory: Factory = Arc::new(move || {
            let state = init()?;
            let op = Arc::clone(&op);
            let bound: Arc<dyn Operation> = Arc::new(move || op(&state));
            Ok::<_, BoxError>(bound)
        });
        Self {
            name: name.into(),
            options,
            params: Vec::new(),
            factory,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn with_options(mut self, options: BenchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BenchOptions {
        &self.options
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn build(&self, fork: u32) -> Result<Arc<dyn Operation>, BenchError> {
        (self.factory)().map_err(|source| BenchError::Operation {
            benchmark: self.name.clone(),
            phase: Phase::Setup,
            fork,
            iteration: 0,
            source,
        })
    }
}

/// Pooled result of every fork of one benchmark in one mode.
#[derive(Clone, Debug)]
pub struct Measured {
    pub summary: Summary,
    pub score: Score,
    /// Measurement samples contributed by each fork.
    pub per_fork: Vec<usize>,
    pub warmup_batches: u64,
}

#[derive(Clone, Debug)]
pub struct Outcome {
    pub name: String,
    pub mode: Mode,
    pub options: BenchOptions,
    pub params: Vec<(String, String)>,
    pub result: Result<Measured, String>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

struct ForkRun {
    samples: Vec<f64>,
    warmup_batches: u64,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Time one batch. The timer handle is dropped unstopped if the batch fails.
fn run_batch(op: &dyn Operation, batch_size: u64, rec: &mut SampleRecorder) -> Result<(), BoxError> {
    let timer = rec.start(batch_size);
    for _ in 0..batch_size {
        op.invoke()?;
    }
    timer.stop();
    Ok(())
}

fn run_phase(
    bench: &Benchmark,
    op: &dyn Operation,
    spec: &PhaseSpec,
    mode: Mode,
    phase: Phase,
    fork: u32,
    rec: &mut SampleRecorder,
) -> Result<u64, BenchError> {
    let budget = match mode {
        Mode::SingleShot => None,
        _ => spec.time,
    };

    let mut batches = 0u64;
    for iteration in 0..spec.iterations {
        let deadline = budget.map(|t| Instant::now() + t);
        let before = batches;
        loop {
            if let Err(source) = run_batch(op, spec.batch_size, rec) {
                if let Some(partial) = rec.aborted().last() {
                    warn!(
                        benchmark = %bench.name,
                        %phase,
                        fork,
                        iteration,
                        elapsed = ?partial,
                        "batch aborted"
                    );
                }
                return Err(BenchError::Operation {
                    benchmark: bench.name.clone(),
                    phase,
                    fork,
                    iteration,
                    source,
                });
            }
            batches += 1;
            // Budget is only checked between batches.
            match deadline {
                Some(d) if Instant::now() < d => continue,
                _ => break,
            }
        }
        debug!(
            benchmark = %bench.name,
            %phase,
            fork,
            iteration,
            batches = batches - before,
            "iteration done"
        );
    }
    Ok(batches)
}

fn run_cycle(
    bench: &Benchmark,
    op: &dyn Operation,
    mode: Mode,
    fork: u32,
) -> Result<ForkRun, BenchError> {
    let opts = &bench.options;

    let mut warmup = SampleRecorder::discarding();
    let warmup_batches = run_phase(bench, op, &opts.warmup, mode, Phase::Warmup, fork, &mut warmup)?;

    let mut rec = SampleRecorder::new();
    run_phase(bench, op, &opts.measurement, mode, Phase::Measurement, fork, &mut rec)?;

    Ok(ForkRun {
        samples: rec.into_samples(),
        warmup_batches,
    })
}

/// One full warmup + measurement cycle on a fresh, named thread.
fn run_fork(
    bench: &Benchmark,
    mode: Mode,
    fork: u32,
    shared: Option<Arc<dyn Operation>>,
) -> Result<ForkRun, BenchError> {
    let scoped = crossbeam::scope(|s| {
        let handle = s
            .builder()
            .name(format!("bench-fork-{fork}"))
            .spawn(move |_| {
                let op = match shared {
                    Some(op) => op,
                    None => bench.build(fork)?,
                };
                run_cycle(bench, op.as_ref(), mode, fork)
            });

        match handle {
            Ok(h) => h.join().unwrap_or_else(|payload| {
                Err(BenchError::ForkPanicked {
                    benchmark: bench.name.clone(),
                    fork,
                    message: panic_message(payload),
                })
            }),
            Err(e) => Err(BenchError::ForkPanicked {
                benchmark: bench.name.clone(),
                fork,
                message: format!("failed to spawn fork thread: {e}"),
            }),
        }
    });

    scoped.unwrap_or_else(|payload| {
        Err(BenchError::ForkPanicked {
            benchmark: bench.name.clone(),
            fork,
            message: panic_message(payload),
        })
    })
}

/// Build state shared by all forks on its own thread, so a panicking
/// factory fails this benchmark only.
fn build_shared(bench: &Benchmark) -> Result<Arc<dyn Operation>, BenchError> {
    let panicked = |message: String| BenchError::ForkPanicked {
        benchmark: bench.name.clone(),
        fork: 0,
        message,
    };
    let scoped = crossbeam::scope(|s| {
        match s.builder().name("bench-setup".to_string()).spawn(|_| bench.build(0)) {
            Ok(h) => h
                .join()
                .unwrap_or_else(|payload| Err(panicked(panic_message(payload)))),
            Err(e) => Err(panicked(format!("failed to spawn setup thread: {e}"))),
        }
    });
    scoped.unwrap_or_else(|payload| Err(panicked(panic_message(payload))))
}

/// Run every fork of `bench` in one concrete mode and pool the samples.
pub fn run_mode(bench: &Benchmark, mode: Mode) -> Result<Measured, BenchError> {
    bench.options.validate()?;

    let shared = match bench.options.threads_scope {
        ThreadScope::Benchmark => Some(build_shared(bench)?),
        ThreadScope::Thread => None,
    };

    let mut pooled = Vec::new();
    let mut per_fork = Vec::with_capacity(bench.options.forks as usize);
    let mut warmup_batches = 0u64;

    for fork in 0..bench.options.forks {
        let run = run_fork(bench, mode, fork, shared.clone())?;
        debug!(
            benchmark = %bench.name,
            mode = mode.label(),
            fork,
            samples = run.samples.len(),
            "fork done"
        );
        per_fork.push(run.samples.len());
        warmup_batches += run.warmup_batches;
        pooled.extend(run.samples);
    }

    if pooled.is_empty() {
        return Err(BenchError::NoSamples {
            benchmark: bench.name.clone(),
        });
    }

    let summary = stats::summarize(&pooled, mode == Mode::SampleTime)?;
    let score = stats::score(&summary, mode, bench.options.time_unit);

    Ok(Measured {
        summary,
        score,
        per_fork,
        warmup_batches,
    })
}

/// Run `bench` once per concrete mode its options expand to.
pub fn run_benchmark(bench: &Benchmark) -> Vec<Outcome> {
    bench
        .options
        .mode
        .expand()
        .into_iter()
        .map(|mode| {
            info!(benchmark = %bench.name, mode = mode.label(), "running");
            let result = run_mode(bench, mode).map_err(|e| {
                warn!(benchmark = %bench.name, mode = mode.label(), error = %e, "benchmark failed");
                e.to_string()
            });
            Outcome {
                name: bench.name.clone(),
                mode,
                options: bench.options.clone(),
                params: bench.params.clone(),
                result,
            }
        })
        .collect()
}

/// Run benchmarks one after another. A failure only affects its own outcome.
pub fn run_all(benches: &[Benchmark]) -> Vec<Outcome> {
    benches.iter().flat_map(run_benchmark).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn opts(mode: Mode, warmup: PhaseSpec, measurement: PhaseSpec) -> BenchOptions {
        BenchOptions {
            mode,
            warmup,
            measurement,
            ..BenchOptions::default()
        }
    }

    #[test]
    fn iteration_bound_sample_count() {
        let b = Benchmark::new(
            "noop",
            opts(Mode::AverageTime, PhaseSpec::iterations(3), PhaseSpec::iterations(17)),
            || Ok::<_, BoxError>(1 + 1),
        );
        let m = run_mode(&b, Mode::AverageTime).unwrap();
        assert_eq!(m.summary.count, 17);
        assert_eq!(m.per_fork, vec![17]);
        assert_eq!(m.warmup_batches, 3);
    }

    #[test]
    fn batch_invocations_and_per_op_samples() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let b = Benchmark::new(
            "count",
            opts(
                Mode::SingleShot,
                PhaseSpec::iterations(2).with_batch(5),
                PhaseSpec::iterations(4).with_batch(10),
            ),
            move || Ok::<_, BoxError>(c.fetch_add(1, Ordering::Relaxed)),
        );
        let m = run_mode(&b, Mode::SingleShot).unwrap();
        assert_eq!(m.summary.count, 4);
        assert_eq!(calls.load(Ordering::Relaxed), 2 * 5 + 4 * 10);
    }

    #[test]
    fn duration_bound_runs_until_budget() {
        let b = Benchmark::new(
            "sleepy",
            opts(
                Mode::AverageTime,
                PhaseSpec::iterations(0),
                PhaseSpec::timed(2, Duration::from_millis(30)),
            ),
            || {
                std::thread::sleep(Duration::from_millis(2));
                Ok::<_, BoxError>(())
            },
        );
        let m = run_mode(&b, Mode::AverageTime).unwrap();
        // Each 30ms iteration fits at most 15 batches of >= 2ms.
        assert!(m.summary.count >= 2, "{}", m.summary.count);
        assert!(m.summary.count <= 2 * 15 + 2, "{}", m.summary.count);
        assert!(m.summary.min >= 2_000_000.0);
    }

    #[test]
    fn single_shot_ignores_time_budget() {
        let b = Benchmark::new(
            "ss",
            opts(
                Mode::SingleShot,
                PhaseSpec::iterations(0),
                PhaseSpec::timed(3, Duration::from_millis(50)),
            ),
            || Ok::<_, BoxError>(()),
        );
        let m = run_mode(&b, Mode::SingleShot).unwrap();
        assert_eq!(m.summary.count, 3);
    }

    #[test]
    fn failure_aborts_with_context() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let b = Benchmark::new(
            "flaky",
            opts(Mode::AverageTime, PhaseSpec::iterations(0), PhaseSpec::iterations(10)),
            move || {
                if c.fetch_add(1, Ordering::SeqCst) == 2 {
                    return Err::<(), BoxError>("third call fails".into());
                }
                Ok(())
            },
        );
        let err = run_mode(&b, Mode::AverageTime).unwrap_err();
        match err {
            BenchError::Operation { phase, iteration, .. } => {
                assert_eq!(phase, Phase::Measurement);
                assert_eq!(iteration, 2);
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panic_in_operation_is_contained() {
        let b = Benchmark::new(
            "panicky",
            opts(Mode::AverageTime, PhaseSpec::iterations(0), PhaseSpec::iterations(2)),
            || -> Result<(), BoxError> { panic!("kaboom") },
        );
        let err = run_mode(&b, Mode::AverageTime).unwrap_err();
        assert!(matches!(err, BenchError::ForkPanicked { ref message, .. } if message == "kaboom"));
    }

    #[test]
    fn panic_in_shared_setup_is_contained() {
        let b = Benchmark::with_state(
            "shared_panicky",
            BenchOptions {
                threads_scope: ThreadScope::Benchmark,
                ..opts(Mode::AverageTime, PhaseSpec::iterations(0), PhaseSpec::iterations(2))
            },
            || -> Result<u32, BoxError> { panic!("no state") },
            |v: &u32| Ok::<_, BoxError>(*v),
        );
        let err = run_mode(&b, Mode::AverageTime).unwrap_err();
        assert!(matches!(err, BenchError::ForkPanicked { ref message, .. } if message == "no state"));
    }

    #[test]
    fn forks_pool_samples() {
        let b = Benchmark::new(
            "forked",
            BenchOptions {
                forks: 3,
                ..opts(Mode::AverageTime, PhaseSpec::iterations(1), PhaseSpec::iterations(4))
            },
            || Ok::<_, BoxError>(()),
        );
        let m = run_mode(&b, Mode::AverageTime).unwrap();
        assert_eq!(m.per_fork, vec![4, 4, 4]);
        assert_eq!(m.summary.count, 12);
    }

    #[test]
    fn thread_scope_controls_state_construction() {
        for (scope, expected) in [(ThreadScope::Thread, 3), (ThreadScope::Benchmark, 1)] {
            let inits = Arc::new(AtomicU64::new(0));
            let i = Arc::clone(&inits);
            let b = Benchmark::with_state(
                "stateful",
                BenchOptions {
                    forks: 3,
                    threads_scope: scope,
                    ..opts(Mode::AverageTime, PhaseSpec::iterations(0), PhaseSpec::iterations(1))
                },
                move || {
                    i.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1u8, 2, 3])
                },
                |v: &Vec<u8>| Ok::<_, BoxError>(v.len()),
            );
            run_mode(&b, Mode::AverageTime).unwrap();
            assert_eq!(inits.load(Ordering::SeqCst), expected, "{scope:?}");
        }
    }

    #[test]
    fn all_mode_yields_four_outcomes() {
        let b = Benchmark::new(
            "every",
            opts(Mode::All, PhaseSpec::iterations(0), PhaseSpec::iterations(3)),
            || Ok::<_, BoxError>(()),
        )
        .with_param("size", 10);
        let outcomes = run_benchmark(&b);
        let modes: Vec<Mode> = outcomes.iter().map(|o| o.mode).collect();
        assert_eq!(modes, Mode::CONCRETE.to_vec());
        assert!(outcomes.iter().all(Outcome::is_ok));
        assert_eq!(outcomes[0].params, vec![("size".to_string(), "10".to_string())]);

        let sample = outcomes[2].result.as_ref().unwrap();
        assert_eq!(sample.summary.percentiles.len(), stats::PERCENTILES.len());
        let avgt = outcomes[1].result.as_ref().unwrap();
        assert!(avgt.summary.percentiles.is_empty());
    }

    #[test]
    fn invalid_options_fail_before_running() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let b = Benchmark::new(
            "bad",
            opts(Mode::AverageTime, PhaseSpec::iterations(1), PhaseSpec::iterations(0)),
            move || Ok::<_, BoxError>(c.fetch_add(1, Ordering::SeqCst)),
        );
        assert!(matches!(run_mode(&b, Mode::AverageTime), Err(BenchError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
