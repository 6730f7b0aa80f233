use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use idiom_bench::benches::fan_out::{self, FanOutArgs};
use idiom_bench::config::{BenchConfig, OptionOverrides, PhaseOverrides, Profile};
use idiom_bench::error::BoxError;
use idiom_bench::harness::{run_all, run_mode, Benchmark};
use idiom_bench::options::ThreadScope;
use idiom_bench::PolicyVariant;
use idiom_bench::options::{BenchOptions, Mode, PhaseSpec, TimeUnit};
use idiom_bench::report;
use idiom_bench::stats;

fn avgt(warmup: u64, measurement: u64) -> BenchOptions {
    BenchOptions {
        mode: Mode::AverageTime,
        time_unit: TimeUnit::Milliseconds,
        warmup: PhaseSpec::iterations(warmup),
        measurement: PhaseSpec::iterations(measurement),
        ..BenchOptions::default()
    }
}

#[test]
fn failing_benchmark_does_not_sink_the_run() {
    let calls = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&calls);
    let flaky = Benchmark::new("flaky", avgt(0, 5), move || {
        if c.fetch_add(1, Ordering::SeqCst) == 2 {
            return Err::<(), BoxError>("third invocation failed".into());
        }
        Ok(())
    });
    let steady = Benchmark::new("steady", avgt(1, 5), || Ok::<_, BoxError>(7u32));

    let outcomes = run_all(&[flaky, steady]);
    assert_eq!(outcomes.len(), 2);

    let failure = outcomes[0].result.as_ref().unwrap_err();
    assert!(failure.contains("flaky"), "{failure}");
    assert!(failure.contains("measurement"), "{failure}");
    assert!(failure.contains("iteration 2"), "{failure}");
    assert!(failure.contains("third invocation failed"), "{failure}");

    let ok = outcomes[1].result.as_ref().unwrap();
    assert_eq!(ok.summary.count, 5);

    let table = report::format_table(&outcomes);
    assert!(table.contains("FAILED"), "{table}");
    assert!(table.contains("steady"), "{table}");
    assert!(report::summary_line(&outcomes).contains('1'));
}

#[test]
fn warmup_samples_are_discarded() {
    // Slow during warmup, fast afterwards: no measurement sample may carry
    // warmup latency.
    let calls = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&calls);
    let b = Benchmark::new("warming", avgt(3, 6), move || {
        if c.fetch_add(1, Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok::<_, BoxError>(())
    });
    let m = run_mode(&b, Mode::AverageTime).unwrap();
    assert_eq!(m.summary.count, 6);
    assert_eq!(m.warmup_batches, 3);
    assert!(m.summary.max < 40_000_000.0, "{}", m.summary.max);
}

#[test]
fn forks_are_pooled_into_one_summary() {
    let b = Benchmark::new("forked", avgt(1, 3), || Ok::<_, BoxError>(()))
        .with_options(BenchOptions {
            forks: 4,
            ..avgt(1, 3)
        });
    let m = run_mode(&b, Mode::SampleTime).unwrap();
    assert_eq!(m.per_fork, vec![3, 3, 3, 3]);
    assert_eq!(m.summary.count, 12);
    assert_eq!(m.summary.percentiles.len(), stats::PERCENTILES.len());
}

#[test]
fn average_time_of_known_samples() {
    let ms = 1_000_000.0;
    let s = stats::summarize(&[10.0 * ms, 20.0 * ms, 30.0 * ms], true).unwrap();
    assert_eq!(s.count, 3);
    assert!((s.mean - 20.0 * ms).abs() < 1e-6);
    assert_eq!(stats::percentile(&[10.0, 20.0, 30.0], 0.5), 20.0);

    let score = stats::score(&s, Mode::AverageTime, TimeUnit::Milliseconds);
    assert!((score.value - 20.0).abs() < 1e-9);
    assert_eq!(score.unit, "ms/op");
    assert!(score.error.unwrap() > 0.0);
}

#[test]
fn cli_overrides_beat_file_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        b"mode = \"thrpt\"\nforks = 2\n\n[measurement]\niterations = 7\n",
    )
    .unwrap();

    let from_file = OptionOverrides::load(file.path()).unwrap();
    let cli = OptionOverrides {
        forks: Some(3),
        ..OptionOverrides::default()
    };
    let opts = cli.over(from_file).resolve(&avgt(1, 2)).unwrap();
    assert_eq!(opts.mode, Mode::Throughput);
    assert_eq!(opts.forks, 3);
    assert_eq!(opts.measurement.iterations, 7);
    assert_eq!(opts.warmup.iterations, 1);
}

#[test]
fn json_records_carry_failures_and_scores() {
    let ok = Benchmark::new("ok", avgt(0, 2), || Ok::<_, BoxError>(())).with_param("size", 3);
    let bad = Benchmark::new("bad", avgt(0, 2), || Err::<(), BoxError>("nope".into()));
    let outcomes = run_all(&[ok, bad]);
    let records: Vec<_> = outcomes.iter().map(report::to_record).collect();
    let json = serde_json::to_value(&records).unwrap();

    assert_eq!(json[0]["name"], "ok");
    assert_eq!(json[0]["params"]["size"], "3");
    assert!(json[0]["score"].is_number());
    assert!(json[0]["failure"].is_null());
    assert!(json[1]["score"].is_null());
    assert!(json[1]["failure"].as_str().unwrap().contains("nope"));
}

#[test]
fn zero_time_budget_overrides_timed_payload_defaults() {
    let cfg = BenchConfig {
        profile: Profile::Quick,
        seed: 1,
    };
    let overrides = OptionOverrides {
        mode: Some(Mode::AverageTime),
        warmup: PhaseOverrides {
            iterations: Some(0),
            time_ms: Some(0),
            ..PhaseOverrides::default()
        },
        measurement: PhaseOverrides {
            iterations: Some(3),
            time_ms: Some(0),
            ..PhaseOverrides::default()
        },
        ..OptionOverrides::default()
    };
    let opts = overrides
        .resolve(&fan_out::default_options(&cfg))
        .unwrap();
    assert_eq!(opts.measurement.time, None);

    let args = FanOutArgs {
        latency: Duration::from_millis(1),
        ..FanOutArgs::default()
    };
    let benches = fan_out::benchmarks(&cfg, PolicyVariant::FirstSuccess, &args, &opts).unwrap();
    let m = run_mode(&benches[0], Mode::AverageTime).unwrap();
    assert_eq!(m.summary.count, 3);
}

#[test]
fn panicking_shared_setup_does_not_sink_the_run() {
    let shared = BenchOptions {
        threads_scope: ThreadScope::Benchmark,
        ..avgt(0, 2)
    };
    let bad = Benchmark::with_state(
        "bad_setup",
        shared,
        || -> Result<Vec<u8>, BoxError> { panic!("setup exploded") },
        |v: &Vec<u8>| Ok::<_, BoxError>(v.len()),
    );
    let good = Benchmark::new("good", avgt(0, 2), || Ok::<_, BoxError>(()));

    let outcomes = run_all(&[bad, good]);
    assert_eq!(outcomes.len(), 2);
    let failure = outcomes[0].result.as_ref().unwrap_err();
    assert!(failure.contains("setup exploded"), "{failure}");
    assert!(outcomes[1].is_ok());
}
