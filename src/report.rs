//! Text table and JSON rendering of benchmark outcomes.

use std::fmt::Write as _;

use serde_json::json;

use crate::harness::Outcome;
use crate::schema::{Percentile, Record};
use crate::stats;

/// Benchmark label including its parameters, e.g. `collect.extend(size=1000)`.
pub fn display_name(outcome: &Outcome) -> String {
    if outcome.params.is_empty() {
        return outcome.name.clone();
    }
    let params: Vec<String> = outcome
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("{}({})", outcome.name, params.join(","))
}

fn fmt_score(v: f64) -> String {
    format!("{v:.3}")
}

fn percentile_label(p: f64) -> String {
    match p {
        p if p == 0.0 => "p0.00".to_string(),
        p if p == 1.0 => "p1.00".to_string(),
        p if p == 0.5 || p == 0.9 => format!("p{p:.2}"),
        p => format!("p{p}"),
    }
}

/// Render outcomes as an aligned table.
pub fn format_table(outcomes: &[Outcome]) -> String {
    struct Row {
        name: String,
        mode: &'static str,
        cnt: String,
        score: String,
        error: String,
        unit: String,
    }

    let mut rows = Vec::new();
    let mut failures = Vec::new();

    for o in outcomes {
        let name = display_name(o);
        match &o.result {
            Ok(m) => {
                rows.push(Row {
                    name: name.clone(),
                    mode: o.mode.label(),
                    cnt: m.summary.count.to_string(),
                    score: fmt_score(m.score.value),
                    error: m
                        .score
                        .error
                        .map(|e| format!("± {}", fmt_score(e)))
                        .unwrap_or_else(|| "≈".to_string()),
                    unit: m.score.unit.clone(),
                });
                let scale = o.options.time_unit.as_nanos();
                for (p, v) in &m.summary.percentiles {
                    rows.push(Row {
                        name: format!("{name}:{}", percentile_label(*p)),
                        mode: o.mode.label(),
                        cnt: String::new(),
                        score: fmt_score(v / scale),
                        error: String::new(),
                        unit: m.score.unit.clone(),
                    });
                }
            }
            Err(msg) => {
                rows.push(Row {
                    name: name.clone(),
                    mode: o.mode.label(),
                    cnt: "0".to_string(),
                    score: "FAILED".to_string(),
                    error: String::new(),
                    unit: String::new(),
                });
                failures.push((name, msg.clone()));
            }
        }
    }

    let w_name = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max("Benchmark".len());
    let w_mode = rows.iter().map(|r| r.mode.len()).max().unwrap_or(0).max("Mode".len());
    let w_cnt = rows.iter().map(|r| r.cnt.len()).max().unwrap_or(0).max("Cnt".len());
    let w_score = rows.iter().map(|r| r.score.len()).max().unwrap_or(0).max("Score".len());
    let w_err = rows
        .iter()
        .map(|r| r.error.chars().count())
        .max()
        .unwrap_or(0)
        .max("Error".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<w_name$}  {:>w_mode$}  {:>w_cnt$}  {:>w_score$}  {:>w_err$}  Units",
        "Benchmark", "Mode", "Cnt", "Score", "Error"
    );
    for r in &rows {
        // Pad by chars; `±` and `≈` are multi-byte.
        let err_pad = w_err.saturating_sub(r.error.chars().count());
        let _ = writeln!(
            out,
            "{:<w_name$}  {:>w_mode$}  {:>w_cnt$}  {:>w_score$}  {}{}  {}",
            r.name,
            r.mode,
            r.cnt,
            r.score,
            " ".repeat(err_pad),
            r.error,
            r.unit
        );
    }

    if !failures.is_empty() {
        let _ = writeln!(out);
        for (name, msg) in failures {
            let _ = writeln!(out, "FAILED {name}: {msg}");
        }
    }

    out
}

pub fn to_record(o: &Outcome) -> Record {
    let params = json!(o
        .params
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect::<serde_json::Map<String, serde_json::Value>>());

    let base = Record {
        name: o.name.clone(),
        mode: o.mode.label().to_string(),
        unit: String::new(),
        forks: o.options.forks,
        warmup_iters: o.options.warmup.iterations,
        iters: o.options.measurement.iterations,
        batch_size: o.options.measurement.batch_size,
        samples: 0,
        score: None,
        error: None,
        mean_ns: None,
        percentiles: Vec::new(),
        failure: None,
        params,
    };

    match &o.result {
        Ok(m) => {
            let scale = o.options.time_unit.as_nanos();
            Record {
                unit: m.score.unit.clone(),
                samples: m.summary.count,
                score: Some(m.score.value),
                error: m.score.error,
                mean_ns: Some(m.summary.mean),
                percentiles: m
                    .summary
                    .percentiles
                    .iter()
                    .map(|(p, v)| Percentile { p: *p, score: v / scale })
                    .collect(),
                ..base
            }
        }
        Err(msg) => Record {
            failure: Some(msg.clone()),
            ..base
        },
    }
}

/// One-line digest of a run, for the log.
pub fn summary_line(outcomes: &[Outcome]) -> String {
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    let samples: usize = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .map(|m| m.summary.count)
        .sum();
    format!(
        "{} results ({} failed), {} samples, {:.1}% confidence",
        outcomes.len(),
        failed,
        samples,
        stats::CONFIDENCE * 100.0
    )
}
