//! Timed regions.
//!
//! A [`TimerHandle`] borrows its [`SampleRecorder`] for the duration of one
//! batch. Calling [`TimerHandle::stop`] appends a per-operation sample;
//! dropping the handle without stopping (an error or panic inside the batch)
//! records the partial timing as aborted instead, so a sample set only ever
//! contains fully measured batches.

use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SampleRecorder {
    samples: Vec<f64>,
    aborted: Vec<Duration>,
    discard: bool,
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that times batches but keeps nothing (warmup).
    pub fn discarding() -> Self {
        Self {
            discard: true,
            ..Self::default()
        }
    }

    pub fn start(&mut self, batch_size: u64) -> TimerHandle<'_> {
        TimerHandle {
            recorder: self,
            batch_size: batch_size.max(1),
            started: Instant::now(),
            stopped: false,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn aborted(&self) -> &[Duration] {
        &self.aborted
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

pub struct TimerHandle<'a> {
    recorder: &'a mut SampleRecorder,
    batch_size: u64,
    started: Instant,
    stopped: bool,
}

impl TimerHandle<'_> {
    /// Close the timed region and return the whole batch's elapsed time.
    pub fn stop(mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.stopped = true;
        if !self.recorder.discard {
            let per_op = elapsed.as_nanos() as f64 / self.batch_size as f64;
            self.recorder.samples.push(per_op);
        }
        elapsed
    }
}

impl Drop for TimerHandle<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.recorder.aborted.push(self.started.elapsed());
        }
    }
}
