//! Per-phase timing capture for cache operations.

use std::fmt;
use std::time::{Duration, Instant};

/// Elapsed time per named operation phase, in insertion order.
///
/// Retrieval records `download` and `extract`; storing records `compress`
/// and `upload`. Timings feed the success log lines only and never
/// influence control flow.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    phases: Vec<(&'static str, Duration)>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` and record its wall-clock duration under `phase`.
    pub async fn measure<T, F>(&mut self, phase: &'static str, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let out = op.await;
        self.phases.push((phase, started.elapsed()));
        out
    }

    pub fn record(&mut self, phase: &'static str, elapsed: Duration) {
        self.phases.push((phase, elapsed));
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.phases.iter().copied()
    }

    /// Milliseconds spent in `phase`, if it was recorded.
    pub fn millis(&self, phase: &str) -> Option<u128> {
        self.phases
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, d)| d.as_millis())
    }
}

impl fmt::Display for PhaseTimings {
    /// Renders `(total:1250ms/download:900ms/extract:350ms)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(total:{}ms", self.total().as_millis())?;
        for (name, elapsed) in &self.phases {
            write!(f, "/{}:{}ms", name, elapsed.as_millis())?;
        }
        write!(f, ")")
    }
}
