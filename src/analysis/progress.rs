//! Batch progress reporting with a running time estimate.

use std::time::{Duration, Instant};

use log::info;

pub struct Progress {
    description: String,
    total: usize,
    start: Instant,
}

impl Progress {
    pub fn start(description: &str, total: usize) -> Self {
        Self {
            description: description.to_string(),
            total,
            start: Instant::now(),
        }
    }

    /// Log that `done` of the items have finished
    pub fn report(&self, done: usize) {
        info!("{}", self.message(done, self.start.elapsed()));
    }

    fn message(&self, done: usize, elapsed: Duration) -> String {
        let remaining = if done == 0 {
            Duration::ZERO
        } else {
            elapsed.mul_f64(self.total.saturating_sub(done) as f64 / done as f64)
        };
        let percent = if self.total == 0 {
            100.0
        } else {
            done as f64 / self.total as f64 * 100.0
        };

        format!(
            "Finished {} {} out of {}. Done {:.2}%. Time taken {}, estimated remaining {}",
            self.description,
            done,
            self.total,
            percent,
            format_duration(elapsed),
            format_duration(remaining)
        )
    }
}

/// `H:MM:SS` with microseconds when non-zero, e.g. `0:01:05.250000`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let micros = duration.subsec_micros();
    let base = format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if micros == 0 {
        base
    } else {
        format!("{}.{:06}", base, micros)
    }
}
