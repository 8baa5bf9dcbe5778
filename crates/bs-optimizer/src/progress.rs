use std::fmt;
use std::time::Duration;

/// Timing snapshot after one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// 1-based index of the completed iteration.
    pub index: usize,
    pub total: usize,
    pub iteration: Duration,
    pub cumulative: Duration,
}

impl ProgressReport {
    pub fn new(index: usize, total: usize, iteration: Duration, cumulative: Duration) -> Self {
        Self {
            index,
            total,
            iteration,
            cumulative,
        }
    }

    /// Average iteration time so far times the iterations left.
    pub fn remaining(&self) -> Duration {
        if self.index == 0 {
            return Duration::ZERO;
        }
        let left = self.total.saturating_sub(self.index) as f64;
        self.cumulative.mul_f64(left / self.index as f64)
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] iteration {} | elapsed {} | remaining {}",
            self.index,
            self.total,
            hms(self.iteration),
            hms(self.cumulative),
            hms(self.remaining())
        )
    }
}

/// `hh:mm:ss`, hours unbounded.
pub fn hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
