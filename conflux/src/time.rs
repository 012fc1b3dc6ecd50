//! A single absolute-time / duration pair, used everywhere instead of the
//! mix of integer ticks and wall-clock datetimes the source used.

use std::ops::{Add, Sub};

/// An absolute instant in simulated time.
///
/// Backed by `f64` seconds. Timestamps are assumed never to be `NaN`; the
/// runtime never constructs one from unchecked external input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp(f64);

/// A span of simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duration(f64);

impl Timestamp {
    pub fn new(seconds: f64) -> Self {
        Timestamp(seconds)
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }
}

impl Duration {
    pub fn new(seconds: f64) -> Self {
        Duration(seconds)
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    pub fn zero() -> Self {
        Duration(0.0)
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Timestamp must never be NaN")
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}", self.0)
    }
}

impl Duration {
    /// Ratio of this duration to another, used by mean integration.
    pub fn ratio(&self, other: Duration) -> f64 {
        self.0 / other.0
    }

    pub fn scale(&self, factor: f64) -> Duration {
        Duration(self.0 * factor)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_arithmetic() {
        let t0 = Timestamp::new(0.0);
        let t1 = t0 + Duration::new(1.5);
        assert!(t0 < t1);
        assert_eq!((t1 - t0).seconds(), 1.5);
    }
}
