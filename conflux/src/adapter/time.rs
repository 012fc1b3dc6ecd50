//! Time-bridging adapters: linear interpolation, step interpolation,
//! next-value, and linear integration (sum/mean).
//!
//! All four share a history buffer of `(Timestamp, Value)` pairs in
//! ascending time order, populated eagerly as the upstream pushes.

use std::collections::VecDeque;

use crate::error::CouplingError;
use crate::info::Value;
use crate::time::Timestamp;

/// Which time-bridging transformation a [`TimeAdapter`] performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeKind {
    Linear,
    /// `step` in `[0, 1]`; `step = 0.0` is equivalent to next-value,
    /// `step = 1.0` holds the previous value across the whole interval.
    Step { step: f64 },
    NextValue,
    Integration { mean: bool },
}

/// Stateful core of a time-bridging adapter: the history buffer plus, for
/// integration, the monotone pull cursor.
pub struct TimeAdapter {
    kind: TimeKind,
    history: VecDeque<(Timestamp, Value)>,
    cursor: Option<Timestamp>,
}

impl TimeAdapter {
    pub fn new(kind: TimeKind) -> Self {
        TimeAdapter {
            kind,
            history: VecDeque::new(),
            cursor: None,
        }
    }

    pub fn kind(&self) -> TimeKind {
        self.kind
    }

    /// Integration adapters must not be allowed to fan out: their cursor
    /// would otherwise be advanced twice for the same interval.
    pub fn is_no_branch(&self) -> bool {
        matches!(self.kind, TimeKind::Integration { .. })
    }

    /// Appends a freshly pushed upstream value. Called eagerly from
    /// `source_changed`, since the upstream's own `Output` only remembers
    /// its latest value.
    pub fn record(&mut self, time: Timestamp, value: Value) {
        self.history.push_back((time, value));
    }

    pub fn get(&mut self, time: Timestamp, slot: &str) -> Result<Value, CouplingError> {
        match self.kind {
            TimeKind::Linear => self.interp_at(time, slot),
            TimeKind::Step { step } => self.step_at(time, step, slot),
            TimeKind::NextValue => self.step_at(time, 0.0, slot),
            TimeKind::Integration { mean } => self.integrate(time, mean, slot),
        }
    }

    fn require_history(&self, slot: &str) -> Result<(), CouplingError> {
        if self.history.is_empty() {
            return Err(CouplingError::NoData {
                slot: slot.to_string(),
                detail: "no data has been pushed yet".to_string(),
            });
        }
        Ok(())
    }

    /// Pure linear interpolation against the current history, used both by
    /// the `Linear` variant directly and as a building block for
    /// integration's trapezoid rule.
    fn interp_at(&self, time: Timestamp, slot: &str) -> Result<Value, CouplingError> {
        self.require_history(slot)?;
        let front = self.history.front().unwrap();
        let back = self.history.back().unwrap();

        if time <= front.0 {
            return Ok(front.1.clone());
        }
        if time >= back.0 {
            return Ok(back.1.clone());
        }
        let pairs: Vec<_> = self.history.iter().collect();
        for window in pairs.windows(2) {
            let (t0, v0) = window[0];
            let (t1, v1) = window[1];
            if time >= *t0 && time <= *t1 {
                let frac = (time - *t0).ratio(*t1 - *t0);
                return v0.lerp(v1, frac, slot);
            }
        }
        unreachable!("time lies within [front, back] but no bracketing pair was found")
    }

    /// Step interpolation with breakpoint position `step`; `step = 0.0` is
    /// next-value.
    fn step_at(&self, time: Timestamp, step: f64, slot: &str) -> Result<Value, CouplingError> {
        self.require_history(slot)?;
        let front = self.history.front().unwrap();
        let back = self.history.back().unwrap();

        if time <= front.0 {
            return Ok(front.1.clone());
        }
        if time >= back.0 {
            return Ok(back.1.clone());
        }
        let pairs: Vec<_> = self.history.iter().collect();
        for window in pairs.windows(2) {
            let (t0, v0) = window[0];
            let (t1, v1) = window[1];
            if time >= *t0 && time <= *t1 {
                let frac = (time - *t0).ratio(*t1 - *t0);
                return Ok(if frac < step { v0.clone() } else { v1.clone() });
            }
        }
        unreachable!("time lies within [front, back] but no bracketing pair was found")
    }

    fn integrate(&mut self, time: Timestamp, mean: bool, slot: &str) -> Result<Value, CouplingError> {
        self.require_history(slot)?;
        let cursor = match self.cursor {
            Some(c) => c,
            None => self.history.front().unwrap().0,
        };
        if time < cursor {
            return Err(CouplingError::Time {
                slot: slot.to_string(),
                detail: format!("pull at {time} precedes the integration cursor at {cursor}"),
            });
        }

        let value_at_cursor = self.interp_at(cursor, slot)?;
        if time == cursor {
            self.cursor = Some(time);
            self.prune(time);
            return if mean {
                Ok(value_at_cursor)
            } else {
                Ok(value_at_cursor.scale(0.0))
            };
        }
        let value_at_time = self.interp_at(time, slot)?;

        let mut knots: Vec<(Timestamp, Value)> = vec![(cursor, value_at_cursor)];
        for (t, v) in self.history.iter() {
            if *t > cursor && *t < time {
                knots.push((*t, v.clone()));
            }
        }
        knots.push((time, value_at_time));

        let mut total: Option<Value> = None;
        for window in knots.windows(2) {
            let (t0, v0) = &window[0];
            let (t1, v1) = &window[1];
            let dt = (*t1 - *t0).seconds();
            let segment = v0.add(v1, slot)?.scale(0.5 * dt);
            total = Some(match total {
                Some(acc) => acc.add(&segment, slot)?,
                None => segment,
            });
        }
        let integral = total.unwrap();

        self.cursor = Some(time);
        self.prune(time);

        if mean {
            let span = (time - cursor).seconds();
            Ok(integral.scale(1.0 / span))
        } else {
            Ok(integral)
        }
    }

    /// Drops history strictly older than `cursor`, keeping at most one point
    /// `<= cursor` as the left anchor for future integration.
    fn prune(&mut self, cursor: Timestamp) {
        while self.history.len() > 1 {
            let second_oldest = self.history[1].0;
            if second_oldest <= cursor {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(ta: &mut TimeAdapter, t: f64, v: f64) {
        ta.record(Timestamp::new(t), Value::Scalar(v));
    }

    #[test]
    fn linear_interpolation_matches_single_clock_scenario() {
        let mut ta = TimeAdapter::new(TimeKind::Linear);
        for t in 0..=5 {
            push(&mut ta, t as f64, t as f64);
        }
        for t in 0..=5 {
            let v = ta.get(Timestamp::new(t as f64), "x").unwrap();
            assert_eq!(v, Value::Scalar(t as f64));
        }
    }

    #[test]
    fn linear_interpolation_is_piecewise_linear() {
        let mut ta = TimeAdapter::new(TimeKind::Linear);
        push(&mut ta, 0.0, 0.0);
        push(&mut ta, 2.0, 10.0);
        let v = ta.get(Timestamp::new(1.0), "x").unwrap();
        assert_eq!(v, Value::Scalar(5.0));
    }

    #[test]
    fn linear_interpolation_clamps_at_ends() {
        let mut ta = TimeAdapter::new(TimeKind::Linear);
        push(&mut ta, 1.0, 10.0);
        push(&mut ta, 2.0, 20.0);
        assert_eq!(ta.get(Timestamp::new(0.0), "x").unwrap(), Value::Scalar(10.0));
        assert_eq!(ta.get(Timestamp::new(5.0), "x").unwrap(), Value::Scalar(20.0));
    }

    #[test]
    fn next_value_scenario() {
        let mut ta = TimeAdapter::new(TimeKind::NextValue);
        push(&mut ta, 0.0, 10.0);
        push(&mut ta, 3.0, 20.0);
        push(&mut ta, 6.0, 30.0);
        assert_eq!(ta.get(Timestamp::new(1.0), "x").unwrap(), Value::Scalar(20.0));
        assert_eq!(ta.get(Timestamp::new(3.0), "x").unwrap(), Value::Scalar(20.0));
        assert_eq!(ta.get(Timestamp::new(4.0), "x").unwrap(), Value::Scalar(30.0));
        assert_eq!(ta.get(Timestamp::new(7.0), "x").unwrap(), Value::Scalar(30.0));
    }

    #[test]
    fn step_one_holds_previous() {
        let mut ta = TimeAdapter::new(TimeKind::Step { step: 1.0 });
        push(&mut ta, 0.0, 1.0);
        push(&mut ta, 1.0, 2.0);
        assert_eq!(ta.get(Timestamp::new(0.5), "x").unwrap(), Value::Scalar(1.0));
    }

    #[test]
    fn step_zero_equals_next_value() {
        let mut interp = TimeAdapter::new(TimeKind::Step { step: 0.0 });
        let mut next = TimeAdapter::new(TimeKind::NextValue);
        for t in [0.0, 3.0, 6.0] {
            push(&mut interp, t, t * 10.0);
            push(&mut next, t, t * 10.0);
        }
        for q in [1.0, 3.0, 4.0, 7.0] {
            assert_eq!(
                interp.get(Timestamp::new(q), "x").unwrap(),
                next.get(Timestamp::new(q), "x").unwrap()
            );
        }
    }

    #[test]
    fn integration_rate_mismatch_scenario() {
        let mut ta = TimeAdapter::new(TimeKind::Integration { mean: false });
        for t in 0..=10 {
            push(&mut ta, t as f64, 1.0);
        }
        assert_eq!(ta.get(Timestamp::new(5.0), "x").unwrap(), Value::Scalar(5.0));
        assert_eq!(ta.get(Timestamp::new(10.0), "x").unwrap(), Value::Scalar(5.0));
    }

    #[test]
    fn integration_is_additive() {
        let mut whole = TimeAdapter::new(TimeKind::Integration { mean: false });
        let mut split = TimeAdapter::new(TimeKind::Integration { mean: false });
        for t in 0..=6 {
            push(&mut whole, t as f64, (t as f64).sin().abs() + 1.0);
            push(&mut split, t as f64, (t as f64).sin().abs() + 1.0);
        }
        let whole_total = match whole.get(Timestamp::new(6.0), "x").unwrap() {
            Value::Scalar(v) => v,
            _ => unreachable!(),
        };
        let first = match split.get(Timestamp::new(2.5), "x").unwrap() {
            Value::Scalar(v) => v,
            _ => unreachable!(),
        };
        let second = match split.get(Timestamp::new(6.0), "x").unwrap() {
            Value::Scalar(v) => v,
            _ => unreachable!(),
        };
        assert!((whole_total - (first + second)).abs() < 1e-9);
    }

    #[test]
    fn pull_before_cursor_is_a_time_error() {
        let mut ta = TimeAdapter::new(TimeKind::Integration { mean: true });
        push(&mut ta, 0.0, 1.0);
        push(&mut ta, 5.0, 1.0);
        ta.get(Timestamp::new(5.0), "x").unwrap();
        assert!(matches!(
            ta.get(Timestamp::new(2.0), "x"),
            Err(CouplingError::Time { .. })
        ));
    }

    #[test]
    fn pull_before_any_push_is_no_data() {
        let mut ta = TimeAdapter::new(TimeKind::Linear);
        assert!(matches!(
            ta.get(Timestamp::new(0.0), "x"),
            Err(CouplingError::NoData { .. })
        ));
    }
}
