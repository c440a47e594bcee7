//! Timeout detection for execution units and the scan-level retry budget.

use std::time::Duration;

/// The lifecycle phase reported for an execution unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// What the controller observed about a single execution unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitObservation {
    pub phase: UnitPhase,
    /// Set when the scheduler reported the unit as unschedulable.
    pub unschedulable: Option<String>,
    /// Time since the unit was created.
    pub age: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitState {
    Finished,
    Running,
    TimedOut,
    Unschedulable(String),
}

/// A per-unit timeout. A zero timeout never expires.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeout(Duration);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    pub remaining: u32,
    pub max: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeoutDecision {
    /// Run the scan again with the given number of retries left afterwards.
    Retry { remaining: u32 },

    /// Give up. The budget is restored to `reset_to` for the next run.
    Exhausted { reset_to: u32 },
}

// === impl UnitObservation ===

impl UnitObservation {
    /// Classifies the unit.
    ///
    /// Scheduling problems are checked before failures. A failed unit is treated as still running
    /// since its restart policy restarts it in place, so it stays subject to the timeout.
    pub fn state(&self, timeout: Timeout) -> UnitState {
        if self.phase == UnitPhase::Succeeded {
            return UnitState::Finished;
        }

        if let Some(msg) = &self.unschedulable {
            return UnitState::Unschedulable(msg.clone());
        }

        if timeout.is_expired(self.age) {
            return UnitState::TimedOut;
        }

        UnitState::Running
    }
}

// === impl Timeout ===

impl Timeout {
    pub const DISABLED: Self = Self(Duration::ZERO);

    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn is_disabled(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_expired(&self, age: Duration) -> bool {
        !self.is_disabled() && age > self.0
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map(Self::new).unwrap_or(Self::DISABLED)
    }
}

// === impl RetryBudget ===

impl RetryBudget {
    pub fn full(max: u32) -> Self {
        Self { remaining: max, max }
    }

    pub fn on_timeout(&self) -> TimeoutDecision {
        match self.remaining.checked_sub(1) {
            Some(remaining) => TimeoutDecision::Retry { remaining },
            None => TimeoutDecision::Exhausted { reset_to: self.max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MIN: Duration = Duration::from_secs(60);

    fn unit(phase: UnitPhase, age: Duration) -> UnitObservation {
        UnitObservation {
            phase,
            unschedulable: None,
            age,
        }
    }

    #[rstest]
    #[case(UnitPhase::Succeeded, 10 * MIN, UnitState::Finished)]
    #[case(UnitPhase::Running, MIN, UnitState::Running)]
    #[case(UnitPhase::Pending, MIN, UnitState::Running)]
    #[case(UnitPhase::Failed, MIN, UnitState::Running)]
    #[case(UnitPhase::Running, 6 * MIN, UnitState::TimedOut)]
    #[case(UnitPhase::Failed, 6 * MIN, UnitState::TimedOut)]
    fn classifies_units(
        #[case] phase: UnitPhase,
        #[case] age: Duration,
        #[case] expected: UnitState,
    ) {
        let timeout = Timeout::new(5 * MIN);
        assert_eq!(unit(phase, age).state(timeout), expected);
    }

    #[test]
    fn unschedulable_is_reported_before_timeout() {
        let obs = UnitObservation {
            phase: UnitPhase::Pending,
            unschedulable: Some("0/3 nodes are available".to_string()),
            age: 60 * MIN,
        };
        assert_eq!(
            obs.state(Timeout::new(5 * MIN)),
            UnitState::Unschedulable("0/3 nodes are available".to_string())
        );
    }

    #[test]
    fn disabled_timeout_never_expires() {
        let obs = unit(UnitPhase::Running, Duration::from_secs(60 * 60 * 24 * 365));
        assert_eq!(obs.state(Timeout::DISABLED), UnitState::Running);
        assert_eq!(Timeout::from(None), Timeout::DISABLED);
        assert!(Timeout::from(Some(Duration::ZERO)).is_disabled());
    }

    #[test]
    fn budget_allows_exactly_max_retries() {
        let mut budget = RetryBudget::full(2);
        let mut retries = 0;
        loop {
            match budget.on_timeout() {
                TimeoutDecision::Retry { remaining } => {
                    retries += 1;
                    budget.remaining = remaining;
                }
                TimeoutDecision::Exhausted { reset_to } => {
                    assert_eq!(reset_to, 2);
                    break;
                }
            }
        }
        assert_eq!(retries, 2);
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        assert_eq!(
            RetryBudget::full(0).on_timeout(),
            TimeoutDecision::Exhausted { reset_to: 0 }
        );
    }
}
