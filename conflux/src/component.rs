//! The `Component` trait and the lifecycle precondition guard shared by
//! every implementation of it.

use std::collections::BTreeMap;
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CouplingError;
use crate::slot::input::Input;
use crate::slot::output::Output;
use crate::status::ComponentStatus;
use crate::time::Timestamp;

/// Centralizes the "is this status allowed to call that operation" check
/// every lifecycle method repeats, so each implementor states only which
/// statuses are acceptable instead of re-deriving the match/error boilerplate.
#[derive(Debug, Clone)]
pub struct LifecycleGuard {
    status: ComponentStatus,
}

impl LifecycleGuard {
    pub fn new() -> Self {
        LifecycleGuard {
            status: ComponentStatus::Created,
        }
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    /// Fails with `CouplingError::Status` unless the current status is one
    /// of `allowed`; otherwise advances to `next`.
    pub fn transition(
        &mut self,
        component: &str,
        allowed: &[ComponentStatus],
        next: ComponentStatus,
    ) -> Result<(), CouplingError> {
        if !allowed.contains(&self.status) {
            return Err(CouplingError::Status {
                component: component.to_string(),
                expected: allowed.iter().map(ToString::to_string).collect(),
                found: self.status.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// A model or module exposing inputs, outputs, a status, and a lifecycle.
///
/// Time-bearing-ness and multi-process capability are both expressed as
/// default/overridable methods on this one object-safe trait, rather than a
/// separate marker trait per capability, so the scheduler can hold a
/// homogeneous `Vec<Box<dyn Component>>` and query each one's capabilities
/// through the same vtable.
pub trait Component {
    fn name(&self) -> &str;

    fn status(&self) -> ComponentStatus;

    fn outputs(&self) -> &BTreeMap<String, Rc<RefCell<Output>>>;

    fn inputs(&self) -> &BTreeMap<String, Rc<RefCell<Input>>>;

    /// Precondition `Created`. Creates all input/output slots; postcondition
    /// `Initialized`.
    fn initialize(&mut self) -> Result<(), CouplingError>;

    /// Precondition `Initialized | Connecting | ConnectingIdle`. May be
    /// called repeatedly by the scheduler until it reports `Connected`.
    fn connect(&mut self) -> Result<(), CouplingError>;

    /// Precondition `Connected`. Postcondition `Validated`.
    fn validate(&mut self) -> Result<(), CouplingError>;

    /// Precondition `Validated | Updated`. Advances exactly one internal
    /// step. Postcondition `Updated` or `Finished`.
    fn update(&mut self) -> Result<(), CouplingError>;

    /// Precondition `Updated | Finished`. Postcondition `Finalized`.
    fn finalize(&mut self) -> Result<(), CouplingError>;

    /// The component's current simulated time, if it is time-bearing.
    /// Components with no notion of simulated time (pure sinks driven purely
    /// by pushes, say) leave this at the default.
    fn time(&self) -> Option<Timestamp> {
        None
    }

    /// Whether this component participates in the multi-process worker
    /// split described in the scheduler's rank-aware run phase.
    fn is_mpi_capable(&self) -> bool {
        false
    }

    /// Entered instead of the normal lifecycle on non-leader ranks, for
    /// components that opt into `is_mpi_capable`.
    fn run_worker(&mut self) -> Result<(), CouplingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_out_of_order_transition() {
        let mut guard = LifecycleGuard::new();
        let err = guard
            .transition("demo", &[ComponentStatus::Connected], ComponentStatus::Validated)
            .unwrap_err();
        assert!(matches!(err, CouplingError::Status { .. }));
        assert_eq!(guard.status(), ComponentStatus::Created);
    }

    #[test]
    fn guard_advances_on_allowed_transition() {
        let mut guard = LifecycleGuard::new();
        guard
            .transition("demo", &[ComponentStatus::Created], ComponentStatus::Initialized)
            .unwrap();
        assert_eq!(guard.status(), ComponentStatus::Initialized);
    }
}
