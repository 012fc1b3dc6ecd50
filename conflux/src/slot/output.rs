//! Push-based producer slot.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CouplingError;
use crate::graph::{Chainable, TargetRef};
use crate::info::{Info, Value};
use crate::time::Timestamp;

enum OutputKind {
    Push,
    Callback(Box<dyn FnMut(Timestamp) -> Result<Value, CouplingError>>),
}

/// A named output slot owned by one component.
///
/// Holds the last pushed value, the declared [`Info`], and weak references
/// to every downstream target. Pushing never blocks on whether anyone is
/// listening: an output with no targets silently drops the value.
pub struct Output {
    name: String,
    kind: OutputKind,
    info: Option<Info>,
    data: Option<(Timestamp, Value)>,
    targets: Vec<TargetRef>,
    connected_inputs: usize,
    exchanged_count: usize,
}

impl Output {
    pub fn new_shared(name: impl Into<String>, info: Option<Info>) -> Rc<RefCell<Output>> {
        Rc::new(RefCell::new(Output {
            name: name.into(),
            kind: OutputKind::Push,
            info,
            data: None,
            targets: Vec::new(),
            connected_inputs: 0,
            exchanged_count: 0,
        }))
    }

    /// A pull-driven output: `callback(time)` computes the value on demand
    /// instead of the component pushing it.
    pub fn new_callback_shared(
        name: impl Into<String>,
        info: Option<Info>,
        callback: impl FnMut(Timestamp) -> Result<Value, CouplingError> + 'static,
    ) -> Rc<RefCell<Output>> {
        Rc::new(RefCell::new(Output {
            name: name.into(),
            kind: OutputKind::Callback(Box::new(callback)),
            info,
            data: None,
            targets: Vec::new(),
            connected_inputs: 0,
            exchanged_count: 0,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn targets(&self) -> Vec<TargetRef> {
        self.targets.clone()
    }

    pub fn is_no_branch(&self) -> bool {
        false
    }

    fn handshake_complete(&self) -> bool {
        self.exchanged_count >= self.connected_inputs
    }

    /// Declares the output's info. Fields left `None` are filled in during
    /// the handshake.
    pub fn push_info(&mut self, info: Info) {
        log::debug!(target: "conflux::output", "{}: push_info", self.name);
        self.info = Some(info);
    }

    /// Called once per downstream input during link construction.
    pub fn pinged(&mut self) {
        self.connected_inputs += 1;
    }

    /// Answers a downstream `exchange_info` request: fills in any field this
    /// output left unspecified, and requires equality on everything else.
    pub fn get_info(&mut self, requested: Info) -> Result<Info, CouplingError> {
        log::debug!(target: "conflux::output", "{}: get_info", self.name);
        let info = self.info.as_mut().ok_or_else(|| CouplingError::NoData {
            slot: self.name.clone(),
            detail: "no data info available".to_string(),
        })?;

        if !info.compatible_with(&requested) {
            return Err(CouplingError::Metadata {
                slot: self.name.clone(),
                detail: "incoming info is incompatible with the declared output info".to_string(),
            });
        }

        if info.grid.is_none() {
            let grid = requested.grid.clone().ok_or_else(|| CouplingError::Metadata {
                slot: self.name.clone(),
                detail: "grid left unset and downstream did not provide one".to_string(),
            })?;
            info.grid = Some(grid);
        }
        info.merge_missing(&requested);

        self.exchanged_count += 1;
        Ok(info.clone())
    }

    /// Adds a downstream target, returning it so chaining reads left to
    /// right: `output.chain(adapter)?.chain(input)?`.
    pub fn chain(this: &Rc<RefCell<Output>>, other: Chainable) -> Result<Chainable, CouplingError> {
        other.set_source(crate::graph::SourceRef::Output(Rc::downgrade(this)))?;
        this.borrow_mut().targets.push(other.as_target_ref());
        Ok(other)
    }

    /// Pushes a timestamped value and notifies every downstream target.
    ///
    /// No-op if nothing is connected, so a disconnected output never blocks
    /// its owning component. Does not require `time` to be monotonically
    /// increasing across calls; out-of-order pushes are not an error here.
    pub fn push_data(&mut self, value: Value, time: Timestamp) -> Result<(), CouplingError> {
        log::trace!(target: "conflux::output", "{}: push_data at {}", self.name, time);
        if matches!(self.kind, OutputKind::Callback(_)) {
            return Err(CouplingError::Status {
                component: self.name.clone(),
                expected: vec!["push-based output".to_string()],
                found: "callback output".to_string(),
            });
        }
        if !self.has_targets() {
            log::debug!(target: "conflux::output", "{}: no targets, dropping push", self.name);
            return Ok(());
        }
        if !self.handshake_complete() {
            return Err(CouplingError::NoData {
                slot: self.name.clone(),
                detail: "cannot push data before info exchange is complete".to_string(),
            });
        }

        self.data = Some((time, value.clone()));
        self.notify_targets(time, &value)
    }

    /// Hands the pushed value to every target directly instead of letting
    /// them pull it back via `get_data`: this output is still under an
    /// active `borrow_mut` for the duration of the call, so a downstream
    /// adapter re-entering it through `SourceRef::Output` would panic with
    /// a reentrant borrow.
    fn notify_targets(&self, time: Timestamp, value: &Value) -> Result<(), CouplingError> {
        for target in &self.targets {
            target.source_changed(time, value)?;
        }
        Ok(())
    }

    /// Returns the stored value (push variant) or invokes the callback
    /// (callback variant). Takes `&mut self` since the callback variant may
    /// need to mutate state captured by its closure.
    pub fn get_data(&mut self, time: Timestamp) -> Result<Value, CouplingError> {
        if let OutputKind::Callback(callback) = &mut self.kind {
            return callback(time);
        }

        if self.info.is_none() {
            return Err(CouplingError::NoData {
                slot: self.name.clone(),
                detail: "no data info available".to_string(),
            });
        }
        if !self.handshake_complete() {
            return Err(CouplingError::NoData {
                slot: self.name.clone(),
                detail: "data info was not yet exchanged".to_string(),
            });
        }
        match &self.data {
            Some((_, value)) => Ok(value.clone()),
            None => Err(CouplingError::NoData {
                slot: self.name.clone(),
                detail: "no data has been pushed yet".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::GridSpec;

    #[test]
    fn push_without_targets_never_errors() {
        let out = Output::new_shared("flow", Some(Info::new(Some(GridSpec::NoGrid))));
        assert!(out.borrow_mut().push_data(Value::Scalar(1.0), Timestamp::new(0.0)).is_ok());
    }

    #[test]
    fn push_before_data_info_fails() {
        let out = Output::new_shared("flow", None);
        assert!(out
            .borrow_mut()
            .get_data(Timestamp::new(0.0))
            .unwrap_err()
            .is_no_data_kind());
    }

    trait IsNoData {
        fn is_no_data_kind(&self) -> bool;
    }
    impl IsNoData for CouplingError {
        fn is_no_data_kind(&self) -> bool {
            matches!(self, CouplingError::NoData { .. })
        }
    }
}
