//! Adapters: dual nodes that behave as an input upstream and an output
//! downstream, without storing the full product stream themselves.
//!
//! Modeled as a single struct holding both the source reference and the
//! target list, rather than two inherited halves — see the bidirectional
//! node design note.

pub mod time;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CouplingError;
use crate::graph::{Chainable, SourceRef, TargetRef};
use crate::info::{Info, Value};
use crate::time::Timestamp;
use crate::units::UnitConverter;
use time::{TimeAdapter, TimeKind};

/// Which reduction a grid-reduction adapter performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceMode {
    Mean,
    Sum,
}

enum AdapterKind {
    /// Passes data through unchanged; useful as a plain chain link or in
    /// tests.
    Identity,
    /// Requires the downstream `exchange_info` to name target units, then
    /// converts every pulled value from the upstream's units to those.
    UnitConversion {
        converter: Rc<dyn UnitConverter>,
        target_units: Option<String>,
        source_units: Option<String>,
    },
    /// Reduces a grid to a scalar, advertising a no-grid info downstream.
    GridReduce(ReduceMode),
    /// Linear interpolation / step interpolation / next-value / linear
    /// integration.
    Time(TimeAdapter),
    /// Arbitrary user transformation, e.g. for ad hoc tests.
    Callback(Box<dyn Fn(&Value, Timestamp) -> Result<Value, CouplingError>>),
}

/// A transformation node sitting between an output and an input.
pub struct Adapter {
    name: String,
    source: Option<SourceRef>,
    targets: Vec<TargetRef>,
    kind: AdapterKind,
    connected_inputs: usize,
    exchanged_count: usize,
}

impl Adapter {
    fn new_shared(name: impl Into<String>, kind: AdapterKind) -> Rc<RefCell<Adapter>> {
        Rc::new(RefCell::new(Adapter {
            name: name.into(),
            source: None,
            targets: Vec::new(),
            kind,
            connected_inputs: 0,
            exchanged_count: 0,
        }))
    }

    pub fn identity(name: impl Into<String>) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Identity)
    }

    pub fn unit_conversion(name: impl Into<String>, converter: Rc<dyn UnitConverter>) -> Rc<RefCell<Adapter>> {
        Self::new_shared(
            name,
            AdapterKind::UnitConversion {
                converter,
                target_units: None,
                source_units: None,
            },
        )
    }

    pub fn grid_reduce(name: impl Into<String>, mode: ReduceMode) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::GridReduce(mode))
    }

    pub fn linear_interpolation(name: impl Into<String>) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Time(TimeAdapter::new(TimeKind::Linear)))
    }

    pub fn step_interpolation(name: impl Into<String>, step: f64) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Time(TimeAdapter::new(TimeKind::Step { step })))
    }

    pub fn next_value(name: impl Into<String>) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Time(TimeAdapter::new(TimeKind::NextValue)))
    }

    pub fn linear_integration(name: impl Into<String>, mean: bool) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Time(TimeAdapter::new(TimeKind::Integration { mean })))
    }

    pub fn callback(
        name: impl Into<String>,
        f: impl Fn(&Value, Timestamp) -> Result<Value, CouplingError> + 'static,
    ) -> Rc<RefCell<Adapter>> {
        Self::new_shared(name, AdapterKind::Callback(Box::new(f)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<SourceRef> {
        self.source.clone()
    }

    pub fn targets(&self) -> Vec<TargetRef> {
        self.targets.clone()
    }

    pub fn is_no_branch(&self) -> bool {
        match &self.kind {
            AdapterKind::Time(ta) => ta.is_no_branch(),
            _ => false,
        }
    }

    // -- upstream (input) side -------------------------------------------------

    pub fn set_source(&mut self, source: SourceRef) -> Result<(), CouplingError> {
        log::debug!(target: "conflux::adapter", "{}: set_source", self.name);
        if self.source.is_some() {
            return Err(CouplingError::Link {
                slot: self.name.clone(),
                detail: "source is already set".to_string(),
            });
        }
        self.source = Some(source);
        Ok(())
    }

    pub fn ping(&self) -> Result<(), CouplingError> {
        self.source
            .as_ref()
            .ok_or_else(|| CouplingError::Link {
                slot: self.name.clone(),
                detail: "cannot ping: adapter has no source".to_string(),
            })?
            .pinged()
    }

    // -- downstream (output) side ----------------------------------------------

    pub fn pinged(&mut self) -> Result<(), CouplingError> {
        self.connected_inputs += 1;
        Ok(())
    }

    pub fn chain(this: &Rc<RefCell<Adapter>>, other: Chainable) -> Result<Chainable, CouplingError> {
        other.set_source(SourceRef::Adapter(Rc::downgrade(this)))?;
        this.borrow_mut().targets.push(other.as_target_ref());
        Ok(other)
    }

    /// Propagates a push notification downstream. Takes the freshly pushed
    /// value directly from the caller rather than pulling it back through
    /// `source.get_data`, since the source (an `Output`) is typically still
    /// under an active `borrow_mut` for the duration of this call. Time
    /// adapters stash the value in their history buffer, since they need
    /// the whole series, not just the latest point; other kinds apply their
    /// own transform so a chain of adapters still forwards a correctly
    /// transformed value to whatever is downstream.
    pub fn source_changed(&mut self, time: Timestamp, value: &Value) -> Result<(), CouplingError> {
        log::trace!(target: "conflux::adapter", "{}: source_changed at {}", self.name, time);
        let forwarded = match &mut self.kind {
            AdapterKind::Time(ta) => {
                ta.record(time, value.clone());
                value.clone()
            }
            AdapterKind::Identity => value.clone(),
            AdapterKind::UnitConversion {
                converter,
                target_units,
                source_units,
            } => match (source_units.as_deref(), target_units.as_deref()) {
                (Some(from), Some(to)) => converter.to_units(value, from, to)?,
                _ => value.clone(),
            },
            AdapterKind::GridReduce(mode) => match mode {
                ReduceMode::Mean => value.reduce_mean(&self.name)?,
                ReduceMode::Sum => value.reduce_sum(&self.name)?,
            },
            AdapterKind::Callback(f) => f(value, time)?,
        };
        for target in &self.targets {
            target.source_changed(time, &forwarded)?;
        }
        Ok(())
    }

    /// Answers a downstream `exchange_info` call by forwarding the request
    /// upstream (possibly transformed) and transforming the response.
    pub fn get_info(&mut self, requested: Info) -> Result<Info, CouplingError> {
        log::debug!(target: "conflux::adapter", "{}: get_info", self.name);
        let source = self.source.clone().ok_or_else(|| CouplingError::Link {
            slot: self.name.clone(),
            detail: "cannot exchange info: adapter has no source".to_string(),
        })?;

        let result = match &mut self.kind {
            AdapterKind::UnitConversion { target_units, .. } => {
                let units = requested.units().ok_or_else(|| CouplingError::Metadata {
                    slot: self.name.clone(),
                    detail: "missing target units".to_string(),
                })?;
                if let Some(existing) = target_units {
                    if existing != units {
                        return Err(CouplingError::Metadata {
                            slot: self.name.clone(),
                            detail: "target units already set, new units differ".to_string(),
                        });
                    }
                } else {
                    *target_units = Some(units.to_string());
                }

                let mut upstream_request = requested.clone();
                upstream_request.meta.remove("units");
                let upstream_info = source.get_info(upstream_request)?;

                if let AdapterKind::UnitConversion { source_units, .. } = &mut self.kind {
                    *source_units = upstream_info.units().map(str::to_string);
                }

                let mut out = upstream_info;
                out.meta.insert(
                    "units".to_string(),
                    crate::info::MetaValue::Str(units.to_string()),
                );
                out
            }
            AdapterKind::GridReduce(_) => {
                let mut upstream_request = requested.clone();
                upstream_request.grid = None;
                let upstream_info = source.get_info(upstream_request)?;
                let mut out = upstream_info;
                out.grid = Some(crate::info::GridSpec::NoGrid);
                out
            }
            AdapterKind::Identity | AdapterKind::Time(_) | AdapterKind::Callback(_) => {
                source.get_info(requested)?
            }
        };

        self.exchanged_count += 1;
        Ok(result)
    }

    /// Pulls from upstream and applies the transformation.
    pub fn get_data(&mut self, time: Timestamp) -> Result<Value, CouplingError> {
        log::trace!(target: "conflux::adapter", "{}: get_data at {}", self.name, time);
        if !matches!(self.kind, AdapterKind::Time(_)) && self.exchanged_count < self.connected_inputs {
            return Err(CouplingError::NoData {
                slot: self.name.clone(),
                detail: "info exchange is not complete for every connected input yet".to_string(),
            });
        }
        match &mut self.kind {
            AdapterKind::Time(ta) => ta.get(time, &self.name),
            AdapterKind::Identity => {
                let source = self.source.clone().ok_or_else(|| no_source(&self.name))?;
                source.get_data(time)
            }
            AdapterKind::UnitConversion {
                converter,
                target_units,
                source_units,
            } => {
                let source = self.source.clone().ok_or_else(|| no_source(&self.name))?;
                let raw = source.get_data(time)?;
                let (Some(target), Some(from)) = (target_units.as_deref(), source_units.as_deref()) else {
                    return Err(CouplingError::Metadata {
                        slot: self.name.clone(),
                        detail: "unit conversion requested before info exchange completed".to_string(),
                    });
                };
                converter.to_units(&raw, from, target)
            }
            AdapterKind::GridReduce(mode) => {
                let source = self.source.clone().ok_or_else(|| no_source(&self.name))?;
                let raw = source.get_data(time)?;
                match mode {
                    ReduceMode::Mean => raw.reduce_mean(&self.name),
                    ReduceMode::Sum => raw.reduce_sum(&self.name),
                }
            }
            AdapterKind::Callback(f) => {
                let source = self.source.clone().ok_or_else(|| no_source(&self.name))?;
                let raw = source.get_data(time)?;
                f(&raw, time)
            }
        }
    }
}

fn no_source(name: &str) -> CouplingError {
    CouplingError::Link {
        slot: name.to_string(),
        detail: "cannot pull: adapter has no source".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Chainable;
    use crate::info::{GridSpec, MetaValue};
    use crate::slot::input::Input;
    use crate::slot::output::Output;
    use crate::units::LinearUnitTable;

    #[test]
    fn unit_adapter_converts_and_rejects_redefinition() {
        let output = Output::new_shared(
            "flow",
            Some(Info::new(Some(GridSpec::NoGrid)).with_meta("units", MetaValue::Str("m".into()))),
        );
        let table: Rc<dyn UnitConverter> = Rc::new(LinearUnitTable::new().register("m", "cm", 100.0));
        let adapter = Adapter::unit_conversion("to_cm", table);
        let input = Input::new_shared(
            "demand",
            Some(Info::new(None).with_meta("units", MetaValue::Str("cm".into()))),
        );

        Output::chain(&output, Chainable::Adapter(adapter.clone())).unwrap();
        Adapter::chain(&adapter, Chainable::Input(input.clone())).unwrap();
        input.borrow().ping().unwrap();

        input.borrow_mut().exchange_info(None).unwrap();
        output.borrow_mut().push_data(Value::Scalar(1.5), Timestamp::new(0.0)).unwrap();

        let pulled = adapter.borrow_mut().get_data(Timestamp::new(0.0)).unwrap();
        assert_eq!(pulled, Value::Scalar(150.0));
    }

    #[test]
    fn no_branch_adapter_rejects_fanout() {
        let integrator = Adapter::linear_integration("cum", false);
        let a = Input::new_shared("a", Some(Info::new(Some(GridSpec::NoGrid))));
        let b = Input::new_shared("b", Some(Info::new(Some(GridSpec::NoGrid))));
        Adapter::chain(&integrator, Chainable::Input(a)).unwrap();
        Adapter::chain(&integrator, Chainable::Input(b)).unwrap();
        assert!(integrator.borrow().is_no_branch());
        assert_eq!(integrator.borrow().targets().len(), 2);
    }
}
