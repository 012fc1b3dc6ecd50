//! Pull-based consumer slot.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::CouplingError;
use crate::graph::SourceRef;
use crate::info::{Info, Value};
use crate::time::Timestamp;
use crate::units::UnitConverter;

enum InputKind {
    Default,
    Callback(Box<dyn FnMut(Timestamp) -> Result<(), CouplingError>>),
}

/// A named input slot owned by one component.
///
/// Holds exactly one upstream source, the declared/expected [`Info`], and
/// (after a successful handshake) the units the source actually delivers
/// in, so `pull_data` can convert to whatever units the component asked
/// for.
pub struct Input {
    name: String,
    kind: InputKind,
    source: Option<SourceRef>,
    info: Option<Info>,
    exchanged: bool,
    source_units: Option<String>,
    unit_converter: Option<Rc<dyn UnitConverter>>,
}

impl Input {
    pub fn new_shared(name: impl Into<String>, info: Option<Info>) -> Rc<RefCell<Input>> {
        Rc::new(RefCell::new(Input {
            name: name.into(),
            kind: InputKind::Default,
            source: None,
            info,
            exchanged: false,
            source_units: None,
            unit_converter: None,
        }))
    }

    /// An input that invokes `callback(time)` synchronously whenever its
    /// source pushes new data, instead of waiting to be pulled.
    pub fn new_callback_shared(
        name: impl Into<String>,
        info: Option<Info>,
        callback: impl FnMut(Timestamp) -> Result<(), CouplingError> + 'static,
    ) -> Rc<RefCell<Input>> {
        Rc::new(RefCell::new(Input {
            name: name.into(),
            kind: InputKind::Callback(Box::new(callback)),
            source: None,
            info,
            exchanged: false,
            source_units: None,
            unit_converter: None,
        }))
    }

    pub fn with_unit_converter(mut self, converter: Rc<dyn UnitConverter>) -> Self {
        self.unit_converter = Some(converter);
        self
    }

    pub fn set_unit_converter(&mut self, converter: Rc<dyn UnitConverter>) {
        self.unit_converter = Some(converter);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<SourceRef> {
        self.source.clone()
    }

    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    /// Whether `exchange_info` has already completed successfully.
    pub fn exchanged_info(&self) -> bool {
        self.exchanged
    }

    pub fn set_source(&mut self, source: SourceRef) -> Result<(), CouplingError> {
        log::debug!(target: "conflux::input", "{}: set_source", self.name);
        if self.source.is_some() {
            return Err(CouplingError::Link {
                slot: self.name.clone(),
                detail: "source is already set (an input accepts exactly one source)".to_string(),
            });
        }
        self.source = Some(source);
        Ok(())
    }

    /// Informs the upstream source that one more consumer now exists. Must
    /// be called after wiring and before the connect phase.
    pub fn ping(&self) -> Result<(), CouplingError> {
        self.source
            .as_ref()
            .ok_or_else(|| CouplingError::Link {
                slot: self.name.clone(),
                detail: "cannot ping: input has no source".to_string(),
            })?
            .pinged()
    }

    /// Initiates or is handed the metadata handshake. `requested` overrides
    /// the input's own locally-configured info, if any; exactly one of the
    /// two must be present.
    pub fn exchange_info(&mut self, requested: Option<Info>) -> Result<Info, CouplingError> {
        log::debug!(target: "conflux::input", "{}: exchange_info", self.name);
        if self.exchanged {
            return Err(CouplingError::Metadata {
                slot: self.name.clone(),
                detail: "input info was already exchanged".to_string(),
            });
        }

        let effective = match (self.info.clone(), requested) {
            (Some(_), Some(_)) => {
                return Err(CouplingError::Metadata {
                    slot: self.name.clone(),
                    detail: "an internal info was already provided; do not also pass one".to_string(),
                })
            }
            (None, None) => {
                return Err(CouplingError::Metadata {
                    slot: self.name.clone(),
                    detail: "no metadata provided".to_string(),
                })
            }
            (Some(info), None) => info,
            (None, Some(info)) => info,
        };

        let source = self.source.clone().ok_or_else(|| CouplingError::Link {
            slot: self.name.clone(),
            detail: "cannot exchange info: input has no source".to_string(),
        })?;

        let upstream_info = source.get_info(effective.clone())?;
        if !effective.compatible_with(&upstream_info) {
            return Err(CouplingError::Metadata {
                slot: self.name.clone(),
                detail: "incoming info does not satisfy the local expectations".to_string(),
            });
        }

        self.source_units = upstream_info.units().map(str::to_string);

        let mut merged = effective;
        merged.merge_missing(&upstream_info);
        self.info = Some(merged.clone());
        self.exchanged = true;
        Ok(merged)
    }

    /// Informs the input that new data is available upstream. Default
    /// implementation is a no-op; the callback variant invokes the user
    /// callback synchronously. The freshly pushed value is passed down the
    /// whole notification chain so time-bridging adapters upstream of this
    /// input never need to pull back through an already-borrowed source;
    /// this input has no use for it since its callback is time-only.
    pub fn source_changed(&mut self, time: Timestamp, _value: &Value) -> Result<(), CouplingError> {
        log::trace!(target: "conflux::input", "{}: source_changed at {}", self.name, time);
        if let InputKind::Callback(callback) = &mut self.kind {
            callback(time)?;
        }
        Ok(())
    }

    /// Pulls the current value from the source, converting units if the
    /// declared info names a target unit that differs from what the source
    /// delivers.
    pub fn pull_data(&self, time: Timestamp) -> Result<Value, CouplingError> {
        log::trace!(target: "conflux::input", "{}: pull_data at {}", self.name, time);
        let source = self.source.as_ref().ok_or_else(|| CouplingError::Link {
            slot: self.name.clone(),
            detail: "cannot pull: input has no source".to_string(),
        })?;
        let raw = source.get_data(time)?;

        let target_units = self.info.as_ref().and_then(|i| i.units());
        if let (Some(target), Some(source_units)) = (target_units, &self.source_units) {
            if source_units != target {
                let converter = self.unit_converter.as_ref().ok_or_else(|| CouplingError::Metadata {
                    slot: self.name.clone(),
                    detail: format!("no unit converter configured to convert '{source_units}' to '{target}'"),
                })?;
                return converter.to_units(&raw, source_units, target);
            }
        }
        Ok(raw)
    }
}
