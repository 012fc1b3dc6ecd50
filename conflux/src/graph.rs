//! Weak back-references tying outputs, inputs and adapters together.
//!
//! Slots own strong (`Rc`) handles to themselves that a component hands out
//! when wiring a composition; the edges of the graph itself — who an input
//! pulls from, who an output pushes to — are weak, so the only owner of a
//! slot is the component that created it (and, transitively, the
//! [`crate::composition::Composition`] that owns the component).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::adapter::Adapter;
use crate::error::CouplingError;
use crate::info::{Info, Value};
use crate::slot::input::Input;
use crate::slot::output::Output;
use crate::time::Timestamp;

/// Something that can sit on the upstream end of a link: an [`Output`] or an
/// [`Adapter`].
#[derive(Clone)]
pub enum SourceRef {
    Output(Weak<RefCell<Output>>),
    Adapter(Weak<RefCell<Adapter>>),
}

/// Something that can sit on the downstream end of a link: an [`Input`] or
/// an [`Adapter`].
#[derive(Clone)]
pub enum TargetRef {
    Input(Weak<RefCell<Input>>),
    Adapter(Weak<RefCell<Adapter>>),
}

fn dangling(slot: &str) -> CouplingError {
    CouplingError::Link {
        slot: slot.to_string(),
        detail: "referenced slot has been dropped".to_string(),
    }
}

impl SourceRef {
    pub fn name(&self) -> String {
        match self {
            SourceRef::Output(o) => o.upgrade().map(|o| o.borrow().name().to_string()),
            SourceRef::Adapter(a) => a.upgrade().map(|a| a.borrow().name().to_string()),
        }
        .unwrap_or_else(|| "<dropped>".to_string())
    }

    pub fn pinged(&self) -> Result<(), CouplingError> {
        match self {
            SourceRef::Output(o) => {
                o.upgrade().ok_or_else(|| dangling("output"))?.borrow_mut().pinged();
            }
            SourceRef::Adapter(a) => {
                a.upgrade().ok_or_else(|| dangling("adapter"))?.borrow_mut().pinged()?;
            }
        }
        Ok(())
    }

    pub fn get_data(&self, time: Timestamp) -> Result<Value, CouplingError> {
        match self {
            SourceRef::Output(o) => o
                .upgrade()
                .ok_or_else(|| dangling("output"))?
                .borrow_mut()
                .get_data(time),
            SourceRef::Adapter(a) => a
                .upgrade()
                .ok_or_else(|| dangling("adapter"))?
                .borrow_mut()
                .get_data(time),
        }
    }

    pub fn get_info(&self, requested: Info) -> Result<Info, CouplingError> {
        match self {
            SourceRef::Output(o) => o
                .upgrade()
                .ok_or_else(|| dangling("output"))?
                .borrow_mut()
                .get_info(requested),
            SourceRef::Adapter(a) => a
                .upgrade()
                .ok_or_else(|| dangling("adapter"))?
                .borrow_mut()
                .get_info(requested),
        }
    }

    /// The next source upstream of this one, if this is itself an adapter
    /// with a source set. Used by graph validation to walk to the root.
    pub fn upstream(&self) -> Result<Option<SourceRef>, CouplingError> {
        match self {
            SourceRef::Output(_) => Ok(None),
            SourceRef::Adapter(a) => {
                let a = a.upgrade().ok_or_else(|| dangling("adapter"))?;
                let source = a.borrow().source();
                Ok(Some(source.ok_or_else(|| CouplingError::Link {
                    slot: a.borrow().name().to_string(),
                    detail: "adapter has no source".to_string(),
                })?))
            }
        }
    }
}

impl TargetRef {
    pub fn name(&self) -> String {
        match self {
            TargetRef::Input(i) => i.upgrade().map(|i| i.borrow().name().to_string()),
            TargetRef::Adapter(a) => a.upgrade().map(|a| a.borrow().name().to_string()),
        }
        .unwrap_or_else(|| "<dropped>".to_string())
    }

    pub fn source_changed(&self, time: Timestamp, value: &Value) -> Result<(), CouplingError> {
        match self {
            TargetRef::Input(i) => i
                .upgrade()
                .ok_or_else(|| dangling("input"))?
                .borrow_mut()
                .source_changed(time, value),
            TargetRef::Adapter(a) => a
                .upgrade()
                .ok_or_else(|| dangling("adapter"))?
                .borrow_mut()
                .source_changed(time, value),
        }
    }

    pub fn set_source(&self, source: SourceRef) -> Result<(), CouplingError> {
        match self {
            TargetRef::Input(i) => i.upgrade().ok_or_else(|| dangling("input"))?.borrow_mut().set_source(source),
            TargetRef::Adapter(a) => a
                .upgrade()
                .ok_or_else(|| dangling("adapter"))?
                .borrow_mut()
                .set_source(source),
        }
    }

    /// If this target is itself an adapter, its own downstream targets and
    /// whether it caps fan-out. `None` for a plain input, which is always a
    /// leaf of the graph.
    pub fn downstream(&self) -> Option<(Vec<TargetRef>, bool)> {
        match self {
            TargetRef::Input(_) => None,
            TargetRef::Adapter(a) => {
                let a = a.upgrade()?;
                let a = a.borrow();
                Some((a.targets(), a.is_no_branch()))
            }
        }
    }
}

/// Either endpoint kind that can be passed to `chain`/`set_source` calls,
/// letting callers write `output.chain(adapter).chain(input)` regardless of
/// which concrete slot type sits where in the chain.
#[derive(Clone)]
pub enum Chainable {
    Input(Rc<RefCell<Input>>),
    Adapter(Rc<RefCell<Adapter>>),
}

impl Chainable {
    pub fn as_target_ref(&self) -> TargetRef {
        match self {
            Chainable::Input(i) => TargetRef::Input(Rc::downgrade(i)),
            Chainable::Adapter(a) => TargetRef::Adapter(Rc::downgrade(a)),
        }
    }

    pub fn set_source(&self, source: SourceRef) -> Result<(), CouplingError> {
        match self {
            Chainable::Input(i) => i.borrow_mut().set_source(source),
            Chainable::Adapter(a) => a.borrow_mut().set_source(source),
        }
    }
}
