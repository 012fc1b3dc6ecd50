//! The scheduler: graph validation, the connect loop, and the run loop.

use crate::component::Component;
use crate::error::CouplingError;
use crate::mpi::Rank;
use crate::status::ComponentStatus;
use crate::time::Timestamp;

/// Top-level holder of components that owns the composition graph and
/// drives the scheduler. Owns its components exclusively, as `Box<dyn
/// Component>`; each component in turn exclusively owns its slots.
pub struct Composition {
    components: Vec<Box<dyn Component>>,
    rank: Rank,
}

impl Composition {
    pub fn new(components: Vec<Box<dyn Component>>) -> Self {
        Composition {
            components,
            rank: Rank::new(0),
        }
    }

    /// A multi-process-aware composition: rank 0 is the leader, any other
    /// rank only enters the worker split described in §4.9.
    pub fn with_rank(components: Vec<Box<dyn Component>>, rank: Rank) -> Self {
        Composition { components, rank }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn initialize(&mut self) -> Result<(), CouplingError> {
        for component in &mut self.components {
            log::debug!(target: "conflux::composition", "initializing {}", component.name());
            component.initialize()?;
        }
        Ok(())
    }

    /// Walks every input upstream to its root source, and every output's
    /// downstream subgraph, checking the two structural invariants: no
    /// unconnected inputs, no fan-out below a no-branch adapter.
    pub fn validate_graph(&self) -> Result<(), CouplingError> {
        for component in &self.components {
            for input in component.inputs().values() {
                let input = input.borrow();
                let mut cursor = input.source().ok_or_else(|| CouplingError::Link {
                    slot: input.name().to_string(),
                    detail: "input has no source".to_string(),
                })?;
                while let Some(next) = cursor.upstream()? {
                    cursor = next;
                }
            }
            for output in component.outputs().values() {
                let output = output.borrow();
                for target in output.targets() {
                    walk_downstream(target, false)?;
                }
            }
        }
        Ok(())
    }

    /// Repeatedly invokes `connect()` on every component not yet `Connected`
    /// until all of them are, or until an entire round makes no progress.
    pub fn connect(&mut self) -> Result<(), CouplingError> {
        self.validate_graph()?;
        loop {
            let mut progressed = false;
            for component in &mut self.components {
                let before = component.status();
                if before == ComponentStatus::Connected {
                    continue;
                }
                match component.connect() {
                    Ok(()) => {}
                    Err(e) if e.is_no_data() => {
                        log::trace!(
                            target: "conflux::composition",
                            "{}: connect retry after no-data",
                            component.name()
                        );
                    }
                    Err(e) => return Err(e),
                }
                if component.status() != before {
                    progressed = true;
                }
            }
            if self.components.iter().all(|c| c.status() == ComponentStatus::Connected) {
                return Ok(());
            }
            if !progressed {
                return Err(CouplingError::ConnectDeadlock);
            }
        }
    }

    fn validate_components(&mut self) -> Result<(), CouplingError> {
        for component in &mut self.components {
            component.validate()?;
        }
        Ok(())
    }

    /// Validates, connects, drives every time-bearing component up to
    /// `t_max` picking the one furthest behind at each step, then finalizes.
    /// Non-leader ranks instead enter the worker split for every
    /// MPI-capable component.
    pub fn run(&mut self, t_max: Timestamp) -> Result<(), CouplingError> {
        if !self.rank.is_leader() {
            for component in &mut self.components {
                if component.is_mpi_capable() {
                    component.run_worker()?;
                }
            }
            return Ok(());
        }

        self.connect()?;
        self.validate_components()?;

        loop {
            let next = self
                .components
                .iter()
                .enumerate()
                .filter(|(_, c)| c.status() != ComponentStatus::Finished)
                .filter_map(|(i, c)| c.time().map(|t| (i, t)))
                .filter(|(_, t)| *t < t_max)
                .min_by(|(ia, ta), (ib, tb)| ta.partial_cmp(tb).unwrap().then(ia.cmp(ib)));

            let Some((index, _)) = next else { break };
            self.components[index].update()?;
        }

        for component in &mut self.components {
            component.finalize()?;
        }
        Ok(())
    }
}

/// Depth-first walk of a downstream subgraph, enforcing that once a
/// no-branch adapter is entered, no node on its subtree may fan out.
fn walk_downstream(target: crate::graph::TargetRef, mut no_branch: bool) -> Result<(), CouplingError> {
    let Some((targets, is_no_branch)) = target.downstream() else {
        return Ok(());
    };
    no_branch = no_branch || is_no_branch;
    if no_branch && targets.len() > 1 {
        return Err(CouplingError::Branching {
            slot: target.name(),
            detail: "a no-branch adapter's downstream subtree must not fan out".to_string(),
        });
    }
    for t in targets {
        walk_downstream(t, no_branch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use crate::graph::Chainable;
    use crate::info::{GridSpec, Info};
    use crate::slot::input::Input;
    use crate::slot::output::Output;

    struct Probe {
        name: String,
        guard: crate::component::LifecycleGuard,
        outputs: BTreeMap<String, Rc<RefCell<Output>>>,
        inputs: BTreeMap<String, Rc<RefCell<Input>>>,
        time: Timestamp,
        step: crate::time::Duration,
        max_updates: u32,
        updates: u32,
    }

    impl Probe {
        fn new(name: &str, step: f64, max_updates: u32) -> Self {
            Probe {
                name: name.to_string(),
                guard: crate::component::LifecycleGuard::new(),
                outputs: BTreeMap::new(),
                inputs: BTreeMap::new(),
                time: Timestamp::new(0.0),
                step: crate::time::Duration::new(step),
                max_updates,
                updates: 0,
            }
        }
    }

    impl Component for Probe {
        fn name(&self) -> &str {
            &self.name
        }
        fn status(&self) -> ComponentStatus {
            self.guard.status()
        }
        fn outputs(&self) -> &BTreeMap<String, Rc<RefCell<Output>>> {
            &self.outputs
        }
        fn inputs(&self) -> &BTreeMap<String, Rc<RefCell<Input>>> {
            &self.inputs
        }
        fn initialize(&mut self) -> Result<(), CouplingError> {
            self.guard.transition(
                &self.name,
                &[ComponentStatus::Created],
                ComponentStatus::Initialized,
            )?;
            let output = Output::new_shared(
                "out",
                Some(Info::new(Some(GridSpec::NoGrid))),
            );
            self.outputs.insert("out".to_string(), output);
            Ok(())
        }
        fn connect(&mut self) -> Result<(), CouplingError> {
            self.guard.transition(
                &self.name,
                &[
                    ComponentStatus::Initialized,
                    ComponentStatus::Connecting,
                    ComponentStatus::ConnectingIdle,
                ],
                ComponentStatus::Connected,
            )
        }
        fn validate(&mut self) -> Result<(), CouplingError> {
            self.guard.transition(
                &self.name,
                &[ComponentStatus::Connected],
                ComponentStatus::Validated,
            )
        }
        fn update(&mut self) -> Result<(), CouplingError> {
            let next = if self.updates + 1 >= self.max_updates {
                ComponentStatus::Finished
            } else {
                ComponentStatus::Updated
            };
            self.guard.transition(
                &self.name,
                &[ComponentStatus::Validated, ComponentStatus::Updated],
                next,
            )?;
            self.time = self.time + self.step;
            self.updates += 1;
            Ok(())
        }
        fn finalize(&mut self) -> Result<(), CouplingError> {
            Ok(())
        }
        fn time(&self) -> Option<Timestamp> {
            Some(self.time)
        }
    }

    #[test]
    fn validate_graph_rejects_unconnected_input() {
        let mut comp_with_input = Probe::new("sink", 1.0, 1);
        comp_with_input.inputs.insert(
            "demand".to_string(),
            Input::new_shared("demand", Some(Info::new(Some(GridSpec::NoGrid)))),
        );
        let composition = Composition::new(vec![Box::new(comp_with_input)]);
        let err = composition.validate_graph().unwrap_err();
        assert!(matches!(err, CouplingError::Link { .. }));
    }

    #[test]
    fn validate_graph_accepts_linked_output_and_input() {
        let output = Output::new_shared("out", Some(Info::new(Some(GridSpec::NoGrid))));
        let input = Input::new_shared("demand", Some(Info::new(Some(GridSpec::NoGrid))));
        Output::chain(&output, Chainable::Input(input.clone())).unwrap();

        let mut producer = Probe::new("producer", 1.0, 1);
        producer.outputs.insert("out".to_string(), output);
        let mut consumer = Probe::new("consumer", 1.0, 1);
        consumer.inputs.insert("demand".to_string(), input);

        let composition = Composition::new(vec![Box::new(producer), Box::new(consumer)]);
        assert!(composition.validate_graph().is_ok());
    }

    #[test]
    fn connect_deadlock_when_a_component_never_reaches_connected() {
        struct StuckComponent {
            guard: crate::component::LifecycleGuard,
            outputs: BTreeMap<String, Rc<RefCell<Output>>>,
            inputs: BTreeMap<String, Rc<RefCell<Input>>>,
        }
        impl Component for StuckComponent {
            fn name(&self) -> &str {
                "stuck"
            }
            fn status(&self) -> ComponentStatus {
                self.guard.status()
            }
            fn outputs(&self) -> &BTreeMap<String, Rc<RefCell<Output>>> {
                &self.outputs
            }
            fn inputs(&self) -> &BTreeMap<String, Rc<RefCell<Input>>> {
                &self.inputs
            }
            fn initialize(&mut self) -> Result<(), CouplingError> {
                self.guard
                    .transition("stuck", &[ComponentStatus::Created], ComponentStatus::Initialized)
            }
            fn connect(&mut self) -> Result<(), CouplingError> {
                Err(CouplingError::NoData {
                    slot: "demand".to_string(),
                    detail: "never produced".to_string(),
                })
            }
            fn validate(&mut self) -> Result<(), CouplingError> {
                Ok(())
            }
            fn update(&mut self) -> Result<(), CouplingError> {
                Ok(())
            }
            fn finalize(&mut self) -> Result<(), CouplingError> {
                Ok(())
            }
        }
        let stuck = StuckComponent {
            guard: crate::component::LifecycleGuard::new(),
            outputs: BTreeMap::new(),
            inputs: BTreeMap::new(),
        };
        let mut composition = Composition::new(vec![Box::new(stuck)]);
        let err = composition.connect().unwrap_err();
        assert!(matches!(err, CouplingError::ConnectDeadlock));
    }
}
