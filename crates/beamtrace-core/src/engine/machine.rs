use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use tracing::{debug, trace};

use crate::core::config::Config;
use crate::engine::element::{Element, ElementContext, ElementDesc};
use crate::engine::error::EngineError;
use crate::engine::registry::{self, SimTypeInfo};
use crate::engine::state::BunchState;

/// An ordered line of lattice elements belonging to one simulation family,
/// together with the machinery to drive a bunch state through them.
///
/// A machine is assembled once from a configuration and is immutable during
/// propagation (elements maintain interior caches, but those are their own
/// concern). It keeps a private snapshot of its family's registered builders,
/// so the process-wide registry can change without affecting it.
pub struct Machine {
    sim_type: String,
    info: SimTypeInfo,
    elements: Vec<Box<dyn Element>>,
    lookup: HashMap<String, usize>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("sim_type", &self.sim_type)
            .field(
                "elements",
                &self.elements.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Assembles a machine from a configuration of the shape
    /// `{sim_type: string, elements: [element config, ...]}`.
    ///
    /// Each element config must carry a `type` (the element-type name resolved
    /// through the family's builders) and a unique `name`. Elements are built
    /// in order and assigned sequential indices; afterwards every element's
    /// [`peek`](Element::peek) hook runs once, in order, with a description of
    /// the finished line.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownSimType`] for an unregistered `sim_type`,
    /// [`EngineError::UnknownElementType`] for an unregistered element `type`,
    /// [`EngineError::DuplicateElementName`] when two elements share a name,
    /// and configuration errors for missing or mistyped keys.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        crate::moment::register();

        let sim_type: String = config.get("sim_type")?;
        let info = registry::lookup(&sim_type).ok_or_else(|| EngineError::UnknownSimType {
            sim_type: sim_type.clone(),
        })?;

        let element_configs: Vec<Config> = config.get("elements")?;
        let mut elements: Vec<Box<dyn Element>> = Vec::with_capacity(element_configs.len());
        let mut lookup = HashMap::new();

        for (index, element_config) in element_configs.into_iter().enumerate() {
            let element_type: String = element_config.get("type")?;
            let name: String = element_config.get("name")?;

            let builder = info.elements.get(&element_type).ok_or_else(|| {
                EngineError::UnknownElementType {
                    sim_type: sim_type.clone(),
                    element_type: element_type.clone(),
                }
            })?;

            match lookup.entry(name.clone()) {
                Entry::Occupied(_) => {
                    return Err(EngineError::DuplicateElementName { name, index });
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }

            elements.push(builder(ElementContext {
                name,
                index,
                config: element_config,
            })?);
        }

        let line: Vec<ElementDesc> = elements
            .iter()
            .map(|element| ElementDesc {
                name: element.name().to_string(),
                index: element.index(),
                type_name: element.type_name(),
            })
            .collect();
        for element in &mut elements {
            element.peek(&line);
        }

        debug!(
            sim_type = %sim_type,
            elements = elements.len(),
            "assembled lattice machine"
        );

        Ok(Self {
            sim_type,
            info,
            elements,
            lookup,
        })
    }

    /// Allocates a fresh simulation state through the family's registered
    /// state builder. Ownership transfers to the caller.
    pub fn alloc_state(&self, config: &Config) -> Result<Box<dyn BunchState>, EngineError> {
        (self.info.state_builder)(config)
    }

    /// Drives `state` through the element line.
    ///
    /// Starting at element `start`, and for at most `max` steps: the state's
    /// next-element index is defaulted to the current index plus one, the
    /// current element's [`advance`](Element::advance) runs, and the (possibly
    /// overwritten) next-element index selects the following element.
    /// Propagation stops when the index runs past the end of the line or the
    /// step budget is exhausted. Pass `usize::MAX` for an unbounded run.
    ///
    /// # Errors
    ///
    /// The first element error aborts propagation immediately and leaves the
    /// state partially mutated; callers must discard it.
    pub fn propagate(
        &self,
        state: &mut dyn BunchState,
        start: usize,
        max: usize,
    ) -> Result<(), EngineError> {
        self.propagate_observed(state, start, max, |_, _| {})
    }

    /// Like [`Machine::propagate`], invoking `probe` with the index of each
    /// executed element and the state just after it.
    pub fn propagate_observed<F>(
        &self,
        state: &mut dyn BunchState,
        start: usize,
        max: usize,
        mut probe: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(usize, &dyn BunchState),
    {
        let mut index = start;
        let mut steps = 0usize;
        while index < self.elements.len() && steps < max {
            let element = &self.elements[index];
            state.set_next_element(index + 1);
            element.advance(&mut *state)?;
            trace!(index, element = element.name(), "advanced bunch state");
            probe(index, &*state);
            index = state.next_element();
            steps += 1;
        }
        Ok(())
    }

    /// Rebuilds the element at `index` from a fresh configuration, keeping its
    /// name, index, and element type.
    ///
    /// The family's builder for the existing element's type runs against the
    /// new config; on failure the old element stays in place.
    pub fn reconfigure(&mut self, index: usize, config: Config) -> Result<(), EngineError> {
        let Some(existing) = self.elements.get(index) else {
            return Err(EngineError::ElementOutOfRange {
                index,
                len: self.elements.len(),
            });
        };
        let type_name = existing.type_name();
        let builder =
            self.info
                .elements
                .get(type_name)
                .ok_or_else(|| EngineError::UnknownElementType {
                    sim_type: self.sim_type.clone(),
                    element_type: type_name.to_string(),
                })?;

        let rebuilt = builder(ElementContext {
            name: existing.name().to_string(),
            index,
            config,
        })?;
        self.elements[index] = rebuilt;
        debug!(index, "reconfigured lattice element");
        Ok(())
    }

    /// The simulation-type name this machine was assembled under.
    pub fn sim_type(&self) -> &str {
        &self.sim_type
    }

    /// Number of elements in the line.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the line is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The element at `index`, if any.
    pub fn element(&self, index: usize) -> Option<&dyn Element> {
        self.elements.get(index).map(|element| element.as_ref())
    }

    /// Looks up an element's index by its unique name.
    pub fn find_element(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sim_type: {}", self.sim_type)?;
        writeln!(f, "#Elements: {}", self.elements.len())?;
        for element in &self.elements {
            element.show(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigError;
    use crate::engine::registry::SimTypeRegistration;
    use crate::engine::state::{ArrayView, StateArray};
    use std::any::Any;
    use std::sync::Once;

    const COUNTER_SIM: &str = "machine-test-counter";
    const OTHER_SIM: &str = "machine-test-other";

    // A minimal simulation family: states carry a running total and elements
    // add to it, redirect the flow, or fail on demand.
    #[derive(Debug, Clone, Default)]
    struct CounterState {
        next: usize,
        total: f64,
    }

    impl BunchState for CounterState {
        fn next_element(&self) -> usize {
            self.next
        }

        fn set_next_element(&mut self, index: usize) {
            self.next = index;
        }

        fn clone_state(&self) -> Box<dyn BunchState> {
            Box::new(self.clone())
        }

        fn assign(&mut self, other: &dyn BunchState) -> Result<(), EngineError> {
            let other = other
                .as_any()
                .downcast_ref::<CounterState>()
                .ok_or(EngineError::IncompatibleState {
                    expected: "counter state",
                })?;
            self.total = other.total;
            Ok(())
        }

        fn get_array(&self, index: usize) -> Option<StateArray<'_>> {
            match index {
                0 => Some(StateArray {
                    name: "total",
                    view: ArrayView::Scalar(self.total),
                }),
                _ => None,
            }
        }

        fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
            writeln!(out, "total={}", self.total)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn build_counter_state(config: &Config) -> Result<Box<dyn BunchState>, EngineError> {
        Ok(Box::new(CounterState {
            next: 0,
            total: config.get_or("total", 0.0),
        }))
    }

    struct TickElement {
        name: String,
        index: usize,
        config: Config,
        amount: f64,
    }

    impl Element for TickElement {
        fn type_name(&self) -> &'static str {
            "tick"
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn index(&self) -> usize {
            self.index
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
            let state = state
                .as_any_mut()
                .downcast_mut::<CounterState>()
                .ok_or(EngineError::IncompatibleState {
                    expected: "counter state",
                })?;
            state.total += self.amount;
            Ok(())
        }
    }

    fn build_tick(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        let amount = context.config.get_or("amount", 1.0);
        Ok(Box::new(TickElement {
            name: context.name,
            index: context.index,
            config: context.config,
            amount,
        }))
    }

    struct JumpElement {
        name: String,
        index: usize,
        config: Config,
        target: usize,
    }

    impl Element for JumpElement {
        fn type_name(&self) -> &'static str {
            "jump"
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn index(&self) -> usize {
            self.index
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn advance(&self, state: &mut dyn BunchState) -> Result<(), EngineError> {
            state.set_next_element(self.target);
            Ok(())
        }
    }

    fn build_jump(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        let target = context.config.get::<f64>("target")? as usize;
        Ok(Box::new(JumpElement {
            name: context.name,
            index: context.index,
            config: context.config,
            target,
        }))
    }

    // Fails during advance unless its config carries a "limit": exercises the
    // abort-on-error contract of propagate.
    struct FuseElement {
        name: String,
        index: usize,
        config: Config,
    }

    impl Element for FuseElement {
        fn type_name(&self) -> &'static str {
            "fuse"
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn index(&self) -> usize {
            self.index
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn advance(&self, _state: &mut dyn BunchState) -> Result<(), EngineError> {
            self.config.get::<f64>("limit")?;
            Ok(())
        }
    }

    fn build_fuse(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(FuseElement {
            name: context.name,
            index: context.index,
            config: context.config,
        }))
    }

    struct PeekElement {
        name: String,
        index: usize,
        config: Config,
        line_len: usize,
    }

    impl Element for PeekElement {
        fn type_name(&self) -> &'static str {
            "peek"
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn index(&self) -> usize {
            self.index
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn peek(&mut self, line: &[ElementDesc]) {
            self.line_len = line.len();
        }

        fn advance(&self, _state: &mut dyn BunchState) -> Result<(), EngineError> {
            Ok(())
        }

        fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
            writeln!(
                out,
                "Element {}: {} (peek) saw {} elements",
                self.index, self.name, self.line_len
            )
        }
    }

    fn build_peek(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Ok(Box::new(PeekElement {
            name: context.name,
            index: context.index,
            config: context.config,
            line_len: 0,
        }))
    }

    #[derive(Debug, Clone, Default)]
    struct OtherState {
        next: usize,
    }

    impl BunchState for OtherState {
        fn next_element(&self) -> usize {
            self.next
        }

        fn set_next_element(&mut self, index: usize) {
            self.next = index;
        }

        fn clone_state(&self) -> Box<dyn BunchState> {
            Box::new(self.clone())
        }

        fn assign(&mut self, other: &dyn BunchState) -> Result<(), EngineError> {
            other
                .as_any()
                .downcast_ref::<OtherState>()
                .ok_or(EngineError::IncompatibleState {
                    expected: "other state",
                })?;
            Ok(())
        }

        fn get_array(&self, _index: usize) -> Option<StateArray<'_>> {
            None
        }

        fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
            writeln!(out, "other")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn build_other_state(_config: &Config) -> Result<Box<dyn BunchState>, EngineError> {
        Ok(Box::new(OtherState::default()))
    }

    static REGISTER_TEST_FAMILIES: Once = Once::new();

    fn ensure_test_families() {
        REGISTER_TEST_FAMILIES.call_once(|| {
            SimTypeRegistration::new(COUNTER_SIM, build_counter_state)
                .element("tick", build_tick)
                .element("jump", build_jump)
                .element("fuse", build_fuse)
                .element("peek", build_peek)
                .register();
            SimTypeRegistration::new(OTHER_SIM, build_other_state).register();
        });
    }

    fn element_config(element_type: &str, name: &str) -> Config {
        let mut config = Config::new();
        config.set("type", element_type);
        config.set("name", name);
        config
    }

    fn tick_config(name: &str, amount: f64) -> Config {
        let mut config = element_config("tick", name);
        config.set("amount", amount);
        config
    }

    fn machine_config(sim_type: &str, elements: Vec<Config>) -> Config {
        let mut config = Config::new();
        config.set("sim_type", sim_type);
        config.set("elements", elements);
        config
    }

    fn create_machine(elements: Vec<Config>) -> Machine {
        ensure_test_families();
        Machine::from_config(&machine_config(COUNTER_SIM, elements)).unwrap()
    }

    fn total_of(state: &dyn BunchState) -> f64 {
        state
            .as_any()
            .downcast_ref::<CounterState>()
            .expect("counter state")
            .total
    }

    mod construction {
        use super::*;

        #[test]
        fn unknown_sim_type_is_rejected() {
            ensure_test_families();
            let config = machine_config("machine-test-unregistered", vec![]);
            let err = Machine::from_config(&config).unwrap_err();
            assert!(matches!(
                err,
                EngineError::UnknownSimType { sim_type } if sim_type == "machine-test-unregistered"
            ));
        }

        #[test]
        fn unknown_element_type_is_rejected() {
            ensure_test_families();
            let config = machine_config(COUNTER_SIM, vec![element_config("warp", "w1")]);
            let err = Machine::from_config(&config).unwrap_err();
            match err {
                EngineError::UnknownElementType {
                    sim_type,
                    element_type,
                } => {
                    assert_eq!(sim_type, COUNTER_SIM);
                    assert_eq!(element_type, "warp");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn duplicate_element_name_is_rejected() {
            ensure_test_families();
            let config = machine_config(
                COUNTER_SIM,
                vec![tick_config("t", 1.0), tick_config("t", 2.0)],
            );
            let err = Machine::from_config(&config).unwrap_err();
            match err {
                EngineError::DuplicateElementName { name, index } => {
                    assert_eq!(name, "t");
                    assert_eq!(index, 1);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn elements_receive_sequential_indices() {
            let machine = create_machine(vec![tick_config("a", 1.0), tick_config("b", 2.0)]);
            assert_eq!(machine.len(), 2);
            assert_eq!(machine.element(0).unwrap().index(), 0);
            assert_eq!(machine.element(1).unwrap().index(), 1);
            assert_eq!(machine.find_element("b"), Some(1));
            assert_eq!(machine.find_element("absent"), None);
            assert_eq!(machine.sim_type(), COUNTER_SIM);
        }

        #[test]
        fn peek_pass_sees_the_whole_line() {
            let machine = create_machine(vec![
                tick_config("a", 1.0),
                element_config("peek", "p"),
                tick_config("b", 2.0),
            ]);
            let rendered = machine.to_string();
            assert!(rendered.contains("Element 1: p (peek) saw 3 elements"));
        }

        #[test]
        fn display_lists_the_line() {
            let machine = create_machine(vec![tick_config("a", 1.0), tick_config("b", 2.0)]);
            let rendered = machine.to_string();
            assert!(rendered.starts_with(&format!("sim_type: {COUNTER_SIM}\n#Elements: 2\n")));
            assert!(rendered.contains("Element 0: a (tick)"));
            assert!(rendered.contains("Element 1: b (tick)"));
        }
    }

    mod propagation {
        use super::*;

        #[test]
        fn zero_step_propagation_is_a_noop() {
            let machine = create_machine(vec![tick_config("a", 1.0)]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *state, 0, 0).unwrap();
            assert_eq!(total_of(&*state), 0.0);
            assert_eq!(state.next_element(), 0);
        }

        #[test]
        fn propagation_visits_elements_in_order() {
            let machine = create_machine(vec![
                tick_config("a", 1.0),
                tick_config("b", 2.0),
                tick_config("c", 4.0),
            ]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *state, 0, usize::MAX).unwrap();
            assert_eq!(total_of(&*state), 7.0);
            assert_eq!(state.next_element(), 3);
        }

        #[test]
        fn propagation_honors_start_and_step_budget() {
            let machine = create_machine(vec![
                tick_config("a", 1.0),
                tick_config("b", 2.0),
                tick_config("c", 4.0),
            ]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *state, 1, 1).unwrap();
            assert_eq!(total_of(&*state), 2.0);
            assert_eq!(state.next_element(), 2);

            let mut from_past_the_end = machine.alloc_state(&Config::new()).unwrap();
            machine
                .propagate(&mut *from_past_the_end, 5, usize::MAX)
                .unwrap();
            assert_eq!(total_of(&*from_past_the_end), 0.0);
        }

        #[test]
        fn an_element_may_redirect_the_flow() {
            let mut jump = element_config("jump", "j");
            jump.set("target", 3.0);
            let machine = create_machine(vec![
                tick_config("a", 1.0),
                jump,
                tick_config("skipped", 100.0),
                tick_config("d", 5.0),
            ]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *state, 0, usize::MAX).unwrap();
            assert_eq!(total_of(&*state), 6.0);
            assert_eq!(state.next_element(), 4);
        }

        #[test]
        fn a_failing_element_aborts_propagation() {
            let machine = create_machine(vec![
                tick_config("a", 1.0),
                element_config("fuse", "f"),
                tick_config("unreached", 100.0),
            ]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            let err = machine.propagate(&mut *state, 0, usize::MAX).unwrap_err();
            assert!(matches!(
                err,
                EngineError::Config {
                    source: ConfigError::MissingKey { .. }
                }
            ));
            assert_eq!(total_of(&*state), 1.0);
            assert_eq!(state.next_element(), 2);
        }

        #[test]
        fn a_foreign_state_is_rejected() {
            ensure_test_families();
            let machine = create_machine(vec![tick_config("a", 1.0)]);
            let other_machine =
                Machine::from_config(&machine_config(OTHER_SIM, vec![])).unwrap();
            let mut state = other_machine.alloc_state(&Config::new()).unwrap();
            let err = machine.propagate(&mut *state, 0, usize::MAX).unwrap_err();
            assert!(matches!(err, EngineError::IncompatibleState { .. }));
        }

        #[test]
        fn observed_propagation_reports_each_executed_element() {
            let machine = create_machine(vec![tick_config("a", 1.0), tick_config("b", 2.0)]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            let mut seen = Vec::new();
            machine
                .propagate_observed(&mut *state, 0, usize::MAX, |index, state| {
                    seen.push((index, total_of(state)));
                })
                .unwrap();
            assert_eq!(seen, vec![(0, 1.0), (1, 3.0)]);
        }
    }

    mod reconfiguration {
        use super::*;

        #[test]
        fn reconfigure_replaces_element_behavior_in_place() {
            let mut machine = create_machine(vec![tick_config("a", 1.0)]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *state, 0, usize::MAX).unwrap();
            assert_eq!(total_of(&*state), 1.0);

            let mut stronger = Config::new();
            stronger.set("amount", 10.0);
            machine.reconfigure(0, stronger).unwrap();
            assert_eq!(machine.element(0).unwrap().name(), "a");
            assert_eq!(machine.find_element("a"), Some(0));

            let mut fresh = machine.alloc_state(&Config::new()).unwrap();
            machine.propagate(&mut *fresh, 0, usize::MAX).unwrap();
            assert_eq!(total_of(&*fresh), 10.0);
        }

        #[test]
        fn reconfigure_out_of_range_is_rejected() {
            let mut machine = create_machine(vec![tick_config("a", 1.0)]);
            let err = machine.reconfigure(5, Config::new()).unwrap_err();
            assert!(matches!(
                err,
                EngineError::ElementOutOfRange { index: 5, len: 1 }
            ));
        }
    }

    mod states {
        use super::*;

        #[test]
        fn alloc_state_uses_the_family_builder() {
            let machine = create_machine(vec![tick_config("a", 1.0)]);
            let mut seed = Config::new();
            seed.set("total", 5.0);
            let state = machine.alloc_state(&seed).unwrap();
            assert_eq!(total_of(&*state), 5.0);
        }

        #[test]
        fn clone_state_is_independent() {
            let machine = create_machine(vec![tick_config("a", 1.0)]);
            let mut state = machine.alloc_state(&Config::new()).unwrap();
            let snapshot = state.clone_state();
            machine.propagate(&mut *state, 0, usize::MAX).unwrap();
            assert_eq!(total_of(&*state), 1.0);
            assert_eq!(total_of(&*snapshot), 0.0);
        }

        #[test]
        fn assign_copies_payload_but_not_the_cursor() {
            let machine = create_machine(vec![tick_config("a", 1.0)]);
            let mut seed = Config::new();
            seed.set("total", 5.0);
            let source = machine.alloc_state(&seed).unwrap();

            let mut target = machine.alloc_state(&Config::new()).unwrap();
            target.set_next_element(7);
            target.assign(&*source).unwrap();
            assert_eq!(total_of(&*target), 5.0);
            assert_eq!(target.next_element(), 7);
        }
    }
}
