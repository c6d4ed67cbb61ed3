use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::core::config::Config;
use crate::engine::element::{Element, ElementContext};
use crate::engine::error::EngineError;
use crate::engine::state::BunchState;

/// Builds the initial simulation state of a family from a configuration.
pub type StateBuilder = fn(&Config) -> Result<Box<dyn BunchState>, EngineError>;

/// Builds one lattice element of a family from its construction context.
pub type ElementBuilder = fn(ElementContext) -> Result<Box<dyn Element>, EngineError>;

/// The registered constructors of one simulation family.
///
/// Machines take a private snapshot of this at construction, so later registry
/// changes never affect an existing machine.
#[derive(Clone)]
pub(crate) struct SimTypeInfo {
    pub(crate) name: String,
    pub(crate) state_builder: StateBuilder,
    pub(crate) elements: HashMap<String, ElementBuilder>,
}

static REGISTRY: LazyLock<RwLock<HashMap<String, SimTypeInfo>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers a complete simulation family: a state builder plus one element
/// builder per element-type name.
///
/// The registry is process-wide. Physics-model modules populate it once at
/// initialization (guarded by a one-time init), after which it is effectively
/// read-only; registering the same family name again replaces the previous
/// registration wholesale.
///
/// # Example
///
/// ```ignore
/// SimTypeRegistration::new("MomentMatrix", build_state)
///     .element("drift", build_drift)
///     .element("marker", build_marker)
///     .register();
/// ```
pub struct SimTypeRegistration {
    info: SimTypeInfo,
}

impl SimTypeRegistration {
    /// Starts a registration for the family `name` with its state builder.
    pub fn new(name: &str, state_builder: StateBuilder) -> Self {
        Self {
            info: SimTypeInfo {
                name: name.to_string(),
                state_builder,
                elements: HashMap::new(),
            },
        }
    }

    /// Adds an element builder under `element_type`.
    pub fn element(mut self, element_type: &str, builder: ElementBuilder) -> Self {
        self.info.elements.insert(element_type.to_string(), builder);
        self
    }

    /// Installs the family into the process-wide registry.
    pub fn register(self) {
        let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        registry.insert(self.info.name.clone(), self.info);
    }
}

/// Returns a snapshot of the family registered under `sim_type`, if any.
pub(crate) fn lookup(sim_type: &str) -> Option<SimTypeInfo> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.get(sim_type).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_nothing_state(_config: &Config) -> Result<Box<dyn BunchState>, EngineError> {
        Err(EngineError::UnknownSimType {
            sim_type: "unbuildable".to_string(),
        })
    }

    fn build_no_element(context: ElementContext) -> Result<Box<dyn Element>, EngineError> {
        Err(EngineError::UnknownElementType {
            sim_type: "unbuildable".to_string(),
            element_type: context.name,
        })
    }

    #[test]
    fn lookup_of_unregistered_family_is_none() {
        assert!(lookup("registry-test-never-registered").is_none());
    }

    #[test]
    fn registered_family_exposes_its_builders() {
        SimTypeRegistration::new("registry-test-basic", build_nothing_state)
            .element("null", build_no_element)
            .register();

        let info = lookup("registry-test-basic").unwrap();
        assert_eq!(info.name, "registry-test-basic");
        assert!(info.elements.contains_key("null"));
        assert!(!info.elements.contains_key("drift"));
    }

    #[test]
    fn re_registration_replaces_the_family_wholesale() {
        SimTypeRegistration::new("registry-test-replace", build_nothing_state)
            .element("old", build_no_element)
            .register();
        SimTypeRegistration::new("registry-test-replace", build_nothing_state)
            .element("new", build_no_element)
            .register();

        let info = lookup("registry-test-replace").unwrap();
        assert!(info.elements.contains_key("new"));
        assert!(!info.elements.contains_key("old"));
    }

    #[test]
    fn lookup_snapshot_is_independent_of_later_registration() {
        SimTypeRegistration::new("registry-test-snapshot", build_nothing_state)
            .element("first", build_no_element)
            .register();
        let snapshot = lookup("registry-test-snapshot").unwrap();

        SimTypeRegistration::new("registry-test-snapshot", build_nothing_state)
            .element("second", build_no_element)
            .register();

        assert!(snapshot.elements.contains_key("first"));
        assert!(!snapshot.elements.contains_key("second"));
    }
}
