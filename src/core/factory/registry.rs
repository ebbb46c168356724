//=========================================================================
// Factory Registry
//=========================================================================
//
// Lookup table from (factory type, optional name) to a factory value.
//
// Populated at startup by initializer functions the host supplies; the
// context only performs typed lookups against it. The factory type is
// the routing key, so a `SubsystemFactory` and any other callable type
// never collide even under the same name.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{Any, TypeId};
use std::collections::HashMap;

use log::{debug, warn};

//=========================================================================

/// Function the host passes at startup to populate the registry.
pub type RegistryInitializer = fn(&mut FactoryRegistry);

type Key = (TypeId, Option<String>);

/// Typed table of factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<Key, Box<dyn Any + Send + Sync>>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry and runs every initializer against it, in order.
    pub fn from_initializers(initializers: &[RegistryInitializer]) -> Self {
        let mut registry = Self::new();
        for init in initializers {
            init(&mut registry);
        }
        registry
    }

    //--- Registration -----------------------------------------------------

    /// Registers `factory` under its type and an optional name.
    ///
    /// A later registration for the same key replaces the earlier one.
    pub fn register<F>(&mut self, name: Option<&str>, factory: F)
    where
        F: Any + Send + Sync,
    {
        let key = (TypeId::of::<F>(), name.map(str::to_owned));
        if self.factories.insert(key, Box::new(factory)).is_some() {
            warn!(
                target: "factory",
                "Factory {} ({:?}) was already registered and has been replaced",
                std::any::type_name::<F>(),
                name
            );
        } else {
            debug!(target: "factory", "Registered {} ({:?})", std::any::type_name::<F>(), name);
        }
    }

    //--- Lookup -----------------------------------------------------------

    /// Looks up a factory by exact type and name.
    pub fn resolve<F>(&self, name: Option<&str>) -> Option<&F>
    where
        F: Any + Send + Sync,
    {
        let key = (TypeId::of::<F>(), name.map(str::to_owned));
        self.factories.get(&key).and_then(|f| f.downcast_ref::<F>())
    }

    /// Looks up the named factory, falling back to the unnamed default.
    pub fn resolve_or_default<F>(&self, name: &str) -> Option<&F>
    where
        F: Any + Send + Sync,
    {
        self.resolve::<F>(Some(name)).or_else(|| self.resolve::<F>(None))
    }

    /// True if a factory of type `F` is registered under `name`.
    pub fn contains<F>(&self, name: Option<&str>) -> bool
    where
        F: Any + Send + Sync,
    {
        self.resolve::<F>(name).is_some()
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Greeter = Arc<dyn Fn() -> String + Send + Sync>;
    type Counter = fn() -> usize;

    fn greeter(text: &'static str) -> Greeter {
        Arc::new(move || text.to_string())
    }

    #[test]
    fn resolves_by_type_and_name() {
        let mut registry = FactoryRegistry::new();
        registry.register(None, greeter("default"));
        registry.register(Some("loud"), greeter("HELLO"));

        assert_eq!(registry.resolve::<Greeter>(None).unwrap()(), "default");
        assert_eq!(registry.resolve::<Greeter>(Some("loud")).unwrap()(), "HELLO");
        assert!(registry.resolve::<Greeter>(Some("quiet")).is_none());
    }

    #[test]
    fn different_types_do_not_collide() {
        let mut registry = FactoryRegistry::new();
        registry.register(Some("x"), greeter("text"));
        registry.register::<Counter>(Some("x"), || 3);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve::<Counter>(Some("x")).unwrap()(), 3);
        assert_eq!(registry.resolve::<Greeter>(Some("x")).unwrap()(), "text");
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = FactoryRegistry::new();
        registry.register::<Counter>(None, || 1);
        registry.register::<Counter>(None, || 2);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve::<Counter>(None).unwrap()(), 2);
    }

    #[test]
    fn resolve_or_default_falls_back_to_unnamed() {
        let mut registry = FactoryRegistry::new();
        registry.register::<Counter>(None, || 7);

        assert_eq!(registry.resolve_or_default::<Counter>("audio").unwrap()(), 7);
        assert!(registry.contains::<Counter>(None));
        assert!(!registry.contains::<Counter>(Some("audio")));
    }

    #[test]
    fn initializers_run_in_order() {
        fn first(registry: &mut FactoryRegistry) {
            registry.register::<Counter>(None, || 1);
        }
        fn second(registry: &mut FactoryRegistry) {
            registry.register::<Counter>(None, || 2);
            registry.register::<Counter>(Some("extra"), || 3);
        }

        let registry = FactoryRegistry::from_initializers(&[first as RegistryInitializer, second]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve::<Counter>(None).unwrap()(), 2);
    }
}
