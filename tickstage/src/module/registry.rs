//! Per-game module records keyed by module type.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bus::EventScope;
use crate::error::{CallbackError, Role};
use crate::game::Game;
use crate::module::{Module, ModuleHandle};
use crate::short_type_name;

type ScopeBuilder = Rc<dyn Fn(&Game) -> EventScope>;

/// Static description of a module type, used in manifests.
#[derive(Clone, Copy)]
pub struct ModuleType {
    id: TypeId,
    name: &'static str,
    factory: Option<fn() -> ModuleEntry>,
}

impl fmt::Debug for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleType")
            .field("name", &self.name)
            .field("constructible", &self.factory.is_some())
            .finish()
    }
}

impl PartialEq for ModuleType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleType {}

fn construct<M: Module + Default>() -> ModuleEntry {
    ModuleEntry::new(M::default())
}

impl ModuleType {
    /// A module type that can only be used once registered.
    #[must_use]
    pub fn of<M: Module>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: short_type_name::<M>(),
            factory: None,
        }
    }

    /// A module type the game can construct on demand via `Default`.
    #[must_use]
    pub fn constructible<M: Module + Default>() -> Self {
        Self {
            factory: Some(construct::<M>),
            ..Self::of::<M>()
        }
    }

    /// Type identifier.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Short type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a zero-argument constructor is available.
    #[must_use]
    pub const fn is_constructible(&self) -> bool {
        self.factory.is_some()
    }

    /// Runs the factory, if any. A panicking constructor is an `Err`.
    pub(crate) fn instantiate(&self) -> Option<Result<ModuleEntry, CallbackError>> {
        self.factory.map(CallbackError::catch_panic)
    }
}

/// A type-erased module instance ready to be recorded in a registry.
pub struct ModuleEntry {
    id: TypeId,
    name: String,
    instance: Rc<RefCell<dyn Module>>,
    typed: Rc<dyn Any>,
    scope_builder: ScopeBuilder,
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ModuleEntry {
    /// Wraps `module`, remembering how to build its event scope.
    #[must_use]
    pub fn new<M: Module>(module: M) -> Self {
        let name = module.name().to_owned();
        let cell: ModuleHandle<M> = Rc::new(RefCell::new(module));
        let weak = Rc::downgrade(&cell);
        let scope_name = name.clone();
        let scope_builder: ScopeBuilder = Rc::new(move |game: &Game| {
            EventScope::build(weak.clone(), &scope_name, Role::Module, game, M::listeners())
        });
        Self {
            id: TypeId::of::<M>(),
            name,
            instance: Rc::clone(&cell) as Rc<RefCell<dyn Module>>,
            typed: cell,
            scope_builder,
        }
    }

    /// Type identifier of the wrapped module.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Name of the wrapped module.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Registration record of one module in one game.
pub(crate) struct ModuleRecord {
    pub(crate) name: String,
    pub(crate) instance: Rc<RefCell<dyn Module>>,
    pub(crate) typed: Rc<dyn Any>,
    pub(crate) persistent: bool,
    pub(crate) enabled: bool,
    pub(crate) scope: Option<EventScope>,
    pub(crate) scope_builder: ScopeBuilder,
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("persistent", &self.persistent)
            .field("enabled", &self.enabled)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Module records of one game, at most one per type, in registration
/// order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: IndexMap<TypeId, ModuleRecord>,
}

impl ModuleRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record for `entry`. Returns `false` if the type is already
    /// present; the persistence flag of an existing record never changes.
    pub fn insert(&mut self, entry: ModuleEntry, persistent: bool) -> bool {
        if self.records.contains_key(&entry.id) {
            return false;
        }
        self.records.insert(
            entry.id,
            ModuleRecord {
                name: entry.name,
                instance: entry.instance,
                typed: entry.typed,
                persistent,
                enabled: false,
                scope: None,
                scope_builder: entry.scope_builder,
            },
        );
        true
    }

    /// Whether a module of the given type is registered.
    #[must_use]
    pub fn contains(&self, id: TypeId) -> bool {
        self.records.contains_key(&id)
    }

    /// Typed handle to a registered module.
    #[must_use]
    pub fn handle<M: Module>(&self) -> Option<ModuleHandle<M>> {
        self.records
            .get(&TypeId::of::<M>())
            .and_then(|record| Rc::clone(&record.typed).downcast::<RefCell<M>>().ok())
    }

    /// Whether the module is registered and enabled.
    #[must_use]
    pub fn is_enabled(&self, id: TypeId) -> bool {
        self.records.get(&id).is_some_and(|record| record.enabled)
    }

    /// Whether the module is registered as persistent.
    #[must_use]
    pub fn is_persistent(&self, id: TypeId) -> bool {
        self.records.get(&id).is_some_and(|record| record.persistent)
    }

    /// Types of all enabled modules, in registration order.
    #[must_use]
    pub fn enabled(&self) -> Vec<TypeId> {
        self.records
            .iter()
            .filter(|(_, record)| record.enabled)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Names of all registered modules, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.records.values().map(|record| record.name.clone()).collect()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no modules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn get(&self, id: TypeId) -> Option<&ModuleRecord> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> Option<&mut ModuleRecord> {
        self.records.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Arena {
        size: u32,
    }

    impl Module for Arena {}

    struct Scoreboard;

    impl Module for Scoreboard {
        fn name(&self) -> &str {
            "scoreboard"
        }
    }

    #[test]
    fn one_record_per_type() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.insert(ModuleEntry::new(Arena { size: 3 }), false));
        assert!(!registry.insert(ModuleEntry::new(Arena { size: 9 }), true));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_persistent(TypeId::of::<Arena>()));
        assert_eq!(registry.handle::<Arena>().unwrap().borrow().size, 3);
    }

    #[test]
    fn typed_handle_shares_the_instance() {
        let mut registry = ModuleRegistry::new();
        registry.insert(ModuleEntry::new(Arena::default()), false);
        registry.handle::<Arena>().unwrap().borrow_mut().size = 11;
        assert_eq!(registry.handle::<Arena>().unwrap().borrow().size, 11);
        assert!(registry.handle::<Scoreboard>().is_none());
    }

    #[test]
    fn names_and_enabled_follow_registration_order() {
        let mut registry = ModuleRegistry::new();
        registry.insert(ModuleEntry::new(Scoreboard), true);
        registry.insert(ModuleEntry::new(Arena::default()), false);
        assert_eq!(registry.names(), ["scoreboard", "Arena"]);

        registry.get_mut(TypeId::of::<Arena>()).unwrap().enabled = true;
        registry.get_mut(TypeId::of::<Scoreboard>()).unwrap().enabled = true;
        assert_eq!(
            registry.enabled(),
            [TypeId::of::<Scoreboard>(), TypeId::of::<Arena>()]
        );
    }

    #[test]
    fn module_type_constructibility() {
        assert!(ModuleType::constructible::<Arena>().is_constructible());
        assert!(!ModuleType::of::<Scoreboard>().is_constructible());
        assert_eq!(ModuleType::of::<Arena>(), ModuleType::constructible::<Arena>());
        let entry = ModuleType::constructible::<Arena>().instantiate().unwrap().unwrap();
        assert_eq!(entry.name(), "Arena");
        assert_eq!(entry.type_id(), TypeId::of::<Arena>());
    }
}
