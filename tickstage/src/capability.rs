//! Capability declarations and their resolution.
//!
//! A phase states which modules it needs in a [`Manifest`]. Before the
//! phase is installed, [`resolve`] checks the manifest against the game's
//! module registry, creates and resets modules as declared, and produces
//! the set of modules that must be enabled plus the [`Provision`] handed
//! to the phase.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{GameError, Role, WiringError};
use crate::game::Game;
use crate::module::{Module, ModuleEntry, ModuleHandle, ModuleType};

/// How a phase needs a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Create the module if absent, then reset it.
    Create {
        /// Module type
        module: ModuleType,
        /// Persistence used when the record is created here
        persistent: bool,
    },
    /// The module must already be registered.
    Require(ModuleType),
    /// Use the module if registered.
    Optional(ModuleType),
}

impl Capability {
    /// The declared module type.
    #[must_use]
    pub const fn module(&self) -> ModuleType {
        match self {
            Self::Create { module, .. } | Self::Require(module) | Self::Optional(module) => *module,
        }
    }

    const fn strength(&self) -> u8 {
        match self {
            Self::Optional(_) => 0,
            Self::Require(_) => 1,
            Self::Create { .. } => 2,
        }
    }
}

/// Ordered capability declarations of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    declarations: Vec<Capability>,
}

impl Manifest {
    /// An empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a non-persistent module, constructed on demand and reset
    /// on every transition into the declaring phase.
    #[must_use]
    pub fn create<M: Module + Default>(self) -> Self {
        self.with(Capability::Create {
            module: ModuleType::constructible::<M>(),
            persistent: false,
        })
    }

    /// Like [`Self::create`], but a module created here is persistent.
    #[must_use]
    pub fn create_persistent<M: Module + Default>(self) -> Self {
        self.with(Capability::Create {
            module: ModuleType::constructible::<M>(),
            persistent: true,
        })
    }

    /// Declares a reset-on-entry module that has no default constructor;
    /// it must have been registered beforehand.
    #[must_use]
    pub fn create_registered<M: Module>(self) -> Self {
        self.with(Capability::Create {
            module: ModuleType::of::<M>(),
            persistent: false,
        })
    }

    /// Declares a module that must already be registered.
    #[must_use]
    pub fn require<M: Module>(self) -> Self {
        self.with(Capability::Require(ModuleType::of::<M>()))
    }

    /// Declares a module used only if registered.
    #[must_use]
    pub fn optional<M: Module>(self) -> Self {
        self.with(Capability::Optional(ModuleType::of::<M>()))
    }

    /// Appends a raw declaration.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.declarations.push(capability);
        self
    }

    /// Declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.declarations.iter()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Collapses duplicate declarations of the same type.
    ///
    /// The first declaration keeps its position. The strongest kind wins
    /// (`create` over `require` over `optional`); a merged `create` is
    /// persistent if any of its `create` declarations is, and may use any
    /// available factory.
    #[must_use]
    pub fn merged(&self) -> Vec<Capability> {
        let mut merged: IndexMap<TypeId, Capability> = IndexMap::new();
        for declared in &self.declarations {
            let id = declared.module().id();
            let Some(existing) = merged.get_mut(&id) else {
                merged.insert(id, *declared);
                continue;
            };
            *existing = match (*existing, *declared) {
                (
                    Capability::Create {
                        module: a,
                        persistent: pa,
                    },
                    Capability::Create {
                        module: b,
                        persistent: pb,
                    },
                ) => Capability::Create {
                    module: if a.is_constructible() { a } else { b },
                    persistent: pa || pb,
                },
                (kept, new) if new.strength() > kept.strength() => new,
                (kept, _) => kept,
            };
        }
        merged.into_values().collect()
    }
}

/// One resolved declaration as seen by the phase.
#[derive(Clone)]
struct Provided {
    id: TypeId,
    name: &'static str,
    instance: Option<Rc<dyn Any>>,
}

/// Modules resolved for a phase, handed to [`Phase::provide`].
///
/// Optional modules that are not registered appear as explicit absent
/// entries.
///
/// [`Phase::provide`]: crate::phase::Phase::provide
#[derive(Clone, Default)]
pub struct Provision {
    entries: Vec<Provided>,
}

impl std::fmt::Debug for Provision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.name, entry.instance.is_some())),
            )
            .finish()
    }
}

impl Provision {
    /// Handle to the resolved module of type `M`, or `None` if it was not
    /// declared or is an absent optional.
    #[must_use]
    pub fn module<M: Module>(&self) -> Option<ModuleHandle<M>> {
        let id = TypeId::of::<M>();
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.instance.clone())
            .and_then(|instance| instance.downcast::<RefCell<M>>().ok())
    }

    /// Whether `M` was declared by the phase.
    #[must_use]
    pub fn is_declared<M: Module>(&self) -> bool {
        let id = TypeId::of::<M>();
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Names of the declared modules, each with whether it is present.
    #[must_use]
    pub fn summary(&self) -> Vec<(&'static str, bool)> {
        self.entries
            .iter()
            .map(|entry| (entry.name, entry.instance.is_some()))
            .collect()
    }

    /// Number of declared modules, present or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of [`resolve`].
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    /// Modules that must be enabled, in declaration order.
    pub(crate) needed: Vec<TypeId>,
    pub(crate) provision: Provision,
}

/// Checks that every declaration can be satisfied without touching the
/// registry.
fn validate(game: &Game, phase: &str, declarations: &[Capability]) -> Result<(), WiringError> {
    let modules = game.modules();
    for declared in declarations {
        match declared {
            Capability::Require(module) if !modules.contains(module.id()) => {
                return Err(WiringError::MissingModule {
                    module: module.name(),
                    phase: phase.to_owned(),
                });
            }
            Capability::Create { module, .. }
                if !modules.contains(module.id()) && !module.is_constructible() =>
            {
                return Err(WiringError::Uninstantiable {
                    module: module.name(),
                    phase: phase.to_owned(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Constructs every declared `create` module that is not registered yet.
/// Nothing is installed, so a panicking constructor leaves the game as it
/// was.
fn construct(
    game: &Game,
    declarations: &[Capability],
) -> Result<HashMap<TypeId, ModuleEntry>, GameError> {
    let mut built = HashMap::new();
    for declared in declarations {
        let Capability::Create { module, .. } = declared else {
            continue;
        };
        if game.modules().contains(module.id()) {
            continue;
        }
        if let Some(entry) = module.instantiate() {
            let entry = entry
                .map_err(|source| GameError::callback(Role::Module, module.name(), "default", source))?;
            built.insert(module.id(), entry);
        }
    }
    Ok(built)
}

/// Resolves `manifest` for the phase named `phase`.
///
/// Fails with a [`WiringError`], or with the panic of a module
/// constructor, before any module is created or reset. Otherwise creates
/// absent `create` modules (calling `register`), resets every `create`
/// module, and returns the needed set. Failures of those callbacks are
/// reported to the game's failure handler and do not stop resolution.
pub(crate) fn resolve(game: &Game, phase: &str, manifest: &Manifest) -> Result<Resolution, GameError> {
    let declarations = manifest.merged();
    validate(game, phase, &declarations)?;
    let mut built = construct(game, &declarations)?;

    let mut resolution = Resolution::default();
    for declared in &declarations {
        let module = declared.module();
        match declared {
            Capability::Create { persistent, .. } => {
                if let Some(entry) = built.remove(&module.id()) {
                    debug!(module = module.name(), phase, persistent, "creating module");
                    game.install_module(entry, *persistent);
                }
                game.reset_module(module.id());
                resolution.needed.push(module.id());
            }
            Capability::Require(_) => resolution.needed.push(module.id()),
            Capability::Optional(_) => {
                if game.modules().contains(module.id()) {
                    resolution.needed.push(module.id());
                }
            }
        }
        let instance = game.modules().get(module.id()).map(|record| Rc::clone(&record.typed));
        resolution.provision.entries.push(Provided {
            id: module.id(),
            name: module.name(),
            instance,
        });
    }
    Ok(resolution)
}
