//! Phase transitions and module enable/disable.
//!
//! A transition into phase `B` from phase `A`:
//!
//! 1. Resolve `B`'s manifest and build the event scopes it will need. A
//!    wiring error, or a panic in a module constructor or `listeners()`,
//!    aborts here; `A` stays current and `B` is dropped.
//! 2. Retire modules that are enabled, not persistent, and not needed by
//!    `B`: `predisable` on all of them, then per module unregister its
//!    scope and `disable`.
//! 3. Retire `A`: unregister its scope, `on_exit(formal)`.
//! 4. Enable needed modules that are not enabled yet: register scope,
//!    `init`.
//! 5. `postinit` on every needed module.
//! 6. Install `B`: register scope, `provide`, `on_enter`.
//!
//! Bus failures in steps 4 and 6 are structural and abort the transition.
//! Everything else is reported and the transition carries on.

use std::any::TypeId;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::capability::{self, Provision};
use crate::error::{CallbackError, GameError, Role};
use crate::game::{FlagGuard, Game, PendingTransition};
use crate::observability::events::LifecycleEvent;
use crate::observability::metrics;
use crate::phase::PhaseSlot;

impl Game {
    /// Moves to `target`, or retires the current phase when `None`.
    pub(crate) fn transition(&self, target: Option<PhaseSlot>, formal: bool) -> Result<(), GameError> {
        if self.inner.in_transition.replace(true) {
            // Reached through a tick run from inside a transition callback.
            // Keep the request for the next boundary unless a newer one exists.
            warn!(game = %self.id(), "transition requested during a transition; deferred");
            let mut pending = self.inner.pending.borrow_mut();
            if pending.is_none() {
                *pending = Some(PendingTransition { target, formal });
            }
            return Ok(());
        }
        let _transition = FlagGuard(&self.inner.in_transition);
        match target {
            Some(incoming) => self.transition_to(incoming, formal),
            None => {
                let from = self.current_phase_name();
                self.retire_phase(formal);
                self.retire_modules(false);
                metrics::record_phase_transition(from.as_deref(), None);
                Ok(())
            }
        }
    }

    fn transition_to(&self, mut incoming: PhaseSlot, formal: bool) -> Result<(), GameError> {
        let from = self.current_phase_name();
        let manifest = panic::catch_unwind(AssertUnwindSafe(|| incoming.instance.borrow().manifest()))
            .map_err(|payload| {
                GameError::callback(
                    Role::Phase,
                    &incoming.name,
                    "manifest",
                    CallbackError::from_panic(payload.as_ref()),
                )
            })?;

        let resolution = capability::resolve(self, &incoming.name, &manifest)?;
        debug!(
            game = %self.id(),
            phase = %incoming.name,
            needed = resolution.needed.len(),
            "capabilities resolved"
        );
        self.prepare_scopes(&resolution.needed, &mut incoming)?;

        let retiring: Vec<TypeId> = {
            let modules = self.modules();
            modules
                .enabled()
                .into_iter()
                .filter(|id| !modules.is_persistent(*id) && !resolution.needed.contains(id))
                .collect()
        };
        self.retire_module_set(&retiring);
        self.retire_phase(formal);

        self.enable_modules(&resolution.needed)?;
        for id in &resolution.needed {
            self.call_module(*id, "postinit", |module, game| module.postinit(game));
        }

        let to = incoming.name.clone();
        if self.install_phase(&mut incoming, &resolution.provision)? {
            metrics::record_phase_transition(from.as_deref(), Some(&to));
            metrics::set_current_phase(Some(&to), None);
            let previous = self.inner.current.replace(Some(incoming));
            drop(previous);
        } else {
            metrics::record_phase_transition(from.as_deref(), None);
        }
        Ok(())
    }

    /// Retires enabled modules; persistent ones only when `include_persistent`.
    pub(crate) fn retire_modules(&self, include_persistent: bool) {
        let retiring: Vec<TypeId> = {
            let modules = self.modules();
            modules
                .enabled()
                .into_iter()
                .filter(|id| include_persistent || !modules.is_persistent(*id))
                .collect()
        };
        self.retire_module_set(&retiring);
    }

    fn retire_module_set(&self, ids: &[TypeId]) {
        for id in ids {
            self.call_module(*id, "predisable", |module, game| module.predisable(game));
        }
        for &id in ids {
            let scope = self.modules_mut().get_mut(id).and_then(|record| record.scope.take());
            if let Some(mut scope) = scope {
                let outcome = scope.unregister(self.bus());
                if let Some(record) = self.modules_mut().get_mut(id) {
                    record.scope = Some(scope);
                }
                if let Err(source) = outcome {
                    let context = format!("unregistering events of module '{}'", self.module_name(id));
                    self.report(GameError::Transition { context, source });
                    continue;
                }
            }

            self.call_module(id, "disable", |module, game| module.disable(game));
            if let Some(record) = self.modules_mut().get_mut(id) {
                record.enabled = false;
            }
            let module = self.module_name(id);
            debug!(game = %self.id(), %module, "module disabled");
            self.emit(LifecycleEvent::ModuleDisabled {
                timestamp: Utc::now(),
                game: self.id(),
                module,
            });
        }
    }

    /// Takes the current phase out, unregisters its scope and runs
    /// `on_exit`. The instance is dropped afterwards.
    pub(crate) fn retire_phase(&self, formal: bool) {
        let slot = self.inner.current.borrow_mut().take();
        let Some(mut slot) = slot else {
            return;
        };
        if let Some(scope) = slot.scope.as_mut() {
            if let Err(source) = scope.unregister(self.bus()) {
                let context = format!("unregistering events of phase '{}'", slot.name);
                self.report(GameError::Transition { context, source });
            }
        }
        self.call_phase(&slot.name, &slot.instance, "on_exit", |phase, game| {
            phase.on_exit(game, formal)
        });
        info!(game = %self.id(), phase = %slot.name, formal, "phase exited");
        metrics::set_current_phase(None, Some(&slot.name));
        self.emit(LifecycleEvent::PhaseExited {
            timestamp: Utc::now(),
            game: self.id(),
            phase: slot.name.clone(),
            formal,
        });
    }

    /// Builds the scopes this transition will register, before anything
    /// is retired. A panicking `listeners()` aborts the transition with the
    /// outgoing phase still current.
    fn prepare_scopes(&self, needed: &[TypeId], incoming: &mut PhaseSlot) -> Result<(), GameError> {
        for &id in needed {
            let builder = self
                .modules()
                .get(id)
                .filter(|record| record.scope.is_none())
                .map(|record| Rc::clone(&record.scope_builder));
            let Some(build) = builder else {
                continue;
            };
            let scope = CallbackError::catch_panic(|| build(self)).map_err(|source| {
                GameError::callback(Role::Module, &self.module_name(id), "listeners", source)
            })?;
            if let Some(record) = self.modules_mut().get_mut(id) {
                record.scope = Some(scope);
            }
        }
        incoming
            .build_scope(self)
            .map_err(|source| GameError::callback(Role::Phase, &incoming.name, "listeners", source))
    }

    fn enable_modules(&self, needed: &[TypeId]) -> Result<(), GameError> {
        for &id in needed {
            if self.modules().is_enabled(id) {
                continue;
            }
            let scope = self.modules_mut().get_mut(id).and_then(|record| record.scope.take());
            if let Some(mut scope) = scope {
                let outcome = scope.register(self.bus());
                if let Some(record) = self.modules_mut().get_mut(id) {
                    record.scope = Some(scope);
                }
                if let Err(source) = outcome {
                    let context = format!("registering events of module '{}'", self.module_name(id));
                    return Err(GameError::Transition { context, source });
                }
            }

            self.call_module(id, "init", |module, game| module.init(game));
            if let Some(record) = self.modules_mut().get_mut(id) {
                record.enabled = true;
            }
            let module = self.module_name(id);
            debug!(game = %self.id(), %module, "module enabled");
            self.emit(LifecycleEvent::ModuleEnabled {
                timestamp: Utc::now(),
                game: self.id(),
                module,
            });
        }
        Ok(())
    }

    /// Registers the phase's scope, then runs `provide` and `on_enter`.
    /// Returns whether the phase was admitted; a phase whose `provide` or
    /// `on_enter` failed is unwound and not made current.
    fn install_phase(&self, slot: &mut PhaseSlot, provision: &Provision) -> Result<bool, GameError> {
        if let Some(scope) = slot.scope.as_mut() {
            scope.register(self.bus()).map_err(|source| GameError::Transition {
                context: format!("registering events of phase '{}'", slot.name),
                source,
            })?;
        }

        let admitted = self.call_phase(&slot.name, &slot.instance, "provide", |phase, _| {
            phase.provide(provision)
        }) && self.call_phase(&slot.name, &slot.instance, "on_enter", |phase, game| {
            phase.on_enter(game)
        });

        if !admitted {
            if let Some(scope) = slot.scope.as_mut() {
                if let Err(source) = scope.unregister(self.bus()) {
                    let context = format!("unregistering events of phase '{}'", slot.name);
                    self.report(GameError::Transition { context, source });
                }
            }
            warn!(game = %self.id(), phase = %slot.name, "phase failed to enter; no phase is current");
            return Ok(false);
        }

        info!(game = %self.id(), phase = %slot.name, "phase entered");
        self.emit(LifecycleEvent::PhaseEntered {
            timestamp: Utc::now(),
            game: self.id(),
            phase: slot.name.clone(),
        });
        Ok(true)
    }

    fn module_name(&self, id: TypeId) -> String {
        self.modules()
            .get(id)
            .map(|record| record.name.clone())
            .unwrap_or_default()
    }
}
