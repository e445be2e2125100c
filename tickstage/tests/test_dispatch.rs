mod common;

use std::rc::Rc;

use common::{Harness, Label, M, Ping, RecModule, RecPhase};
use tickstage::{GameError, Listeners, Manifest, Module, Priority};

struct Early;
impl Label for Early {
    const NAME: &'static str = "Early";
    const PRIORITY: Priority = Priority::Low;
}

struct Late;
impl Label for Late {
    const NAME: &'static str = "Late";
    const PRIORITY: Priority = Priority::High;
}

struct Watcher;
impl Label for Watcher {
    const NAME: &'static str = "Watcher";
    const PRIORITY: Priority = Priority::Monitor;
}

struct Canceller;
impl Label for Canceller {
    const NAME: &'static str = "Canceller";
    const PRIORITY: Priority = Priority::Lowest;
    const CANCELS: bool = true;
}

struct Skipper;
impl Label for Skipper {
    const NAME: &'static str = "Skipper";
    const PRIORITY: Priority = Priority::Highest;
    const IGNORE_CANCELLED: bool = true;
}

#[test]
fn shared_bus_routes_events_to_their_game() {
    let first = Harness::new(&["A", "B"]);
    let second = Harness::on_bus(Rc::clone(&first.bus));
    first.game.set_phase(RecPhase::new("A"));
    second.game.set_phase(RecPhase::new("B"));
    first.game.start().unwrap();
    second.game.start().unwrap();

    let mut ping = Ping::to(first.game.id());
    first.bus.publish(&mut ping);
    assert_eq!(ping.hits, ["A"]);

    let mut ping = Ping::to(second.game.id());
    second.game.publish(&mut ping);
    assert_eq!(ping.hits, ["B"]);

    let mut ping = Ping::global();
    first.bus.publish(&mut ping);
    assert_eq!(ping.hits, ["A", "B"]);
}

#[test]
fn stopping_one_game_leaves_the_other_listening() {
    let first = Harness::new(&["A", "B"]);
    let second = Harness::on_bus(Rc::clone(&first.bus));
    first.game.set_phase(RecPhase::new("A"));
    second.game.set_phase(RecPhase::new("B"));
    first.game.start().unwrap();
    second.game.start().unwrap();

    first.game.stop().unwrap();
    assert_eq!(first.bus.subscription_count_for("A"), 0);

    let mut ping = Ping::to(first.game.id());
    first.bus.publish(&mut ping);
    assert!(ping.hits.is_empty());

    let mut ping = Ping::global();
    first.bus.publish(&mut ping);
    assert_eq!(ping.hits, ["B"]);
}

#[test]
fn handlers_run_in_priority_order_across_owners() {
    let h = Harness::new(&[]);
    h.game.set_phase(
        RecPhase::new("A").needs(
            Manifest::new()
                .create::<RecModule<Watcher>>()
                .create::<RecModule<Late>>()
                .create::<RecModule<Early>>(),
        ),
    );
    h.game.start().unwrap();

    let mut ping = Ping::to(h.game.id());
    h.game.publish(&mut ping);
    assert_eq!(ping.hits, ["Early", "A", "Late", "Watcher"]);
}

#[test]
fn cancelled_events_skip_handlers_that_ignore_them() {
    let h = Harness::new(&[]);
    h.game.set_phase(
        RecPhase::new("A").needs(
            Manifest::new()
                .create::<RecModule<Skipper>>()
                .create::<RecModule<Canceller>>(),
        ),
    );
    h.game.start().unwrap();

    let mut ping = Ping::to(h.game.id());
    h.game.publish(&mut ping);
    assert!(ping.cancelled);
    assert_eq!(ping.hits, ["Canceller", "A"]);
}

#[test]
fn disabled_module_stops_receiving_and_is_rebound_on_return() {
    let h = Harness::new(&["M"]);
    let with_m = || RecPhase::new("A").needs(Manifest::new().create::<RecModule<M>>());
    h.game.set_phase(with_m());
    h.game.start().unwrap();

    let mut ping = Ping::global();
    h.game.publish(&mut ping);
    assert_eq!(ping.hits, ["M", "A"]);

    h.game.set_phase(RecPhase::new("B"));
    h.game.tick().unwrap();
    let mut ping = Ping::global();
    h.game.publish(&mut ping);
    assert_eq!(ping.hits, ["B"]);
    assert_eq!(h.bus.subscription_count_for("M"), 0);

    h.game.set_phase(with_m());
    h.game.tick().unwrap();
    assert_eq!(h.bus.subscription_count_for("M"), 1);
    let mut ping = Ping::global();
    h.game.publish(&mut ping);
    assert_eq!(ping.hits, ["M", "A"]);
    assert_eq!(common::count("M.register"), 1);
}

#[derive(Default)]
struct Faulty;

impl Module for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on::<Ping>(Priority::Low, |_, _, _| Err("cannot pong".into()))
    }
}

#[test]
fn handler_failures_without_a_caller_are_escalated() {
    let h = Harness::new(&[]);
    h.game
        .set_phase(RecPhase::new("A").needs(Manifest::new().create::<Faulty>()));
    h.game.start().unwrap();

    let mut ping = Ping::to(h.game.id());
    h.game.publish(&mut ping);
    // Later handlers still run.
    assert_eq!(ping.hits, ["A"]);

    let escalated = h.game.take_escalated();
    assert_eq!(escalated.len(), 1);
    assert!(matches!(
        &escalated[0],
        GameError::ModuleCallback { module, callback, .. } if module == "faulty" && callback == "Ping handler"
    ));
}

#[test]
fn handled_handler_failures_are_dropped() {
    let h = Harness::new(&[]);
    let failures = h.collect_failures();
    h.game
        .set_phase(RecPhase::new("A").needs(Manifest::new().create::<Faulty>()));
    h.game.start().unwrap();

    h.game.publish(&mut Ping::global());
    assert!(h.game.take_escalated().is_empty());
    assert_eq!(failures.borrow().len(), 1);
}

#[test]
fn failures_inside_a_tick_surface_from_that_tick() {
    let h = Harness::new(&[]);
    h.game.set_phase(
        RecPhase::new("A")
            .needs(Manifest::new().create::<Faulty>())
            .ticking(|game| game.publish(&mut Ping::to(game.id()))),
    );
    h.game.start().unwrap();

    let err = h.game.tick().unwrap_err();
    assert_eq!(err.category(), "module_callback");
    assert!(h.game.take_escalated().is_empty());
}
