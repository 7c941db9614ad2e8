//! Integration tests for handler dispatch through a live connection.
//!
//! Every test routes traffic through a [`TestHost`] connection with the
//! interceptor attached, so decisions are observed at the terminal stage.

use std::sync::{Arc, Mutex};

use log::Level;
use proptest::prelude::*;
use rstest::{fixture, rstest};
use serial_test::serial;
use wiretap::{
    Decision,
    Direction,
    HandlerError,
    HandlerRegistry,
    HandlerResult,
    Handlers,
    HandlerUnit,
    Message,
    MessageEvent,
    RegistryBuilder,
};
use wiretap_testing::{LoggerHandle, TestConnection, TestHost, logger};

#[derive(Debug, Clone)]
struct Chat {
    text: String,
}

impl Message for Chat {}

#[derive(Debug)]
struct Move {
    x: i32,
}

impl Message for Move {}

type Journal = Arc<Mutex<Vec<String>>>;

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
fn journal() -> Journal { Journal::default() }

fn note(journal: &Journal, entry: impl Into<String>) {
    journal.lock().expect("journal lock").push(entry.into());
}

fn entries(journal: &Journal) -> Vec<String> { journal.lock().expect("journal lock").clone() }

/// Attach an interceptor built from `builder` to a fresh client connection.
fn connect(builder: RegistryBuilder) -> (TestHost, TestConnection) {
    let host = TestHost::new();
    let interceptor = host.interceptor(builder.build());
    let client = host.connect([10, 0, 0, 1]);
    assert!(host.login(&interceptor, &client, "alex"));
    (host, client)
}

struct GgFilter;

impl HandlerUnit for GgFilter {
    fn register(&self, handlers: &mut Handlers<'_>) {
        handlers.on("no_gg", |event: &mut MessageEvent<'_, Chat>| {
            if event.payload().text == "gg" {
                event.cancel();
            }
        });
    }
}

#[rstest]
#[case("gg", Decision::Drop, 0)]
#[case("hi", Decision::Forward, 1)]
fn chat_filter_decides_delivery(
    #[case] text: &str,
    #[case] expected: Decision,
    #[case] delivered: usize,
) {
    let mut builder = HandlerRegistry::builder();
    builder.register(&GgFilter);
    let (_host, client) = connect(builder);

    let decision = client.send(Direction::Inbound, Chat { text: text.into() });

    assert_eq!(decision, expected);
    assert_eq!(client.terminal.received().len(), delivered);
}

#[rstest]
fn wildcard_handler_sees_every_type_in_delivery_order(journal: Journal) {
    let sink = Arc::clone(&journal);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        let sink = Arc::clone(&sink);
        h.on_any("record", move |event: &mut MessageEvent<'_, dyn Message>| {
            note(&sink, event.message_name());
        });
    });
    let (_host, client) = connect(builder);

    assert!(client.send(Direction::Inbound, Chat { text: "hi".into() }).is_forward());
    assert!(client.send(Direction::Outbound, Move { x: 3 }).is_forward());

    assert_eq!(entries(&journal), ["Chat", "Move"]);
    assert_eq!(client.terminal.received(), ["Chat", "Move"]);
}

#[rstest]
fn later_handler_observes_cancellation(journal: Journal) {
    let sink = Arc::clone(&journal);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        let sink = Arc::clone(&sink);
        h.on("h1", |event: &mut MessageEvent<'_, Chat>| event.cancel())
            .on("h2", move |event: &mut MessageEvent<'_, Chat>| {
                note(&sink, format!("h2 cancelled={}", event.is_cancelled()));
            });
    });
    let (_host, client) = connect(builder);

    let decision = client.send(Direction::Inbound, Chat { text: "hi".into() });

    assert_eq!(decision, Decision::Drop);
    assert_eq!(entries(&journal), ["h2 cancelled=true"]);
    assert!(client.terminal.received().is_empty());
}

#[rstest]
fn exact_handlers_run_before_wildcards(journal: Journal) {
    let sink = Arc::clone(&journal);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        let (a, b, c) = (Arc::clone(&sink), Arc::clone(&sink), Arc::clone(&sink));
        h.on_any("any_first", move |_: &mut MessageEvent<'_, dyn Message>| note(&a, "any_first"))
            .on("chat", move |_: &mut MessageEvent<'_, Chat>| note(&b, "chat"))
            .on_any("any_second", move |_: &mut MessageEvent<'_, dyn Message>| {
                note(&c, "any_second");
            });
    });
    let (_host, client) = connect(builder);

    let _ = client.send(Direction::Inbound, Chat { text: "hi".into() });
    let _ = client.send(Direction::Inbound, Move { x: 1 });

    assert_eq!(
        entries(&journal),
        ["chat", "any_first", "any_second", "any_first", "any_second"]
    );
}

#[rstest]
fn handler_edits_reach_the_terminal_stage() {
    let mut builder = HandlerRegistry::builder();
    builder.register(&|h: &mut Handlers<'_>| {
        h.on("teleport", |event: &mut MessageEvent<'_, Move>| {
            event.payload_mut().x += 100;
        });
    });
    let (_host, client) = connect(builder);

    let (decision, moved) = client.send_and_return(Direction::Outbound, Move { x: 5 });

    assert!(decision.is_forward());
    assert_eq!(moved.x, 105);
    assert_eq!(client.terminal.recorded()[0].rendered, "Move { x: 105 }");
}

#[rstest]
fn handlers_see_the_authenticated_client(journal: Journal) {
    let sink = Arc::clone(&journal);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        let sink = Arc::clone(&sink);
        h.on("who", move |event: &mut MessageEvent<'_, Chat>| {
            let name = event.client().map_or("?", |c| c.name.as_str());
            note(&sink, format!("{name}:{}", event.direction()));
        });
    });
    let (_host, client) = connect(builder);

    let _ = client.send(Direction::Outbound, Chat { text: "hi".into() });

    assert_eq!(entries(&journal), ["alex:outbound"]);
}

#[rstest]
#[serial(logger)]
fn failing_handlers_do_not_stop_the_chain(journal: Journal, mut logger: LoggerHandle) {
    let sink = Arc::clone(&journal);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        let (after_err, after_panic) = (Arc::clone(&sink), Arc::clone(&sink));
        h.on("err", |_: &mut MessageEvent<'_, Chat>| -> HandlerResult {
            Err(HandlerError::from("bad payload"))
        })
        .on("observer", move |event: &mut MessageEvent<'_, Chat>| {
            note(&after_err, format!("observer cancelled={}", event.is_cancelled()));
        })
        .on("boom", |event: &mut MessageEvent<'_, Chat>| -> HandlerResult {
            event.cancel();
            panic!("boom");
        })
        .on("last", move |event: &mut MessageEvent<'_, Chat>| {
            note(&after_panic, format!("last cancelled={}", event.is_cancelled()));
        });
    });
    let (_host, client) = connect(builder);

    let decision = client.send(Direction::Inbound, Chat { text: "hi".into() });

    assert_eq!(decision, Decision::Forward);
    assert_eq!(
        entries(&journal),
        ["observer cancelled=false", "last cancelled=false"]
    );
    let records = logger.drain();
    assert!(records.iter().any(|r| {
        r.level() == Level::Warn
            && r.args().contains("handler failed")
            && r.args().contains("handler=err")
            && r.args().contains("bad payload")
    }));
    assert!(records.iter().any(|r| {
        r.level() == Level::Error
            && r.args().contains("handler panicked")
            && r.args().contains("handler=boom")
    }));
}

#[rstest]
#[serial(logger)]
fn failure_after_cancel_keeps_the_drop(mut logger: LoggerHandle) {
    let mut builder = HandlerRegistry::builder();
    builder.register(&|h: &mut Handlers<'_>| {
        h.on("cancel", |event: &mut MessageEvent<'_, Chat>| event.cancel())
            .on("boom", |event: &mut MessageEvent<'_, Chat>| -> HandlerResult {
                event.set_cancelled(false);
                panic!("boom");
            });
    });
    let (_host, client) = connect(builder);

    assert_eq!(
        client.send(Direction::Inbound, Chat { text: "hi".into() }),
        Decision::Drop
    );
    assert!(logger.contains(Level::Error, "handler panicked"));
}

#[rstest]
#[serial(logger)]
fn duplicate_labels_are_reported_and_skipped(mut logger: LoggerHandle) {
    let mut builder = HandlerRegistry::builder();
    builder.register(&|h: &mut Handlers<'_>| {
        h.on("filter", |event: &mut MessageEvent<'_, Chat>| event.cancel())
            .on("filter", |_: &mut MessageEvent<'_, Chat>| {})
            .on("", |_: &mut MessageEvent<'_, Move>| {});
    });
    assert_eq!(builder.errors().len(), 2);
    let registry = builder.build();

    assert_eq!(registry.len(), 1);
    assert!(logger.contains(Level::Warn, "filter"));
}

/// Build handlers whose cancel flags follow `plan`, recording the flag each
/// one observes.
fn planned_builder(plan: &[bool], seen: &Arc<Mutex<Vec<(usize, bool)>>>) -> RegistryBuilder {
    let plan = plan.to_vec();
    let seen = Arc::clone(seen);
    let mut builder = HandlerRegistry::builder();
    builder.register(&move |h: &mut Handlers<'_>| {
        for (index, cancels) in plan.iter().copied().enumerate() {
            let seen = Arc::clone(&seen);
            h.on(&format!("h{index}"), move |event: &mut MessageEvent<'_, Chat>| {
                seen.lock().expect("seen lock").push((index, event.is_cancelled()));
                if cancels {
                    event.cancel();
                }
            });
        }
    });
    builder
}

proptest! {
    #[test]
    fn handlers_run_in_order_and_cancellation_is_monotonic(
        plan in proptest::collection::vec(any::<bool>(), 0..12),
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (_host, client) = connect(planned_builder(&plan, &seen));

        let decision = client.send(Direction::Inbound, Chat { text: "x".into() });

        let seen = seen.lock().expect("seen lock").clone();
        let order: Vec<usize> = seen.iter().map(|(i, _)| *i).collect();
        prop_assert_eq!(order, (0..plan.len()).collect::<Vec<_>>());
        for (index, observed) in &seen {
            let expected = plan[..*index].iter().any(|c| *c);
            prop_assert_eq!(*observed, expected);
        }
        prop_assert_eq!(decision == Decision::Drop, plan.iter().any(|c| *c));
    }
}
