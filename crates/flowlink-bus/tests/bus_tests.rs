//! Tests for the event bus.
//!
//! Verifies:
//! - Subscribe / unsubscribe bookkeeping and listener counts
//! - One-shot handlers fire at most once, even on re-entrant emit
//! - Handler failures are isolated and re-surfaced as `error` events
//! - Wildcard matching and dispatch order
//! - History bounds and pattern queries
//! - `wait_for` timeouts leave no lingering registration
//! - `emit_async` settles every handler before returning

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowlink_bus::*;
use serde_json::json;

fn counter() -> (Arc<AtomicUsize>, impl Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move |_: &BusEvent| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

// ═══════════════════════════════════════════════════════════════
// Registration bookkeeping
// ═══════════════════════════════════════════════════════════════

#[test]
fn listener_count_tracks_on_once_and_unsubscribe() {
    let bus = EventBus::new();
    let a = bus.on("task.done", |_| Ok(()));
    let b = bus.on("task.done", |_| Ok(()));
    let c = bus.once("task.done", |_| Ok(()));
    assert_eq!(bus.listener_count("task.done"), 3);

    assert!(b.unsubscribe());
    assert_eq!(bus.listener_count("task.done"), 2);

    assert!(c.unsubscribe());
    assert_eq!(bus.listener_count("task.done"), 1);

    assert!(bus.off("task.done", a.id()));
    assert_eq!(bus.listener_count("task.done"), 0);
    assert!(bus.event_names().is_empty());
}

#[test]
fn unsubscribe_twice_is_a_noop() {
    let bus = EventBus::new();
    let sub = bus.on("x", |_| Ok(()));
    let id = sub.id();
    assert!(sub.unsubscribe());
    assert!(!bus.off("x", id));
}

#[test]
fn off_requires_matching_event_name() {
    let bus = EventBus::new();
    let sub = bus.on("x", |_| Ok(()));
    assert!(!bus.off("y", sub.id()));
    assert!(!bus.off_wildcard("x", sub.id()));
    assert_eq!(bus.listener_count("x"), 1);
}

#[test]
fn wildcards_count_towards_matching_events_only() {
    let bus = EventBus::new();
    bus.on("user.created", |_| Ok(())).id();
    let w = bus.on_wildcard("user.*", |_| Ok(())).unwrap();
    assert_eq!(bus.listener_count("user.created"), 2);
    assert_eq!(bus.listener_count("user.deleted"), 1);
    assert_eq!(bus.listener_count("user"), 0);
    assert_eq!(bus.listener_count("admin.user.created"), 0);

    assert!(bus.off_wildcard("user.*", w.id()));
    assert_eq!(bus.listener_count("user.deleted"), 0);
}

#[test]
fn event_names_lists_exact_registrations_only() {
    let bus = EventBus::new();
    bus.on("b", |_| Ok(()));
    bus.once("a", |_| Ok(()));
    bus.on_wildcard("c.*", |_| Ok(())).unwrap();
    assert_eq!(bus.event_names(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn remove_all_listeners_for_one_event() {
    let bus = EventBus::new();
    bus.on("job", |_| Ok(()));
    bus.once("job", |_| Ok(()));
    bus.on_wildcard("job", |_| Ok(())).unwrap();
    bus.on_wildcard("jo?", |_| Ok(())).unwrap();
    bus.on("other", |_| Ok(()));

    bus.remove_all_listeners(Some("job"));
    // Only the differently-spelled wildcard survives for "job".
    assert_eq!(bus.listener_count("job"), 1);
    assert_eq!(bus.listener_count("other"), 1);

    bus.remove_all_listeners(None);
    assert_eq!(bus.listener_count("job"), 0);
    assert_eq!(bus.listener_count("other"), 0);
    assert_eq!(bus.stats().total_handlers, 0);
}

// ═══════════════════════════════════════════════════════════════
// Dispatch
// ═══════════════════════════════════════════════════════════════

#[test]
fn emit_delivers_payload_and_counts_handlers() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.on("agent.spawned", move |e| {
        s.lock().unwrap().push(e.payload.clone());
        Ok(())
    });
    let (count, handler) = counter();
    bus.on_wildcard("agent.*", handler).unwrap();

    let invoked = bus.emit("agent.spawned", json!({"name": "coder"}));
    assert_eq!(invoked, 2);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().unwrap()[0]["name"], "coder");
}

#[test]
fn emit_without_listeners_returns_zero() {
    let bus = EventBus::new();
    assert_eq!(bus.emit("nobody.listens", json!(null)), 0);
}

#[test]
fn dispatch_order_is_persistent_then_once_then_wildcard() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = Arc::clone(&order);
    bus.on_wildcard("*", move |_| {
        o.lock().unwrap().push("wildcard");
        Ok(())
    })
    .unwrap();
    let o = Arc::clone(&order);
    bus.once("tick", move |_| {
        o.lock().unwrap().push("once");
        Ok(())
    });
    let o = Arc::clone(&order);
    bus.on("tick", move |_| {
        o.lock().unwrap().push("first");
        Ok(())
    });
    let o = Arc::clone(&order);
    bus.on("tick", move |_| {
        o.lock().unwrap().push("second");
        Ok(())
    });

    bus.emit("tick", json!(null));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "once", "wildcard"]);
}

#[test]
fn once_fires_exactly_once_even_when_reemitting() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&count);
    let inner = bus.clone();
    bus.once("boot", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        inner.emit("boot", json!(null));
        Ok(())
    });

    assert_eq!(bus.emit("boot", json!(null)), 1);
    assert_eq!(bus.emit("boot", json!(null)), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count("boot"), 0);
}

#[test]
fn failing_handlers_do_not_stop_siblings_or_escape() {
    let bus = EventBus::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&errors);
    bus.on(ERROR_EVENT, move |event| {
        let failure: HandlerFailure = serde_json::from_value(event.payload.clone()).unwrap();
        e.lock().unwrap().push(failure);
        Ok(())
    });

    bus.on("save", |_| Err("disk full".into()));
    bus.on("save", |_| panic!("kaboom"));
    let (count, handler) = counter();
    bus.on("save", handler);
    let (once_count, once_handler) = counter();
    bus.once("save", once_handler);

    let before = bus.listener_count("save");
    let invoked = bus.emit("save", json!(null));
    assert_eq!(invoked, 4);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(once_count.load(Ordering::SeqCst), 1);
    // Persistent handlers stay, the fired one-shot is gone.
    assert_eq!(bus.listener_count("save"), before - 1);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|f| f.event == "save"));
    assert!(errors.iter().any(|f| f.error == "disk full"));
    assert!(errors.iter().any(|f| f.error.contains("kaboom")));
}

#[test]
fn failing_wildcard_handler_reports_its_pattern() {
    let bus = EventBus::new();
    let captured = Arc::new(Mutex::new(None));
    let c = Arc::clone(&captured);
    bus.on(ERROR_EVENT, move |event| {
        *c.lock().unwrap() = Some(event.payload.clone());
        Ok(())
    });
    bus.on_wildcard("swarm.*", |_| Err("bad".into())).unwrap();

    bus.emit("swarm.init", json!(null));
    let payload = captured.lock().unwrap().clone().unwrap();
    assert_eq!(payload["pattern"], "swarm.*");
    assert_eq!(payload["event"], "swarm.init");
}

#[test]
fn failing_error_handler_does_not_recurse() {
    let bus = EventBus::new();
    let (count, _) = counter();
    let c = Arc::clone(&count);
    bus.on(ERROR_EVENT, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Err("error handler broke".into())
    });
    bus.on("work", |_| Err("first failure".into()));

    bus.emit("work", json!(null));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn handlers_may_subscribe_during_dispatch() {
    let bus = EventBus::new();
    let inner = bus.clone();
    bus.on("grow", move |_| {
        inner.on("grow", |_| Ok(()));
        Ok(())
    });
    // The registration added mid-dispatch is not part of this emission.
    assert_eq!(bus.emit("grow", json!(null)), 1);
    assert_eq!(bus.listener_count("grow"), 2);
}

// ═══════════════════════════════════════════════════════════════
// History
// ═══════════════════════════════════════════════════════════════

#[test]
fn history_is_bounded_fifo() {
    let bus = EventBus::with_history_capacity(3);
    for i in 0..5 {
        bus.emit(&format!("e{i}"), json!(i));
    }
    let names: Vec<String> = bus.event_history(10).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["e2", "e3", "e4"]);

    let last: Vec<String> = bus.event_history(1).into_iter().map(|e| e.name).collect();
    assert_eq!(last, vec!["e4"]);
}

#[test]
fn history_records_have_unique_ids() {
    let bus = EventBus::new();
    bus.emit("a", json!(null));
    bus.emit("a", json!(null));
    let history = bus.event_history(2);
    assert_ne!(history[0].id, history[1].id);
    assert!(history[0].timestamp <= history[1].timestamp);
}

#[test]
fn events_by_pattern_filters_history() {
    let bus = EventBus::new();
    bus.emit("user.created", json!(1));
    bus.emit("task.created", json!(2));
    bus.emit("user.deleted", json!(3));
    bus.emit("user.updated", json!(4));

    let users = bus.events_by_pattern("user.*", 2).unwrap();
    let payloads: Vec<_> = users.iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![json!(3), json!(4)]);

    bus.clear_history();
    assert!(bus.event_history(10).is_empty());
}

#[test]
fn stats_summarise_registrations() {
    let bus = EventBus::new();
    bus.on("a", |_| Ok(()));
    bus.on("a", |_| Ok(()));
    bus.once("b", |_| Ok(()));
    bus.on_wildcard("c.*", |_| Ok(())).unwrap();
    bus.emit("z", json!(null));

    let stats = bus.stats();
    assert_eq!(stats.regular_events, 1);
    assert_eq!(stats.once_events, 1);
    assert_eq!(stats.wildcard_patterns, 1);
    assert_eq!(stats.total_handlers, 4);
    assert_eq!(stats.history_size, 1);
}

// ═══════════════════════════════════════════════════════════════
// wait_for
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn wait_for_resolves_with_next_payload() {
    let bus = EventBus::new();
    let emitter = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        emitter.emit("ready", json!({"port": 9370}));
    });

    let payload = bus.wait_for("ready", Duration::from_secs(5)).await.unwrap();
    assert_eq!(payload["port"], 9370);
    assert_eq!(bus.listener_count("ready"), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_for_times_out_and_unsubscribes() {
    let bus = EventBus::new();
    let err = bus.wait_for("never", Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, BusError::Timeout { ref event, .. } if event == "never"));
    assert_eq!(bus.listener_count("never"), 0);
    // A later emission reaches nobody.
    assert_eq!(bus.emit("never", json!(null)), 0);
}

#[tokio::test]
async fn wait_for_is_cancelled_when_listeners_are_cleared() {
    let bus = EventBus::new();
    let clearer = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        clearer.remove_all_listeners(None);
    });
    let err = bus.wait_for("gone", Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, BusError::Cancelled { .. }));
}

// ═══════════════════════════════════════════════════════════════
// emit_async
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn emit_async_waits_for_every_handler() {
    let bus = EventBus::new();
    let done = Arc::new(AtomicUsize::new(0));

    for delay in [30u64, 10, 20] {
        let d = Arc::clone(&done);
        bus.on_async("flush", move |_| {
            let d = Arc::clone(&d);
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                d.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(())
            }
        });
    }
    let (count, handler) = counter();
    bus.on("flush", handler);

    let invoked = bus.emit_async("flush", json!(null)).await;
    assert_eq!(invoked, 4);
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn emit_async_runs_handlers_concurrently() {
    let bus = EventBus::new();
    for _ in 0..3 {
        bus.on_async("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            HandlerResult::Ok(())
        });
    }
    let started = std::time::Instant::now();
    bus.emit_async("slow", json!(null)).await;
    assert!(started.elapsed() < Duration::from_millis(290));
}

#[tokio::test]
async fn emit_async_surfaces_rejections_as_error_events() {
    let bus = EventBus::new();
    let (errors, handler) = counter();
    bus.on(ERROR_EVENT, handler);

    bus.on_async("sync", |_| async {
        let outcome: HandlerResult = Err("remote refused".into());
        outcome
    });
    bus.on_async("sync", |_| async {
        let outcome: HandlerResult = Ok(());
        if outcome.is_ok() {
            panic!("async kaboom");
        }
        outcome
    });
    bus.on("sync", |_| Err("sync refused".into()));
    let (ok, ok_handler) = counter();
    bus.on("sync", ok_handler);

    let invoked = bus.emit_async("sync", json!(null)).await;
    assert_eq!(invoked, 4);
    assert_eq!(ok.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn emit_spawns_async_handlers() {
    let bus = EventBus::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    bus.on_async("later", move |event| {
        let sender = tx.lock().unwrap().take();
        async move {
            if let Some(sender) = sender {
                let _ = sender.send(event.payload);
            }
            HandlerResult::Ok(())
        }
    });

    assert_eq!(bus.emit("later", json!("hello")), 1);
    let payload = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    assert_eq!(payload, "hello");
}
