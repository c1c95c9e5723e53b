//! Integration tests for router lifecycle and the control handle
//!
//! These tests validate:
//! - Initialization order and reverse-order teardown
//! - Resource cleanup after a failed start
//! - Configuration errors reported together
//! - Handler calls from another thread while the router runs

mod common;

use common::builders::RouterBuilder;
use common::fixtures::{EventLog, Lifecycle};
use common::wait_until;
use pktgraph::config::{ConnectionDecl, ElementDecl, RouterConfig};
use pktgraph::router::{ArgValue, HandlerError, RouterState};
use pktgraph::{args, ElementRegistry, Router, RouterError};
use std::thread;

#[test]
fn test_elements_start_in_order_and_stop_in_reverse() {
    let log = EventLog::default();
    let (mut router, _) = RouterBuilder::new()
        .element("a", Lifecycle::new(&log))
        .element("b", Lifecycle::new(&log))
        .element("c", Lifecycle::new(&log))
        .start();
    assert_eq!(router.state(), RouterState::Live);
    assert_eq!(router.timers().len(), 3);

    router.uninitialize();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["init a", "init b", "init c", "uninit c", "uninit b", "uninit a"]
    );
    assert_eq!(router.state(), RouterState::Dead);
    assert!(router.timers().is_empty());
}

#[test]
fn test_failed_start_tears_down_what_started() {
    let log = EventLog::default();
    let (mut router, _) = RouterBuilder::new()
        .element("a", Lifecycle::new(&log))
        .element("b", Lifecycle::new(&log))
        .element("bad", Lifecycle::failing(&log))
        .element("d", Lifecycle::new(&log))
        .build();

    match router.initialize() {
        Err(RouterError::Init(e)) => assert!(e.to_string().contains("device busy")),
        other => panic!("expected an init error, got {other:?}"),
    }
    assert_eq!(
        *log.lock().unwrap(),
        vec!["init a", "init b", "init bad", "uninit b", "uninit a"]
    );
    assert_eq!(router.state(), RouterState::Dead);
    assert!(router.timers().is_empty());
    assert!(matches!(
        router.initialize(),
        Err(RouterError::AlreadyInitialized)
    ));
}

#[test]
fn test_every_configuration_error_is_reported() {
    let (mut router, _) = RouterBuilder::new()
        .class("src", "InfiniteSource", args![])
        .class("q", "Queue", args!["big"])
        .class("cb", "CompareBlock", args![1_i64])
        .class("a", "Discard", args![])
        .class("b", "Discard", args![])
        .connect("src", "q")
        .connect("q", "cb")
        .connect_ports("cb", 0, "a", 0)
        .connect_ports("cb", 1, "b", 0)
        .build();

    match router.initialize() {
        Err(RouterError::Configuration(errors)) => {
            let elements: Vec<_> = errors.iter().map(|e| e.element.as_str()).collect();
            assert_eq!(elements, vec!["q", "cb"]);
            assert_eq!(errors[0].class, "Queue");
            assert!(errors[1].to_string().starts_with("cb :: CompareBlock"));
        }
        other => panic!("expected configuration errors, got {other:?}"),
    }
    assert_eq!(router.state(), RouterState::New);
}

#[test]
fn test_from_config_rejects_unknown_class() {
    let config = RouterConfig::new()
        .element(ElementDecl::new("src", "InfiniteSource"))
        .element(ElementDecl::new("fw", "Firewall"));

    match Router::from_config(&config, &ElementRegistry::with_builtins()) {
        Err(RouterError::UnknownClass { element, class }) => {
            assert_eq!(element, "fw");
            assert_eq!(class, "Firewall");
        }
        other => panic!("expected an unknown class, got {other:?}"),
    }
}

#[test]
fn test_from_config_rejects_bad_settings() {
    let mut config = RouterConfig::new();
    config.settings.tasks_per_iteration = 0;

    assert!(matches!(
        Router::from_config(&config, &ElementRegistry::with_builtins()),
        Err(RouterError::InvalidSettings(_))
    ));
}

#[test]
fn test_handle_reaches_running_router() {
    let config = RouterConfig::new()
        .element(
            ElementDecl::new("src", "TimedSource").with_args(vec![ArgValue::Float(0.01)]),
        )
        .element(ElementDecl::new("c", "Counter"))
        .element(ElementDecl::new("sink", "Discard"))
        .connect(ConnectionDecl::new("src", "c"))
        .connect(ConnectionDecl::new("c", "sink"));

    let mut router = Router::from_config(&config, &ElementRegistry::with_builtins()).unwrap();
    router.initialize().unwrap();
    let handle = router.handle();

    let worker = thread::spawn(move || {
        router.run().unwrap();
        router
    });

    let count = |h: &pktgraph::RouterHandle| -> u64 {
        h.read("c.count").unwrap().parse().unwrap()
    };
    assert!(wait_until(|| count(&handle) >= 3));

    handle.write("c.reset", "").unwrap();
    assert!(count(&handle) < 3);
    assert!(matches!(
        handle.read("nobody.count"),
        Err(HandlerError::NoSuchElement(_))
    ));
    assert_eq!(handle.read("sink.class").unwrap(), "Discard");

    assert!(handle.stop());
    let router = worker.join().unwrap();
    assert!(router.stop_requested());
    drop(router);
    assert!(matches!(
        handle.read("c.count"),
        Err(HandlerError::Disconnected)
    ));
}

#[test]
fn test_run_returns_once_every_handle_is_dropped() {
    let (mut router, _) = RouterBuilder::new()
        .class("src", "InfiniteSource", args!["x", 2_i64])
        .class("sink", "Discard", args![])
        .connect("src", "sink")
        .start();
    let handle = router.handle();
    let spare = handle.clone();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let worker = thread::spawn(move || {
        router.run().unwrap();
        done_tx.send(()).unwrap();
        router
    });

    // Nothing is scheduled, so only the handles keep the router waiting.
    assert!(wait_until(|| handle.read("sink.count").unwrap() == "2"));
    drop(spare);
    assert_eq!(handle.read("src.count").unwrap(), "2");
    drop(handle);

    assert!(done_rx.recv_timeout(common::test_timeout()).is_ok());
    let router = worker.join().unwrap();
    assert!(!router.stop_requested());
}
