// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::needless_pass_by_value)] // Test functions
#![allow(clippy::redundant_closure_for_method_calls)] // Test code clarity

//! Connection lifecycle integration tests
//!
//! Drives the manager with scripted connectors, both with background workers
//! and with caller-driven `maintain()`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ctrlbox::{
    ConnectedCallback, ConnectionDiscovery, ConnectionError, ConnectionEvent, ConnectionManager,
    Connector,
    ConnectorFactory, DriveMode, Error, EventAggregator, MaintainedConnection, ManagedDiscovery,
    ManagerConfig, PeriodRetryStrategy, ResourceDiscovery, ResourceEvent, ResourceKey, Result,
    RetryStrategy,
};
use parking_lot::Mutex;

// ============================================================================
// Helpers
// ============================================================================

/// Connector counting connects and tracking how many connectors sharing the
/// same `active` counter are connected at once.
struct Gauge {
    connected: AtomicBool,
    available: AtomicBool,
    connects: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    fn new() -> Arc<Self> {
        Self::shared(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
    }

    fn shared(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            available: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            active,
            peak,
        })
    }
}

impl Connector for Gauge {
    fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Delegates to a [`Gauge`] but takes its time answering `is_available()`,
/// widening the window in which a connect is in flight.
struct Sluggish {
    inner: Arc<Gauge>,
    delay: Duration,
}

impl Connector for Sluggish {
    fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    fn disconnect(&self) {
        self.inner.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_available(&self) -> bool {
        thread::sleep(self.delay);
        self.inner.is_available()
    }
}

/// Refuses every connect and remembers which thread asked.
#[derive(Default)]
struct Refusing {
    callers: Mutex<Vec<ThreadId>>,
}

impl Connector for Refusing {
    fn connect(&self) -> Result<()> {
        self.callers.lock().push(thread::current().id());
        Err(ConnectionError::new("connection refused").into())
    }

    fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn background() -> ManagerConfig {
    ManagerConfig::default()
        .with_retry_period(Duration::from_millis(20))
        .with_idle_interval(Duration::from_millis(5))
}

fn external() -> ManagerConfig {
    ManagerConfig::default()
        .with_drive(DriveMode::External)
        .with_retry_period(Duration::ZERO)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn collect(manager: &ConnectionManager) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.add_listener(move |e| sink.lock().push(e.clone()));
    events
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_available_twice_same_connector_is_idempotent() {
    let manager = ConnectionManager::new(background());
    let gauge = Gauge::new();
    manager.available("dev1".into(), gauge.clone());
    assert!(wait_until(|| gauge.is_connected()));

    manager.available("dev1".into(), gauge.clone());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(manager.len(), 1);
    assert_eq!(gauge.connects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_replacement_never_overlaps_workers() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let first = Gauge::shared(active.clone(), peak.clone());
    let second = Gauge::shared(active.clone(), peak.clone());

    let manager = ConnectionManager::new(background());
    manager.available("dev1".into(), first.clone());
    assert!(wait_until(|| first.is_connected()));

    manager.available("dev1".into(), second.clone());
    // the old worker is gone by the time available() returns
    assert!(!first.is_connected());
    let first_connects = first.connects.load(Ordering::SeqCst);

    assert!(wait_until(|| second.is_connected()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(first.connects.load(Ordering::SeqCst), first_connects);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_unavailable_disconnects_and_removes() {
    let manager = ConnectionManager::new(background());
    let gauge = Gauge::new();
    manager.available("dev1".into(), gauge.clone());
    assert!(wait_until(|| gauge.is_connected()));

    manager.unavailable(&"dev1".into());
    assert!(!gauge.is_connected());
    assert!(!manager.connections().contains_key("dev1"));

    // unknown key
    manager.unavailable(&"dev1".into());
    manager.unavailable(&"never-seen".into());
    assert!(manager.is_empty());
}

#[test]
fn test_independent_resources() {
    let manager = Arc::new(ConnectionManager::new(background()));
    let a = Gauge::new();
    let b = Gauge::new();

    let handles: Vec<_> = [("A", a.clone()), ("B", b.clone())]
        .into_iter()
        .map(|(key, gauge)| {
            let m = manager.clone();
            thread::spawn(move || m.available(key.into(), gauge))
        })
        .collect();
    for h in handles {
        h.join().expect("available");
    }

    assert!(wait_until(|| a.is_connected() && b.is_connected()));
    assert_eq!(manager.len(), 2);

    manager.unavailable(&"A".into());
    assert!(!a.is_connected());
    assert!(b.is_connected());
    assert!(manager.contains(&"B".into()));
    assert_eq!(b.connects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_stops_all() {
    let manager = ConnectionManager::new(background());
    let gauges: Vec<_> = (0..4).map(|_| Gauge::new()).collect();
    for (i, p) in gauges.iter().enumerate() {
        manager.available(ResourceKey::new(format!("dev{}", i)), p.clone());
    }
    assert!(wait_until(|| gauges.iter().all(|p| p.is_connected())));

    manager.shutdown();
    assert!(manager.is_empty());
    assert!(gauges.iter().all(|p| !p.is_connected()));
}

#[test]
fn test_unavailable_during_external_maintain_leaves_disconnected() {
    let manager = Arc::new(ConnectionManager::new(external()));
    let gauge = Gauge::new();
    let slow = Arc::new(Sluggish {
        inner: gauge.clone(),
        delay: Duration::from_millis(200),
    });
    manager.available("r".into(), slow);

    let m = manager.clone();
    let driver = thread::spawn(move || m.maintain(Instant::now()));
    thread::sleep(Duration::from_millis(50));

    manager.unavailable(&"r".into());
    assert!(!manager.contains(&"r".into()));
    assert!(!gauge.is_connected());

    driver.join().expect("maintain");
    assert!(!gauge.is_connected());
    assert!(gauge.connects.load(Ordering::SeqCst) <= 1);
}

#[test]
fn test_background_maintain_never_touches_connectors() {
    let config = ManagerConfig::default().with_retry_period(Duration::from_millis(1));
    let manager = ConnectionManager::new(config);
    let refusing = Arc::new(Refusing::default());
    manager.available("r".into(), refusing.clone());

    for _ in 0..200 {
        manager.maintain(Instant::now());
    }
    assert!(wait_until(|| !refusing.callers.lock().is_empty()));

    let here = thread::current().id();
    assert!(refusing.callers.lock().iter().all(|id| *id != here));
    manager.shutdown();
}

// ============================================================================
// Worker stop and failure
// ============================================================================

#[test]
fn test_stop_timeout_abandons_blocked_worker() {
    let entered = Arc::new(AtomicBool::new(false));
    let flag = entered.clone();
    let callback: ConnectedCallback = Arc::new(move |_: &MaintainedConnection| -> Result<()> {
        flag.store(true, Ordering::SeqCst);
        // not woken by a stop request
        thread::sleep(Duration::from_secs(2));
        Ok(())
    });

    let config = background().with_stop_timeout(Duration::from_millis(200));
    let manager = ConnectionManager::with_connected_loop(config, callback);
    let gauge = Gauge::new();
    manager.available("dev1".into(), gauge.clone());
    assert!(wait_until(|| entered.load(Ordering::SeqCst)));

    let start = Instant::now();
    manager.unavailable(&"dev1".into());
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(200), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "returned after {:?}", elapsed);
    assert!(!manager.contains(&"dev1".into()));
    assert!(!gauge.is_connected());
}

#[test]
fn test_panicking_worker_is_reaped() {
    let callback: ConnectedCallback = Arc::new(|conn: &MaintainedConnection| -> Result<()> {
        if conn.resource().as_str() == "bad" {
            panic!("controller state corrupted");
        }
        thread::sleep(Duration::from_millis(5));
        Ok(())
    });

    let manager = ConnectionManager::with_connected_loop(background(), callback);
    let bad = Gauge::new();
    let good = Gauge::new();
    manager.available("bad".into(), bad.clone());
    manager.available("good".into(), good.clone());

    assert!(wait_until(|| {
        manager.update();
        !manager.contains(&"bad".into())
    }));
    assert!(!bad.is_connected());

    assert!(manager.contains(&"good".into()));
    assert!(wait_until(|| good.is_connected()));
    thread::sleep(Duration::from_millis(50));
    manager.update();
    assert!(good.is_connected());
    assert_eq!(good.connects.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn test_period_retry_window() {
    let period = Duration::from_secs(2);
    let mut strategy = PeriodRetryStrategy::new(period);
    let t0 = Instant::now();
    assert!(strategy.evaluate(t0).is_zero());
    assert!(!strategy.evaluate(t0 + Duration::from_millis(1500)).is_zero());
    assert!(strategy.evaluate(t0 + period).is_zero());
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_events_from_many_threads_drained_once_in_order() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    let aggregator = EventAggregator::new();
    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let sink = aggregator.sink();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    sink.push(ConnectionEvent::ConnectorConnected {
                        resource: ResourceKey::new(format!("{}:{}", t, i)),
                    });
                }
            })
        })
        .collect();
    for p in producers {
        p.join().expect("producer");
    }

    let mut seen = Vec::new();
    let delivered = aggregator.drain_and_dispatch(|e| seen.push(e.resource().to_string()));
    assert_eq!(delivered, THREADS * PER_THREAD);
    assert_eq!(seen.len(), THREADS * PER_THREAD);

    // per-producer order preserved
    for t in 0..THREADS {
        let prefix = format!("{}:", t);
        let order: Vec<usize> = seen
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|i| i.parse().ok())
            .collect();
        assert_eq!(order, (0..PER_THREAD).collect::<Vec<_>>());
    }

    assert_eq!(aggregator.drain_and_dispatch(|_| {}), 0);
}

#[test]
fn test_events_buffered_until_update() {
    let manager = ConnectionManager::new(external());
    let gauge = Gauge::new();
    manager.available("dev1".into(), gauge.clone());
    manager.maintain(Instant::now());
    manager.unavailable(&"dev1".into());

    // registered after the events were produced
    let events = collect(&manager);
    assert!(events.lock().is_empty());
    assert_eq!(manager.update(), 2);
    assert_eq!(
        *events.lock(),
        vec![
            ConnectionEvent::ConnectorConnected {
                resource: "dev1".into()
            },
            ConnectionEvent::ConnectorDisconnected {
                resource: "dev1".into()
            },
        ]
    );
}

// ============================================================================
// Scenarios
// ============================================================================

struct OneShot {
    events: Vec<ResourceEvent<u32>>,
}

impl ResourceDiscovery for OneShot {
    type Descriptor = u32;

    fn update(&mut self) -> Vec<ResourceEvent<u32>> {
        std::mem::take(&mut self.events)
    }
}

#[test]
fn test_unavailable_connector_never_connects() {
    let gauge = Gauge::new();
    gauge.available.store(false, Ordering::SeqCst);

    let handed_out = gauge.clone();
    let factory: ConnectorFactory<u32> = Box::new(move |_: &u32| {
        let connector: Arc<dyn Connector> = handed_out.clone();
        Some(connector)
    });
    let mut discovery = ConnectionDiscovery::new(
        OneShot {
            events: vec![ResourceEvent::Available {
                key: "dev1".into(),
                descriptor: 7,
            }],
        },
        factory,
    );

    let manager = Arc::new(ConnectionManager::new(external()));
    let events = collect(&manager);
    discovery.attach(manager.clone());
    discovery.update();
    assert!(manager.contains(&"dev1".into()));

    for _ in 0..10 {
        manager.maintain(Instant::now());
        manager.update();
    }
    assert_eq!(gauge.connects.load(Ordering::SeqCst), 0);
    assert!(events.lock().is_empty());

    gauge.available.store(true, Ordering::SeqCst);
    manager.maintain(Instant::now());
    manager.update();
    assert_eq!(gauge.connects.load(Ordering::SeqCst), 1);
    assert_eq!(events.lock().len(), 1);
}

#[test]
fn test_callback_failure_after_three_iterations() {
    let iterations = Arc::new(AtomicUsize::new(0));
    let counted = iterations.clone();
    let callback: ConnectedCallback = Arc::new(move |_: &MaintainedConnection| -> Result<()> {
        if counted.fetch_add(1, Ordering::SeqCst) == 3 {
            return Err(Error::Protocol("controller stopped answering".into()));
        }
        Ok(())
    });

    // long retry period: the loop parks in its retry wait after the failure
    let config = ManagerConfig::default().with_retry_period(Duration::from_secs(60));
    let manager = ConnectionManager::with_connected_loop(config, callback);
    let events = collect(&manager);
    let gauge = Gauge::new();
    manager.available("dev1".into(), gauge.clone());

    assert!(wait_until(|| {
        manager.update();
        events.lock().len() >= 2
    }));
    thread::sleep(Duration::from_millis(50));
    manager.update();

    assert_eq!(iterations.load(Ordering::SeqCst), 4);
    assert_eq!(
        *events.lock(),
        vec![
            ConnectionEvent::ConnectorConnected {
                resource: "dev1".into()
            },
            ConnectionEvent::ConnectorDisconnected {
                resource: "dev1".into()
            },
        ]
    );

    let records = manager.records();
    let record = &records["dev1"];
    assert!(record.worker().is_running());
    assert!(!record.has_failed());
    assert!(!gauge.is_connected());
}

#[test]
fn test_worker_failure_is_isolated() {
    struct Broken;

    impl Connector for Broken {
        fn connect(&self) -> Result<()> {
            Err(Error::Unexpected("bad firmware".into()))
        }
        fn disconnect(&self) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    let manager = ConnectionManager::new(background());
    let healthy = Gauge::new();
    manager.available("broken".into(), Arc::new(Broken));
    manager.available("healthy".into(), healthy.clone());

    assert!(wait_until(|| {
        manager.update();
        !manager.contains(&"broken".into())
    }));
    assert!(manager.contains(&"healthy".into()));
    assert!(wait_until(|| healthy.is_connected()));
}
