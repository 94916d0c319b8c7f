//! Tests for the poll scheduler.

use super::*;
use crate::status::{self, StatusError};
use crate::storage::MemoryStore;
use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::time::timeout;

const GOOD: &str = r#"{
    "spread": 2, "bid": 10, "asset": "BTC", "currency": "USD",
    "balance": {"BTC": {"consolidated": 5, "total": 3}, "USD": {"consolidated": 100, "total": 90}}
}"#;

const ZERO_BID: &str = r#"{
    "spread": 2, "bid": 0, "asset": "BTC", "currency": "USD",
    "balance": {"BTC": {"consolidated": 5, "total": 3}, "USD": {"consolidated": 100, "total": 90}}
}"#;

const WAIT: Duration = Duration::from_secs(5);

/// Mock status client answering from a per-URL body table.
///
/// URLs without a body answer with HTTP 503. When gated, every request
/// waits for a permit before answering.
struct MockClient {
    bodies: StdMutex<HashMap<String, String>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl MockClient {
    fn new() -> Self {
        Self {
            bodies: StdMutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let client = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (client, gate)
    }

    fn with_body(self, url: &str, body: &str) -> Self {
        self.set_body(url, body);
        self
    }

    fn set_body(&self, url: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusClient for MockClient {
    async fn fetch_report(&self, base_url: &str) -> status::Result<crate::domain::Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let body = self.bodies.lock().unwrap().get(base_url).cloned();
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(StatusError::HttpStatus(503)),
        }
    }
}

fn config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(20),
        ..MonitorConfig::default()
    }
}

fn monitor(client: Arc<MockClient>, store: Arc<MemoryStore>) -> Monitor {
    Monitor::new(config(), client, store)
}

/// Waits for the next poll outcome event.
async fn next_outcome(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await.unwrap() {
                e @ (MonitorEvent::StatsUpdated(_) | MonitorEvent::PollFailed { .. }) => return e,
                _ => continue,
            }
        }
    })
    .await
    .expect("no poll outcome in time")
}

/// Lets spawned poll tasks run until they block.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_add_then_poll_derives_stats() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;

    let id = monitor.add_bot("A", "http://x").await.unwrap();

    let bots = monitor.list_bots().await;
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].id, id);
    assert!(bots[0].stats.is_none());
    assert!(bots[0].pending_request);

    gate.add_permits(1);
    assert_eq!(next_outcome(&mut events).await, MonitorEvent::StatsUpdated(id));

    let bot = &monitor.list_bots().await[0];
    let stats = bot.stats.as_ref().unwrap();
    assert_eq!(stats.spread_percent, Some(0.2));
    assert_eq!(stats.balance["BTC"].profit, Some(2.0));
    assert_eq!(stats.balance["USD"].profit, Some(10.0));
    assert!(bot.updated.is_some());
    assert!(!bot.pending_request);
}

#[tokio::test]
async fn test_zero_bid_leaves_stats_empty() {
    let client = Arc::new(MockClient::new().with_body("http://x", ZERO_BID));
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;

    let id = monitor.add_bot("A", "http://x").await.unwrap();

    match next_outcome(&mut events).await {
        MonitorEvent::PollFailed { id: failed, error } => {
            assert_eq!(failed, id);
            assert!(error.contains("bid is zero"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    let bot = &monitor.list_bots().await[0];
    assert!(bot.stats.is_none());
    assert!(bot.updated.is_none());
    assert!(!bot.pending_request);
    assert_eq!(monitor.stats().await.polls_failed, 1);
}

#[tokio::test]
async fn test_failed_derivation_keeps_previous_stats() {
    let client = Arc::new(MockClient::new().with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;
    monitor.add_bot("A", "http://x").await.unwrap();
    next_outcome(&mut events).await;
    let before = monitor.list_bots().await[0].clone();

    client.set_body("http://x", ZERO_BID);
    monitor.tick().await;
    assert!(matches!(
        next_outcome(&mut events).await,
        MonitorEvent::PollFailed { .. }
    ));

    let after = &monitor.list_bots().await[0];
    assert_eq!(after.stats, before.stats);
    assert_eq!(after.updated, before.updated);
}

#[tokio::test]
async fn test_malformed_body_is_parse_failure() {
    let client = Arc::new(MockClient::new().with_body("http://x", "<html>oops</html>"));
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;
    monitor.add_bot("A", "http://x").await.unwrap();

    match next_outcome(&mut events).await {
        MonitorEvent::PollFailed { error, .. } => assert!(error.contains("malformed report")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_failures_are_isolated_per_bot() {
    let client = Arc::new(MockClient::new().with_body("http://good", GOOD));
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();

    let good = monitor.add_bot("good", "http://good").await.unwrap();
    let bad = monitor.add_bot("bad", "http://bad").await.unwrap();
    monitor.load().await;

    let mut outcomes = vec![next_outcome(&mut events).await, next_outcome(&mut events).await];
    outcomes.sort_by_key(|e| matches!(e, MonitorEvent::PollFailed { .. }));

    assert_eq!(outcomes[0], MonitorEvent::StatsUpdated(good));
    assert!(matches!(&outcomes[1], MonitorEvent::PollFailed { id, .. } if *id == bad));

    let bots = monitor.list_bots().await;
    assert!(bots[0].stats.is_some());
    assert!(bots[1].stats.is_none());
}

// ==================== Overlap and cancellation ====================

#[tokio::test]
async fn test_no_overlapping_requests_per_bot() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;
    monitor.add_bot("A", "http://x").await.unwrap();
    settle().await;

    monitor.tick().await;
    monitor.tick().await;
    settle().await;

    assert_eq!(client.calls(), 1);
    assert_eq!(monitor.stats().await.polls_started, 1);

    gate.add_permits(1);
    next_outcome(&mut events).await;

    gate.add_permits(1);
    monitor.tick().await;
    next_outcome(&mut events).await;
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_deleted_bot_response_is_dropped() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor(client.clone(), store.clone());
    let mut events = monitor.subscribe();
    monitor.load().await;

    let id = monitor.add_bot("A", "http://x").await.unwrap();
    settle().await;
    assert_eq!(client.calls(), 1);

    let removed = monitor.delete_bot(id).await.unwrap();
    assert_eq!(removed.name, "A");

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(monitor.list_bots().await.is_empty());
    assert_eq!(store.get("bots").await.unwrap(), Some("[]".to_string()));

    let stats = monitor.stats().await;
    assert_eq!(stats.polls_cancelled, 1);
    assert_eq!(stats.polls_succeeded, 0);

    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, MonitorEvent::StatsUpdated(_)));
    }
}

#[tokio::test]
async fn test_delete_keeps_other_bots_addressable() {
    let client = Arc::new(
        MockClient::new()
            .with_body("http://a", GOOD)
            .with_body("http://b", GOOD),
    );
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    let a = monitor.add_bot("A", "http://a").await.unwrap();
    let b = monitor.add_bot("B", "http://b").await.unwrap();

    monitor.delete_bot(a).await.unwrap();

    assert_eq!(monitor.bot_id_at(0).await, Some(b));
    assert!(matches!(
        monitor.delete_bot(a).await,
        Err(MonitorError::NotFound(missing)) if missing == a
    ));
}

#[tokio::test]
async fn test_stop_cancels_in_flight() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    monitor.load().await;
    monitor.add_bot("A", "http://x").await.unwrap();
    settle().await;

    monitor.stop().await;
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(monitor.state().await, SchedulerState::Stopped);
    let bot = &monitor.list_bots().await[0];
    assert!(bot.stats.is_none());
    assert!(!bot.pending_request);
    assert_eq!(monitor.stats().await.polls_cancelled, 1);

    assert!(matches!(
        monitor.add_bot("B", "http://y").await,
        Err(MonitorError::Stopped)
    ));
}

// ==================== Lifecycle ====================

#[tokio::test]
async fn test_ticks_ignored_before_load() {
    let client = Arc::new(MockClient::new().with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));

    monitor.add_bot("A", "http://x").await.unwrap();
    monitor.tick().await;
    settle().await;

    assert_eq!(monitor.state().await, SchedulerState::Idle);
    assert_eq!(client.calls(), 0);
    assert_eq!(monitor.stats().await.skipped_ticks, 1);
}

#[tokio::test]
async fn test_pause_stops_ticks_and_resume_restarts() {
    let client = Arc::new(MockClient::new().with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;
    monitor.pause().await;
    assert_eq!(monitor.state().await, SchedulerState::Paused);

    monitor.add_bot("A", "http://x").await.unwrap();
    monitor.tick().await;
    settle().await;
    assert_eq!(client.calls(), 0);
    assert_eq!(monitor.stats().await.skipped_ticks, 1);

    monitor.resume().await;
    assert_eq!(monitor.state().await, SchedulerState::Active);
    monitor.tick().await;
    next_outcome(&mut events).await;
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_in_flight_result_applies_while_paused() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let monitor = monitor(client, Arc::new(MemoryStore::new()));
    let mut events = monitor.subscribe();
    monitor.load().await;
    let id = monitor.add_bot("A", "http://x").await.unwrap();

    monitor.pause().await;
    gate.add_permits(1);

    assert_eq!(next_outcome(&mut events).await, MonitorEvent::StatsUpdated(id));
    assert!(monitor.list_bots().await[0].stats.is_some());
}

#[tokio::test]
async fn test_resume_does_not_duplicate_in_flight() {
    let (client, gate) = MockClient::gated();
    let client = Arc::new(client.with_body("http://x", GOOD));
    let monitor = monitor(client.clone(), Arc::new(MemoryStore::new()));
    monitor.load().await;
    monitor.add_bot("A", "http://x").await.unwrap();

    monitor.pause().await;
    monitor.resume().await;
    monitor.tick().await;
    settle().await;

    assert_eq!(client.calls(), 1);
    assert_eq!(monitor.stats().await.polls_outstanding(), 1);
    gate.add_permits(1);
}

#[tokio::test]
async fn test_pause_ignored_when_idle() {
    let monitor = monitor(Arc::new(MockClient::new()), Arc::new(MemoryStore::new()));
    monitor.pause().await;
    assert_eq!(monitor.state().await, SchedulerState::Idle);
    monitor.resume().await;
    assert_eq!(monitor.state().await, SchedulerState::Idle);
}

#[tokio::test]
async fn test_run_ticks_and_obeys_lifecycle() {
    let client = Arc::new(MockClient::new().with_body("http://x", GOOD));
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor(client.clone(), store);
    let mut events = monitor.subscribe();
    monitor.add_bot("A", "http://x").await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    let runner = monitor.clone();
    let handle = tokio::spawn(async move { runner.run(rx).await });

    // Initial poll after load, then at least one tick-driven poll.
    next_outcome(&mut events).await;
    next_outcome(&mut events).await;
    assert!(monitor.stats().await.ticks >= 1);

    tx.send(LifecycleEvent::Pause).await.unwrap();
    timeout(WAIT, async {
        while monitor.state().await != SchedulerState::Paused {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tx.send(LifecycleEvent::Stop).await.unwrap();
    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(monitor.state().await, SchedulerState::Stopped);

    let (_tx, rx) = mpsc::channel(1);
    assert!(matches!(monitor.run(rx).await, Err(MonitorError::Stopped)));
}

#[tokio::test]
async fn test_run_stops_when_lifecycle_channel_closes() {
    let monitor = monitor(Arc::new(MockClient::new()), Arc::new(MemoryStore::new()));
    let (tx, rx) = mpsc::channel(1);
    drop(tx);

    let result = timeout(WAIT, monitor.run(rx)).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(monitor.state().await, SchedulerState::Stopped);
}

#[tokio::test]
async fn test_stop_from_another_handle_ends_run() {
    let monitor = monitor(Arc::new(MockClient::new()), Arc::new(MemoryStore::new()));
    let (_tx, rx) = mpsc::channel(1);
    let runner = monitor.clone();
    let handle = tokio::spawn(async move { runner.run(rx).await });

    timeout(WAIT, async {
        while monitor.state().await != SchedulerState::Active {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    monitor.stop().await;
    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

// ==================== Persistence ====================

#[tokio::test]
async fn test_add_before_load_does_not_overwrite_store() {
    let persisted = r#"[{"name":"old","url":"http://old","stats":null,"updated":null}]"#;
    let store = Arc::new(MemoryStore::with_value("bots", persisted));
    let monitor = monitor(Arc::new(MockClient::new()), store.clone());

    monitor.add_bot("new", "http://new").await.unwrap();
    assert_eq!(store.writes(), 0);
    assert_eq!(store.get("bots").await.unwrap(), Some(persisted.to_string()));

    monitor.load().await;
    let names: Vec<_> = monitor.list_bots().await.into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["old", "new"]);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn test_unreadable_store_is_not_overwritten() {
    let persisted = r#"[{"name":"old","url":"http://old","stats":null,"updated":null}]"#;
    let store = Arc::new(MemoryStore::with_value("bots", persisted));
    store.set_fail_reads(true);
    let monitor = monitor(Arc::new(MockClient::new()), store.clone());

    monitor.load().await;
    assert_eq!(monitor.state().await, SchedulerState::Active);
    monitor.add_bot("new", "http://new").await.unwrap();

    assert_eq!(store.writes(), 0);
    assert_eq!(store.get("bots").await.unwrap(), Some(persisted.to_string()));

    store.set_fail_reads(false);
    monitor.tick().await;

    let names: Vec<_> = monitor.list_bots().await.into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["old", "new"]);
    assert_eq!(store.writes(), 1);

    let blob = store.get("bots").await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(value[0]["name"], "old");
    assert_eq!(value[1]["name"], "new");
}

#[tokio::test]
async fn test_stats_survive_restart() {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(MockClient::new().with_body("http://x", GOOD));
    {
        let monitor = monitor(client.clone(), store.clone());
        let mut events = monitor.subscribe();
        monitor.load().await;
        monitor.add_bot("A", "http://x/").await.unwrap();
        next_outcome(&mut events).await;
        monitor.stop().await;
    }

    let (gated, _gate) = MockClient::gated();
    let restarted = monitor(Arc::new(gated), store);
    restarted.load().await;

    let bots = restarted.list_bots().await;
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].url, "http://x");
    assert_eq!(bots[0].stats.as_ref().unwrap().spread_percent, Some(0.2));
    assert!(bots[0].updated.is_some());
}

#[tokio::test]
async fn test_save_failure_is_retried_on_next_mutation() {
    let store = Arc::new(MemoryStore::new());
    let monitor = monitor(Arc::new(MockClient::new()), store.clone());
    monitor.load().await;

    store.set_fail_writes(true);
    monitor.add_bot("A", "http://a").await.unwrap();
    assert_eq!(monitor.stats().await.save_failures, 1);
    assert_eq!(store.get("bots").await.unwrap(), None);

    store.set_fail_writes(false);
    monitor.add_bot("B", "http://b").await.unwrap();

    let blob = store.get("bots").await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
}

// ==================== Input validation ====================

#[tokio::test]
async fn test_add_rejects_invalid_input() {
    let monitor = monitor(Arc::new(MockClient::new()), Arc::new(MemoryStore::new()));

    for (name, url) in [
        ("", "http://x"),
        ("   ", "http://x"),
        ("A", ""),
        ("A", "not a url"),
        ("A", "ftp://x"),
    ] {
        let result = monitor.add_bot(name, url).await;
        assert!(
            matches!(result, Err(MonitorError::InvalidInput(_))),
            "accepted {:?} {:?}",
            name,
            url
        );
    }
    assert!(monitor.list_bots().await.is_empty());
}

#[test]
fn test_normalize_url() {
    assert_eq!(normalize_url(" http://x:8080/bot/ ").unwrap(), "http://x:8080/bot");
    assert_eq!(normalize_url("https://x").unwrap(), "https://x");
}
