//! Poll scheduler for registered bots.
//!
//! Coordinates the registry, the status client and the persistence gateway:
//! every tick fans out one status request per idle bot, derives metrics from
//! each report and persists the registry after every successful update.

mod config;
mod error;
mod lifecycle;
mod stats;

pub use config::MonitorConfig;
pub use error::{MonitorError, PollError};
pub use lifecycle::{LifecycleEvent, MonitorEvent, SchedulerState};
pub use stats::PollStats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::domain::{Bot, BotId, derive};
use crate::registry::BotRegistry;
use crate::status::StatusClient;
use crate::storage::{KeyValueStore, PersistenceGateway};

/// Capacity of the change notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Monitor owns the bot registry and drives periodic status polling.
///
/// Cloning is cheap; all clones share the same registry and scheduler.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<dyn StatusClient>,
    gateway: PersistenceGateway,
    poll_interval: Duration,
    version: String,
    inner: Mutex<Inner>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: watch::Sender<bool>,
}

/// Mutable state, guarded by a single lock so that registry updates,
/// in-flight bookkeeping and saves never interleave.
struct Inner {
    registry: BotRegistry,
    in_flight: HashMap<BotId, AbortHandle>,
    state: SchedulerState,
    running: bool,
    stats: PollStats,
}

impl Monitor {
    /// Creates a new Monitor in the `Idle` state.
    pub fn new(
        cfg: MonitorConfig,
        client: Arc<dyn StatusClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                client,
                gateway: PersistenceGateway::new(store, cfg.storage_key),
                poll_interval: if cfg.poll_interval.is_zero() {
                    DEFAULT_POLL_INTERVAL
                } else {
                    cfg.poll_interval
                },
                version: cfg.version,
                inner: Mutex::new(Inner {
                    registry: BotRegistry::new(),
                    in_flight: HashMap::new(),
                    state: SchedulerState::Idle,
                    running: false,
                    stats: PollStats::default(),
                }),
                events,
                shutdown,
            }),
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    /// Returns the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.shared.inner.lock().await.state
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> PollStats {
        self.shared.inner.lock().await.stats.clone()
    }

    /// Loads the persisted registry and activates the scheduler.
    ///
    /// Bots added before the load are kept after the loaded ones. A first
    /// poll starts immediately. Calling it again is a no-op. If the store
    /// cannot be read, every tick retries the load.
    pub async fn load(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != SchedulerState::Idle {
            return;
        }

        self.shared.restore(&mut inner).await;

        self.shared.set_state(&mut inner, SchedulerState::Active);
        self.shared.poll_idle_bots(&mut inner);
    }

    /// Registers a bot and starts polling it right away when active.
    pub async fn add_bot(&self, name: &str, url: &str) -> Result<BotId, MonitorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MonitorError::InvalidInput("name is required".into()));
        }
        let url = normalize_url(url)?;

        let mut inner = self.shared.inner.lock().await;
        if inner.state == SchedulerState::Stopped {
            return Err(MonitorError::Stopped);
        }

        let id = inner.registry.add(name, url.clone());
        info!(bot = %id, name = %name, url = %url, "Bot added");

        self.shared.persist(&mut inner).await;
        self.shared.emit(MonitorEvent::BotAdded(id));

        if inner.state == SchedulerState::Active {
            self.shared.poll_idle_bots(&mut inner);
        }

        Ok(id)
    }

    /// Cancels any in-flight poll of a bot, then removes it.
    pub async fn delete_bot(&self, id: BotId) -> Result<Bot, MonitorError> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.registry.contains(id) {
            return Err(MonitorError::NotFound(id));
        }

        if let Some(handle) = inner.in_flight.remove(&id) {
            handle.abort();
            inner.stats.polls_cancelled += 1;
            debug!(bot = %id, "In-flight poll cancelled");
        }

        let bot = inner.registry.remove(id)?;
        info!(bot = %id, name = %bot.name, "Bot deleted");

        self.shared.persist(&mut inner).await;
        self.shared.emit(MonitorEvent::BotRemoved(id));

        Ok(bot)
    }

    /// Returns a snapshot of the registry in display order.
    pub async fn list_bots(&self) -> Vec<Bot> {
        self.shared.inner.lock().await.registry.list()
    }

    /// Resolves a zero-based display position to a bot id.
    pub async fn bot_id_at(&self, index: usize) -> Option<BotId> {
        self.shared.inner.lock().await.registry.id_at(index)
    }

    /// Runs one scheduler tick. Ignored unless the scheduler is active.
    pub async fn tick(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.stats.ticks += 1;

        if inner.state != SchedulerState::Active {
            inner.stats.skipped_ticks += 1;
            debug!(state = %inner.state, "Tick skipped");
            return;
        }

        if !self.shared.gateway.is_loaded() {
            self.shared.restore(&mut inner).await;
        }

        let started = self.shared.poll_idle_bots(&mut inner);
        debug!(
            tick = inner.stats.ticks,
            bots = inner.registry.len(),
            started = started,
            "Tick"
        );
    }

    /// Suspends ticking. In-flight polls still complete.
    pub async fn pause(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state == SchedulerState::Active {
            self.shared.set_state(&mut inner, SchedulerState::Paused);
        }
    }

    /// Resumes ticking after a pause.
    pub async fn resume(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state == SchedulerState::Paused {
            self.shared.set_state(&mut inner, SchedulerState::Active);
        }
    }

    /// Cancels all in-flight polls and stops the scheduler for good.
    pub async fn stop(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state == SchedulerState::Stopped {
            return;
        }

        let cancelled: Vec<(BotId, AbortHandle)> = inner.in_flight.drain().collect();
        for (id, handle) in cancelled {
            handle.abort();
            inner.registry.set_pending(id, false);
            inner.stats.polls_cancelled += 1;
        }

        self.shared.set_state(&mut inner, SchedulerState::Stopped);
        self.shared.shutdown.send_replace(true);
    }

    /// Runs the scheduler until stopped.
    ///
    /// Loads the registry if needed, then ticks at the configured interval
    /// while consuming lifecycle events. A closed lifecycle channel stops
    /// the monitor.
    pub async fn run(&self, mut lifecycle: mpsc::Receiver<LifecycleEvent>) -> Result<(), MonitorError> {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == SchedulerState::Stopped {
                return Err(MonitorError::Stopped);
            }
            if inner.running {
                return Err(MonitorError::AlreadyRunning);
            }
            inner.running = true;
        }

        let mut shutdown = self.shared.shutdown.subscribe();

        self.load().await;

        let bots = self.list_bots().await.len();
        info!(
            version = %self.shared.version,
            interval = ?self.shared.poll_interval,
            bots = bots,
            "Starting poll loop"
        );

        let period = self.shared.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let stopped = *shutdown.borrow();
            if stopped {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                event = lifecycle.recv() => {
                    match event {
                        Some(LifecycleEvent::Pause) => self.pause().await,
                        Some(LifecycleEvent::Resume) => self.resume().await,
                        Some(LifecycleEvent::Stop) | None => {
                            self.stop().await;
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {}
            }
        }

        let stats = {
            let mut inner = self.shared.inner.lock().await;
            inner.running = false;
            inner.stats.clone()
        };

        info!(
            ticks = stats.ticks,
            polls_succeeded = stats.polls_succeeded,
            polls_failed = stats.polls_failed,
            save_failures = stats.save_failures,
            "Poll loop stopped"
        );

        self.shared.gateway.close().await?;
        Ok(())
    }
}

impl Shared {
    /// Puts the persisted bots in front of the ones already registered.
    ///
    /// Leaves the registry untouched while the store is unreadable.
    async fn restore(&self, inner: &mut Inner) {
        let mut bots = self.gateway.load().await;
        if !self.gateway.is_loaded() {
            return;
        }

        let merge = !inner.registry.is_empty();
        bots.extend(inner.registry.list());
        inner.registry = BotRegistry::from_bots(bots);

        if merge {
            self.persist(inner).await;
        }
    }

    /// Starts a poll for every bot without an outstanding request.
    fn poll_idle_bots(self: &Arc<Self>, inner: &mut Inner) -> usize {
        let targets = inner.registry.idle_targets();
        let started = targets.len();

        for (id, url) in targets {
            let shared = Arc::clone(self);
            let handle = tokio::spawn(async move { shared.poll_bot(id, url).await });

            inner.in_flight.insert(id, handle.abort_handle());
            inner.registry.set_pending(id, true);
            inner.stats.polls_started += 1;
        }

        started
    }

    /// Fetches, derives and applies one bot's report.
    async fn poll_bot(&self, id: BotId, url: String) {
        let outcome: Result<_, PollError> = match self.client.fetch_report(&url).await {
            Ok(report) => derive(report).map_err(PollError::from),
            Err(e) => Err(e.into()),
        };

        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&id);

        // Removed while the request was outstanding.
        if !inner.registry.set_pending(id, false) {
            debug!(bot = %id, "Dropping result for removed bot");
            return;
        }

        match outcome {
            Ok(report) => {
                inner.registry.update_stats(id, report, Utc::now());
                inner.stats.polls_succeeded += 1;
                debug!(bot = %id, "Stats updated");

                self.persist(&mut inner).await;
                self.emit(MonitorEvent::StatsUpdated(id));
            }
            Err(e) => {
                inner.stats.polls_failed += 1;
                warn!(bot = %id, url = %url, error = %e, "Poll failed, keeping previous stats");
                self.emit(MonitorEvent::PollFailed {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Saves the registry. Failures are logged; the next mutation retries.
    async fn persist(&self, inner: &mut Inner) {
        match self.gateway.save(inner.registry.bots()).await {
            Ok(true) => inner.stats.saves += 1,
            Ok(false) => {}
            Err(e) => {
                inner.stats.save_failures += 1;
                error!(error = %e, "Failed to save registry");
            }
        }
    }

    fn set_state(&self, inner: &mut Inner, state: SchedulerState) {
        info!(from = %inner.state, to = %state, "Scheduler state changed");
        inner.state = state;
        self.emit(MonitorEvent::StateChanged(state));
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Validates a bot base URL and strips trailing slashes.
fn normalize_url(url: &str) -> Result<String, MonitorError> {
    let url = url.trim().trim_end_matches('/');
    let parsed = Url::parse(url)
        .map_err(|e| MonitorError::InvalidInput(format!("invalid url {:?}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        scheme => Err(MonitorError::InvalidInput(format!(
            "unsupported url scheme: {}",
            scheme
        ))),
    }
}

#[cfg(test)]
mod tests;
