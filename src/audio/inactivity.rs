use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;

/// Periodically disconnects sessions that have been idle too long.
///
/// One monitor serves every guild. It is started when the gateway reports
/// ready, which can happen more than once per process, so [`start`] is
/// idempotent.
///
/// [`start`]: InactivityMonitor::start
pub struct InactivityMonitor {
    registry: Arc<SessionRegistry>,
    timeout: Duration,
    check_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl InactivityMonitor {
    pub fn new(registry: Arc<SessionRegistry>, timeout: Duration, check_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            timeout,
            check_interval,
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawns the sweep loop. Returns `false` if it was already running or
    /// the monitor has been stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.is_some() || self.shutdown.is_cancelled() {
            return false;
        }

        info!(
            "⏲️ Inactivity monitor started (timeout {}, every {})",
            humantime::format_duration(self.timeout),
            humantime::format_duration(self.check_interval)
        );
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move { monitor.run().await }));
        true
    }

    async fn run(&self) {
        let mut ticker = time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.sweep(Instant::now()).await;
                    if evicted > 0 {
                        info!("🧹 Disconnected {} idle sessions", evicted);
                    }
                }
            }
        }
        debug!("Inactivity monitor stopped");
    }

    /// Evicts every session idle for longer than the timeout at `now`.
    pub async fn sweep(&self, now: Instant) -> usize {
        let sessions = self.registry.sessions();
        let timeout = self.timeout;
        let results =
            futures::future::join_all(sessions.iter().map(|session| session.evict_if_idle(now, timeout))).await;
        results.into_iter().filter(|evicted| *evicted).count()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
