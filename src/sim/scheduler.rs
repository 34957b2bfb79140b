//! Wall-clock driver that ticks the engine at a fixed cadence.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::Engine;

/// Drives [`Engine::tick`] once per configured wall-clock interval.
///
/// Every device advances by the same simulated step on each tick, so
/// snapshots taken at the same wall-clock instant are comparable.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    engine: Arc<Engine>,
    interval: Duration,
}

impl TickScheduler {
    /// Scheduler using the engine's configured tick interval.
    pub fn new(engine: Arc<Engine>) -> Self {
        let interval = engine.config().tick_interval();
        Self { engine, interval }
    }

    /// Overrides the wall-clock interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Ticks until `shutdown` resolves.
    ///
    /// Late ticks are delayed rather than bursted, so a stalled process
    /// resumes at the normal cadence.
    ///
    /// # Returns
    ///
    /// The number of ticks run.
    pub async fn run_until<F>(self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        info!(
            interval_ms = self.interval.as_millis() as u64,
            sim_seconds_per_tick = self.engine.config().sim_seconds_per_tick,
            "tick scheduler started"
        );
        tokio::pin!(shutdown);
        let mut ran = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let report = self.engine.tick();
                    ran += 1;
                    debug!(tick = report.tick, produced = report.produced, "scheduled tick");
                }
            }
        }
        info!(ticks = ran, "tick scheduler stopped");
        ran
    }

    /// Runs the scheduler on a background task.
    pub fn spawn(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(self.run_until(async move {
            // A dropped sender also stops the scheduler.
            let _ = stop_rx.await;
        }));
        SchedulerHandle { stop_tx, join }
    }
}

/// Handle to a scheduler running in the background.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<u64>,
}

impl SchedulerHandle {
    /// Stops the scheduler and returns the number of ticks it ran.
    pub async fn shutdown(self) -> u64 {
        let _ = self.stop_tx.send(());
        self.join.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Device, DeviceKind};
    use crate::sim::types::SimConfig;

    fn engine() -> Arc<Engine> {
        Arc::new(
            Engine::with_devices(
                SimConfig::new(1000, 60, 1),
                [Device::new("PW-001", DeviceKind::BatteryStorage)],
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_cadence() {
        let engine = engine();
        let scheduler = TickScheduler::new(Arc::clone(&engine));
        let ran = scheduler
            .run_until(time::sleep(Duration::from_millis(5500)))
            .await;
        assert_eq!(ran, 5);
        assert_eq!(engine.current_tick(), 5);
        assert_eq!(engine.history().len("PW-001"), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_scheduler_stops() {
        let engine = engine();
        let handle = TickScheduler::new(Arc::clone(&engine))
            .with_interval(Duration::from_millis(100))
            .spawn();
        time::sleep(Duration::from_millis(1050)).await;
        let ran = handle.shutdown().await;
        assert_eq!(ran, 10);
        assert_eq!(engine.current_tick(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_tick() {
        let engine = engine();
        let mut sub = engine.subscribe("PW-001").unwrap();
        let handle = TickScheduler::new(Arc::clone(&engine)).spawn();
        for expected in 1..=3 {
            let snap = sub.recv().await.unwrap();
            assert_eq!(snap.tick, expected);
        }
        handle.shutdown().await;
    }
}
