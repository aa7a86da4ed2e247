//! Background eviction of idle keys.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::clock::Clock;
use super::controller::AdmissionController;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running eviction sweep.
///
/// The sweep stops when [`stop`](Self::stop) is awaited or when the handle is
/// dropped.
#[derive(Debug)]
pub struct EvictionSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EvictionSweeper {
    /// Spawn a sweep over `controller` every `interval`
    pub fn spawn<C: Clock>(controller: AdmissionController<C>, interval: Duration) -> Self {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let evicted = controller.evict_idle(controller.now());
                        if evicted > 0 {
                            debug!(
                                evicted,
                                tracked = controller.tracked_keys(),
                                "Evicted idle rate-limit keys"
                            );
                        }
                    }
                }
            }

            debug!("Eviction sweeper stopped");
        });

        info!(
            interval_ms = interval.as_millis() as u64,
            "Eviction sweeper started"
        );

        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Whether the sweep task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the sweep and wait for the task to finish
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Eviction sweeper panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for EvictionSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::clock::ManualClock;
    use crate::rate_limit::config::{ControllerOptions, QuotaPolicy};

    fn controller(clock: ManualClock) -> AdmissionController<ManualClock> {
        let policy = QuotaPolicy::new(5, Duration::from_secs(10)).unwrap();
        AdmissionController::with_clock(policy, ControllerOptions::default(), clock).unwrap()
    }

    #[tokio::test]
    async fn test_sweeper_evicts_idle_keys() {
        let clock = ManualClock::new();
        let controller = controller(clock.clone());

        controller.check("a");
        controller.check("b");
        assert_eq!(controller.tracked_keys(), 2);

        let sweeper = controller.spawn_sweeper(Duration::from_millis(10));
        assert!(sweeper.is_running());

        clock.advance(Duration::from_secs(30));

        let mut waited = Duration::ZERO;
        while controller.tracked_keys() > 0 && waited < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        assert_eq!(controller.tracked_keys(), 0);

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_keeps_active_keys() {
        let clock = ManualClock::new();
        let controller = controller(clock.clone());

        controller.check("a");
        let sweeper = controller.spawn_sweeper(Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(controller.tracked_keys(), 1);

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_stop_terminates_task() {
        let controller = controller(ManualClock::new());
        let sweeper = controller.spawn_sweeper(Duration::from_secs(3600));
        assert!(sweeper.is_running());

        tokio::time::timeout(Duration::from_secs(1), sweeper.stop())
            .await
            .expect("sweeper did not stop");
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let controller = controller(ManualClock::new());
        let sweeper = controller.spawn_sweeper(Duration::ZERO);
        assert!(sweeper.is_running());
        sweeper.stop().await;
    }
}
