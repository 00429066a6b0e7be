use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection_log::ConnectionLog;

/// Periodically merges the ingestion buffer into the history
///
/// Stopping is cooperative: the token is only checked between cycles, so a
/// cycle that has started always runs to completion.
pub struct MergeScheduler {
    /// Cancellation token for stopping the task
    cancel: CancellationToken,

    /// Task handle
    task: Option<tokio::task::JoinHandle<()>>,

    period: Duration,
}

impl MergeScheduler {
    /// Spawn the merge task on the current tokio runtime
    pub fn start(log: ConnectionLog, period: Duration) -> Self {
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                debug!(?period, "starting merge scheduler");
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,

                        _ = ticker.tick() => {
                            if !log.buffer_is_empty() {
                                log.merge();
                            }
                        }
                    }
                }

                debug!("stopped merge scheduler");
            })
        };

        Self {
            cancel,
            task: Some(task),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ask the task to stop before its next cycle
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Check if the task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop and wait for any in-flight cycle to finish
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::AppDirectory;
    use crate::resolver::TableResolver;
    use crate::test_support::{bound, entry, ports};
    use std::sync::Arc;

    fn new_log() -> ConnectionLog {
        ConnectionLog::new(
            bound(100),
            Arc::new(AppDirectory::new()),
            Arc::new(TableResolver::default()),
        )
    }

    #[tokio::test]
    async fn test_merges_periodically() {
        let log = new_log();
        let mut rx = log.subscribe();
        let scheduler = MergeScheduler::start(log.clone(), Duration::from_millis(20));

        log.append(entry(1, "a", 1, 80));
        log.append(entry(1, "a", 2, 80));

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("merge did not run")
            .unwrap();

        assert!(log.buffer_is_empty());
        assert_eq!(ports(&log.displayed()), vec![1, 2]);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_idle_ticks_do_not_notify() {
        let log = new_log();
        let mut rx = log.subscribe();
        let scheduler = MergeScheduler::start(log.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_halts_future_cycles() {
        let log = new_log();
        let scheduler = MergeScheduler::start(log.clone(), Duration::from_millis(10));
        assert_eq!(scheduler.period(), Duration::from_millis(10));
        assert!(scheduler.is_running());

        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.is_running());

        log.append(entry(1, "a", 1, 80));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.buffered().len(), 1);
        assert!(log.unfiltered().is_empty());
    }
}
