use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use nosdaily_common::from_unix;
use nosdaily_graph::{FeedSource, SubscriberStore};

use crate::shutdown::wait_for_shutdown;
use crate::transport::Messenger;
use crate::worker::DeliveryWorker;

/// First multiple of `interval` (counted from the epoch) strictly after `now`.
/// An hourly interval fires at the top of each hour.
pub fn next_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let period = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX).max(1);
    let next = now
        .timestamp()
        .div_euclid(period)
        .saturating_add(1)
        .saturating_mul(period);
    from_unix(next)
}

/// Runs a delivery cycle on every tick until shutdown. A cycle already in
/// progress finishes before the loop observes shutdown.
pub struct DeliveryScheduler<S, F, M> {
    worker: DeliveryWorker<S, F, M>,
    interval: Duration,
    batch_size: usize,
}

impl<S, F, M> DeliveryScheduler<S, F, M>
where
    S: SubscriberStore,
    F: FeedSource,
    M: Messenger,
{
    pub fn new(worker: DeliveryWorker<S, F, M>, interval: Duration, batch_size: usize) -> Self {
        Self {
            worker,
            interval,
            batch_size,
        }
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);

        loop {
            let next = next_tick(Utc::now(), self.interval);
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            info!(next = %next, "Next delivery scheduled");

            tokio::select! {
                biased;
                _ = &mut stop => {
                    info!("Delivery scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            info!("Running scheduled delivery");
            if let Err(e) = self.worker.run_cycle(self.batch_size, Utc::now()).await {
                warn!(error = %e, "Delivery cycle aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nosdaily_graph::MemoryGraph;

    use super::*;
    use crate::ranking::FeedRanker;
    use crate::testing::RecordingMessenger;
    use crate::worker::DeliverySettings;

    #[test]
    fn hourly_ticks_land_on_the_hour() {
        let now = from_unix(1_700_000_123);
        let next = next_tick(now, Duration::from_secs(3600));

        assert_eq!(next.timestamp() % 3600, 0);
        assert!(next > now);
        assert!(next - now <= chrono::TimeDelta::hours(1));
    }

    #[test]
    fn exact_boundary_moves_to_the_following_tick() {
        let now = from_unix(7_200);
        assert_eq!(next_tick(now, Duration::from_secs(3600)), from_unix(10_800));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let graph = Arc::new(MemoryGraph::new());
        let timeout = Duration::from_secs(1);
        let worker = DeliveryWorker::new(
            graph.clone(),
            FeedRanker::new(graph, timeout),
            Arc::new(RecordingMessenger::new()),
            DeliverySettings::new(24, 10, Duration::from_secs(3600)),
            timeout,
        );
        let scheduler = DeliveryScheduler::new(worker, Duration::from_secs(3600), 100);
        let (tx, rx) = watch::channel(false);

        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), scheduler.run(rx))
            .await
            .expect("scheduler stops");
    }
}
