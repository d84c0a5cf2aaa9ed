use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use nosdaily_common::InboundEvent;
use nosdaily_graph::MutationStore;

use crate::mutator::{EventMutator, MutationOutcome};
use crate::shutdown::wait_for_shutdown;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Feeds relay content into the graph through the event mutator.
pub struct Ingestor<S> {
    mutator: EventMutator<S>,
}

impl<S: MutationStore> Ingestor<S> {
    pub fn new(mutator: EventMutator<S>) -> Self {
        Self { mutator }
    }

    /// Apply events until shutdown or until the stream closes. Failed events
    /// are logged and dropped.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<InboundEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> IngestStats {
        let mut stats = IngestStats::default();
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                next = events.recv() => {
                    let Some(event) = next else { break };
                    match self.mutator.apply(&event).await {
                        Ok(MutationOutcome::Applied) => stats.applied += 1,
                        Ok(_) => stats.skipped += 1,
                        Err(e) => {
                            warn!(id = %event.id, kind = event.kind, error = %e, "Failed to store event");
                            stats.failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            "Ingestor stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nosdaily_graph::MemoryGraph;

    use super::*;
    use crate::testing::note;

    #[tokio::test]
    async fn stores_stream_and_counts_outcomes() {
        let graph = Arc::new(MemoryGraph::new());
        let ingestor = Ingestor::new(EventMutator::new(graph.clone(), Duration::from_secs(1)));
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(note("a", "alice", 100, None)).await.unwrap();
        let mut dm = note("dm", "alice", 101, None);
        dm.kind = 4;
        tx.send(dm).await.unwrap();
        let mut bad_zap = note("zap", "zapper", 102, Some("a"));
        bad_zap.kind = 9735;
        tx.send(bad_zap).await.unwrap();
        tx.send(note("b", "bob", 103, Some("a"))).await.unwrap();
        drop(tx);

        let stats = ingestor.run(rx, shutdown_rx).await;

        assert_eq!(
            stats,
            IngestStats {
                applied: 2,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(graph.snapshot().replies.len(), 1);
    }
}
