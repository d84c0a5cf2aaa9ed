use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{GraphClient, GraphError, GraphMutation, MutationStore};

/// Write-side wrapper for the graph. Used by the event mutator only.
pub struct GraphWriter {
    client: GraphClient,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MutationStore for GraphWriter {
    async fn apply(&self, mutations: &[GraphMutation]) -> Result<(), GraphError> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut txn = self.client.graph.start_txn().await?;

        for mutation in mutations {
            debug!(mutation = mutation.name(), "Running graph mutation");
            let result = txn.run(mutation.to_query()).await;
            if let Err(e) = result {
                warn!(mutation = mutation.name(), error = %e, "Graph mutation failed, rolling back");
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(e.into());
            }
        }

        txn.commit().await?;
        Ok(())
    }
}
