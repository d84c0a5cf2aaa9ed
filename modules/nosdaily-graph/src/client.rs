use neo4rs::{query, ConfigBuilder, Graph};
use tracing::info;

use nosdaily_common::Config;

use crate::GraphError;

/// Shared by every component of the bot.
const POOL_SIZE: usize = 16;
const FETCH_SIZE: usize = 500;

/// Shared handle to the social graph store.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect with the `NEO4J_*` settings of the bot config.
    pub async fn connect(config: &Config) -> Result<Self, GraphError> {
        Self::connect_to(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await
    }

    /// Connect and make one round trip.
    pub async fn connect_to(uri: &str, user: &str, password: &str) -> Result<Self, GraphError> {
        let settings = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(FETCH_SIZE)
            .max_connections(POOL_SIZE)
            .build()?;
        let graph = Graph::connect(settings).await?;
        graph.run(query("RETURN 1")).await?;

        info!(uri, "Connected to graph store");
        Ok(Self { graph })
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
