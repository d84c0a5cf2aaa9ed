use neo4rs::query;
use tracing::{debug, info};

use crate::{GraphClient, GraphError};

/// Schema the mutation recipes and the window scan rely on.
/// Every statement is `IF NOT EXISTS`, so startup can run it unconditionally.
const SCHEMA: [(&str, &str); 4] = [
    (
        "post_id_uniq",
        "CREATE CONSTRAINT post_id_uniq IF NOT EXISTS FOR (p:Post) REQUIRE p.id IS UNIQUE",
    ),
    (
        "user_pk_uniq",
        "CREATE CONSTRAINT user_pk_uniq IF NOT EXISTS FOR (u:User) REQUIRE u.pubkey IS UNIQUE",
    ),
    (
        "subscriber_pk_uniq",
        "CREATE CONSTRAINT subscriber_pk_uniq IF NOT EXISTS FOR (s:Subscriber) REQUIRE s.pubkey IS UNIQUE",
    ),
    (
        "post_created_at",
        "CREATE INDEX post_created_at IF NOT EXISTS FOR (p:Post) ON (p.created_at)",
    ),
];

pub async fn migrate(client: &GraphClient) -> Result<(), GraphError> {
    info!(items = SCHEMA.len(), "Applying graph schema");

    for (name, cypher) in SCHEMA {
        match client.graph.run(query(cypher)).await {
            Ok(()) => debug!(name, "Schema item in place"),
            // An equivalent constraint created under another name.
            Err(e) if is_equivalent_schema(&e.to_string()) => {
                debug!(name, "Equivalent schema item already present")
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Graph schema ready");
    Ok(())
}

fn is_equivalent_schema(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("equivalent") || message.contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schema_statement_is_idempotent() {
        for (name, cypher) in SCHEMA {
            assert!(cypher.contains("IF NOT EXISTS"), "{name}");
            assert!(cypher.contains(name), "{name}");
        }
    }

    #[test]
    fn recognises_equivalent_schema_errors() {
        assert!(is_equivalent_schema(
            "Neo.ClientError.Schema.EquivalentSchemaRuleAlreadyExists"
        ));
        assert!(is_equivalent_schema("An index already exists"));
        assert!(!is_equivalent_schema("connection refused"));
    }
}
