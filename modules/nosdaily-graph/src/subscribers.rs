use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Query, Row};
use tracing::debug;

use nosdaily_common::{from_unix, Subscriber};

use crate::reader::get;
use crate::{GraphClient, GraphError, SubscriberStore};

const SUBSCRIBER_FIELDS: &str = "s.pubkey AS pubkey, s.channel_secret AS channel_secret,
     s.subscribed_at AS subscribed_at, s.unsubscribed_at AS unsubscribed_at,
     s.last_delivered_at AS last_delivered_at";

/// Subscriber records stored as `Subscriber` nodes keyed by identity.
pub struct SubscriberGraph {
    client: GraphClient,
}

impl SubscriberGraph {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Subscriber>, GraphError> {
        let mut stream = self.client.graph.execute(q).await?;
        let mut subscribers = Vec::new();
        while let Some(row) = stream.next().await? {
            subscribers.push(row_to_subscriber(&row)?);
        }
        Ok(subscribers)
    }

    async fn write(&self, q: Query) -> Result<(), GraphError> {
        self.client.graph.run(q).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for SubscriberGraph {
    async fn get(&self, pubkey: &str) -> Result<Option<Subscriber>, GraphError> {
        let q = query(&format!(
            "MATCH (s:Subscriber {{pubkey: $pubkey}}) RETURN {SUBSCRIBER_FIELDS}"
        ))
        .param("pubkey", pubkey);

        Ok(self.fetch(q).await?.into_iter().next())
    }

    async fn create_if_absent(
        &self,
        pubkey: &str,
        channel_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscriber, GraphError> {
        debug!(pubkey, "Create subscriber");
        let q = query(&format!(
            "MERGE (s:Subscriber {{pubkey: $pubkey}})
             ON CREATE SET s.channel_secret = $channel_secret,
                           s.subscribed_at = $subscribed_at
             RETURN {SUBSCRIBER_FIELDS}"
        ))
        .param("pubkey", pubkey)
        .param("channel_secret", channel_secret)
        .param("subscribed_at", at.timestamp());

        self.fetch(q)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Row(format!("MERGE returned no subscriber for {pubkey}")))
    }

    async fn terminate(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        debug!(pubkey, "Terminate subscriber");
        self.write(
            query("MATCH (s:Subscriber {pubkey: $pubkey}) SET s.unsubscribed_at = $at")
                .param("pubkey", pubkey)
                .param("at", at.timestamp()),
        )
        .await
    }

    async fn restore(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        debug!(pubkey, "Restore subscriber");
        self.write(
            query(
                "MATCH (s:Subscriber {pubkey: $pubkey})
                 SET s.unsubscribed_at = null, s.subscribed_at = $at",
            )
            .param("pubkey", pubkey)
            .param("at", at.timestamp()),
        )
        .await
    }

    async fn active_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Subscriber>, GraphError> {
        let q = query(&format!(
            "MATCH (s:Subscriber)
             WHERE s.unsubscribed_at IS NULL AND s.pubkey > $after
             RETURN {SUBSCRIBER_FIELDS}
             ORDER BY s.pubkey
             LIMIT $limit"
        ))
        .param("after", after.unwrap_or(""))
        .param("limit", i64::try_from(limit).unwrap_or(i64::MAX));

        self.fetch(q).await
    }

    async fn mark_delivered(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        self.write(
            query("MATCH (s:Subscriber {pubkey: $pubkey}) SET s.last_delivered_at = $at")
                .param("pubkey", pubkey)
                .param("at", at.timestamp()),
        )
        .await
    }
}

fn row_to_subscriber(row: &Row) -> Result<Subscriber, GraphError> {
    let unsubscribed_at: Option<i64> = get(row, "unsubscribed_at")?;
    let last_delivered_at: Option<i64> = get(row, "last_delivered_at")?;

    Ok(Subscriber {
        pubkey: get(row, "pubkey")?,
        channel_secret: get(row, "channel_secret")?,
        subscribed_at: from_unix(get(row, "subscribed_at")?),
        unsubscribed_at: unsubscribed_at.map(from_unix),
        last_delivered_at: last_delivered_at.map(from_unix),
    })
}
