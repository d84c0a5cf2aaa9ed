use async_trait::async_trait;
use neo4rs::{query, Row};

use nosdaily_common::{ContentItem, FeedCandidate};

use crate::{FeedSource, GraphClient, GraphError};

/// Read-only wrapper for the graph. Used by the feed ranker.
pub struct GraphReader {
    client: GraphClient,
}

impl GraphReader {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for GraphReader {
    async fn candidates(&self, start: i64, end: i64) -> Result<Vec<FeedCandidate>, GraphError> {
        // Each OPTIONAL MATCH is aggregated before the next one to keep the
        // row count linear in the number of interactions.
        let q = query(
            "MATCH (p:Post)
             WHERE p.created_at > $start AND p.created_at < $end
             OPTIONAL MATCH (reply:Post)-[:REPLY]->(p)
             WITH p, count(DISTINCT reply.author) AS reply_authors
             OPTIONAL MATCH (like:Post)-[:LIKE]->(p)
             WITH p, reply_authors, count(DISTINCT like.author) AS like_authors
             OPTIONAL MATCH (zap:Post)-[:ZAP]->(p)
             WITH p, reply_authors, like_authors, count(DISTINCT zap.author) AS zap_authors
             RETURN p.id AS id, p.kind AS kind, p.author AS author,
                    p.content AS content, p.created_at AS created_at,
                    reply_authors, like_authors, zap_authors",
        )
        .param("start", start)
        .param("end", end);

        let mut stream = self.client.graph.execute(q).await?;
        let mut candidates = Vec::new();
        while let Some(row) = stream.next().await? {
            candidates.push(row_to_candidate(&row)?);
        }
        Ok(candidates)
    }
}

fn row_to_candidate(row: &Row) -> Result<FeedCandidate, GraphError> {
    let kind: i64 = get(row, "kind")?;
    let item = ContentItem {
        id: get(row, "id")?,
        kind: u16::try_from(kind).map_err(|_| GraphError::Row(format!("kind {kind} out of range")))?,
        author: get(row, "author")?,
        body: get(row, "content")?,
        created_at: get(row, "created_at")?,
    };

    Ok(FeedCandidate {
        item,
        reply_authors: get(row, "reply_authors")?,
        like_authors: get(row, "like_authors")?,
        zap_authors: get(row, "zap_authors")?,
    })
}

pub(crate) fn get<T>(row: &Row, key: &str) -> Result<T, GraphError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    row.get::<T>(key)
        .map_err(|e| GraphError::Row(format!("{key}: {e}")))
}
