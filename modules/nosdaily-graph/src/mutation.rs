//! Idempotent mutation recipes issued against the graph.
//!
//! Every recipe is a MERGE (or a guarded replace), so re-applying the same
//! sequence leaves the graph unchanged.

use neo4rs::{query, Query};

use nosdaily_common::ContentItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphMutation {
    MergeUser {
        pubkey: String,
    },
    /// Properties are written on creation only; an existing item is never rewritten.
    MergeItem(ContentItem),
    /// Authorship edge. Requires both the user and the item to exist.
    MergeCreate {
        author: String,
        item_id: String,
    },
    /// Edges between two existing items. Missing endpoints make these a no-op.
    MergeReply {
        from: String,
        to: String,
    },
    MergeLike {
        from: String,
        to: String,
    },
    MergeZap {
        from: String,
        to: String,
        amount: i64,
    },
    /// Replace the author's FOLLOW edges with a new snapshot, unless a newer
    /// snapshot has already been applied.
    ReplaceFollows {
        author: String,
        followees: Vec<String>,
        created_at: i64,
    },
}

impl GraphMutation {
    pub fn name(&self) -> &'static str {
        match self {
            GraphMutation::MergeUser { .. } => "merge_user",
            GraphMutation::MergeItem(_) => "merge_item",
            GraphMutation::MergeCreate { .. } => "merge_create",
            GraphMutation::MergeReply { .. } => "merge_reply",
            GraphMutation::MergeLike { .. } => "merge_like",
            GraphMutation::MergeZap { .. } => "merge_zap",
            GraphMutation::ReplaceFollows { .. } => "replace_follows",
        }
    }

    pub fn to_query(&self) -> Query {
        match self {
            GraphMutation::MergeUser { pubkey } => {
                query("MERGE (:User {pubkey: $pubkey})").param("pubkey", pubkey.as_str())
            }
            GraphMutation::MergeItem(item) => query(
                "MERGE (p:Post {id: $id})
                 ON CREATE SET p.kind = $kind,
                               p.author = $author,
                               p.content = $content,
                               p.created_at = $created_at",
            )
            .param("id", item.id.as_str())
            .param("kind", i64::from(item.kind))
            .param("author", item.author.as_str())
            .param("content", item.body.as_str())
            .param("created_at", item.created_at),
            GraphMutation::MergeCreate { author, item_id } => query(
                "MATCH (u:User {pubkey: $author}), (p:Post {id: $id})
                 MERGE (u)-[:CREATE]->(p)",
            )
            .param("author", author.as_str())
            .param("id", item_id.as_str()),
            GraphMutation::MergeReply { from, to } => query(
                "MATCH (p:Post {id: $from}), (r:Post {id: $to})
                 MERGE (p)-[:REPLY]->(r)",
            )
            .param("from", from.as_str())
            .param("to", to.as_str()),
            GraphMutation::MergeLike { from, to } => query(
                "MATCH (p:Post {id: $from}), (r:Post {id: $to})
                 MERGE (p)-[:LIKE]->(r)",
            )
            .param("from", from.as_str())
            .param("to", to.as_str()),
            GraphMutation::MergeZap { from, to, amount } => query(
                "MATCH (p:Post {id: $from}), (r:Post {id: $to})
                 MERGE (p)-[z:ZAP]->(r)
                 SET z.amount = $amount",
            )
            .param("from", from.as_str())
            .param("to", to.as_str())
            .param("amount", *amount),
            GraphMutation::ReplaceFollows {
                author,
                followees,
                created_at,
            } => query(
                "MERGE (u:User {pubkey: $author})
                 WITH u
                 WHERE u.follows_at IS NULL OR u.follows_at <= $created_at
                 SET u.follows_at = $created_at
                 WITH u
                 OPTIONAL MATCH (u)-[old:FOLLOW]->()
                 DELETE old
                 WITH DISTINCT u
                 UNWIND $followees AS followee
                 MERGE (f:User {pubkey: followee})
                 MERGE (u)-[:FOLLOW]->(f)",
            )
            .param("author", author.as_str())
            .param("followees", followees.clone())
            .param("created_at", *created_at),
        }
    }
}
