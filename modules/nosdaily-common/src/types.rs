use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Event kinds ---

pub const KIND_TEXT_NOTE: u16 = 1;
pub const KIND_CONTACT_LIST: u16 = 3;
pub const KIND_REACTION: u16 = 7;
pub const KIND_ZAP_RECEIPT: u16 = 9735;

/// Kinds the ingestor subscribes to. Everything else is ignored upstream of the store.
pub const INGESTED_KINDS: [u16; 4] = [
    KIND_TEXT_NOTE,
    KIND_CONTACT_LIST,
    KIND_REACTION,
    KIND_ZAP_RECEIPT,
];

// --- Scoring weights ---

pub const REPLY_WEIGHT: i64 = 15;
pub const LIKE_WEIGHT: i64 = 10;
pub const ZAP_WEIGHT: i64 = 50;

/// Convert unix seconds to a UTC timestamp. Out-of-range values collapse to the epoch.
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// --- Graph entities ---

/// An addressable unit of content stored as a `Post` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub kind: u16,
    pub author: String,
    pub body: String,
    /// Unix seconds, as carried on the wire.
    pub created_at: i64,
}

/// A content item inside a ranking window together with its distinct-author
/// interaction counts. Produced by a `FeedSource`, scored by the ranker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCandidate {
    pub item: ContentItem,
    pub reply_authors: i64,
    pub like_authors: i64,
    pub zap_authors: i64,
}

impl FeedCandidate {
    pub fn score(&self) -> i64 {
        REPLY_WEIGHT * self.reply_authors
            + LIKE_WEIGHT * self.like_authors
            + ZAP_WEIGHT * self.zap_authors
    }
}

/// A ranked feed entry. Serialized field names follow the public feed API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredItem {
    #[serde(rename = "event_id")]
    pub id: String,
    pub kind: u16,
    #[serde(rename = "pubkey")]
    pub author: String,
    #[serde(rename = "content")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

impl From<FeedCandidate> for ScoredItem {
    fn from(candidate: FeedCandidate) -> Self {
        let score = candidate.score();
        let FeedCandidate { item, .. } = candidate;
        Self {
            id: item.id,
            kind: item.kind,
            author: item.author,
            body: item.body,
            created_at: from_unix(item.created_at),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub pubkey: String,
    /// Private credential of the subscriber's dedicated delivery channel.
    pub channel_secret: String,
    pub subscribed_at: DateTime<Utc>,
    /// `None` while the subscription is active.
    pub unsubscribed_at: Option<DateTime<Utc>>,
    /// End of the last delivered feed window.
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn is_active(&self) -> bool {
        self.unsubscribed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(replies: i64, likes: i64, zaps: i64) -> FeedCandidate {
        FeedCandidate {
            item: ContentItem {
                id: "a".into(),
                kind: KIND_TEXT_NOTE,
                author: "alice".into(),
                body: "gm".into(),
                created_at: 1_700_000_000,
            },
            reply_authors: replies,
            like_authors: likes,
            zap_authors: zaps,
        }
    }

    #[test]
    fn score_weights_each_interaction_type() {
        assert_eq!(candidate(2, 1, 0).score(), 40);
        assert_eq!(candidate(0, 0, 1).score(), 50);
        assert_eq!(candidate(0, 0, 0).score(), 0);
    }

    #[test]
    fn scored_item_serializes_with_feed_field_names() {
        let item = ScoredItem::from(candidate(1, 0, 0));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["event_id"], "a");
        assert_eq!(json["pubkey"], "alice");
        assert_eq!(json["content"], "gm");
        assert_eq!(json["score"], 15);
    }

    #[test]
    fn subscriber_activity_follows_unsubscribed_at() {
        let mut sub = Subscriber {
            pubkey: "p".into(),
            channel_secret: "s".into(),
            subscribed_at: from_unix(0),
            unsubscribed_at: None,
            last_delivered_at: None,
        };
        assert!(sub.is_active());
        sub.unsubscribed_at = Some(from_unix(10));
        assert!(!sub.is_active());
    }
}
