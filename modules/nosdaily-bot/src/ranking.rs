use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use nosdaily_common::{FeedCandidate, ScoredItem};
use nosdaily_graph::FeedSource;

use crate::error::{bounded, BotError};

/// Feed ranking engine. Read-only; every call can be retried freely.
pub struct FeedRanker<S> {
    source: S,
    call_timeout: Duration,
}

impl<S: FeedSource> FeedRanker<S> {
    pub fn new(source: S, call_timeout: Duration) -> Self {
        Self {
            source,
            call_timeout,
        }
    }

    /// Items created strictly inside `(start, end)`, best first, at most `limit`.
    pub async fn rank(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, BotError> {
        if limit == 0 || start >= end {
            return Ok(Vec::new());
        }

        let candidates = bounded(
            self.call_timeout,
            "feed query",
            self.source.candidates(start.timestamp(), end.timestamp()),
        )
        .await?;

        Ok(rank_candidates(candidates, limit))
    }

    /// Feed requested on behalf of `identity`. Ranking is global; the
    /// identity only scopes logging.
    pub async fn get_feed(
        &self,
        identity: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScoredItem>, BotError> {
        let feed = self.rank(start, end, limit).await?;
        debug!(pubkey = identity, %start, %end, items = feed.len(), "Feed computed");
        Ok(feed)
    }
}

/// Score desc, then newest first, then id, then truncate.
pub fn rank_candidates(candidates: Vec<FeedCandidate>, limit: usize) -> Vec<ScoredItem> {
    let mut scored: Vec<ScoredItem> = candidates.into_iter().map(ScoredItem::from).collect();
    scored.sort_by(feed_order);
    scored.truncate(limit);
    scored
}

fn feed_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
