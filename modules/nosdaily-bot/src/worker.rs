//! Batch delivery worker.
//!
//! A cycle walks every active subscriber with a keyset cursor over identity
//! keys, one page of `batch_size` at a time. Each subscriber gets the feed
//! for their own window, sent over their dedicated channel. One subscriber
//! failing never stops the rest of the page.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use nosdaily_common::{ScoredItem, Subscriber};
use nosdaily_graph::{FeedSource, SubscriberStore};

use crate::error::{bounded, BotError};
use crate::ranking::FeedRanker;
use crate::transport::{MessageRef, Messenger, OutboundMessage, Sender};

pub const DIGEST_HEADER: &str = "Your nossence digest, #[0]:";

#[derive(Debug, Clone, Copy)]
pub struct DeliverySettings {
    /// Maximum look-back of a feed window.
    pub window: TimeDelta,
    pub feed_limit: usize,
    /// Subscribers delivered more recently than this are skipped.
    pub min_gap: TimeDelta,
}

impl DeliverySettings {
    pub fn new(window_hours: i64, feed_limit: usize, interval: Duration) -> Self {
        Self {
            window: TimeDelta::try_hours(window_hours).unwrap_or(TimeDelta::MAX),
            feed_limit,
            min_gap: TimeDelta::from_std(interval / 2).unwrap_or(TimeDelta::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { items: usize },
    RecentlyDelivered,
    EmptyFeed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub empty: usize,
    pub failed: usize,
    /// Cursor for the next page; `None` once the last page has been read.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct DeliveryWorker<S, F, M> {
    subscribers: S,
    ranker: FeedRanker<F>,
    messenger: M,
    settings: DeliverySettings,
    call_timeout: Duration,
}

impl<S, F, M> DeliveryWorker<S, F, M>
where
    S: SubscriberStore,
    F: FeedSource,
    M: Messenger,
{
    pub fn new(
        subscribers: S,
        ranker: FeedRanker<F>,
        messenger: M,
        settings: DeliverySettings,
        call_timeout: Duration,
    ) -> Self {
        Self {
            subscribers,
            ranker,
            messenger,
            settings,
            call_timeout,
        }
    }

    /// Deliver to every active subscriber, page by page.
    pub async fn run_cycle(&self, batch_size: usize, now: DateTime<Utc>) -> Result<CycleReport, BotError> {
        let mut report = CycleReport::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.batch(batch_size, cursor.as_deref(), now).await?;
            report.pages += 1;
            report.delivered += page.delivered;
            report.skipped += page.skipped;
            report.empty += page.empty;
            report.failed += page.failed;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            pages = report.pages,
            delivered = report.delivered,
            skipped = report.skipped,
            empty = report.empty,
            failed = report.failed,
            "Delivery cycle complete"
        );
        Ok(report)
    }

    /// Deliver to one page of up to `batch_size` active subscribers after `cursor`.
    /// Only a failure to read the page itself is an error.
    pub async fn batch(
        &self,
        batch_size: usize,
        cursor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, BotError> {
        let page = bounded(
            self.call_timeout,
            "subscriber page",
            self.subscribers.active_page(cursor, batch_size),
        )
        .await?;

        let mut report = BatchReport::default();
        for subscriber in &page {
            match self.deliver(subscriber, now).await {
                Ok(Delivery::Sent { items }) => {
                    debug!(pubkey = %subscriber.pubkey, items, "Feed delivered");
                    report.delivered += 1;
                }
                Ok(Delivery::RecentlyDelivered) => report.skipped += 1,
                Ok(Delivery::EmptyFeed) => report.empty += 1,
                Err(e) => {
                    warn!(pubkey = %subscriber.pubkey, error = %e, "Feed delivery failed");
                    report.failed += 1;
                }
            }
        }

        if batch_size > 0 && page.len() == batch_size {
            report.next_cursor = page.last().map(|s| s.pubkey.clone());
        }
        Ok(report)
    }

    /// Compute and send one subscriber's feed, then advance their cursor.
    pub async fn deliver(&self, subscriber: &Subscriber, now: DateTime<Utc>) -> Result<Delivery, BotError> {
        if let Some(last) = subscriber.last_delivered_at {
            if now.signed_duration_since(last) < self.settings.min_gap {
                return Ok(Delivery::RecentlyDelivered);
            }
        }

        let (start, end) = self.window(subscriber, now);
        let feed = self
            .ranker
            .get_feed(&subscriber.pubkey, start, end, self.settings.feed_limit)
            .await?;
        if feed.is_empty() {
            return Ok(Delivery::EmptyFeed);
        }

        let message = digest_message(subscriber, &feed);
        bounded(self.call_timeout, "digest message", self.messenger.send(&message)).await?;
        bounded(
            self.call_timeout,
            "mark delivered",
            self.subscribers.mark_delivered(&subscriber.pubkey, end),
        )
        .await?;

        Ok(Delivery::Sent { items: feed.len() })
    }

    /// `(max(last delivery - 1s, now - window), now)`.
    ///
    /// Both bounds are exclusive and the previous window ended at the last
    /// delivery, so the next one reopens that second.
    fn window(&self, subscriber: &Subscriber, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let earliest = now
            .checked_sub_signed(self.settings.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let start = subscriber.last_delivered_at.map_or(earliest, |last| {
            last.checked_sub_signed(TimeDelta::seconds(1))
                .unwrap_or(last)
                .max(earliest)
        });
        (start, now)
    }
}

/// Digest sent over the subscriber's channel: `#[0]` is the recipient and
/// `#[n]` the n-th ranked item.
pub fn digest_message(subscriber: &Subscriber, feed: &[ScoredItem]) -> OutboundMessage {
    let mut text = DIGEST_HEADER.to_string();
    let mut refs = vec![MessageRef::Identity(subscriber.pubkey.clone())];

    for (i, item) in feed.iter().enumerate() {
        let n = i + 1;
        text.push_str(&format!("\n{n}. #[{n}] (score {})", item.score));
        refs.push(MessageRef::Content(item.id.clone()));
    }

    OutboundMessage {
        sender: Sender::Channel(subscriber.channel_secret.clone()),
        text,
        refs,
    }
}
