// Store-adapter seams.
//
// MutationStore: atomic application of mutation recipes.
// FeedSource: read-only window scan with distinct-author interaction counts.
// SubscriberStore: subscriber records and the delivery cursor.
//
// Production implementations are GraphWriter, GraphReader and SubscriberGraph.
// MemoryGraph implements all three for tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nosdaily_common::{FeedCandidate, Subscriber};

use crate::{GraphError, GraphMutation};

#[async_trait]
pub trait MutationStore: Send + Sync {
    /// Apply every mutation in one transaction. Either all take effect or none do.
    async fn apply(&self, mutations: &[GraphMutation]) -> Result<(), GraphError>;
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Content items created strictly between `start` and `end` (unix seconds),
    /// with distinct-author counts of their incoming REPLY, LIKE and ZAP edges.
    async fn candidates(&self, start: i64, end: i64) -> Result<Vec<FeedCandidate>, GraphError>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get(&self, pubkey: &str) -> Result<Option<Subscriber>, GraphError>;

    /// Create the subscriber unless one exists for `pubkey`. Returns the stored
    /// record, which carries the existing channel secret if creation lost a race.
    async fn create_if_absent(
        &self,
        pubkey: &str,
        channel_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscriber, GraphError>;

    /// Set `unsubscribed_at`. A missing subscriber is a no-op.
    async fn terminate(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError>;

    /// Clear `unsubscribed_at` and refresh `subscribed_at`.
    async fn restore(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError>;

    /// Active subscribers ordered by identity key, strictly after `after`.
    async fn active_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Subscriber>, GraphError>;

    async fn mark_delivered(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError>;
}

// ---------------------------------------------------------------------------
// Arc<T> blankets
// ---------------------------------------------------------------------------

#[async_trait]
impl<T: MutationStore + ?Sized> MutationStore for Arc<T> {
    async fn apply(&self, mutations: &[GraphMutation]) -> Result<(), GraphError> {
        (**self).apply(mutations).await
    }
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Arc<T> {
    async fn candidates(&self, start: i64, end: i64) -> Result<Vec<FeedCandidate>, GraphError> {
        (**self).candidates(start, end).await
    }
}

#[async_trait]
impl<T: SubscriberStore + ?Sized> SubscriberStore for Arc<T> {
    async fn get(&self, pubkey: &str) -> Result<Option<Subscriber>, GraphError> {
        (**self).get(pubkey).await
    }

    async fn create_if_absent(
        &self,
        pubkey: &str,
        channel_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscriber, GraphError> {
        (**self).create_if_absent(pubkey, channel_secret, at).await
    }

    async fn terminate(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        (**self).terminate(pubkey, at).await
    }

    async fn restore(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        (**self).restore(pubkey, at).await
    }

    async fn active_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Subscriber>, GraphError> {
        (**self).active_page(after, limit).await
    }

    async fn mark_delivered(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        (**self).mark_delivered(pubkey, at).await
    }
}
