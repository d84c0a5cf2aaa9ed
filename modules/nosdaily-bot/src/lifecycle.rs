//! Subscription lifecycle: NoSubscription -> Active <-> Inactive.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use nosdaily_common::Subscriber;
use nosdaily_graph::SubscriberStore;

use crate::error::{bounded, BotError};
use crate::transport::ChannelKeys;

pub struct SubscriptionManager<S, K> {
    store: S,
    keys: K,
    call_timeout: Duration,
}

impl<S: SubscriberStore, K: ChannelKeys> SubscriptionManager<S, K> {
    pub fn new(store: S, keys: K, call_timeout: Duration) -> Self {
        Self {
            store,
            keys,
            call_timeout,
        }
    }

    /// Existing subscriber, or a new active one with a fresh channel secret.
    /// The flag is true only for the caller whose record was actually stored.
    pub async fn get_or_create(&self, identity: &str) -> Result<(Subscriber, bool), BotError> {
        if let Some(existing) = self.fetch(identity).await? {
            return Ok((existing, false));
        }

        let secret = self.keys.generate_secret()?;
        let created = bounded(
            self.call_timeout,
            "create subscriber",
            self.store.create_if_absent(identity, &secret, Utc::now()),
        )
        .await;

        match created {
            Ok(stored) => {
                let is_new = stored.channel_secret == secret;
                if is_new {
                    info!(pubkey = identity, "Subscriber created");
                }
                Ok((stored, is_new))
            }
            Err(e) => {
                // A concurrent first call may have won the uniqueness constraint.
                warn!(pubkey = identity, error = %e, "Create failed, re-reading subscriber");
                match self.fetch(identity).await? {
                    Some(existing) => Ok((existing, false)),
                    None => Err(e),
                }
            }
        }
    }

    /// Mark the subscriber inactive. `Ok(false)` for an inactive or unknown
    /// identity, which is left untouched.
    pub async fn terminate(&self, identity: &str) -> Result<bool, BotError> {
        match self.fetch(identity).await? {
            Some(subscriber) if subscriber.is_active() => {}
            _ => return Ok(false),
        }

        bounded(
            self.call_timeout,
            "terminate subscriber",
            self.store.terminate(identity, Utc::now()),
        )
        .await?;
        info!(pubkey = identity, "Subscriber terminated");
        Ok(true)
    }

    /// Reactivate an inactive subscriber. `Ok(false)` when already active,
    /// `SubscriberNotFound` when the identity never subscribed.
    pub async fn restore(&self, identity: &str) -> Result<bool, BotError> {
        let subscriber = self
            .fetch(identity)
            .await?
            .ok_or_else(|| BotError::SubscriberNotFound(identity.to_string()))?;

        if subscriber.is_active() {
            return Ok(false);
        }

        bounded(
            self.call_timeout,
            "restore subscriber",
            self.store.restore(identity, Utc::now()),
        )
        .await?;
        info!(pubkey = identity, "Subscriber restored");
        Ok(true)
    }

    /// Public identity of the subscriber's delivery channel.
    pub fn channel_identity(&self, subscriber: &Subscriber) -> Result<String, BotError> {
        self.keys.public_identity(&subscriber.channel_secret)
    }

    async fn fetch(&self, identity: &str) -> Result<Option<Subscriber>, BotError> {
        bounded(self.call_timeout, "load subscriber", self.store.get(identity)).await
    }
}
