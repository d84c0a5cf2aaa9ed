//! Nostr transport: relay connection, subscriptions, and signed text notes.

use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use nosdaily_common::{InboundEvent, INGESTED_KINDS};

use crate::error::{bounded, BotError};
use crate::shutdown::wait_for_shutdown;
use crate::transport::{ChannelKeys, MessageRef, Messenger, OutboundMessage, Sender};

fn key_error(e: impl std::fmt::Display) -> BotError {
    BotError::Key(e.to_string())
}

fn transport_error(e: impl std::fmt::Display) -> BotError {
    BotError::Transport(e.to_string())
}

/// Channel secrets are ordinary nostr secret keys.
pub struct NostrChannelKeys;

impl ChannelKeys for NostrChannelKeys {
    fn generate_secret(&self) -> Result<String, BotError> {
        Ok(Keys::generate().secret_key().to_secret_hex())
    }

    fn public_identity(&self, secret: &str) -> Result<String, BotError> {
        let keys = Keys::parse(secret).map_err(key_error)?;
        Ok(keys.public_key().to_hex())
    }
}

/// Where routed notifications go.
pub struct Routes {
    pub mentions: (SubscriptionId, mpsc::Sender<InboundEvent>),
    pub content: Option<(SubscriptionId, mpsc::Sender<InboundEvent>)>,
}

pub struct NostrTransport {
    client: Client,
    keys: Keys,
    call_timeout: Duration,
}

impl NostrTransport {
    /// Connect the bot identity (hex or bech32 secret) to every relay.
    pub async fn connect(
        secret_key: &str,
        relays: &[String],
        call_timeout: Duration,
    ) -> Result<Self, BotError> {
        let keys = Keys::parse(secret_key).map_err(key_error)?;
        let client = Client::new(keys.clone());

        for url in relays {
            bounded(call_timeout, "add relay", async {
                client.add_relay(url.as_str()).await.map_err(transport_error)
            })
            .await?;
            info!(relay = %url, "Added relay");
        }
        client.connect().await;

        Ok(Self {
            client,
            keys,
            call_timeout,
        })
    }

    /// Hex public key of the bot.
    pub fn identity(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Text notes mentioning the bot, from now on.
    pub async fn subscribe_mentions(&self) -> Result<SubscriptionId, BotError> {
        let filter = Filter::new()
            .kind(Kind::TextNote)
            .pubkey(self.keys.public_key())
            .since(Timestamp::now());
        self.subscribe("mention subscription", filter).await
    }

    /// Every ingested kind, from now on.
    pub async fn subscribe_content(&self) -> Result<SubscriptionId, BotError> {
        let filter = Filter::new()
            .kinds(INGESTED_KINDS.iter().map(|k| Kind::from(*k)))
            .since(Timestamp::now());
        self.subscribe("content subscription", filter).await
    }

    async fn subscribe(&self, what: &'static str, filter: Filter) -> Result<SubscriptionId, BotError> {
        let output = bounded(self.call_timeout, what, async {
            self.client.subscribe(filter, None).await.map_err(transport_error)
        })
        .await?;
        info!(id = %output.val, "{what} opened");
        Ok(output.val)
    }

    /// Forward relay events to their consumers until shutdown.
    ///
    /// Mentions apply backpressure; content is dropped when the ingestor
    /// falls behind.
    pub async fn route(&self, routes: Routes, shutdown: watch::Receiver<bool>) {
        let mut notifications = self.client.notifications();
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);

        loop {
            let notification = tokio::select! {
                biased;
                _ = &mut stop => break,
                n = notifications.recv() => n,
            };

            let (subscription_id, event) = match notification {
                Ok(RelayPoolNotification::Event {
                    subscription_id,
                    event,
                    ..
                }) => (subscription_id, event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Relay notifications lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("Relay notifications closed");
                    break;
                }
            };

            let inbound = to_inbound(&event);
            if subscription_id == routes.mentions.0 {
                if routes.mentions.1.send(inbound).await.is_err() {
                    info!("Mention consumer gone, stopping router");
                    break;
                }
            } else if let Some((content_id, tx)) = &routes.content {
                if subscription_id == *content_id {
                    if let Err(e) = tx.try_send(inbound) {
                        debug!(error = %e, "Dropping content event");
                    }
                }
            }
        }
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
        info!("Disconnected from relays");
    }
}

#[async_trait]
impl Messenger for NostrTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), BotError> {
        let keys = match &message.sender {
            Sender::Bot => self.keys.clone(),
            Sender::Channel(secret) => Keys::parse(secret).map_err(key_error)?,
        };

        let event = build_note(message, &keys)?;
        let output = bounded(self.call_timeout, "publish note", async {
            self.client.send_event(&event).await.map_err(transport_error)
        })
        .await?;
        if output.success.is_empty() {
            return Err(BotError::Transport(format!(
                "no relay accepted event {}",
                output.id()
            )));
        }
        debug!(id = %output.id(), relays = output.success.len(), "Published text note");
        Ok(())
    }
}

/// Signed text note whose tags line up with `message.refs`, so `#[n]` is tag n.
/// A ref to the signer itself is kept.
fn build_note(message: &OutboundMessage, keys: &Keys) -> Result<Event, BotError> {
    let tags = message
        .refs
        .iter()
        .map(|r| match r {
            MessageRef::Identity(pk) => PublicKey::from_hex(pk)
                .map(Tag::public_key)
                .map_err(key_error),
            MessageRef::Content(id) => EventId::from_hex(id)
                .map(Tag::event)
                .map_err(transport_error),
        })
        .collect::<Result<Vec<_>, _>>()?;

    EventBuilder::text_note(&message.text)
        .tags(tags)
        .allow_self_tagging()
        .sign_with_keys(keys)
        .map_err(key_error)
}

fn to_inbound(event: &Event) -> InboundEvent {
    InboundEvent {
        id: event.id.to_hex(),
        kind: event.kind.as_u16(),
        pubkey: event.pubkey.to_hex(),
        content: event.content.clone(),
        created_at: i64::try_from(event.created_at.as_u64()).unwrap_or(i64::MAX),
        tags: event.tags.iter().map(|t| t.clone().to_vec()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_identity_matches_generated_key() {
        let keys = NostrChannelKeys;
        let secret = keys.generate_secret().unwrap();

        let identity = keys.public_identity(&secret).unwrap();
        let expected = Keys::parse(&secret).unwrap().public_key().to_hex();

        assert_eq!(identity, expected);
        assert_eq!(identity.len(), 64);
    }

    #[test]
    fn rejects_malformed_secret() {
        assert!(matches!(
            NostrChannelKeys.public_identity("not-a-key"),
            Err(BotError::Key(_))
        ));
    }

    #[test]
    fn converts_signed_event() {
        let keys = Keys::generate();
        let mentioned = Keys::generate().public_key();
        let target = EventBuilder::text_note("root")
            .sign_with_keys(&keys)
            .unwrap()
            .id;
        let event = EventBuilder::text_note("gm")
            .tags([Tag::event(target), Tag::public_key(mentioned)])
            .sign_with_keys(&keys)
            .unwrap();

        let inbound = to_inbound(&event);

        assert_eq!(inbound.kind, 1);
        assert_eq!(inbound.content, "gm");
        assert_eq!(inbound.pubkey, keys.public_key().to_hex());
        assert_eq!(inbound.first_tag_value("e"), Some(target.to_hex().as_str()));
        assert_eq!(inbound.first_tag_value("p"), Some(mentioned.to_hex().as_str()));
    }

    #[test]
    fn note_tags_follow_refs_even_when_naming_the_signer() {
        let bot = Keys::generate();
        let subscriber = Keys::generate().public_key().to_hex();
        let channel = Keys::generate().public_key().to_hex();
        let message = OutboundMessage {
            sender: Sender::Bot,
            text: "#[0] #[1] #[2]".into(),
            refs: vec![
                MessageRef::Identity(subscriber.clone()),
                MessageRef::Identity(bot.public_key().to_hex()),
                MessageRef::Identity(channel.clone()),
            ],
        };

        let inbound = to_inbound(&build_note(&message, &bot).unwrap());

        let tagged: Vec<&str> = inbound.tag_values("p").collect();
        assert_eq!(
            tagged,
            vec![
                subscriber.as_str(),
                bot.public_key().to_hex().as_str(),
                channel.as_str()
            ]
        );
        assert_eq!(inbound.pubkey, bot.public_key().to_hex());
    }

    #[test]
    fn note_with_malformed_ref_is_rejected() {
        let message = OutboundMessage {
            sender: Sender::Bot,
            text: "#[0]".into(),
            refs: vec![MessageRef::Identity("not-a-key".into())],
        };

        assert!(matches!(
            build_note(&message, &Keys::generate()),
            Err(BotError::Key(_))
        ));
    }
}
