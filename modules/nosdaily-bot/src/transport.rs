// Transport seams.
//
// Messenger: publishes templated text notes that reference identities and
// content items by position (`#[n]`).
// ChannelKeys: issues channel secrets and derives their public identity.
//
// Production implementations live in `nostr.rs`; fakes in `testing.rs`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BotError;

/// Identity a message is signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Bot,
    /// A subscriber's dedicated channel, by its secret.
    Channel(String),
}

/// Positional reference resolved by the transport (`#[n]` is `refs[n]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRef {
    Identity(String),
    Content(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub sender: Sender,
    pub text: String,
    pub refs: Vec<MessageRef>,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), BotError>;
}

pub trait ChannelKeys: Send + Sync {
    /// Fresh private credential for a new delivery channel.
    fn generate_secret(&self) -> Result<String, BotError>;

    /// Public identity of the channel owning `secret`.
    fn public_identity(&self, secret: &str) -> Result<String, BotError>;
}

#[async_trait]
impl<T: Messenger + ?Sized> Messenger for Arc<T> {
    async fn send(&self, message: &OutboundMessage) -> Result<(), BotError> {
        (**self).send(message).await
    }
}

impl<T: ChannelKeys + ?Sized> ChannelKeys for Arc<T> {
    fn generate_secret(&self) -> Result<String, BotError> {
        (**self).generate_secret()
    }

    fn public_identity(&self, secret: &str) -> Result<String, BotError> {
        (**self).public_identity(secret)
    }
}
