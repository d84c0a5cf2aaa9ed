//! Mention command dispatcher.
//!
//! Consumes mentions of the bot one at a time, in arrival order, and drives
//! the subscription lifecycle from `#subscribe` / `#unsubscribe` commands.
//! A failing event is logged and skipped; the loop only stops on shutdown
//! or when the stream closes.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use nosdaily_common::{InboundEvent, Subscriber};
use nosdaily_graph::SubscriberStore;

use crate::error::{bounded, BotError};
use crate::lifecycle::SubscriptionManager;
use crate::shutdown::wait_for_shutdown;
use crate::transport::{ChannelKeys, MessageRef, Messenger, OutboundMessage, Sender};

pub const WELCOME_TEMPLATE: &str =
    "Hello, #[0]! Your nossence recommendations is ready, follow: #[1] to fetch your own feed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
}

/// Command carried by a mention body. Tokens are whitespace separated,
/// case-insensitive, and may end in punctuation. `#subscribe` wins when
/// both commands appear.
pub fn parse_command(body: &str) -> Option<Command> {
    let mut unsubscribe = false;

    for token in body.split_whitespace() {
        let token = token
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .to_ascii_lowercase();
        match token.as_str() {
            "#subscribe" => return Some(Command::Subscribe),
            "#unsubscribe" => unsubscribe = true,
            _ => {}
        }
    }

    unsubscribe.then_some(Command::Unsubscribe)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// New subscriber; welcome sent.
    Subscribed,
    /// Inactive subscriber reactivated; welcome sent.
    Resubscribed,
    /// Already active; nothing sent.
    AlreadyActive,
    Unsubscribed,
    /// No command, or the event was the bot's own.
    Ignored,
}

pub struct MentionDispatcher<S, K, M> {
    manager: SubscriptionManager<S, K>,
    messenger: M,
    bot_identity: String,
    call_timeout: Duration,
}

impl<S, K, M> MentionDispatcher<S, K, M>
where
    S: SubscriberStore,
    K: ChannelKeys,
    M: Messenger,
{
    pub fn new(
        manager: SubscriptionManager<S, K>,
        messenger: M,
        bot_identity: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            messenger,
            bot_identity: bot_identity.into(),
            call_timeout,
        }
    }

    /// Handle one mention.
    pub async fn handle(&self, event: &InboundEvent) -> Result<CommandOutcome, BotError> {
        if event.pubkey == self.bot_identity {
            return Ok(CommandOutcome::Ignored);
        }

        match parse_command(&event.content) {
            Some(Command::Subscribe) => self.subscribe(&event.pubkey).await,
            Some(Command::Unsubscribe) => {
                if !self.manager.terminate(&event.pubkey).await? {
                    debug!(pubkey = %event.pubkey, "No active subscription to end");
                }
                Ok(CommandOutcome::Unsubscribed)
            }
            None => Ok(CommandOutcome::Ignored),
        }
    }

    async fn subscribe(&self, identity: &str) -> Result<CommandOutcome, BotError> {
        info!(pubkey = identity, "Preparing channel");
        let (subscriber, is_new) = self.manager.get_or_create(identity).await?;

        let outcome = if is_new {
            CommandOutcome::Subscribed
        } else if self.manager.restore(identity).await? {
            CommandOutcome::Resubscribed
        } else {
            info!(pubkey = identity, "Already subscribed, skipping welcome");
            return Ok(CommandOutcome::AlreadyActive);
        };

        // The subscription stands even if the greeting is lost.
        if let Err(e) = self.welcome(&subscriber).await {
            warn!(pubkey = identity, error = %e, "Failed to send welcome message");
        } else {
            info!(pubkey = identity, ?outcome, "Sent welcome message");
        }
        Ok(outcome)
    }

    async fn welcome(&self, subscriber: &Subscriber) -> Result<(), BotError> {
        let channel = self.manager.channel_identity(subscriber)?;
        let message = OutboundMessage {
            sender: Sender::Bot,
            text: WELCOME_TEMPLATE.to_string(),
            refs: vec![
                MessageRef::Identity(subscriber.pubkey.clone()),
                MessageRef::Identity(channel),
            ],
        };
        bounded(self.call_timeout, "welcome message", self.messenger.send(&message)).await
    }

    /// Consume mentions until shutdown or until the stream closes.
    pub async fn run(
        &self,
        mut mentions: mpsc::Receiver<InboundEvent>,
        shutdown: watch::Receiver<bool>,
    ) {
        info!("Listening for subscribe messages");
        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    info!("Mention dispatcher shutting down");
                    break;
                }
                next = mentions.recv() => match next {
                    Some(event) => {
                        if let Err(e) = self.handle(&event).await {
                            warn!(id = %event.id, pubkey = %event.pubkey, error = %e, "Mention handling failed");
                        }
                    }
                    None => {
                        info!("Mention stream closed");
                        break;
                    }
                },
            }
        }
    }
}
