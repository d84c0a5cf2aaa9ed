// Test fakes for the transport seams.
//
// - RecordingMessenger (Messenger): keeps every sent message, can refuse chosen recipients
// - SequentialKeys (ChannelKeys): deterministic secrets, public identity "pub:<secret>"
//
// Plus helpers for building inbound events.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use nosdaily_common::InboundEvent;

use crate::error::BotError;
use crate::transport::{ChannelKeys, MessageRef, Messenger, OutboundMessage};

// ---------------------------------------------------------------------------
// RecordingMessenger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<OutboundMessage>>,
    refused: Mutex<HashSet<String>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every message whose first reference is `identity`.
    pub fn refuse(&self, identity: &str) {
        self.refused.lock().unwrap().insert(identity.to_string());
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages addressed to `identity` (first reference).
    pub fn sent_to(&self, identity: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|m| recipient(m) == Some(identity))
            .collect()
    }
}

fn recipient(message: &OutboundMessage) -> Option<&str> {
    match message.refs.first() {
        Some(MessageRef::Identity(pk)) => Some(pk.as_str()),
        _ => None,
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, message: &OutboundMessage) -> Result<(), BotError> {
        if let Some(to) = recipient(message) {
            if self.refused.lock().unwrap().contains(to) {
                return Err(BotError::Transport(format!("relay refused message to {to}")));
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SequentialKeys
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SequentialKeys {
    next: AtomicUsize,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelKeys for SequentialKeys {
    fn generate_secret(&self) -> Result<String, BotError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(format!("secret-{n}"))
    }

    fn public_identity(&self, secret: &str) -> Result<String, BotError> {
        Ok(format!("pub:{secret}"))
    }
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Kind-1 note from `author` mentioning `bot`.
pub fn mention(id: &str, author: &str, bot: &str, content: &str) -> InboundEvent {
    InboundEvent {
        id: id.to_string(),
        kind: nosdaily_common::KIND_TEXT_NOTE,
        pubkey: author.to_string(),
        content: content.to_string(),
        created_at: chrono::Utc::now().timestamp(),
        tags: vec![vec!["p".to_string(), bot.to_string()]],
    }
}

/// Kind-1 note, optionally replying to `reply_to`.
pub fn note(id: &str, author: &str, created_at: i64, reply_to: Option<&str>) -> InboundEvent {
    InboundEvent {
        id: id.to_string(),
        kind: nosdaily_common::KIND_TEXT_NOTE,
        pubkey: author.to_string(),
        content: format!("note {id}"),
        created_at,
        tags: reply_to
            .map(|to| vec![vec!["e".to_string(), to.to_string()]])
            .unwrap_or_default(),
    }
}
