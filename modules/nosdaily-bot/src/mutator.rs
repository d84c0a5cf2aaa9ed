//! Event mutator: turns one inbound event into one atomic batch of graph upserts.

use std::time::Duration;

use tracing::{debug, warn};

use nosdaily_common::invoice::zap_amount;
use nosdaily_common::{ContentEvent, ContentItem, InboundEvent, InvoiceError};
use nosdaily_graph::{GraphMutation, MutationStore};

use crate::error::{bounded, BotError};

/// What happened to an event that was processed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Kind outside the ingested set. Nothing written.
    Unsupported,
    /// Payment receipt with no referenced item. Nothing written.
    ZapWithoutTarget,
}

/// Mutation batch for a classified event, or the reason nothing is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationPlan {
    Apply(Vec<GraphMutation>),
    Skip(MutationOutcome),
}

/// Compute the mutations for an event. Pure; the invoice is decoded here so
/// a malformed one fails before anything reaches the store.
pub fn plan(event: &ContentEvent) -> Result<MutationPlan, InvoiceError> {
    let plan = match event {
        ContentEvent::Post { item, reply_to } => {
            let mut batch = authored(item);
            if let Some(to) = reply_to {
                batch.push(GraphMutation::MergeReply {
                    from: item.id.clone(),
                    to: to.clone(),
                });
            }
            MutationPlan::Apply(batch)
        }
        ContentEvent::Reaction { item, target } => {
            let mut batch = authored(item);
            if let Some(to) = target {
                batch.push(GraphMutation::MergeLike {
                    from: item.id.clone(),
                    to: to.clone(),
                });
            }
            MutationPlan::Apply(batch)
        }
        ContentEvent::FollowList {
            author,
            followees,
            created_at,
        } => MutationPlan::Apply(vec![GraphMutation::ReplaceFollows {
            author: author.clone(),
            followees: followees.clone(),
            created_at: *created_at,
        }]),
        ContentEvent::PaymentReceipt {
            item,
            target,
            invoice,
        } => {
            let amount = zap_amount(invoice.as_deref().ok_or(InvoiceError::Missing)?)?;
            match target {
                None => MutationPlan::Skip(MutationOutcome::ZapWithoutTarget),
                Some(to) => {
                    let mut batch = authored(item);
                    batch.push(GraphMutation::MergeZap {
                        from: item.id.clone(),
                        to: to.clone(),
                        amount,
                    });
                    MutationPlan::Apply(batch)
                }
            }
        }
        ContentEvent::Unsupported { .. } => MutationPlan::Skip(MutationOutcome::Unsupported),
    };
    Ok(plan)
}

fn authored(item: &ContentItem) -> Vec<GraphMutation> {
    vec![
        GraphMutation::MergeUser {
            pubkey: item.author.clone(),
        },
        GraphMutation::MergeItem(item.clone()),
        GraphMutation::MergeCreate {
            author: item.author.clone(),
            item_id: item.id.clone(),
        },
    ]
}

/// Applies inbound events to the graph, one transaction per event.
pub struct EventMutator<S> {
    store: S,
    call_timeout: Duration,
}

impl<S: MutationStore> EventMutator<S> {
    pub fn new(store: S, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Apply one event. Store failures are surfaced untouched; the caller
    /// decides whether to retry or drop.
    pub async fn apply(&self, event: &InboundEvent) -> Result<MutationOutcome, BotError> {
        let classified = ContentEvent::classify(event);

        match plan(&classified)? {
            MutationPlan::Skip(MutationOutcome::Unsupported) => {
                warn!(id = %event.id, kind = event.kind, "Unsupported event kind, skipping");
                Ok(MutationOutcome::Unsupported)
            }
            MutationPlan::Skip(outcome) => {
                debug!(id = %event.id, kind = classified.kind_name(), ?outcome, "Nothing to write");
                Ok(outcome)
            }
            MutationPlan::Apply(batch) => {
                bounded(self.call_timeout, "graph transaction", self.store.apply(&batch)).await?;
                debug!(
                    id = %event.id,
                    kind = classified.kind_name(),
                    mutations = batch.len(),
                    "Event applied"
                );
                Ok(MutationOutcome::Applied)
            }
        }
    }
}
