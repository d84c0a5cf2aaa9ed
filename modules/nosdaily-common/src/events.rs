//! Inbound protocol events and their classification into graph-relevant variants.

use serde::{Deserialize, Serialize};

use crate::types::{
    ContentItem, KIND_CONTACT_LIST, KIND_REACTION, KIND_TEXT_NOTE, KIND_ZAP_RECEIPT,
};

/// A protocol event as delivered by the transport layer, already verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub kind: u16,
    pub pubkey: String,
    pub content: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Ordered tag lists, e.g. `["e", "<id>", "<relay>"]`.
    pub tags: Vec<Vec<String>>,
}

impl InboundEvent {
    /// Values of every tag named `name`, in event order. Tags without a value are skipped.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1).map(String::as_str))
    }

    pub fn first_tag_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tag_values(name).next()
    }

    pub fn last_tag_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tag_values(name).last()
    }

    fn to_item(&self) -> ContentItem {
        ContentItem {
            id: self.id.clone(),
            kind: self.kind,
            author: self.pubkey.clone(),
            body: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

/// Graph-relevant meaning of an inbound event.
///
/// Only the first `e` tag is ever used as the interaction target: a reply or
/// reaction points at exactly one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    Post {
        item: ContentItem,
        reply_to: Option<String>,
    },
    Reaction {
        item: ContentItem,
        target: Option<String>,
    },
    /// Full snapshot of the author's follows.
    FollowList {
        author: String,
        followees: Vec<String>,
        created_at: i64,
    },
    PaymentReceipt {
        item: ContentItem,
        target: Option<String>,
        /// Raw `bolt11` tag value (last one wins).
        invoice: Option<String>,
    },
    Unsupported {
        kind: u16,
    },
}

impl ContentEvent {
    pub fn classify(event: &InboundEvent) -> Self {
        let first_ref = || event.first_tag_value("e").map(str::to_string);

        match event.kind {
            KIND_TEXT_NOTE => ContentEvent::Post {
                item: event.to_item(),
                reply_to: first_ref(),
            },
            KIND_REACTION => ContentEvent::Reaction {
                item: event.to_item(),
                target: first_ref(),
            },
            KIND_CONTACT_LIST => ContentEvent::FollowList {
                author: event.pubkey.clone(),
                followees: event.tag_values("p").map(str::to_string).collect(),
                created_at: event.created_at,
            },
            KIND_ZAP_RECEIPT => ContentEvent::PaymentReceipt {
                item: event.to_item(),
                target: first_ref(),
                invoice: event.last_tag_value("bolt11").map(str::to_string),
            },
            kind => ContentEvent::Unsupported { kind },
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ContentEvent::Post { .. } => "post",
            ContentEvent::Reaction { .. } => "reaction",
            ContentEvent::FollowList { .. } => "follow_list",
            ContentEvent::PaymentReceipt { .. } => "payment_receipt",
            ContentEvent::Unsupported { .. } => "unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u16, tags: &[&[&str]]) -> InboundEvent {
        InboundEvent {
            id: "ev1".into(),
            kind,
            pubkey: "alice".into(),
            content: "hello".into(),
            created_at: 1_700_000_000,
            tags: tags
                .iter()
                .map(|t| t.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn post_uses_only_first_reference() {
        let ev = event(1, &[&["e", "root"], &["e", "parent"], &["p", "bob"]]);
        match ContentEvent::classify(&ev) {
            ContentEvent::Post { item, reply_to } => {
                assert_eq!(item.id, "ev1");
                assert_eq!(reply_to.as_deref(), Some("root"));
            }
            other => panic!("expected post, got {other:?}"),
        }
    }

    #[test]
    fn top_level_post_has_no_reply_target() {
        let ev = event(1, &[&["p", "bob"]]);
        assert!(matches!(
            ContentEvent::classify(&ev),
            ContentEvent::Post { reply_to: None, .. }
        ));
    }

    #[test]
    fn follow_list_collects_identity_tags_in_order() {
        let ev = event(3, &[&["p", "bob"], &["e", "x"], &["p", "carol"], &["p"]]);
        match ContentEvent::classify(&ev) {
            ContentEvent::FollowList { author, followees, .. } => {
                assert_eq!(author, "alice");
                assert_eq!(followees, vec!["bob".to_string(), "carol".to_string()]);
            }
            other => panic!("expected follow list, got {other:?}"),
        }
    }

    #[test]
    fn payment_receipt_takes_last_invoice_tag() {
        let ev = event(9735, &[&["bolt11", "lnbc1"], &["e", "target"], &["bolt11", "lnbc2"]]);
        match ContentEvent::classify(&ev) {
            ContentEvent::PaymentReceipt { target, invoice, .. } => {
                assert_eq!(target.as_deref(), Some("target"));
                assert_eq!(invoice.as_deref(), Some("lnbc2"));
            }
            other => panic!("expected payment receipt, got {other:?}"),
        }
    }

    #[test]
    fn tag_lookup_accepts_owned_names() {
        let ev = event(9735, &[&["e", "root"], &["bolt11", "lnbc1"], &["bolt11", "lnbc2"]]);
        let e = String::from("e");
        let bolt11 = String::from("bolt11");

        assert_eq!(ev.first_tag_value(&e), Some("root"));
        assert_eq!(ev.last_tag_value(&bolt11), Some("lnbc2"));
        assert_eq!(ev.first_tag_value("p"), None);
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        assert_eq!(
            ContentEvent::classify(&event(30023, &[])),
            ContentEvent::Unsupported { kind: 30023 }
        );
    }
}
