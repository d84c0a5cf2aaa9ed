//! In-memory graph with the same semantics as the Cypher recipes.
//! Backs unit and integration tests: no database, no Docker.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nosdaily_common::{ContentItem, FeedCandidate, Subscriber};

use crate::{FeedSource, GraphError, GraphMutation, MutationStore, SubscriberStore};

/// Full graph state. Comparable, so tests can assert idempotency by snapshot equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub users: BTreeSet<String>,
    pub items: BTreeMap<String, ContentItem>,
    /// (author, item id)
    pub created: BTreeSet<(String, String)>,
    /// (from item, to item)
    pub replies: BTreeSet<(String, String)>,
    pub likes: BTreeSet<(String, String)>,
    pub zaps: BTreeMap<(String, String), i64>,
    /// (follower, followee)
    pub follows: BTreeSet<(String, String)>,
    pub follows_at: BTreeMap<String, i64>,
    pub subscribers: BTreeMap<String, Subscriber>,
}

pub struct MemoryGraph {
    state: Mutex<GraphSnapshot>,
    unavailable: AtomicBool,
    fail_on: Mutex<Option<&'static str>>,
    failing_subscribers: Mutex<BTreeSet<String>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphSnapshot::default()),
            unavailable: AtomicBool::new(false),
            fail_on: Mutex::new(None),
            failing_subscribers: Mutex::new(BTreeSet::new()),
        }
    }

    /// Copy of the current graph state (for test assertions).
    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.lock().unwrap().clone()
    }

    /// Make every call fail as if the store connection were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail any transaction that reaches a mutation with this name.
    pub fn fail_on_mutation(&self, name: Option<&'static str>) {
        *self.fail_on.lock().unwrap() = name;
    }

    /// Fail every subscriber call for `pubkey`.
    pub fn fail_subscriber(&self, pubkey: &str) {
        self.failing_subscribers
            .lock()
            .unwrap()
            .insert(pubkey.to_string());
    }

    pub fn insert_subscriber(&self, subscriber: Subscriber) {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .insert(subscriber.pubkey.clone(), subscriber);
    }

    pub fn subscriber(&self, pubkey: &str) -> Option<Subscriber> {
        self.state.lock().unwrap().subscribers.get(pubkey).cloned()
    }

    /// Followees of `author`, sorted.
    pub fn follows_of(&self, author: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .follows
            .iter()
            .filter(|(from, _)| from == author)
            .map(|(_, to)| to.clone())
            .collect()
    }

    fn check_available(&self) -> Result<(), GraphError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::Unavailable("memory graph marked unavailable".into()));
        }
        Ok(())
    }

    fn check_subscriber(&self, pubkey: &str) -> Result<(), GraphError> {
        self.check_available()?;
        if self.failing_subscribers.lock().unwrap().contains(pubkey) {
            return Err(GraphError::Unavailable(format!("subscriber {pubkey} marked failing")));
        }
        Ok(())
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_one(state: &mut GraphSnapshot, mutation: &GraphMutation) {
    let both_items = |state: &GraphSnapshot, from: &str, to: &str| {
        state.items.contains_key(from) && state.items.contains_key(to)
    };

    match mutation {
        GraphMutation::MergeUser { pubkey } => {
            state.users.insert(pubkey.clone());
        }
        GraphMutation::MergeItem(item) => {
            state
                .items
                .entry(item.id.clone())
                .or_insert_with(|| item.clone());
        }
        GraphMutation::MergeCreate { author, item_id } => {
            if state.users.contains(author) && state.items.contains_key(item_id) {
                state.created.insert((author.clone(), item_id.clone()));
            }
        }
        GraphMutation::MergeReply { from, to } => {
            if both_items(state, from, to) {
                state.replies.insert((from.clone(), to.clone()));
            }
        }
        GraphMutation::MergeLike { from, to } => {
            if both_items(state, from, to) {
                state.likes.insert((from.clone(), to.clone()));
            }
        }
        GraphMutation::MergeZap { from, to, amount } => {
            if both_items(state, from, to) {
                state.zaps.insert((from.clone(), to.clone()), *amount);
            }
        }
        GraphMutation::ReplaceFollows {
            author,
            followees,
            created_at,
        } => {
            state.users.insert(author.clone());
            if state
                .follows_at
                .get(author)
                .is_some_and(|applied| applied > created_at)
            {
                return;
            }
            state.follows_at.insert(author.clone(), *created_at);
            state.follows.retain(|(from, _)| from != author);
            for followee in followees {
                state.users.insert(followee.clone());
                state.follows.insert((author.clone(), followee.clone()));
            }
        }
    }
}

fn distinct_authors<'a>(
    state: &GraphSnapshot,
    edges: impl Iterator<Item = &'a (String, String)>,
    target: &str,
) -> i64 {
    edges
        .filter(|(_, to)| to == target)
        .filter_map(|(from, _)| state.items.get(from).map(|i| i.author.as_str()))
        .collect::<HashSet<_>>()
        .len() as i64
}

#[async_trait]
impl MutationStore for MemoryGraph {
    async fn apply(&self, mutations: &[GraphMutation]) -> Result<(), GraphError> {
        self.check_available()?;
        let fail_on = *self.fail_on.lock().unwrap();

        let mut state = self.state.lock().unwrap();
        let mut working = state.clone();
        for mutation in mutations {
            if fail_on == Some(mutation.name()) {
                return Err(GraphError::Unavailable(format!(
                    "injected failure on {}",
                    mutation.name()
                )));
            }
            apply_one(&mut working, mutation);
        }
        *state = working;
        Ok(())
    }
}

#[async_trait]
impl FeedSource for MemoryGraph {
    async fn candidates(&self, start: i64, end: i64) -> Result<Vec<FeedCandidate>, GraphError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();

        Ok(state
            .items
            .values()
            .filter(|item| item.created_at > start && item.created_at < end)
            .map(|item| FeedCandidate {
                reply_authors: distinct_authors(&state, state.replies.iter(), &item.id),
                like_authors: distinct_authors(&state, state.likes.iter(), &item.id),
                zap_authors: distinct_authors(&state, state.zaps.keys(), &item.id),
                item: item.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl SubscriberStore for MemoryGraph {
    async fn get(&self, pubkey: &str) -> Result<Option<Subscriber>, GraphError> {
        self.check_subscriber(pubkey)?;
        Ok(self.subscriber(pubkey))
    }

    async fn create_if_absent(
        &self,
        pubkey: &str,
        channel_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscriber, GraphError> {
        self.check_subscriber(pubkey)?;
        let mut state = self.state.lock().unwrap();
        Ok(state
            .subscribers
            .entry(pubkey.to_string())
            .or_insert_with(|| Subscriber {
                pubkey: pubkey.to_string(),
                channel_secret: channel_secret.to_string(),
                subscribed_at: at,
                unsubscribed_at: None,
                last_delivered_at: None,
            })
            .clone())
    }

    async fn terminate(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        self.check_subscriber(pubkey)?;
        if let Some(s) = self.state.lock().unwrap().subscribers.get_mut(pubkey) {
            s.unsubscribed_at = Some(at);
        }
        Ok(())
    }

    async fn restore(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        self.check_subscriber(pubkey)?;
        if let Some(s) = self.state.lock().unwrap().subscribers.get_mut(pubkey) {
            s.unsubscribed_at = None;
            s.subscribed_at = at;
        }
        Ok(())
    }

    async fn active_page(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Subscriber>, GraphError> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .subscribers
            .values()
            .filter(|s| after.map_or(true, |a| s.pubkey.as_str() > a))
            .filter(|s| s.is_active())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, pubkey: &str, at: DateTime<Utc>) -> Result<(), GraphError> {
        self.check_subscriber(pubkey)?;
        if let Some(s) = self.state.lock().unwrap().subscribers.get_mut(pubkey) {
            s.last_delivered_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, author: &str, created_at: i64) -> ContentItem {
        ContentItem {
            id: id.into(),
            kind: 1,
            author: author.into(),
            body: format!("body of {id}"),
            created_at,
        }
    }

    fn post(id: &str, author: &str, created_at: i64) -> Vec<GraphMutation> {
        vec![
            GraphMutation::MergeUser { pubkey: author.into() },
            GraphMutation::MergeItem(item(id, author, created_at)),
            GraphMutation::MergeCreate {
                author: author.into(),
                item_id: id.into(),
            },
        ]
    }

    #[tokio::test]
    async fn failed_transaction_leaves_no_trace() {
        let graph = MemoryGraph::new();
        graph.fail_on_mutation(Some("merge_create"));

        let result = graph.apply(&post("a", "alice", 10)).await;

        assert!(result.is_err());
        assert_eq!(graph.snapshot(), GraphSnapshot::default());
    }

    #[tokio::test]
    async fn existing_item_is_never_rewritten() {
        let graph = MemoryGraph::new();
        graph.apply(&post("a", "alice", 10)).await.unwrap();

        let mut changed = item("a", "mallory", 99);
        changed.body = "rewritten".into();
        graph.apply(&[GraphMutation::MergeItem(changed)]).await.unwrap();

        assert_eq!(graph.snapshot().items["a"], item("a", "alice", 10));
    }

    #[tokio::test]
    async fn interaction_edges_need_both_endpoints() {
        let graph = MemoryGraph::new();
        graph.apply(&post("reply", "bob", 20)).await.unwrap();
        graph
            .apply(&[GraphMutation::MergeReply {
                from: "reply".into(),
                to: "missing".into(),
            }])
            .await
            .unwrap();

        assert!(graph.snapshot().replies.is_empty());
    }

    #[tokio::test]
    async fn repeat_likes_and_zaps_count_once_per_author() {
        let graph = MemoryGraph::new();
        let mut batch = post("target", "alice", 100);
        for (id, author) in [("l1", "bob"), ("l2", "bob"), ("l3", "carol")] {
            batch.extend(post(id, author, 110));
            batch.push(GraphMutation::MergeLike {
                from: id.into(),
                to: "target".into(),
            });
        }
        for id in ["z1", "z2"] {
            batch.extend(post(id, "dave", 120));
            batch.push(GraphMutation::MergeZap {
                from: id.into(),
                to: "target".into(),
                amount: 21,
            });
        }
        graph.apply(&batch).await.unwrap();

        let candidates = graph.candidates(0, 200).await.unwrap();
        let target = candidates.iter().find(|c| c.item.id == "target").unwrap();

        assert_eq!(target.like_authors, 2);
        assert_eq!(target.zap_authors, 1);
        assert_eq!(target.reply_authors, 0);
        assert_eq!(target.score(), 10 * 2 + 50);
    }

    #[tokio::test]
    async fn older_follow_snapshot_is_ignored() {
        let graph = MemoryGraph::new();
        let replace = |followees: &[&str], created_at| GraphMutation::ReplaceFollows {
            author: "alice".into(),
            followees: followees.iter().map(|s| s.to_string()).collect(),
            created_at,
        };

        graph.apply(&[replace(&["bob", "carol"], 200)]).await.unwrap();
        graph.apply(&[replace(&["dave"], 100)]).await.unwrap();

        assert_eq!(graph.follows_of("alice"), vec!["bob", "carol"]);
    }

    #[tokio::test]
    async fn active_page_walks_by_identity_key() {
        let graph = MemoryGraph::new();
        for pk in ["c", "a", "b", "d"] {
            graph
                .create_if_absent(pk, "secret", Utc::now())
                .await
                .unwrap();
        }
        graph.terminate("b", Utc::now()).await.unwrap();

        let first: Vec<_> = graph
            .active_page(None, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.pubkey)
            .collect();
        let second: Vec<_> = graph
            .active_page(Some("c"), 2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.pubkey)
            .collect();

        assert_eq!(first, vec!["a", "c"]);
        assert_eq!(second, vec!["d"]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let graph = MemoryGraph::new();
        graph.set_unavailable(true);

        assert!(matches!(
            graph.get("x").await,
            Err(GraphError::Unavailable(_))
        ));
        assert!(graph.candidates(0, 10).await.is_err());
    }
}
