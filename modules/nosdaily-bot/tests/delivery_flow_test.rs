//! End-to-end: relay content and mentions in, digests out, over the in-memory graph.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use nosdaily_bot::dispatcher::{MentionDispatcher, WELCOME_TEMPLATE};
use nosdaily_bot::ingest::Ingestor;
use nosdaily_bot::lifecycle::SubscriptionManager;
use nosdaily_bot::mutator::EventMutator;
use nosdaily_bot::ranking::FeedRanker;
use nosdaily_bot::testing::{mention, note, RecordingMessenger, SequentialKeys};
use nosdaily_bot::transport::{MessageRef, Sender};
use nosdaily_bot::worker::{DeliverySettings, DeliveryWorker};
use nosdaily_common::InboundEvent;
use nosdaily_graph::MemoryGraph;

const BOT: &str = "bot";
const TIMEOUT: Duration = Duration::from_secs(1);

struct Harness {
    graph: Arc<MemoryGraph>,
    messenger: Arc<RecordingMessenger>,
}

impl Harness {
    fn new() -> Self {
        Self {
            graph: Arc::new(MemoryGraph::new()),
            messenger: Arc::new(RecordingMessenger::new()),
        }
    }

    async fn ingest(&self, events: Vec<InboundEvent>) {
        let ingestor = Ingestor::new(EventMutator::new(self.graph.clone(), TIMEOUT));
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        let (_stop, shutdown) = watch::channel(false);
        ingestor.run(rx, shutdown).await;
    }

    async fn mentions(&self, events: Vec<InboundEvent>) {
        let manager = SubscriptionManager::new(self.graph.clone(), SequentialKeys::new(), TIMEOUT);
        let dispatcher = MentionDispatcher::new(manager, self.messenger.clone(), BOT, TIMEOUT);
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        let (_stop, shutdown) = watch::channel(false);
        dispatcher.run(rx, shutdown).await;
    }

    fn worker(
        &self,
    ) -> DeliveryWorker<Arc<MemoryGraph>, Arc<MemoryGraph>, Arc<RecordingMessenger>> {
        DeliveryWorker::new(
            self.graph.clone(),
            FeedRanker::new(self.graph.clone(), TIMEOUT),
            self.messenger.clone(),
            DeliverySettings::new(24, 10, Duration::from_secs(3600)),
            TIMEOUT,
        )
    }
}

fn ago(now: DateTime<Utc>, minutes: i64) -> i64 {
    now.timestamp() - minutes * 60
}

#[tokio::test]
async fn subscriber_receives_ranked_digest_on_own_channel() {
    let h = Harness::new();
    let now = Utc::now();

    h.ingest(vec![
        note("quiet", "alice", ago(now, 180), None),
        note("busy", "alice", ago(now, 170), None),
        note("r1", "bob", ago(now, 160), Some("busy")),
        note("r2", "carol", ago(now, 150), Some("busy")),
        note("r3", "bob", ago(now, 140), Some("busy")),
    ])
    .await;
    h.mentions(vec![mention("m1", "dave", BOT, "gm #subscribe")])
        .await;

    let welcome = h.messenger.sent_to("dave");
    assert_eq!(welcome.len(), 1);
    assert_eq!(welcome[0].text, WELCOME_TEMPLATE);
    let channel_secret = h.graph.subscriber("dave").unwrap().channel_secret;
    assert_eq!(
        welcome[0].refs[1],
        MessageRef::Identity(format!("pub:{channel_secret}"))
    );

    let report = h.worker().run_cycle(100, now).await.unwrap();
    assert_eq!(report.delivered, 1);

    let sent = h.messenger.sent_to("dave");
    let digest = sent.last().unwrap();
    assert_eq!(digest.sender, Sender::Channel(channel_secret));
    // Two distinct reply authors: bob twice, carol once.
    assert!(digest.text.starts_with("Your nossence digest, #[0]:\n1. #[1] (score 30)"));
    assert_eq!(digest.refs[1], MessageRef::Content("busy".into()));
    assert_eq!(digest.refs.len(), 6);
}

#[tokio::test]
async fn unsubscribed_identity_gets_no_digest_until_it_returns() {
    let h = Harness::new();
    let now = Utc::now();
    h.ingest(vec![note("post", "alice", ago(now, 30), None)]).await;

    h.mentions(vec![
        mention("m1", "dave", BOT, "#subscribe"),
        mention("m2", "dave", BOT, "#unsubscribe"),
    ])
    .await;
    let report = h.worker().run_cycle(100, now).await.unwrap();
    assert_eq!(report.delivered, 0);

    h.mentions(vec![mention("m3", "dave", BOT, "#subscribe")]).await;
    let report = h.worker().run_cycle(100, now).await.unwrap();
    assert_eq!(report.delivered, 1);

    // welcome, welcome again on return, one digest
    assert_eq!(h.messenger.sent_to("dave").len(), 3);
}

#[tokio::test]
async fn broken_events_do_not_stop_either_stream() {
    let h = Harness::new();
    let now = Utc::now();

    let mut bad_zap = note("zap", "zapper", ago(now, 20), Some("post"));
    bad_zap.kind = 9735;
    bad_zap.tags.push(vec!["bolt11".into(), "lnbc1nope".into()]);
    h.ingest(vec![
        note("post", "alice", ago(now, 30), None),
        bad_zap,
        note("reply", "bob", ago(now, 10), Some("post")),
    ])
    .await;
    assert_eq!(h.graph.snapshot().replies.len(), 1);

    h.graph.fail_subscriber("mallory");
    h.mentions(vec![
        mention("m1", "mallory", BOT, "#subscribe"),
        mention("m2", "dave", BOT, "#subscribe"),
    ])
    .await;

    assert!(h.graph.subscriber("dave").is_some());
    assert_eq!(h.messenger.sent_to("dave").len(), 1);
}
