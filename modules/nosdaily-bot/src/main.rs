use std::sync::Arc;

use anyhow::Result;
use chrono::TimeDelta;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nosdaily_bot::api::{self, ApiState};
use nosdaily_bot::dispatcher::MentionDispatcher;
use nosdaily_bot::error::bounded;
use nosdaily_bot::ingest::Ingestor;
use nosdaily_bot::lifecycle::SubscriptionManager;
use nosdaily_bot::mutator::EventMutator;
use nosdaily_bot::nostr::{NostrChannelKeys, NostrTransport, Routes};
use nosdaily_bot::ranking::FeedRanker;
use nosdaily_bot::scheduler::DeliveryScheduler;
use nosdaily_bot::worker::{DeliverySettings, DeliveryWorker};
use nosdaily_common::Config;
use nosdaily_graph::{
    migrate::migrate, FeedSource, GraphClient, GraphReader, GraphWriter, SubscriberGraph,
};

const MENTION_BUFFER: usize = 256;
const CONTENT_BUFFER: usize = 4096;

type Task = (&'static str, Result<()>);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nosdaily=info".parse()?))
        .init();

    info!("nosdaily bot starting...");

    let config = Config::from_env()?;
    let timeout = config.call_timeout;

    // Connect to Neo4j
    let client = bounded(timeout, "graph connect", GraphClient::connect(&config)).await?;
    bounded(timeout, "graph schema", migrate(&client)).await?;

    // Connect to relays
    let transport = Arc::new(
        NostrTransport::connect(&config.bot_secret_key, &config.relays, timeout).await?,
    );
    let bot_identity = transport.identity();
    info!(pubkey = %bot_identity, "Bot identity loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: JoinSet<Task> = JoinSet::new();

    // Relay subscriptions, routed into per-consumer channels
    let (mention_tx, mention_rx) = mpsc::channel(MENTION_BUFFER);
    let mentions = (transport.subscribe_mentions().await?, mention_tx);
    let (content, content_rx) = if config.ingest_enabled {
        let (tx, rx) = mpsc::channel(CONTENT_BUFFER);
        (Some((transport.subscribe_content().await?, tx)), Some(rx))
    } else {
        info!("Content ingestion disabled");
        (None, None)
    };
    {
        let transport = transport.clone();
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            transport.route(Routes { mentions, content }, shutdown).await;
            ("relay router", Ok(()))
        });
    }

    // Mention dispatcher
    {
        let manager = SubscriptionManager::new(
            SubscriberGraph::new(client.clone()),
            NostrChannelKeys,
            timeout,
        );
        let dispatcher = MentionDispatcher::new(manager, transport.clone(), bot_identity, timeout);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            dispatcher.run(mention_rx, shutdown).await;
            ("mention dispatcher", Ok(()))
        });
    }

    // Content ingestor
    if let Some(content_rx) = content_rx {
        let ingestor = Ingestor::new(EventMutator::new(GraphWriter::new(client.clone()), timeout));
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            ingestor.run(content_rx, shutdown).await;
            ("ingestor", Ok(()))
        });
    }

    // Hourly delivery
    {
        let worker = DeliveryWorker::new(
            SubscriberGraph::new(client.clone()),
            FeedRanker::new(GraphReader::new(client.clone()), timeout),
            transport.clone(),
            DeliverySettings::new(
                config.feed_window_hours,
                config.feed_limit,
                config.delivery_interval,
            ),
            timeout,
        );
        let scheduler = DeliveryScheduler::new(worker, config.delivery_interval, config.batch_size);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            scheduler.run(shutdown).await;
            ("delivery scheduler", Ok(()))
        });
    }

    // Feed API
    {
        let source: Arc<dyn FeedSource> = Arc::new(GraphReader::new(client.clone()));
        let state = Arc::new(ApiState {
            ranker: FeedRanker::new(source, timeout),
            default_limit: config.feed_limit,
            default_window: TimeDelta::try_hours(config.feed_window_hours)
                .unwrap_or(TimeDelta::MAX),
        });
        let addr = format!("{}:{}", config.api_host, config.api_port);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            let result = api::serve(api::router(state), &addr, shutdown).await;
            ("feed api", result)
        });
    }
    drop(shutdown_rx);

    // Run until Ctrl+C or until any component stops on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        Some(joined) = tasks.join_next() => {
            log_exit(joined);
            warn!("Component stopped, shutting down the rest");
        }
    }

    // Every component observes the flag and is awaited before exit
    let _ = shutdown_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        log_exit(joined);
    }
    transport.disconnect().await;

    info!("nosdaily bot exiting");
    Ok(())
}

fn log_exit(joined: std::result::Result<Task, tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => info!(component = name, "Stopped"),
        Ok((name, Err(e))) => error!(component = name, error = %e, "Stopped with error"),
        Err(e) => error!(error = %e, "Component panicked"),
    }
}
