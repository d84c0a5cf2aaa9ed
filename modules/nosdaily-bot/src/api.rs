use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use nosdaily_common::from_unix;
use nosdaily_graph::FeedSource;

use crate::ranking::FeedRanker;
use crate::shutdown::wait_for_shutdown;

const MAX_LIMIT: usize = 100;

pub struct ApiState {
    pub ranker: FeedRanker<Arc<dyn FeedSource>>,
    pub default_limit: usize,
    /// Look-back used when `start` is omitted.
    pub default_window: TimeDelta,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pubkey: Option<String>,
    /// Unix seconds.
    start: Option<i64>,
    end: Option<i64>,
    limit: Option<usize>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/feed", get(api_feed))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Serve until the shutdown flag is set.
pub async fn serve(app: Router, addr: &str, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Feed API listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;
    Ok(())
}

pub async fn api_feed(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<FeedQuery>,
) -> impl IntoResponse {
    let end = params.end.map(from_unix).unwrap_or_else(Utc::now);
    let start = params.start.map(from_unix).unwrap_or_else(|| {
        end.checked_sub_signed(state.default_window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
    });
    let limit = params.limit.unwrap_or(state.default_limit).min(MAX_LIMIT);
    let pubkey = params.pubkey.unwrap_or_default();

    match state.ranker.get_feed(&pubkey, start, end, limit).await {
        Ok(feed) => Json(feed).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to compute feed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
