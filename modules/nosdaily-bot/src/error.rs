use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use nosdaily_common::InvoiceError;
use nosdaily_graph::GraphError;

#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Restore was asked for an identity that never subscribed.
    #[error("no subscriber for {0}")]
    SubscriberNotFound(String),

    #[error("payment invoice: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("channel key: {0}")]
    Key(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

impl BotError {
    /// Store and transport failures a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::Graph(_) | BotError::Transport(_) | BotError::Timeout { .. }
        )
    }
}

/// Run an external call with an upper bound on its duration.
pub async fn bounded<T, E, F>(after: Duration, what: &'static str, fut: F) -> Result<T, BotError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BotError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(BotError::Timeout { what, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_call_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BotError>(())
        };

        let err = bounded(Duration::from_millis(10), "slow call", slow)
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Timeout { what: "slow call", .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn bounded_call_passes_errors_through() {
        let failing = async { Err::<(), _>(GraphError::Unavailable("down".into())) };

        let err = bounded(Duration::from_secs(1), "store", failing)
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Graph(GraphError::Unavailable(_))));
    }

    #[test]
    fn not_found_is_not_transient() {
        assert!(!BotError::SubscriberNotFound("x".into()).is_transient());
    }
}
