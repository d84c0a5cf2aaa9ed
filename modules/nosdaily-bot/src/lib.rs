pub mod api;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod mutator;
pub mod nostr;
pub mod ranking;
pub mod scheduler;
pub mod shutdown;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;
pub mod worker;

pub use error::BotError;
