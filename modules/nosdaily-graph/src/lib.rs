pub mod client;
pub mod error;
pub mod migrate;
pub mod mutation;
pub mod reader;
pub mod store;
pub mod subscribers;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use error::GraphError;
pub use mutation::GraphMutation;
pub use reader::GraphReader;
pub use store::{FeedSource, MutationStore, SubscriberStore};
pub use subscribers::SubscriberGraph;
pub use writer::GraphWriter;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryGraph;

pub use neo4rs::query;
