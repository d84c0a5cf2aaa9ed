pub mod config;
pub mod error;
pub mod events;
pub mod invoice;
pub mod types;

pub use config::Config;
pub use error::InvoiceError;
pub use events::{ContentEvent, InboundEvent};
pub use types::*;
