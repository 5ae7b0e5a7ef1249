//! Streaming market data ingestion.
//!
//! The feed connects to the exchange's streaming endpoint, subscribes
//! to a token set, and turns wire messages into [`MarketEvent`]s that
//! the engine applies to the book cache. A reconnecting wrapper adds
//! exponential backoff, resubscription, and heartbeat staleness
//! tracking on top of any [`MarketDataStream`] implementation.

mod dedup;
mod messages;
mod reconnecting;
mod stream;

pub use dedup::{DedupStats, FingerprintCache};
pub use messages::{FeedMessage, SubscribeAction, SubscribeMessage, WireLevel};
pub use reconnecting::{ConnectionState, ReconnectingStream, ReconnectionConfig};
pub use stream::{MarketDataStream, MarketEvent, WsDataStream};
