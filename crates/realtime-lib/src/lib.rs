// ============================
// realtime-lib/src/lib.rs
// ============================
//! Realtime channel client for the gym backend.
//!
//! One [`RealtimeChannel`] per owning scope keeps a single reconnecting
//! WebSocket and fans inbound messages out to any number of subscribers.
//! [`ChannelScope`] drives it from scope activation and deactivation.

pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod reconnect;
pub mod registry;
pub mod scope;
pub mod store;
mod tls;

pub use channel::{ChannelConfig, ConnectionState, RealtimeChannel, DEFAULT_KEEPALIVE_INTERVAL};
pub use config::Settings;
pub use error::RealtimeError;
pub use identity::ChannelIdentity;
pub use reconnect::{Backoff, ReconnectPolicy};
pub use registry::{SubscriberId, Subscription};
pub use scope::ChannelScope;
pub use store::{FlatFileStore, KeyValueStore, MemoryStore, GYM_ID_KEY};

pub use gympulse_common::{Action, ChannelRoute, InboundMessage};
