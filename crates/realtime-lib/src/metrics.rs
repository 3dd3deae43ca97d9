// ==============
// crates/realtime-lib/src/metrics.rs

//! Central place for metric keys
pub const FRAMES_RECEIVED: &str = "realtime.frames_received";
pub const FRAMES_MALFORMED: &str = "realtime.frames_malformed";
pub const MESSAGES_DELIVERED: &str = "realtime.messages_delivered";
pub const SUBSCRIBER_PANICS: &str = "realtime.subscriber_panics";
pub const HEARTBEATS_SENT: &str = "realtime.heartbeats_sent";
pub const RECONNECT_ATTEMPTS: &str = "realtime.reconnect_attempts";
pub const CONNECTIONS_OPEN: &str = "realtime.connections_open";
pub const SUBSCRIBERS: &str = "realtime.subscribers";
