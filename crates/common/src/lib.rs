// ================
// common/src/lib.rs
// ================
//! Common types shared between the realtime channel client and its consumers.
//! This module defines the channel routes, the inbound message envelope and
//! the action discriminators the gym backend puts on its frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Text frame sent as a heartbeat while the socket is open
pub const KEEPALIVE_FRAME: &str = "{}";

/// Name of the discriminator field on inbound frames
pub const ACTION_FIELD: &str = "action";

/// Path segments that select one realtime topic on the backend
///
/// Combined with a gym identifier this maps to
/// `<primary>/ws/<secondary>/<gym_id>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRoute {
    /// Leading segment, e.g. `websocket_live`
    pub primary: String,
    /// Segment after `ws`, e.g. `live`
    pub secondary: String,
}

impl ChannelRoute {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Social feed posts for a gym
    pub fn feed_posts() -> Self {
        Self::new("websocket_feed", "posts")
    }

    /// Gym-buddy session updates
    pub fn live_sessions() -> Self {
        Self::new("websocket_live", "sessions")
    }

    /// Live occupancy count
    pub fn live_count() -> Self {
        Self::new("websocket_live", "live")
    }
}

impl fmt::Display for ChannelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ws/{}", self.primary, self.secondary)
    }
}

/// Discriminator values observed on inbound frames
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    NewPost,
    SessionData,
    UpdateSessions,
    GetInitialData,
    UpdateLiveCount,
    /// Anything the client does not know about yet
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::NewPost => "new_post",
            Action::SessionData => "session_data",
            Action::UpdateSessions => "update_sessions",
            Action::GetInitialData => "get_initial_data",
            Action::UpdateLiveCount => "update_live_count",
            Action::Other(other) => other,
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        match value {
            "new_post" => Action::NewPost,
            "session_data" => Action::SessionData,
            "update_sessions" => Action::UpdateSessions,
            "get_initial_data" => Action::GetInitialData,
            "update_live_count" => Action::UpdateLiveCount,
            other => Action::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound frame.
///
/// The payload is passed through untouched; filtering by action is left to
/// each consumer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct InboundMessage(Value);

impl InboundMessage {
    /// Parse a text frame. Any valid JSON document is accepted.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    /// Raw discriminator, if the payload is an object carrying a string `action`
    pub fn action_str(&self) -> Option<&str> {
        self.0.get(ACTION_FIELD).and_then(Value::as_str)
    }

    pub fn action(&self) -> Option<Action> {
        self.action_str().map(Action::from)
    }

    /// True when the discriminator equals `action`
    pub fn is(&self, action: &Action) -> bool {
        self.action_str() == Some(action.as_str())
    }

    /// Look up a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn into_payload(self) -> Value {
        self.0
    }

    /// Decode the payload into a consumer-defined type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}

impl From<Value> for InboundMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extracts_action() {
        let msg = InboundMessage::parse(r#"{"action":"update_live_count","count":17}"#).unwrap();
        assert_eq!(msg.action(), Some(Action::UpdateLiveCount));
        assert!(msg.is(&Action::UpdateLiveCount));
        assert!(!msg.is(&Action::NewPost));
        assert_eq!(msg.get("count"), Some(&json!(17)));
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse("{\"action\":").is_err());
        assert!(InboundMessage::parse("").is_err());
    }

    #[test]
    fn test_non_object_payloads_have_no_action() {
        let msg = InboundMessage::parse("[1,2,3]").unwrap();
        assert_eq!(msg.action(), None);

        let msg = InboundMessage::parse(r#"{"action":5}"#).unwrap();
        assert_eq!(msg.action_str(), None);
    }

    #[test]
    fn test_unknown_action_is_preserved() {
        let msg = InboundMessage::parse(r#"{"action":"gym_closed"}"#).unwrap();
        assert_eq!(msg.action(), Some(Action::Other("gym_closed".to_string())));
        assert_eq!(msg.action().unwrap().to_string(), "gym_closed");
    }

    #[test]
    fn test_decode_into_typed_payload() {
        #[derive(Deserialize)]
        struct LiveCount {
            action: String,
            count: u32,
        }

        let msg = InboundMessage::parse(r#"{"action":"update_live_count","count":3}"#).unwrap();
        let decoded: LiveCount = msg.decode().unwrap();
        assert_eq!(decoded.action, "update_live_count");
        assert_eq!(decoded.count, 3);
    }

    #[test]
    fn test_route_presets() {
        assert_eq!(ChannelRoute::feed_posts().to_string(), "websocket_feed/ws/posts");
        assert_eq!(ChannelRoute::live_sessions().to_string(), "websocket_live/ws/sessions");
        assert_eq!(ChannelRoute::live_count().to_string(), "websocket_live/ws/live");
    }

    #[test]
    fn test_keepalive_frame_is_empty_object() {
        let parsed: Value = serde_json::from_str(KEEPALIVE_FRAME).unwrap();
        assert_eq!(parsed, json!({}));
    }
}
