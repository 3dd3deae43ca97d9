// crates/realtime-lib/src/error.rs

//! Central error type for the realtime client.
use thiserror::Error;

/// Realtime client error types with stable error codes
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Channel already started")]
    AlreadyStarted,

    #[error("Connection closed")]
    ConnectionClosed,
}

impl RealtimeError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RealtimeError::WebSocket(_) => "WS_001",
            RealtimeError::Json(_) => "JSON_001",
            RealtimeError::Url(_) => "URL_001",
            RealtimeError::Io(_) => "IO_001",
            RealtimeError::Config(_) => "CFG_001",
            RealtimeError::InvalidBaseUrl(_) => "URL_002",
            RealtimeError::AlreadyStarted => "CHAN_001",
            RealtimeError::ConnectionClosed => "WS_002",
        }
    }
}

impl From<figment::Error> for RealtimeError {
    fn from(err: figment::Error) -> Self {
        RealtimeError::Config(err.to_string())
    }
}
