//! Channel identity and URL construction.
//!
//! A channel is identified by the gym it belongs to plus a [`ChannelRoute`].
//! The backend URL is derived from the configured REST base URL by dropping
//! its scheme and appending `<primary>/ws/<secondary>/<gym_id>`.

use crate::error::RealtimeError;
use gympulse_common::ChannelRoute;
use url::Url;

/// The (gym, route) pair a connection is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentity {
    pub gym_id: String,
    pub route: ChannelRoute,
}

impl ChannelIdentity {
    /// Build an identity from a possibly-missing gym id.
    ///
    /// A missing or blank id means the scope is not ready yet.
    pub fn resolve(gym_id: Option<&str>, route: &ChannelRoute) -> Option<Self> {
        let gym_id = gym_id.map(str::trim).filter(|id| !id.is_empty())?;
        Some(Self {
            gym_id: gym_id.to_string(),
            route: route.clone(),
        })
    }

    /// Compute the socket URL for this identity.
    ///
    /// `secure` picks `wss` over `ws`. A path prefix on the base URL is kept.
    pub fn url(&self, api_base_url: &str, secure: bool) -> Result<Url, RealtimeError> {
        let base = parse_base(api_base_url)?;
        let host = base
            .host_str()
            .ok_or_else(|| RealtimeError::InvalidBaseUrl(api_base_url.to_string()))?;
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let scheme = if secure { "wss" } else { "ws" };

        let mut url = Url::parse(&format!("{scheme}://{authority}/"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| RealtimeError::InvalidBaseUrl(api_base_url.to_string()))?;
            segments.clear();
            if let Some(prefix) = base.path_segments() {
                segments.extend(prefix.filter(|s| !s.is_empty()));
            }
            segments.extend([
                self.route.primary.as_str(),
                "ws",
                self.route.secondary.as_str(),
                self.gym_id.as_str(),
            ]);
        }
        Ok(url)
    }
}

fn parse_base(api_base_url: &str) -> Result<Url, RealtimeError> {
    let trimmed = api_base_url.trim();
    if trimmed.is_empty() {
        return Err(RealtimeError::InvalidBaseUrl(api_base_url.to_string()));
    }
    // bare hosts like "api.example.com" are accepted
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let base = Url::parse(&with_scheme)?;
    if base.cannot_be_a_base() {
        return Err(RealtimeError::InvalidBaseUrl(api_base_url.to_string()));
    }
    Ok(base)
}
