//! Binds a channel to the lifecycle of the scope that owns it.
//!
//! Each activation reads the gym identifier from the session store and builds
//! a fresh [`RealtimeChannel`] with an empty subscriber registry; each
//! deactivation tears that channel down.

use crate::channel::{ChannelConfig, ConnectionState, RealtimeChannel};
use crate::error::RealtimeError;
use crate::store::{KeyValueStore, GYM_ID_KEY};
use gympulse_common::ChannelRoute;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ChannelScope {
    config: ChannelConfig,
    route: ChannelRoute,
    store: Arc<dyn KeyValueStore>,
    gym_id_key: String,
    active: Option<RealtimeChannel>,
    // reported while no channel is active
    resting_state: ConnectionState,
}

impl ChannelScope {
    pub fn new(config: ChannelConfig, route: ChannelRoute, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            route,
            store,
            gym_id_key: GYM_ID_KEY.to_string(),
            active: None,
            resting_state: ConnectionState::Idle,
        }
    }

    /// Read the gym identifier from a different store key
    pub fn with_gym_id_key(mut self, key: impl Into<String>) -> Self {
        self.gym_id_key = key.into();
        self
    }

    /// Scope gained focus. Any channel from a previous activation is torn
    /// down first; the returned channel is idle if no gym id is stored.
    pub async fn activate(&mut self) -> Result<&RealtimeChannel, RealtimeError> {
        if let Some(previous) = self.active.take() {
            debug!(route = %self.route, "replacing channel from previous activation");
            previous.stop().await;
        }

        let gym_id = self.store.get(&self.gym_id_key).await?;
        let mut channel = RealtimeChannel::new(self.config.clone(), self.route.clone());
        let connecting = channel.start(gym_id.as_deref())?;
        info!(route = %self.route, connecting, "scope activated");

        Ok(self.active.insert(channel))
    }

    /// Scope lost focus or was unmounted
    pub async fn deactivate(&mut self) {
        if let Some(channel) = self.active.take() {
            channel.stop().await;
            info!(route = %self.route, "scope deactivated");
        }
        self.resting_state = ConnectionState::TornDown;
    }

    /// Channel of the current activation, if any
    pub fn channel(&self) -> Option<&RealtimeChannel> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map_or(self.resting_state, RealtimeChannel::state)
    }
}
