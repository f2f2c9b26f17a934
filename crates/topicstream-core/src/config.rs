//! Subscription engine configuration.
//!
//! Configuration can be specified in `topicstream.toml` under the
//! `[subscriptions]` section.
//!
//! # Example Configuration
//!
//! ```toml
//! [subscriptions]
//! backend = "in_memory"
//! broadcast_capacity = 1024
//! max_topics_per_session = 64
//! ```

use serde::{Deserialize, Serialize};

/// Available event bus backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventBusKind {
    /// Sharded topic map with synchronous fan-out.
    #[default]
    InMemory,
    /// Single broadcast channel with one forwarding task per listener.
    Broadcast,
}

impl EventBusKind {
    /// Returns the configuration string for the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for EventBusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event bus backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Backend implementation.
    /// Default: in_memory
    #[serde(default)]
    pub backend: EventBusKind,

    /// Ring buffer size of the broadcast backend.
    /// Slow listeners lagging further behind lose events.
    /// Default: 1024
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: EventBusKind::default(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Subscription engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsConfig {
    /// Bus backend settings.
    #[serde(flatten)]
    pub bus: BusConfig,

    /// Maximum number of distinct topics one session may listen to.
    /// Guards dynamic topic functions driven by client arguments.
    /// Default: 64
    #[serde(default = "default_max_topics_per_session")]
    pub max_topics_per_session: usize,
}

fn default_max_topics_per_session() -> usize {
    64
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            max_topics_per_session: default_max_topics_per_session(),
        }
    }
}

impl SubscriptionsConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_topics_per_session == 0 {
            return Err("subscriptions.max_topics_per_session must be > 0".into());
        }
        if self.bus.backend == EventBusKind::Broadcast && self.bus.broadcast_capacity == 0 {
            return Err(
                "subscriptions.broadcast_capacity must be > 0 for the broadcast backend".into(),
            );
        }
        Ok(())
    }
}
