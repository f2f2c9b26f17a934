//! GraphQL configuration.
//!
//! Configuration can be specified in `topicstream.toml` under the `[graphql]` section.
//!
//! # Example Configuration
//!
//! ```toml
//! [graphql]
//! path = "/graphql"
//! ws_path = "/graphql/ws"
//! max_depth = 15
//! max_complexity = 500
//! introspection = true
//! ```

use serde::{Deserialize, Serialize};

/// GraphQL API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLConfig {
    /// Route for queries and mutations (POST).
    /// Default: /graphql
    #[serde(default = "default_path")]
    pub path: String,

    /// Route for the subscription WebSocket (GET upgrade).
    /// Default: /graphql/ws
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum query depth allowed.
    /// Default: 15
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum query complexity allowed.
    /// Default: 500
    #[serde(default = "default_max_complexity")]
    pub max_complexity: usize,

    /// Enable GraphQL introspection queries.
    /// Should be disabled in production.
    /// Default: true
    #[serde(default = "default_introspection")]
    pub introspection: bool,
}

fn default_path() -> String {
    "/graphql".to_string()
}

fn default_ws_path() -> String {
    "/graphql/ws".to_string()
}

fn default_max_depth() -> usize {
    15
}

fn default_max_complexity() -> usize {
    500
}

fn default_introspection() -> bool {
    true
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            ws_path: default_ws_path(),
            max_depth: default_max_depth(),
            max_complexity: default_max_complexity(),
            introspection: default_introspection(),
        }
    }
}

impl GraphQLConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err("graphql.path must start with '/'".into());
        }
        if !self.ws_path.starts_with('/') {
            return Err("graphql.ws_path must start with '/'".into());
        }
        if self.max_depth == 0 {
            return Err("graphql.max_depth must be > 0".into());
        }
        if self.max_complexity == 0 {
            return Err("graphql.max_complexity must be > 0".into());
        }
        Ok(())
    }
}
