//! Dynamic schema construction for subscription fields.
//!
//! ## Components
//!
//! - [`SubscriptionSchemaBuilder`] - Validates declarations and builds the schema
//! - [`SubscriptionFieldDef`] - Subscription field declaration with its GraphQL signature
//! - [`json_object_type`] - Output types backed by projected JSON values

mod builder;
mod fields;
mod types;

pub use builder::SubscriptionSchemaBuilder;
pub use fields::SubscriptionFieldDef;
pub use types::{json_object_type, json_to_graphql_value};
