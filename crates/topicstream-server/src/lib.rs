pub mod config;
pub mod handlers;
pub mod observability;
pub mod sample;
pub mod server;

pub use server::{AppState, ServerBuilder, TopicstreamServer, build_app};
