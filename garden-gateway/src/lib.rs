//! HTTP facade over the knowledge-garden core.

pub mod error;
pub mod server;
pub mod state;
