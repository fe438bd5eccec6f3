//! Setaccio query-language engine.
//!
//! Clients describe what they want from a resource with three rich
//! parameters (filter, include, order). The engine parses them, checks them
//! against per-resource whitelists, turns them into SeaQuery statements and
//! reshapes the returned rows, fetching nested resources where includes ask
//! for them.
//!
//! The `setaccio` binary exposes the parsing and reshaping layers for
//! inspection.

pub mod config;
pub mod error;
pub mod gather;
pub mod reshape;
pub mod richparam;

pub use config::EngineConfig;
pub use error::{DirectiveKind, Error, Result};
