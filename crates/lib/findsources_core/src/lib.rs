//! # findsources_core
//!
//! Core domain logic for Find Sources.

pub mod auth;
pub mod clock;
pub mod identity;
pub mod migrate;
pub mod models;
pub mod search;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
