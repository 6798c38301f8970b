//! Catalog service integration
//!
//! Provides the HTTP client for the search/metadata and streaming instances
//! plus the response types they return.

mod client;
mod types;

pub use client::{probe_fastest, TidalClient, TidalError, USER_AGENT};
pub use types::*;
