//! Playlist Mirror Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod app;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod lyrics;
pub mod matching;
pub mod paths;
pub mod playlist;
pub mod resolver;
pub mod retry;
pub mod tagger;
pub mod tidal;

// Re-export commonly used types for convenience
pub use app::{App, RunSummary};
pub use cache::CacheStore;
pub use config::{AppConfig, CliConfig, FileConfig, Quality};
pub use resolver::{ResolvedJob, Resolver};
pub use tidal::TidalClient;
