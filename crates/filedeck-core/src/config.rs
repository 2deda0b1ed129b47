//! Worker configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default cap on the number of search results.
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 5000;

/// Default number of visited entries between search progress events.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;

/// Default channel buffer size for task progress updates.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// What to do when an incoming item's name is already taken at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Rename the incoming item ("file (1).txt", "file (2).txt", ...).
    #[default]
    AutoRename,
    /// Leave the existing item alone and record a collision.
    Skip,
    /// Replace the existing item.
    Overwrite,
}

/// Compression method for archives produced by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveCompression {
    /// Deflate compression.
    #[default]
    Deflated,
    /// No compression.
    Stored,
}

/// Configuration for the background worker.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of search results before the walk stops.
    #[builder(default = "DEFAULT_MAX_SEARCH_RESULTS")]
    pub max_search_results: usize,

    /// Number of entries visited between search progress events.
    #[builder(default = "DEFAULT_PROGRESS_INTERVAL")]
    pub progress_interval: usize,

    /// Capacity of each task's progress channel.
    #[builder(default = "DEFAULT_CHANNEL_CAPACITY")]
    pub channel_capacity: usize,

    /// Name collision handling for copy, move and extract.
    #[builder(default)]
    pub collision_policy: CollisionPolicy,

    /// Compression for created archives.
    #[builder(default)]
    pub compression: ArchiveCompression,
}

impl WorkerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_search_results == Some(0) {
            return Err("max_search_results must be at least 1".to_string());
        }
        if self.progress_interval == Some(0) {
            return Err("progress_interval must be at least 1".to_string());
        }
        if self.channel_capacity == Some(0) {
            return Err("channel_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

impl WorkerConfig {
    /// Create a new worker config builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Clamp zero values loaded from a file back to usable minimums.
    pub fn sanitized(mut self) -> Self {
        self.max_search_results = self.max_search_results.max(1);
        self.progress_interval = self.progress_interval.max(1);
        self.channel_capacity = self.channel_capacity.max(1);
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            collision_policy: CollisionPolicy::default(),
            compression: ArchiveCompression::default(),
        }
    }
}
