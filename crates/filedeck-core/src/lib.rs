//! Core types for filedeck.
//!
//! This crate provides the data structures shared by the file operation
//! primitives and the background task subsystem: task descriptors, the
//! error taxonomy and worker configuration.

mod config;
mod error;
mod task;

pub use config::{
    ArchiveCompression, CollisionPolicy, WorkerConfig, WorkerConfigBuilder,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_PROGRESS_INTERVAL,
};
pub use error::{ErrorKind, ItemError, OpsError};
pub use task::{Task, TaskId, TaskKind, TaskState};
