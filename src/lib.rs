//! Logreader - Read, filter and prune application log files
//!
//! This crate turns `[date] env.LEVEL:` style log files into addressable
//! entries with a content-hash identity, and supports filtering, ordering,
//! pagination, read-state tracking and in-place deletion.

pub mod config;
pub mod error;
pub mod logs;
