//! Log reading engine
//!
//! This module turns append-only application log files into addressable
//! entries. A call flows through the same stages every time:
//!
//! 1. [`file_set`] resolves the configured directory and filename pattern.
//! 2. [`normalizer`] rewrites continuation markers (`Next`) into full headers.
//! 3. [`log_parsers`] splits the content into header/body segments and
//!    decomposes bodies into context and stack trace.
//! 4. [`entry`] assembles [`LogEntry`] values with a content-hash identity.
//! 5. [`log_filters`] applies environment/level filters and ordering.
//! 6. [`read_state`], [`paginator`] and the mutators in [`reader`] act on the result.
//!
//! # Log format
//!
//! ```text
//! [2024-01-01 00:00:00] local.ERROR: exception 'RuntimeException' with message 'boom' in /a/b.php:10
//! Stack trace:
//! #0 /a/c.php(20): App\Service->run()
//! #1 {main}
//! Next follow-up failure logged in the same instant
//! ```
//!
//! The bare `Next` marker stands for a repetition of the preceding header.

pub mod entry;
pub mod file_set;
pub mod log_filters;
pub mod log_parsers;
pub mod normalizer;
pub mod paginator;
pub mod read_state;
pub mod reader;

pub use entry::{LogContext, LogEntry, RawEntry, TraceEntry};
pub use log_parsers::{create_parser, LogParser, StandardParser};
pub use paginator::{Page, PageSource};
pub use read_state::{FileCache, MemoryCache, ReadStateCache};
pub use reader::LogReader;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grammar implementations selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserType {
    /// `[date] env.LEVEL:` headers with `Next` continuations and
    /// `[stacktrace]` / `Stack trace:` dividers
    #[default]
    Standard,
}

/// Fields the entry set can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    Id,
    Date,
    Level,
    Environment,
    FilePath,
}

impl OrderField {
    /// Parse a field name case-insensitively; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "id" => Some(Self::Id),
            "date" => Some(Self::Date),
            "level" => Some(Self::Level),
            "environment" => Some(Self::Environment),
            "file_path" => Some(Self::FilePath),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Date => "date",
            Self::Level => "level",
            Self::Environment => "environment",
            Self::FilePath => "file_path",
        }
    }
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse `asc`/`desc` case-insensitively; anything else yields `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
