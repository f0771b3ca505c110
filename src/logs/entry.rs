//! Log entries
//!
//! A [`RawEntry`] is one header occurrence with its body text. [`LogEntry`]
//! assembles it through the grammar into context and stack frames, and gives
//! it an identity: the MD5 hex digest of `header + " " + body`. Identical raw
//! text always yields the same id, which is also how duplicates collapse.

use crate::error::Result;
use crate::logs::file_set::{write_atomically, LogText};
use crate::logs::log_parsers::LogParser;
use crate::logs::read_state::ReadStateCache;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Timestamp format of the header date
pub const LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prefix of the read-state cache key
pub const CACHE_KEY_PREFIX: &str = "log";

fn unescape(text: &str) -> String {
    text.replace("\\\\", "\\")
}

/// Unparsed entry as split from a normalized file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub header: String,
    pub body: String,
    pub date: Option<String>,
    pub environment: Option<String>,
    pub level: Option<String>,
    pub file_path: PathBuf,
}

impl RawEntry {
    /// Text the entry occupies in its file
    pub fn raw_content(&self) -> String {
        format!("{} {}", self.header, self.body)
    }
}

/// Message part of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogContext {
    pub message: String,
    pub exception: Option<String>,
    /// Source location the entry was raised in
    #[serde(rename = "in")]
    pub location: Option<String>,
    pub line: Option<u32>,
    #[serde(skip)]
    content: String,
}

impl LogContext {
    pub fn parse(parser: &dyn LogParser, content: &str) -> Self {
        let parts = parser.parse_log_context(content);
        Self {
            message: unescape(&parts.message),
            exception: parts.exception.as_deref().map(unescape),
            location: parts.location.as_deref().map(unescape),
            line: parts.line,
            content: content.to_string(),
        }
    }

    /// Context text before parsing
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// One stack frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub caught_at: String,
    #[serde(rename = "in")]
    pub location: Option<String>,
    pub line: Option<u32>,
    #[serde(skip)]
    content: String,
}

impl TraceEntry {
    pub fn parse(parser: &dyn LogParser, content: &str) -> Self {
        let parts = parser.parse_trace_entry(content);
        Self {
            caught_at: unescape(&parts.caught_at),
            location: parts.location.as_deref().map(unescape),
            line: parts.line,
            content: content.to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// A parsed, addressable log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// MD5 hex digest of the raw content
    pub id: String,
    pub date: Option<NaiveDateTime>,
    /// Lower-cased environment
    pub environment: Option<String>,
    /// Lower-cased level
    pub level: Option<String>,
    /// Canonical path of the file the entry was read from
    pub file_path: PathBuf,
    pub context: LogContext,
    /// Frames in order of appearance; empty when no trace was captured
    pub stack_traces: Vec<TraceEntry>,
    #[serde(skip)]
    header: String,
    #[serde(skip)]
    body: String,
}

impl LogEntry {
    /// Assemble an entry from its raw parts
    pub fn from_raw(parser: &dyn LogParser, raw: RawEntry) -> Self {
        let body = parser.parse_log_body(&raw.body);
        let stack_traces = body
            .stack_traces
            .as_deref()
            .map(|trace| {
                parser
                    .parse_stack_trace(trace)
                    .iter()
                    .map(|frame| TraceEntry::parse(parser, frame))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: generate_id(&raw.raw_content()),
            date: raw
                .date
                .as_deref()
                .and_then(|date| NaiveDateTime::parse_from_str(date, LOG_DATE_FORMAT).ok()),
            environment: raw.environment.as_deref().map(str::to_lowercase),
            level: raw.level.as_deref().map(str::to_lowercase),
            file_path: canonical_path(&raw.file_path),
            context: LogContext::parse(parser, &body.context),
            stack_traces,
            header: raw.header,
            body: raw.body,
        }
    }

    /// Text the entry occupies in its file: `header + " " + body`
    pub fn raw_content(&self) -> String {
        format!("{} {}", self.header, self.body)
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Key under which the read state is stored
    pub fn cache_key(&self) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, self.id)
    }

    /// Whether the entry has been marked as read
    pub fn is_read(&self, cache: &dyn ReadStateCache) -> Result<bool> {
        cache.exists(&self.cache_key())
    }

    /// Mark the entry as read; returns whether a new record was written
    pub fn mark_as_read(&self, cache: &dyn ReadStateCache) -> Result<bool> {
        let key = self.cache_key();
        if cache.exists(&key)? {
            return Ok(false);
        }
        cache.remember_forever(&key, &|| self.raw_content())?;
        Ok(true)
    }

    /// Remove the first occurrence of the raw content from the source file
    ///
    /// Returns `false` when the raw content is no longer in the file. The
    /// match is textual: with duplicate raw text only the first copy goes.
    /// Bytes outside the removed entry are written back unchanged, including
    /// ones that are not valid UTF-8.
    pub fn delete(&self) -> std::io::Result<bool> {
        let text = LogText::read(&self.file_path)?;
        let raw = self.raw_content();

        let Some(start) = text.as_str().find(&raw) else {
            debug!(
                "Entry {} not found in {}, nothing to delete",
                self.id,
                self.file_path.display()
            );
            return Ok(false);
        };

        write_atomically(&self.file_path, &text.splice(&[(start..start + raw.len(), "")]))?;

        info!("Deleted entry {} from {}", self.id, self.file_path.display());
        Ok(true)
    }
}

/// Identity of raw entry text
pub fn generate_id(raw_content: &str) -> String {
    format!("{:x}", md5::compute(raw_content))
}

fn canonical_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
