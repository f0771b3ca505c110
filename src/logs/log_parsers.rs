//! Log grammar
//!
//! This module provides the [`LogParser`] strategy trait and the
//! [`StandardParser`] grammar for `[date] env.LEVEL: message` logs.
//!
//! # Examples
//!
//! ```rust
//! use logreader::logs::log_parsers::{LogParser, StandardParser};
//!
//! let parser = StandardParser::new();
//! let content = parser.parse_log_content("[2024-01-01 00:00:00] local.ERROR: boom\n");
//! assert_eq!(content.segments.len(), 1);
//! assert_eq!(content.segments[0].level.as_deref(), Some("ERROR"));
//!
//! let context = parser.parse_log_context("exception 'RuntimeException' with message 'boom' in /a/b.php:10");
//! assert_eq!(context.exception.as_deref(), Some("RuntimeException"));
//! assert_eq!(context.message, "boom");
//! assert_eq!(context.line, Some(10));
//! ```

use crate::logs::ParserType;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

// ASCII classes only; `\d`, `\w` and `\s` are Unicode-aware in `regex`
pub const LOG_DATE_PATTERN: &str =
    r"\[([0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2})\]";
pub const LOG_ENVIRONMENT_PATTERN: &str = r"([A-Za-z0-9_]+)";
pub const LOG_LEVEL_PATTERN: &str = r"([A-Z]+)";
pub const CONTINUATION_MARKER: &str = "Next";
pub const CONTEXT_MESSAGE_PATTERN: &str = r"([^{]*)?";
pub const CONTEXT_EXCEPTION_PATTERN: &str =
    r#"(\{"exception":"\[object\](?-u:\s)\(([^\s(]+))?.*"#;
pub const CONTEXT_IN_PATTERN: &str = r"(?-u:\s)(in|at)(?-u:\s)(.*):([0-9]+)\)?";
pub const STACK_TRACE_DIVIDER_PATTERN: &str = r"(\[stacktrace\]|Stack trace:)";
pub const STACK_TRACE_INDEX_PATTERN: &str = r"#[0-9]+(?-u:\s)";
pub const TRACE_IN_DIVIDER: &str = ": ";
pub const TRACE_FILE_PATTERN: &str = r"(.*)\(([0-9]+)\)";

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^(?:{}(?-u:\s){}\.{}:|{}\b)",
        LOG_DATE_PATTERN, LOG_ENVIRONMENT_PATTERN, LOG_LEVEL_PATTERN, CONTINUATION_MARKER
    ))
    .expect("header pattern is valid")
});

static DIVIDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^{}", STACK_TRACE_DIVIDER_PATTERN))
        .expect("stack trace divider pattern is valid")
});

// Trailing `"}` left over when the trace was serialized inside a JSON context
static TRACE_ARTIFACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)^(.*)"\}(?-u:\s)*\z"#).expect("trace artifact pattern is valid"));

static CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?ms)^{}{}{}$",
        CONTEXT_MESSAGE_PATTERN, CONTEXT_EXCEPTION_PATTERN, CONTEXT_IN_PATTERN
    ))
    .expect("context pattern is valid")
});

static LEADING_EXCEPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ms)^((exception(?-u:\s)')?([^\s']+)('|:))?((?-u:\s)with(?-u:\s)message(?-u:\s))?(.*)$",
    )
    .expect("leading exception pattern is valid")
});

static TRACE_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^{}", STACK_TRACE_INDEX_PATTERN))
        .expect("trace index pattern is valid")
});

static TRACE_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{}$", TRACE_FILE_PATTERN)).expect("trace file pattern is valid")
});

/// One header occurrence and the body text that follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSegment {
    /// Full header text as matched, e.g. `[2024-01-01 00:00:00] local.ERROR:`
    pub header: String,
    /// Byte range of the header within the parsed content
    pub span: Range<usize>,
    pub date: Option<String>,
    pub environment: Option<String>,
    pub level: Option<String>,
    /// Text up to the next header, leading whitespace removed
    pub body: String,
}

impl LogSegment {
    /// A continuation marker carries none of the header fields
    pub fn is_continuation(&self) -> bool {
        self.date.is_none() && self.environment.is_none() && self.level.is_none()
    }
}

/// Header/body segments of a whole file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContent {
    pub segments: Vec<LogSegment>,
}

/// Body split at the stack trace divider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyParts {
    pub context: String,
    /// `None` when no stack trace was captured
    pub stack_traces: Option<String>,
}

/// Fields extracted from the context segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextParts {
    pub message: String,
    pub exception: Option<String>,
    pub location: Option<String>,
    pub line: Option<u32>,
}

/// Fields extracted from one stack frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceParts {
    pub caught_at: String,
    pub location: Option<String>,
    pub line: Option<u32>,
}

/// Trait for log grammars
///
/// Implementations never fail: text that does not fit the grammar produces
/// coarser fields rather than an error.
pub trait LogParser: Send + Sync {
    /// Split file content into header/body segments
    fn parse_log_content(&self, content: &str) -> LogContent;

    /// Split a body into its context and optional stack trace
    fn parse_log_body(&self, content: &str) -> BodyParts;

    /// Extract message, exception and location from a context segment
    fn parse_log_context(&self, content: &str) -> ContextParts;

    /// Split a stack trace into frame texts
    fn parse_stack_trace(&self, content: &str) -> Vec<String>;

    /// Extract location and call site from one frame
    fn parse_trace_entry(&self, content: &str) -> TraceParts;
}

/// Grammar for the `[date] env.LEVEL:` log convention
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardParser;

impl StandardParser {
    /// Create a new standard parser
    pub fn new() -> Self {
        Self
    }
}

impl LogParser for StandardParser {
    fn parse_log_content(&self, content: &str) -> LogContent {
        let headers: Vec<_> = HEADER_RE.captures_iter(content).collect();
        let mut segments = Vec::with_capacity(headers.len());

        for (index, caps) in headers.iter().enumerate() {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let body_end = headers
                .get(index + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(content.len());

            segments.push(LogSegment {
                header: whole.as_str().to_string(),
                span: whole.range(),
                date: caps.get(1).map(|m| m.as_str().to_string()),
                environment: caps.get(2).map(|m| m.as_str().to_string()),
                level: caps.get(3).map(|m| m.as_str().to_string()),
                body: content[whole.end()..body_end].trim_start().to_string(),
            });
        }

        LogContent { segments }
    }

    fn parse_log_body(&self, content: &str) -> BodyParts {
        let mut parts = DIVIDER_RE.split(content).map(str::trim_start);
        let context = parts.next().unwrap_or_default().to_string();

        let stack_traces = parts.next().map(|trace| {
            TRACE_ARTIFACT_RE
                .captures(trace)
                .and_then(|caps| caps.get(1))
                .map_or(trace, |m| m.as_str())
                .to_string()
        });

        BodyParts {
            context,
            stack_traces,
        }
    }

    fn parse_log_context(&self, content: &str) -> ContextParts {
        let content = content.trim();
        let mut parts = ContextParts {
            message: content.to_string(),
            ..Default::default()
        };

        if let Some(caps) = CONTEXT_RE.captures(content) {
            parts.message = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            parts.exception = caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|name| !name.is_empty());
            parts.location = caps.get(5).map(|m| m.as_str().trim().to_string());
            parts.line = caps.get(6).and_then(|m| m.as_str().parse().ok());
        }

        // No JSON exception fragment: the name may lead the message instead
        if parts.exception.is_none() {
            let (exception, message) = match LEADING_EXCEPTION_RE.captures(&parts.message) {
                Some(caps) => (
                    caps.get(1)
                        .and(caps.get(3))
                        .map(|m| m.as_str().trim().to_string()),
                    strip_single_quotes(caps.get(6).map_or(content, |m| m.as_str()).trim())
                        .to_string(),
                ),
                None => (None, parts.message.clone()),
            };
            parts.exception = exception;
            parts.message = message;
        }

        parts
    }

    fn parse_stack_trace(&self, content: &str) -> Vec<String> {
        let content = content.trim();
        if content.is_empty() {
            return Vec::new();
        }

        let mut frames: Vec<String> = TRACE_INDEX_RE.split(content).map(str::to_string).collect();
        if frames.first().is_some_and(|first| first.is_empty()) {
            frames.remove(0);
        }
        frames
    }

    fn parse_trace_entry(&self, content: &str) -> TraceParts {
        let content = content.trim();

        let Some((location, caught_at)) = content.split_once(TRACE_IN_DIVIDER) else {
            return TraceParts {
                caught_at: content.to_string(),
                ..Default::default()
            };
        };

        let mut parts = TraceParts {
            caught_at: caught_at.trim().to_string(),
            location: Some(location.trim().to_string()),
            line: None,
        };

        if let Some(caps) = TRACE_FILE_RE.captures(location.trim()) {
            parts.location = caps.get(1).map(|m| m.as_str().trim().to_string());
            parts.line = caps.get(2).and_then(|m| m.as_str().parse().ok());
        }

        parts
    }
}

fn strip_single_quotes(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Create a parser instance based on configuration
pub fn create_parser(parser_type: ParserType) -> Box<dyn LogParser> {
    match parser_type {
        ParserType::Standard => Box::new(StandardParser::new()),
    }
}
