//! Continuation normalization
//!
//! Loggers may emit a bare `Next` marker instead of repeating the header when
//! several entries share date, environment and level. Before entries are
//! extracted, every marker is replaced by the full header of the entry right
//! before it and the file is rewritten once. Normalizing already normalized
//! content is a no-op, so the file only changes on the first read.
//!
//! The rewrite splices headers into the original bytes, so bytes that are not
//! valid UTF-8 survive it unchanged.

use crate::error::{ReaderError, Result};
use crate::logs::file_set::{write_atomically, LogText};
use crate::logs::log_parsers::LogParser;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};

/// Content after marker substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub content: String,
    /// Number of markers replaced by a full header
    pub substitutions: usize,
    /// Marker spans of the input and the header written over each
    pub edits: Vec<(Range<usize>, String)>,
}

impl Normalized {
    pub fn changed(&self) -> bool {
        self.substitutions > 0
    }
}

/// Replace continuation markers in `content` with the preceding full header
///
/// Only the marker bytes are replaced; everything else is kept verbatim.
/// A chain of markers resolves to the last full header before it. A marker
/// with no full header before it is left in place and its entry keeps empty
/// date, environment and level.
pub fn normalize_content(parser: &dyn LogParser, content: &str) -> Normalized {
    let parsed = parser.parse_log_content(content);

    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;
    let mut edits = Vec::new();
    let mut previous_header: Option<&str> = None;

    for segment in &parsed.segments {
        if !segment.is_continuation() {
            previous_header = Some(segment.header.as_str());
            continue;
        }

        match previous_header {
            Some(header) => {
                output.push_str(&content[cursor..segment.span.start]);
                output.push_str(header);
                cursor = segment.span.end;
                edits.push((segment.span.clone(), header.to_string()));
            }
            None => {
                warn!(
                    "Continuation marker at byte {} has no preceding header, leaving it unresolved",
                    segment.span.start
                );
            }
        }
    }

    output.push_str(&content[cursor..]);

    Normalized {
        content: output,
        substitutions: edits.len(),
        edits,
    }
}

/// Read `path`, normalize it and rewrite the file if any marker was replaced
///
/// Returns the normalized content, with invalid UTF-8 decoded as `U+FFFD`.
/// A failed rewrite is logged and the normalized content is still returned,
/// so the caller sees the same entries it would see after a successful
/// rewrite.
pub fn normalize_file(parser: &dyn LogParser, path: &Path) -> Result<String> {
    let text = LogText::read(path).map_err(|source| ReaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !text.is_lossless() {
        debug!("{} is not valid UTF-8, decoding lossily", path.display());
    }

    let normalized = normalize_content(parser, text.as_str());

    if normalized.changed() {
        match write_atomically(path, &text.splice(&normalized.edits)) {
            Ok(()) => info!(
                "Expanded {} continuation marker(s) in {}",
                normalized.substitutions,
                path.display()
            ),
            Err(e) => warn!(
                "Failed to rewrite {} after expanding continuation markers: {}",
                path.display(),
                e
            ),
        }
    }

    Ok(normalized.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::log_parsers::StandardParser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_content_expands_marker() {
        let parser = StandardParser::new();
        let normalized =
            normalize_content(&parser, "[2024-01-01 00:00:00] local.ERROR: first\nNext second");

        assert_eq!(normalized.substitutions, 1);
        assert_eq!(
            normalized.content,
            "[2024-01-01 00:00:00] local.ERROR: first\n[2024-01-01 00:00:00] local.ERROR: second"
        );
    }

    #[test]
    fn test_normalize_content_resolves_chains() {
        let parser = StandardParser::new();
        let normalized = normalize_content(
            &parser,
            "[2024-01-01 00:00:00] local.ERROR: a\nNext b\nNext c\n[2024-01-02 00:00:00] prod.INFO: d\nNext e\n",
        );

        assert_eq!(normalized.substitutions, 3);
        assert_eq!(
            normalized.content,
            "[2024-01-01 00:00:00] local.ERROR: a\n\
             [2024-01-01 00:00:00] local.ERROR: b\n\
             [2024-01-01 00:00:00] local.ERROR: c\n\
             [2024-01-02 00:00:00] prod.INFO: d\n\
             [2024-01-02 00:00:00] prod.INFO: e\n"
        );
    }

    #[test]
    fn test_normalize_content_is_idempotent() {
        let parser = StandardParser::new();
        let once = normalize_content(&parser, "[2024-01-01 00:00:00] local.ERROR: a\nNext b\n");
        let twice = normalize_content(&parser, &once.content);

        assert_eq!(twice.substitutions, 0);
        assert!(!twice.changed());
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn test_normalize_content_orphan_marker() {
        let parser = StandardParser::new();
        let normalized = normalize_content(&parser, "Next orphan\n[2024-01-01 00:00:00] local.INFO: ok\n");

        assert_eq!(normalized.substitutions, 0);
        assert_eq!(
            normalized.content,
            "Next orphan\n[2024-01-01 00:00:00] local.INFO: ok\n"
        );
    }

    #[test]
    fn test_normalize_file_rewrites_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("laravel.log");
        fs::write(&path, "[2024-01-01 00:00:00] local.ERROR: first\nNext second").unwrap();

        let parser = StandardParser::new();
        let content = normalize_file(&parser, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert_eq!(content.matches("local.ERROR:").count(), 2);

        let again = normalize_file(&parser, &path).unwrap();
        assert_eq!(again, content);
    }

    #[test]
    fn test_normalize_file_keeps_invalid_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("laravel.log");
        fs::write(
            &path,
            b"[2024-01-01 00:00:00] local.ERROR: bad \xff byte\nNext after \xfe\n".as_slice(),
        )
        .unwrap();

        let parser = StandardParser::new();
        let content = normalize_file(&parser, &path).unwrap();

        assert_eq!(
            content,
            "[2024-01-01 00:00:00] local.ERROR: bad \u{FFFD} byte\n\
             [2024-01-01 00:00:00] local.ERROR: after \u{FFFD}\n"
        );
        assert_eq!(
            fs::read(&path).unwrap(),
            b"[2024-01-01 00:00:00] local.ERROR: bad \xff byte\n\
              [2024-01-01 00:00:00] local.ERROR: after \xfe\n"
                .to_vec()
        );
    }

    #[test]
    fn test_normalize_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let parser = StandardParser::new();

        assert!(matches!(
            normalize_file(&parser, &temp_dir.path().join("gone.log")),
            Err(ReaderError::Io { .. })
        ));
    }
}
