//! Log file resolution and file content handling
//!
//! Expands a log directory and a filename pattern into the list of files to
//! read. Patterns use shell glob syntax plus `{a,b}` alternatives, and may
//! reach into subdirectories (`2024/*.log`, or any depth with `**`). Results
//! come back sorted by path.
//!
//! [`LogText`] decodes file bytes for the grammar and maps edits made on the
//! decoded text back onto the original bytes, so rewrites never lose bytes
//! that are not valid UTF-8.

use crate::error::{ReaderError, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Pattern used when no filename is configured
pub const DEFAULT_FILENAME_PATTERN: &str = "*.*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Resolve the files in `directory` whose relative path matches `pattern`
pub fn resolve(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(ReaderError::UnableToRetrieveLogFiles {
            path: directory.to_path_buf(),
        });
    }

    let pattern = if pattern.trim().is_empty() {
        DEFAULT_FILENAME_PATTERN
    } else {
        pattern
    };

    let alternatives = expand_braces(pattern);
    let patterns = alternatives
        .iter()
        .map(|alternative| {
            Pattern::new(alternative).map_err(|source| ReaderError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // `**` matches any number of directories
    let max_depth = if alternatives.iter().any(|alternative| alternative.contains("**")) {
        usize::MAX
    } else {
        alternatives
            .iter()
            .map(|alternative| alternative.split('/').filter(|c| !c.is_empty()).count())
            .max()
            .unwrap_or(1)
            .max(1)
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                warn!("Cannot list log directory {}: {}", directory.display(), e);
                return Err(ReaderError::UnableToRetrieveLogFiles {
                    path: directory.to_path_buf(),
                });
            }
            Err(e) => {
                warn!("Skipping unreadable path under {}: {}", directory.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(directory) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        if patterns.iter().any(|p| p.matches_with(&relative, MATCH_OPTIONS)) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand `{a,b}` alternatives, including nested groups
///
/// An unbalanced brace is kept as a literal character.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (offset, ch) in pattern[open..].char_indices() {
        let index = open + offset;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(index),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| {
            let alternative = &pattern[w[0] + 1..w[1]];
            expand_braces(&format!("{}{}{}", prefix, alternative, suffix))
        })
        .collect()
}

/// Contiguous run of the decoded text and the bytes it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    text_start: usize,
    byte_start: usize,
    byte_len: usize,
    /// Valid UTF-8 copied as is; otherwise one replacement character
    verbatim: bool,
}

/// File content decoded lossily, remembering the original bytes
///
/// Invalid UTF-8 sequences show up as `U+FFFD` in [`LogText::as_str`], the
/// same way `String::from_utf8_lossy` decodes them. Edits expressed as ranges
/// of the decoded text are applied to the original bytes by
/// [`LogText::splice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogText {
    bytes: Vec<u8>,
    text: String,
    runs: Vec<Run>,
}

impl LogText {
    /// Read and decode the file at `path`
    pub fn read(path: &Path) -> io::Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mut text = String::with_capacity(bytes.len());
        let mut runs = Vec::new();
        let mut byte_start = 0;

        for chunk in bytes.utf8_chunks() {
            let valid = chunk.valid();
            if !valid.is_empty() {
                runs.push(Run {
                    text_start: text.len(),
                    byte_start,
                    byte_len: valid.len(),
                    verbatim: true,
                });
                text.push_str(valid);
                byte_start += valid.len();
            }

            let invalid = chunk.invalid();
            if !invalid.is_empty() {
                runs.push(Run {
                    text_start: text.len(),
                    byte_start,
                    byte_len: invalid.len(),
                    verbatim: false,
                });
                text.push(char::REPLACEMENT_CHARACTER);
                byte_start += invalid.len();
            }
        }

        Self { bytes, text, runs }
    }

    /// Decoded text handed to the grammar
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Whether the file was valid UTF-8
    pub fn is_lossless(&self) -> bool {
        self.runs.iter().all(|run| run.verbatim)
    }

    /// Byte offset of a char boundary in the decoded text
    fn byte_offset(&self, text_offset: usize) -> usize {
        let index = self.runs.partition_point(|run| run.text_start <= text_offset);
        let Some(run) = index.checked_sub(1).and_then(|i| self.runs.get(i)) else {
            return text_offset;
        };

        if run.verbatim {
            run.byte_start + (text_offset - run.text_start)
        } else if text_offset == run.text_start {
            run.byte_start
        } else {
            run.byte_start + run.byte_len
        }
    }

    /// Original bytes with each decoded-text range replaced
    ///
    /// Ranges must lie on char boundaries of [`LogText::as_str`], be sorted
    /// and not overlap. Bytes outside the ranges are kept exactly.
    pub fn splice<S: AsRef<str>>(&self, edits: &[(Range<usize>, S)]) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.bytes.len());
        let mut cursor = 0;

        for (range, replacement) in edits {
            let start = self.byte_offset(range.start);
            let end = self.byte_offset(range.end);
            output.extend_from_slice(&self.bytes[cursor..start]);
            output.extend_from_slice(replacement.as_ref().as_bytes());
            cursor = end;
        }

        output.extend_from_slice(&self.bytes[cursor..]);
        output
    }
}

/// Replace the whole content of `path` through a sibling temp file
///
/// Readers never observe a partially written file. The original permissions
/// are carried over to the new file.
pub fn write_atomically(path: &Path, content: &[u8]) -> io::Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(directory)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("*.log"), vec!["*.log"]);
        assert_eq!(
            expand_braces("laravel-{a,b}.log"),
            vec!["laravel-a.log", "laravel-b.log"]
        );
        assert_eq!(
            expand_braces("{x,y{1,2}}.log"),
            vec!["x.log", "y1.log", "y2.log"]
        );
        assert_eq!(expand_braces("broken{.log"), vec!["broken{.log"]);
    }

    #[test]
    fn test_resolve_sorted_matches() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "b.log");
        touch(temp_dir.path(), "a.log");
        touch(temp_dir.path(), "notes");
        touch(temp_dir.path(), ".hidden.log");

        let files = resolve(temp_dir.path(), "*.*").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_resolve_brace_pattern() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "laravel.log");
        touch(temp_dir.path(), "worker.log");
        touch(temp_dir.path(), "other.log");

        let files = resolve(temp_dir.path(), "{laravel,worker}.log").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| !p.ends_with("other.log")));
    }

    #[test]
    fn test_resolve_subdirectory_pattern() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "2024/jan.log");
        touch(temp_dir.path(), "top.log");

        let files = resolve(temp_dir.path(), "2024/*.log").unwrap();
        assert_eq!(files, vec![temp_dir.path().join("2024/jan.log")]);

        let files = resolve(temp_dir.path(), "*.log").unwrap();
        assert_eq!(files, vec![temp_dir.path().join("top.log")]);
    }

    #[test]
    fn test_resolve_double_star_reaches_any_depth() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a/b/c/deep.log");
        touch(temp_dir.path(), "a/shallow.log");
        touch(temp_dir.path(), "a/b/c/deep.txt");

        let files = resolve(temp_dir.path(), "**/*.log").unwrap();
        assert!(files.contains(&temp_dir.path().join("a/b/c/deep.log")));
        assert!(files.contains(&temp_dir.path().join("a/shallow.log")));
        assert!(!files.contains(&temp_dir.path().join("a/b/c/deep.txt")));
    }

    #[test]
    fn test_log_text_decodes_invalid_bytes() {
        let text = LogText::from_bytes(b"ok \xff\xfe done".to_vec());

        assert_eq!(text.as_str(), "ok \u{FFFD}\u{FFFD} done");
        assert_eq!(text.as_str(), String::from_utf8_lossy(b"ok \xff\xfe done"));
        assert!(!text.is_lossless());
        assert!(LogText::from_bytes(b"plain".to_vec()).is_lossless());
    }

    #[test]
    fn test_log_text_splice_keeps_invalid_bytes() {
        let bytes = b"head \xff mid \xc3 tail".to_vec();
        let text = LogText::from_bytes(bytes);

        let mid = text.as_str().find("mid").unwrap();
        let tail = text.as_str().find("tail").unwrap();
        let spliced = text.splice(&[(mid..mid + 3, "MIDDLE"), (tail..tail + 4, "")]);
        assert_eq!(spliced, b"head \xff MIDDLE \xc3 ".to_vec());

        let end = text.as_str().len();
        let spliced = text.splice(&[(0..end, "all")]);
        assert_eq!(spliced, b"all".to_vec());

        let no_edits: [(Range<usize>, &str); 0] = [];
        assert_eq!(text.splice(&no_edits), text.as_bytes());
    }

    #[test]
    fn test_resolve_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        match resolve(&missing, "*.log") {
            Err(ReaderError::UnableToRetrieveLogFiles { path }) => assert_eq!(path, missing),
            other => panic!("Expected UnableToRetrieveLogFiles, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve(temp_dir.path(), "[.log"),
            Err(ReaderError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_write_atomically_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "old content").unwrap();

        write_atomically(&path, b"new content").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new content");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }
}
