//! Log filters
//!
//! This module provides the environment and level filters applied to raw
//! entries while a file is parsed, and the ordering applied to the final
//! entry set.

use crate::logs::entry::{LogEntry, RawEntry};
use crate::logs::{OrderDirection, OrderField};
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Levels an allow-list may name; anything else never matches
pub const ACCEPTED_LEVELS: [&str; 8] = [
    "emergency",
    "alert",
    "critical",
    "error",
    "warning",
    "notice",
    "info",
    "debug",
];

/// Trait for log filters
pub trait LogFilter: Send + Sync {
    /// Returns true if the entry should be kept
    fn filter(&self, entry: &RawEntry) -> bool;
}

/// Environment filter - keep entries logged in one environment
///
/// Compares case-sensitively against the environment token exactly as it
/// appears in the header.
pub struct EnvironmentFilter {
    environment: Option<String>,
}

impl EnvironmentFilter {
    /// Create a new environment filter; `None` or an empty name keeps everything
    pub fn new(environment: Option<&str>) -> Self {
        Self {
            environment: environment
                .filter(|env| !env.is_empty())
                .map(str::to_string),
        }
    }
}

impl LogFilter for EnvironmentFilter {
    fn filter(&self, entry: &RawEntry) -> bool {
        match &self.environment {
            None => true,
            Some(wanted) => entry.environment.as_deref() == Some(wanted.as_str()),
        }
    }
}

/// Level filter - keep entries whose level is in the allow-list
pub struct LevelFilter {
    /// Intersection of the allow-list with [`ACCEPTED_LEVELS`]
    allowed: Vec<&'static str>,
    unrestricted: bool,
}

impl LevelFilter {
    /// Create a new level filter; an empty allow-list keeps everything
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        let unrestricted = allowed.is_empty();
        let allowed = ACCEPTED_LEVELS
            .iter()
            .copied()
            .filter(|level| {
                allowed
                    .iter()
                    .any(|wanted| wanted.as_ref().trim().eq_ignore_ascii_case(level))
            })
            .collect();

        Self {
            allowed,
            unrestricted,
        }
    }

    /// Whether a level passes, compared case-insensitively
    pub fn matches(&self, level: Option<&str>) -> bool {
        if self.unrestricted {
            return true;
        }

        level.is_some_and(|level| {
            let level = level.to_lowercase();
            self.allowed.iter().any(|allowed| *allowed == level)
        })
    }

    pub fn accepted_levels() -> &'static [&'static str] {
        &ACCEPTED_LEVELS
    }
}

impl LogFilter for LevelFilter {
    fn filter(&self, entry: &RawEntry) -> bool {
        self.matches(entry.level.as_deref())
    }
}

/// Apply a list of filters to a raw entry
/// Returns true if the entry passes all filters (should be kept)
pub fn apply_filters(entry: &RawEntry, filters: &[Box<dyn LogFilter>]) -> bool {
    filters.iter().all(|filter| filter.filter(entry))
}

/// Compare strings the way people order them: digit runs by numeric value
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_digits = take_digits(&mut left);
                let y_digits = take_digits(&mut right);
                let x_value = x_digits.trim_start_matches('0');
                let y_value = y_digits.trim_start_matches('0');

                let ordering = x_value
                    .len()
                    .cmp(&y_value.len())
                    .then_with(|| x_value.cmp(y_value));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(ch);
    }
    digits
}

fn natural_cmp_opt(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => natural_cmp(a, b),
        _ => a.is_some().cmp(&b.is_some()),
    }
}

/// Compare two entries on one field; missing values sort first
pub fn compare_entries(a: &LogEntry, b: &LogEntry, field: OrderField) -> Ordering {
    match field {
        OrderField::Id => natural_cmp(&a.id, &b.id),
        OrderField::Date => a.date.cmp(&b.date),
        OrderField::Level => natural_cmp_opt(a.level.as_deref(), b.level.as_deref()),
        OrderField::Environment => {
            natural_cmp_opt(a.environment.as_deref(), b.environment.as_deref())
        }
        OrderField::FilePath => natural_cmp(
            &a.file_path.to_string_lossy(),
            &b.file_path.to_string_lossy(),
        ),
    }
}

/// Stable sort; entries that compare equal keep their discovery order
pub fn sort_entries(entries: &mut [LogEntry], field: OrderField, direction: OrderDirection) {
    entries.sort_by(|a, b| {
        let ordering = compare_entries(a, b, field);
        match direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    });
}
