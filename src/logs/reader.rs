//! Log reader engine
//!
//! [`LogReader`] holds the reading parameters (directory, filename pattern,
//! filters, ordering) and runs the whole pipeline on every call. Nothing is
//! cached between calls except what the injected read-state cache keeps.

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::logs::entry::{LogEntry, RawEntry};
use crate::logs::file_set::{self, DEFAULT_FILENAME_PATTERN};
use crate::logs::log_filters::{
    apply_filters, sort_entries, EnvironmentFilter, LevelFilter, LogFilter,
};
use crate::logs::log_parsers::{create_parser, LogParser};
use crate::logs::normalizer::normalize_file;
use crate::logs::paginator::{Page, PageSource};
use crate::logs::read_state::ReadStateCache;
use crate::logs::{OrderDirection, OrderField};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads, filters and mutates the entries of a log directory
pub struct LogReader {
    cache: Arc<dyn ReadStateCache>,
    parser: Box<dyn LogParser>,
    page_source: Option<Box<dyn PageSource>>,
    path: PathBuf,
    filename: String,
    environment: Option<String>,
    levels: Vec<String>,
    order_by_field: Option<OrderField>,
    order_by_direction: Option<OrderDirection>,
    include_read: bool,
}

impl LogReader {
    /// Create a reader from configuration with an injected read-state cache
    pub fn new(cache: Arc<dyn ReadStateCache>, config: &ReaderConfig) -> Self {
        let mut reader = Self {
            cache,
            parser: create_parser(config.default_log_parser),
            page_source: None,
            path: config.path.clone(),
            filename: DEFAULT_FILENAME_PATTERN.to_string(),
            environment: None,
            levels: Vec::new(),
            order_by_field: None,
            order_by_direction: None,
            include_read: false,
        };

        if let Some(filename) = &config.filename {
            reader.filename(filename);
        }
        if let Some(environment) = &config.environment {
            reader.environment(environment);
        }
        if let Some(levels) = &config.level {
            reader.level(levels.iter().map(String::as_str));
        }
        reader.order_by(&config.order_by_field, &config.order_by_direction);

        reader
    }

    /// Only read entries logged in `environment`; an empty name clears the filter
    pub fn environment(&mut self, environment: &str) -> &mut Self {
        self.environment = if environment.is_empty() {
            None
        } else {
            Some(environment.to_string())
        };
        self
    }

    /// Only read entries with one of `levels`; an empty list clears the filter
    pub fn level<I, S>(&mut self, levels: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    /// Read files matching `pattern` inside the log directory
    pub fn filename(&mut self, pattern: &str) -> &mut Self {
        self.filename = if pattern.trim().is_empty() {
            DEFAULT_FILENAME_PATTERN.to_string()
        } else {
            pattern.to_string()
        };
        self
    }

    /// Include entries already marked as read
    pub fn with_read(&mut self) -> &mut Self {
        self.include_read(true)
    }

    pub fn include_read(&mut self, include: bool) -> &mut Self {
        self.include_read = include;
        self
    }

    /// Order the entries by `field` in `direction`
    ///
    /// Each part is checked on its own; an unknown field or direction is
    /// ignored and the previous setting stays.
    pub fn order_by(&mut self, field: &str, direction: &str) -> &mut Self {
        match OrderField::parse(field) {
            Some(field) => self.order_by_field = Some(field),
            None => warn!("Ignoring unknown order field '{}'", field),
        }
        match OrderDirection::parse(direction) {
            Some(direction) => self.order_by_direction = Some(direction),
            None => warn!("Ignoring unknown order direction '{}'", direction),
        }
        self
    }

    /// Keep entries in discovery order
    pub fn unordered(&mut self) -> &mut Self {
        self.order_by_field = None;
        self.order_by_direction = None;
        self
    }

    pub fn set_log_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn set_log_parser(&mut self, parser: Box<dyn LogParser>) -> &mut Self {
        self.parser = parser;
        self
    }

    /// Source of the page number when [`LogReader::paginate`] gets none
    pub fn set_page_source(&mut self, source: Box<dyn PageSource>) -> &mut Self {
        self.page_source = Some(source);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    pub fn log_filename(&self) -> &str {
        &self.filename
    }

    pub fn environment_filter(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn level_filter(&self) -> &[String] {
        &self.levels
    }

    pub fn order_by_field(&self) -> Option<OrderField> {
        self.order_by_field
    }

    pub fn order_by_direction(&self) -> Option<OrderDirection> {
        self.order_by_direction
    }

    pub fn includes_read(&self) -> bool {
        self.include_read
    }

    pub fn cache(&self) -> &dyn ReadStateCache {
        self.cache.as_ref()
    }

    fn filters(&self) -> Vec<Box<dyn LogFilter>> {
        vec![
            Box::new(EnvironmentFilter::new(self.environment.as_deref())),
            Box::new(LevelFilter::new(self.levels.as_slice())),
        ]
    }

    /// Read every entry that passes the filters
    ///
    /// Entries come back in file order, files in path order, unless both an
    /// order field and direction are set. Entries with the same id collapse
    /// into the first position, holding the last value seen. A file that
    /// cannot be read is skipped with a warning.
    pub fn get(&self) -> Result<Vec<LogEntry>> {
        let files = file_set::resolve(&self.path, &self.filename)?;
        debug!(
            "Reading {} file(s) matching '{}' in {}",
            files.len(),
            self.filename,
            self.path.display()
        );

        let filters = self.filters();
        let mut entries: Vec<LogEntry> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for file in &files {
            let content = match normalize_file(self.parser.as_ref(), file) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping log file: {}", e);
                    continue;
                }
            };

            for segment in self.parser.parse_log_content(&content).segments {
                let raw = RawEntry {
                    header: segment.header,
                    body: segment.body,
                    date: segment.date,
                    environment: segment.environment,
                    level: segment.level,
                    file_path: file.clone(),
                };

                if !apply_filters(&raw, &filters) {
                    continue;
                }

                let entry = LogEntry::from_raw(self.parser.as_ref(), raw);
                if !self.include_read && entry.is_read(self.cache.as_ref())? {
                    continue;
                }

                match positions.get(&entry.id) {
                    Some(&index) => entries[index] = entry,
                    None => {
                        positions.insert(entry.id.clone(), entries.len());
                        entries.push(entry);
                    }
                }
            }
        }

        if let (Some(field), Some(direction)) = (self.order_by_field, self.order_by_direction) {
            sort_entries(&mut entries, field, direction);
        }

        debug!("Read {} log entries", entries.len());
        Ok(entries)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.get()?.len())
    }

    /// Entry with the given id among those [`LogReader::get`] returns
    pub fn find(&self, id: &str) -> Result<Option<LogEntry>> {
        Ok(self.get()?.into_iter().find(|entry| entry.id == id))
    }

    /// Mark every retrieved entry as read; returns how many were newly marked
    pub fn mark_as_read(&self) -> Result<usize> {
        let batch = self
            .get()?
            .iter()
            .map(|entry| (entry.cache_key(), entry.raw_content()))
            .collect();
        let count = self.cache.remember_all(batch)?;

        info!("Marked {} log entries as read", count);
        Ok(count)
    }

    /// Delete every retrieved entry from its file; returns how many went
    pub fn delete(&self) -> Result<usize> {
        let mut count = 0;
        for entry in self.get()? {
            match entry.delete() {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to delete entry {} from {}: {}",
                    entry.id,
                    entry.file_path.display(),
                    e
                ),
            }
        }

        info!("Deleted {} log entries", count);
        Ok(count)
    }

    /// Unlink every resolved log file; returns how many were removed
    pub fn remove_log_file(&self) -> Result<usize> {
        let mut count = 0;
        for file in file_set::resolve(&self.path, &self.filename)? {
            match fs::remove_file(&file) {
                Ok(()) => {
                    info!("Removed log file {}", file.display());
                    count += 1;
                }
                Err(e) => warn!("Failed to remove log file {}: {}", file.display(), e),
            }
        }

        Ok(count)
    }

    /// One page of the retrieved entries
    ///
    /// Without an explicit `page` the page source is asked, then page 1 is used.
    pub fn paginate(&self, per_page: usize, page: Option<usize>) -> Result<Page<LogEntry>> {
        let page = page
            .or_else(|| {
                self.page_source
                    .as_ref()
                    .and_then(|source| source.current_page())
            })
            .unwrap_or(1);

        Ok(Page::from_items(self.get()?, per_page, page))
    }

    /// Map of file basename to path for files matching `pattern`
    ///
    /// Defaults to all files with an extension. A missing log directory
    /// yields an empty map.
    pub fn get_log_filename_list(&self, pattern: Option<&str>) -> Result<BTreeMap<String, PathBuf>> {
        let pattern = pattern
            .filter(|pattern| !pattern.trim().is_empty())
            .unwrap_or(DEFAULT_FILENAME_PATTERN);

        if !self.path.is_dir() {
            debug!("Log directory {} does not exist", self.path.display());
            return Ok(BTreeMap::new());
        }

        let mut names = BTreeMap::new();
        for file in file_set::resolve(&self.path, pattern)? {
            if let Some(name) = file.file_name() {
                names.insert(name.to_string_lossy().into_owned(), file);
            }
        }

        Ok(names)
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.path)
            .field("filename", &self.filename)
            .field("environment", &self.environment)
            .field("levels", &self.levels)
            .field("order_by_field", &self.order_by_field)
            .field("order_by_direction", &self.order_by_direction)
            .field("include_read", &self.include_read)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;
    use crate::logs::read_state::MemoryCache;
    use tempfile::TempDir;

    const SAMPLE: &str = "[2024-01-02 10:00:00] production.ERROR: exception 'RuntimeException' with message 'boom' in /app/a.php:10\nStack trace:\n#0 /app/b.php(20): App\\Service->run()\n#1 {main}\n[2024-01-01 09:00:00] local.INFO: started\n[2024-01-03 11:00:00] production.WARNING: disk almost full\n";

    fn setup() -> (TempDir, LogReader) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("laravel.log"), SAMPLE).unwrap();

        let config = ReaderConfig {
            path: temp_dir.path().to_path_buf(),
            ..ReaderConfig::default()
        };
        let reader = LogReader::new(Arc::new(MemoryCache::new()), &config);
        (temp_dir, reader)
    }

    struct FixedPage(usize);

    impl PageSource for FixedPage {
        fn current_page(&self) -> Option<usize> {
            Some(self.0)
        }
    }

    #[test]
    fn test_new_applies_config() {
        let config = ReaderConfig {
            filename: Some("laravel-*.log".to_string()),
            environment: Some("production".to_string()),
            level: Some(vec!["error".to_string()]),
            order_by_field: "level".to_string(),
            order_by_direction: "DESC".to_string(),
            ..ReaderConfig::default()
        };
        let reader = LogReader::new(Arc::new(MemoryCache::new()), &config);

        assert_eq!(reader.log_path(), Path::new("storage/logs"));
        assert_eq!(reader.log_filename(), "laravel-*.log");
        assert_eq!(reader.environment_filter(), Some("production"));
        assert_eq!(reader.level_filter(), ["error".to_string()]);
        assert_eq!(reader.order_by_field(), Some(OrderField::Level));
        assert_eq!(reader.order_by_direction(), Some(OrderDirection::Desc));
        assert!(!reader.includes_read());
    }

    #[test]
    fn test_order_by_ignores_unknown_parts() {
        let (_temp_dir, mut reader) = setup();
        reader.order_by("message", "sideways");
        assert_eq!(reader.order_by_field(), Some(OrderField::Date));
        assert_eq!(reader.order_by_direction(), Some(OrderDirection::Asc));

        reader.order_by("id", "sideways");
        assert_eq!(reader.order_by_field(), Some(OrderField::Id));
        assert_eq!(reader.order_by_direction(), Some(OrderDirection::Asc));
    }

    #[test]
    fn test_get_orders_by_date() {
        let (_temp_dir, reader) = setup();
        let entries = reader.get().unwrap();

        let messages: Vec<_> = entries.iter().map(|e| e.context.message.as_str()).collect();
        assert_eq!(messages, vec!["started", "boom", "disk almost full"]);
        assert_eq!(entries[1].stack_traces.len(), 2);
    }

    #[test]
    fn test_get_unordered_keeps_file_order() {
        let (_temp_dir, mut reader) = setup();
        reader.unordered();

        let levels: Vec<_> = reader
            .get()
            .unwrap()
            .iter()
            .map(|e| e.level.clone().unwrap_or_default())
            .collect();
        assert_eq!(levels, vec!["error", "info", "warning"]);
    }

    #[test]
    fn test_get_filters_environment_and_level() {
        let (_temp_dir, mut reader) = setup();

        reader.environment("production");
        assert_eq!(reader.count().unwrap(), 2);

        reader.level(["warning"]);
        let entries = reader.get().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].context.message, "disk almost full");

        reader.environment("").level(Vec::<String>::new());
        assert_eq!(reader.count().unwrap(), 3);
    }

    #[test]
    fn test_get_collapses_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let line = "[2024-01-01 00:00:00] local.INFO: same\n";
        fs::write(temp_dir.path().join("a.log"), format!("{line}{line}")).unwrap();

        let mut reader = LogReader::new(Arc::new(MemoryCache::new()), &ReaderConfig::default());
        reader.set_log_path(temp_dir.path());

        assert_eq!(reader.count().unwrap(), 1);
    }

    #[test]
    fn test_read_entries_are_hidden_unless_requested() {
        let (_temp_dir, mut reader) = setup();

        reader.level(["info"]);
        assert_eq!(reader.mark_as_read().unwrap(), 1);
        assert_eq!(reader.mark_as_read().unwrap(), 0);

        reader.level(Vec::<String>::new());
        assert_eq!(reader.count().unwrap(), 2);

        reader.with_read();
        assert_eq!(reader.count().unwrap(), 3);
    }

    #[test]
    fn test_find() {
        let (_temp_dir, reader) = setup();
        let entries = reader.get().unwrap();

        let found = reader.find(&entries[2].id).unwrap().unwrap();
        assert_eq!(found, entries[2]);
        assert!(reader.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_delete_filtered_entries() {
        let (temp_dir, mut reader) = setup();

        reader.environment("production");
        assert_eq!(reader.delete().unwrap(), 2);
        assert_eq!(reader.count().unwrap(), 0);

        reader.environment("");
        assert_eq!(reader.count().unwrap(), 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("laravel.log")).unwrap(),
            "[2024-01-01 09:00:00] local.INFO: started\n"
        );
    }

    #[test]
    fn test_paginate_falls_back_to_page_source() {
        let (_temp_dir, mut reader) = setup();

        let page = reader.paginate(2, None).unwrap();
        assert_eq!(page.current_page, 1);
        assert_eq!(page.items.len(), 2);

        reader.set_page_source(Box::new(FixedPage(2)));
        let page = reader.paginate(2, None).unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.last_page, 2);

        let page = reader.paginate(2, Some(1)).unwrap();
        assert_eq!(page.current_page, 1);
    }

    #[test]
    fn test_missing_directory() {
        let mut reader = LogReader::new(Arc::new(MemoryCache::new()), &ReaderConfig::default());
        reader.set_log_path("/nonexistent/logreader/logs");

        assert!(matches!(
            reader.get(),
            Err(ReaderError::UnableToRetrieveLogFiles { .. })
        ));
        assert!(matches!(
            reader.remove_log_file(),
            Err(ReaderError::UnableToRetrieveLogFiles { .. })
        ));
        assert!(reader.get_log_filename_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_filename_list_and_remove_log_file() {
        let (temp_dir, mut reader) = setup();
        fs::write(temp_dir.path().join("laravel-2024-01-01.log"), "").unwrap();
        fs::write(temp_dir.path().join("notes"), "").unwrap();

        let names = reader.get_log_filename_list(None).unwrap();
        assert_eq!(
            names.keys().collect::<Vec<_>>(),
            vec!["laravel-2024-01-01.log", "laravel.log"]
        );
        assert_eq!(
            names["laravel.log"],
            temp_dir.path().join("laravel.log")
        );

        let names = reader.get_log_filename_list(Some("laravel-*.log")).unwrap();
        assert_eq!(names.len(), 1);

        reader.filename("laravel-*.log");
        assert_eq!(reader.remove_log_file().unwrap(), 1);
        assert!(!temp_dir.path().join("laravel-2024-01-01.log").exists());
        assert!(temp_dir.path().join("laravel.log").exists());
        assert!(temp_dir.path().join("notes").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_mutations_are_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(
            temp_dir.path().join("open.log"),
            "[2024-01-01 00:00:00] local.INFO: open\n",
        )
        .unwrap();
        fs::write(
            locked.join("locked.log"),
            "[2024-01-01 00:00:01] local.INFO: locked\n",
        )
        .unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits are not enforced for privileged users
        if fs::write(locked.join("write-check"), "").is_ok() {
            fs::remove_file(locked.join("write-check")).unwrap();
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let config = ReaderConfig {
            path: temp_dir.path().to_path_buf(),
            filename: Some("{open.log,locked/locked.log}".to_string()),
            ..ReaderConfig::default()
        };
        let reader = LogReader::new(Arc::new(MemoryCache::new()), &config);
        assert_eq!(reader.count().unwrap(), 2);

        assert_eq!(reader.delete().unwrap(), 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("open.log")).unwrap(),
            ""
        );
        assert_eq!(
            fs::read_to_string(locked.join("locked.log")).unwrap(),
            "[2024-01-01 00:00:01] local.INFO: locked\n"
        );

        assert_eq!(reader.remove_log_file().unwrap(), 1);
        assert!(!temp_dir.path().join("open.log").exists());
        assert!(locked.join("locked.log").exists());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }
}
