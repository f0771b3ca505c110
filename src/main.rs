use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use logreader::config::{load_reader_config, parse_level_list};
use logreader::logs::{FileCache, LogEntry, LogReader};

#[derive(Parser)]
#[command(name = "logreader")]
#[command(about = "Read, filter, mark and prune entries of application log files")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: ~/.config/logreader)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory storing the log files
    #[arg(long)]
    log_path: Option<PathBuf>,
    /// Pattern of the log filenames
    #[arg(long)]
    file_name: Option<String>,
    /// Filter by environment (exact match)
    #[arg(long)]
    env: Option<String>,
    /// Filter by level, comma separated
    #[arg(long)]
    level: Option<String>,
    /// Field to order by (id, date, level, environment, file_path)
    #[arg(long)]
    order_by: Option<String>,
    /// Order direction (asc, desc)
    #[arg(long)]
    order_direction: Option<String>,
    /// Include log entries already marked as read
    #[arg(short = 'r', long, global = true)]
    with_read: bool,
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List log entries
    Get {
        /// Page the result
        #[arg(short, long)]
        paginate: bool,
        /// Entries per page
        #[arg(long, default_value = "10")]
        per_page: usize,
        /// Page to display
        #[arg(long)]
        page: Option<usize>,
    },
    /// Show one log entry in detail
    Detail {
        /// Unique ID of the log entry
        id: String,
        /// Display the raw content of the entry
        #[arg(long)]
        raw_content: bool,
    },
    /// Delete one log entry, or every matching entry when no ID is given
    Delete {
        /// Unique ID of the log entry
        id: Option<String>,
    },
    /// Remove the matching log files
    RemoveFile,
    /// List the matching log files
    FileList,
    /// Mark the matching log entries as read
    MarkRead,
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count > 1 {
        many
    } else {
        one
    }
}

fn location_line(location: Option<&str>, line: Option<u32>) -> String {
    let mut text = location.unwrap_or_default().to_string();
    if let Some(line) = line {
        text.push_str(&format!(" (line {})", line));
    }
    text
}

fn print_summary(entry: &LogEntry) {
    println!("----------------------------------------------");
    println!(">>> Entry ID: {}", entry.id);
    println!("[-] In file: {}", entry.file_path.display());
    println!(
        "[-] Date: {}",
        entry.date.map(|d| d.to_string()).unwrap_or_default()
    );
    println!("[-] Environment: {}", entry.environment.as_deref().unwrap_or_default());
    println!("[-] Level: {}\n", entry.level.as_deref().unwrap_or_default());
    println!(">>> Message:");
    println!("{}\n", entry.context.message);
    println!(">>> More information:");
    println!("[-] Exception: {}", entry.context.exception.as_deref().unwrap_or_default());
    println!(
        "[-] Caught in: {}\n",
        location_line(entry.context.location.as_deref(), entry.context.line)
    );
}

fn print_detail(entry: &LogEntry) {
    println!("You are viewing detail of the log entry as follow:\n");
    print_summary(entry);
    println!(">>> Stack trace information:");
    for (index, trace) in entry.stack_traces.iter().enumerate() {
        println!("{}. ---", index + 1);
        println!("Caught at: {}", trace.caught_at);
        println!(
            "Caught in: {}\n",
            location_line(trace.location.as_deref(), trace.line)
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Determine config directory: CLI argument first, then ~/.config/logreader
    let config_dir = cli.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logreader")
    });

    let config = load_reader_config(&config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;
    debug!("Loaded configuration from {}", config_dir.display());

    let cache_path = config
        .cache_file
        .clone()
        .unwrap_or_else(|| config_dir.join("read-state.json"));
    let cache = FileCache::open(&cache_path)
        .with_context(|| format!("Failed to open read state at {}", cache_path.display()))?;

    let mut reader = LogReader::new(Arc::new(cache), &config);
    if let Some(path) = &cli.log_path {
        reader.set_log_path(path);
    }
    if let Some(pattern) = &cli.file_name {
        reader.filename(pattern);
    }
    if let Some(environment) = &cli.env {
        reader.environment(environment);
    }
    if let Some(levels) = &cli.level {
        reader.level(parse_level_list(levels));
    }
    if cli.order_by.is_some() || cli.order_direction.is_some() {
        let field = cli
            .order_by
            .clone()
            .unwrap_or_else(|| config.order_by_field.clone());
        let direction = cli
            .order_direction
            .clone()
            .unwrap_or_else(|| config.order_by_direction.clone());
        reader.order_by(&field, &direction);
    }
    reader.include_read(cli.with_read);

    match cli.command {
        Commands::Get {
            paginate,
            per_page,
            page,
        } => {
            let entries = if paginate {
                let page = reader.paginate(per_page, page)?;
                println!(
                    "You have total {} log {}.",
                    page.total,
                    plural(page.total, "entry", "entries")
                );
                println!(
                    "You are viewing page {}/{} as follow:\n",
                    page.current_page, page.last_page
                );
                page.items
            } else {
                let entries = reader.get()?;
                println!(
                    "You have total {} log {} as follow:\n",
                    entries.len(),
                    plural(entries.len(), "entry", "entries")
                );
                entries
            };

            for entry in &entries {
                print_summary(entry);
            }
        }
        Commands::Detail { id, raw_content } => {
            let Some(entry) = reader.find(&id)? else {
                bail!("Log entry {} not found", id);
            };

            if raw_content {
                println!("You are viewing raw content of the log entry as follow:\n");
                println!("{}", entry.raw_content());
            } else {
                print_detail(&entry);
            }
        }
        Commands::Delete { id: Some(id) } => {
            let Some(entry) = reader.find(&id)? else {
                bail!("Log entry {} not found", id);
            };

            if entry
                .delete()
                .with_context(|| format!("Failed to delete entry from {}", entry.file_path.display()))?
            {
                println!("You deleted one entry successfully");
            } else {
                println!("Log entry {} is no longer in {}", id, entry.file_path.display());
            }
        }
        Commands::Delete { id: None } => {
            let deleted = reader.delete()?;
            println!(
                "You deleted {} {} successfully",
                deleted,
                plural(deleted, "entry", "entries")
            );
        }
        Commands::RemoveFile => {
            let removed = reader.remove_log_file()?;
            println!(
                "You deleted {} log {} successfully.",
                removed,
                plural(removed, "file", "files")
            );
        }
        Commands::FileList => {
            let files = reader.get_log_filename_list(Some(reader.log_filename()))?;
            println!(
                "You have total {} log {}:\n",
                files.len(),
                plural(files.len(), "file", "files")
            );
            for (name, path) in &files {
                println!("{}\t{}", name, path.display());
            }
        }
        Commands::MarkRead => {
            let marked = reader.mark_as_read()?;
            println!(
                "You marked {} {} as read",
                marked,
                plural(marked, "entry", "entries")
            );
        }
    }

    Ok(())
}
