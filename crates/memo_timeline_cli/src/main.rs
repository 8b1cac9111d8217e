//! Command-line driver for the memo timeline engine.
//!
//! # Responsibility
//! - Run timeline views, exports and memo mutations against a SQLite
//!   collection file.
//! - Keep output deterministic for scripting.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use memo_timeline_core::{
    init_logging, EngineConfig, ExportFormat, FilterSpec, LogLevel, MemoEngine, MemoId,
    SqliteCollectionStore, TimelineView,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "memo-timeline", version, about = "Cross-record memo timeline")]
struct Cli {
    /// SQLite collection file (created when missing)
    #[arg(long, global = true, default_value = "memo_timeline.sqlite3")]
    db: PathBuf,

    /// Engine config JSON; defaults apply when the file does not exist
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off without it
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the timeline grouped by day
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the timeline to a file
    Export {
        #[arg(long, value_enum, default_value = "text")]
        format: CliFormat,

        /// Output file; defaults to `memo_timeline.<txt|html>`
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print one record's memos in stored order
    Show { record_id: i64 },

    /// Append a memo to a record
    Add {
        record_id: i64,
        text: String,

        /// Epoch seconds; defaults to now
        #[arg(long)]
        ts: Option<i64>,
    },

    /// Replace a memo's text
    Edit {
        record_id: i64,
        memo_id: String,
        text: String,
    },

    /// Move a memo to another timestamp
    Retime {
        record_id: i64,
        memo_id: String,
        ts: i64,
    },

    /// Delete a memo
    Delete { record_id: i64, memo_id: String },

    /// Create a record with an empty memo field
    SeedRecord {
        #[arg(long)]
        deck: Option<String>,
        front: String,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// all | today | 7 | 30
    #[arg(long, default_value = "all", conflicts_with_all = ["from", "to"])]
    filter: String,

    /// Custom range start (YYYY-MM-DD), requires --to
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Custom range end (YYYY-MM-DD), requires --from
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Rescan the collection before printing
    #[arg(long)]
    refresh: bool,
}

impl FilterArgs {
    fn spec(&self) -> CliResult<FilterSpec> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Ok(FilterSpec::custom(from, to)?),
            _ => Ok(FilterSpec::parse_keyword(&self.filter)?),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliFormat {
    Text,
    Markup,
}

impl From<CliFormat> for ExportFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Text => ExportFormat::Text,
            CliFormat::Markup => ExportFormat::Markup,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Some(log_dir) = &cli.log_dir {
        let level = match cli.log_level.as_deref() {
            Some(level) => LogLevel::parse(level)?,
            None => LogLevel::build_default(),
        };
        init_logging(level.as_str(), log_dir)?;
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let store = Arc::new(SqliteCollectionStore::open(&cli.db)?);

    if let Commands::SeedRecord { deck, front } = &cli.command {
        let record_id = store.create_record(
            deck.as_deref(),
            &[("Front", front.as_str()), (config.memo_field.as_str(), "")],
        )?;
        println!("{record_id}");
        return Ok(());
    }

    let engine = MemoEngine::new(store, config)?;
    match cli.command {
        Commands::List { filter } => {
            let view = engine.timeline().view_now(filter.spec()?, filter.refresh)?;
            print_view(&view);
        }
        Commands::Export {
            format,
            out,
            filter,
        } => {
            let spec = filter.spec()?;
            let format = ExportFormat::from(format);
            let out = out.unwrap_or_else(|| default_export_path(format));
            let now = chrono::Local::now();
            if filter.refresh {
                engine.timeline().view(spec, &now, true)?;
            }
            let view = engine
                .timeline()
                .export_to_path(spec, &now, format, &out)?;
            println!("exported {} memos to {}", view.entry_count(), out.display());
            report_view_notes(&view);
        }
        Commands::Show { record_id } => {
            for memo in engine.memos().list(record_id)? {
                println!("{}\t{}\t{}", memo.id, memo.timestamp, memo.text);
            }
            let record = engine.memos().resolve_record(record_id)?;
            println!("search: {}", record.search);
        }
        Commands::Add { record_id, text, ts } => {
            let memo = engine.memos().add(record_id, text, ts)?;
            println!("{}", memo.id);
        }
        Commands::Edit {
            record_id,
            memo_id,
            text,
        } => {
            let memo = engine
                .memos()
                .edit(record_id, &MemoId::from(memo_id), text)?;
            println!("{}", memo.id);
        }
        Commands::Retime {
            record_id,
            memo_id,
            ts,
        } => {
            let memo = engine
                .memos()
                .retime(record_id, &MemoId::from(memo_id), ts)?;
            println!("{}\t{}", memo.id, memo.timestamp);
        }
        Commands::Delete { record_id, memo_id } => {
            let memo = engine.memos().delete(record_id, &MemoId::from(memo_id))?;
            println!("deleted {}", memo.id);
        }
        Commands::SeedRecord { .. } => {}
    }
    info!("event=cli_command module=cli status=ok");
    Ok(())
}

fn default_export_path(format: ExportFormat) -> PathBuf {
    PathBuf::from(format!("memo_timeline.{}", format.file_extension()))
}

fn print_view(view: &TimelineView) {
    if view.buckets.is_empty() {
        println!("{}", memo_timeline_core::NO_MEMOS_MARKER);
    }
    for (index, bucket) in view.buckets.iter().enumerate() {
        if index > 0 {
            println!();
        }
        println!("{}", bucket.date.format("%Y-%m-%d"));
        for entry in &bucket.entries {
            let deck = entry
                .context
                .as_ref()
                .and_then(|context| context.deck_name.as_deref())
                .unwrap_or("-");
            println!(
                "  - [{} {} {}] {}",
                entry.record_id, entry.memo.id, deck, entry.memo.text
            );
        }
    }
    report_view_notes(view);
}

fn report_view_notes(view: &TimelineView) {
    if view.truncated {
        eprintln!(
            "showing {} of {} matching memos",
            view.entry_count(),
            view.total_matching
        );
    }
    if view.parse_error_count > 0 {
        eprintln!("{} records have malformed memo logs", view.parse_error_count);
    }
    if view.skipped > 0 {
        eprintln!("{} records could not be read", view.skipped);
    }
    if view.stale {
        eprintln!("timeline may be outdated; pass --refresh to rescan");
    }
}
