//! EventGrep CLI
//!
//! Query an event-message log from the command line. Results are printed as
//! JSON on stdout; logs go to stderr.

mod config;
mod import;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use eventgrep_core::{ChartRequest, Dimension, QueryEngine, RawParams};
use eventgrep_store_sqlite::SqliteMessageStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;
use crate::import::{ImportOptions, import_file};

#[derive(Parser)]
#[command(name = "eventgrep")]
#[command(about = "EventGrep - search an append-only event message log", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "EVENTGREP_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search messages and print one page
    Raw(QueryArgs),
    /// Look up one message by identifier
    Id {
        /// Message identifier
        id: String,
    },
    /// Count all stored messages
    Count,
    /// Bucket matching messages into time intervals
    Chart {
        #[command(flatten)]
        query: QueryArgs,

        /// Bucket width in seconds
        #[arg(long)]
        interval: Option<i64>,

        /// Number of equal buckets when no width is given
        #[arg(long)]
        intervals: Option<u32>,

        /// One series per include value of this dimension
        #[arg(long)]
        split_on: Option<String>,
    },
    /// Append messages from a JSONL file
    Import {
        /// JSONL file with one message per line
        file: PathBuf,

        /// Messages appended per transaction
        #[arg(long, default_value_t = 500)]
        batch_size: usize,

        /// Skip messages that already exist in the database
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        skip_existing: bool,

        /// Continue importing past lines that fail to parse
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        continue_on_error: bool,
    },
}

/// Search parameters, passed through as text and validated by the resolver
#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Window start: epoch seconds or ISO-8601
    #[arg(long)]
    start: Option<String>,
    /// Window end: epoch seconds or ISO-8601
    #[arg(long)]
    end: Option<String>,
    /// Window length in seconds
    #[arg(long, allow_hyphen_values = true)]
    delta: Option<String>,
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    rows_per_page: Option<String>,
    /// asc or desc
    #[arg(long)]
    order: Option<String>,

    #[arg(long)]
    user: Vec<String>,
    #[arg(long)]
    package: Vec<String>,
    #[arg(long)]
    category: Vec<String>,
    #[arg(long)]
    topic: Vec<String>,
    #[arg(long)]
    not_user: Vec<String>,
    #[arg(long)]
    not_package: Vec<String>,
    #[arg(long)]
    not_category: Vec<String>,
    #[arg(long)]
    not_topic: Vec<String>,

    /// Case-insensitive substring; repeat for alternatives
    #[arg(long)]
    contains: Vec<String>,
}

impl From<QueryArgs> for RawParams {
    fn from(args: QueryArgs) -> Self {
        RawParams {
            start: args.start,
            end: args.end,
            delta: args.delta,
            page: args.page,
            rows_per_page: args.rows_per_page,
            order: args.order,
            user: args.user,
            package: args.package,
            category: args.category,
            topic: args.topic,
            not_user: args.not_user,
            not_package: args.not_package,
            not_category: args.not_category,
            not_topic: args.not_topic,
            contains: args.contains,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.merge_env();

    if let Some(database) = &cli.database {
        config.database.path = database.to_string_lossy().to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config)?;

    let db_path = config.database_path();
    debug!(path = %db_path, "Opening message store");
    let store = Arc::new(
        SqliteMessageStore::new(&db_path)
            .await
            .with_context(|| format!("Failed to open message store at {}", db_path))?,
    );

    let engine = QueryEngine::new(store.clone(), config.query.clone())?;
    let now = chrono::Utc::now();

    match cli.command {
        Commands::Raw(args) => {
            let result = engine.search(&RawParams::from(args), now).await?;
            print_json(&result, cli.pretty)?;
        }
        Commands::Id { id } => {
            let message = engine.get_message(&id).await?;
            print_json(&message, cli.pretty)?;
        }
        Commands::Count => {
            let total = engine.message_count().await?;
            print_json(&serde_json::json!({ "total": total }), cli.pretty)?;
        }
        Commands::Chart {
            query,
            interval,
            intervals,
            split_on,
        } => {
            let split_on = split_on
                .as_deref()
                .map(str::parse::<Dimension>)
                .transpose()?;
            let request = ChartRequest {
                interval,
                intervals,
                split_on,
            };
            let query = engine.resolve(&RawParams::from(query), now)?;
            let chart = engine.aggregate(&query, &request).await?;
            print_json(&chart, cli.pretty)?;
        }
        Commands::Import {
            file,
            batch_size,
            skip_existing,
            continue_on_error,
        } => {
            let file = PathBuf::from(shellexpand::tilde(&file.to_string_lossy()).to_string());
            let options = ImportOptions {
                batch_size,
                skip_existing,
                continue_on_error,
            };
            info!(file = %file.display(), "Importing messages");
            let summary = import_file(&store, &file, &options).await?;
            print_json(&summary, cli.pretty)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // Keep sqlx statement logs at WARN unless explicitly requested
    if !config.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Warning: Failed to set sqlx log filter: {}", e),
        }
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
