//! # hybridq CLI (`hq`)
//!
//! Ask natural-language questions of a relational database and a set of
//! documents from the command line, or serve the same engine over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! hq --config ./config/hq.toml --database sqlite:./company.db <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hq schema` | Print the introspected schema snapshot as JSON |
//! | `hq query "<text>"` | Answer a question; `--docs` indexes files first |
//! | `hq ingest <path>...` | Check that files chunk and embed, report counts |
//! | `hq serve` | Start the HTTP API |
//! | `hq completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! hq --database sqlite:./company.db query "How many employees do we have?"
//! hq --database sqlite:./company.db query "Find resumes mentioning Python" --docs ./resumes
//! hq ingest ./resumes --dry-run
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use hybridq::progress::ProgressMode;
use hybridq::{commands, config, logging, server};

/// hybridq: hybrid natural-language retrieval over a database and documents.
///
/// All commands accept `--config` (TOML) and `--database` (connection
/// string, overriding `[db] url`).
#[derive(Parser)]
#[command(
    name = "hq",
    about = "hybridq: ask questions of a relational database and a document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/hq.toml")]
    config: PathBuf,

    /// Database connection string, e.g. `sqlite:./company.db`.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema snapshot (tables, relationships, synonyms) as JSON.
    Schema,

    /// Answer a natural-language question and print the response as JSON.
    Query {
        /// The question.
        query: String,

        /// Number of document passages to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Files or directories to index before answering.
        #[arg(long, num_args = 1..)]
        docs: Vec<PathBuf>,

        /// Progress output on stderr while indexing `--docs`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Check that documents chunk and embed, then report file and chunk
    /// counts. Nothing is persisted.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only chunk and count; skip embedding.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "hq", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(url) = cli.database {
        cfg.db.url = Some(url);
    }
    logging::init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Schema => commands::run_schema(&cfg).await?,
        Commands::Query {
            query,
            top_k,
            docs,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_query(&cfg, &query, top_k, &docs, mode).await?;
        }
        Commands::Ingest {
            paths,
            dry_run,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_ingest(&cfg, &paths, dry_run, mode).await?;
        }
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
