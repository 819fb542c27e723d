//! # Concierge CLI (`concierge`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `concierge route "<query>"` | Route a query to at most one link |
//! | `concierge extract --file <path>` | Extract contact details from a transcript |
//! | `concierge calendar "<text>"` | Show which calendar a request maps to |
//! | `concierge schedule --file <path>` | Book an appointment from a transcript |
//! | `concierge tools list` | List the gateway operations |
//! | `concierge tools call <name> --args '<json>'` | Invoke one gateway operation |
//! | `concierge index build` | Embed source documents into index files |
//! | `concierge serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! concierge route "do you resize rings?"
//! concierge schedule --file chat.txt --email jane@example.com
//! concierge index build --input docs.jsonl --output ./indexes
//! concierge serve --config ./config/concierge.toml
//! ```
//!
//! Transcripts are either a JSON array of `{ "role", "text" }` turns or
//! plain text with one user turn per line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concierge::config::{self, Config, LogFormat};
use concierge::embedding::create_provider;
use concierge::gateway::{is_read_only, GatewayClient, GatewayTool};
use concierge::index::build_index;
use concierge::orchestrator::{
    parse_start_time, AppointmentOrchestrator, ContactOverride, ScheduleOptions,
};
use concierge::router::QueryRouter;
use concierge::server::{run_server, AppState};
use concierge::session::parse_transcript;
use concierge_core::calendar::CalendarSelector;
use concierge_core::models::Category;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "./config/concierge.toml";

/// Concierge: link routing and appointment scheduling for a chat assistant.
#[derive(Parser)]
#[command(name = "concierge", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/concierge.toml`. See
    /// `config/concierge.example.toml` for every setting.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a query and print the match as JSON.
    Route {
        query: String,
        /// Restrict semantic lookup to one category.
        #[arg(long)]
        category: Option<Category>,
    },

    /// Extract contact details from a transcript.
    Extract {
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the calendar selected for a piece of text.
    Calendar { text: String },

    /// Book an appointment from a transcript and print the outcome.
    Schedule {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Start time, RFC 3339 (e.g. `2025-03-04T14:00:00-06:00`).
        #[arg(long)]
        start: Option<String>,
    },

    /// Inspect or call scheduling gateway operations.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Start the HTTP API on `server.bind`.
    Serve,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List the supported operations.
    List,
    /// Invoke one operation.
    Call {
        name: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed `{category, url, text}` JSON lines into per-category index files.
    Build {
        #[arg(long)]
        input: PathBuf,
        /// Output directory; defaults to `routing.index_dir`.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .map_err(|e| anyhow::anyhow!("Invalid log level: {}", e))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_transcript(path: &Path) -> Result<Vec<concierge_core::models::ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    parse_transcript(&content)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg)?;

    match cli.command {
        Commands::Route { query, category } => {
            let router = QueryRouter::load(&cfg)?;
            print_json(&router.route_in(&query, category).await)?;
        }
        Commands::Extract { file } => {
            let turns = read_transcript(&file)?;
            let extractor = concierge_core::contact::ContactExtractor::new(
                cfg.scheduling.summary_turns,
                cfg.scheduling.summary_chars,
            );
            print_json(&extractor.extract(&turns))?;
        }
        Commands::Calendar { text } => {
            let kind = CalendarSelector::new()?.select(&text);
            print_json(&serde_json::json!({
                "calendar": kind,
                "calendar_id": cfg.calendars.id_for(kind),
            }))?;
        }
        Commands::Schedule {
            file,
            name,
            email,
            phone,
            start,
        } => {
            let turns = read_transcript(&file)?;
            let options = ScheduleOptions {
                contact: ContactOverride { name, email, phone },
                start: start.as_deref().map(parse_start_time).transpose()?,
            };
            let orchestrator =
                AppointmentOrchestrator::new(GatewayClient::new(&cfg.gateway)?, &cfg)?;
            let outcome = orchestrator.schedule_from_conversation(&turns, &options).await;
            print_json(&outcome)?;
        }
        Commands::Tools { action } => match action {
            ToolsAction::List => {
                for name in GatewayTool::names() {
                    let kind = if is_read_only(name) { "read" } else { "write" };
                    println!("{:<48} {}", name, kind);
                }
            }
            ToolsAction::Call { name, args } => {
                let args: serde_json::Value =
                    serde_json::from_str(&args).context("--args must be a JSON object")?;
                let client = GatewayClient::new(&cfg.gateway)?;
                let result = client.invoke_named(&name, args).await?;
                print_json(&result)?;
            }
        },
        Commands::Index { action } => match action {
            IndexAction::Build {
                input,
                output,
                batch_size,
            } => {
                if !cfg.embedding.is_enabled() {
                    anyhow::bail!("index build requires an embedding provider ([embedding] provider)");
                }
                let output = output
                    .or_else(|| cfg.routing.index_dir.clone())
                    .context("--output not given and routing.index_dir not set")?;
                let embedder = create_provider(&cfg.embedding)?;
                let stats = build_index(
                    embedder.as_ref(),
                    &input,
                    &output,
                    batch_size.unwrap_or(cfg.embedding.batch_size),
                )
                .await?;
                for (category, count) in &stats.per_category {
                    println!("{:<10} {}", category, count);
                }
                println!(
                    "Indexed {} documents ({} dims) into {}",
                    stats.total(),
                    stats.dims,
                    output.display()
                );
            }
        },
        Commands::Serve => {
            let state = AppState::from_config(&cfg)?;
            run_server(&cfg, state).await?;
        }
    }

    Ok(())
}
