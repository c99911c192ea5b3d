use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeturn::api::{self, middleware::SecurityConfig};
use timeturn::config::Config;
use timeturn::db::{self, Database};
use timeturn::llm::{HttpLlmClient, LlmProvider, ProviderKind};
use timeturn::parser::{has_task_tree_structure, parse_task_tree, render_task_tree};
use timeturn::{mcp, service::Services};

#[derive(Parser)]
#[command(name = "timeturn")]
#[command(about = "Goal-hearing chat and AI task-tree parsing for TimeTurn")]
struct Cli {
    /// SQLite database path (overrides TIMETURN_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Default LLM provider: gemini, openai, or anthropic
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (overrides TIMETURN_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start MCP server via stdio
    Mcp,
    /// Parse task tree text from a file or stdin and print it normalized
    Parse {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Print the parsed nodes as JSON instead of a glyph tree
        #[arg(long)]
        json: bool,
    },
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "timeturn=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // stdout carries the protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let path = match &config.db_path {
        Some(path) => path.clone(),
        None => db::default_path()?,
    };
    let db = Database::open(path)?;
    db.migrate()?;
    Ok(db)
}

fn build_services(config: &Config) -> anyhow::Result<Services> {
    let db = open_database(config)?;
    let llm: Arc<dyn LlmProvider> = Arc::new(HttpLlmClient::from_env()?);
    Services::from_config(db, llm, config)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let services = build_services(&config)?;
    let writer = services.writer.clone();
    let app = api::create_router_with_security(services, SecurityConfig::from_env());

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("TimeTurn server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    writer.flush();
    tracing::info!("TimeTurn server stopped");
    Ok(())
}

fn parse_command(file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if !has_task_tree_structure(&text) {
        eprintln!("No task tree found (fewer than two Type: markers)");
        return Ok(());
    }

    let nodes = parse_task_tree(&text);
    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else {
        print!("{}", render_task_tree(&nodes));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = matches!(cli.command, Some(Commands::Mcp) | Some(Commands::Parse { .. }));
    init_tracing(use_stderr);

    let mut config = Config::from_env();
    if let Some(path) = cli.db {
        config.db_path = Some(path);
    }
    if let Some(name) = cli.provider.as_deref() {
        config.provider = ProviderKind::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("unknown provider: {}", name))?;
    }

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Mcp) => {
            let services = build_services(&config)?;
            mcp::run_stdio_server(services.tree).await?;
        }
        Some(Commands::Parse { file, json }) => parse_command(file, json)?,
        None => serve(config).await?,
    }

    Ok(())
}
