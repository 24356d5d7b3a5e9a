use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowtrack::{mcp, Config, Database};
use flowtrack_core::{SessionTracker, WorkflowError};

#[derive(Parser)]
#[command(name = "flowtrack")]
#[command(about = "Workflow state and session compliance tracking for AI-assisted development")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server via stdio
    Mcp,
    /// Create the database and apply the schema
    Init,
    /// Print the compliance report of a session
    Session {
        /// Session ID
        id: String,
    },
    /// List sessions
    Sessions {
        /// Include completed and abandoned sessions
        #[arg(short, long)]
        all: bool,
    },
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = match &config.database_path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "flowtrack=info,flowtrack_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Mcp) | None => {
            let db = open_database(&config)?;
            mcp::run_stdio_server(db, &config).await?;
        }
        Some(Commands::Init) => {
            open_database(&config)?;
            println!("Database ready");
        }
        Some(Commands::Session { id }) => {
            let db = open_database(&config)?;
            let tracker = SessionTracker::new(db, config.tracker.clone());
            match tracker.session_report(&id) {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e @ WorkflowError::InvalidOrInactiveSession { .. }) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some(Commands::Sessions { all }) => {
            let db = open_database(&config)?;
            for session in db.list_sessions(!all)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    session.id,
                    session.status,
                    session.compliance_score,
                    session.start_time.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
