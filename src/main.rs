//! classpulse - live lecture feedback
//!
//! Serves the feedback API and live view, and provides client commands for
//! submitting, inspecting and resetting a class's feedback from a terminal.

mod cli;

use clap::{Parser, Subcommand};
use classpulse_core::{config::PulseConfig, error::Result, types::ClassId};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use cli::client::PulseClient;

#[derive(Parser)]
#[command(name = "classpulse")]
#[command(about = "Live lecture feedback", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database path or libsql:// URL (overrides configuration)
    #[arg(long, env = "CLASSPULSE_DB_PATH")]
    db_path: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,
}

/// Connection flags shared by the client commands
#[derive(clap::Args)]
struct ClientArgs {
    /// Server base URL
    #[arg(long, env = "CLASSPULSE_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Email to act as
    #[arg(long, env = "CLASSPULSE_EMAIL")]
    email: String,

    /// Display name to send along with the email
    #[arg(long, env = "CLASSPULSE_NAME")]
    name: Option<String>,
}

impl ClientArgs {
    fn client(&self) -> Result<PulseClient> {
        PulseClient::new(&self.server, self.email.clone(), self.name.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server address (overrides configuration)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Create the database and apply migrations
    Init,

    /// Submit one reaction (fast, slow, confusing or good)
    Submit {
        class_id: String,
        reaction: String,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Show the current tally of a class
    Counts {
        class_id: String,
        /// Print the raw JSON summary
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Delete every response of a class (tutors only)
    Reset {
        class_id: String,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Follow a class's tally live
    Watch {
        class_id: String,
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Suppress tokio broadcast channel "recv error" spam from SSE disconnections
    let filter = EnvFilter::new(format!(
        "classpulse={lvl},classpulse_core={lvl},tower_http=warn,tokio::sync::broadcast=error,tokio_stream=error",
        lvl = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("classpulse v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = PulseConfig::load(cli.config.as_deref())?;
    let db_path = cli::resolve_db_path(cli.db_path, &config);

    match cli.command {
        Commands::Serve { addr } => cli::serve::handle(config, db_path, addr).await,
        Commands::Init => cli::init::handle(db_path, config.storage.live_capacity).await,
        Commands::Submit {
            class_id,
            reaction,
            client,
        } => cli::client::submit(&client.client()?, ClassId::new(class_id), &reaction).await,
        Commands::Counts {
            class_id,
            json,
            client,
        } => cli::client::counts(&client.client()?, ClassId::new(class_id), json).await,
        Commands::Reset { class_id, client } => {
            cli::client::reset(&client.client()?, ClassId::new(class_id)).await
        }
        Commands::Watch { class_id, client } => {
            cli::watch::handle(&client.client()?, ClassId::new(class_id)).await
        }
    }
}
