use anyhow::Result;
use blockdrop::collab::hash_password;
use blockdrop::common::config::{apply_overrides, load_config, ConfigOverrides};
use blockdrop::common::config_commands;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockdrop")]
#[command(about = "Session-based chunked file transfer server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transfer server
    Serve {
        #[arg(long, help = "Port to listen on")]
        port: Option<u16>,

        #[arg(long, help = "Address to bind, e.g. 0.0.0.0")]
        bind: Option<String>,

        #[arg(long, help = "Directory holding uploaded files")]
        storage: Option<PathBuf>,

        #[arg(long, help = "Deterministic tokens, no session expiry")]
        test_mode: bool,
    },

    /// Print the SHA-256 digest to put in a `users` entry
    HashPassword { password: String },

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
    /// Print built-in defaults
    Defaults,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blockdrop=info,audit=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            storage,
            test_mode,
        } => {
            init_tracing();
            let overrides = ConfigOverrides {
                bind,
                port,
                storage_root: storage,
                test_mode,
            };
            let config = apply_overrides(load_config()?, &overrides);
            blockdrop::server::serve(config).await
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password));
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => config_commands::run_config_path(),
            ConfigAction::Show => config_commands::run_config_show(),
            ConfigAction::Defaults => config_commands::run_config_defaults(),
            ConfigAction::Init { force } => config_commands::run_config_init(force).map(|_| ()),
        },
    }
}
