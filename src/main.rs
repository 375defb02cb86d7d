use clap::{Parser, Subcommand};
use esb_gateway::config::{Config, DEFAULT_CONFIG_PATH};
use esb_gateway::infra::ftp::FtpConnector;
use esb_gateway::ingestion::{EndpointDescriptor, EndpointOverrides, Orchestrator};
use esb_gateway::server::{start_server, GatewayState};
use esb_gateway::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "esb_gateway")]
#[command(about = "SOAP gateway that pulls provincial trade files over FTP")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SOAP HTTP endpoint
    Serve {
        /// Override [server].bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Download from one endpoint using the configured provider defaults
    Fetch {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Remote file; a trailing '/' downloads the whole directory tree
        #[arg(long)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging()?;

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config)?);
    info!(config = %cli.config.display(), "Configuration loaded");

    if let Some(listen) = config.metrics.listen.as_deref() {
        metrics::init(listen)?;
    }

    let connector = Arc::new(FtpConnector::new(
        config.ingest.connect_timeout(),
        config.ingest.io_timeout(),
    ));

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = Arc::new(GatewayState::from_config(config.clone(), connector)?);
            info!(operations = ?state.registry.operations(), "Operations registered");
            start_server(state, &bind, &config.server.route).await?;
        }
        Commands::Fetch {
            host,
            port,
            user,
            password,
            path,
        } => {
            let key = &config.ingest.provider;
            let provider = config
                .provider(key)
                .ok_or_else(|| anyhow::anyhow!("no [[providers]] entry for '{}'", key))?;

            let (base_directory, remote_path) = match path {
                Some(p) if p.ends_with('/') => (Some(p), None),
                other => (None, other),
            };
            let endpoint = EndpointDescriptor::merge(
                provider,
                EndpointOverrides {
                    host,
                    port,
                    user,
                    password,
                    base_directory,
                    remote_path,
                },
            )?;

            let orchestrator = Orchestrator::new(connector);
            let report = orchestrator.ingest(&[endpoint]).await;
            println!("{}", report.message());
            if !report.success() {
                error!("Fetch failed");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
