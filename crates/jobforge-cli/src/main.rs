use anyhow::Result;
use clap::Parser;
use jobforge_core::Config;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "jobforge",
    about = "Jobforge - an in-process job queue service over HTTP",
    version
)]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, help = "Bind address (overrides config)")]
        host: Option<String>,

        #[arg(short, long, help = "Bind port (overrides config)")]
        port: Option<u16>,

        #[arg(long, help = "Maximum concurrent workers (overrides config)")]
        max_workers: Option<usize>,
    },

    /// Probe a running server's health endpoint
    Health {
        #[arg(long, default_value = "http://127.0.0.1:4000", help = "Server base URL")]
        url: String,
    },

    /// Show or validate configuration
    Config {
        #[arg(short, long, help = "Show full configuration")]
        show: bool,

        #[arg(long, help = "Validate configuration")]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting jobforge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::load(path)?
        }
        None => Config::from_env()?,
    };

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            max_workers,
        }) => {
            run_server(config, host, port, max_workers).await?;
        }

        Some(Commands::Health { url }) => {
            run_health_check(&url).await?;
        }

        Some(Commands::Config { show, validate }) => {
            run_config_command(config, show, validate)?;
        }

        None => {
            info!("No command specified, starting server...");
            run_server(config, None, None, None).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let log_directive = if verbose {
        "jobforge=debug,jobforge_core=debug,jobforge_api=debug,tower_http=debug"
    } else {
        "jobforge=info,jobforge_core=info,jobforge_api=info,tower_http=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_directive.into()),
        )
        .with_target(false)
        .init();
}

async fn run_server(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    max_workers: Option<usize>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(max_workers) = max_workers {
        config.worker.max_workers = max_workers;
    }
    config.validate()?;

    info!(
        "Starting server on {}:{}",
        config.server.host, config.server.port
    );
    jobforge_api::server::run(config).await?;

    Ok(())
}

async fn run_health_check(url: &str) -> Result<()> {
    info!("Checking {}/health", url);

    let response = reqwest::Client::new()
        .get(format!("{}/health", url))
        .send()
        .await?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if status.is_success() {
        info!("Server is healthy");
    } else {
        error!("Health check failed with status {}", status);
        std::process::exit(1);
    }

    Ok(())
}

fn run_config_command(config: Config, show: bool, validate: bool) -> Result<()> {
    if validate {
        info!("Validating configuration...");
        config.validate()?;
        info!("Configuration is valid");
    }

    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}
