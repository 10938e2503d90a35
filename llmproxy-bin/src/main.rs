use clap::{Parser, Subcommand};
use llmproxy_core::config::Config;
use llmproxy_core::registry::Registry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "OpenAI-compatible reverse proxy for local and hosted chat models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, help = "Path to a JSON or TOML config file")]
        config: Option<String>,
        #[arg(long, help = "Override the configured bind host")]
        host: Option<String>,
        #[arg(long, help = "Override the configured bind port")]
        port: Option<u16>,
    },
    /// Check a running server's /health endpoint
    Health {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print a sample configuration
    Config {
        #[arg(long, help = "Write the sample configuration to this path instead of stdout")]
        output: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut cfg = match config {
                Some(path) => Config::from_path(&path)?,
                None => {
                    tracing::warn!("no --config provided, falling back to the sample configuration");
                    Config::sample()
                }
            };
            if let Some(host) = host {
                cfg.host = host;
            }
            if let Some(port) = port {
                cfg.port = port;
            }
            let registry = Registry::from_config(&cfg)?;
            llmproxy_core::server::run(cfg, registry).await?;
        }
        Commands::Health { host, port } => {
            let url = format!("http://{host}:{port}/health");
            match reqwest::get(&url).await {
                Ok(resp) => {
                    let status = resp.status();
                    let body: serde_json::Value = resp.json().await.unwrap_or_default();
                    if status.is_success() {
                        println!("ok {body}");
                    } else {
                        println!("unreachable: status {status}");
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    println!("unreachable: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { output } => {
            let sample = Config::sample();
            let json = serde_json::to_string_pretty(&sample)?;
            match output {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}
