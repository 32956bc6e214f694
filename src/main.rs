use clap::{Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

mod api;
mod config;
mod error;
mod fetcher;
mod models;
mod normalize;
mod report;

#[derive(Parser, Debug)]
#[command(name = "eth-tx-explorer", version)]
struct Cli {
    /// Alchemy API key (put it in .env rather than shell history)
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Alchemy network slug, e.g. eth-mainnet or eth-sepolia
    #[arg(long, env = "NETWORK", default_value = config::DEFAULT_NETWORK)]
    network: String,

    /// HTTP bind address for the web UI
    #[arg(long, env = "HTTP_BIND", default_value = "127.0.0.1:8080")]
    http_bind: String,

    /// Upper bound on transfer pages fetched per query
    #[arg(long, env = "MAX_PAGES", default_value_t = config::DEFAULT_MAX_PAGES)]
    max_pages: u32,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web UI (default)
    Serve,
    /// Fetch one address and print the full report as JSON
    History { address: String },
    /// Fetch one address and write its transfer table as CSV
    Export {
        address: String,
        /// Output file path
        #[arg(long, default_value = "transfers.csv")]
        out: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    Subscriber::builder().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = config::AppConfig::new(cli.api_key, cli.network, cli.max_pages)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => api::serve(config, &cli.http_bind).await?,
        Commands::History { address } => {
            let client = fetcher::AlchemyClient::new(config)?;
            let report = fetcher::query_history(&client, &address).await?;
            if report.transfer_count == 0 {
                tracing::info!("No transfers found for this address");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Export { address, out } => {
            let client = fetcher::AlchemyClient::new(config)?;
            let report = fetcher::query_history(&client, &address).await?;
            std::fs::write(&out, report::to_csv(&report.rows))?;
            tracing::info!(rows = report.transfer_count, path = %out, "CSV written");
        }
    }

    Ok(())
}
