mod discord;
mod health;
mod twitch;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use pacebot_common::models::platform::Platform;

#[derive(Parser, Debug, Clone)]
#[command(name = "pacebot-bot")]
#[command(author, version, about = "pacebot front-end - twitch or discord chat bot")]
pub struct Args {
    /// Which platform this process serves: "twitch" or "discord"
    #[arg(long)]
    platform: Platform,

    /// Base URL of the central API
    #[arg(long, default_value = "http://localhost:3001")]
    api_url: String,

    /// WebSocket URL of the relay hub
    #[arg(long, default_value = "ws://localhost:3003")]
    relay_url: String,

    /// Address for the /health endpoint
    #[arg(long, default_value = "0.0.0.0:3010")]
    health_addr: String,

    /// Seconds between membership reconciliation passes
    #[arg(long, default_value_t = 60)]
    reconcile_interval_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("pacebot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("pacebot front-end starting: platform={}", args.platform);

    let result = match args.platform {
        Platform::Twitch => twitch::run(args.clone()).await,
        Platform::Discord => discord::run(args.clone()).await,
    };
    if let Err(e) = result {
        error!("front-end error: {e:?}");
    }
    info!("pacebot front-end finished");
    Ok(())
}
