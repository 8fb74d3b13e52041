use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use pacebot_core::relay::RelayHub;
use pacebot_core::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "pacebot-hub")]
#[command(author, version, about = "pacebot relay hub - websocket broadcast broker")]
struct Args {
    /// Address to bind the websocket listener on
    #[arg(long, default_value = "0.0.0.0:3003")]
    bind: String,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("pacebot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("pacebot relay hub starting on {}", args.bind);

    let listener = TcpListener::bind(&args.bind).await?;
    let hub = RelayHub::new();

    // Ctrl-C flips the shutdown watch; serve() exits on the next tick.
    let hub_for_ctrlc = hub.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
        }
        info!("ctrl-c received; shutting down relay hub");
        hub_for_ctrlc.shutdown();
    });

    if let Err(e) = hub.serve(listener).await {
        error!("relay hub error: {e:?}");
    }
    info!("relay hub stopped");
    Ok(())
}
