mod application;
mod config;
mod domain;
mod infrastructure;

pub use application::{concierge, deep_link, history};
pub use domain::types;
pub use infrastructure::{maps, model, server};

use clap::Parser;
use concierge::{Concierge, ConciergeConfig};
use config::AppConfig;
use maps::MapsClient;
use model::GeminiClient;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "yorimichi-backend",
    version,
    about = "Drive concierge API bridging a chat frontend, Gemini and Google Maps"
)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Starting yorimichi-backend");
    let cli = Cli::parse();

    let app_config = AppConfig::from_env()?;
    if app_config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; chat endpoints will fail until configured");
    }
    if app_config.maps.api_key.is_none() {
        warn!("MAPS_API_KEY is not set; maps endpoints will fail until configured");
    }

    let provider = Arc::new(GeminiClient::new(&app_config.gemini));
    let maps_client = Arc::new(MapsClient::new(&app_config.maps));
    let concierge = Arc::new(Concierge::new(
        Arc::clone(&provider),
        Arc::clone(&maps_client),
        ConciergeConfig {
            max_history: app_config.gemini.max_history,
            ..ConciergeConfig::default()
        },
    ));

    info!(addr = %cli.addr, "Starting REST server");
    server::serve(concierge, maps_client, cli.addr).await?;
    info!("Server shut down");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
