//! TOPIN tracker protocol server binary.
//!
//! No CLI flags (`§6`): every setting comes from the environment, optionally
//! via a local `.env` file. See [`topin_server::Config`] for the full list.

use topin_core::{Engine, NullGeolocator};
use topin_server::config::GEOLOCATION_TIMEOUT;
use topin_server::{Config, ConfiguredGeolocator, FileLogSink, GoogleGeolocationClient, Server};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("topin-server starting");

    let config = Config::load()?;

    let geolocator = match config.gmaps_api_key.clone() {
        Some(api_key) => {
            tracing::info!("geolocation backend: google maps geolocation api");
            ConfiguredGeolocator::Google(GoogleGeolocationClient::new(api_key, GEOLOCATION_TIMEOUT)?)
        },
        None => {
            tracing::warn!("no GMAPS_API_KEY configured; wifi/lbs fixes will always fail");
            ConfiguredGeolocator::Null(NullGeolocator)
        },
    };

    let log_sink = FileLogSink::open(&config.log_dir).await?;
    let engine = Engine::new(geolocator, log_sink);

    let server = Server::bind(config.bind_addr, engine).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.run().await?;

    Ok(())
}
