//! Environment-driven configuration.
//!
//! Per the protocol's external-interface contract (`§6`) there is no CLI
//! surface: every setting is an environment variable, optionally supplied
//! through a `.env` file in the working directory via `dotenvy`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ServerError;

/// Default listen address: all interfaces, port `5023`.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5023";
/// Default directory the two append-only TSV logs are written under.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Receive buffer size for a single socket read.
pub const RECEIVE_BUFFER_SIZE: usize = 4096;
/// Bound applied to every blocking suspension point inside a connection task
/// (socket read, socket write, log append): exceeding it is treated as an
/// `IOError` and closes the connection.
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound applied to the geolocation collaborator call.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the TCP listener binds to.
    pub bind_addr: SocketAddr,
    /// Directory `server_log.txt` and `location_log.txt` are created under.
    pub log_dir: PathBuf,
    /// Credential for the Google Maps Geolocation API. Absent means every
    /// `wifi_positioning` lookup degrades to the documented error tie-break.
    pub gmaps_api_key: Option<String>,
}

impl Config {
    /// Loads configuration from the process environment, honouring a local
    /// `.env` file if present. Never fails on a missing optional variable;
    /// only a malformed `TOPIN_BIND_ADDR` is an error.
    pub fn load() -> Result<Self, ServerError> {
        // A missing `.env` is the common case outside local development, so
        // it is not worth more than a debug line.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(err) => tracing::debug!(error = %err, "no .env file loaded"),
        }

        let bind_addr = match std::env::var("TOPIN_BIND_ADDR") {
            Ok(raw) => raw.parse().map_err(|_| ServerError::Config(format!("invalid TOPIN_BIND_ADDR: {raw}")))?,
            Err(_) => {
                // INVARIANT: DEFAULT_BIND_ADDR is a literal constant, not
                // user input; it is a valid `SocketAddr` by construction.
                #[allow(clippy::expect_used)]
                DEFAULT_BIND_ADDR.parse().expect("invariant: default bind address is valid")
            },
        };

        let log_dir = std::env::var("TOPIN_LOG_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));

        let gmaps_api_key = std::env::var("GMAPS_API_KEY").ok().filter(|key| !key.is_empty());

        Ok(Self { bind_addr, log_dir, gmaps_api_key })
    }
}
