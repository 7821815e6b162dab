//! TCP server for the TOPIN GPS tracker protocol.
//!
//! Wraps [`topin_core::Engine`] with a plain TCP accept loop: no transport
//! security, no CLI surface (`§6`), configuration from the environment only.
//! One task per connection, shut down by a `tokio::sync::broadcast` signal
//! fanned out from `Ctrl-C` — the same accept-loop shape this crate's
//! connection handling was adapted from, minus the per-stream fan-out a
//! multiplexed transport needs.
//!
//! # Components
//!
//! - [`Config`]: environment-driven settings, no CLI flags
//! - [`Server`]: the bound listener plus the shared engine
//! - [`GoogleGeolocationClient`] / [`ConfiguredGeolocator`]: geolocation backends
//! - [`FileLogSink`]: append-only TSV audit logging

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod connection;
pub mod error;
pub mod geolocation;
pub mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use topin_core::{Engine, Geolocator, LogSink};

pub use config::Config;
pub use error::ServerError;
pub use geolocation::{ConfiguredGeolocator, GoogleGeolocationClient};
pub use logging::FileLogSink;

/// Shutdown broadcast only ever carries one message; a buffer of `1` is
/// enough for every subscriber to observe it exactly once.
const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

/// A bound TCP listener paired with the shared protocol engine.
pub struct Server<G, L> {
    listener: TcpListener,
    engine: Arc<Engine<G, L>>,
    shutdown: broadcast::Sender<()>,
}

impl<G, L> Server<G, L>
where
    G: Geolocator + 'static,
    L: LogSink + 'static,
{
    /// Binds the listening socket. `engine` is shared (via `Arc`) across
    /// every connection task spawned by [`Self::run`].
    pub async fn bind(bind_addr: SocketAddr, engine: Engine<G, L>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(bind_addr).await?;
        let (shutdown, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        Ok(Self { listener, engine: Arc::new(engine), shutdown })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections, spawning one task per connection, until
    /// `Ctrl-C` is received. Per `§5`, no graceful drain of the inbound
    /// queue is required: shutdown closes the accept socket and signals
    /// every connection task, each of which finishes any in-flight write
    /// before releasing its socket.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(addr = %self.local_addr()?, "server listening");

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received, closing accept socket");
                    let _ = self.shutdown.send(());
                    return Ok(());
                },
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "accepted connection");
                            let engine = Arc::clone(&self.engine);
                            let shutdown = self.shutdown.subscribe();
                            tokio::spawn(async move {
                                connection::handle_connection(stream, peer_addr, engine, shutdown).await;
                            });
                        },
                        Err(err) => {
                            tracing::error!(error = %err, "accept error");
                        },
                    }
                },
            }
        }
    }
}
