//! Server-level error types: transport and configuration, layered over
//! [`topin_core::EngineError`].

use thiserror::Error;
use topin_core::EngineError;

/// Errors the server process can raise. Variants other than [`Self::Config`]
/// are scoped to a single connection; the accept loop is crash-only with
/// respect to them (`§7`: "errors are never propagated across connections").
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid or unbindable configuration; fatal to the whole process.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bind or accept failure on the listening socket; fatal to the whole
    /// process.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The protocol engine rejected a frame or raised a fatal decode error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A blocking suspension point (read, write, geolocation call, log
    /// append) exceeded its bound. Treated identically to an `IOError`
    /// per `§7`.
    #[error("timed out waiting on {0}")]
    Timeout(&'static str),
}
