//! Geolocation collaborator: resolves Wi-Fi/GSM evidence to a fix.
//!
//! Modeled as an `async-trait` the engine awaits directly (`§4.5`: "the call
//! is synchronous and blocking from the engine's perspective"). Only
//! invoked for `wifi_positioning` (`0x69`).

use async_trait::async_trait;

use crate::session::{Carrier, RollingEvidence};

/// A resolved position with an accuracy radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Decimal degrees.
    pub lat: f64,
    /// Decimal degrees.
    pub lng: f64,
    /// Estimated accuracy radius, metres.
    pub accuracy: f64,
}

/// Why a geolocation lookup failed. The engine treats every variant the
/// same way (degraded stage-2 reply, `validity=0` log row) but keeps the
/// distinction for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeolocationError {
    /// No evidence to geolocate from.
    #[error("no wifi or gsm evidence to resolve")]
    NoEvidence,
    /// The backend timed out or was unreachable.
    #[error("geolocation backend unavailable: {0}")]
    Backend(String),
    /// The backend responded but could not resolve a position.
    #[error("geolocation backend returned no fix")]
    NotFound,
}

/// Given Wi-Fi + GSM evidence, returns a fix or an error. Implementations
/// must be safe for concurrent use across connection tasks and must bound
/// their own latency — the engine does not apply an additional timeout.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Resolves the evidence accumulated for the current frame.
    async fn locate(
        &self,
        carrier: Option<Carrier>,
        evidence: &RollingEvidence,
    ) -> Result<GeoFix, GeolocationError>;
}

/// Always fails. Used when no geolocation backend is configured, so the
/// server remains startable; every `0x69` degrades to an empty stage-2
/// reply per the documented error tie-break.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeolocator;

#[async_trait]
impl Geolocator for NullGeolocator {
    async fn locate(
        &self,
        _carrier: Option<Carrier>,
        _evidence: &RollingEvidence,
    ) -> Result<GeoFix, GeolocationError> {
        Err(GeolocationError::NoEvidence)
    }
}
