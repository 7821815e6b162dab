//! Google Maps Geolocation API client.
//!
//! Grounded in the original Python server's `GoogleMaps_geolocation_service`
//! wrapper (`examples/original_source/gps_tcp_server.py`), reimplemented as a
//! direct `reqwest` POST against the HTTP API instead of the `googlemaps`
//! client library, since the latter has no Rust equivalent in the pack.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use topin_core::{Carrier, GeoFix, GeolocationError, Geolocator, RollingEvidence};

const GEOLOCATE_ENDPOINT: &str = "https://www.googleapis.com/geolocation/v1/geolocate";

#[derive(Debug, Serialize)]
struct GeolocateRequest {
    #[serde(rename = "considerIp")]
    consider_ip: bool,
    #[serde(rename = "cellTowers", skip_serializing_if = "Vec::is_empty")]
    cell_towers: Vec<CellTower>,
    #[serde(rename = "wifiAccessPoints", skip_serializing_if = "Vec::is_empty")]
    wifi_access_points: Vec<WifiAccessPoint>,
}

#[derive(Debug, Serialize)]
struct CellTower {
    #[serde(rename = "cellId")]
    cell_id: u16,
    #[serde(rename = "locationAreaCode")]
    location_area_code: u16,
    #[serde(rename = "mobileCountryCode")]
    mobile_country_code: u16,
    #[serde(rename = "mobileNetworkCode")]
    mobile_network_code: u8,
    #[serde(rename = "signalStrength")]
    signal_strength: i16,
}

#[derive(Debug, Serialize)]
struct WifiAccessPoint {
    #[serde(rename = "macAddress")]
    mac_address: String,
    #[serde(rename = "signalStrength")]
    signal_strength: i16,
}

#[derive(Debug, Deserialize)]
struct GeolocateResponse {
    #[serde(default)]
    location: Option<GeoLocation>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    error: Option<GeolocateApiError>,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GeolocateApiError {
    #[serde(default)]
    message: String,
}

/// Resolves Wi-Fi/GSM evidence against the Google Maps Geolocation HTTP API.
pub struct GoogleGeolocationClient {
    http: reqwest::Client,
    api_key: String,
}

impl GoogleGeolocationClient {
    /// Builds a client bound to `api_key`, applying `timeout` to every
    /// request so a hung backend cannot block a connection task forever
    /// (`§4.5`).
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, api_key })
    }
}

#[async_trait]
impl Geolocator for GoogleGeolocationClient {
    async fn locate(&self, carrier: Option<Carrier>, evidence: &RollingEvidence) -> Result<GeoFix, GeolocationError> {
        if evidence.wifi.is_empty() && evidence.gsm_cells.is_empty() {
            return Err(GeolocationError::NoEvidence);
        }

        let cell_towers = match carrier {
            Some(carrier) => evidence
                .gsm_cells
                .iter()
                .map(|cell| CellTower {
                    cell_id: cell.cid,
                    location_area_code: cell.lac,
                    mobile_country_code: carrier.mcc,
                    mobile_network_code: carrier.mnc,
                    signal_strength: cell.rssi,
                })
                .collect(),
            None => Vec::new(),
        };

        let wifi_access_points = evidence
            .wifi
            .iter()
            .map(|ap| WifiAccessPoint { mac_address: format_mac(ap.bssid), signal_strength: ap.rssi })
            .collect();

        let request = GeolocateRequest { consider_ip: false, cell_towers, wifi_access_points };

        let response = self
            .http
            .post(GEOLOCATE_ENDPOINT)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|err| GeolocationError::Backend(err.to_string()))?;

        let body: GeolocateResponse =
            response.error_for_status().map_err(|err| GeolocationError::Backend(err.to_string()))?.json().await.map_err(
                |err| GeolocationError::Backend(err.to_string()),
            )?;

        if let Some(error) = body.error {
            return Err(GeolocationError::Backend(error.message));
        }

        let location = body.location.ok_or(GeolocationError::NotFound)?;
        Ok(GeoFix { lat: location.lat, lng: location.lng, accuracy: body.accuracy.unwrap_or(0.0) })
    }
}

fn format_mac(bssid: [u8; 6]) -> String {
    bssid.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

/// Chooses between the real backend and [`topin_core::NullGeolocator`] at
/// startup, so `Engine<G, L>` can stay generic over a concrete type instead
/// of boxing a trait object.
pub enum ConfiguredGeolocator {
    /// Backed by the Google Maps Geolocation API.
    Google(GoogleGeolocationClient),
    /// No backend configured; every lookup fails with [`GeolocationError::NoEvidence`].
    Null(topin_core::NullGeolocator),
}

#[async_trait]
impl Geolocator for ConfiguredGeolocator {
    async fn locate(&self, carrier: Option<Carrier>, evidence: &RollingEvidence) -> Result<GeoFix, GeolocationError> {
        match self {
            Self::Google(client) => client.locate(carrier, evidence).await,
            Self::Null(client) => client.locate(carrier, evidence).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_mac_address_lowercase_colon_separated() {
        assert_eq!(format_mac([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]), "aa:bb:cc:dd:ee:ff");
    }
}
