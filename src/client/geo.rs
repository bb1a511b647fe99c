//! Where the user is, for the location every turn carries.
//!
//! A device locator is tried first when one is available. If it is missing,
//! denied or fails, the position is estimated from the public IP address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_IP_ENDPOINT: &str = "https://ipapi.co/json/";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Device,
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub coordinates: Coordinates,
    pub source: LocationSource,
}

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable")]
    Unavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("IP geolocation failed: {0}")]
    Ip(String),
}

/// Platform position source (GPS, OS location service).
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeoError>;
}

#[derive(Deserialize)]
struct IpLookup {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub struct Geolocator {
    http: reqwest::Client,
    ip_endpoint: String,
    device: Option<Arc<dyn DeviceLocator>>,
}

impl Geolocator {
    pub fn new(device: Option<Arc<dyn DeviceLocator>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            ip_endpoint: DEFAULT_IP_ENDPOINT.to_string(),
            device,
        }
    }

    pub fn with_ip_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ip_endpoint = endpoint.into();
        self
    }

    pub async fn locate(&self) -> Result<Location, GeoError> {
        if let Some(device) = &self.device {
            match device.current_position().await {
                Ok(coordinates) => {
                    return Ok(Location {
                        coordinates,
                        source: LocationSource::Device,
                    })
                }
                Err(e) => tracing::info!("Device location failed ({}), using IP lookup", e),
            }
        }

        let coordinates = self.locate_by_ip().await?;
        Ok(Location {
            coordinates,
            source: LocationSource::Ip,
        })
    }

    async fn locate_by_ip(&self) -> Result<Coordinates, GeoError> {
        let response = self
            .http
            .get(&self.ip_endpoint)
            .send()
            .await
            .map_err(|e| GeoError::Ip(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoError::Ip(format!("status {}", response.status())));
        }

        let lookup: IpLookup = response
            .json()
            .await
            .map_err(|e| GeoError::Ip(e.to_string()))?;

        match (lookup.latitude, lookup.longitude) {
            (Some(lat), Some(lng)) => Ok(Coordinates { lat, lng }),
            _ => Err(GeoError::Ip("Invalid IP geolocation data".to_string())),
        }
    }
}
