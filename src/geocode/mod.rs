//! Place-name geocoding with an append-only cache in front of it.

mod cache;
mod nominatim;

pub use cache::{CacheSnapshot, GeocodeCache, Resolution, Source, normalize_key};
pub use nominatim::{DEFAULT_NOMINATIM_URL, NominatimGeocoder};

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::Coordinates;

#[derive(Error, Debug)]
pub enum GeocodeError {
    /// The service did not answer in time; worth one retry.
    #[error("geocoder timed out")]
    Timeout,

    #[error("geocoder returned status {0}")]
    Http(reqwest::StatusCode),

    #[error("geocoder request failed: {0}")]
    Transport(String),

    #[error("unreadable geocoder response: {0}")]
    Decode(String),
}

impl GeocodeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeError::Timeout)
    }
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else if let Some(status) = e.status() {
            GeocodeError::Http(status)
        } else if e.is_decode() {
            GeocodeError::Decode(e.to_string())
        } else {
            GeocodeError::Transport(e.to_string())
        }
    }
}

impl From<anyhow::Error> for GeocodeError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<reqwest::Error>() {
            Ok(e) => e.into(),
            Err(e) => GeocodeError::Transport(format!("{e:#}")),
        }
    }
}

/// An external place-name lookup service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered but knows no such place.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_transport_failure_is_not_retried() {
        let e: GeocodeError = anyhow::anyhow!("token endpoint refused the key").into();
        assert!(matches!(&e, GeocodeError::Transport(msg) if msg.contains("token endpoint")));
        assert!(!e.is_transient());
    }
}
