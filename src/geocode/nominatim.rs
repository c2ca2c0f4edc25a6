use async_trait::async_trait;
use reqwest::{Method, Request, Url};
use serde::Deserialize;
use tracing::debug;

use super::{GeocodeError, Geocoder};
use crate::fetch::HttpClient;
use crate::geo::Coordinates;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// One element of the `/search?format=json` array.
#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Client for a Nominatim-compatible `/search` endpoint.
pub struct NominatimGeocoder<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> NominatimGeocoder<C> {
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &str) -> Result<Url, GeocodeError> {
        let mut url = Url::parse(&format!("{}/search", self.base_url))
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> Geocoder for NominatimGeocoder<C> {
    #[tracing::instrument(skip(self))]
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let req = Request::new(Method::GET, self.search_url(query)?);
        let resp = self.client.execute(req).await?.error_for_status()?;

        let body = resp.text().await?;
        let places: Vec<Place> =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Decode(e.to_string()))?;

        let Some(first) = places.into_iter().next() else {
            debug!("No geocoding result");
            return Ok(None);
        };

        let lat = first.lat.trim().parse::<f64>();
        let lon = first.lon.trim().parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Coordinates::checked(lat, lon)
                .map(Some)
                .ok_or_else(|| GeocodeError::Decode(format!("coordinates out of range: {lat},{lon}"))),
            _ => Err(GeocodeError::Decode(format!(
                "non-numeric coordinates: {},{}",
                first.lat, first.lon
            ))),
        }
    }
}
