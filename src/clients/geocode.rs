//! Client for the Google Maps Places API.
//!
//! Two calls are used: autocomplete (free text to place predictions) and
//! place details (place id to coordinates). Both are constrained to a single
//! country and bounded by the configured request timeout.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("provider rejected the request: {0}")]
    Api(String),
}

/// One autocomplete prediction.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub description: String,
    pub place_id: String,
}

/// Seam over the geocoding provider so the search service can be exercised
/// against a fake in tests.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn autocomplete(
        &self,
        api_key: &str,
        query: &str,
        country: &str,
        limit: usize,
    ) -> Result<Vec<Prediction>, GeocodeError>;

    /// Coordinates for a place id; `None` when the provider knows the place
    /// but has no geometry for it.
    async fn place_details(
        &self,
        api_key: &str,
        place_id: &str,
    ) -> Result<Option<(f64, f64)>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct AutocompleteResponse {
    status: String,
    #[serde(default)]
    predictions: Vec<PredictionPayload>,
}

#[derive(Debug, Deserialize)]
struct PredictionPayload {
    description: String,
    place_id: String,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<DetailsResult>,
}

#[derive(Debug, Deserialize)]
struct DetailsResult {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Clone)]
pub struct GoogleGeocodeClient {
    client: Client,
    base_url: String,
}

impl GoogleGeocodeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("RideDesk/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for GoogleGeocodeClient {
    async fn autocomplete(
        &self,
        api_key: &str,
        query: &str,
        country: &str,
        limit: usize,
    ) -> Result<Vec<Prediction>, GeocodeError> {
        let url = format!(
            "{}/place/autocomplete/json?input={}&types=geocode&components=country:{}&key={}",
            self.base_url,
            urlencoding::encode(query),
            country,
            urlencoding::encode(api_key),
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let payload: AutocompleteResponse = response.json().await?;

        match payload.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(payload
                .predictions
                .into_iter()
                .take(limit)
                .map(|p| Prediction {
                    description: p.description,
                    place_id: p.place_id,
                })
                .collect()),
            other => Err(GeocodeError::Api(other.to_string())),
        }
    }

    async fn place_details(
        &self,
        api_key: &str,
        place_id: &str,
    ) -> Result<Option<(f64, f64)>, GeocodeError> {
        let url = format!(
            "{}/place/details/json?place_id={}&fields=geometry&key={}",
            self.base_url,
            urlencoding::encode(place_id),
            urlencoding::encode(api_key),
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let payload: DetailsResponse = response.json().await?;

        match payload.status.as_str() {
            "OK" | "ZERO_RESULTS" | "NOT_FOUND" => Ok(payload
                .result
                .and_then(|r| r.geometry)
                .map(|g| (g.location.lat, g.location.lng))),
            other => Err(GeocodeError::Api(other.to_string())),
        }
    }
}
