use async_trait::async_trait;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{
    error::ProviderError,
    http::{HttpClient, HttpRequest},
    model::{Confidence, Coordinate, GeocodeRequest, GeocodeResult},
};

use super::{Adapter, ProviderId};

const GEOCODE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";

#[derive(Debug, Deserialize)]
struct OcGeometry {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OcComponents {
    city: Option<String>,
    town: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcResult {
    formatted: String,
    geometry: OcGeometry,
    #[serde(default)]
    components: OcComponents,
    #[serde(default)]
    confidence: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OcStatus {
    code: u16,
    message: String,
}

#[derive(Debug, Deserialize)]
struct OcResponse {
    #[serde(default)]
    results: Vec<OcResult>,
    status: Option<OcStatus>,
}

/// OpenCage geocoder. Reverse lookups use the same endpoint with `q="lat,lng"`.
#[derive(Debug, Clone)]
pub struct OpenCage {
    api_key: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl OpenCage {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String, timeout: Duration) -> Self {
        Self { api_key, http, timeout }
    }

    fn build_request(&self, request: &GeocodeRequest) -> HttpRequest {
        let req = HttpRequest::get(GEOCODE_URL, self.timeout)
            .query("key", &self.api_key)
            .query("limit", 1)
            .query("no_annotations", 1);

        match request {
            GeocodeRequest::Forward { query, country_hint } => {
                let req = req.query("q", query);
                match country_hint {
                    Some(cc) => req.query("countrycode", cc.to_lowercase()),
                    None => req,
                }
            }
            GeocodeRequest::Reverse(c) => req.query("q", format!("{},{}", c.latitude, c.longitude)),
        }
    }
}

#[async_trait]
impl Adapter<GeocodeRequest, GeocodeResult> for OpenCage {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenCage
    }

    async fn resolve(&self, request: &GeocodeRequest) -> Result<GeocodeResult, ProviderError> {
        let res = self
            .http
            .send(self.build_request(request))
            .await
            .and_then(|res| res.error_for_status("OpenCage"))
            .inspect_err(|e| warn!(provider = "opencage", %e, "OpenCage request failed"))?;

        let parsed: OcResponse = serde_json::from_str(&res.body).map_err(|e| {
            warn!(provider = "opencage", %e, "Failed to parse OpenCage JSON");
            ProviderError::MalformedResponse(format!("OpenCage: {e}"))
        })?;

        if let Some(status) = &parsed.status {
            if status.code != 200 {
                let detail = format!("OpenCage status {}: {}", status.code, status.message);
                warn!(provider = "opencage", %detail, "OpenCage reported an error");
                return Err(match status.code {
                    401 | 403 => ProviderError::Unauthorized(detail),
                    402 | 429 | 503 => ProviderError::Unreachable(detail),
                    _ => ProviderError::MalformedResponse(detail),
                });
            }
        }

        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound("OpenCage returned no results".into()))?;

        let components = result.components;

        Ok(GeocodeResult {
            coordinate: Coordinate::new(result.geometry.lat, result.geometry.lng),
            formatted_address: result.formatted,
            city: components.city.or(components.town).unwrap_or_default(),
            country: components.country.unwrap_or_default(),
            country_code: components.country_code.unwrap_or_default().to_uppercase(),
            confidence: Confidence::Score(result.confidence.unwrap_or(0).min(10)),
            provider_tag: ProviderId::OpenCage.to_string(),
            is_simulated: false,
        })
    }
}
