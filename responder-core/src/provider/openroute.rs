//! OpenRouteService directions (`/v2/directions/{profile}/geojson`).
//!
//! ORS speaks GeoJSON, so coordinates go out and come back as `[lon, lat]`.
//! The swap happens here and nowhere else.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{
    error::ProviderError,
    http::{HttpClient, HttpRequest},
    model::{Coordinate, RouteRequest, RouteResult, TravelMode, TurnStep},
};

use super::{Adapter, ProviderId};

const BASE_URL: &str = "https://api.openrouteservice.org/v2/directions";

fn profile(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "driving-car",
        TravelMode::Walking => "foot-walking",
        TravelMode::Bicycling => "cycling-regular",
    }
}

fn lon_lat(c: Coordinate) -> [f64; 2] {
    [c.longitude, c.latitude]
}

#[derive(Debug, Deserialize)]
struct OrsStep {
    #[serde(default)]
    instruction: Option<String>,
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OrsSegment {
    #[serde(default)]
    steps: Vec<OrsStep>,
}

#[derive(Debug, Default, Deserialize)]
struct OrsSummary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OrsProperties {
    #[serde(default)]
    summary: OrsSummary,
    #[serde(default)]
    segments: Vec<OrsSegment>,
    #[serde(default)]
    warnings: Vec<OrsWarning>,
}

#[derive(Debug, Deserialize)]
struct OrsWarning {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OrsGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OrsFeature {
    geometry: OrsGeometry,
    properties: OrsProperties,
}

#[derive(Debug, Deserialize)]
struct OrsResponse {
    #[serde(default)]
    features: Vec<OrsFeature>,
}

/// OpenRouteService routing adapter.
#[derive(Debug, Clone)]
pub struct OpenRouteService {
    api_key: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl OpenRouteService {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String, timeout: Duration) -> Self {
        Self { api_key, http, timeout }
    }

    fn build_request(&self, request: &RouteRequest) -> HttpRequest {
        let body = json!({
            "coordinates": [lon_lat(request.origin), lon_lat(request.destination)],
            "instructions": true,
            "elevation": false,
        });

        HttpRequest::post_json(
            format!("{BASE_URL}/{}/geojson", profile(request.mode)),
            body,
            self.timeout,
        )
        .header("Authorization", self.api_key.as_str())
    }
}

#[async_trait]
impl Adapter<RouteRequest, RouteResult> for OpenRouteService {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenRouteService
    }

    async fn resolve(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError> {
        let res = self
            .http
            .send(self.build_request(request))
            .await
            .and_then(|res| res.error_for_status("OpenRouteService"))
            .inspect_err(|e| warn!(provider = "openroute", %e, "OpenRouteService request failed"))?;

        let parsed: OrsResponse = serde_json::from_str(&res.body).map_err(|e| {
            warn!(provider = "openroute", %e, "Failed to parse OpenRouteService JSON");
            ProviderError::MalformedResponse(format!("OpenRouteService: {e}"))
        })?;

        let feature = parsed.features.into_iter().next().ok_or_else(|| {
            warn!(provider = "openroute", "OpenRouteService returned no routes");
            ProviderError::NotFound("OpenRouteService returned no routes".into())
        })?;

        let path: Vec<Coordinate> = feature
            .geometry
            .coordinates
            .iter()
            .map(|[lon, lat]| Coordinate::new(*lat, *lon))
            .collect();

        if path.len() < 2 {
            return Err(ProviderError::MalformedResponse(format!(
                "OpenRouteService geometry has {} point(s)",
                path.len()
            )));
        }

        let props = feature.properties;

        Ok(RouteResult {
            distance_km: props.summary.distance / 1000.0,
            duration_min: props.summary.duration / 60.0,
            duration_in_traffic_min: None,
            start_label: request.origin.to_string(),
            end_label: request.destination.to_string(),
            path,
            turn_steps: props
                .segments
                .into_iter()
                .flat_map(|segment| segment.steps)
                .map(|step| TurnStep {
                    instruction: step.instruction.unwrap_or_else(|| "Continue".to_string()),
                    distance_km: step.distance / 1000.0,
                    duration_min: step.duration / 60.0,
                })
                .collect(),
            warnings: props.warnings.into_iter().map(|w| w.message).collect(),
            provider_tag: ProviderId::OpenRouteService.to_string(),
            is_simulated: false,
            route_name: None,
        })
    }
}
