//! Google Maps Platform: Directions API (routing) and Geocoding API.
//!
//! Both APIs answer HTTP 200 even for logical failures and report the outcome
//! in a top-level `status` string, mapped by [`status_error`].

use async_trait::async_trait;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{
    error::ProviderError,
    geometry::decode_polyline,
    http::{HttpClient, HttpRequest},
    model::{
        Confidence, Coordinate, GeocodeRequest, GeocodeResult, RouteRequest, RouteResult,
        TravelMode, TurnStep,
    },
};

use super::{Adapter, ProviderId};

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct GValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct GPolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct GStep {
    #[serde(default)]
    html_instructions: String,
    distance: GValue,
    duration: GValue,
}

#[derive(Debug, Deserialize)]
struct GLeg {
    distance: GValue,
    duration: GValue,
    duration_in_traffic: Option<GValue>,
    #[serde(default)]
    start_address: String,
    #[serde(default)]
    end_address: String,
    #[serde(default)]
    steps: Vec<GStep>,
}

#[derive(Debug, Deserialize)]
struct GRoute {
    legs: Vec<GLeg>,
    overview_polyline: GPolyline,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GDirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<GRoute>,
}

#[derive(Debug, Deserialize)]
struct GLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GGeometry {
    location: GLatLng,
}

#[derive(Debug, Deserialize)]
struct GAddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GGeocodeCandidate {
    formatted_address: String,
    geometry: GGeometry,
    #[serde(default)]
    address_components: Vec<GAddressComponent>,
}

#[derive(Debug, Deserialize)]
struct GGeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GGeocodeCandidate>,
}

/// Map a non-`OK` Google status onto the error taxonomy.
fn status_error(api: &str, status: &str, message: Option<&str>) -> ProviderError {
    let detail = match message {
        Some(msg) => format!("{api} status {status}: {msg}"),
        None => format!("{api} status {status}"),
    };

    match status {
        "ZERO_RESULTS" | "NOT_FOUND" => ProviderError::NotFound(detail),
        "REQUEST_DENIED" => ProviderError::Unauthorized(detail),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" | "UNKNOWN_ERROR" => {
            ProviderError::Unreachable(detail)
        }
        _ => ProviderError::MalformedResponse(detail),
    }
}

async fn fetch_json<T: for<'de> Deserialize<'de>>(
    http: &dyn HttpClient,
    api: &str,
    request: HttpRequest,
) -> Result<T, ProviderError> {
    let res = http
        .send(request)
        .await
        .and_then(|res| res.error_for_status(api))
        .inspect_err(|e| warn!(provider = "google", %e, "{api} request failed"))?;

    serde_json::from_str(&res.body).map_err(|e| {
        warn!(provider = "google", %e, "Failed to parse {api} JSON");
        ProviderError::MalformedResponse(format!("{api}: {e}"))
    })
}

/// Drop HTML markup from Google's step instructions.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Block-level tags separate sentences.
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lat_lng(c: Coordinate) -> String {
    format!("{},{}", c.latitude, c.longitude)
}

/// Google Directions API routing adapter.
#[derive(Debug, Clone)]
pub struct GoogleDirections {
    api_key: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl GoogleDirections {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String, timeout: Duration) -> Self {
        Self { api_key, http, timeout }
    }

    fn build_request(&self, request: &RouteRequest) -> HttpRequest {
        let mut req = HttpRequest::get(DIRECTIONS_URL, self.timeout)
            .query("origin", lat_lng(request.origin))
            .query("destination", lat_lng(request.destination))
            .query("mode", request.mode.as_str())
            .query("alternatives", "true")
            .query("key", &self.api_key);

        if request.mode == TravelMode::Driving {
            req = req.query("departure_time", "now").query("traffic_model", "best_guess");
        }
        req
    }
}

#[async_trait]
impl Adapter<RouteRequest, RouteResult> for GoogleDirections {
    fn provider(&self) -> ProviderId {
        ProviderId::GoogleMaps
    }

    async fn resolve(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError> {
        let parsed: GDirectionsResponse =
            fetch_json(self.http.as_ref(), "Google Directions", self.build_request(request)).await?;

        if parsed.status != "OK" {
            let err = status_error("Google Directions", &parsed.status, parsed.error_message.as_deref());
            warn!(provider = "google", %err, "Google Directions returned no route");
            return Err(err);
        }

        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound("Google Directions returned no routes".into()))?;
        let leg = route
            .legs
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("Google route has no legs".into()))?;

        let path = decode_polyline(&route.overview_polyline.points)
            .map_err(ProviderError::from)
            .and_then(|path| match path.len() {
                0 | 1 => Err(ProviderError::MalformedResponse(format!(
                    "Google Directions polyline has {} point(s)",
                    path.len()
                ))),
                _ => Ok(path),
            })
            .inspect_err(|e| warn!(provider = "google", %e, "Google Directions polyline is malformed"))?;

        // Traffic time below free-flow time is reported as free-flow.
        let duration_min = leg.duration.value / 60.0;
        let traffic_min = leg
            .duration_in_traffic
            .map_or(duration_min, |d| d.value / 60.0)
            .max(duration_min);

        Ok(RouteResult {
            distance_km: leg.distance.value / 1000.0,
            duration_min,
            duration_in_traffic_min: Some(traffic_min),
            start_label: leg.start_address,
            end_label: leg.end_address,
            path,
            turn_steps: leg
                .steps
                .into_iter()
                .map(|step| TurnStep {
                    instruction: strip_html(&step.html_instructions),
                    distance_km: step.distance.value / 1000.0,
                    duration_min: step.duration.value / 60.0,
                })
                .collect(),
            warnings: route.warnings,
            provider_tag: ProviderId::GoogleMaps.to_string(),
            is_simulated: false,
            route_name: None,
        })
    }
}

/// Google Geocoding API adapter (forward and reverse).
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    api_key: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl GoogleGeocoder {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String, timeout: Duration) -> Self {
        Self { api_key, http, timeout }
    }

    fn build_request(&self, request: &GeocodeRequest) -> HttpRequest {
        let req = HttpRequest::get(GEOCODE_URL, self.timeout);

        let req = match request {
            GeocodeRequest::Forward { query, country_hint } => {
                let req = req.query("address", query);
                match country_hint {
                    Some(cc) => req.query("components", format!("country:{cc}")),
                    None => req,
                }
            }
            GeocodeRequest::Reverse(coord) => req.query("latlng", lat_lng(*coord)),
        };

        req.query("key", &self.api_key)
    }
}

fn component<'a>(components: &'a [GAddressComponent], kind: &str) -> Option<&'a GAddressComponent> {
    components.iter().find(|c| c.types.iter().any(|t| t == kind))
}

#[async_trait]
impl Adapter<GeocodeRequest, GeocodeResult> for GoogleGeocoder {
    fn provider(&self) -> ProviderId {
        ProviderId::GoogleGeocoding
    }

    async fn resolve(&self, request: &GeocodeRequest) -> Result<GeocodeResult, ProviderError> {
        let parsed: GGeocodeResponse =
            fetch_json(self.http.as_ref(), "Google Geocoding", self.build_request(request)).await?;

        if parsed.status != "OK" {
            let err = status_error("Google Geocoding", &parsed.status, parsed.error_message.as_deref());
            warn!(provider = "google-geocoding", %err, "Google Geocoding returned no result");
            return Err(err);
        }

        let candidate = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound("Google Geocoding returned no results".into()))?;

        let components = &candidate.address_components;
        let country = component(components, "country");

        Ok(GeocodeResult {
            coordinate: Coordinate::new(
                candidate.geometry.location.lat,
                candidate.geometry.location.lng,
            ),
            formatted_address: candidate.formatted_address,
            city: component(components, "locality").map(|c| c.long_name.clone()).unwrap_or_default(),
            country: country.map(|c| c.long_name.clone()).unwrap_or_default(),
            country_code: country.map(|c| c.short_name.to_uppercase()).unwrap_or_default(),
            confidence: Confidence::High,
            provider_tag: ProviderId::GoogleGeocoding.to_string(),
            is_simulated: false,
        })
    }
}
