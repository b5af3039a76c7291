//! OpenStreetMap Nominatim geocoder.
//!
//! Free and keyless, but the usage policy demands an identifying User-Agent
//! and at most one request per second, which the rate limiter enforces.

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

const BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Default, Deserialize)]
struct NomAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

/// Nominatim returns coordinates as strings.
#[derive(Debug, Deserialize)]
struct NomPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: NomAddress,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NomReverse {
    Error { error: String },
    Place(NomPlace),
}

#[derive(Debug, Clone)]
pub struct Nominatim {
    user_agent: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl Nominatim {
    pub fn new(http: Arc<dyn HttpClient>, user_agent: String, timeout: Duration) -> Self {
        Self { user_agent, http, timeout }
    }

    fn build_request(&self, request: &GeocodeRequest) -> HttpRequest {
        let req = match request {
            GeocodeRequest::Forward { query, country_hint } => {
                let req = HttpRequest::get(format!("{BASE_URL}/search"), self.timeout)
                    .query("q", query)
                    .query("limit", 1);
                match country_hint {
                    Some(cc) => req.query("countrycodes", cc.to_lowercase()),
                    None => req,
                }
            }
            GeocodeRequest::Reverse(c) => {
                HttpRequest::get(format!("{BASE_URL}/reverse"), self.timeout)
                    .query("lat", c.latitude)
                    .query("lon", c.longitude)
            }
        };

        req.query("format", "json")
            .query("addressdetails", 1)
            .header("User-Agent", self.user_agent.as_str())
    }
}

fn parse_degrees(value: &str, field: &str) -> Result<f64, ProviderError> {
    value
        .parse()
        .map_err(|_| ProviderError::MalformedResponse(format!("Nominatim {field} '{value}' is not a number")))
}

fn normalize(place: NomPlace) -> Result<GeocodeResult, ProviderError> {
    let address = place.address;

    Ok(GeocodeResult {
        coordinate: Coordinate::new(
            parse_degrees(&place.lat, "lat")?,
            parse_degrees(&place.lon, "lon")?,
        ),
        formatted_address: place.display_name,
        city: address.city.or(address.town).or(address.village).unwrap_or_default(),
        country: address.country.unwrap_or_default(),
        country_code: address.country_code.unwrap_or_default().to_uppercase(),
        confidence: Confidence::Medium,
        provider_tag: ProviderId::Nominatim.to_string(),
        is_simulated: false,
    })
}

#[async_trait]
impl Adapter<GeocodeRequest, GeocodeResult> for Nominatim {
    fn provider(&self) -> ProviderId {
        ProviderId::Nominatim
    }

    async fn resolve(&self, request: &GeocodeRequest) -> Result<GeocodeResult, ProviderError> {
        let res = self
            .http
            .send(self.build_request(request))
            .await
            .and_then(|res| res.error_for_status("Nominatim"))
            .inspect_err(|e| warn!(provider = "nominatim", %e, "Nominatim request failed"))?;

        let place = match request {
            GeocodeRequest::Forward { query, .. } => serde_json::from_str::<Vec<NomPlace>>(&res.body)
                .map_err(ProviderError::from)
                .and_then(|places| {
                    places.into_iter().next().ok_or_else(|| {
                        ProviderError::NotFound(format!("Nominatim found nothing for '{query}'"))
                    })
                }),
            GeocodeRequest::Reverse(_) => serde_json::from_str::<NomReverse>(&res.body)
                .map_err(ProviderError::from)
                .and_then(|reverse| match reverse {
                    NomReverse::Place(place) => Ok(place),
                    NomReverse::Error { error } => {
                        Err(ProviderError::NotFound(format!("Nominatim: {error}")))
                    }
                }),
        }
        .inspect_err(|e| warn!(provider = "nominatim", %e, "Nominatim returned no usable place"))?;

        normalize(place)
            .inspect_err(|e| warn!(provider = "nominatim", %e, "Nominatim place is malformed"))
    }
}
