use std::{fmt, str::FromStr};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider tag carried by every record produced by the simulation engine.
pub const SIMULATED_TAG: &str = "simulated";

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a coordinate, rejecting values outside the valid lat/lon ranges.
    pub fn try_new(latitude: f64, longitude: f64) -> anyhow::Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(anyhow!("Latitude {latitude} is outside [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(anyhow!("Longitude {longitude} is outside [-180, 180]"));
        }
        Ok(Self::new(latitude, longitude))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = anyhow::Error;

    /// Parses `"lat,lon"` (whitespace around either number is allowed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("Expected coordinates as 'lat,lon', got '{s}'"))?;

        let lat: f64 = lat.trim().parse().with_context(|| format!("Invalid latitude '{lat}'"))?;
        let lon: f64 = lon.trim().parse().with_context(|| format!("Invalid longitude '{lon}'"))?;

        Self::try_new(lat, lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "driving" => Ok(TravelMode::Driving),
            "walking" => Ok(TravelMode::Walking),
            "bicycling" | "cycling" => Ok(TravelMode::Bicycling),
            _ => Err(anyhow!(
                "Unknown travel mode '{s}'. Supported modes: driving, walking, bicycling."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub mode: TravelMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnStep {
    pub instruction: String,
    pub distance_km: f64,
    pub duration_min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub distance_km: f64,
    pub duration_min: f64,
    /// Only some providers report traffic; `None` means unknown, not zero.
    pub duration_in_traffic_min: Option<f64>,
    pub start_label: String,
    pub end_label: String,
    pub path: Vec<Coordinate>,
    pub turn_steps: Vec<TurnStep>,
    pub warnings: Vec<String>,
    pub provider_tag: String,
    pub is_simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
}

impl RouteResult {
    /// Traffic-adjusted duration when the provider reported one.
    pub fn effective_duration_min(&self) -> f64 {
        self.duration_in_traffic_min.unwrap_or(self.duration_min)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeRequest {
    Forward {
        query: String,
        /// ISO 3166-1 alpha-2 code narrowing the search.
        country_hint: Option<String>,
    },
    Reverse(Coordinate),
}

/// Providers grade matches differently: a coarse level or a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Score(u8),
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => f.write_str("low"),
            Confidence::Medium => f.write_str("medium"),
            Confidence::High => f.write_str("high"),
            Confidence::Score(score) => write!(f, "{score}/10"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub coordinate: Coordinate,
    pub formatted_address: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub confidence: Confidence,
    pub provider_tag: String,
    pub is_simulated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeatherRequest {
    pub location: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub location: Coordinate,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirQualityRequest {
    pub location: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub wind_dir_deg: f64,
    pub cloudiness_pct: u8,
    pub precipitation_mm: f64,
    pub condition: String,
    pub description: String,
    pub visibility_m: u32,
    pub observed_at: DateTime<Utc>,
    pub provider_tag: String,
    pub is_simulated: bool,
}

/// One 3-hour forecast step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub at: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub precipitation_mm: f64,
    pub condition: String,
    pub description: String,
    pub is_simulated: bool,
}

/// Air quality index (1 = good .. 5 = very poor) plus pollutant concentrations in µg/m³.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub aqi: u8,
    pub co: f64,
    pub no2: f64,
    pub o3: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    pub provider_tag: String,
    pub is_simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eta {
    pub arrival: NaiveDateTime,
    pub iso: String,
    pub formatted: String,
    pub duration_min: f64,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestResponder {
    /// Index of the responder in the caller's list.
    pub responder_id: usize,
    pub coordinate: Coordinate,
    pub distance_km: f64,
    pub duration_min: f64,
    pub route: RouteResult,
    pub eta: Eta,
}
