//! Synthetic stand-ins for every provider capability.
//!
//! Routes use the engine's own seedable generator for path jitter. Weather and
//! air quality are seeded from the rounded location and the UTC hour, so the
//! same place asked twice within an hour gets the same answer.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    geometry::{great_circle_distance_km, interpolate_path},
    model::{
        AirQuality, Confidence, Coordinate, ForecastEntry, GeocodeResult, RouteResult,
        SIMULATED_TAG, TurnStep, WeatherSnapshot,
    },
};

/// Roads are longer than the great circle between their ends.
pub const ROAD_FACTOR: f64 = 1.3;
/// Assumed average urban driving speed.
pub const AVERAGE_SPEED_KMH: f64 = 40.0;
pub const TRAFFIC_FACTOR: f64 = 1.2;
pub const MIN_PATH_SEGMENTS: usize = 5;

const FORECAST_STEPS_PER_DAY: u32 = 8;
const FORECAST_STEP_HOURS: i64 = 3;

const CONDITION_WEIGHTS: [(&str, f64); 6] = [
    ("Clear", 0.40),
    ("Clouds", 0.30),
    ("Rain", 0.15),
    ("Drizzle", 0.10),
    ("Thunderstorm", 0.03),
    ("Snow", 0.02),
];
const FORECAST_CONDITIONS: [&str; 3] = ["Clear", "Clouds", "Rain"];

const WEATHER_SALT: u64 = 0x5745_4154;
const FORECAST_SALT: u64 = 0x464f_5245;
const AIR_SALT: u64 = 0x4149_5251;

#[derive(Debug)]
pub struct SimulationEngine {
    rng: Mutex<StdRng>,
}

impl SimulationEngine {
    /// `seed` makes route jitter reproducible; `None` seeds from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }

    pub fn route(&self, origin: Coordinate, destination: Coordinate) -> RouteResult {
        let straight_km = great_circle_distance_km(origin, destination);
        let distance_km = straight_km * ROAD_FACTOR;
        let duration_min = distance_km / AVERAGE_SPEED_KMH * 60.0;
        let segments = ((2.0 * straight_km).round() as usize).max(MIN_PATH_SEGMENTS);

        let path = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            interpolate_path(origin, destination, segments, &mut *rng)
        };

        RouteResult {
            distance_km,
            duration_min,
            duration_in_traffic_min: Some(duration_min * TRAFFIC_FACTOR),
            start_label: origin.to_string(),
            end_label: destination.to_string(),
            path,
            turn_steps: vec![TurnStep {
                instruction: "Head to emergency location".to_string(),
                distance_km,
                duration_min,
            }],
            warnings: Vec::new(),
            provider_tag: SIMULATED_TAG.to_string(),
            is_simulated: true,
            route_name: None,
        }
    }

    pub fn weather(&self, location: Coordinate) -> WeatherSnapshot {
        self.weather_at(location, Utc::now())
    }

    /// Weather for the hour bucket containing `at`.
    pub fn weather_at(&self, location: Coordinate, at: DateTime<Utc>) -> WeatherSnapshot {
        let bucket = hour_bucket(at);
        let mut rng = seeded(location_seed(location), bucket, WEATHER_SALT);

        let temperature = base_temperature(location) + rng.gen_range(-5.0..5.0);
        let condition = pick_condition(&mut rng);
        let precipitation = match condition {
            "Rain" => rng.gen_range(2.0..15.0),
            "Drizzle" => rng.gen_range(0.5..2.0),
            "Thunderstorm" => rng.gen_range(10.0..30.0),
            _ => 0.0,
        };

        WeatherSnapshot {
            temperature_c: round1(temperature),
            feels_like_c: round1(temperature + rng.gen_range(-2.0..2.0)),
            humidity_pct: rng.gen_range(40..=90),
            pressure_hpa: f64::from(rng.gen_range(1000u16..=1025)),
            wind_speed_mps: round1(rng.gen_range(0.0..20.0)),
            wind_dir_deg: f64::from(rng.gen_range(0u16..360)),
            cloudiness_pct: rng.gen_range(0..=100),
            precipitation_mm: round1(precipitation),
            condition: condition.to_string(),
            description: condition.to_lowercase(),
            visibility_m: rng.gen_range(5000..=10000),
            observed_at: DateTime::from_timestamp(bucket * 3600, 0).unwrap_or(at),
            provider_tag: SIMULATED_TAG.to_string(),
            is_simulated: true,
        }
    }

    pub fn forecast(&self, location: Coordinate, days: u32) -> Vec<ForecastEntry> {
        self.forecast_from(location, days, Utc::now())
    }

    /// `days * 8` entries, three hours apart, starting at `start`.
    ///
    /// Entry `i` depends only on the location and `i`.
    pub fn forecast_from(
        &self,
        location: Coordinate,
        days: u32,
        start: DateTime<Utc>,
    ) -> Vec<ForecastEntry> {
        let seed = location_seed(location);

        (0..days * FORECAST_STEPS_PER_DAY)
            .map(|i| {
                let mut rng = seeded(seed.wrapping_add(u64::from(i)), 0, FORECAST_SALT);
                let condition = FORECAST_CONDITIONS[rng.gen_range(0..FORECAST_CONDITIONS.len())];

                ForecastEntry {
                    at: start + Duration::hours(i64::from(i) * FORECAST_STEP_HOURS),
                    temperature_c: round1(base_temperature(location) + rng.gen_range(-5.0..5.0)),
                    humidity_pct: rng.gen_range(40..=90),
                    pressure_hpa: f64::from(rng.gen_range(1000u16..=1025)),
                    wind_speed_mps: round1(rng.gen_range(0.0..20.0)),
                    precipitation_mm: round1(rng.gen_range(0.0..5.0)),
                    condition: condition.to_string(),
                    description: SIMULATED_TAG.to_string(),
                    is_simulated: true,
                }
            })
            .collect()
    }

    pub fn air_quality(&self, location: Coordinate) -> AirQuality {
        self.air_quality_at(location, Utc::now())
    }

    pub fn air_quality_at(&self, location: Coordinate, at: DateTime<Utc>) -> AirQuality {
        let mut rng = seeded(location_seed(location), hour_bucket(at), AIR_SALT);

        AirQuality {
            aqi: rng.gen_range(1..=5),
            co: round2(rng.gen_range(200.0..400.0)),
            no2: round2(rng.gen_range(10.0..50.0)),
            o3: round2(rng.gen_range(20.0..80.0)),
            pm2_5: round2(rng.gen_range(5.0..35.0)),
            pm10: round2(rng.gen_range(10.0..50.0)),
            provider_tag: SIMULATED_TAG.to_string(),
            is_simulated: true,
        }
    }

    /// Coordinates echoed back as the address.
    pub fn reverse_geocode(&self, location: Coordinate) -> GeocodeResult {
        GeocodeResult {
            coordinate: location,
            formatted_address: location.to_string(),
            city: String::new(),
            country: String::new(),
            country_code: String::new(),
            confidence: Confidence::Low,
            provider_tag: SIMULATED_TAG.to_string(),
            is_simulated: true,
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

fn base_temperature(location: Coordinate) -> f64 {
    25.0 - 0.4 * location.latitude.abs()
}

/// Location rounded to 1e-3 degrees, packed injectively into one integer.
fn location_seed(location: Coordinate) -> u64 {
    let lat = ((location.latitude + 90.0) * 1000.0).round() as u64;
    let lon = ((location.longitude + 180.0) * 1000.0).round() as u64;
    lat * 360_001 + lon
}

fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(3600)
}

fn seeded(location: u64, bucket: i64, salt: u64) -> StdRng {
    let seed = location
        ^ (bucket as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ salt.rotate_left(32);
    StdRng::seed_from_u64(seed)
}

fn pick_condition<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let mut roll: f64 = rng.gen_range(0.0..1.0);
    for (condition, weight) in CONDITION_WEIGHTS {
        if roll < weight {
            return condition;
        }
        roll -= weight;
    }
    CONDITION_WEIGHTS[CONDITION_WEIGHTS.len() - 1].0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
