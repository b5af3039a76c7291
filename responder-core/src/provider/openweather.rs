use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{
    error::ProviderError,
    http::{HttpClient, HttpRequest},
    model::{
        AirQuality, AirQualityRequest, Coordinate, CurrentWeatherRequest, ForecastEntry,
        ForecastRequest, WeatherSnapshot,
    },
};

use super::{Adapter, ProviderId};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const DEFAULT_VISIBILITY_M: u32 = 10_000;
const FORECAST_STEPS_PER_DAY: usize = 8;

/// OpenWeather current conditions, 5-day/3-hour forecast and air pollution.
#[derive(Debug, Clone)]
pub struct OpenWeather {
    api_key: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl OpenWeather {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String, timeout: Duration) -> Self {
        Self { api_key, http, timeout }
    }

    fn request(&self, endpoint: &str, location: Coordinate, metric: bool) -> HttpRequest {
        let req = HttpRequest::get(format!("{BASE_URL}/{endpoint}"), self.timeout)
            .query("lat", location.latitude)
            .query("lon", location.longitude)
            .query("appid", &self.api_key);

        if metric { req.query("units", "metric") } else { req }
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        what: &str,
        request: HttpRequest,
    ) -> Result<T, ProviderError> {
        let res = self.http.send(request).await.inspect_err(|e| {
            warn!(provider = "openweather", %e, "OpenWeather {what} request failed");
        })?;

        let res = res.error_for_status("OpenWeather").inspect_err(|e| {
            warn!(provider = "openweather", %e, "OpenWeather {what} request rejected");
        })?;

        serde_json::from_str(&res.body).map_err(|e| {
            warn!(provider = "openweather", %e, "Failed to parse OpenWeather {what} JSON");
            ProviderError::MalformedResponse(format!("OpenWeather {what}: {e}"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    humidity: u8,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwClouds {
    #[serde(default)]
    all: u8,
}

#[derive(Debug, Default, Deserialize)]
struct OwRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    clouds: OwClouds,
    #[serde(default)]
    rain: OwRain,
    visibility: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    rain: OwRain,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwAirMain {
    aqi: u8,
}

#[derive(Debug, Deserialize)]
struct OwAirComponents {
    co: f64,
    no2: f64,
    o3: f64,
    pm2_5: f64,
    pm10: f64,
}

#[derive(Debug, Deserialize)]
struct OwAirEntry {
    main: OwAirMain,
    components: OwAirComponents,
}

#[derive(Debug, Deserialize)]
struct OwAirResponse {
    list: Vec<OwAirEntry>,
}

fn first_condition(weather: &[OwWeather]) -> Result<&OwWeather, ProviderError> {
    weather
        .first()
        .ok_or_else(|| ProviderError::MalformedResponse("OpenWeather entry has no weather".into()))
}

#[async_trait]
impl Adapter<CurrentWeatherRequest, WeatherSnapshot> for OpenWeather {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn resolve(&self, request: &CurrentWeatherRequest) -> Result<WeatherSnapshot, ProviderError> {
        let parsed: OwCurrentResponse = self
            .fetch("current weather", self.request("weather", request.location, true))
            .await?;

        let condition = first_condition(&parsed.weather)?;

        Ok(WeatherSnapshot {
            temperature_c: parsed.main.temp,
            feels_like_c: parsed.main.feels_like.unwrap_or(parsed.main.temp),
            humidity_pct: parsed.main.humidity,
            pressure_hpa: parsed.main.pressure,
            wind_speed_mps: parsed.wind.speed,
            wind_dir_deg: parsed.wind.deg.rem_euclid(360.0),
            cloudiness_pct: parsed.clouds.all,
            precipitation_mm: parsed.rain.one_hour.unwrap_or(0.0),
            condition: condition.main.clone(),
            description: condition.description.clone(),
            visibility_m: parsed.visibility.unwrap_or(DEFAULT_VISIBILITY_M),
            observed_at: unix_to_utc(parsed.dt).unwrap_or_else(Utc::now),
            provider_tag: ProviderId::OpenWeather.to_string(),
            is_simulated: false,
        })
    }
}

#[async_trait]
impl Adapter<ForecastRequest, Vec<ForecastEntry>> for OpenWeather {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn resolve(&self, request: &ForecastRequest) -> Result<Vec<ForecastEntry>, ProviderError> {
        let parsed: OwForecastResponse = self
            .fetch("forecast", self.request("forecast", request.location, true))
            .await?;

        if parsed.list.is_empty() {
            return Err(ProviderError::NotFound("OpenWeather forecast contained no data".into()));
        }

        parsed
            .list
            .iter()
            .take(request.days as usize * FORECAST_STEPS_PER_DAY)
            .map(|entry| -> Result<ForecastEntry, ProviderError> {
                let condition = first_condition(&entry.weather)?;
                Ok(ForecastEntry {
                    at: unix_to_utc(entry.dt).ok_or_else(|| {
                        ProviderError::MalformedResponse(format!("bad forecast timestamp {}", entry.dt))
                    })?,
                    temperature_c: entry.main.temp,
                    humidity_pct: entry.main.humidity,
                    pressure_hpa: entry.main.pressure,
                    wind_speed_mps: entry.wind.speed,
                    precipitation_mm: entry.rain.three_hours.unwrap_or(0.0),
                    condition: condition.main.clone(),
                    description: condition.description.clone(),
                    is_simulated: false,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Adapter<AirQualityRequest, AirQuality> for OpenWeather {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn resolve(&self, request: &AirQualityRequest) -> Result<AirQuality, ProviderError> {
        let parsed: OwAirResponse = self
            .fetch("air pollution", self.request("air_pollution", request.location, false))
            .await?;

        let entry = parsed
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound("OpenWeather air pollution list is empty".into()))?;

        Ok(AirQuality {
            aqi: entry.main.aqi,
            co: entry.components.co,
            no2: entry.components.no2,
            o3: entry.components.o3,
            pm2_5: entry.components.pm2_5,
            pm10: entry.components.pm10,
            provider_tag: ProviderId::OpenWeather.to_string(),
            is_simulated: false,
        })
    }
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockHttpClient;

    const CURRENT_JSON: &str = r#"{
        "coord": {"lon": -74.006, "lat": 40.7128},
        "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
        "main": {"temp": 12.3, "feels_like": 10.9, "temp_min": 11.0, "temp_max": 13.5,
                 "pressure": 1009, "humidity": 81},
        "visibility": 8000,
        "wind": {"speed": 5.1, "deg": 230},
        "rain": {"1h": 0.76},
        "clouds": {"all": 90},
        "dt": 1704067200,
        "name": "New York"
    }"#;

    fn provider(mock: &MockHttpClient) -> OpenWeather {
        OpenWeather::new(Arc::new(mock.clone()), "OW_KEY".into(), Duration::from_secs(10))
    }

    fn here() -> Coordinate {
        Coordinate::new(40.7128, -74.0060)
    }

    #[tokio::test]
    async fn parses_current_weather() {
        let mock = MockHttpClient::with_json(CURRENT_JSON);

        let snapshot = provider(&mock)
            .resolve(&CurrentWeatherRequest { location: here() })
            .await
            .expect("valid payload");

        assert_eq!(snapshot.temperature_c, 12.3);
        assert_eq!(snapshot.feels_like_c, 10.9);
        assert_eq!(snapshot.humidity_pct, 81);
        assert_eq!(snapshot.pressure_hpa, 1009.0);
        assert_eq!(snapshot.wind_dir_deg, 230.0);
        assert_eq!(snapshot.cloudiness_pct, 90);
        assert_eq!(snapshot.precipitation_mm, 0.76);
        assert_eq!(snapshot.condition, "Rain");
        assert_eq!(snapshot.description, "light rain");
        assert_eq!(snapshot.visibility_m, 8000);
        assert_eq!(snapshot.observed_at.timestamp(), 1_704_067_200);
        assert_eq!(snapshot.provider_tag, "openweather");
        assert!(!snapshot.is_simulated);

        let req = mock.last_request();
        assert_eq!(req.url, "https://api.openweathermap.org/data/2.5/weather");
        assert_eq!(req.query_value("lat"), Some("40.7128"));
        assert_eq!(req.query_value("lon"), Some("-74.006"));
        assert_eq!(req.query_value("appid"), Some("OW_KEY"));
        assert_eq!(req.query_value("units"), Some("metric"));
        assert_eq!(req.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn optional_fields_take_defaults() {
        let mock = MockHttpClient::with_json(
            r#"{"weather": [{"main": "Clear", "description": "clear sky"}],
                "main": {"temp": 20.0, "pressure": 1015, "humidity": 40},
                "wind": {"speed": 1.0}, "dt": 1704067200}"#,
        );

        let snapshot = provider(&mock)
            .resolve(&CurrentWeatherRequest { location: here() })
            .await
            .unwrap();

        assert_eq!(snapshot.precipitation_mm, 0.0);
        assert_eq!(snapshot.visibility_m, 10_000);
        assert_eq!(snapshot.wind_dir_deg, 0.0);
        assert_eq!(snapshot.feels_like_c, 20.0);
    }

    #[tokio::test]
    async fn missing_weather_array_is_malformed() {
        let mock = MockHttpClient::with_json(
            r#"{"weather": [], "main": {"temp": 1.0, "pressure": 1000, "humidity": 50},
                "wind": {"speed": 0.0}, "dt": 0}"#,
        );

        let err = provider(&mock)
            .resolve(&CurrentWeatherRequest { location: here() })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn invalid_key_is_unauthorized() {
        let mock = MockHttpClient::with_status(401, r#"{"cod":401,"message":"Invalid API key"}"#);

        let err = provider(&mock)
            .resolve(&CurrentWeatherRequest { location: here() })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn server_error_is_unreachable() {
        let mock = MockHttpClient::with_status(502, "Bad Gateway");

        let err = provider(&mock)
            .resolve(&CurrentWeatherRequest { location: here() })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Unreachable(_)));
    }

    #[tokio::test]
    async fn forecast_is_truncated_to_requested_days() {
        let entries: Vec<String> = (0..16)
            .map(|i| {
                format!(
                    r#"{{"dt": {}, "main": {{"temp": {}, "pressure": 1012, "humidity": 60}},
                        "weather": [{{"main": "Clouds", "description": "few clouds"}}],
                        "wind": {{"speed": 3.0}}, "rain": {{"3h": 0.5}}}}"#,
                    1_704_067_200 + i * 10_800,
                    10 + i
                )
            })
            .collect();
        let body = format!(r#"{{"cnt": 16, "list": [{}]}}"#, entries.join(","));
        let mock = MockHttpClient::with_json(&body);

        let forecast = provider(&mock)
            .resolve(&ForecastRequest { location: here(), days: 1 })
            .await
            .unwrap();

        assert_eq!(forecast.len(), 8);
        assert_eq!(forecast[1].at.timestamp() - forecast[0].at.timestamp(), 10_800);
        assert_eq!(forecast[7].temperature_c, 17.0);
        assert_eq!(forecast[0].precipitation_mm, 0.5);
        assert_eq!(mock.last_request().url, "https://api.openweathermap.org/data/2.5/forecast");
    }

    #[tokio::test]
    async fn empty_forecast_is_not_found() {
        let mock = MockHttpClient::with_json(r#"{"cnt": 0, "list": []}"#);

        let err = provider(&mock)
            .resolve(&ForecastRequest { location: here(), days: 5 })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn parses_air_quality_without_units() {
        let mock = MockHttpClient::with_json(
            r#"{"coord": {"lon": -74.006, "lat": 40.7128},
                "list": [{"main": {"aqi": 2},
                          "components": {"co": 230.31, "no": 0.1, "no2": 21.5, "o3": 45.0,
                                         "so2": 3.2, "pm2_5": 8.4, "pm10": 12.9, "nh3": 0.6},
                          "dt": 1704067200}]}"#,
        );

        let air = provider(&mock)
            .resolve(&AirQualityRequest { location: here() })
            .await
            .unwrap();

        assert_eq!(air.aqi, 2);
        assert_eq!(air.pm2_5, 8.4);
        assert_eq!(air.no2, 21.5);
        assert!(!air.is_simulated);

        let req = mock.last_request();
        assert!(req.url.ends_with("/air_pollution"));
        assert_eq!(req.query_value("units"), None);
    }
}
