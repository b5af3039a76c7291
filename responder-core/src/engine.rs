//! Public entry points of the resolution engine.
//!
//! Every operation walks the matching fallback chain and, when the chain is
//! exhausted, answers from the [`SimulationEngine`] instead. Provider failures
//! never reach the caller; only forward geocoding can come back empty.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use crate::{
    config::{Config, ProviderConfig, Settings},
    http::{HttpClient, ReqwestClient},
    model::{
        AirQuality, AirQualityRequest, Coordinate, CurrentWeatherRequest, Eta, ForecastEntry,
        ForecastRequest, GeocodeRequest, GeocodeResult, NearestResponder, RouteRequest,
        RouteResult, TravelMode, WeatherSnapshot,
    },
    provider::{
        AirQualityChain, Capability, ChainFactory, CurrentWeatherChain, ForecastChain,
        GeocodingChain, RoutingChain,
    },
    rate_limit::RateLimiter,
    resolver::{FallbackChain, Resolution},
    simulation::SimulationEngine,
};

/// Distance growth per synthetic alternative route.
pub const ALTERNATIVE_DISTANCE_STEP: f64 = 0.10;
/// Duration growth per synthetic alternative route.
pub const ALTERNATIVE_DURATION_STEP: f64 = 0.15;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
pub struct ResolutionEngine {
    limiter: Arc<RateLimiter>,
    simulation: SimulationEngine,
    routing: RoutingChain,
    geocoding: GeocodingChain,
    current_weather: CurrentWeatherChain,
    forecast: ForecastChain,
    air_quality: AirQualityChain,
}

impl ResolutionEngine {
    /// Engine with no providers at all: every answer is simulated.
    pub fn new(limiter: Arc<RateLimiter>, simulation: SimulationEngine) -> Self {
        Self {
            limiter,
            simulation,
            routing: FallbackChain::empty(Capability::Routing),
            geocoding: FallbackChain::empty(Capability::Geocoding),
            current_weather: FallbackChain::empty(Capability::Weather),
            forecast: FallbackChain::empty(Capability::Weather),
            air_quality: FallbackChain::empty(Capability::Weather),
        }
    }

    /// Build every chain from the config file and the process environment.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = ReqwestClient::new(&config.settings.user_agent)
            .context("Failed to initialize HTTP client")?;

        Self::with_providers(&config.provider_configs(), &config.settings, Arc::new(http))
    }

    pub fn with_providers(
        configs: &[ProviderConfig],
        settings: &Settings,
        http: Arc<dyn HttpClient>,
    ) -> anyhow::Result<Self> {
        let interval = settings.min_request_interval()?;
        let factory = ChainFactory::new(configs, settings, http);
        let limiter = Arc::new(RateLimiter::new(interval));

        let engine = Self::new(limiter, SimulationEngine::new(settings.simulation_seed))
            .with_routing(factory.routing())
            .with_geocoding(factory.geocoding())
            .with_weather(factory.current_weather(), factory.forecast(), factory.air_quality());

        info!(
            routing = ?engine.routing.providers(),
            geocoding = ?engine.geocoding.providers(),
            weather = ?engine.current_weather.providers(),
            "resolution engine ready"
        );
        Ok(engine)
    }

    pub fn with_routing(mut self, chain: RoutingChain) -> Self {
        self.routing = chain;
        self
    }

    pub fn with_geocoding(mut self, chain: GeocodingChain) -> Self {
        self.geocoding = chain;
        self
    }

    pub fn with_weather(
        mut self,
        current: CurrentWeatherChain,
        forecast: ForecastChain,
        air_quality: AirQualityChain,
    ) -> Self {
        self.current_weather = current;
        self.forecast = forecast;
        self.air_quality = air_quality;
        self
    }

    pub async fn get_optimal_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> RouteResult {
        let request = RouteRequest { origin, destination, mode };

        match self.routing.resolve(&self.limiter, &request).await {
            Resolution::Resolved { value, .. } => value,
            Resolution::Exhausted => self.simulation.route(origin, destination),
        }
    }

    /// The optimal route followed by up to `count - 1` synthetic alternatives.
    ///
    /// Alternatives are only derived from simulated routes; a provider answer
    /// is returned alone.
    pub async fn get_multiple_routes(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
        count: usize,
    ) -> Vec<RouteResult> {
        let primary = self.get_optimal_route(origin, destination, mode).await;

        if !primary.is_simulated {
            return vec![primary];
        }

        let alternatives: Vec<RouteResult> = (1..count)
            .map(|i| {
                let distance_factor = 1.0 + i as f64 * ALTERNATIVE_DISTANCE_STEP;
                let duration_factor = 1.0 + i as f64 * ALTERNATIVE_DURATION_STEP;

                RouteResult {
                    distance_km: primary.distance_km * distance_factor,
                    duration_min: primary.duration_min * duration_factor,
                    duration_in_traffic_min: primary
                        .duration_in_traffic_min
                        .map(|traffic| traffic * duration_factor),
                    route_name: Some(format!("Alternative {i}")),
                    ..primary.clone()
                }
            })
            .collect();

        std::iter::once(primary).chain(alternatives).collect()
    }

    /// Arrival time when leaving at `reference`, using the traffic-adjusted
    /// duration when the route has one.
    pub fn calculate_eta(&self, route: &RouteResult, reference: NaiveDateTime) -> Eta {
        let duration_min = route.effective_duration_min();
        let travel = TimeDelta::milliseconds((duration_min * 60_000.0).round() as i64);
        let arrival = reference.checked_add_signed(travel).unwrap_or(NaiveDateTime::MAX);

        Eta {
            arrival,
            iso: arrival.format(ISO_FORMAT).to_string(),
            formatted: arrival.format(HUMAN_FORMAT).to_string(),
            duration_min,
            distance_km: route.distance_km,
        }
    }

    /// Route every responder to the emergency and keep the shortest by road
    /// distance. Ties keep the earliest responder.
    pub async fn find_nearest_responder(
        &self,
        emergency: Coordinate,
        responders: &[Coordinate],
    ) -> Option<NearestResponder> {
        let mut best: Option<(usize, Coordinate, RouteResult)> = None;

        for (i, &responder) in responders.iter().enumerate() {
            let route = self.get_optimal_route(responder, emergency, TravelMode::Driving).await;
            debug!(responder = i, distance_km = route.distance_km, "responder routed");

            let closer = match &best {
                Some((_, _, current)) => route.distance_km < current.distance_km,
                None => true,
            };
            if closer {
                best = Some((i, responder, route));
            }
        }

        let (responder_id, coordinate, route) = best?;
        let eta = self.calculate_eta(&route, Local::now().naive_local());

        Some(NearestResponder {
            responder_id,
            coordinate,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            route,
            eta,
        })
    }

    /// Forward geocoding. `None` when every provider failed; free text has no
    /// meaningful simulated answer.
    pub async fn geocode(&self, query: &str, country_hint: Option<&str>) -> Option<GeocodeResult> {
        let request = GeocodeRequest::Forward {
            query: query.to_string(),
            country_hint: country_hint.map(str::to_uppercase),
        };

        self.geocoding.resolve(&self.limiter, &request).await.into_value()
    }

    pub async fn reverse_geocode(&self, location: Coordinate) -> GeocodeResult {
        let request = GeocodeRequest::Reverse(location);

        match self.geocoding.resolve(&self.limiter, &request).await {
            Resolution::Resolved { value, .. } => value,
            Resolution::Exhausted => self.simulation.reverse_geocode(location),
        }
    }

    pub async fn current_weather(&self, location: Coordinate) -> WeatherSnapshot {
        let request = CurrentWeatherRequest { location };

        match self.current_weather.resolve(&self.limiter, &request).await {
            Resolution::Resolved { value, .. } => value,
            Resolution::Exhausted => self.simulation.weather(location),
        }
    }

    pub async fn forecast(&self, location: Coordinate, days: u32) -> Vec<ForecastEntry> {
        let request = ForecastRequest { location, days };

        match self.forecast.resolve(&self.limiter, &request).await {
            Resolution::Resolved { value, .. } => value,
            Resolution::Exhausted => self.simulation.forecast(location, days),
        }
    }

    pub async fn air_quality(&self, location: Coordinate) -> AirQuality {
        let request = AirQualityRequest { location };

        match self.air_quality.resolve(&self.limiter, &request).await {
            Resolution::Resolved { value, .. } => value,
            Resolution::Exhausted => self.simulation.air_quality(location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderError,
        http::tests::MockHttpClient,
        model::Confidence,
        provider::{Adapter, ProviderId},
        resolver::tests::StubAdapter,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::{sync::Mutex, time::Duration};

    fn engine() -> ResolutionEngine {
        ResolutionEngine::new(Arc::new(RateLimiter::new(Duration::ZERO)), SimulationEngine::new(Some(7)))
    }

    fn nyc() -> Coordinate {
        Coordinate::new(40.7128, -74.006)
    }

    fn times_square() -> Coordinate {
        Coordinate::new(40.7589, -73.9851)
    }

    fn route(distance_km: f64, duration_min: f64, traffic: Option<f64>, tag: &str) -> RouteResult {
        RouteResult {
            distance_km,
            duration_min,
            duration_in_traffic_min: traffic,
            start_label: String::new(),
            end_label: String::new(),
            path: vec![times_square(), nyc()],
            turn_steps: vec![],
            warnings: vec![],
            provider_tag: tag.to_string(),
            is_simulated: tag == "simulated",
            route_name: None,
        }
    }

    fn routing_chain(adapters: Vec<Arc<dyn Adapter<RouteRequest, RouteResult>>>) -> RoutingChain {
        FallbackChain::new(Capability::Routing, adapters)
    }

    fn jan_first() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    /// Routing adapter whose road distance is the origin's latitude.
    #[derive(Debug, Default)]
    struct LatitudeRouter {
        origins: Mutex<Vec<Coordinate>>,
    }

    #[async_trait]
    impl Adapter<RouteRequest, RouteResult> for LatitudeRouter {
        fn provider(&self) -> ProviderId {
            ProviderId::OpenRouteService
        }

        async fn resolve(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError> {
            self.origins.lock().unwrap().push(request.origin);
            let mut r = route(request.origin.latitude, request.origin.latitude * 2.0, None, "openroute");
            r.path = vec![request.origin, request.destination];
            Ok(r)
        }
    }

    #[tokio::test]
    async fn route_comes_from_first_working_provider() {
        let google = StubAdapter::<RouteResult>::new(
            ProviderId::GoogleMaps,
            Err(ProviderError::Unauthorized("REQUEST_DENIED".into())),
        );
        let ors = StubAdapter::new(ProviderId::OpenRouteService, Ok(route(6.8, 15.2, None, "openroute")));
        let engine = engine().with_routing(routing_chain(vec![google.clone(), ors.clone()]));

        let res = engine.get_optimal_route(times_square(), nyc(), TravelMode::Driving).await;

        assert_eq!(res.provider_tag, "openroute");
        assert!(!res.is_simulated);
        assert_eq!((google.calls(), ors.calls()), (1, 1));
    }

    #[tokio::test]
    async fn exhausted_routing_is_simulated() {
        let google = StubAdapter::<RouteResult>::new(
            ProviderId::GoogleMaps,
            Err(ProviderError::Unreachable("timeout".into())),
        );
        let engine = engine().with_routing(routing_chain(vec![google]));

        let res = engine.get_optimal_route(times_square(), nyc(), TravelMode::Walking).await;

        assert!(res.is_simulated);
        assert_eq!(res.provider_tag, "simulated");
        assert_eq!(res.path[0], times_square());
        assert_eq!(*res.path.last().unwrap(), nyc());
    }

    #[tokio::test]
    async fn simulated_primary_gets_scaled_alternatives() {
        let routes = engine().get_multiple_routes(times_square(), nyc(), TravelMode::Driving, 3).await;

        assert_eq!(routes.len(), 3);
        let primary = &routes[0];
        assert_eq!(primary.route_name, None);

        for (i, alt) in routes.iter().enumerate().skip(1) {
            let i = i as f64;
            assert!((alt.distance_km - primary.distance_km * (1.0 + 0.1 * i)).abs() < 1e-9);
            assert!((alt.duration_min - primary.duration_min * (1.0 + 0.15 * i)).abs() < 1e-9);
            assert!(alt.duration_in_traffic_min.unwrap() >= alt.duration_min);
            assert!(alt.is_simulated);
        }
        assert_eq!(routes[1].route_name.as_deref(), Some("Alternative 1"));
        assert_eq!(routes[2].route_name.as_deref(), Some("Alternative 2"));
    }

    #[tokio::test]
    async fn provider_route_is_returned_alone() {
        let google = StubAdapter::new(ProviderId::GoogleMaps, Ok(route(6.8, 15.0, Some(18.0), "google")));
        let engine = engine().with_routing(routing_chain(vec![google]));

        let routes = engine.get_multiple_routes(times_square(), nyc(), TravelMode::Driving, 3).await;

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].provider_tag, "google");
    }

    #[tokio::test]
    async fn zero_alternatives_still_returns_primary() {
        let routes = engine().get_multiple_routes(times_square(), nyc(), TravelMode::Driving, 0).await;
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn eta_uses_traffic_duration() {
        let eta = engine().calculate_eta(&route(12.0, 20.0, Some(30.0), "google"), jan_first());

        assert_eq!(eta.iso, "2024-01-01T00:30:00");
        assert_eq!(eta.formatted, "2024-01-01 00:30:00");
        assert_eq!(eta.duration_min, 30.0);
        assert_eq!(eta.distance_km, 12.0);
    }

    #[test]
    fn eta_without_traffic_uses_plain_duration() {
        let eta = engine().calculate_eta(&route(12.0, 90.5, None, "openroute"), jan_first());
        assert_eq!(eta.iso, "2024-01-01T01:30:30");
    }

    #[tokio::test]
    async fn nearest_responder_is_minimum_road_distance() {
        let router = Arc::new(LatitudeRouter::default());
        let engine = engine().with_routing(routing_chain(vec![router.clone()]));
        let responders = [Coordinate::new(5.0, 0.0), Coordinate::new(2.0, 0.0), Coordinate::new(8.0, 0.0)];

        let nearest = engine.find_nearest_responder(nyc(), &responders).await.unwrap();

        assert_eq!(nearest.responder_id, 1);
        assert_eq!(nearest.coordinate, responders[1]);
        assert_eq!(nearest.distance_km, 2.0);
        assert_eq!(nearest.duration_min, 4.0);
        assert_eq!(nearest.eta.distance_km, 2.0);
        // One call per responder, responder to emergency.
        assert_eq!(*router.origins.lock().unwrap(), responders.to_vec());
    }

    #[tokio::test]
    async fn nearest_responder_ties_keep_first() {
        let engine = engine().with_routing(routing_chain(vec![Arc::new(LatitudeRouter::default())]));
        let responders = [Coordinate::new(3.0, 0.0), Coordinate::new(2.0, 1.0), Coordinate::new(2.0, 2.0)];

        let nearest = engine.find_nearest_responder(nyc(), &responders).await.unwrap();

        assert_eq!(nearest.responder_id, 1);
    }

    #[tokio::test]
    async fn nearest_responder_of_nobody_is_none() {
        assert!(engine().find_nearest_responder(nyc(), &[]).await.is_none());
    }

    #[tokio::test]
    async fn failed_forward_geocode_is_none_but_reverse_is_simulated() {
        let opencage = StubAdapter::<GeocodeResult>::new(
            ProviderId::OpenCage,
            Err(ProviderError::NotFound("no results".into())),
        );
        let adapters: Vec<Arc<dyn Adapter<GeocodeRequest, GeocodeResult>>> = vec![opencage.clone()];
        let engine = engine().with_geocoding(FallbackChain::new(Capability::Geocoding, adapters));

        assert!(engine.geocode("Atlantis", None).await.is_none());

        let reverse = engine.reverse_geocode(nyc()).await;
        assert!(reverse.is_simulated);
        assert_eq!(reverse.confidence, Confidence::Low);
        assert_eq!(reverse.coordinate, nyc());
        assert_eq!(opencage.calls(), 2);
    }

    #[tokio::test]
    async fn weather_falls_back_to_simulation() {
        let engine = engine();

        let current = engine.current_weather(nyc()).await;
        let forecast = engine.forecast(nyc(), 2).await;
        let air = engine.air_quality(nyc()).await;

        assert!(current.is_simulated);
        assert_eq!(forecast.len(), 16);
        assert!(air.is_simulated);
    }

    fn settings() -> Settings {
        Settings { min_request_interval_secs: 0.0, simulation_seed: Some(1), ..Settings::default() }
    }

    fn unconfigured() -> Vec<ProviderConfig> {
        ProviderId::all().iter().map(|&id| ProviderConfig::new(id, None)).collect()
    }

    fn keyless_engine(configs: &[ProviderConfig], mock: &MockHttpClient) -> ResolutionEngine {
        ResolutionEngine::with_providers(configs, &settings(), Arc::new(mock.clone()))
            .expect("settings are valid")
    }

    #[test]
    fn infinite_request_interval_fails_construction() {
        let settings = Settings { min_request_interval_secs: f64::INFINITY, ..settings() };

        let res = ResolutionEngine::with_providers(
            &unconfigured(),
            &settings,
            Arc::new(MockHttpClient::default()),
        );

        assert!(res.is_err());
    }

    #[tokio::test]
    async fn keyless_setup_geocodes_through_nominatim() {
        let mock = MockHttpClient::with_json(
            r#"[{"lat": "6.5244", "lon": "3.3792", "display_name": "Lagos, Nigeria",
                 "address": {"city": "Lagos", "country": "Nigeria", "country_code": "ng"}}]"#,
        );
        let engine = keyless_engine(&unconfigured(), &mock);

        let res = engine.geocode("Lagos", Some("ng")).await.unwrap();

        assert_eq!(res.provider_tag, "nominatim");
        assert_eq!(res.city, "Lagos");
        assert_eq!(mock.requests().len(), 1);
        assert_eq!(mock.last_request().query_value("countrycodes"), Some("ng"));
    }

    #[tokio::test]
    async fn keyless_setup_never_calls_out_for_routes_or_weather() {
        let mock = MockHttpClient::default();
        let engine = keyless_engine(&unconfigured(), &mock);

        let route = engine.get_optimal_route(times_square(), nyc(), TravelMode::Driving).await;
        let weather = engine.current_weather(nyc()).await;

        assert!(route.is_simulated);
        assert!(weather.is_simulated);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn placeholder_key_leaves_provider_disabled() {
        let mock = MockHttpClient::default();
        let mut configs = unconfigured();
        configs[0] = ProviderConfig::new(ProviderId::GoogleMaps, Some("YOUR_GOOGLE_MAPS_API_KEY_HERE".into()));
        let engine = keyless_engine(&configs, &mock);

        let route = engine.get_optimal_route(times_square(), nyc(), TravelMode::Driving).await;

        assert!(route.is_simulated);
        assert!(mock.requests().is_empty());
    }
}
