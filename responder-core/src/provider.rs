use crate::{
    config::{ProviderConfig, Settings},
    error::ProviderError,
    http::HttpClient,
    model::{
        AirQuality, AirQualityRequest, CurrentWeatherRequest, ForecastEntry, ForecastRequest,
        GeocodeRequest, GeocodeResult, RouteRequest, RouteResult, WeatherSnapshot,
    },
    provider::{
        google::{GoogleDirections, GoogleGeocoder},
        nominatim::Nominatim,
        opencage::OpenCage,
        openroute::OpenRouteService,
        openweather::OpenWeather,
    },
    resolver::FallbackChain,
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod google;
pub mod nominatim;
pub mod opencage;
pub mod openroute;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Routing,
    Geocoding,
    Weather,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Routing => "routing",
            Capability::Geocoding => "geocoding",
            Capability::Weather => "weather",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every external service the engine knows how to talk to.
///
/// The declaration order within a capability is the fallback preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    GoogleMaps,
    OpenRouteService,
    GoogleGeocoding,
    OpenCage,
    Nominatim,
    OpenWeather,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::GoogleMaps => "google",
            ProviderId::OpenRouteService => "openroute",
            ProviderId::GoogleGeocoding => "google-geocoding",
            ProviderId::OpenCage => "opencage",
            ProviderId::Nominatim => "nominatim",
            ProviderId::OpenWeather => "openweather",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::GoogleMaps,
            ProviderId::OpenRouteService,
            ProviderId::GoogleGeocoding,
            ProviderId::OpenCage,
            ProviderId::Nominatim,
            ProviderId::OpenWeather,
        ]
    }

    pub fn capability(&self) -> Capability {
        match self {
            ProviderId::GoogleMaps | ProviderId::OpenRouteService => Capability::Routing,
            ProviderId::GoogleGeocoding | ProviderId::OpenCage | ProviderId::Nominatim => {
                Capability::Geocoding
            }
            ProviderId::OpenWeather => Capability::Weather,
        }
    }

    /// Environment variable holding the provider's credential.
    pub fn env_key(&self) -> Option<&'static str> {
        match self {
            ProviderId::GoogleMaps => Some("GOOGLE_MAPS_API_KEY"),
            ProviderId::OpenRouteService => Some("OPENROUTE_API_KEY"),
            ProviderId::GoogleGeocoding => Some("GOOGLE_GEOCODING_API_KEY"),
            ProviderId::OpenCage => Some("OPENCAGE_API_KEY"),
            ProviderId::Nominatim => None,
            ProviderId::OpenWeather => Some("OPENWEATHER_API_KEY"),
        }
    }

    pub fn requires_credential(&self) -> bool {
        self.env_key().is_some()
    }

    /// Whether `value` is the `YOUR_<ENV_KEY>_HERE` sentinel shipped in sample env files.
    pub fn is_placeholder(&self, value: &str) -> bool {
        let inner = value.strip_prefix("YOUR_").and_then(|v| v.strip_suffix("_HERE"));
        self.env_key().is_some_and(|key| inner == Some(key))
    }

    /// Providers of one capability, in fallback order.
    pub fn for_capability(capability: Capability) -> impl Iterator<Item = ProviderId> {
        Self::all().iter().copied().filter(move |id| id.capability() == capability)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        ProviderId::all().iter().copied().find(|id| id.as_str() == lower).ok_or_else(|| {
            let known: Vec<_> = ProviderId::all().iter().map(ProviderId::as_str).collect();
            anyhow::anyhow!("Unknown provider '{value}'. Supported providers: {}.", known.join(", "))
        })
    }
}

/// One provider's implementation of one capability.
///
/// `resolve` performs at most one round trip and returns the first candidate
/// the provider offers, already converted to the normalized record type.
#[async_trait]
pub trait Adapter<Req, Out>: Send + Sync + Debug
where
    Req: Sync + 'static,
    Out: Send + 'static,
{
    fn provider(&self) -> ProviderId;

    async fn resolve(&self, request: &Req) -> Result<Out, ProviderError>;
}

pub type RoutingChain = FallbackChain<RouteRequest, RouteResult>;
pub type GeocodingChain = FallbackChain<GeocodeRequest, GeocodeResult>;
pub type CurrentWeatherChain = FallbackChain<CurrentWeatherRequest, WeatherSnapshot>;
pub type ForecastChain = FallbackChain<ForecastRequest, Vec<ForecastEntry>>;
pub type AirQualityChain = FallbackChain<AirQualityRequest, AirQuality>;

/// Builds every fallback chain from resolved provider configs, skipping
/// disabled providers.
#[derive(Debug, Clone)]
pub struct ChainFactory<'a> {
    configs: &'a [ProviderConfig],
    settings: &'a Settings,
    http: Arc<dyn HttpClient>,
}

impl<'a> ChainFactory<'a> {
    pub fn new(
        configs: &'a [ProviderConfig],
        settings: &'a Settings,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self { configs, settings, http }
    }

    fn enabled(&self, capability: Capability) -> impl Iterator<Item = &'a ProviderConfig> + '_ {
        ProviderId::for_capability(capability)
            .filter_map(move |id| self.configs.iter().find(|c| c.provider == id && c.enabled))
    }

    pub fn routing(&self) -> RoutingChain {
        let timeout = self.settings.timeout_for(Capability::Routing);
        let adapters = self
            .enabled(Capability::Routing)
            .filter_map(|cfg| -> Option<Arc<dyn Adapter<RouteRequest, RouteResult>>> {
                let key = cfg.api_key().to_owned();
                match cfg.provider {
                    ProviderId::GoogleMaps => {
                        Some(Arc::new(GoogleDirections::new(self.http.clone(), key, timeout)))
                    }
                    ProviderId::OpenRouteService => {
                        Some(Arc::new(OpenRouteService::new(self.http.clone(), key, timeout)))
                    }
                    _ => None,
                }
            })
            .collect();

        FallbackChain::new(Capability::Routing, adapters)
    }

    pub fn geocoding(&self) -> GeocodingChain {
        let timeout = self.settings.timeout_for(Capability::Geocoding);
        let adapters = self
            .enabled(Capability::Geocoding)
            .filter_map(|cfg| -> Option<Arc<dyn Adapter<GeocodeRequest, GeocodeResult>>> {
                let key = cfg.api_key().to_owned();
                match cfg.provider {
                    ProviderId::GoogleGeocoding => {
                        Some(Arc::new(GoogleGeocoder::new(self.http.clone(), key, timeout)))
                    }
                    ProviderId::OpenCage => {
                        Some(Arc::new(OpenCage::new(self.http.clone(), key, timeout)))
                    }
                    ProviderId::Nominatim => Some(Arc::new(Nominatim::new(
                        self.http.clone(),
                        self.settings.user_agent.clone(),
                        timeout,
                    ))),
                    _ => None,
                }
            })
            .collect();

        FallbackChain::new(Capability::Geocoding, adapters)
    }

    fn openweather(&self) -> Option<Arc<OpenWeather>> {
        let timeout = self.settings.timeout_for(Capability::Weather);
        self.enabled(Capability::Weather)
            .find(|cfg| cfg.provider == ProviderId::OpenWeather)
            .map(|cfg| Arc::new(OpenWeather::new(self.http.clone(), cfg.api_key().to_owned(), timeout)))
    }

    pub fn current_weather(&self) -> CurrentWeatherChain {
        let adapters = self
            .openweather()
            .map(|ow| -> Arc<dyn Adapter<CurrentWeatherRequest, WeatherSnapshot>> { ow })
            .into_iter()
            .collect();
        FallbackChain::new(Capability::Weather, adapters)
    }

    pub fn forecast(&self) -> ForecastChain {
        let adapters = self
            .openweather()
            .map(|ow| -> Arc<dyn Adapter<ForecastRequest, Vec<ForecastEntry>>> { ow })
            .into_iter()
            .collect();
        FallbackChain::new(Capability::Weather, adapters)
    }

    pub fn air_quality(&self) -> AirQualityChain {
        let adapters = self
            .openweather()
            .map(|ow| -> Arc<dyn Adapter<AirQualityRequest, AirQuality>> { ow })
            .into_iter()
            .collect();
        FallbackChain::new(Capability::Weather, adapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockHttpClient;

    fn configs(keys: &[(ProviderId, &str)]) -> Vec<ProviderConfig> {
        ProviderId::all()
            .iter()
            .map(|&id| {
                let key = keys.iter().find(|(k, _)| *k == id).map(|(_, v)| v.to_string());
                ProviderConfig::new(id, key)
            })
            .collect()
    }

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
        assert!(err.to_string().contains("nominatim"));
    }

    #[test]
    fn placeholder_detection_is_per_provider() {
        assert!(ProviderId::OpenCage.is_placeholder("YOUR_OPENCAGE_API_KEY_HERE"));
        assert!(!ProviderId::OpenCage.is_placeholder("YOUR_OPENWEATHER_API_KEY_HERE"));
        assert!(!ProviderId::Nominatim.is_placeholder("YOUR__HERE"));
    }

    #[test]
    fn capability_order_is_preference_order() {
        let geocoders: Vec<_> = ProviderId::for_capability(Capability::Geocoding).collect();
        assert_eq!(
            geocoders,
            vec![ProviderId::GoogleGeocoding, ProviderId::OpenCage, ProviderId::Nominatim]
        );
    }

    #[test]
    fn factory_skips_disabled_providers() {
        let configs = configs(&[(ProviderId::OpenRouteService, "ors")]);
        let settings = Settings::default();
        let factory = ChainFactory::new(&configs, &settings, Arc::new(MockHttpClient::default()));

        assert_eq!(factory.routing().providers(), vec![ProviderId::OpenRouteService]);
        assert_eq!(factory.geocoding().providers(), vec![ProviderId::Nominatim]);
        assert!(factory.current_weather().is_empty());
    }

    #[test]
    fn factory_orders_all_enabled_providers() {
        let configs = configs(&[
            (ProviderId::GoogleMaps, "g"),
            (ProviderId::OpenRouteService, "ors"),
            (ProviderId::GoogleGeocoding, "gg"),
            (ProviderId::OpenCage, "oc"),
            (ProviderId::OpenWeather, "ow"),
        ]);
        let settings = Settings::default();
        let factory = ChainFactory::new(&configs, &settings, Arc::new(MockHttpClient::default()));

        assert_eq!(
            factory.routing().providers(),
            vec![ProviderId::GoogleMaps, ProviderId::OpenRouteService]
        );
        assert_eq!(
            factory.geocoding().providers(),
            vec![ProviderId::GoogleGeocoding, ProviderId::OpenCage, ProviderId::Nominatim]
        );
        assert_eq!(factory.forecast().providers(), vec![ProviderId::OpenWeather]);
        assert_eq!(factory.air_quality().providers(), vec![ProviderId::OpenWeather]);
    }
}
