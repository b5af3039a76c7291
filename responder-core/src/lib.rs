//! Core library for the `responder` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Adapters for routing, geocoding and weather providers
//! - The ordered fallback chain shared by every capability
//! - A simulation engine answering when no provider can
//! - Geometry helpers (great-circle distance, path interpolation, polyline codec)
//!
//! It is used by `responder-cli`, but can also be embedded by other binaries or services.

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod http;
pub mod model;
pub mod provider;
pub mod rate_limit;
pub mod resolver;
pub mod simulation;

pub use config::{Config, ProviderConfig, Settings};
pub use engine::ResolutionEngine;
pub use error::{PolylineError, ProviderError};
pub use model::{
    AirQuality, Confidence, Coordinate, Eta, ForecastEntry, GeocodeResult, NearestResponder,
    RouteResult, TravelMode, WeatherSnapshot,
};
pub use provider::{Adapter, Capability, ProviderId};
pub use rate_limit::RateLimiter;
pub use simulation::SimulationEngine;
