use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::Password;
use responder_core::{Config, Coordinate, ProviderId, ResolutionEngine, TravelMode};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "responder",
    version,
    about = "Emergency routing, geocoding and weather with provider fallback"
)]
pub struct Cli {
    /// Print JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging on stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "google" or "opencage".
        provider: String,
    },

    /// List known providers and whether they are enabled.
    Providers,

    /// Route between two points.
    Route {
        /// Start as "lat,lon".
        #[arg(allow_hyphen_values = true)]
        from: Coordinate,

        /// Destination as "lat,lon".
        #[arg(allow_hyphen_values = true)]
        to: Coordinate,

        #[arg(long, default_value = "driving")]
        mode: TravelMode,

        /// Number of routes to return, including the primary one.
        #[arg(long, default_value_t = 1)]
        alternatives: usize,
    },

    /// Find the responder with the shortest road distance to an emergency.
    Nearest {
        /// Emergency location as "lat,lon".
        #[arg(allow_hyphen_values = true)]
        emergency: Coordinate,

        /// Responder locations as "lat,lon".
        #[arg(required = true, allow_hyphen_values = true)]
        responders: Vec<Coordinate>,
    },

    /// Look up coordinates for an address or place name.
    Geocode {
        query: String,

        /// Two-letter country code narrowing the search.
        #[arg(long)]
        country: Option<String>,
    },

    /// Look up the address at a coordinate.
    Reverse {
        #[arg(allow_hyphen_values = true)]
        location: Coordinate,
    },

    /// Current weather at a coordinate.
    Weather {
        #[arg(allow_hyphen_values = true)]
        location: Coordinate,
    },

    /// Three-hourly forecast at a coordinate.
    Forecast {
        #[arg(allow_hyphen_values = true)]
        location: Coordinate,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=5))]
        days: u32,
    },

    /// Air quality at a coordinate.
    Air {
        #[arg(allow_hyphen_values = true)]
        location: Coordinate,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        let engine = match &self.command {
            Command::Configure { provider } => return configure(&mut config, provider),
            Command::Providers => {
                output::print_providers(&config.provider_configs(), self.json)?;
                return Ok(());
            }
            _ => ResolutionEngine::from_config(&config)?,
        };

        match self.command {
            Command::Route { from, to, mode, alternatives } => {
                let routes = engine.get_multiple_routes(from, to, mode, alternatives).await;
                let now = Local::now().naive_local();
                let etas: Vec<_> = routes.iter().map(|r| engine.calculate_eta(r, now)).collect();
                output::print_routes(&routes, &etas, self.json)?;
            }
            Command::Nearest { emergency, responders } => {
                let nearest = engine
                    .find_nearest_responder(emergency, &responders)
                    .await
                    .context("No responder locations given")?;
                output::print_nearest(&nearest, self.json)?;
            }
            Command::Geocode { query, country } => {
                match engine.geocode(&query, country.as_deref()).await {
                    Some(result) => output::print_geocode(&result, self.json)?,
                    None => bail!("No geocoding provider could resolve '{query}'"),
                }
            }
            Command::Reverse { location } => {
                output::print_geocode(&engine.reverse_geocode(location).await, self.json)?;
            }
            Command::Weather { location } => {
                output::print_weather(&engine.current_weather(location).await, self.json)?;
            }
            Command::Forecast { location, days } => {
                output::print_forecast(&engine.forecast(location, days).await, self.json)?;
            }
            Command::Air { location } => {
                output::print_air_quality(&engine.air_quality(location).await, self.json)?;
            }
            Command::Configure { .. } | Command::Providers => {}
        }

        Ok(())
    }
}

fn configure(config: &mut Config, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    if !id.requires_credential() {
        bail!("Provider '{id}' does not need a credential");
    }

    let api_key = Password::new(&format!("API key for {id} ({}):", id.capability()))
        .without_confirmation()
        .with_help_message("Stored in the responder config file")
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key);
    config.save()?;

    println!("Saved credentials for {id} to {}", Config::config_file_path()?.display());
    Ok(())
}
