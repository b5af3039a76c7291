use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, fs, path::PathBuf, time::Duration};

use crate::provider::{Capability, ProviderId};

/// Credential entry for a single provider as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKey {
    pub api_key: String,
}

/// Engine tuning knobs. Every field has a default, so a partial `[settings]`
/// table (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum spacing between two calls to the same provider.
    pub min_request_interval_secs: f64,
    pub routing_timeout_secs: u64,
    pub geocoding_timeout_secs: u64,
    pub weather_timeout_secs: u64,
    /// Sent with every request; Nominatim refuses anonymous clients.
    pub user_agent: String,
    pub nominatim_enabled: bool,
    /// Seed for simulated route jitter. Unset means a fresh seed per process.
    pub simulation_seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_request_interval_secs: 1.0,
            routing_timeout_secs: 15,
            geocoding_timeout_secs: 10,
            weather_timeout_secs: 10,
            user_agent: concat!("responder-core/", env!("CARGO_PKG_VERSION")).to_string(),
            nominatim_enabled: true,
            simulation_seed: None,
        }
    }
}

impl Settings {
    /// Negative values mean no spacing. Infinite or oversized values are rejected.
    pub fn min_request_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.min_request_interval_secs.max(0.0)).with_context(|| {
            format!(
                "min_request_interval_secs = {} is not a usable interval",
                self.min_request_interval_secs
            )
        })
    }

    pub fn timeout_for(&self, capability: Capability) -> Duration {
        let secs = match capability {
            Capability::Routing => self.routing_timeout_secs,
            Capability::Geocoding => self.geocoding_timeout_secs,
            Capability::Weather => self.weather_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Example TOML:
    /// [providers.google]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderKey>,

    #[serde(default)]
    pub settings: Settings,
}

/// Secret string whose `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Resolved, immutable view of one provider's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub capability: Capability,
    pub provider: ProviderId,
    pub credential: Option<Credential>,
    /// Computed once here; nothing downstream inspects credential strings.
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(provider: ProviderId, credential: Option<String>) -> Self {
        let credential = credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && !provider.is_placeholder(c))
            .map(Credential::new);

        let enabled = !provider.requires_credential() || credential.is_some();

        Self { capability: provider.capability(), provider, credential, enabled }
    }

    /// Credential for providers that need one; empty for credential-free providers.
    pub fn api_key(&self) -> &str {
        self.credential.as_ref().map(Credential::expose).unwrap_or_default()
    }
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderKey> {
        self.providers.get(id.as_str())
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.settings.min_request_interval().context("Invalid [settings] table")?;
        Ok(config)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "responder", "responder-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderKey { api_key });
    }

    /// Returns API key for a provider, if present in the file.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id).map(|cfg| cfg.api_key.as_str())
    }

    /// Resolve every known provider against the file and the process environment.
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.provider_configs_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::provider_configs`] with an explicit environment lookup.
    ///
    /// A key in the file wins over the environment variable.
    pub fn provider_configs_with<F>(&self, env: F) -> Vec<ProviderConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        ProviderId::all()
            .iter()
            .map(|&id| {
                let from_file = self.provider_api_key(id).map(str::to_owned);
                let credential = from_file.or_else(|| id.env_key().and_then(&env));
                let mut cfg = ProviderConfig::new(id, credential);

                if id == ProviderId::Nominatim && !self.settings.nominatim_enabled {
                    cfg.enabled = false;
                }
                cfg
            })
            .collect()
    }
}
