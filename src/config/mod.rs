use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MAX_HISTORY: usize = 10;
const DEFAULT_MIN_RATING: f64 = 4.0;
const DEFAULT_MAX_RESULTS: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub maps: MapsConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Missing key is not a startup error; model calls fail closed instead.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_history: usize,
}

#[derive(Debug, Clone)]
pub struct MapsConfig {
    /// Missing key is not a startup error; maps calls fail closed instead.
    pub api_key: Option<String>,
    pub min_rating: f64,
    pub max_results: u32,
    pub places_timeout: Duration,
    pub routes_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini = GeminiConfig {
            api_key: non_empty(lookup("GEMINI_API_KEY")),
            endpoint: lookup("GEMINI_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            max_history: parse_or(
                "GEMINI_MAX_HISTORY_LENGTH",
                lookup("GEMINI_MAX_HISTORY_LENGTH"),
                DEFAULT_MAX_HISTORY,
            )?,
        };

        let maps = MapsConfig {
            api_key: non_empty(lookup("MAPS_API_KEY")),
            min_rating: parse_or(
                "PLACES_MIN_RATING",
                lookup("PLACES_MIN_RATING"),
                DEFAULT_MIN_RATING,
            )?,
            max_results: parse_or(
                "PLACES_MAX_RESULTS",
                lookup("PLACES_MAX_RESULTS"),
                DEFAULT_MAX_RESULTS,
            )?,
            places_timeout: Duration::from_secs(parse_or(
                "PLACES_API_TIMEOUT_SECS",
                lookup("PLACES_API_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            routes_timeout: Duration::from_secs(parse_or(
                "ROUTES_API_TIMEOUT_SECS",
                lookup("ROUTES_API_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
        };

        debug!(
            gemini_model = gemini.model.as_str(),
            max_history = gemini.max_history,
            min_rating = maps.min_rating,
            max_results = maps.max_results,
            "Configuration resolved from environment"
        );

        Ok(Self { gemini, maps })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
