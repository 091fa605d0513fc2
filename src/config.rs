//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file). The root section uses unprefixed names; the JWT, AI and
//! weather sections are read with `JWT_`, `AI_` and `WEATHER_` prefixes.

use serde::Deserialize;

use crate::snowflake::MAX_MACHINE_ID;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root application configuration.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8000
/// - `SESSION_CHECK` (optional): require the cached session for every access token
/// - `CORS_ALLOWED_ORIGINS` (optional): comma separated origins, `*` for any
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_machine_id")]
    pub snowflake_machine_id: i64,

    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    #[serde(default)]
    pub cors_allowed_origins: String,

    #[serde(default)]
    pub cors_allow_credentials: bool,

    #[serde(default = "default_true")]
    pub session_check: bool,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(skip)]
    pub jwt: JwtConfig,

    #[serde(skip)]
    pub ai: AiConfig,
}

/// Token signing settings (`JWT_*`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Access token lifetime in seconds. Also the session TTL in the cache.
    #[serde(default = "default_access_duration")]
    pub access_token_duration: u64,

    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_duration")]
    pub refresh_token_duration: u64,
}

/// Chat provider settings (`AI_*`).
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_ai_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(skip)]
    pub weather: WeatherConfig,
}

/// Weather skill settings (`WEATHER_*`).
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_weather_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_weather_base_url")]
    pub base_url: String,

    #[serde(default = "default_geo_base_url")]
    pub geo_base_url: String,

    #[serde(default = "default_weather_timeout")]
    pub timeout: u64,

    /// How long a weather report stays cached, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_max_connections() -> u32 {
    10
}

fn default_machine_id() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

fn default_max_page_size() -> i64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_issuer() -> String {
    "content-hub".to_string()
}

fn default_access_duration() -> u64 {
    7200
}

fn default_refresh_duration() -> u64 {
    604_800
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when the user asks for live data such as the weather.".to_string()
}

fn default_weather_provider() -> String {
    "qweather".to_string()
}

fn default_weather_base_url() -> String {
    "https://devapi.qweather.com/v7".to_string()
}

fn default_geo_base_url() -> String {
    "https://geoapi.qweather.com/v2".to_string()
}

fn default_weather_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    600
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            base_url: default_ai_base_url(),
            timeout: default_ai_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            weather: WeatherConfig::default(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_weather_provider(),
            api_key: String::new(),
            base_url: default_weather_base_url(),
            geo_base_url: default_geo_base_url(),
            timeout: default_weather_timeout(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads every section and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Values cannot be parsed into expected types
    /// - Values are out of range (see [`Config::validate`])
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = envy::from_env::<Config>()?;
        config.jwt = envy::prefixed("JWT_").from_env::<JwtConfig>()?;
        config.ai = envy::prefixed("AI_").from_env::<AiConfig>()?;
        config.ai.weather = envy::prefixed("WEATHER_").from_env::<WeatherConfig>()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret_key.is_empty() {
            return Err(ConfigError::Invalid(
                "JWT_SECRET_KEY must not be empty".to_string(),
            ));
        }

        if !(0..=MAX_MACHINE_ID).contains(&self.snowflake_machine_id) {
            return Err(ConfigError::Invalid(format!(
                "SNOWFLAKE_MACHINE_ID must be between 0 and {MAX_MACHINE_ID}"
            )));
        }

        if self.default_page_size < 1 || self.max_page_size < 1 {
            return Err(ConfigError::Invalid(
                "page sizes must be positive".to_string(),
            ));
        }

        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(
                "DEFAULT_PAGE_SIZE must not exceed MAX_PAGE_SIZE".to_string(),
            ));
        }

        Ok(())
    }

    /// Origins listed in `CORS_ALLOWED_ORIGINS`, trimmed, empties dropped.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by unit tests. Never touches the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/content_hub_test".to_string(),
            server_port: default_port(),
            database_max_connections: 1,
            snowflake_machine_id: 1,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            cors_allowed_origins: String::new(),
            cors_allow_credentials: false,
            session_check: true,
            log_format: default_log_format(),
            jwt: JwtConfig {
                secret_key: "test-secret".to_string(),
                issuer: default_issuer(),
                access_token_duration: default_access_duration(),
                refresh_token_duration: default_refresh_duration(),
            },
            ai: AiConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(Config::for_tests().validate().is_ok());
    }

    #[test]
    fn empty_jwt_secret_is_rejected() {
        let mut config = Config::for_tests();
        config.jwt.secret_key.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn machine_id_out_of_range_is_rejected() {
        let mut config = Config::for_tests();
        config.snowflake_machine_id = 1024;
        assert!(config.validate().is_err());

        config.snowflake_machine_id = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_page_size_above_max_is_rejected() {
        let mut config = Config::for_tests();
        config.default_page_size = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cors_origins_are_trimmed() {
        let mut config = Config::for_tests();
        config.cors_allowed_origins = " https://a.example , ,https://b.example".to_string();
        assert_eq!(
            config.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
