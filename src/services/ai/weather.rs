//! `get_weather` skill backed by QWeather.
//!
//! Lookups go through the cache: reports live at `weather:{location}` for
//! `WEATHER_CACHE_TTL` seconds, resolved city ids at `city_id:{location}`
//! without expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::skill::{Skill, SkillError};
use crate::cache::Cache;
use crate::config::WeatherConfig;

pub const SKILL_NAME: &str = "get_weather";

/// Normalized weather report returned to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: String,
    pub feels_like: String,
    pub humidity: String,
    pub weather: String,
    pub wind_speed: String,
    pub update_time: String,
}

#[derive(Deserialize)]
struct NowResponse {
    code: String,
    #[serde(default, rename = "updateTime")]
    update_time: String,
    #[serde(default)]
    now: Option<Now>,
}

#[derive(Deserialize)]
struct Now {
    temp: String,
    #[serde(rename = "feelsLike")]
    feels_like: String,
    text: String,
    humidity: String,
    #[serde(rename = "windSpeed")]
    wind_speed: String,
}

#[derive(Deserialize)]
struct CityLookupResponse {
    code: String,
    #[serde(default)]
    location: Vec<City>,
}

#[derive(Deserialize)]
struct City {
    id: String,
}

/// Error body of the newer QWeather API versions.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    status: u16,
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

pub struct WeatherSkill {
    config: WeatherConfig,
    cache: Arc<dyn Cache>,
    http: reqwest::Client,
}

impl WeatherSkill {
    pub fn new(config: WeatherConfig, cache: Arc<dyn Cache>) -> Result<Self, SkillError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            config,
            cache,
            http,
        })
    }

    async fn report(&self, location: &str) -> Result<WeatherReport, SkillError> {
        let key = format!("weather:{location}");

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                if let Ok(report) = serde_json::from_str::<WeatherReport>(&cached) {
                    tracing::debug!(location, "weather cache hit");
                    return Ok(report);
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "weather cache read failed"),
        }

        let report = match self.config.provider.as_str() {
            "qweather" => self.fetch_qweather(location).await?,
            "openweather" => {
                return Err(SkillError::Unsupported(
                    "openweather provider not implemented yet".to_string(),
                ));
            }
            other => {
                return Err(SkillError::Unsupported(format!(
                    "unsupported weather provider: {other}"
                )));
            }
        };

        if let Ok(serialized) = serde_json::to_string(&report) {
            let ttl = Duration::from_secs(self.config.cache_ttl);
            if let Err(err) = self.cache.set(&key, &serialized, Some(ttl)).await {
                tracing::warn!(error = %err, "weather cache write failed");
            }
        }

        Ok(report)
    }

    async fn fetch_qweather(&self, location: &str) -> Result<WeatherReport, SkillError> {
        let city_id = self.city_id(location).await?;

        let url = format!("{}/weather/now", self.config.base_url.trim_end_matches('/'));
        let body = self
            .get_text(
                &url,
                &[("location", city_id.as_str()), ("key", self.config.api_key.as_str())],
            )
            .await?;

        let parsed: NowResponse = serde_json::from_str(&body).map_err(|e| {
            SkillError::Upstream(format!(
                "failed to parse weather response: {e}, body: {}",
                preview(&body)
            ))
        })?;

        if parsed.code != "200" {
            return Err(SkillError::Upstream(format!(
                "weather provider error: {}",
                describe_code(&parsed.code, location)
            )));
        }

        let now = parsed.now.ok_or_else(|| {
            SkillError::Upstream("weather response has no current conditions".to_string())
        })?;

        Ok(WeatherReport {
            location: location.to_string(),
            temperature: format!("{}°C", now.temp),
            feels_like: format!("{}°C", now.feels_like),
            humidity: format!("{}%", now.humidity),
            weather: now.text,
            wind_speed: format!("{}km/h", now.wind_speed),
            update_time: parsed.update_time,
        })
    }

    async fn city_id(&self, location: &str) -> Result<String, SkillError> {
        let key = format!("city_id:{location}");
        if let Ok(Some(id)) = self.cache.get(&key).await {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let url = format!(
            "{}/city/lookup",
            self.config.geo_base_url.trim_end_matches('/')
        );
        let body = self
            .get_text(
                &url,
                &[("location", location), ("key", self.config.api_key.as_str())],
            )
            .await?;

        let parsed: CityLookupResponse = serde_json::from_str(&body).map_err(|e| {
            SkillError::Upstream(format!(
                "failed to parse city lookup response: {e}, body: {}",
                preview(&body)
            ))
        })?;

        if parsed.code != "200" {
            return Err(SkillError::Upstream(format!(
                "city lookup failed, code: {}",
                parsed.code
            )));
        }

        let id = parsed
            .location
            .into_iter()
            .next()
            .map(|city| city.id)
            .ok_or_else(|| SkillError::Upstream(format!("city not found: {location}")))?;

        if let Err(err) = self.cache.set(&key, &id, None).await {
            tracing::warn!(error = %err, "city id cache write failed");
        }

        Ok(id)
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, SkillError> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(SkillError::Upstream(format!(
                    "weather provider error (HTTP {}): {} - {}",
                    err.error.status, err.error.title, err.error.detail
                )));
            }
            return Err(SkillError::Upstream(format!(
                "weather provider returned HTTP {}: {}",
                status.as_u16(),
                preview(&body)
            )));
        }

        Ok(body)
    }
}

/// Readable message for a QWeather business code.
fn describe_code(code: &str, location: &str) -> String {
    match code {
        "204" => format!("no weather data found for '{location}'"),
        "400" => "invalid request parameters".to_string(),
        "401" => "invalid API key, check the configuration".to_string(),
        "402" => "API call quota exceeded".to_string(),
        "403" => "access denied".to_string(),
        "404" => "data not found".to_string(),
        "429" => "too many requests".to_string(),
        "500" => "weather provider server error".to_string(),
        other => format!("unknown error, code: {other}"),
    }
}

fn preview(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[async_trait]
impl Skill for WeatherSkill {
    fn name(&self) -> &str {
        SKILL_NAME
    }

    fn description(&self) -> &str {
        "Get the current weather for a city, including temperature, humidity and conditions. \
         Accepts city names such as Beijing, Shanghai or Shenzhen."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, e.g. Beijing, Shanghai, Shenzhen"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, SkillError> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SkillError::InvalidParameter("location".to_string()))?;

        let report = self.report(location).await?;
        tracing::info!(skill = SKILL_NAME, location, "weather lookup complete");

        serde_json::to_value(report).map_err(|e| SkillError::Upstream(e.to_string()))
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> WeatherConfig {
        WeatherConfig {
            enabled: true,
            api_key: "wx-key".to_string(),
            base_url: format!("{}/v7", server.uri()),
            geo_base_url: format!("{}/v2", server.uri()),
            ..WeatherConfig::default()
        }
    }

    async fn mount_city(server: &MockServer, location: &str, id: &str) {
        Mock::given(method("GET"))
            .and(path("/v2/city/lookup"))
            .and(query_param("location", location))
            .and(query_param("key", "wx-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "200",
                "location": [{"name": location, "id": id}]
            })))
            .mount(server)
            .await;
    }

    fn now_body(code: &str) -> Value {
        json!({
            "code": code,
            "updateTime": "2024-05-01T10:00+08:00",
            "now": {
                "temp": "21",
                "feelsLike": "20",
                "text": "Sunny",
                "humidity": "40",
                "windSpeed": "12"
            }
        })
    }

    #[tokio::test]
    async fn looks_up_city_then_weather_and_caches_both() {
        let server = MockServer::start().await;
        mount_city(&server, "Beijing", "101010100").await;
        Mock::given(method("GET"))
            .and(path("/v7/weather/now"))
            .and(query_param("location", "101010100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(now_body("200")))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let skill = WeatherSkill::new(config(&server), cache.clone()).unwrap();

        let first = skill.execute(json!({"location": "Beijing"})).await.unwrap();
        assert_eq!(first["temperature"], "21°C");
        assert_eq!(first["humidity"], "40%");
        assert_eq!(first["wind_speed"], "12km/h");
        assert_eq!(first["weather"], "Sunny");

        let second = skill.execute(json!({"location": "Beijing"})).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(
            cache.get("city_id:Beijing").await.unwrap().as_deref(),
            Some("101010100")
        );
        assert!(cache.exists("weather:Beijing").await.unwrap());
    }

    #[tokio::test]
    async fn provider_codes_become_readable_errors() {
        let server = MockServer::start().await;
        mount_city(&server, "Nowhere", "1").await;
        Mock::given(method("GET"))
            .and(path("/v7/weather/now"))
            .respond_with(ResponseTemplate::new(200).set_body_json(now_body("402")))
            .mount(&server)
            .await;

        let skill = WeatherSkill::new(config(&server), Arc::new(MemoryCache::new())).unwrap();
        let err = skill
            .execute(json!({"location": "Nowhere"}))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "weather provider error: API call quota exceeded");
    }

    #[tokio::test]
    async fn http_errors_use_provider_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/city/lookup"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"status": 401, "type": "x", "title": "Unauthorized", "detail": "bad key"}
            })))
            .mount(&server)
            .await;

        let skill = WeatherSkill::new(config(&server), Arc::new(MemoryCache::new())).unwrap();
        let err = skill
            .execute(json!({"location": "Paris"}))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "weather provider error (HTTP 401): Unauthorized - bad key"
        );
    }

    #[tokio::test]
    async fn unknown_city_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/city/lookup"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": "200", "location": []})),
            )
            .mount(&server)
            .await;

        let skill = WeatherSkill::new(config(&server), Arc::new(MemoryCache::new())).unwrap();
        let err = skill.execute(json!({"location": "Atlantis"})).await.unwrap_err();

        assert_eq!(err.to_string(), "city not found: Atlantis");
    }

    #[tokio::test]
    async fn missing_location_is_rejected() {
        let skill = WeatherSkill::new(WeatherConfig::default(), Arc::new(MemoryCache::new())).unwrap();

        assert!(matches!(
            skill.execute(json!({"location": "  "})).await,
            Err(SkillError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn other_providers_are_unsupported() {
        let mut config = WeatherConfig::default();
        config.provider = "openweather".to_string();
        let skill = WeatherSkill::new(config, Arc::new(MemoryCache::new())).unwrap();

        let err = skill.execute(json!({"location": "Oslo"})).await.unwrap_err();
        assert_eq!(err.to_string(), "openweather provider not implemented yet");
    }

    #[test]
    fn preview_truncates_long_bodies() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(250)), format!("{}...", "x".repeat(200)));
    }
}
