use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use concierge_core::config::ProvidersConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::Provider;

use crate::http::{get_json, required_f64};

/// Days of forecast requested; offsets 0..=7 are answerable.
pub const FORECAST_DAYS: u32 = 8;

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,\
precipitation_probability_max,windspeed_10m_max,weathercode";

/// Daily forecast from an Open-Meteo-compatible endpoint.
///
/// Input: `{"latitude", "longitude", "days_offset"}`.
/// Output: one day's figures plus an Italian `condition` description.
pub struct ForecastProvider {
    http: Client,
    url: String,
    timezone: String,
}

#[derive(Deserialize, Debug)]
struct ForecastResponse {
    daily: Daily,
}

#[derive(Deserialize, Debug)]
struct Daily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<i64>>,
}

/// Italian description of a WMO weather interpretation code.
pub fn describe_weather_code(code: i64) -> String {
    let text = match code {
        0 => "Cielo sereno",
        1 => "Prevalentemente sereno",
        2 => "Parzialmente nuvoloso",
        3 => "Nuvoloso",
        45 => "Nebbia",
        48 => "Nebbia con brina",
        51 => "Pioviggine leggera",
        53 => "Pioviggine moderata",
        55 => "Pioviggine intensa",
        61 => "Pioggia leggera",
        63 => "Pioggia moderata",
        65 => "Pioggia forte",
        71 => "Neve leggera",
        73 => "Neve moderata",
        75 => "Neve intensa",
        80 => "Rovesci leggeri",
        81 => "Rovesci moderati",
        82 => "Rovesci violenti",
        95 => "Temporale",
        96 => "Temporale con grandine leggera",
        99 => "Temporale con grandine",
        other => return format!("Codice {}", other),
    };
    text.to_string()
}

fn at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

impl Daily {
    fn day(&self, offset: usize) -> Option<Value> {
        let code = at(&self.weathercode, offset)?;
        Some(json!({
            "date": self.time.get(offset),
            "temperature_max": at(&self.temperature_2m_max, offset)?,
            "temperature_min": at(&self.temperature_2m_min, offset)?,
            "precipitation": at(&self.precipitation_sum, offset).unwrap_or(0.0),
            "precipitation_probability": at(&self.precipitation_probability_max, offset).unwrap_or(0.0),
            "windspeed": at(&self.windspeed_10m_max, offset).unwrap_or(0.0),
            "weathercode": code,
            "condition": describe_weather_code(code),
        }))
    }
}

impl ForecastProvider {
    pub fn new(http: Client, config: &ProvidersConfig) -> Self {
        Self {
            http,
            url: config.forecast_url.clone(),
            timezone: config.forecast_timezone.clone(),
        }
    }

    async fn forecast(&self, latitude: f64, longitude: f64, offset: usize) -> Result<Value> {
        let req = self.http.get(&self.url).query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", self.timezone.clone()),
            ("forecast_days", FORECAST_DAYS.to_string()),
        ]);
        let body = get_json(self.name(), req).await?;
        let parsed: ForecastResponse = serde_json::from_value(body)
            .map_err(|e| ConciergeError::provider(self.name(), format!("unexpected response: {}", e)))?;

        parsed.daily.day(offset).ok_or_else(|| {
            ConciergeError::provider(self.name(), "Dati meteo non disponibili per il giorno richiesto.")
        })
    }
}

impl Provider for ForecastProvider {
    fn name(&self) -> &str {
        "forecast"
    }

    fn description(&self) -> &str {
        "Daily weather forecast for a coordinate pair"
    }

    fn fetch(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let latitude = required_f64(&input, "latitude")?;
            let longitude = required_f64(&input, "longitude")?;
            let offset = input.get("days_offset").and_then(Value::as_u64).unwrap_or(0);
            if offset >= FORECAST_DAYS as u64 {
                return Err(ConciergeError::ProviderInput(format!(
                    "days_offset {} outside 0..{}",
                    offset, FORECAST_DAYS
                )));
            }
            self.forecast(latitude, longitude, offset as usize).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_body() -> Value {
        json!({
            "daily": {
                "time": ["2024-06-01", "2024-06-02"],
                "temperature_2m_max": [28.4, 26.1],
                "temperature_2m_min": [17.0, 16.2],
                "precipitation_sum": [0.0, 3.2],
                "precipitation_probability_max": [5, 70],
                "windspeed_10m_max": [11.3, 18.0],
                "weathercode": [1, 61]
            }
        })
    }

    #[test]
    fn test_weather_codes() {
        assert_eq!(describe_weather_code(0), "Cielo sereno");
        assert_eq!(describe_weather_code(99), "Temporale con grandine");
        assert_eq!(describe_weather_code(42), "Codice 42");
    }

    #[tokio::test]
    async fn test_forecast_selects_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("timezone", "Europe/Rome"))
            .and(query_param("forecast_days", "8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body()))
            .mount(&server)
            .await;

        let config = ProvidersConfig {
            forecast_url: server.uri(),
            ..Default::default()
        };
        let provider = ForecastProvider::new(Client::new(), &config);
        let out = provider
            .fetch(json!({"latitude": 45.46, "longitude": 9.19, "days_offset": 1}))
            .await
            .unwrap();

        assert_eq!(out["date"], "2024-06-02");
        assert_eq!(out["condition"], "Pioggia leggera");
        assert_eq!(out["precipitation_probability"], json!(70.0));
    }

    #[tokio::test]
    async fn test_forecast_missing_day_and_bad_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body()))
            .mount(&server)
            .await;
        let config = ProvidersConfig {
            forecast_url: server.uri(),
            ..Default::default()
        };
        let provider = ForecastProvider::new(Client::new(), &config);

        let err = provider
            .fetch(json!({"latitude": 1.0, "longitude": 2.0, "days_offset": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Provider { .. }));

        let err = provider
            .fetch(json!({"latitude": 1.0, "longitude": 2.0, "days_offset": 9}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::ProviderInput(_)));
    }
}
