use std::fmt;
use std::str::FromStr;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use concierge_core::config::ProvidersConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::Provider;

use crate::http::{get_json, required_str};

/// Italian sign names and their English API identifiers.
pub const ZODIAC_SIGNS: [(&str, &str); 12] = [
    ("ariete", "aries"),
    ("toro", "taurus"),
    ("gemelli", "gemini"),
    ("cancro", "cancer"),
    ("leone", "leo"),
    ("vergine", "virgo"),
    ("bilancia", "libra"),
    ("scorpione", "scorpio"),
    ("sagittario", "sagittarius"),
    ("capricorno", "capricorn"),
    ("acquario", "aquarius"),
    ("pesci", "pisces"),
];

/// English identifier for an Italian sign name, case-insensitive.
pub fn sign_to_english(italian: &str) -> Option<&'static str> {
    let needle = italian.trim().to_lowercase();
    ZODIAC_SIGNS
        .iter()
        .find(|(it, _)| *it == needle)
        .map(|(_, en)| *en)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
        }
    }

    /// Italian phrase used in the reply heading.
    pub fn label(&self) -> &'static str {
        match self {
            Period::Daily => "di oggi",
            Period::Weekly => "della settimana",
            Period::Monthly => "del mese",
            Period::Yearly => "dell'anno",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "oggi" | "giorno" | "giornaliero" | "domani" | "ieri" => Ok(Period::Daily),
            "weekly" | "settimana" | "settimanale" => Ok(Period::Weekly),
            "monthly" | "mese" | "mensile" => Ok(Period::Monthly),
            "yearly" | "anno" | "annuale" => Ok(Period::Yearly),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

/// Horoscope text from a horoscope-app-api compatible service.
///
/// Input: `{"sign": "aries", "period": "daily"}` (English sign).
/// Output: `{"date": str, "horoscope": str}`.
pub struct HoroscopeProvider {
    http: Client,
    url: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "horoscope")]
    horoscope_data: String,
}

impl HoroscopeProvider {
    pub fn new(http: Client, config: &ProvidersConfig) -> Self {
        Self {
            http,
            url: config.horoscope_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, sign: &str, period: Period) -> Result<Value> {
        let mut query = vec![("sign", sign)];
        if period == Period::Daily {
            query.push(("day", "TODAY"));
        }
        let req = self
            .http
            .get(format!("{}/{}", self.url, period))
            .query(&query);
        let body = get_json(self.name(), req).await?;

        let parsed: ApiResponse = serde_json::from_value(body)
            .map_err(|e| ConciergeError::provider(self.name(), format!("unexpected response: {}", e)))?;
        match parsed.data {
            Some(data) if parsed.success && !data.horoscope_data.is_empty() => Ok(json!({
                "date": data.date.unwrap_or_default(),
                "horoscope": data.horoscope_data,
            })),
            _ => Err(ConciergeError::provider(self.name(), "Formato risposta API non valido")),
        }
    }
}

impl Provider for HoroscopeProvider {
    fn name(&self) -> &str {
        "horoscope"
    }

    fn description(&self) -> &str {
        "Daily, weekly, monthly or yearly horoscope for a sign"
    }

    fn fetch(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let sign = required_str(&input, "sign")?.to_lowercase();
            if !ZODIAC_SIGNS.iter().any(|(_, en)| *en == sign) {
                return Err(ConciergeError::ProviderInput(format!("unknown sign '{}'", sign)));
            }
            let period = match input.get("period").and_then(Value::as_str) {
                Some(p) => p.parse::<Period>().map_err(ConciergeError::ProviderInput)?,
                None => Period::Daily,
            };
            self.get(&sign, period).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_sign_lookup() {
        assert_eq!(sign_to_english("Scorpione"), Some("scorpio"));
        assert_eq!(sign_to_english(" pesci "), Some("pisces"));
        assert_eq!(sign_to_english("ofiuco"), None);
    }

    #[test]
    fn test_period_parsing_and_labels() {
        assert_eq!("settimanale".parse::<Period>(), Ok(Period::Weekly));
        assert_eq!("YEARLY".parse::<Period>(), Ok(Period::Yearly));
        assert!("secolo".parse::<Period>().is_err());
        assert_eq!(Period::Monthly.label(), "del mese");
    }

    #[tokio::test]
    async fn test_daily_request_adds_day_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/daily"))
            .and(query_param("sign", "leo"))
            .and(query_param("day", "TODAY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"date": "Jun 1, 2024", "horoscope_data": "Great day."},
                "success": true,
                "status": 200
            })))
            .mount(&server)
            .await;

        let config = ProvidersConfig {
            horoscope_url: server.uri(),
            ..Default::default()
        };
        let provider = HoroscopeProvider::new(Client::new(), &config);
        let out = provider
            .fetch(json!({"sign": "leo", "period": "daily"}))
            .await
            .unwrap();
        assert_eq!(out["horoscope"], "Great day.");
        assert_eq!(out["date"], "Jun 1, 2024");
    }

    #[tokio::test]
    async fn test_unsuccessful_payload_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weekly"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let config = ProvidersConfig {
            horoscope_url: server.uri(),
            ..Default::default()
        };
        let provider = HoroscopeProvider::new(Client::new(), &config);
        let err = provider
            .fetch(json!({"sign": "virgo", "period": "weekly"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConciergeError::Provider { .. }));
    }
}
