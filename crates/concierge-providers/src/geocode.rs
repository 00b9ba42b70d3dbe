use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use concierge_core::config::ProvidersConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::Provider;

use crate::http::{get_json, required_str};

/// Prefix of the error message returned when a place has no match.
pub const NOT_FOUND: &str = "no coordinates found for";

/// Place-name lookup against a Nominatim-compatible search endpoint.
///
/// Input: `{"location": "Milano"}`.
/// Output: `{"latitude": f64, "longitude": f64, "display_name": str}`.
pub struct GeocodeProvider {
    http: Client,
    url: String,
    country_hint: Option<String>,
}

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl GeocodeProvider {
    pub fn new(http: Client, config: &ProvidersConfig) -> Self {
        Self {
            http,
            url: config.geocode_url.clone(),
            country_hint: config.geocode_country_hint.clone(),
        }
    }

    fn query_for(&self, location: &str) -> String {
        match &self.country_hint {
            Some(hint) if !hint.is_empty() => format!("{}, {}", location, hint),
            _ => location.to_string(),
        }
    }

    async fn lookup(&self, location: &str) -> Result<Value> {
        let q = self.query_for(location);
        debug!(query = %q, "Geocoding");
        let req = self
            .http
            .get(&self.url)
            .query(&[("q", q.as_str()), ("format", "json"), ("limit", "1")]);
        let body = get_json(self.name(), req).await?;

        let places: Vec<Place> = serde_json::from_value(body)
            .map_err(|e| ConciergeError::provider(self.name(), format!("unexpected response: {}", e)))?;
        let place = places.into_iter().next().ok_or_else(|| {
            ConciergeError::provider(self.name(), format!("{} {}", NOT_FOUND, location))
        })?;

        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| ConciergeError::provider("geocode", format!("bad coordinate '{}'", s)))
        };
        Ok(json!({
            "latitude": parse(&place.lat)?,
            "longitude": parse(&place.lon)?,
            "display_name": place.display_name,
        }))
    }
}

impl Provider for GeocodeProvider {
    fn name(&self) -> &str {
        "geocode"
    }

    fn description(&self) -> &str {
        "Resolve a place name to latitude/longitude"
    }

    fn fetch(&self, input: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let location = required_str(&input, "location")?.to_string();
            self.lookup(&location).await
        })
    }
}
