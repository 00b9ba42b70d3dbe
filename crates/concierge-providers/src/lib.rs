//! Data providers consulted by the agents after extraction.
//!
//! Each provider implements [`concierge_core::traits::Provider`]: JSON object
//! in, JSON object out, failures as `ConciergeError::Provider`.

pub mod calculator;
pub mod encyclopedia;
pub mod forecast;
pub mod geocode;
pub mod horoscope;
mod http;

use std::sync::Arc;

use concierge_core::config::ProvidersConfig;
use concierge_core::traits::Provider;

pub use calculator::CalculatorProvider;
pub use encyclopedia::EncyclopediaProvider;
pub use forecast::ForecastProvider;
pub use geocode::GeocodeProvider;
pub use horoscope::HoroscopeProvider;

/// Every provider the agents need, behind trait objects so tests can swap them.
#[derive(Clone)]
pub struct ProviderSet {
    pub geocode: Arc<dyn Provider>,
    pub forecast: Arc<dyn Provider>,
    pub horoscope: Arc<dyn Provider>,
    pub encyclopedia: Arc<dyn Provider>,
    pub calculator: Arc<dyn Provider>,
}

impl ProviderSet {
    /// Build the live HTTP-backed providers from config.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let client = http::build_client(config);
        Self {
            geocode: Arc::new(GeocodeProvider::new(client.clone(), config)),
            forecast: Arc::new(ForecastProvider::new(client.clone(), config)),
            horoscope: Arc::new(HoroscopeProvider::new(client.clone(), config)),
            encyclopedia: Arc::new(EncyclopediaProvider::new(client, config)),
            calculator: Arc::new(CalculatorProvider),
        }
    }
}
