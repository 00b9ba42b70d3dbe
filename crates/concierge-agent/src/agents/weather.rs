//! Weather: extract place and day, geocode, fetch the daily forecast.

use std::sync::OnceLock;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use concierge_core::error::{ConciergeError, Result};
use concierge_core::types::{Domain, MissingSlot};
use concierge_providers::geocode;

use super::{analysis_failed, capitalize, describe, node, query_of, session_of, AgentDeps};
use crate::graph::{Edge, State, StateUpdate, Workflow, WorkflowBuilder, END};
use crate::nlu::{field_i64, field_str, DomainSchema, Extraction};
use crate::session::TIME_DESCRIPTION;

/// Furthest day, counted from today, the forecast covers.
pub const MAX_DAYS_AHEAD: i64 = 7;

const LOCATION: &str = "location";
const DAYS_OFFSET: &str = "days_offset";
const DATE: &str = "date";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

const NO_LOCATION: &str =
    "Non ho riconosciuto una località specifica nella tua richiesta. Puoi indicarmi una città?";
const SEPARATOR: &str = "============================================================";

fn schema() -> &'static DomainSchema {
    static SCHEMA: OnceLock<DomainSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        DomainSchema::new(
            "weather",
            "Sei un assistente che estrae città e date da testo italiano. Rispondi sempre in JSON.",
            r#"Analizza questa query in italiano ed estrai il nome della città e l'indicazione temporale.

Data odierna: {today}

Regole:
- Se non c'è indicazione temporale, assume "oggi"
- Il tempo può essere: "oggi", "domani", "dopodomani", un giorno della settimana (es. martedì), una data specifica
- Calcola i giorni da oggi (0=oggi, 1=domani, 2=dopodomani, etc.)
- Massimo 7 giorni da oggi. Se la data è nel passato o oltre 7 giorni, rispondi "INVALIDO"
- Giorni della settimana vanno calcolati come il prossimo (es. se oggi è martedì e dice "martedì", intende martedì prossimo)

Query: {query}

Rispondi in JSON con questo formato esatto:
{
    "location": "nome città",
    "days_offset": 0-7 (numero di giorni da oggi),
    "time_description": "descrizione breve del tempo (es. 'oggi', 'domani', 'giovedì prossimo')",
    "validity": "VALIDO" o "INVALIDO"
}

Se non trovi una città rispondi con "location": "NESSUNA"
Se il tempo è invalido rispondi con "validity": "INVALIDO""#,
        )
    })
}

/// Human label for a day offset.
pub fn day_label(offset: i64) -> String {
    match offset {
        0 => "oggi".into(),
        1 => "domani".into(),
        2 => "dopodomani".into(),
        n => format!("tra {} giorni", n),
    }
}

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("weather")
        .node("extract", node(deps, extract))
        .node("geocode", node(deps, locate))
        .node("forecast", node(deps, forecast))
        .edge(Edge::when_set("extract", "geocode", LOCATION))
        .edge(Edge::always("extract", END))
        .edge(Edge::when_set("geocode", "forecast", LATITUDE))
        .edge(Edge::always("geocode", END))
        .entry("extract")
        .compile()
}

async fn extract(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    let fields = match deps.extractor.extract(&query, schema()).await {
        Extraction::Fields(fields) => fields,
        Extraction::Invalid { .. } => {
            return StateUpdate::new()
                .clear(LOCATION)
                .say(analysis_failed("risposta non interpretabile"))
        }
        Extraction::Unavailable(reason) => {
            return StateUpdate::new().clear(LOCATION).say(analysis_failed(&reason))
        }
    };

    let time_description = field_str(&fields, TIME_DESCRIPTION).unwrap_or("oggi");
    let location = field_str(&fields, LOCATION).filter(|l| !l.eq_ignore_ascii_case("NESSUNA"));
    let Some(location) = location else {
        let mut partial = Map::new();
        partial.insert(TIME_DESCRIPTION.into(), Value::from(time_description));
        deps.store.save_pending(
            &session_of(&state),
            Domain::Weather,
            query.as_str(),
            MissingSlot::Location,
            partial,
        );
        return StateUpdate::new().clear(LOCATION).say(NO_LOCATION);
    };

    let valid = field_str(&fields, "validity").is_some_and(|v| v.eq_ignore_ascii_case("VALIDO"));
    let offset = field_i64(&fields, DAYS_OFFSET).unwrap_or(0);
    if !valid || !(0..=MAX_DAYS_AHEAD).contains(&offset) {
        info!(location, offset, "Weather request outside the forecast window");
        return StateUpdate::new().clear(LOCATION).clear(DAYS_OFFSET).say(format!(
            "Scusa, posso fornire il meteo solo per i prossimi 7 giorni da oggi, non nel passato. {} quale giorno?",
            location
        ));
    }

    let date = (deps.clock.now() + chrono::Duration::days(offset))
        .format("%d/%m/%Y")
        .to_string();
    StateUpdate::new()
        .set(LOCATION, location)
        .set(DAYS_OFFSET, offset)
        .set(DATE, date)
        .say(format!(
            "Ho identificato: città {}, meteo per {}. Sto recuperando i dati...",
            location,
            day_label(offset)
        ))
}

async fn locate(deps: AgentDeps, state: State) -> StateUpdate {
    let location = state.get_str(LOCATION).unwrap_or_default();
    match deps.providers.geocode.fetch(json!({ "location": location })).await {
        Ok(place) => {
            let (Some(lat), Some(lon)) = (
                place.get(LATITUDE).and_then(Value::as_f64),
                place.get(LONGITUDE).and_then(Value::as_f64),
            ) else {
                return StateUpdate::new()
                    .clear(LATITUDE)
                    .say(format!("Errore nel recupero delle coordinate: risposta incompleta per {}", location));
            };
            StateUpdate::new()
                .set(LATITUDE, lat)
                .set(LONGITUDE, lon)
                .say(format!("Coordinate trovate: {:.4}°N, {:.4}°E", lat, lon))
        }
        Err(ConciergeError::Provider { message, .. }) if message.starts_with(geocode::NOT_FOUND) => {
            StateUpdate::new().clear(LATITUDE).say(format!(
                "Non riesco a trovare le coordinate per {}. Verifica il nome della città.",
                location
            ))
        }
        Err(e) => {
            warn!(location, error = %e, "Geocoding failed");
            StateUpdate::new()
                .clear(LATITUDE)
                .say(format!("Errore nel recupero delle coordinate: {}", describe(&e)))
        }
    }
}

async fn forecast(deps: AgentDeps, state: State) -> StateUpdate {
    let location = state.get_str(LOCATION).unwrap_or_default();
    let (Some(lat), Some(lon)) = (state.get_f64(LATITUDE), state.get_f64(LONGITUDE)) else {
        return StateUpdate::new().say("Non posso recuperare i dati meteo senza coordinate valide.");
    };
    let offset = state.get_i64(DAYS_OFFSET).unwrap_or(0);

    let input = json!({ "latitude": lat, "longitude": lon, "days_offset": offset });
    match deps.providers.forecast.fetch(input).await {
        Ok(day) => {
            let date = state.get_str(DATE).unwrap_or_default();
            StateUpdate::new()
                .set("forecast", day.clone())
                .say(format_report(location, offset, date, lat, lon, &day))
        }
        Err(e) => {
            warn!(location, error = %e, "Forecast failed");
            StateUpdate::new().clear("forecast").say(format!(
                "Scusa, non riesco a recuperare i dati meteo per {}. Errore: {}",
                location,
                describe(&e)
            ))
        }
    }
}

fn format_report(location: &str, offset: i64, date: &str, lat: f64, lon: f64, day: &Value) -> String {
    let num = |key: &str| day.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    let condition = day.get("condition").and_then(Value::as_str).unwrap_or("n/d");

    let mut out = String::new();
    out.push_str(SEPARATOR);
    out.push_str(&format!("\nMETEO A {}\n", location.to_uppercase()));
    out.push_str(SEPARATOR);
    out.push_str(&format!("\n{} ({})\n", capitalize(&day_label(offset)), date));
    out.push_str(&format!("Coordinate: {:.4}°N, {:.4}°E\n\n", lat, lon));
    out.push_str(&format!("Condizione: {}\n", condition));
    out.push_str(&format!(
        "Temperatura: Min {:.1}°C / Max {:.1}°C\n",
        num("temperature_min"),
        num("temperature_max")
    ));
    out.push_str(&format!(
        "Precipitazioni: {:.1} mm (probabilità {:.0}%)\n",
        num("precipitation"),
        num("precipitation_probability")
    ));
    out.push_str(&format!("Vento: {:.1} km/h\n", num("windspeed")));
    out.push_str("\nFonte: Open-Meteo API\n");
    out.push_str(SEPARATOR);
    out
}
