//! Horoscope: extract sign and period, fetch, translate to Italian.

use std::sync::OnceLock;

use serde_json::{json, Map, Value};
use tracing::warn;

use concierge_core::error::Result;
use concierge_core::types::{Domain, MissingSlot};
use concierge_providers::horoscope::{sign_to_english, Period, ZODIAC_SIGNS};

use super::{analysis_failed, capitalize, describe, node, query_of, session_of, AgentDeps};
use crate::graph::{Edge, State, StateUpdate, Workflow, WorkflowBuilder, END};
use crate::nlu::{field_str, DomainSchema, Extraction};
use crate::session::TIME_DESCRIPTION;

const SIGN: &str = "zodiac_sign";
const SIGN_EN: &str = "zodiac_sign_en";
const PERIOD: &str = "time_period";
const TEXT: &str = "horoscope_text";
const DATE: &str = "horoscope_date";

const INVALID_PERIOD: &str =
    "Periodo non valido. Posso fornirti l'oroscopo per: giornaliero, settimanale, mensile o annuale.";
const TRANSLATOR_SYSTEM: &str =
    "Sei un traduttore esperto dall'inglese all'italiano, specializzato in oroscopi.";

fn sign_names() -> impl Iterator<Item = &'static str> {
    ZODIAC_SIGNS.iter().map(|(it, _)| *it)
}

fn schema() -> &'static DomainSchema {
    static SCHEMA: OnceLock<DomainSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let signs = sign_names().collect::<Vec<_>>().join(", ");
        let template = r#"Analizza questa query in italiano ed estrai il segno zodiacale e l'indicazione temporale.

Segni zodiacali validi: {signs}

Periodi temporali supportati:
- "oggi", "domani", "giornaliero" -> daily
- "settimana", "settimanale" -> weekly
- "mese", "mensile" -> monthly
- "anno", "annuale" -> yearly
- Se non specificato, assume "daily"

Query: {query}

Rispondi in JSON con questo formato esatto:
{
    "zodiac_sign": "nome segno in italiano (minuscolo)",
    "time_period": "daily|weekly|monthly|yearly",
    "time_description": "descrizione breve (es. 'di oggi', 'della settimana', 'del mese', 'dell'anno')",
    "validity": "VALIDO" o "INVALIDO"
}

Se non trovi un segno zodiacale rispondi con "zodiac_sign": "NESSUNO"
Se il periodo non è riconoscibile rispondi con "time_period": "daily""#
            .replace("{signs}", &signs);
        DomainSchema::new(
            "horoscope",
            "Sei un assistente che estrae segni zodiacali e periodi temporali da testo italiano. Rispondi sempre in JSON.",
            template,
        )
    })
}

fn no_sign_message() -> String {
    let examples = sign_names().take(3).collect::<Vec<_>>().join(", ");
    format!(
        "Non ho riconosciuto un segno zodiacale nella tua richiesta. Puoi dirmi per quale segno vuoi l'oroscopo? (es. {}, ...)",
        examples
    )
}

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("horoscope")
        .node("extract", node(deps, extract))
        .node("fetch", node(deps, fetch))
        .node("translate", node(deps, translate))
        .edge(Edge::when_set("extract", "fetch", SIGN_EN))
        .edge(Edge::always("extract", END))
        .edge(Edge::when_set("fetch", "translate", TEXT))
        .edge(Edge::always("fetch", END))
        .entry("extract")
        .compile()
}

async fn extract(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    let fields = match deps.extractor.extract(&query, schema()).await {
        Extraction::Fields(fields) => fields,
        Extraction::Invalid { .. } => {
            return StateUpdate::new()
                .clear(SIGN_EN)
                .say(analysis_failed("risposta non interpretabile"))
        }
        Extraction::Unavailable(reason) => {
            return StateUpdate::new().clear(SIGN_EN).say(analysis_failed(&reason))
        }
    };

    let sign = field_str(&fields, SIGN).unwrap_or_default().to_lowercase();
    let Some(sign_en) = sign_to_english(&sign) else {
        let mut partial = Map::new();
        if let Some(time) = field_str(&fields, TIME_DESCRIPTION) {
            partial.insert(TIME_DESCRIPTION.into(), Value::from(time));
        }
        deps.store.save_pending(
            &session_of(&state),
            Domain::Horoscope,
            query.as_str(),
            MissingSlot::ZodiacSign,
            partial,
        );
        return StateUpdate::new().clear(SIGN_EN).say(no_sign_message());
    };

    let Ok(period) = field_str(&fields, PERIOD).unwrap_or("daily").parse::<Period>() else {
        return StateUpdate::new().clear(SIGN_EN).say(INVALID_PERIOD);
    };

    let description = field_str(&fields, TIME_DESCRIPTION).unwrap_or(period.label());
    StateUpdate::new()
        .set(SIGN, sign.as_str())
        .set(SIGN_EN, sign_en)
        .set(PERIOD, period.as_str())
        .say(format!(
            "Ho identificato: segno {}, oroscopo {}. Sto recuperando i dati...",
            capitalize(&sign),
            description
        ))
}

async fn fetch(deps: AgentDeps, state: State) -> StateUpdate {
    let sign_en = state.get_str(SIGN_EN).unwrap_or_default();
    let period = state.get_str(PERIOD).unwrap_or("daily");

    match deps
        .providers
        .horoscope
        .fetch(json!({ "sign": sign_en, "period": period }))
        .await
    {
        Ok(data) => {
            let text = data.get("horoscope").and_then(Value::as_str).unwrap_or_default();
            let date = data.get("date").and_then(Value::as_str).unwrap_or_default();
            StateUpdate::new().set(TEXT, text).set(DATE, date)
        }
        Err(e) => {
            warn!(sign = sign_en, error = %e, "Horoscope fetch failed");
            StateUpdate::new().clear(TEXT).say(format!(
                "Errore nel recupero dei dati dall'API Horoscope: {}",
                describe(&e)
            ))
        }
    }
}

async fn translate(deps: AgentDeps, state: State) -> StateUpdate {
    let english = state.get_str(TEXT).unwrap_or_default();
    let sign = capitalize(state.get_str(SIGN).unwrap_or_default());
    let period = state
        .get_str(PERIOD)
        .and_then(|p| p.parse::<Period>().ok())
        .unwrap_or(Period::Daily);

    let prompt = format!(
        "Traduci questo oroscopo dall'inglese all'italiano in modo fluente e naturale:\n\n{}\n\nMantieni lo stesso tono e stile, ma rendilo scorrevole in italiano.",
        english
    );
    let text = match deps
        .completion
        .with_temperature(0.3)
        .complete(TRANSLATOR_SYSTEM, &prompt)
        .await
    {
        Ok(italian) if !italian.is_empty() => italian,
        Ok(_) => english.to_string(),
        Err(e) => {
            warn!(error = %e, "Horoscope translation failed, keeping the original text");
            english.to_string()
        }
    };

    let mut message = format!("🔮 Oroscopo {} per {}\n\n{}", period.label(), sign, text);
    if let Some(date) = state.get_str(DATE) {
        message.push_str(&format!("\n\n📅 Periodo: {}", date));
    }
    StateUpdate::new().say(message)
}
