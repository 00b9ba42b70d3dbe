//! Calculator: extract an expression, evaluate it locally, format the result.

use std::sync::OnceLock;

use serde_json::{json, Value};
use tracing::{debug, warn};

use concierge_core::error::Result;
use concierge_providers::calculator::CalcType;

use super::{analysis_failed, describe, node, query_of, AgentDeps};
use crate::graph::{Edge, State, StateUpdate, Workflow, WorkflowBuilder, END};
use crate::nlu::{field_bool, field_str, DomainSchema, Extraction};

const EXPRESSION: &str = "expression";
const KIND: &str = "calculation_type";
const RESULT: &str = "result";

const NOT_MATH: &str =
    "Non riesco a identificare un'operazione matematica valida nella tua richiesta.";

fn schema() -> &'static DomainSchema {
    static SCHEMA: OnceLock<DomainSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        DomainSchema::new(
            "calculator",
            "Sei un esperto nell'estrarre espressioni matematiche da testo in linguaggio naturale.",
            r#"Analizza questa query in italiano ed estrai l'operazione matematica richiesta.

Tipi di operazioni supportate:
1. ARITHMETIC - Calcoli aritmetici: "quanto fa 2+2", "calcola 15*23", "(5+3)*2"
2. PERCENTAGE - Percentuali: "il 20% di 100", "quanto è il 15% di sconto su 50"
3. CONVERSION - Conversioni unità: "converti 100 km in miglia", "quanti piedi sono 10 metri"
4. EQUATION - Equazioni: "risolvi 2x+5=13", "trova x: x^2=16"

Query: {query}

Rispondi in JSON con questo formato:
{
    "type": "ARITHMETIC|PERCENTAGE|CONVERSION|EQUATION",
    "expression": "espressione matematica da valutare",
    "description": "breve descrizione di cosa fare",
    "valid": true o false
}

Esempi:
- "quanto fa 2+2" -> {"type": "ARITHMETIC", "expression": "2+2", "valid": true}
- "il 20% di 100" -> {"type": "PERCENTAGE", "expression": "100 * 0.20", "valid": true}
- "converti 10 km in miglia" -> {"type": "CONVERSION", "expression": "10 km to mi", "valid": true}
- "25 gradi celsius in fahrenheit" -> {"type": "CONVERSION", "expression": "25 c to f", "valid": true}
- "100 fahrenheit in celsius" -> {"type": "CONVERSION", "expression": "100 f to c", "valid": true}
- "risolvi 2x+5=13" -> {"type": "EQUATION", "expression": "2*x+5-13", "valid": true}

Per le conversioni usa abbreviazioni: km, mi, m, ft, cm, in, kg, lb, g, oz, l, gal, c, f

Se non è una richiesta matematica, metti "valid": false"#,
        )
    })
}

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("calculator")
        .node("extract", node(deps, extract))
        .node("calculate", node(deps, calculate))
        .node("format", node(deps, format_result))
        .edge(Edge::when_set("extract", "calculate", EXPRESSION))
        .edge(Edge::always("extract", END))
        .edge(Edge::when_set("calculate", "format", RESULT))
        .edge(Edge::always("calculate", END))
        .entry("extract")
        .compile()
}

async fn extract(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    let fields = match deps.extractor.extract(&query, schema()).await {
        Extraction::Fields(fields) => fields,
        Extraction::Invalid { .. } => {
            return StateUpdate::new()
                .clear(EXPRESSION)
                .say(analysis_failed("risposta non interpretabile"))
        }
        Extraction::Unavailable(reason) => {
            return StateUpdate::new().clear(EXPRESSION).say(analysis_failed(&reason))
        }
    };

    let expression = field_str(&fields, EXPRESSION);
    let (true, Some(expression)) = (field_bool(&fields, "valid").unwrap_or(false), expression)
    else {
        return StateUpdate::new().clear(EXPRESSION).say(NOT_MATH);
    };

    let kind = field_str(&fields, "type")
        .and_then(|t| t.parse::<CalcType>().ok())
        .unwrap_or(CalcType::Arithmetic);
    let description = field_str(&fields, "description").unwrap_or(expression);
    debug!(%kind, expression, "Calculation extracted");

    StateUpdate::new()
        .set(EXPRESSION, expression)
        .set(KIND, kind.as_str())
        .say(format!("Ho identificato: {}. Calcolo in corso...", description))
}

async fn calculate(deps: AgentDeps, state: State) -> StateUpdate {
    let expression = state.get_str(EXPRESSION).unwrap_or_default();
    let kind = state.get_str(KIND).unwrap_or(CalcType::Arithmetic.as_str());

    match deps
        .providers
        .calculator
        .fetch(json!({ "type": kind, "expression": expression }))
        .await
    {
        Ok(out) => match out.get(RESULT).and_then(Value::as_str) {
            Some(result) => StateUpdate::new().set(RESULT, result),
            None => StateUpdate::new().clear(RESULT),
        },
        Err(e) => {
            warn!(expression, error = %e, "Calculation failed");
            StateUpdate::new()
                .clear(RESULT)
                .say(format!("Errore nel calcolo: {}", describe(&e)))
        }
    }
}

async fn format_result(_deps: AgentDeps, state: State) -> StateUpdate {
    let kind = state
        .get_str(KIND)
        .and_then(|k| k.parse::<CalcType>().ok())
        .unwrap_or(CalcType::Arithmetic);
    let result = state.get_str(RESULT).unwrap_or_default();
    StateUpdate::new().say(format!("{} Risultato: {}", kind.marker(), result))
}
