//! Encyclopedia: search terms, search, page extract, grounded answer.

use serde_json::{json, Value};
use tracing::{debug, warn};

use concierge_core::error::Result;

use super::{describe, node, query_of, AgentDeps};
use crate::graph::{Edge, State, StateUpdate, Workflow, WorkflowBuilder};

/// Page text passed to the answer prompt is cut at this many characters.
pub const MAX_CONTENT_CHARS: usize = 4000;
/// How many search hits are tried before giving up.
const PAGES_TO_TRY: usize = 3;

const SEARCH_QUERY: &str = "search_query";
const RESULTS: &str = "search_results";
const TITLE: &str = "page_title";
const CONTENT: &str = "page_content";

const NOT_FOUND: &str =
    "Mi dispiace, non ho trovato informazioni su Wikipedia riguardo a questa domanda.";

const TERMS_SYSTEM: &str = "Sei un esperto nell'estrazione di termini di ricerca per Wikipedia.";
const ANSWER_SYSTEM: &str =
    "Sei un assistente esperto che risponde a domande basandoti su contenuti enciclopedici.";

fn terms_prompt(query: &str) -> String {
    format!(
        r#"Analizza la seguente domanda ed estrai i termini chiave da cercare su Wikipedia.

Esempi:
- "Chi era Leonardo da Vinci?" -> "Leonardo da Vinci"
- "Dimmi qualcosa sulla torre di Pisa" -> "Torre di Pisa"
- "Cosa è la fotosintesi clorofilliana?" -> "Fotosintesi clorofilliana"
- "Quando è stata scoperta l'America?" -> "Scoperta dell'America"

Domanda utente: {}

Rispondi SOLO con i termini di ricerca, senza spiegazioni."#,
        query
    )
}

fn answer_prompt(title: &str, content: &str, query: &str) -> String {
    format!(
        r#"Hai a disposizione il contenuto di una pagina Wikipedia. Usa queste informazioni per rispondere alla domanda dell'utente.

CONTENUTO WIKIPEDIA (pagina: "{}"):
{}

DOMANDA UTENTE:
{}

ISTRUZIONI:
- Rispondi alla domanda in modo chiaro e conciso
- Usa SOLO le informazioni presenti nel contenuto Wikipedia fornito
- Non inventare informazioni
- Se la domanda non può essere risposta con il contenuto fornito, dillo chiaramente
- Mantieni un tono informativo ma amichevole
- Rispondi in italiano
- Non menzionare esplicitamente che le informazioni provengono da Wikipedia

Fornisci la tua risposta:"#,
        title, content, query
    )
}

/// Cut `content` to [`MAX_CONTENT_CHARS`] characters, marking the cut.
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => format!("{}... (contenuto troncato)", &content[..idx]),
        None => content.to_string(),
    }
}

pub fn build(deps: &AgentDeps) -> Result<Workflow> {
    WorkflowBuilder::new("encyclopedia")
        .node("extract_search", node(deps, extract_terms))
        .node("search", node(deps, search))
        .node("fetch_content", node(deps, fetch_content))
        .node("generate", node(deps, generate))
        .edge(Edge::always("extract_search", "search"))
        .edge(Edge::when_set("search", "fetch_content", RESULTS))
        .edge(Edge::always("search", "generate"))
        .edge(Edge::always("fetch_content", "generate"))
        .entry("extract_search")
        .compile()
}

async fn extract_terms(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    match deps.completion.complete(TERMS_SYSTEM, &terms_prompt(&query)).await {
        Ok(reply) => {
            let terms = reply.trim().trim_matches('"').trim();
            let terms = if terms.is_empty() { query.as_str() } else { terms };
            StateUpdate::new()
                .set(SEARCH_QUERY, terms)
                .say(format!("Termini di ricerca estratti: '{}'", terms))
        }
        Err(e) => {
            warn!(error = %e, "Search term extraction failed, using the raw query");
            StateUpdate::new()
                .set(SEARCH_QUERY, query.as_str())
                .say(format!("Errore nell'estrazione dei termini: {}", e))
        }
    }
}

async fn search(deps: AgentDeps, state: State) -> StateUpdate {
    let query = query_of(&state);
    let terms = state.get_str(SEARCH_QUERY).unwrap_or(&query);

    match deps.providers.encyclopedia.fetch(json!({ "query": terms })).await {
        Ok(found) => {
            let titles: Vec<String> = found
                .get("results")
                .and_then(Value::as_array)
                .map(|hits| {
                    hits.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            if titles.is_empty() {
                return StateUpdate::new()
                    .clear(RESULTS)
                    .say("Nessun risultato trovato su Wikipedia.");
            }
            let preview = titles.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
            let message = format!("Trovati {} risultati: {}...", titles.len(), preview);
            StateUpdate::new().set(RESULTS, titles).say(message)
        }
        Err(e) => {
            warn!(terms, error = %e, "Encyclopedia search failed");
            StateUpdate::new()
                .clear(RESULTS)
                .say(format!("Errore nella ricerca Wikipedia: {}", describe(&e)))
        }
    }
}

async fn fetch_content(deps: AgentDeps, state: State) -> StateUpdate {
    let titles: Vec<String> = state
        .get(RESULTS)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    for title in titles.iter().take(PAGES_TO_TRY) {
        match deps.providers.encyclopedia.fetch(json!({ "title": title })).await {
            Ok(page) => {
                let content = page.get("content").and_then(Value::as_str).unwrap_or_default();
                let resolved = page.get("title").and_then(Value::as_str).unwrap_or(title);
                return StateUpdate::new()
                    .set(TITLE, resolved)
                    .set(CONTENT, truncate_content(content))
                    .say(format!(
                        "Recuperata pagina: '{}' ({} caratteri)",
                        resolved,
                        content.chars().count()
                    ));
            }
            Err(e) => debug!(title = %title, error = %e, "Page not retrievable, trying the next one"),
        }
    }

    StateUpdate::new()
        .clear(CONTENT)
        .say("Impossibile recuperare il contenuto di nessuna pagina.")
}

async fn generate(deps: AgentDeps, state: State) -> StateUpdate {
    let (Some(title), Some(content)) = (state.get_str(TITLE), state.get_str(CONTENT)) else {
        return StateUpdate::new().say(NOT_FOUND);
    };
    let prompt = answer_prompt(title, content, &query_of(&state));

    match deps
        .completion
        .with_temperature(0.3)
        .complete(ANSWER_SYSTEM, &prompt)
        .await
    {
        Ok(answer) => StateUpdate::new().set("response", answer.as_str()).say(answer),
        Err(e) => {
            warn!(error = %e, "Encyclopedia answer failed");
            StateUpdate::new().say(format!(
                "Mi dispiace, si è verificato un errore nel generare la risposta: {}",
                e
            ))
        }
    }
}
