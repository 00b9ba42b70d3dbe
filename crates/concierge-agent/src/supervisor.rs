//! Supervisor router: resume a pending request or classify the inbound text,
//! then hand it to the matching agent workflow.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use concierge_core::config::RouterConfig;
use concierge_core::error::Result;
use concierge_core::types::{ChatMessage, Domain, Role, SessionId};

use crate::agents::{query_of, request_state, session_of, AgentDeps, AgentSet, QUERY, SESSION};
use crate::graph::{step_async, Edge, State, StateUpdate, Step, Workflow, WorkflowBuilder};
use crate::nlu::{extract_json, field_f64, field_str};
use crate::session::PendingStore;

const DOMAIN: &str = "domain";
const ROUTE: &str = "route";
const RESUMED: &str = "resumed";

const ROUTE_DISPATCH: &str = "dispatch";
const ROUTE_UNAVAILABLE: &str = "unavailable";

const ROUTER_SYSTEM: &str = "Sei un supervisore intelligente di un sistema multiagente.";

/// Lowercase fragments that mark router and progress chatter rather than an answer.
const PROGRESS_MARKERS: [&str; 4] = [
    "ho analizzato",
    "attivo l'agente",
    "ho identificato",
    "sto recuperando",
];

/// Agent names the routing reply may mention, for replies that are not JSON.
const KEYWORDS: [(Domain, &[&str]); 6] = [
    (Domain::Weather, &["weather", "meteo"]),
    (Domain::Horoscope, &["horoscope", "oroscopo"]),
    (Domain::Encyclopedia, &["wikipedia", "encyclopedia"]),
    (Domain::Arithmetic, &["calculator", "calcolatrice"]),
    (Domain::Translation, &["translator", "traduttore"]),
    (Domain::Calendar, &["calendar", "calendario"]),
];

fn routing_prompt(query: &str) -> String {
    format!(
        r#"Sei un supervisore di un sistema multiagente. La tua responsabilità è decidere quale agente specializzato attivare.

Agenti disponibili:
1. WEATHER - Specializzato in: meteo, condizioni atmosferiche, pioggia, neve, temperatura, umidità, sole, vento, clima
2. HOROSCOPE - Specializzato in: oroscopo, segni zodiacali, previsioni astrologiche
3. GENERAL - Specializzato in: saluti, presentazioni, small talk, conversazioni generiche, domande sull'assistente, ringraziamenti
4. WIKIPEDIA - Specializzato in: ricerca di voci, informazioni enciclopediche, personaggi storici, luoghi, definizioni
5. CALCULATOR - Specializzato in: calcoli aritmetici, percentuali, conversioni di unità, equazioni
6. TRANSLATOR - Specializzato in: traduzioni di parole o frasi tra lingue diverse
7. CALENDAR - Specializzato in: appuntamenti, promemoria, eventi (non ancora disponibile)

IMPORTANTE:
- Usa GENERAL per: saluti (ciao, buongiorno), presentazioni (chi sei, cosa fai), ringraziamenti, conversazioni generiche
- Usa GENERAL come fallback per qualsiasi cosa non gestita dagli altri agenti
- Non usare mai NONE, usa sempre GENERAL se nessun altro agente è appropriato

Analizza la seguente query e decidi quale agente è il più appropriato.

Query utente: {}

Rispondi in JSON con il seguente formato:
{{
    "agent": "WEATHER" | "HOROSCOPE" | "GENERAL" | "WIKIPEDIA" | "CALCULATOR" | "TRANSLATOR" | "CALENDAR",
    "confidence": 0.0-1.0,
    "reason": "breve spiegazione"
}}

Usa GENERAL per tutto ciò che non rientra nelle specializzazioni degli altri agenti."#,
        query
    )
}

/// A routing decision and the message announcing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Routing {
    pub domain: Domain,
    pub message: String,
}

fn topic(domain: Domain) -> &'static str {
    match domain {
        Domain::Weather => "sul meteo",
        Domain::Horoscope => "sull'oroscopo",
        Domain::Encyclopedia => "enciclopedica",
        Domain::Arithmetic => "di calcolo",
        Domain::Translation => "di traduzione",
        Domain::Calendar => "sul calendario",
        Domain::General => "generica",
    }
}

/// Read a routing reply. Always resolves to a concrete domain.
///
/// A JSON reply naming a known agent is taken at its word; `NONE` or an
/// unknown agent means general conversation. A reply that is not JSON is
/// scanned for agent names before falling back to general conversation.
pub fn parse_routing_reply(reply: &str) -> Routing {
    if let Some(decision) = extract_json(reply) {
        let agent = field_str(&decision, "agent").unwrap_or("NONE");
        let Some(domain) = Domain::parse_agent(agent) else {
            return Routing {
                domain: Domain::General,
                message: "Attivo l'agente conversazionale...".into(),
            };
        };
        let confidence = field_f64(&decision, "confidence").unwrap_or(0.0);
        let reason = field_str(&decision, "reason").unwrap_or_default();
        return Routing {
            domain,
            message: format!(
                "Ho analizzato la tua richiesta: {} (confidenza: {:.0}%). Attivo l'agente {}...",
                reason,
                confidence * 100.0,
                domain.label()
            ),
        };
    }

    let lower = reply.to_lowercase();
    let found = KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(domain, _)| *domain);

    match found {
        Some(domain) => Routing {
            domain,
            message: format!(
                "Ho identificato una richiesta {}. Attivo l'agente {}...",
                topic(domain),
                domain.label()
            ),
        },
        None => Routing {
            domain: Domain::General,
            message: "Attivo l'agente conversazionale...".into(),
        },
    }
}

/// Everything one supervisor turn produced.
#[derive(Debug, Clone)]
pub struct SupervisorOutput {
    /// User message, router messages and the agent's messages, in order.
    pub messages: Vec<ChatMessage>,
    /// Domain the turn was routed to.
    pub domain: Option<Domain>,
    /// Whether the turn completed a pending request.
    pub resumed: bool,
}

impl SupervisorOutput {
    /// The answer to show the user: the last assistant message that is not
    /// routing or progress chatter, else the last assistant message.
    pub fn final_reply(&self) -> Option<&str> {
        let assistant = || {
            self.messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::Assistant)
                .map(|m| m.content.as_str())
        };
        assistant()
            .find(|text| {
                let lower = text.to_lowercase();
                !PROGRESS_MARKERS.iter().any(|m| lower.contains(m))
            })
            .or_else(|| assistant().next())
    }
}

struct Router {
    deps: AgentDeps,
    agents: AgentSet,
    disabled: HashSet<Domain>,
}

impl Router {
    fn route_for(&self, domain: Domain) -> &'static str {
        if self.agents.get(domain).is_some() && !self.disabled.contains(&domain) {
            ROUTE_DISPATCH
        } else {
            ROUTE_UNAVAILABLE
        }
    }
}

fn domain_of(state: &State) -> Domain {
    state
        .get_str(DOMAIN)
        .and_then(|d| d.parse().ok())
        .unwrap_or(Domain::General)
}

fn step<F, Fut>(router: &Arc<Router>, f: F) -> Arc<dyn Step>
where
    F: Fn(Arc<Router>, State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StateUpdate> + Send + 'static,
{
    let router = router.clone();
    step_async(move |state: &State| Box::pin(f(router.clone(), state.clone())))
}

/// Entry node: record the user turn and complete a pending request if one is waiting.
async fn resume(router: Arc<Router>, state: State) -> StateUpdate {
    let text = query_of(&state);
    let session = session_of(&state);
    let update = StateUpdate::new().push(ChatMessage::user(text.as_str()));

    let store = &router.deps.store;
    if !store.has_pending(&session) {
        return update;
    }
    let Some(resumed) = store.complete_pending(&session, &text) else {
        warn!(session = %session, "Pending request vanished before completion, classifying instead");
        return update;
    };

    info!(session = %session, domain = %resumed.domain, query = %resumed.query, "Resuming pending request");
    let message = format!(
        "Ho ripreso la tua richiesta precedente: \"{}\". Attivo l'agente {}...",
        resumed.query,
        resumed.domain.label()
    );
    update
        .set(QUERY, resumed.query)
        .set(DOMAIN, resumed.domain.as_str())
        .set(RESUMED, true)
        .set(ROUTE, router.route_for(resumed.domain))
        .say(message)
}

async fn classify(router: Arc<Router>, state: State) -> StateUpdate {
    let query = query_of(&state);
    let routing = match router
        .deps
        .completion
        .complete(ROUTER_SYSTEM, &routing_prompt(&query))
        .await
    {
        Ok(reply) => parse_routing_reply(&reply),
        Err(e) => {
            warn!(error = %e, "Routing request failed, using the general agent");
            Routing {
                domain: Domain::General,
                message: format!("Errore nel routing: {}. Uso l'agente conversazionale.", e),
            }
        }
    };

    info!(domain = %routing.domain, "Request classified");
    StateUpdate::new()
        .set(DOMAIN, routing.domain.as_str())
        .set(ROUTE, router.route_for(routing.domain))
        .say(routing.message)
}

async fn dispatch(router: Arc<Router>, state: State) -> StateUpdate {
    let domain = domain_of(&state);
    let Some(agent) = router.agents.get(domain) else {
        return unavailable(router, state).await;
    };

    let request = request_state(&session_of(&state), &query_of(&state));
    let result = agent.run(request).await;
    info!(
        domain = %domain,
        steps = result.node_results.len(),
        elapsed_ms = result.total_elapsed_ms,
        "Agent finished"
    );
    StateUpdate::new().extend(result.state.into_messages().into_vec())
}

async fn unavailable(_router: Arc<Router>, state: State) -> StateUpdate {
    let domain = domain_of(&state);
    info!(domain = %domain, "Routed to an unavailable agent");
    StateUpdate::new().say(format!(
        "L'agente {} non è ancora disponibile. Scusa per il disagio!",
        domain.label()
    ))
}

/// Routes each inbound turn to one agent.
///
/// Cheap to share: every turn owns its own state, and the only shared
/// mutable data is the pending-request store.
pub struct Supervisor {
    graph: Workflow,
    router: Arc<Router>,
}

impl Supervisor {
    pub fn new(deps: AgentDeps, config: &RouterConfig) -> Result<Self> {
        let agents = AgentSet::build(&deps)?;
        let router = Arc::new(Router {
            deps,
            agents,
            disabled: config.disabled_domains.iter().copied().collect(),
        });

        let graph = WorkflowBuilder::new("supervisor")
            .node("resume", step(&router, resume))
            .node("classify", step(&router, classify))
            .node("dispatch", step(&router, dispatch))
            .node("unavailable", step(&router, unavailable))
            .edge(Edge::when_eq("resume", "dispatch", ROUTE, ROUTE_DISPATCH))
            .edge(Edge::when_eq("resume", "unavailable", ROUTE, ROUTE_UNAVAILABLE))
            .edge(Edge::always("resume", "classify"))
            .edge(Edge::when_eq("classify", "unavailable", ROUTE, ROUTE_UNAVAILABLE))
            .edge(Edge::always("classify", "dispatch"))
            .entry("resume")
            .compile()?;

        Ok(Self { graph, router })
    }

    /// Handle one inbound turn. Never fails: problems become messages.
    pub async fn run(&self, session: &SessionId, text: &str) -> SupervisorOutput {
        let initial = State::new()
            .with(QUERY, text)
            .with(SESSION, session.0.as_str());
        let result = self.graph.run(initial).await;

        let state = result.state;
        let domain = state.get_str(DOMAIN).and_then(|d| d.parse().ok());
        let resumed = state.get(RESUMED).and_then(Value::as_bool).unwrap_or(false);
        SupervisorOutput {
            messages: state.into_messages().into_vec(),
            domain,
            resumed,
        }
    }

    /// Forget any pending request for the session.
    pub fn reset(&self, session: &SessionId) {
        self.router.deps.store.clear_pending(session);
    }

    /// The router workflow itself.
    pub fn graph(&self) -> &Workflow {
        &self.graph
    }

    /// The workflow behind a domain, if it has one.
    pub fn agent_graph(&self, domain: Domain) -> Option<&Workflow> {
        self.router.agents.get(domain)
    }

    pub fn is_available(&self, domain: Domain) -> bool {
        self.router.route_for(domain) == ROUTE_DISPATCH
    }

    pub fn store(&self) -> &Arc<PendingStore> {
        &self.router.deps.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{deps, unused_providers};
    use concierge_test_utils::ScriptedLlm;

    fn contents(out: &SupervisorOutput) -> Vec<&str> {
        out.messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_parse_json_decision() {
        let r = parse_routing_reply(
            r#"{"agent": "HOROSCOPE", "confidence": 0.9, "reason": "richiesta astrologica"}"#,
        );
        assert_eq!(r.domain, Domain::Horoscope);
        assert_eq!(
            r.message,
            "Ho analizzato la tua richiesta: richiesta astrologica (confidenza: 90%). Attivo l'agente OROSCOPO..."
        );
    }

    #[test]
    fn test_parse_none_means_general() {
        let r = parse_routing_reply(r#"{"agent": "NONE", "confidence": 0.1}"#);
        assert_eq!(r.domain, Domain::General);
    }

    #[test]
    fn test_parse_prose_scans_keywords() {
        let r = parse_routing_reply("Direi che serve l'agente WEATHER per questa domanda");
        assert_eq!(r.domain, Domain::Weather);
        assert_eq!(r.message, "Ho identificato una richiesta sul meteo. Attivo l'agente METEO...");

        let r = parse_routing_reply("boh");
        assert_eq!(r.domain, Domain::General);
    }

    #[test]
    fn test_final_reply_skips_progress() {
        let out = SupervisorOutput {
            messages: vec![
                ChatMessage::user("il 20% di 100"),
                ChatMessage::assistant("Ho analizzato la tua richiesta: calcolo. Attivo l'agente CALCOLATRICE..."),
                ChatMessage::assistant("Ho identificato: percentuale. Calcolo in corso..."),
                ChatMessage::assistant("📊 Risultato: 20"),
            ],
            domain: Some(Domain::Arithmetic),
            resumed: false,
        };
        assert_eq!(out.final_reply(), Some("📊 Risultato: 20"));

        let only_progress = SupervisorOutput {
            messages: vec![ChatMessage::assistant("Attivo l'agente conversazionale...")],
            domain: None,
            resumed: false,
        };
        assert_eq!(only_progress.final_reply(), Some("Attivo l'agente conversazionale..."));
    }

    #[tokio::test]
    async fn test_routes_to_general() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            r#"{"agent": "GENERAL", "confidence": 1.0, "reason": "saluto"}"#,
            "Ciao! Come va?",
        ]));
        let sup = Supervisor::new(deps(llm, unused_providers()), &RouterConfig::default()).unwrap();

        let out = sup.run(&SessionId::default(), "ciao").await;

        assert_eq!(out.domain, Some(Domain::General));
        assert!(!out.resumed);
        assert_eq!(out.messages[0].role, Role::User);
        assert_eq!(
            contents(&out),
            vec![
                "ciao",
                "Ho analizzato la tua richiesta: saluto (confidenza: 100%). Attivo l'agente CONVERSAZIONALE...",
                "Ciao! Come va?",
            ]
        );
        assert_eq!(out.final_reply(), Some("Ciao! Come va?"));
    }

    #[tokio::test]
    async fn test_routing_failure_falls_back_to_general() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_error("connection refused").push_reply("Eccomi!");
        let sup = Supervisor::new(deps(llm, unused_providers()), &RouterConfig::default()).unwrap();

        let out = sup.run(&SessionId::default(), "ciao").await;

        assert_eq!(out.domain, Some(Domain::General));
        assert_eq!(
            out.messages[1].content,
            "Errore nel routing: LLM request failed: connection refused. Uso l'agente conversazionale."
        );
        assert_eq!(out.final_reply(), Some("Eccomi!"));
    }

    #[tokio::test]
    async fn test_calendar_is_unavailable() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            r#"{"agent": "CALENDAR", "confidence": 0.8, "reason": "appuntamento"}"#,
        ]));
        let sup = Supervisor::new(deps(llm.clone(), unused_providers()), &RouterConfig::default()).unwrap();

        let out = sup.run(&SessionId::default(), "fissa un appuntamento domani").await;

        assert_eq!(out.domain, Some(Domain::Calendar));
        assert_eq!(
            out.final_reply(),
            Some("L'agente CALENDARIO non è ancora disponibile. Scusa per il disagio!")
        );
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_domain_is_unavailable() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            r#"{"agent": "TRANSLATOR", "confidence": 0.9, "reason": "traduzione"}"#,
        ]));
        let config = RouterConfig {
            disabled_domains: vec![Domain::Translation],
        };
        let sup = Supervisor::new(deps(llm, unused_providers()), &config).unwrap();

        assert!(!sup.is_available(Domain::Translation));
        assert!(sup.is_available(Domain::Weather));
        let out = sup.run(&SessionId::default(), "traduci ciao in inglese").await;
        assert_eq!(
            out.final_reply(),
            Some("L'agente TRADUTTORE non è ancora disponibile. Scusa per il disagio!")
        );
    }

    #[tokio::test]
    async fn test_reset_clears_pending() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            r#"{"agent": "HOROSCOPE", "confidence": 0.9, "reason": "oroscopo"}"#,
            r#"{"zodiac_sign": "NESSUNO", "time_period": "daily"}"#,
        ]));
        let sup = Supervisor::new(deps(llm, unused_providers()), &RouterConfig::default()).unwrap();
        let session = SessionId::from_string("reset-me");

        sup.run(&session, "il mio oroscopo").await;
        assert!(sup.store().has_pending(&session));

        sup.reset(&session);
        assert!(!sup.store().has_pending(&session));
    }

    #[test]
    fn test_graph_shape() {
        let llm = Arc::new(ScriptedLlm::new());
        let sup = Supervisor::new(deps(llm, unused_providers()), &RouterConfig::default()).unwrap();

        assert_eq!(sup.graph().entry(), "resume");
        let mermaid = sup.graph().to_mermaid();
        assert!(mermaid.contains("resume -->|route == dispatch| dispatch"));
        assert!(mermaid.contains("classify --> dispatch"));
        assert!(sup.agent_graph(Domain::Calendar).is_none());
        assert_eq!(sup.agent_graph(Domain::Weather).unwrap().name(), "weather");
    }
}
