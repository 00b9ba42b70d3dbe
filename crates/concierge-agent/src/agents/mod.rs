//! Agent workflows, one per capability domain.
//!
//! Every agent is a small [`Workflow`] of extract → fetch → format steps.
//! Agents read the request from the [`QUERY`] field and the owning session
//! from [`SESSION`], and report everything, failures included, as assistant
//! messages.

pub mod calculator;
pub mod encyclopedia;
pub mod general;
pub mod horoscope;
pub mod translator;
pub mod weather;

use std::future::Future;
use std::sync::Arc;

use concierge_core::config::AppConfig;
use concierge_core::error::{ConciergeError, Result};
use concierge_core::traits::{Clock, LlmClient, SystemClock};
use concierge_core::types::{Domain, SessionId};
use concierge_llm::Completion;
use concierge_providers::ProviderSet;

use crate::graph::{step_async, State, Step, Workflow};
use crate::nlu::{Extractor, LlmExtractor};
use crate::session::PendingStore;

/// State field holding the request text.
pub const QUERY: &str = "query";
/// State field holding the session id.
pub const SESSION: &str = "session";

/// Collaborators shared by every agent.
#[derive(Clone)]
pub struct AgentDeps {
    pub extractor: Arc<dyn Extractor>,
    pub completion: Completion,
    pub providers: ProviderSet,
    pub store: Arc<PendingStore>,
    pub clock: Arc<dyn Clock>,
}

impl AgentDeps {
    /// Live collaborators: the LLM for extraction and generation, HTTP
    /// providers, and a wall-clock pending store.
    pub fn from_config(llm: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let completion = Completion::new(llm, config.model.clone());
        Self {
            extractor: Arc::new(LlmExtractor::with_clock(completion.clone(), clock.clone())),
            completion,
            providers: ProviderSet::from_config(&config.providers),
            store: Arc::new(PendingStore::with_clock(config.session.pending_ttl(), clock.clone())),
            clock,
        }
    }
}

/// Initial state for an agent run.
pub fn request_state(session: &SessionId, query: &str) -> State {
    State::new()
        .with(QUERY, query)
        .with(SESSION, session.0.as_str())
}

pub(crate) fn session_of(state: &State) -> SessionId {
    state
        .get_str(SESSION)
        .map(SessionId::from_string)
        .unwrap_or_default()
}

pub(crate) fn query_of(state: &State) -> String {
    state.get_str(QUERY).unwrap_or_default().to_string()
}

/// Wrap an async node function taking owned dependencies and state.
pub(crate) fn node<F, Fut>(deps: &AgentDeps, f: F) -> Arc<dyn Step>
where
    F: Fn(AgentDeps, State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::graph::StateUpdate> + Send + 'static,
{
    let deps = deps.clone();
    step_async(move |state: &State| Box::pin(f(deps.clone(), state.clone())))
}

/// The user-facing part of a collaborator error.
pub(crate) fn describe(error: &ConciergeError) -> String {
    match error {
        ConciergeError::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn analysis_failed(reason: &str) -> String {
    format!("Errore nell'analisi della richiesta: {}", reason)
}

/// Uppercase the first character.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The workflow of every implemented agent.
pub struct AgentSet {
    pub weather: Workflow,
    pub horoscope: Workflow,
    pub general: Workflow,
    pub encyclopedia: Workflow,
    pub calculator: Workflow,
    pub translator: Workflow,
}

impl AgentSet {
    pub fn build(deps: &AgentDeps) -> Result<Self> {
        Ok(Self {
            weather: weather::build(deps)?,
            horoscope: horoscope::build(deps)?,
            general: general::build(deps)?,
            encyclopedia: encyclopedia::build(deps)?,
            calculator: calculator::build(deps)?,
            translator: translator::build(deps)?,
        })
    }

    /// The agent for a domain, or `None` when the domain has no agent yet.
    pub fn get(&self, domain: Domain) -> Option<&Workflow> {
        match domain {
            Domain::Weather => Some(&self.weather),
            Domain::Horoscope => Some(&self.horoscope),
            Domain::General => Some(&self.general),
            Domain::Encyclopedia => Some(&self.encyclopedia),
            Domain::Arithmetic => Some(&self.calculator),
            Domain::Translation => Some(&self.translator),
            Domain::Calendar => None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("leone"), "Leone");
        assert_eq!(capitalize("èlite"), "Èlite");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_describe_strips_provider_prefix() {
        let e = ConciergeError::provider("forecast", "Dati meteo non disponibili per il giorno richiesto.");
        assert_eq!(describe(&e), "Dati meteo non disponibili per il giorno richiesto.");
        let e = ConciergeError::LlmRequest("timeout".into());
        assert_eq!(describe(&e), "LLM request failed: timeout");
    }

    #[test]
    fn test_session_round_trip_through_state() {
        let state = request_state(&SessionId::from_string("abc"), "ciao");
        assert_eq!(session_of(&state), SessionId::from_string("abc"));
        assert_eq!(query_of(&state), "ciao");
        assert_eq!(session_of(&State::new()), SessionId::default_session());
    }
}
