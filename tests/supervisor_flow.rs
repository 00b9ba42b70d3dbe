use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use concierge_agent::agents::AgentDeps;
use concierge_agent::nlu::LlmExtractor;
use concierge_agent::{PendingStore, Supervisor};
use concierge_core::config::RouterConfig;
use concierge_core::traits::Clock;
use concierge_core::types::{Domain, MissingSlot, Role, SessionId};
use concierge_llm::Completion;
use concierge_providers::{CalculatorProvider, ProviderSet};
use concierge_test_utils::{test_model_config, ManualClock, ScriptedLlm, StaticProvider};

struct Harness {
    supervisor: Supervisor,
    llm: Arc<ScriptedLlm>,
    clock: Arc<ManualClock>,
    forecast: Arc<StaticProvider>,
}

fn harness(ttl: Duration) -> Harness {
    harness_with_store_clock(ttl, None)
}

/// Like `harness`, but the pending store reads its own clock.
fn harness_with_store_clock(ttl: Duration, store_clock: Option<Arc<ManualClock>>) -> Harness {
    let llm = Arc::new(ScriptedLlm::new());
    let clock = ManualClock::shared();
    let forecast = Arc::new(StaticProvider::ok(
        "forecast",
        json!({
            "date": "2024-06-02",
            "temperature_max": 27.0,
            "temperature_min": 17.5,
            "precipitation": 0.0,
            "precipitation_probability": 5,
            "windspeed": 9.0,
            "weathercode": 0,
            "condition": "Cielo sereno"
        }),
    ));
    let providers = ProviderSet {
        geocode: Arc::new(StaticProvider::ok(
            "geocode",
            json!({"latitude": 45.4642, "longitude": 9.19}),
        )),
        forecast: forecast.clone(),
        horoscope: Arc::new(StaticProvider::failing("horoscope", "unused")),
        encyclopedia: Arc::new(StaticProvider::failing("encyclopedia", "unused")),
        calculator: Arc::new(CalculatorProvider),
    };

    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let store_clock: Arc<dyn Clock> = match store_clock {
        Some(c) => c as Arc<dyn Clock>,
        None => clock_dyn.clone(),
    };
    let completion = Completion::new(llm.clone(), test_model_config());
    let deps = AgentDeps {
        extractor: Arc::new(LlmExtractor::with_clock(completion.clone(), clock_dyn.clone())),
        completion,
        providers,
        store: Arc::new(PendingStore::with_clock(ttl, store_clock)),
        clock: clock_dyn,
    };
    let supervisor = Supervisor::new(deps, &RouterConfig::default()).unwrap();

    Harness {
        supervisor,
        llm,
        clock,
        forecast,
    }
}

const ROUTE_WEATHER: &str = r#"{"agent": "WEATHER", "confidence": 0.95, "reason": "richiesta sul meteo"}"#;

#[tokio::test]
async fn test_missing_location_then_city_resumes_weather() {
    let h = harness(Duration::from_secs(600));
    let session = SessionId::from_string("user-1");

    h.llm.push_reply(ROUTE_WEATHER);
    h.llm.push_reply(
        r#"{"location": "NESSUNA", "days_offset": 1, "time_description": "domani", "validity": "VALIDO"}"#,
    );
    let first = h.supervisor.run(&session, "Che tempo fa domani?").await;

    assert_eq!(first.domain, Some(Domain::Weather));
    assert!(!first.resumed);
    assert_eq!(
        first.final_reply(),
        Some("Non ho riconosciuto una località specifica nella tua richiesta. Puoi indicarmi una città?")
    );
    let pending = h.supervisor.store().get_pending(&session).unwrap();
    assert_eq!(pending.missing_slot, MissingSlot::Location);
    assert_eq!(pending.domain, Domain::Weather);

    // No routing call this time: only the weather extraction.
    h.llm.push_reply(
        r#"{"location": "Milano", "days_offset": 1, "time_description": "domani", "validity": "VALIDO"}"#,
    );
    let calls_before = h.llm.call_count();
    let second = h.supervisor.run(&session, "Milano").await;

    assert!(second.resumed);
    assert_eq!(second.domain, Some(Domain::Weather));
    assert_eq!(h.llm.call_count(), calls_before + 1);
    assert!(h
        .llm
        .user_prompt(calls_before)
        .unwrap()
        .contains("Query: Che tempo fa a Milano domani"));
    assert!(!h.supervisor.store().has_pending(&session));

    assert_eq!(second.messages[0].role, Role::User);
    assert_eq!(second.messages[0].content, "Milano");
    let report = second.final_reply().unwrap();
    assert!(report.contains("METEO A MILANO"));
    assert!(report.contains("Cielo sereno"));
    assert_eq!(h.forecast.inputs()[0]["days_offset"], 1);
}

#[tokio::test]
async fn test_expired_pending_is_classified_afresh() {
    let h = harness(Duration::from_secs(60));
    let session = SessionId::from_string("user-2");

    h.llm.push_reply(ROUTE_WEATHER);
    h.llm.push_reply(
        r#"{"location": "NESSUNA", "days_offset": 0, "time_description": "oggi", "validity": "VALIDO"}"#,
    );
    h.supervisor.run(&session, "Che tempo fa?").await;
    assert!(h.supervisor.store().has_pending(&session));

    h.clock.advance(Duration::from_secs(61));

    h.llm.push_reply(r#"{"agent": "GENERAL", "confidence": 0.6, "reason": "parola isolata"}"#);
    h.llm.push_reply("Milano è una bella città!");
    let out = h.supervisor.run(&session, "Milano").await;

    assert!(!out.resumed);
    assert_eq!(out.domain, Some(Domain::General));
    assert_eq!(out.final_reply(), Some("Milano è una bella città!"));
    assert!(h.supervisor.store().is_empty());
}

#[tokio::test]
async fn test_unparseable_routing_still_picks_a_domain() {
    let h = harness(Duration::from_secs(600));

    h.llm.push_reply("non saprei proprio");
    h.llm.push_reply("Dimmi pure!");
    let out = h.supervisor.run(&SessionId::default(), "mah").await;

    assert_eq!(out.domain, Some(Domain::General));
    assert_eq!(out.final_reply(), Some("Dimmi pure!"));
}

#[tokio::test]
async fn test_calculator_end_to_end() {
    let h = harness(Duration::from_secs(600));

    h.llm.push_reply(r#"{"agent": "CALCULATOR", "confidence": 0.99, "reason": "operazione aritmetica"}"#);
    h.llm.push_reply(
        r#"{"type": "EQUATION", "expression": "2*x+5-13", "description": "equazione lineare", "valid": true}"#,
    );
    let out = h.supervisor.run(&SessionId::default(), "risolvi 2x+5=13").await;

    assert_eq!(out.domain, Some(Domain::Arithmetic));
    assert_eq!(out.final_reply(), Some("📐 Risultato: x = 4"));
}

#[tokio::test]
async fn test_sessions_do_not_share_pending_requests() {
    let h = harness(Duration::from_secs(600));
    let alice = SessionId::from_string("alice");
    let bob = SessionId::from_string("bob");

    h.llm.push_reply(ROUTE_WEATHER);
    h.llm.push_reply(r#"{"location": "NESSUNA", "days_offset": 0, "validity": "VALIDO"}"#);
    h.supervisor.run(&alice, "meteo?").await;

    h.llm.push_reply(r#"{"agent": "GENERAL", "confidence": 0.9, "reason": "saluto"}"#);
    h.llm.push_reply("Ciao Bob!");
    let out = h.supervisor.run(&bob, "ciao").await;

    assert!(!out.resumed);
    assert!(h.supervisor.store().has_pending(&alice));
    assert!(!h.supervisor.store().has_pending(&bob));
}

#[tokio::test]
async fn test_pending_expiring_between_check_and_completion_is_classified() {
    let store_clock = ManualClock::shared();
    let h = harness_with_store_clock(Duration::from_secs(60), Some(store_clock.clone()));
    let session = SessionId::from_string("user-3");

    h.llm.push_reply(ROUTE_WEATHER);
    h.llm.push_reply(
        r#"{"location": "NESSUNA", "days_offset": 1, "time_description": "domani", "validity": "VALIDO"}"#,
    );
    h.supervisor.run(&session, "Che tempo fa domani?").await;
    assert!(h.supervisor.store().has_pending(&session));

    // Still live when checked, expired by the time it is consumed.
    store_clock.advance(Duration::from_secs(59));
    store_clock.tick_on_read(Duration::from_secs(2));

    h.llm.push_reply(r#"{"agent": "GENERAL", "confidence": 0.6, "reason": "parola isolata"}"#);
    h.llm.push_reply("Milano è una bella città!");
    let calls_before = h.llm.call_count();
    let out = h.supervisor.run(&session, "Milano").await;

    assert!(!out.resumed);
    assert_eq!(out.domain, Some(Domain::General));
    assert_eq!(h.llm.call_count(), calls_before + 2);
    let routing_call = &h.llm.calls()[calls_before];
    assert_eq!(routing_call[0].content, "Sei un supervisore intelligente di un sistema multiagente.");
    assert!(routing_call[1].content.contains("Milano"));
    assert!(!h.llm.user_prompt(calls_before).unwrap().contains("Che tempo fa a Milano"));
    assert_eq!(out.final_reply(), Some("Milano è una bella città!"));
    assert!(h.supervisor.store().is_empty());
}
