use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use concierge_core::traits::{Clock, SystemClock};
use concierge_core::types::{Domain, MissingSlot, SessionId};

/// Key in `partial_data` holding the time phrase to reuse on resumption.
pub const TIME_DESCRIPTION: &str = "time_description";

/// One session's request that is waiting for a single missing slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub domain: Domain,
    pub original_query: String,
    pub missing_slot: MissingSlot,
    /// Fields already extracted from the original query.
    pub partial_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A request rebuilt from a pending entry plus the user's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumedRequest {
    /// Domain of the pending entry; classification is skipped for it.
    pub domain: Domain,
    /// Full natural-language query to dispatch.
    pub query: String,
}

/// Session-scoped store of pending slot-filling requests.
///
/// At most one entry per session. Entries older than the TTL are invisible
/// to every read and are deleted by whichever access notices them first,
/// either a read on that session or [`sweep_expired`](Self::sweep_expired).
/// All check-then-delete sequences run under the one map lock.
pub struct PendingStore {
    entries: Mutex<HashMap<SessionId, PendingRequest>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl PendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    fn is_expired(&self, entry: &PendingRequest, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.ttl
    }

    /// Take the live entry for `session` out of a locked map, evicting it if
    /// expired. Leaves a live entry in place unless `remove` is set.
    fn live_entry(
        &self,
        entries: &mut HashMap<SessionId, PendingRequest>,
        session: &SessionId,
        remove: bool,
    ) -> Option<PendingRequest> {
        let now = self.clock.now();
        let expired = self.is_expired(entries.get(session)?, now);
        if expired {
            entries.remove(session);
            debug!(session = %session, "Pending request expired");
            return None;
        }
        if remove {
            entries.remove(session)
        } else {
            entries.get(session).cloned()
        }
    }

    /// Whether `session` has a non-expired pending entry.
    pub fn has_pending(&self, session: &SessionId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        self.live_entry(&mut entries, session, false).is_some()
    }

    /// A copy of the live pending entry, if any.
    pub fn get_pending(&self, session: &SessionId) -> Option<PendingRequest> {
        let mut entries = self.entries.lock().unwrap();
        self.live_entry(&mut entries, session, false)
    }

    /// Domain of the live pending entry, if any.
    pub fn pending_domain(&self, session: &SessionId) -> Option<Domain> {
        self.get_pending(session).map(|p| p.domain)
    }

    /// Store a pending entry, replacing whatever the session had.
    pub fn save_pending(
        &self,
        session: &SessionId,
        domain: Domain,
        original_query: impl Into<String>,
        missing_slot: MissingSlot,
        partial_data: Map<String, Value>,
    ) {
        let entry = PendingRequest {
            domain,
            original_query: original_query.into(),
            missing_slot,
            partial_data,
            created_at: self.clock.now(),
        };
        info!(
            session = %session,
            domain = %entry.domain,
            missing = %entry.missing_slot,
            "Saved pending request"
        );
        self.entries.lock().unwrap().insert(session.clone(), entry);
    }

    /// Consume the pending entry and rebuild the full request with the
    /// user's answer.
    ///
    /// Returns `None` when there is no live entry. A live entry is removed
    /// in the same critical section that reads it, so concurrent callers
    /// cannot both resume it.
    pub fn complete_pending(
        &self,
        session: &SessionId,
        user_response: &str,
    ) -> Option<ResumedRequest> {
        let entry = {
            let mut entries = self.entries.lock().unwrap();
            self.live_entry(&mut entries, session, true)?
        };

        let query = reconstruct_query(&entry, user_response.trim());
        info!(session = %session, domain = %entry.domain, query = %query, "Resumed pending request");
        Some(ResumedRequest {
            domain: entry.domain,
            query,
        })
    }

    pub fn clear_pending(&self, session: &SessionId) {
        if self.entries.lock().unwrap().remove(session).is_some() {
            debug!(session = %session, "Cleared pending request");
        }
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept expired pending requests");
        }
        removed
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the resumed query for the slot the entry was waiting on.
fn reconstruct_query(entry: &PendingRequest, response: &str) -> String {
    let time = entry
        .partial_data
        .get(TIME_DESCRIPTION)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match &entry.missing_slot {
        MissingSlot::Location => {
            format!("Che tempo fa a {} {}", response, time.unwrap_or("oggi"))
        }
        MissingSlot::ZodiacSign => {
            format!("Oroscopo del {} {}", response, time.unwrap_or("di oggi"))
        }
        MissingSlot::Other(_) => format!("{} {}", entry.original_query, response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_test_utils::ManualClock;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(600);

    fn store() -> (PendingStore, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        (PendingStore::with_clock(TTL, clock.clone()), clock)
    }

    fn partial(time: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(TIME_DESCRIPTION.into(), json!(time));
        m
    }

    #[test]
    fn test_save_then_has_pending_within_ttl() {
        let (store, clock) = store();
        let s = SessionId::default_session();
        store.save_pending(&s, Domain::Weather, "Che tempo fa domani?", MissingSlot::Location, partial("domani"));

        assert!(store.has_pending(&s));
        clock.advance(TTL);
        assert!(store.has_pending(&s), "exactly TTL old is still valid");
        assert_eq!(store.pending_domain(&s), Some(Domain::Weather));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let (store, clock) = store();
        let s = SessionId::default_session();
        store.save_pending(&s, Domain::Weather, "q", MissingSlot::Location, Map::new());

        clock.advance(TTL + Duration::from_secs(1));
        assert_eq!(store.len(), 1);
        assert!(!store.has_pending(&s));
        assert!(store.is_empty());
        assert!(store.complete_pending(&s, "Milano").is_none());
    }

    #[test]
    fn test_get_pending_returns_a_copy() {
        let (store, _) = store();
        let s = SessionId::from_string("u1");
        store.save_pending(&s, Domain::Horoscope, "oroscopo", MissingSlot::ZodiacSign, partial("della settimana"));

        let mut copy = store.get_pending(&s).unwrap();
        copy.partial_data.clear();
        copy.original_query.push_str(" modificato");

        let stored = store.get_pending(&s).unwrap();
        assert_eq!(stored.original_query, "oroscopo");
        assert_eq!(stored.partial_data.len(), 1);
    }

    #[test]
    fn test_save_overwrites_previous_entry() {
        let (store, _) = store();
        let s = SessionId::default_session();
        store.save_pending(&s, Domain::Weather, "meteo", MissingSlot::Location, Map::new());
        store.save_pending(&s, Domain::Horoscope, "oroscopo", MissingSlot::ZodiacSign, Map::new());

        assert_eq!(store.len(), 1);
        assert_eq!(store.pending_domain(&s), Some(Domain::Horoscope));
    }

    #[test]
    fn test_location_reconstruction_is_deterministic() {
        let (store, _) = store();
        let s = SessionId::default_session();
        for _ in 0..3 {
            store.save_pending(&s, Domain::Weather, "Che tempo fa domani?", MissingSlot::Location, partial("domani"));
            let resumed = store.complete_pending(&s, "Milano").unwrap();
            assert_eq!(resumed.query, "Che tempo fa a Milano domani");
            assert_eq!(resumed.domain, Domain::Weather);
        }
    }

    #[test]
    fn test_slot_defaults_and_fallback() {
        let (store, _) = store();
        let s = SessionId::default_session();

        store.save_pending(&s, Domain::Weather, "meteo", MissingSlot::Location, Map::new());
        assert_eq!(store.complete_pending(&s, " Roma ").unwrap().query, "Che tempo fa a Roma oggi");

        store.save_pending(&s, Domain::Horoscope, "oroscopo", MissingSlot::ZodiacSign, Map::new());
        assert_eq!(store.complete_pending(&s, "leone").unwrap().query, "Oroscopo del leone di oggi");

        store.save_pending(
            &s,
            Domain::Translation,
            "traduci buongiorno",
            MissingSlot::Other("target_language".into()),
            Map::new(),
        );
        assert_eq!(
            store.complete_pending(&s, "in francese").unwrap().query,
            "traduci buongiorno in francese"
        );
    }

    #[test]
    fn test_complete_pending_is_single_use() {
        let (store, _) = store();
        let s = SessionId::default_session();
        store.save_pending(&s, Domain::Weather, "q", MissingSlot::Location, partial("domani"));

        assert!(store.complete_pending(&s, "Milano").is_some());
        assert!(store.complete_pending(&s, "Torino").is_none());
        assert!(!store.has_pending(&s));
    }

    #[test]
    fn test_sessions_are_independent() {
        let (store, _) = store();
        let a = SessionId::from_string("a");
        let b = SessionId::from_string("b");
        store.save_pending(&a, Domain::Weather, "q", MissingSlot::Location, Map::new());

        assert!(!store.has_pending(&b));
        store.clear_pending(&b);
        assert!(store.has_pending(&a));
        store.clear_pending(&a);
        assert!(!store.has_pending(&a));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store();
        store.save_pending(&SessionId::from_string("old"), Domain::Weather, "q", MissingSlot::Location, Map::new());
        clock.advance(Duration::from_secs(400));
        store.save_pending(&SessionId::from_string("new"), Domain::Weather, "q", MissingSlot::Location, Map::new());
        clock.advance(Duration::from_secs(300));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.has_pending(&SessionId::from_string("new")));
        assert_eq!(store.sweep_expired(), 0);
    }
}
