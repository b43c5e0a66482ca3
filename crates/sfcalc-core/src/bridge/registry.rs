//! The process-wide session registry.
//!
//! Iterative workflows construct "a calculator for this structure" over and
//! over; the registry maps a stable, caller-supplied identity token to one
//! shared session so the TAAM assignment cost is paid once. Identity is
//! explicit -- a token chosen by the caller, with explicit eviction -- rather
//! than anything derived from host-object addresses or lifetimes.
//!
//! Content changes on the same host must flow through
//! [`CalculatorSession::update_geometry`]; requesting the same token again
//! returns the existing session untouched.

use super::config::ScatteringModel;
use super::error::BridgeError;
use super::host::HostStructure;
use super::session::CalculatorSession;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static GLOBAL_REGISTRY: LazyLock<SessionRegistry> = LazyLock::new(SessionRegistry::new);

type SharedSession = Arc<Mutex<CalculatorSession>>;

/// Registry of shared calculator sessions keyed by identity token.
///
/// `get_or_create` holds the registry lock across construction, so two
/// threads requesting the same token never race to build two sessions. The
/// sessions themselves are handed out behind their own mutex; the registry
/// makes no further thread-safety promises about them.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static SessionRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the session registered under `key`, constructing it from the
    /// host snapshot and model if absent.
    pub fn get_or_create(
        &self,
        key: &str,
        host: &impl HostStructure,
        model: ScatteringModel,
    ) -> Result<SharedSession, BridgeError> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(key) {
            return Ok(Arc::clone(existing));
        }
        let session = Arc::new(Mutex::new(CalculatorSession::new(host, model)?));
        sessions.insert(key.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Returns the session registered under `key`, if any.
    pub fn get(&self, key: &str) -> Option<SharedSession> {
        self.lock().get(key).cloned()
    }

    /// Removes the session registered under `key`. Returns whether an entry
    /// was present; handles held by other callers stay valid.
    pub fn evict(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().expect("session registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::host::{HostAtom, SimpleStructure};
    use nalgebra::Point3;

    fn host() -> SimpleStructure {
        SimpleStructure::new(
            [12.0, 12.0, 12.0, 90.0, 90.0, 90.0],
            vec![
                HostAtom::new("C1", "C", Point3::new(0.1, 0.2, 0.3)),
                HostAtom::new("N1", "N", Point3::new(0.6, 0.4, 0.7)),
            ],
        )
    }

    #[test]
    fn same_key_returns_the_same_session() {
        let registry = SessionRegistry::new();
        let a = registry
            .get_or_create("structure-1", &host(), ScatteringModel::Iam)
            .unwrap();
        let b = registry
            .get_or_create("structure-1", &host(), ScatteringModel::Iam)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_keys_get_independent_sessions() {
        let registry = SessionRegistry::new();
        let a = registry
            .get_or_create("structure-1", &host(), ScatteringModel::Iam)
            .unwrap();
        let b = registry
            .get_or_create("structure-2", &host(), ScatteringModel::Iam)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn update_through_one_handle_is_visible_through_the_other() {
        let registry = SessionRegistry::new();
        let mut shaken = host();

        let first = registry
            .get_or_create("shared", &shaken, ScatteringModel::Iam)
            .unwrap();
        let second = registry
            .get_or_create("shared", &shaken, ScatteringModel::Iam)
            .unwrap();

        let before = {
            let mut session = first.lock().unwrap();
            session.set_indices([(1, 0, 0), (0, 2, 1)]);
            session.f_calc().unwrap()
        };

        shaken.atoms[0].site = Point3::new(0.15, 0.25, 0.35);
        first.lock().unwrap().update_geometry(&shaken).unwrap();

        let after = second.lock().unwrap().f_calc().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn construction_failure_registers_nothing() {
        let registry = SessionRegistry::new();
        let mut bad = host();
        bad.table = None;

        assert!(
            registry
                .get_or_create("broken", &bad, ScatteringModel::Iam)
                .is_err()
        );
        assert!(registry.is_empty());
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn evicted_keys_are_rebuilt_on_next_request() {
        let registry = SessionRegistry::new();
        let a = registry
            .get_or_create("structure-1", &host(), ScatteringModel::Iam)
            .unwrap();

        assert!(registry.evict("structure-1"));
        assert!(!registry.evict("structure-1"));

        let b = registry
            .get_or_create("structure-1", &host(), ScatteringModel::Iam)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn clear_empties_the_registry() {
        let registry = SessionRegistry::new();
        registry
            .get_or_create("one", &host(), ScatteringModel::Iam)
            .unwrap();
        registry
            .get_or_create("two", &host(), ScatteringModel::Iam)
            .unwrap();
        registry.clear();
        assert!(registry.is_empty());
    }
}
