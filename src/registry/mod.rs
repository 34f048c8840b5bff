//! Session Registry
//!
//! Authoritative, process-local store of active call sessions keyed by call
//! id. All mutation goes through [`SessionRegistry::mutate`], which applies a
//! closure under the registry write lock; two actions racing on the same call
//! therefore serialize at this single point. Lock hold times are O(1): the
//! closures only touch session fields.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CoordinatorError, Result};
use crate::session::{CallId, CallSession, CallState};
use serde::{Deserialize, Serialize};

/// Counters maintained across the registry's lifetime
#[derive(Debug, Default)]
struct RegistryCounters {
    total_created: u64,
    total_removed: u64,
}

/// Concurrency-safe store of active call sessions
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<CallId, CallSession>>>,
    counters: Arc<RwLock<RegistryCounters>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(RegistryCounters::default())),
        }
    }

    /// Insert a new session
    ///
    /// Ids are expected to be globally unique; a duplicate is a defect in the
    /// caller and is rejected rather than overwritten.
    pub async fn create(&self, session: CallSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.call_id) {
            return Err(CoordinatorError::already_exists(session.call_id.as_str()));
        }

        let call_id = session.call_id.clone();
        sessions.insert(call_id.clone(), session);
        drop(sessions);

        self.counters.write().await.total_created += 1;
        tracing::debug!("Registered call session: {}", call_id);
        Ok(())
    }

    /// Get a clone of a session
    pub async fn get(&self, call_id: &CallId) -> Result<CallSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(call_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found(call_id.as_str()))
    }

    /// Whether a session exists
    pub async fn contains(&self, call_id: &CallId) -> bool {
        self.sessions.read().await.contains_key(call_id)
    }

    /// Apply a closure to a stored session under the write lock
    ///
    /// The closure may reject the mutation by returning an error, in which
    /// case the stored session is left exactly as it was (closures must not
    /// write before their guards pass).
    pub async fn mutate<F, R>(&self, call_id: &CallId, f: F) -> Result<R>
    where
        F: FnOnce(&mut CallSession) -> Result<R>,
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(call_id) {
            Some(session) => f(session),
            None => Err(CoordinatorError::not_found(call_id.as_str())),
        }
    }

    /// Remove a session, succeeding even if it is already absent
    ///
    /// Returns whether an entry was actually removed so callers can gate
    /// terminal side effects on having won the removal.
    pub async fn delete(&self, call_id: &CallId) -> bool {
        let removed = self.sessions.write().await.remove(call_id).is_some();
        if removed {
            self.counters.write().await.total_removed += 1;
            tracing::debug!("Removed call session: {}", call_id);
        }
        removed
    }

    /// Number of active sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Clone out every active session, for sweeps and stats
    pub async fn snapshot(&self) -> Vec<CallSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Aggregate counts by state plus lifetime counters
    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let mut stats = RegistryStats::default();

        for session in sessions.values() {
            stats.total += 1;
            match session.state {
                CallState::Dialing => stats.dialing += 1,
                CallState::Ringing => stats.ringing += 1,
                CallState::Answered => stats.answered += 1,
                CallState::Held => stats.held += 1,
                CallState::Ended => {}
            }
        }
        drop(sessions);

        let counters = self.counters.read().await;
        stats.total_created = counters.total_created;
        stats.total_removed = counters.total_removed;
        stats
    }
}

impl Clone for SessionRegistry {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Aggregate registry statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub dialing: usize,
    pub ringing: usize,
    pub answered: usize,
    pub held: usize,
    pub total_created: u64,
    pub total_removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AgentId, CallDirection, TenantId, UserId};

    fn session() -> CallSession {
        CallSession::new(
            TenantId("t-1".to_string()),
            AgentId("agt-1".to_string()),
            UserId("u-1".to_string()),
            "+15551234567".to_string(),
            CallDirection::Outbound,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let s = session();
        let call_id = s.call_id.clone();

        registry.create(s).await.unwrap();
        assert!(registry.contains(&call_id).await);

        let stored = registry.get(&call_id).await.unwrap();
        assert_eq!(stored.call_id, call_id);
        assert_eq!(stored.state, CallState::Dialing);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let registry = SessionRegistry::new();
        let s = session();
        registry.create(s.clone()).await.unwrap();

        let err = registry.create(s).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyExists { .. }));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get(&CallId::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mutate_applies_closure() {
        let registry = SessionRegistry::new();
        let s = session();
        let call_id = s.call_id.clone();
        registry.create(s).await.unwrap();

        registry
            .mutate(&call_id, |s| {
                s.set_state(CallState::Ringing);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(registry.get(&call_id).await.unwrap().state, CallState::Ringing);
    }

    #[tokio::test]
    async fn test_mutate_error_leaves_session_untouched() {
        let registry = SessionRegistry::new();
        let s = session();
        let call_id = s.call_id.clone();
        registry.create(s).await.unwrap();

        let result: Result<()> = registry
            .mutate(&call_id, |s| {
                if s.state == CallState::Dialing {
                    return Err(CoordinatorError::invalid_state(
                        s.call_id.as_str(),
                        s.state.as_str(),
                        "hold",
                    ));
                }
                s.set_state(CallState::Held);
                Ok(())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(registry.get(&call_id).await.unwrap().state, CallState::Dialing);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let registry = SessionRegistry::new();
        let s = session();
        let call_id = s.call_id.clone();
        registry.create(s).await.unwrap();

        assert!(registry.delete(&call_id).await);
        assert!(!registry.delete(&call_id).await);
        assert!(!registry.contains(&call_id).await);
    }

    #[tokio::test]
    async fn test_stats_counts_by_state() {
        let registry = SessionRegistry::new();
        let a = session();
        let b = session();
        let b_id = b.call_id.clone();
        registry.create(a).await.unwrap();
        registry.create(b).await.unwrap();

        registry
            .mutate(&b_id, |s| {
                s.set_state(CallState::Answered);
                Ok(())
            })
            .await
            .unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.dialing, 1);
        assert_eq!(stats.answered, 1);
        assert_eq!(stats.total_created, 2);
    }
}
