//! Sessions of many concurrent conversations.
//!
//! Calls on one session serialize on that session's mutex; distinct
//! sessions never block each other beyond the map's shard locks, which are
//! released before a session is locked.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::defaults::DefaultPolicy;
use crate::error::{Error, Result};
use crate::model::BuildingModel;
use crate::path::FieldPath;
use crate::session::{Gap, GapResolutionSession, SessionState};
use crate::suggestion::Suggestion;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SessionId(s.parse()?))
    }
}

type SharedSession = Arc<Mutex<GapResolutionSession>>;

pub struct SessionRegistry {
    sessions: DashMap<SessionId, SharedSession>,
    policy: Arc<DefaultPolicy>,
}

impl SessionRegistry {
    pub fn new(policy: Arc<DefaultPolicy>) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            policy,
        }
    }

    pub fn start_session(&self, partial: BuildingModel) -> SessionId {
        self.start_session_with_hints(partial, Vec::new())
    }

    pub fn start_session_with_hints(
        &self,
        partial: BuildingModel,
        hints: Vec<Suggestion>,
    ) -> SessionId {
        let session = GapResolutionSession::new(partial, Arc::clone(&self.policy)).with_hints(hints);
        let id = SessionId::new();
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        info!(session = %id, "registered session");
        id
    }

    /// Shared handle to a session.
    pub fn session(&self, id: SessionId) -> Result<SharedSession> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::SessionNotFound(id))
    }

    /// Run `f` with the session locked.
    pub fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut GapResolutionSession) -> T,
    ) -> Result<T> {
        let session = self.session(id)?;
        let mut guard = lock(&session);
        Ok(f(&mut guard))
    }

    pub fn next_question(&self, id: SessionId) -> Result<Option<Gap>> {
        self.with_session(id, |session| session.next_question())
    }

    pub fn submit_answer(&self, id: SessionId, path: FieldPath, value: Value) -> Result<SessionState> {
        self.with_session(id, |session| session.submit_answer(path, value))?
    }

    /// Close the session and forget it. A session that still has Error
    /// issues stays registered.
    pub fn close_session(&self, id: SessionId) -> Result<Arc<BuildingModel>> {
        let model = self.with_session(id, |session| session.close())??;
        self.sessions.remove(&id);
        info!(session = %id, "removed closed session");
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// A panic while a session was locked leaves its last consistent snapshot,
/// since every change is a single assignment.
fn lock(session: &Mutex<GapResolutionSession>) -> MutexGuard<'_, GapResolutionSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::minimal_model;
    use crate::model::Field;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(DefaultPolicy::builtin()))
    }

    fn without_hvac() -> BuildingModel {
        let mut model = minimal_model();
        model.zones[0].hvac_system = Field::Absent;
        model.hvac_systems.clear();
        model
    }

    #[test]
    fn session_api_round() {
        let registry = registry();
        let id = registry.start_session(without_hvac());
        let gap = registry.next_question(id).unwrap().unwrap();
        assert_eq!(gap.path.to_string(), "zones[0].hvac_system");

        let state = registry
            .submit_answer(id, gap.path, json!({ "kind": "simple" }))
            .unwrap();
        assert_eq!(state, SessionState::Resolved);

        let model = registry.close_session(id).unwrap();
        assert_eq!(model.hvac_systems.len(), 1);
        assert!(registry.is_empty());
        assert_matches!(registry.next_question(id), Err(Error::SessionNotFound(missing)) => {
            assert_eq!(missing, id);
        });
    }

    #[test]
    fn failed_close_keeps_the_session() {
        let registry = registry();
        let id = registry.start_session(without_hvac());
        assert_matches!(registry.close_session(id), Err(Error::Validation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_session() {
        let registry = registry();
        assert_matches!(
            registry.submit_answer(SessionId::new(), "metadata.north_axis".parse().unwrap(), json!(1)),
            Err(Error::SessionNotFound(_))
        );
    }

    #[test]
    fn session_id_text_form() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn concurrent_answers_serialize_per_session() {
        let registry = Arc::new(registry());
        let ids: Vec<_> = (0..4).map(|_| registry.start_session(minimal_model())).collect();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let id = ids[i % ids.len()];
                std::thread::spawn(move || {
                    registry
                        .submit_answer(id, "metadata.north_axis".parse().unwrap(), json!(i))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), SessionState::Resolved);
        }

        for id in ids {
            let revisions = registry
                .with_session(id, |session| session.history().len())
                .unwrap();
            assert_eq!(revisions, 4);
        }
    }
}
