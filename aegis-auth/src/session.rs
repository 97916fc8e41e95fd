//! Sessions and refresh-token rotation (spec §4.5). Refresh tokens are
//! opaque CSPRNG bytes, never stored in plaintext outside the session map.

use aegis_core::{EntityIdType, SessionId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub role: String,
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// 32 bytes of CSPRNG output, hex-encoded.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.id, session);
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().get(&id).cloned()
    }

    /// Linear scan with constant-time comparison per candidate, per the
    /// spec's refresh-token matching requirement.
    pub fn find_by_refresh_token(&self, token: &str) -> Option<Session> {
        let token_bytes = token.as_bytes();
        self.sessions
            .read()
            .values()
            .find(|s| {
                let stored = s.refresh_token.as_bytes();
                stored.len() == token_bytes.len() && bool::from(stored.ct_eq(token_bytes))
            })
            .cloned()
    }

    pub fn replace(&self, session: Session) {
        self.sessions.write().insert(session.id, session);
    }

    /// Idempotent: removing an id that doesn't exist is not an error.
    pub fn remove(&self, id: SessionId) {
        self.sessions.write().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn all(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
