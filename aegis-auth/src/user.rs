//! User accounts and the login/lockout state machine (spec §4.5).
//!
//! There is deliberately no field for a plaintext password anywhere in
//! `User` or its persisted form — only `PasswordHash`. A legacy export that
//! still carries plaintext credentials fails to deserialize into this type
//! at all, so migration from that format fails closed rather than silently
//! accepting a weaker credential.

use crate::password::PasswordHash;
use aegis_core::{ConfigError, EntityIdType, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: PasswordHash,
    pub role: String,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, password: &str, role: impl Into<String>) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into(),
            password_hash: PasswordHash::new(password),
            role: role.into(),
            failed_attempts: 0,
            locked_until: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Loads users from a JSON array of `User` records. Fails closed: any
    /// record missing a structured `password_hash` fails to parse at all.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let users: Vec<User> = serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
            field: "users".to_string(),
            reason: e.to_string(),
        })?;
        let store = Self::new();
        for user in users {
            store.insert(user);
        }
        Ok(store)
    }

    pub fn insert(&self, user: User) {
        self.users.write().insert(user.username.clone(), user);
    }

    pub fn by_username(&self, username: &str) -> Option<User> {
        self.users.read().get(username).cloned()
    }

    pub fn by_id(&self, id: UserId) -> Option<User> {
        self.users.read().values().find(|u| u.id == id).cloned()
    }

    pub fn update(&self, user: User) {
        self.users.write().insert(user.username.clone(), user);
    }

    pub fn all(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_legacy_plaintext_password_records() {
        let legacy = r#"[{"id":"00000000-0000-0000-0000-000000000000","username":"bob","password":"hunter2","role":"user"}]"#;
        let err = UserStore::from_json(legacy).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn round_trips_a_well_formed_user_list() {
        let store = UserStore::new();
        store.insert(User::new("alice", "s3cret-passphrase", "admin"));
        let json = serde_json::to_string(&store.all()).unwrap();
        let reloaded = UserStore::from_json(&json).unwrap();
        assert!(reloaded.by_username("alice").is_some());
    }
}
