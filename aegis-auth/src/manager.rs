//! `SessionManager`: the public façade for login/refresh/verify/logout and
//! permission checks (spec §4.5). Owns the user store, session store, JWT
//! issuer, audit log, and the login/refresh rate limiters.

use crate::audit::{AuditEvent, AuditLog};
use crate::jwt::{JwtIssuer, JwtVerifyError};
use crate::permission::{self, Permission, PermissionDecision};
use crate::session::{generate_refresh_token, Session, SessionStore};
use crate::user::UserStore;
use aegis_core::{AegisResult, AuthConfig, AuthError, EntityIdType, SessionId, UserId};
use aegis_resilience::KeyedSlidingWindow;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug)]
pub struct LoginOutcome {
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct SessionManager {
    users: UserStore,
    sessions: SessionStore,
    jwt: JwtIssuer,
    audit: AuditLog,
    config: AuthConfig,
    /// Keyed by `(username, ip)` per spec §4.5: one user's or attacker's
    /// attempts never consume another key's budget.
    login_limiter: KeyedSlidingWindow<(String, String)>,
    /// Keyed by session id, checked only after the refresh token has
    /// resolved to a session.
    refresh_limiter: KeyedSlidingWindow<SessionId>,
}

impl SessionManager {
    pub fn new(
        users: UserStore,
        jwt: JwtIssuer,
        audit: AuditLog,
        config: AuthConfig,
        auth_per_min: u32,
        refresh_per_min: u32,
    ) -> Self {
        Self {
            users,
            sessions: SessionStore::new(),
            jwt,
            audit,
            config,
            login_limiter: KeyedSlidingWindow::new(auth_per_min, Duration::from_secs(60)),
            refresh_limiter: KeyedSlidingWindow::new(refresh_per_min, Duration::from_secs(60)),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str, ip: Option<String>, user_agent: Option<String>) -> AegisResult<LoginOutcome> {
        let login_key = (username.to_string(), ip.clone().unwrap_or_default());
        if !self.login_limiter.allow(login_key) {
            self.audit
                .record(AuditEvent {
                    username: Some(username.to_string()),
                    action: "login".to_string(),
                    resource: "session".to_string(),
                    ip: ip.clone(),
                    user_agent: user_agent.clone(),
                    success: false,
                    error: Some("rate_limited".to_string()),
                    ..Default::default()
                })
                .await
                .ok();
            return Err(AuthError::RateLimited { retry_after_ms: 60_000 }.into());
        }

        let mut user = match self.users.by_username(username) {
            Some(u) => u,
            None => {
                self.audit
                    .record(AuditEvent {
                        username: Some(username.to_string()),
                        action: "login".to_string(),
                        resource: "session".to_string(),
                        ip,
                        user_agent,
                        success: false,
                        error: Some("invalid_credentials".to_string()),
                        ..Default::default()
                    })
                    .await
                    .ok();
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let now = Utc::now();
        if let Some(locked_until) = user.locked_until {
            if user.failed_attempts >= self.config.lockout_threshold && now < locked_until {
                self.audit
                    .record(AuditEvent {
                        actor: Some(user.id),
                        username: Some(username.to_string()),
                        action: "login".to_string(),
                        resource: "session".to_string(),
                        ip,
                        user_agent,
                        success: false,
                        error: Some("account_locked".to_string()),
                        ..Default::default()
                    })
                    .await
                    .ok();
                return Err(AuthError::AccountLocked { locked_until }.into());
            }
        }

        if !user.password_hash.verify(password) {
            user.failed_attempts += 1;
            if user.failed_attempts >= self.config.lockout_threshold {
                user.locked_until = Some(now + chrono::Duration::seconds(self.config.lockout_duration_sec as i64));
            }
            self.users.update(user.clone());
            self.audit
                .record(AuditEvent {
                    actor: Some(user.id),
                    username: Some(username.to_string()),
                    action: "login".to_string(),
                    resource: "session".to_string(),
                    ip,
                    user_agent,
                    success: false,
                    error: Some("invalid_credentials".to_string()),
                    ..Default::default()
                })
                .await
                .ok();
            return Err(AuthError::InvalidCredentials.into());
        }

        user.failed_attempts = 0;
        user.locked_until = None;
        self.users.update(user.clone());

        let session_id = SessionId::generate();
        let access_token = self.jwt.issue(user.id, session_id, &user.role, now, self.config.access_ttl_sec);
        let refresh_token = generate_refresh_token();
        let session = Session {
            id: session_id,
            user_id: user.id,
            role: user.role.clone(),
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            issued_at: now,
            access_expires_at: now + chrono::Duration::seconds(self.config.access_ttl_sec as i64),
            refresh_expires_at: now + chrono::Duration::seconds(self.config.refresh_ttl_sec as i64),
        };
        self.sessions.insert(session);

        self.audit
            .record(AuditEvent {
                actor: Some(user.id),
                username: Some(username.to_string()),
                action: "login".to_string(),
                resource: "session".to_string(),
                session_id: Some(session_id),
                ip,
                user_agent,
                success: true,
                ..Default::default()
            })
            .await
            .ok();

        Ok(LoginOutcome { session_id, access_token, refresh_token })
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> AegisResult<LoginOutcome> {
        let session = self
            .sessions
            .find_by_refresh_token(refresh_token)
            .ok_or(AuthError::TokenInvalid)?;

        if !self.refresh_limiter.allow(session.id) {
            return Err(AuthError::RateLimited { retry_after_ms: 60_000 }.into());
        }

        let now = Utc::now();
        if now >= session.refresh_expires_at {
            self.sessions.remove(session.id);
            return Err(AuthError::SessionExpired.into());
        }

        let new_access = self.jwt.issue(session.user_id, session.id, &session.role, now, self.config.access_ttl_sec);
        let new_refresh = generate_refresh_token();
        let rotated = Session {
            access_token: new_access.clone(),
            refresh_token: new_refresh.clone(),
            issued_at: now,
            access_expires_at: now + chrono::Duration::seconds(self.config.access_ttl_sec as i64),
            refresh_expires_at: now + chrono::Duration::seconds(self.config.refresh_ttl_sec as i64),
            ..session
        };
        self.sessions.replace(rotated);

        let username = self.users.by_id(session.user_id).map(|u| u.username);
        self.audit
            .record(AuditEvent {
                actor: Some(session.user_id),
                username,
                action: "refresh".to_string(),
                resource: "session".to_string(),
                session_id: Some(session.id),
                success: true,
                ..Default::default()
            })
            .await
            .ok();

        Ok(LoginOutcome {
            session_id: session.id,
            access_token: new_access,
            refresh_token: new_refresh,
        })
    }

    #[instrument(skip(self, access_token))]
    pub fn verify(&self, access_token: &str) -> AegisResult<(UserId, Session)> {
        let claims = self.jwt.verify(access_token).map_err(|e| match e {
            JwtVerifyError::Expired => AuthError::SessionExpired,
            JwtVerifyError::Invalid => AuthError::TokenInvalid,
        })?;
        let user_id: UserId = claims.sub.parse().map_err(|_| AuthError::TokenInvalid)?;
        let claimed_session: SessionId = claims.sid.parse().map_err(|_| AuthError::TokenInvalid)?;

        let session = self
            .sessions
            .all()
            .into_iter()
            .find(|s| s.user_id == user_id && s.access_token == access_token)
            .ok_or(AuthError::SessionRevoked)?;

        if session.id != claimed_session {
            return Err(AuthError::SessionRevoked.into());
        }

        Ok((user_id, session))
    }

    #[instrument(skip(self))]
    pub fn logout(&self, session_id: SessionId) {
        self.sessions.remove(session_id);
    }

    pub fn check_permission(
        &self,
        user_id: UserId,
        grants: &[Permission],
        resource: &str,
        action: &str,
        conditions: Option<&HashMap<String, serde_json::Value>>,
    ) -> PermissionDecision {
        let is_admin = self.users.by_id(user_id).map(|u| u.is_admin()).unwrap_or(false);
        permission::check(is_admin, grants, resource, action, conditions)
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::User;

    fn manager(dir: &std::path::Path) -> SessionManager {
        let users = UserStore::new();
        users.insert(User::new("alice", "correct horse battery", "analyst"));
        let jwt = JwtIssuer::new("test-signing-secret-test", None);
        let audit = AuditLog::open(dir, "0123456789abcdef0123456789abcdef").unwrap();
        SessionManager::new(users, jwt, audit, AuthConfig::default(), 100, 100)
    }

    #[tokio::test]
    async fn successful_login_issues_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let outcome = manager.login("alice", "correct horse battery", None, None).await.unwrap();
        assert_eq!(manager.session_count(), 1);
        let (_, session) = manager.verify(&outcome.access_token).unwrap();
        assert_eq!(session.id, outcome.session_id);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let err = manager.login("alice", "wrong", None, None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_credentials");
        let user = manager.users().by_username("alice").unwrap();
        assert_eq!(user.failed_attempts, 1);
    }

    #[tokio::test]
    async fn lockout_engages_after_threshold_failures() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        for _ in 0..AuthConfig::default().lockout_threshold {
            let _ = manager.login("alice", "wrong", None, None).await;
        }
        let err = manager.login("alice", "correct horse battery", None, None).await.unwrap_err();
        assert_eq!(err.code(), "account_locked");
    }

    #[tokio::test]
    async fn refresh_rotates_both_tokens_and_invalidates_the_old_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let outcome = manager.login("alice", "correct horse battery", None, None).await.unwrap();
        let rotated = manager.refresh(&outcome.refresh_token).await.unwrap();
        assert_ne!(rotated.access_token, outcome.access_token);
        assert_ne!(rotated.refresh_token, outcome.refresh_token);
        let err = manager.refresh(&outcome.refresh_token).await.unwrap_err();
        assert_eq!(err.code(), "token_invalid");
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let outcome = manager.login("alice", "correct horse battery", None, None).await.unwrap();
        manager.logout(outcome.session_id);
        let err = manager.verify(&outcome.access_token).unwrap_err();
        assert_eq!(err.code(), "session_revoked");
    }
}
