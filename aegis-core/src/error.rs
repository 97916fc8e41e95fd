//! Error kinds shared across the agent core. Propagation policy:
//! `ConfigError`/`CorruptError` are fatal at startup, `AuthError`/
//! `PermissionDenied` are surfaced verbatim and always audited, `NotFound`
//! is never logged as an error, `Transient` is retried by
//! `aegis-resilience` and remapped to `RetryExhausted` if it escapes.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Fatal configuration problems. Propagation stops the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("secret '{field}' must be at least {min_bytes} bytes, got {got_bytes}")]
    SecretTooShort {
        field: String,
        min_bytes: usize,
        got_bytes: usize,
    },
}

/// Authentication failures (spec §7 `AuthError`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked until {locked_until}")]
    AccountLocked { locked_until: chrono::DateTime<chrono::Utc> },

    #[error("session expired")]
    SessionExpired,

    #[error("token invalid")]
    TokenInvalid,

    #[error("session revoked")]
    SessionRevoked,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

/// A permission check failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("permission denied: {action} on {resource}")]
pub struct PermissionDeniedError {
    pub action: String,
    pub resource: String,
    pub reason: String,
}

/// A lookup found nothing. Never logged as an error per propagation policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not found: {entity} {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Encrypted blob failed authentication or version checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorruptError {
    #[error("ciphertext authentication failed for {store}")]
    TagMismatch { store: String },

    #[error("unsupported on-disk version {got} for {store}, expected {expected}")]
    VersionMismatch {
        store: String,
        expected: u8,
        got: u8,
    },

    #[error("bad magic bytes for {store}")]
    BadMagic { store: String },

    #[error("no encryption key configured for {store}")]
    KeyMissing { store: String },
}

/// A network/IO/LLM failure that is safe to retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transient failure in {operation}: {reason}")]
pub struct TransientError {
    pub operation: String,
    pub reason: String,
}

/// The protected endpoint's circuit is open; the call was shed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit open for {endpoint}")]
pub struct CircuitOpenError {
    pub endpoint: String,
}

/// A retry policy exhausted its attempts.
#[derive(Debug, Clone, Error)]
#[error("retry exhausted after {attempts} attempts: {last_error}")]
pub struct RetryExhaustedError {
    pub attempts: u32,
    pub last_error: String,
}

/// The downstream LLM returned a permanent error or exhausted retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("generation failed: {reason}")]
pub struct GenerationFailedError {
    pub reason: String,
}

/// Vector dimension / index errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Memory system failures (spec §4.4).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("refusing to rehydrate procedure '{name}': code loading is disabled")]
    CodeLoadingDisabled { name: String },

    #[error("no procedure registered under '{name}'")]
    ProcedureNotRegistered { name: String },

    #[error("memory system requires an encryption key")]
    EncryptionKeyMissing,
}

/// Top-level error type all public operations may surface.
#[derive(Debug, Clone, Error)]
pub enum AegisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDeniedError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Corrupt(#[from] CorruptError),
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
    #[error(transparent)]
    RetryExhausted(#[from] RetryExhaustedError),
    #[error(transparent)]
    GenerationFailed(#[from] GenerationFailedError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl AegisError {
    /// Stable machine-readable error code, never changes between releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            Self::Auth(AuthError::AccountLocked { .. }) => "account_locked",
            Self::Auth(AuthError::SessionExpired) => "session_expired",
            Self::Auth(AuthError::TokenInvalid) => "token_invalid",
            Self::Auth(AuthError::SessionRevoked) => "session_revoked",
            Self::Auth(AuthError::RateLimited { .. }) => "rate_limited",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Corrupt(_) => "corrupt",
            Self::Transient(_) => "transient",
            Self::CircuitOpen(_) => "circuit_open",
            Self::RetryExhausted(_) => "retry_exhausted",
            Self::GenerationFailed(_) => "generation_failed",
            Self::Vector(_) => "vector_error",
            Self::Memory(_) => "memory_error",
        }
    }

    /// Sanitized detail map safe to surface to callers: never includes
    /// secrets, passwords, or raw tokens.
    pub fn details(&self) -> HashMap<String, Value> {
        let mut details = HashMap::new();
        match self {
            Self::Auth(AuthError::AccountLocked { locked_until }) => {
                details.insert("locked_until".to_string(), Value::String(locked_until.to_rfc3339()));
            }
            Self::Auth(AuthError::RateLimited { retry_after_ms }) => {
                details.insert("retry_after_ms".to_string(), Value::from(*retry_after_ms));
            }
            Self::NotFound(e) => {
                details.insert("entity".to_string(), Value::String(e.entity.to_string()));
            }
            Self::Vector(VectorError::DimensionMismatch { expected, got }) => {
                details.insert("expected".to_string(), Value::from(*expected));
                details.insert("got".to_string(), Value::from(*got));
            }
            _ => {}
        }
        details
    }
}

pub type AegisResult<T> = Result<T, AegisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        let e: AegisError = AuthError::InvalidCredentials.into();
        assert_eq!(e.code(), "invalid_credentials");
    }

    #[test]
    fn details_never_echo_raw_tokens() {
        let e: AegisError = AuthError::TokenInvalid.into();
        assert!(e.details().is_empty());
    }
}
