//! Process-wide configuration surface (spec §6).
//!
//! Loaded once at startup from a JSON file, then overridden by environment
//! variables, then validated. The resulting `Config` is constructed once and
//! passed explicitly to every component — there is no ambient global.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn env_override(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key).cloned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Required, >= 32 bytes. Keys every AES-256-GCM blob file via scrypt.
    pub encryption_key: String,
    /// Required. HS256 JWT signing key.
    pub jwt_secret: String,
    /// Previous signing key, accepted for one access-token-TTL window after
    /// a key rotation (spec §6).
    pub previous_jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_ttl_sec: u64,
    pub refresh_ttl_sec: u64,
    pub lockout_threshold: u32,
    pub lockout_duration_sec: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl_sec: 900,
            refresh_ttl_sec: 60 * 60 * 24 * 30,
            lockout_threshold: 5,
            lockout_duration_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub base_ttl_sec: u64,
    pub max_ttl_sec: u64,
    pub similar_threshold: f32,
    pub embedding_threshold: f32,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hit_saturation: f64,
    pub top_k_similar: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl_sec: 60 * 60,
            max_ttl_sec: 60 * 60 * 24,
            similar_threshold: 0.95,
            embedding_threshold: 0.85,
            max_entries: 100_000,
            max_bytes: 256 * 1024 * 1024,
            hit_saturation: 10.0,
            top_k_similar: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub working_capacity: usize,
    pub retrieve_batch_concurrency: usize,
    pub code_loading_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: 10,
            retrieve_batch_concurrency: 5,
            code_loading_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub llm_per_sec: f64,
    pub auth_per_min: u32,
    pub refresh_per_min: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            llm_per_sec: 5.0,
            auth_per_min: 5,
            refresh_per_min: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_probes: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub security: SecurityConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ann: AnnConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Config {
    /// Load from a JSON document, then apply environment overrides, then
    /// validate. `env` is passed explicitly (rather than read from
    /// `std::env` here) so tests and callers control it deterministically.
    pub fn load(json: &str, env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config: Config =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
                field: "<root>".to_string(),
                reason: e.to_string(),
            })?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env_override(env, "AEGIS_SECURITY_ENCRYPTION_KEY") {
            self.security.encryption_key = v;
        }
        if let Some(v) = env_override(env, "AEGIS_SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Some(v) = env_override(env, "AEGIS_AUTH_ACCESS_TTL_SEC") {
            if let Ok(n) = v.parse() {
                self.auth.access_ttl_sec = n;
            }
        }
        if let Some(v) = env_override(env, "AEGIS_AUTH_REFRESH_TTL_SEC") {
            if let Ok(n) = v.parse() {
                self.auth.refresh_ttl_sec = n;
            }
        }
        if let Some(v) = env_override(env, "AEGIS_CACHE_MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                self.cache.max_entries = n;
            }
        }
        if let Some(v) = env_override(env, "AEGIS_CACHE_MAX_BYTES") {
            if let Ok(n) = v.parse() {
                self.cache.max_bytes = n;
            }
        }
        if let Some(v) = env_override(env, "AEGIS_LIMITS_LLM_PER_SEC") {
            if let Ok(n) = v.parse() {
                self.limits.llm_per_sec = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.encryption_key.len() < 32 {
            return Err(ConfigError::SecretTooShort {
                field: "security.encryption_key".to_string(),
                min_bytes: 32,
                got_bytes: self.security.encryption_key.len(),
            });
        }
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "security.jwt_secret".to_string(),
            });
        }
        if self.cache.similar_threshold < self.cache.embedding_threshold {
            return Err(ConfigError::InvalidValue {
                field: "cache.similar_threshold".to_string(),
                reason: "must be >= cache.embedding_threshold".to_string(),
            });
        }
        Ok(())
    }
}
