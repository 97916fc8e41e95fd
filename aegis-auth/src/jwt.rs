//! Access tokens: JWT HS256, claims `{sub, role, iat, exp, sid}` (spec §4.5)
//! — `sid` binds the token to the session it was issued for, so a verifier
//! can cross-check the claimed session against the one it resolves.
//! Verification accepts the previous signing secret for one access-token
//! TTL window after a key rotation (spec §6), trying the current secret
//! first.

use aegis_core::{SessionId, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub sid: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwtVerifyError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

pub struct JwtIssuer {
    secret: String,
    previous_secret: Option<String>,
}

impl JwtIssuer {
    pub fn new(secret: impl Into<String>, previous_secret: Option<String>) -> Self {
        Self {
            secret: secret.into(),
            previous_secret,
        }
    }

    pub fn issue(&self, user_id: UserId, session_id: SessionId, role: &str, issued_at: DateTime<Utc>, ttl_sec: u64) -> String {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: issued_at.timestamp() + ttl_sec as i64,
            sid: session_id.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HS256 encoding with a valid key never fails")
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, JwtVerifyError> {
        let validation = Validation::new(Algorithm::HS256);
        if let Ok(data) = decode::<AccessClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation) {
            return Ok(data.claims);
        }
        if let Some(prev) = &self.previous_secret {
            if let Ok(data) = decode::<AccessClaims>(token, &DecodingKey::from_secret(prev.as_bytes()), &validation) {
                return Ok(data.claims);
            }
        }
        // jsonwebtoken folds expiry and signature failures into one error
        // kind by default; re-decode without expiry validation to tell them
        // apart for the caller.
        let mut lenient = Validation::new(Algorithm::HS256);
        lenient.validate_exp = false;
        if decode::<AccessClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &lenient).is_ok() {
            return Err(JwtVerifyError::Expired);
        }
        Err(JwtVerifyError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::EntityIdType;

    #[test]
    fn issues_and_verifies_a_token() {
        let issuer = JwtIssuer::new("signing-secret-signing-secret", None);
        let user = UserId::generate();
        let session = SessionId::generate();
        let token = issuer.issue(user, session, "analyst", Utc::now(), 900);
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.role, "analyst");
        assert_eq!(claims.sid, session.to_string());
    }

    #[test]
    fn rejects_tokens_with_wrong_signature() {
        let issuer_a = JwtIssuer::new("secret-a-secret-a", None);
        let issuer_b = JwtIssuer::new("secret-b-secret-b", None);
        let token = issuer_a.issue(UserId::generate(), SessionId::generate(), "user", Utc::now(), 900);
        assert_eq!(issuer_b.verify(&token), Err(JwtVerifyError::Invalid));
    }

    #[test]
    fn expired_token_is_distinguished_from_invalid() {
        let issuer = JwtIssuer::new("signing-secret-signing-secret", None);
        let past = Utc::now() - chrono::Duration::seconds(3600);
        let token = issuer.issue(UserId::generate(), SessionId::generate(), "user", past, 1);
        assert_eq!(issuer.verify(&token), Err(JwtVerifyError::Expired));
    }

    #[test]
    fn accepts_previous_secret_during_rotation_window() {
        let old_issuer = JwtIssuer::new("old-secret-old-secret", None);
        let token = old_issuer.issue(UserId::generate(), SessionId::generate(), "user", Utc::now(), 900);
        let new_issuer = JwtIssuer::new("new-secret-new-secret", Some("old-secret-old-secret".to_string()));
        assert!(new_issuer.verify(&token).is_ok());
    }
}
