//! PBKDF2-SHA256 password hashing (spec §4.5): per-user 16-byte random
//! salt, >=100,000 iterations, 32-byte derived hash, constant-time verify.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const MIN_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PasswordHash {
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
    pub iterations: u32,
}

impl PasswordHash {
    /// Hash `password` with a fresh random salt and `MIN_ITERATIONS` rounds.
    pub fn new(password: &str) -> Self {
        Self::with_iterations(password, MIN_ITERATIONS)
    }

    pub fn with_iterations(password: &str, iterations: u32) -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = derive(password, &salt, iterations);
        Self { salt, hash, iterations }
    }

    /// Verify `password` against this hash in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = derive(password, &self.salt, self.iterations);
        candidate.ct_eq(&self.hash).into()
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut out = vec![0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn correct_password_verifies() {
        let hash = PasswordHash::new("correct horse battery staple");
        assert!(hash.verify("correct horse battery staple"));
    }

    #[test]
    fn wrong_password_fails() {
        let hash = PasswordHash::new("correct horse battery staple");
        assert!(!hash.verify("wrong password"));
    }

    #[test]
    fn salts_are_random_across_hashes() {
        let a = PasswordHash::new("same password");
        let b = PasswordHash::new("same password");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn enforces_minimum_iterations_by_default() {
        let hash = PasswordHash::new("x");
        assert!(hash.iterations >= MIN_ITERATIONS);
    }

    #[test]
    fn roundtrips_through_json() {
        let hash = PasswordHash::new("p");
        let json = serde_json::to_string(&hash).unwrap();
        let back: PasswordHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }

    proptest! {
        // verify() must agree with direct equality of the two passwords
        // for any pair the generator produces, regardless of length or
        // shared prefixes/suffixes — the constant-time compare changes
        // *how* the comparison runs, never *what* it returns.
        #[test]
        fn verify_matches_equality_for_any_two_passwords(a in ".{0,64}", b in ".{0,64}") {
            let hash = PasswordHash::with_iterations(&a, 1);
            prop_assert_eq!(hash.verify(&b), a == b);
        }
    }
}
