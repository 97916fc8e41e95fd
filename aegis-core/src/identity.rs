//! Type-safe entity identifiers.
//!
//! Every id in the agent core is a UUID newtype so that, for instance, a
//! `SessionId` can never be passed where a `UserId` is expected. All ids are
//! UUIDv7 by default so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Trait implemented by every typed entity id.
pub trait EntityIdType:
    Copy + Clone + Eq + PartialEq + Hash + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static
{
    /// Human-readable name of the entity this id identifies (e.g. "user").
    const ENTITY_NAME: &'static str;

    /// Wrap a raw UUID.
    fn new(uuid: Uuid) -> Self;

    /// Unwrap to the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh, timestamp-sortable id.
    fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The all-zeros id, used as a sentinel.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

/// Error returned when parsing a typed id from a string fails.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} id from '{}': {}",
            self.entity_name, self.input, self.source
        )
    }
}

impl std::error::Error for EntityIdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|source| EntityIdParseError {
                        entity_name: $entity,
                        input: s.to_string(),
                        source,
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_entity_id!(UserId, "user", "Identifies a user account.");
define_entity_id!(SessionId, "session", "Identifies a login session.");
define_entity_id!(AuditEntryId, "audit_entry", "Identifies an audit log entry.");
define_entity_id!(DocumentId, "document", "Identifies a document chunk in the vector store.");
define_entity_id!(CacheEntryId, "cache_entry", "Identifies a cache entry (sha256 of the normalized query, re-encoded as a UUID-shaped id is NOT used — see `CacheEntryId::from_qid`).");
define_entity_id!(MemoryItemId, "memory_item", "Identifies a memory item across episodic/semantic/procedural/working stores.");

impl CacheEntryId {
    /// Cache entry ids are `sha256(normalized_query)`, not random UUIDs;
    /// this constructs the id deterministically from that digest so lookups
    /// are id-equality checks.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        // Fold the 32-byte digest into a UUID-shaped 16 bytes (first 16 bytes
        // of the digest) so the digest remains recoverable for debugging via
        // `Display` while keeping `CacheEntryId` a `Copy` newtype.
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[0..16]);
        Self(Uuid::from_bytes(bytes))
    }
}
