//! Encrypted blob persistence shared by the vector store, memory system,
//! audit log, and cache export (spec §4.2): AES-256-GCM framed files with
//! scrypt-derived per-store keys and atomic tmp-then-rename writes.

mod blob;
mod kdf;
mod store;

pub use blob::{open, seal, ReadBlobError};
pub use kdf::{derive_store_key, MIN_SECRET_LEN};
pub use store::{AppendOnlyStore, EncryptedStore};
