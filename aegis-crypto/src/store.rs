//! The common persistence helper every core store (vector index, audit log,
//! cache export) builds on: a named store with its own derived key.

use crate::blob::{self, ReadBlobError};
use crate::kdf::derive_store_key;
use aegis_core::{ConfigError, CorruptError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A single encrypted file, keyed by `scrypt(secret, store_name)`.
#[derive(Debug)]
pub struct EncryptedStore {
    name: String,
    path: PathBuf,
    key: [u8; 32],
}

impl EncryptedStore {
    /// Construct a store. Fails closed (`ConfigError`) if `secret` is
    /// shorter than 32 bytes.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>, secret: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let key = derive_store_key(secret, &name)?;
        Ok(Self {
            name,
            path: path.into(),
            key,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, plaintext), fields(store = %self.name))]
    pub async fn write(&self, plaintext: &[u8]) -> io::Result<()> {
        blob::write_atomic(&self.path, &self.key, plaintext).await
    }

    #[instrument(skip(self), fields(store = %self.name))]
    pub async fn read(&self) -> Result<Vec<u8>, ReadBlobError> {
        blob::read_encrypted(&self.path, &self.key, &self.name).await
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }
}

/// Append-style store that keeps writing successive encrypted frames to a
/// single file, used by the rotating audit log (each append is its own
/// `seal`d frame with a length prefix so frames can be read back in order).
pub struct AppendOnlyStore {
    name: String,
    path: PathBuf,
    key: [u8; 32],
}

impl AppendOnlyStore {
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>, secret: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let key = derive_store_key(secret, &name)?;
        Ok(Self {
            name,
            path: path.into(),
            key,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one encrypted, length-prefixed frame to the file.
    pub async fn append(&self, plaintext: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let frame = blob::seal(&self.key, plaintext);
        let len = (frame.len() as u32).to_be_bytes();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&len).await?;
        file.write_all(&frame).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read back every frame in append order.
    pub async fn read_all(&self) -> Result<Vec<Vec<u8>>, ReadBlobError> {
        let bytes = tokio::fs::read(&self.path).await.unwrap_or_default();
        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset + 4 <= bytes.len() {
            let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > bytes.len() {
                return Err(ReadBlobError::Corrupt(CorruptError::BadMagic {
                    store: self.name.clone(),
                }));
            }
            let frame = &bytes[offset..offset + len];
            let plaintext = crate::blob::open(&self.key, frame, &self.name)
                .map_err(ReadBlobError::Corrupt)?;
            out.push(plaintext);
            offset += len;
        }
        Ok(out)
    }

    pub async fn file_len(&self) -> u64 {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }
}
