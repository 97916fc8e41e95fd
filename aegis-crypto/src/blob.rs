//! Encrypted blob file format shared by the vector store, audit log and cache
//! export (spec §4.2):
//!
//! ```text
//! file := magic(4) || version(1) || iv(12) || tag(16) || ciphertext(*)
//! ```
//!
//! Writes are atomic: `path.tmp` is written, fsynced, then renamed over
//! `path`. Reads fail with `CorruptError` on tag, magic, or version mismatch.

use aegis_core::CorruptError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use std::io;
use std::path::Path;

const MAGIC: &[u8; 4] = b"AEG1";
const VERSION: u8 = 1;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` and return the on-disk frame.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(key.into());
    let mut iv_bytes = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv_bytes);
    let nonce = Nonce::from_slice(&iv_bytes);

    // The tag authenticates ciphertext and version (the version byte is AAD).
    let ciphertext_and_tag = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &[VERSION],
            },
        )
        .expect("aes-gcm encryption does not fail for valid inputs");
    let split_at = ciphertext_and_tag.len() - TAG_LEN;
    let (ciphertext, tag) = ciphertext_and_tag.split_at(split_at);

    let mut frame = Vec::with_capacity(4 + 1 + IV_LEN + TAG_LEN + ciphertext.len());
    frame.extend_from_slice(MAGIC);
    frame.push(VERSION);
    frame.extend_from_slice(&iv_bytes);
    frame.extend_from_slice(tag);
    frame.extend_from_slice(ciphertext);
    frame
}

/// Decrypt a frame produced by [`seal`]. Fails with `CorruptError` if the
/// magic bytes, version, or authentication tag don't check out.
pub fn open(key: &[u8; 32], frame: &[u8], store: &str) -> Result<Vec<u8>, CorruptError> {
    let header_len = 4 + 1 + IV_LEN + TAG_LEN;
    if frame.len() < header_len {
        return Err(CorruptError::BadMagic {
            store: store.to_string(),
        });
    }
    let (magic, rest) = frame.split_at(4);
    if magic != MAGIC {
        return Err(CorruptError::BadMagic {
            store: store.to_string(),
        });
    }
    let (version, rest) = rest.split_at(1);
    let version = version[0];
    if version != VERSION {
        return Err(CorruptError::VersionMismatch {
            store: store.to_string(),
            expected: VERSION,
            got: version,
        });
    }
    let (iv, rest) = rest.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut ciphertext_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    ciphertext_and_tag.extend_from_slice(ciphertext);
    ciphertext_and_tag.extend_from_slice(tag);

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext_and_tag,
                aad: &[version],
            },
        )
        .map_err(|_| CorruptError::TagMismatch {
            store: store.to_string(),
        })
}

/// Atomically write `plaintext`, encrypted under `key`, to `path`:
/// write `path.tmp`, fsync, rename over `path`.
pub async fn write_atomic(path: &Path, key: &[u8; 32], plaintext: &[u8]) -> io::Result<()> {
    let frame = seal(key, plaintext);
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(&frame).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Read and decrypt a blob file written by [`write_atomic`].
pub async fn read_encrypted(
    path: &Path,
    key: &[u8; 32],
    store: &str,
) -> Result<Vec<u8>, ReadBlobError> {
    let bytes = tokio::fs::read(path).await.map_err(ReadBlobError::Io)?;
    open(key, &bytes, store).map_err(ReadBlobError::Corrupt)
}

#[derive(Debug)]
pub enum ReadBlobError {
    Io(io::Error),
    Corrupt(CorruptError),
}

impl std::fmt::Display for ReadBlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadBlobError::Io(e) => write!(f, "io error: {}", e),
            ReadBlobError::Corrupt(e) => write!(f, "{}", e),
        }
    }
}
impl std::error::Error for ReadBlobError {}
