//! Query normalization and id derivation (spec §4.6 step 1).

use aegis_core::CacheEntryId;
use sha2::{Digest, Sha256};

/// Lowercase, collapse internal whitespace runs to a single space, strip
/// trailing punctuation, and fold common accented characters to their
/// unaccented form.
pub fn normalize(query: &str) -> String {
    let lowered = query.to_lowercase();
    let folded: String = lowered.chars().map(fold_diacritic).collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(|c: char| c.is_ascii_punctuation()).to_string()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

pub fn query_id(normalized: &str) -> CacheEntryId {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    CacheEntryId::from_digest(&bytes)
}
