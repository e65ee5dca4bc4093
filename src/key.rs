//! Cache key construction and transformation.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};

/// Alphabet digests are re-based into. Safe for every backend this crate
/// talks to.
const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Width of a base-62 SHA-256 digest (62^43 > 2^256).
pub const DIGEST_LEN: usize = 43;

/// Maximum key length accepted by Memcached.
pub const MEMCACHED_MAX_KEY_LEN: usize = 250;

/// Deterministic key transform for backends that restrict key length or
/// charset.
///
/// Every caller key maps to `prefix` followed by a fixed-width base-62
/// SHA-256 digest. Applying the digest to every key (not only to keys the
/// backend would reject) keeps the output space uniform, so a raw key can
/// never collide with the digest of another.
#[derive(Clone, Debug, Default)]
pub struct KeyDigest {
    prefix: String,
}

impl KeyDigest {
    /// Build a digest with a validated prefix.
    ///
    /// # Errors
    /// Returns `Error::ConfigurationError` if the prefix contains whitespace
    /// or control characters, or leaves no room for the digest.
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.chars().any(|c| !c.is_ascii_graphic()) {
            return Err(Error::ConfigurationError(format!(
                "Key prefix {:?} must be printable ASCII without whitespace",
                prefix
            )));
        }
        if prefix.len() + DIGEST_LEN > MEMCACHED_MAX_KEY_LEN {
            return Err(Error::ConfigurationError(format!(
                "Key prefix is {} bytes; at most {} allowed",
                prefix.len(),
                MEMCACHED_MAX_KEY_LEN - DIGEST_LEN
            )));
        }
        Ok(KeyDigest { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Transform a caller key into its backend key.
    pub fn apply(&self, key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        let mut out = String::with_capacity(self.prefix.len() + DIGEST_LEN);
        out.push_str(&self.prefix);
        out.push_str(&rebase(&digest, DIGEST_LEN));
        out
    }
}

/// Re-base a big-endian byte string into [`ALPHABET`], left-padded to `width`.
fn rebase(bytes: &[u8], width: usize) -> String {
    let base = ALPHABET.len() as u32;
    let mut number = bytes.to_vec();
    let mut digits = Vec::with_capacity(width);

    while number.iter().any(|&b| b != 0) {
        let mut rem = 0u32;
        for byte in number.iter_mut() {
            let acc = (rem << 8) | u32::from(*byte);
            *byte = (acc / base) as u8;
            rem = acc % base;
        }
        digits.push(ALPHABET[rem as usize]);
    }
    while digits.len() < width {
        digits.push(ALPHABET[0]);
    }

    digits.iter().rev().map(|&d| char::from(d)).collect()
}

/// Member key inside a generation-scoped group: `<group>_<token>_<key>`.
pub fn group_member(group: &str, token: &str, key: &str) -> String {
    format!("{}_{}_{}", group, token, key)
}

/// Reserved key holding a group's generation token: `<group>_GroupValue`.
pub fn group_generation(group: &str) -> String {
    format!("{}_GroupValue", group)
}
