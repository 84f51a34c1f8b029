use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes the canonical SHA-256 digest of a block's fields
///
/// The preimage is a `serde_json::Value` object. `serde_json::Map` is a
/// `BTreeMap` unless the `preserve_order` feature is enabled, so keys are
/// emitted sorted at every nesting level and the output does not depend on
/// field declaration or insertion order.
///
/// # Returns
///
/// The digest as 64 lowercase hex characters, or the serialization error
/// if the payload cannot be represented as JSON
pub fn digest<P: Serialize>(
    index: u64,
    timestamp: f64,
    payload: &P,
    previous_hash: &str,
    nonce: u64,
) -> Result<String, serde_json::Error> {
    let preimage = serde_json::json!({
        "index": index,
        "timestamp": timestamp,
        "data": serde_json::to_value(payload)?,
        "previous_hash": previous_hash,
        "nonce": nonce,
    });

    let encoded = serde_json::to_vec(&preimage)?;

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(hex::encode(hasher.finalize()))
}

/// Checks whether a hex digest starts with `difficulty` zero characters
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
