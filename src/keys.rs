//! Length-prefixed key encoding for LMDB storage.
//!
//! All keys are encoded as: [len1][bytes1][len2][bytes2]... with big-endian `u16` lengths.
//! - No delimiters, no escaping, any bytes allowed
//! - A prefix of whole parts never matches a longer sibling (`"ab"` vs `"abc"`)
//! - Works for any number of parts

use byteorder::{BigEndian, ByteOrder};

use crate::error::StoreError;
use crate::types::Scope;

const LEN: usize = 2;

/// Build a length-prefixed key from parts
pub fn build_key(parts: &[&[u8]]) -> Result<Vec<u8>, StoreError> {
    let total_len: usize = parts.iter().map(|p| LEN + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        let len = u16::try_from(part.len())
            .map_err(|_| StoreError::Backend(format!("key part of {} bytes too long", part.len())))?;
        let mut buf = [0u8; LEN];
        BigEndian::write_u16(&mut buf, len);
        key.extend_from_slice(&buf);
        key.extend_from_slice(part);
    }
    Ok(key)
}

// ============================================================================
// Permission keys
// ============================================================================

/// `[scope][resource]`: resource metadata, revision counter, and prefix of its grant rows
pub fn resource_key(scope: Scope, resource_id: &str) -> Result<Vec<u8>, StoreError> {
    build_key(&[scope.as_str().as_bytes(), resource_id.as_bytes()])
}

/// `[scope][resource][seq]`: one grant row; big-endian seq keeps creation order
pub fn grant_row_key(scope: Scope, resource_id: &str, seq: u64) -> Result<Vec<u8>, StoreError> {
    build_key(&[scope.as_str().as_bytes(), resource_id.as_bytes(), &seq.to_be_bytes()[..]])
}

/// `[scope][resource][subject]`: index from the upsert triple to its row seq
pub fn subject_key(scope: Scope, resource_id: &str, subject_id: &str) -> Result<Vec<u8>, StoreError> {
    build_key(&[scope.as_str().as_bytes(), resource_id.as_bytes(), subject_id.as_bytes()])
}
