//! Storage envelope for cached values.
//!
//! Every value handed to a backend is wrapped as
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: u32 LE] [POSTCARD PAYLOAD]
//! ```
//!
//! so that entries written by another program or by an older schema are
//! reported instead of being decoded into garbage.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Envelope marker.
pub const MAGIC: &[u8; 4] = b"CINT";

/// Envelope schema version. Bump when the stored layout changes.
pub const SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if postcard can't encode the value.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value)
        .map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a stored value.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: truncated envelope or bad magic
/// - `Error::VersionMismatch`: written by another schema version
/// - `Error::DeserializationError`: corrupted payload or wrong target type
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry too short: {} bytes",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(4);
    if magic != MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "bad magic: {:?}",
            magic
        )));
    }

    let (version, payload) = rest.split_at(4);
    let mut raw = [0u8; 4];
    raw.copy_from_slice(version);
    let found = u32::from_le_bytes(raw);
    if found != SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Employment {
        id: String,
        salary: u32,
    }

    #[test]
    fn test_envelope_header() {
        let bytes = encode(&"x").unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(&bytes[4..8], &SCHEMA_VERSION.to_le_bytes());
    }

    #[test]
    fn test_struct_survives_storage() {
        let value = Employment {
            id: "emp_1".into(),
            salary: 75_000,
        };
        let decoded: Employment = decode(&encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            decode::<String>(b"hello world"),
            Err(Error::InvalidCacheEntry(_))
        ));
        assert!(matches!(
            decode::<String>(b"CI"),
            Err(Error::InvalidCacheEntry(_))
        ));
    }

    #[test]
    fn test_rejects_other_version() {
        let mut bytes = encode(&"x").unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(
            decode::<String>(&bytes),
            Err(Error::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 99
            })
        );
    }

    #[test]
    fn test_corrupted_payload() {
        let mut bytes = encode(&"x").unwrap();
        bytes.truncate(HEADER_LEN);
        assert!(matches!(
            decode::<String>(&bytes),
            Err(Error::DeserializationError(_))
        ));
    }
}
