use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SyncError;

/// First 8 bytes of every SMA archive.
pub const MAGIC: &[u8; 8] = b"SMA\0v1\0\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaMetadata {
    pub exported_at: DateTime<Utc>,
    pub source_system: String,
    pub record_counts: RecordCounts,
    /// SHA-256 of the *uncompressed* payload.
    pub payload_sha256: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    pub devices: u64,
    pub templates: u64,
}

/// Builds a self-describing archive: magic, length-prefixed metadata JSON,
/// then gzip-compressed payload.
pub fn write_bundle(source_system: &str, counts: RecordCounts, payload: &[u8]) -> Result<Vec<u8>, SyncError> {
    let payload_sha256 = hex_sha256(payload);
    let metadata = SmaMetadata {
        exported_at: Utc::now(),
        source_system: source_system.to_string(),
        record_counts: counts,
        payload_sha256,
    };
    let metadata_json = serde_json::to_vec(&metadata)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;

    let mut out = Vec::with_capacity(8 + 4 + metadata_json.len() + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(metadata_json.len() as u32).to_be_bytes());
    out.extend_from_slice(&metadata_json);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Verifies magic, decompresses, and recomputes the checksum, failing with
/// `Corrupt` on any mismatch.
pub fn read_bundle(bytes: &[u8]) -> Result<(SmaMetadata, Vec<u8>), SyncError> {
    if bytes.len() < 12 || &bytes[0..8] != MAGIC {
        return Err(SyncError::Corrupt("bad magic header".into()));
    }
    let meta_len = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let meta_start = 12;
    let meta_end = meta_start
    .checked_add(meta_len)
    .filter(|&end| end <= bytes.len())
    .ok_or_else(|| SyncError::Corrupt("metadata length exceeds archive size".into()))?;

    let metadata: SmaMetadata = serde_json::from_slice(&bytes[meta_start..meta_end])
    .map_err(|e| SyncError::Corrupt(format!("metadata parse error: {e}")))?;

    let mut decoder = GzDecoder::new(&bytes[meta_end..]);
    let mut payload = Vec::new();
    decoder
    .read_to_end(&mut payload)
    .map_err(|e| SyncError::Corrupt(format!("gzip decompression failed: {e}")))?;

    let actual_sha256 = hex_sha256(&payload);
    if actual_sha256 != metadata.payload_sha256 {
        return Err(SyncError::Corrupt("payload checksum mismatch".into()));
    }

    Ok((metadata, payload))
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_bundle() {
        let payload = br#"{"devices":[]}"#;
        let bundle = write_bundle("shellyfleet-manager", RecordCounts { devices: 0, templates: 0 }, payload).unwrap();
        let (meta, out_payload) = read_bundle(&bundle).unwrap();
        assert_eq!(out_payload, payload);
        assert_eq!(meta.source_system, "shellyfleet-manager");
    }

    #[test]
    fn rejects_bad_magic() {
        let err = read_bundle(b"not-an-sma-archive-at-all").unwrap_err();
        assert!(matches!(err, SyncError::Corrupt(_)));
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = br#"{"devices":[]}"#;
        let mut bundle = write_bundle("src", RecordCounts::default(), payload).unwrap();
        let last = bundle.len() - 1;
        bundle[last] ^= 0xff;
        let err = read_bundle(&bundle);
        assert!(err.is_err());
    }
}
