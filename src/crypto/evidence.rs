/// Evidence digests for sanitization sessions
///
/// Every field is fed to SHA-256 with a little-endian length prefix so the
/// encoding is canonical and order-preserving: two byte-identical outcomes
/// always hash to the same value, and no field boundary can be shifted to
/// produce a collision between different evidence sequences.
use crate::backend::PassReport;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const PASS_DOMAIN: &[u8] = b"wipecert.pass.v1";
const EVIDENCE_DOMAIN: &[u8] = b"wipecert.evidence.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStage {
    Overwrite,
    Verification,
}

impl EvidenceStage {
    fn tag(self) -> &'static [u8] {
        match self {
            EvidenceStage::Overwrite => b"overwrite",
            EvidenceStage::Verification => b"verification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Overwritten,
    Verified,
}

impl EvidenceStatus {
    fn tag(self) -> &'static [u8] {
        match self {
            EvidenceStatus::Overwritten => b"overwritten",
            EvidenceStatus::Verified => b"verified",
        }
    }
}

/// Completion marker for one pass (or the verification step) of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassEvidence {
    pub stage: EvidenceStage,
    /// Pass index (1-based); the verification entry uses `total_passes + 1`
    pub index: u32,
    pub status: EvidenceStatus,
    pub detail: String,
    pub bytes_processed: u64,
    pub recorded_at: DateTime<Utc>,
    /// Monotonic milliseconds since the session started
    pub elapsed_ms: u64,
    pub digest: String,
}

impl PassEvidence {
    pub fn record(
        stage: EvidenceStage,
        index: u32,
        device_id: &str,
        report: &PassReport,
        elapsed_ms: u64,
    ) -> Self {
        let status = match stage {
            EvidenceStage::Overwrite => EvidenceStatus::Overwritten,
            EvidenceStage::Verification => EvidenceStatus::Verified,
        };

        Self {
            stage,
            index,
            status,
            detail: report.detail.clone(),
            bytes_processed: report.bytes_processed,
            recorded_at: Utc::now(),
            elapsed_ms,
            digest: pass_digest(stage, index, device_id, report, elapsed_ms),
        }
    }
}

fn put_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Digest of a single pass report, bound to the device it ran against.
pub fn pass_digest(
    stage: EvidenceStage,
    index: u32,
    device_id: &str,
    report: &PassReport,
    elapsed_ms: u64,
) -> String {
    let mut hasher = Sha256::new();
    put_field(&mut hasher, PASS_DOMAIN);
    put_field(&mut hasher, stage.tag());
    put_field(&mut hasher, &index.to_le_bytes());
    put_field(&mut hasher, device_id.as_bytes());
    put_field(&mut hasher, report.detail.as_bytes());
    put_field(&mut hasher, &report.bytes_processed.to_le_bytes());
    put_field(&mut hasher, &elapsed_ms.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Digest over the device, the session and the full ordered evidence list.
pub fn evidence_digest(device_id: &str, session_id: &str, evidence: &[PassEvidence]) -> String {
    let mut hasher = Sha256::new();
    put_field(&mut hasher, EVIDENCE_DOMAIN);
    put_field(&mut hasher, device_id.as_bytes());
    put_field(&mut hasher, session_id.as_bytes());
    put_field(&mut hasher, &(evidence.len() as u64).to_le_bytes());

    for entry in evidence {
        put_field(&mut hasher, entry.stage.tag());
        put_field(&mut hasher, &entry.index.to_le_bytes());
        put_field(&mut hasher, entry.status.tag());
        put_field(&mut hasher, entry.detail.as_bytes());
        put_field(&mut hasher, &entry.bytes_processed.to_le_bytes());
        put_field(
            &mut hasher,
            entry
                .recorded_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        put_field(&mut hasher, &entry.elapsed_ms.to_le_bytes());
        put_field(&mut hasher, entry.digest.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn report(detail: &str) -> PassReport {
        PassReport::new(detail, 4096)
    }

    fn entry(index: u32) -> PassEvidence {
        PassEvidence::record(
            EvidenceStage::Overwrite,
            index,
            "D1",
            &report("pass ok"),
            u64::from(index) * 10,
        )
    }

    #[test]
    fn test_pass_digest_is_hex_sha256() {
        let digest = pass_digest(EvidenceStage::Overwrite, 1, "D1", &report("ok"), 5);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_pass_digest_binds_device() {
        let a = pass_digest(EvidenceStage::Overwrite, 1, "D1", &report("ok"), 5);
        let b = pass_digest(EvidenceStage::Overwrite, 1, "D2", &report("ok"), 5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pass_digest_binds_stage() {
        let a = pass_digest(EvidenceStage::Overwrite, 2, "D1", &report("ok"), 5);
        let b = pass_digest(EvidenceStage::Verification, 2, "D1", &report("ok"), 5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // "ab" + "c" must not hash like "a" + "bc"
        let a = pass_digest(EvidenceStage::Overwrite, 1, "ab", &report("c"), 0);
        let b = pass_digest(EvidenceStage::Overwrite, 1, "a", &report("bc"), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_evidence_digest_is_order_sensitive() {
        let first = entry(1);
        let second = entry(2);
        let forward = evidence_digest("D1", "S1", &[first.clone(), second.clone()]);
        let reverse = evidence_digest("D1", "S1", &[second, first]);
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_evidence_digest_binds_session() {
        let evidence = vec![entry(1)];
        assert_ne!(
            evidence_digest("D1", "S1", &evidence),
            evidence_digest("D1", "S2", &evidence)
        );
    }

    #[test]
    fn test_empty_evidence_still_digests() {
        let digest = evidence_digest("D1", "S1", &[]);
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_record_sets_status_from_stage() {
        let overwrite = PassEvidence::record(EvidenceStage::Overwrite, 1, "D1", &report("x"), 0);
        let verify = PassEvidence::record(EvidenceStage::Verification, 2, "D1", &report("x"), 0);
        assert_eq!(overwrite.status, EvidenceStatus::Overwritten);
        assert_eq!(verify.status, EvidenceStatus::Verified);
    }

    proptest! {
        #[test]
        fn prop_evidence_digest_deterministic(
            device in "[A-Za-z0-9_-]{1,16}",
            session in "[a-f0-9-]{8,36}",
            count in 0u32..6,
        ) {
            let evidence: Vec<PassEvidence> = (1..=count).map(entry).collect();
            let cloned = evidence.clone();
            prop_assert_eq!(
                evidence_digest(&device, &session, &evidence),
                evidence_digest(&device, &session, &cloned)
            );
        }
    }
}
