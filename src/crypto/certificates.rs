use super::document;
use super::evidence::{evidence_digest, EvidenceStage};
use super::store::{CertificateStore, StoredCertificate};
use crate::wipe_orchestrator::{FinalPhase, Phase, WipeOutcome};
use crate::{Compliance, WipeError, WipeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Version of the persisted certificate format
pub const CERTIFICATE_VERSION: &str = "1.0";

/// Issued record asserting that a device completed sanitization.
///
/// Only `CertificateIssuer` (or deserializing a persisted record) can
/// produce one, and only from a Completed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Certificate {
    pub id: String,
    pub version: String,
    pub issued_at: DateTime<Utc>,
    pub device: CertificateDevice,
    pub wipe: CertificateWipe,
    pub compliance: Compliance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDevice {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateWipe {
    pub method: String,
    pub pass_count: u32,
    pub final_phase: FinalPhase,
    pub duration: String,
    pub evidence_digest: String,
}

/// Both renderings of one certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRenderings {
    pub structured: String,
    pub document: String,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub renderings: CertificateRenderings,
    pub stored: StoredCertificate,
}

/// Human-readable duration, truncated to milliseconds
pub fn format_wipe_duration(duration: Duration) -> String {
    let millis = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(millis).to_string()
}

impl Certificate {
    fn from_outcome(outcome: &WipeOutcome) -> WipeResult<Self> {
        ensure_certifiable(outcome)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            version: CERTIFICATE_VERSION.to_string(),
            issued_at: Utc::now(),
            device: CertificateDevice {
                id: outcome.device.device_id.clone(),
                name: outcome.device.display_name.clone(),
                size_bytes: outcome.device.capacity_bytes,
            },
            wipe: CertificateWipe {
                method: outcome.method.clone(),
                pass_count: outcome.pass_count,
                final_phase: outcome.final_phase,
                duration: format_wipe_duration(outcome.duration),
                evidence_digest: evidence_digest(
                    &outcome.device.device_id,
                    &outcome.session_id,
                    &outcome.pass_evidence,
                ),
            },
            compliance: outcome.compliance.clone(),
        })
    }

    /// Recompute the evidence digest from `outcome` and compare
    pub fn matches_outcome(&self, outcome: &WipeOutcome) -> bool {
        self.device.id == outcome.device.device_id
            && self.wipe.pass_count == outcome.pass_count
            && self.wipe.evidence_digest
                == evidence_digest(
                    &outcome.device.device_id,
                    &outcome.session_id,
                    &outcome.pass_evidence,
                )
    }

    pub fn to_json(&self) -> WipeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> WipeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn render_document(&self) -> String {
        document::render(self)
    }

    pub fn renderings(&self) -> WipeResult<CertificateRenderings> {
        Ok(CertificateRenderings {
            structured: self.to_json()?,
            document: self.render_document(),
        })
    }
}

fn ensure_certifiable(outcome: &WipeOutcome) -> WipeResult<()> {
    let refuse = |reason: String| {
        Err(WipeError::NotEligibleForCertification(format!(
            "session {} on {} ended {} ({})",
            outcome.session_id, outcome.device.device_id, outcome.final_phase, reason
        )))
    };

    if let Some(failure) = &outcome.failure {
        return refuse(format!("{}: {}", failure.reason, failure.detail));
    }
    if outcome.final_phase != FinalPhase::Completed {
        return refuse("no failure recorded".to_string());
    }
    if let Err(inconsistency) = check_completed_shape(outcome) {
        return refuse(inconsistency);
    }
    Ok(())
}

/// The record of a Completed session must show every requested pass, the
/// verification step when required, and a history ending in Completed.
fn check_completed_shape(outcome: &WipeOutcome) -> Result<(), String> {
    let requested = outcome.requested_passes;
    if requested == 0 || outcome.pass_count != requested {
        return Err(format!(
            "{} of {} passes completed",
            outcome.pass_count, requested
        ));
    }

    let overwrite: Vec<u32> = outcome
        .pass_evidence
        .iter()
        .filter(|e| e.stage == EvidenceStage::Overwrite)
        .map(|e| e.index)
        .collect();
    if !overwrite.iter().copied().eq(1..=requested) {
        return Err(format!("overwrite evidence indexes {:?}", overwrite));
    }

    let verification: Vec<u32> = outcome
        .pass_evidence
        .iter()
        .filter(|e| e.stage == EvidenceStage::Verification)
        .map(|e| e.index)
        .collect();
    let expected_verification = if outcome.verification_required {
        vec![requested + 1]
    } else {
        Vec::new()
    };
    if verification != expected_verification {
        return Err(format!(
            "{} verification entries, verification required: {}",
            verification.len(),
            outcome.verification_required
        ));
    }

    let mut expected_history = vec![Phase::Idle, Phase::Initializing];
    expected_history.extend((1..=requested).map(Phase::Overwriting));
    if outcome.verification_required {
        expected_history.push(Phase::Verifying);
    }
    expected_history.push(Phase::Completed);
    if outcome.phase_history != expected_history {
        return Err(format!("phase history {:?}", outcome.phase_history));
    }

    Ok(())
}

/// Converts Completed outcomes into persisted certificates
pub struct CertificateIssuer<S: CertificateStore> {
    store: S,
}

impl<S: CertificateStore> CertificateIssuer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issue a certificate for a Completed outcome.
    ///
    /// Either both renderings are persisted or the call fails and nothing
    /// is considered issued.
    pub fn issue(&self, outcome: &WipeOutcome) -> WipeResult<IssuedCertificate> {
        let certificate = Certificate::from_outcome(outcome).inspect_err(|e| {
            tracing::warn!(session_id = %outcome.session_id, error = %e, "Certificate refused");
        })?;
        let renderings = certificate.renderings()?;

        let stored = self
            .store
            .persist(&certificate.id, &renderings)
            .map_err(|e| match e {
                WipeError::StorageFailure(_) => e,
                other => WipeError::StorageFailure(other.to_string()),
            })?;

        tracing::info!(
            certificate_id = %certificate.id,
            session_id = %outcome.session_id,
            device = %certificate.device.id,
            evidence_digest = %certificate.wipe.evidence_digest,
            "Certificate issued"
        );

        Ok(IssuedCertificate {
            certificate,
            renderings,
            stored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PassReport;
    use crate::crypto::evidence::{EvidenceStage, PassEvidence};
    use crate::wipe_orchestrator::{Failure, FailureReason, Phase};
    use crate::DeviceIdentity;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        persisted: Mutex<Vec<String>>,
    }

    impl CertificateStore for RecordingStore {
        fn persist(
            &self,
            certificate_id: &str,
            _renderings: &CertificateRenderings,
        ) -> WipeResult<StoredCertificate> {
            self.persisted
                .lock()
                .map_err(|_| WipeError::StorageFailure("poisoned".to_string()))?
                .push(certificate_id.to_string());
            Ok(StoredCertificate {
                structured: PathBuf::from(format!("{}.json", certificate_id)),
                document: PathBuf::from(format!("{}.txt", certificate_id)),
            })
        }

        fn load(&self, certificate_id: &str) -> WipeResult<Certificate> {
            Err(WipeError::StorageFailure(format!("{} not kept", certificate_id)))
        }

        fn list(&self) -> WipeResult<Vec<String>> {
            Ok(self.persisted.lock().map(|p| p.clone()).unwrap_or_default())
        }
    }

    fn outcome(final_phase: FinalPhase) -> WipeOutcome {
        let device = DeviceIdentity::new("D1", "USB Drive (8GB)", 8_000_000_000, true);
        let evidence = vec![PassEvidence::record(
            EvidenceStage::Overwrite,
            1,
            "D1",
            &PassReport::new("pass 1", 8_000_000_000),
            12,
        )];
        let failure = match final_phase {
            FinalPhase::Completed => None,
            FinalPhase::Failed => Some(Failure::new(FailureReason::BackendError, "io")),
            FinalPhase::Cancelled => Some(Failure::new(FailureReason::Cancelled, "operator")),
        };

        WipeOutcome {
            session_id: "S1".to_string(),
            device,
            final_phase,
            failure,
            method: "NIST-SP-800-88-Clear".to_string(),
            compliance: Compliance::new("NIST-SP-800-88", "Clear"),
            backend: "simulated".to_string(),
            pass_count: 1,
            requested_passes: 1,
            verification_required: false,
            pass_evidence: evidence,
            phase_history: vec![
                Phase::Idle,
                Phase::Initializing,
                Phase::Overwriting(1),
                final_phase.as_phase(),
            ],
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration: Duration::from_millis(5_250),
        }
    }

    #[test]
    fn test_issue_completed_outcome() {
        let issuer = CertificateIssuer::new(RecordingStore::default());
        let issued = issuer.issue(&outcome(FinalPhase::Completed)).expect("issued");

        let cert = &issued.certificate;
        assert_eq!(cert.version, CERTIFICATE_VERSION);
        assert_eq!(cert.device.id, "D1");
        assert_eq!(cert.device.size_bytes, 8_000_000_000);
        assert_eq!(cert.wipe.pass_count, 1);
        assert_eq!(cert.wipe.final_phase, FinalPhase::Completed);
        assert_eq!(cert.wipe.duration, "5s 250ms");
        assert_eq!(cert.compliance.level, "Clear");
        assert_eq!(issuer.store().list().unwrap(), vec![cert.id.clone()]);
    }

    #[test]
    fn test_refuses_failed_and_cancelled() {
        let issuer = CertificateIssuer::new(RecordingStore::default());
        for phase in [FinalPhase::Failed, FinalPhase::Cancelled] {
            let result = issuer.issue(&outcome(phase));
            assert!(matches!(
                result,
                Err(WipeError::NotEligibleForCertification(_))
            ));
        }
        assert!(issuer.store().list().unwrap().is_empty());
    }

    #[test]
    fn test_completed_phase_with_failure_is_refused() {
        let mut inconsistent = outcome(FinalPhase::Completed);
        inconsistent.failure = Some(Failure::new(FailureReason::VerificationFailed, "x"));

        let issuer = CertificateIssuer::new(RecordingStore::default());
        assert!(matches!(
            issuer.issue(&inconsistent),
            Err(WipeError::NotEligibleForCertification(_))
        ));
    }

    /// A 3-pass verified session that failed during pass 2
    fn failed_on_second_pass() -> WipeOutcome {
        let mut failed = outcome(FinalPhase::Failed);
        failed.requested_passes = 3;
        failed.verification_required = true;
        failed.phase_history = vec![
            Phase::Idle,
            Phase::Initializing,
            Phase::Overwriting(1),
            Phase::Overwriting(2),
            Phase::Failed,
        ];
        failed
    }

    #[test]
    fn test_relabelled_failed_outcome_is_refused() {
        let mut relabelled = failed_on_second_pass();
        relabelled.final_phase = FinalPhase::Completed;
        relabelled.failure = None;

        let issuer = CertificateIssuer::new(RecordingStore::default());
        assert!(matches!(
            issuer.issue(&relabelled),
            Err(WipeError::NotEligibleForCertification(_))
        ));
        assert!(issuer.store().list().unwrap().is_empty());
    }

    #[test]
    fn test_inflated_pass_count_is_refused() {
        let mut forged = failed_on_second_pass();
        forged.final_phase = FinalPhase::Completed;
        forged.failure = None;
        forged.pass_count = 3;
        forged.phase_history = vec![
            Phase::Idle,
            Phase::Initializing,
            Phase::Overwriting(1),
            Phase::Overwriting(2),
            Phase::Overwriting(3),
            Phase::Verifying,
            Phase::Completed,
        ];

        // Evidence still covers only pass 1
        let err = ensure_certifiable(&forged).unwrap_err();
        assert!(err.to_string().contains("overwrite evidence"));
    }

    #[test]
    fn test_missing_verification_evidence_is_refused() {
        let mut unverified = outcome(FinalPhase::Completed);
        unverified.verification_required = true;
        unverified.phase_history = vec![
            Phase::Idle,
            Phase::Initializing,
            Phase::Overwriting(1),
            Phase::Verifying,
            Phase::Completed,
        ];
        assert!(ensure_certifiable(&unverified).is_err());

        unverified.pass_evidence.push(PassEvidence::record(
            EvidenceStage::Verification,
            2,
            "D1",
            &PassReport::new("clean", 4096),
            20,
        ));
        assert!(ensure_certifiable(&unverified).is_ok());
    }

    #[test]
    fn test_history_must_end_completed() {
        let mut truncated = outcome(FinalPhase::Completed);
        truncated.phase_history.pop();
        assert!(matches!(
            ensure_certifiable(&truncated),
            Err(WipeError::NotEligibleForCertification(_))
        ));
    }

    #[test]
    fn test_matches_outcome_detects_tampering() {
        let issuer = CertificateIssuer::new(RecordingStore::default());
        let original = outcome(FinalPhase::Completed);
        let issued = issuer.issue(&original).expect("issued");
        assert!(issued.certificate.matches_outcome(&original));

        let mut tampered = original.clone();
        tampered.pass_evidence[0].detail = "pass 1 (edited)".to_string();
        assert!(!issued.certificate.matches_outcome(&tampered));
    }

    #[test]
    fn test_structured_rendering_field_names() {
        let issuer = CertificateIssuer::new(RecordingStore::default());
        let issued = issuer.issue(&outcome(FinalPhase::Completed)).expect("issued");

        let value: serde_json::Value =
            serde_json::from_str(&issued.renderings.structured).expect("valid json");
        for key in ["id", "version", "issued_at", "device", "wipe", "compliance"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        for key in ["id", "name", "size_bytes"] {
            assert!(value["device"].get(key).is_some(), "missing device.{}", key);
        }
        for key in ["method", "pass_count", "final_phase", "duration", "evidence_digest"] {
            assert!(value["wipe"].get(key).is_some(), "missing wipe.{}", key);
        }
        assert_eq!(value["wipe"]["final_phase"], "Completed");
    }

    #[test]
    fn test_json_round_trip_preserves_certificate() {
        let issuer = CertificateIssuer::new(RecordingStore::default());
        let issued = issuer.issue(&outcome(FinalPhase::Completed)).expect("issued");

        let parsed = Certificate::from_json(&issued.renderings.structured).expect("parse");
        assert_eq!(parsed, issued.certificate);
    }

    #[test]
    fn test_format_wipe_duration_truncates() {
        assert_eq!(format_wipe_duration(Duration::from_micros(1_500_700)), "1s 500ms");
        assert_eq!(format_wipe_duration(Duration::from_secs(3_661)), "1h 1m 1s");
    }
}
