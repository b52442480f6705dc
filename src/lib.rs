// Allow uppercase acronyms for standard names like NIST and DoD
#![allow(clippy::upper_case_acronyms)]

pub mod backend;
pub mod crypto;
pub mod drives;
pub mod logging;
pub mod settings;
pub mod ui;
pub mod wipe_orchestrator;

// Re-export the main entry points for convenience
pub use backend::{BackendFailure, EraseBackend, PassReport};
pub use crypto::{Certificate, CertificateIssuer, CertificateStore, FileCertificateStore};
pub use wipe_orchestrator::{
    FailureReason, FinalPhase, Phase, ProgressEvent, SanitizationOrchestrator, SessionEvent,
    SessionHandle, WipeOutcome,
};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// Global flag for handling Ctrl+C interrupts
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set the interrupt flag (called by signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Check if an interrupt has been received
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the interrupt flag (primarily for testing)
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[derive(Error, Debug)]
pub enum WipeError {
    #[error("Invalid sanitization profile: {0}")]
    InvalidProfile(String),

    #[error("Device is not eligible for sanitization: {0}")]
    IneligibleDevice(String),

    #[error("Device is busy: {0}")]
    DeviceBusy(String),

    #[error("Erase backend error: {0}")]
    BackendError(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Outcome is not eligible for certification: {0}")]
    NotEligibleForCertification(String),

    #[error("Certificate storage failed: {0}")]
    StorageFailure(String),

    #[error("No active session: {0}")]
    SessionNotActive(String),

    #[error("Invalid phase transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for WipeError {
    fn from(err: config::ConfigError) -> Self {
        WipeError::Config(err.to_string())
    }
}

pub type WipeResult<T> = Result<T, WipeError>;

/// Snapshot of a physical device as reported by the enumerator.
///
/// The orchestrator treats this as distrusted input and re-validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub display_name: String,
    pub capacity_bytes: u64,
    pub is_removable: bool,
    pub mount_points: Vec<String>,
}

impl DeviceIdentity {
    pub fn new(
        device_id: impl Into<String>,
        display_name: impl Into<String>,
        capacity_bytes: u64,
        is_removable: bool,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            display_name: display_name.into(),
            capacity_bytes,
            is_removable,
            mount_points: Vec::new(),
        }
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_points.push(mount_point.into());
        self
    }

    /// Structural system-drive protection: only removable media with a
    /// non-zero capacity may be sanitized.
    pub fn check_eligible(&self) -> WipeResult<()> {
        if !self.is_removable {
            return Err(WipeError::IneligibleDevice(format!(
                "{} is not removable media",
                self.device_id
            )));
        }
        if self.capacity_bytes == 0 {
            return Err(WipeError::IneligibleDevice(format!(
                "{} reports zero capacity",
                self.device_id
            )));
        }
        Ok(())
    }
}

/// Per-pass pattern schedule used by overwrite backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwriteScheme {
    Zeros,
    Ones,
    Random,
    #[serde(rename = "dod-5220")]
    DoD5220, // zeros, ones, random, repeating
    Alternating, // 0x55 / 0xAA, final pass random
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compliance {
    pub standard: String,
    pub level: String,
}

impl Compliance {
    pub fn new(standard: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            standard: standard.into(),
            level: level.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationProfile {
    pub method: String,
    pub pass_count: u32,
    pub verification_required: bool,
    pub scheme: OverwriteScheme,
    pub compliance: Compliance,
}

impl SanitizationProfile {
    pub fn validate(&self) -> WipeResult<()> {
        if self.pass_count == 0 {
            return Err(WipeError::InvalidProfile(format!(
                "profile '{}' must request at least one pass",
                self.method
            )));
        }
        if self.method.trim().is_empty() {
            return Err(WipeError::InvalidProfile(
                "profile method name is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of progress units: one per pass plus one for verification.
    pub fn total_units(&self) -> u32 {
        self.pass_count + u32::from(self.verification_required)
    }

    /// NIST SP 800-88 Clear: single overwrite with readback verification
    pub fn nist_clear() -> Self {
        Self {
            method: "NIST-SP-800-88-Clear".to_string(),
            pass_count: 1,
            verification_required: true,
            scheme: OverwriteScheme::Zeros,
            compliance: Compliance::new("NIST-SP-800-88", "Clear"),
        }
    }

    /// NIST SP 800-88 Purge as approximated by overwrite-capable media
    pub fn nist_purge() -> Self {
        Self {
            method: "NIST-SP-800-88-Purge".to_string(),
            pass_count: 3,
            verification_required: true,
            scheme: OverwriteScheme::Alternating,
            compliance: Compliance::new("NIST-SP-800-88", "Purge"),
        }
    }

    /// DoD 5220.22-M three pass overwrite
    pub fn dod_5220() -> Self {
        Self {
            method: "DoD-5220.22-M".to_string(),
            pass_count: 3,
            verification_required: true,
            scheme: OverwriteScheme::DoD5220,
            compliance: Compliance::new("DoD-5220.22-M", "3-pass"),
        }
    }

    pub fn zero() -> Self {
        Self {
            method: "Zero-Fill".to_string(),
            pass_count: 1,
            verification_required: false,
            scheme: OverwriteScheme::Zeros,
            compliance: Compliance::new("NIST-SP-800-88", "Clear"),
        }
    }

    pub fn random() -> Self {
        Self {
            method: "Random-Fill".to_string(),
            pass_count: 1,
            verification_required: true,
            scheme: OverwriteScheme::Random,
            compliance: Compliance::new("NIST-SP-800-88", "Clear"),
        }
    }
}

/// Built-in profile catalog, keyed by the name used on the command line.
pub fn builtin_profiles() -> Vec<(&'static str, SanitizationProfile)> {
    vec![
        ("nist-clear", SanitizationProfile::nist_clear()),
        ("nist-purge", SanitizationProfile::nist_purge()),
        ("dod-5220", SanitizationProfile::dod_5220()),
        ("zero", SanitizationProfile::zero()),
        ("random", SanitizationProfile::random()),
    ]
}
