// Wipe session state machine, progress events and the terminal outcome

use crate::backend::PassReport;
use crate::crypto::evidence::{EvidenceStage, PassEvidence};
use crate::{Compliance, DeviceIdentity, SanitizationProfile, WipeError, WipeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "pass", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Initializing,
    Overwriting(u32),
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }

    /// Legal edges of the session state machine for a given profile shape
    pub fn can_transition_to(
        &self,
        next: Phase,
        total_passes: u32,
        verification_required: bool,
    ) -> bool {
        match (*self, next) {
            (Phase::Idle, Phase::Initializing) => true,
            (Phase::Initializing, Phase::Overwriting(1)) => total_passes >= 1,
            (Phase::Overwriting(i), Phase::Overwriting(j)) => j == i + 1 && j <= total_passes,
            (Phase::Overwriting(i), Phase::Verifying) => {
                i == total_passes && verification_required
            }
            (Phase::Overwriting(i), Phase::Completed) => {
                i == total_passes && !verification_required
            }
            (Phase::Verifying, Phase::Completed) => true,
            (current, Phase::Failed | Phase::Cancelled) => {
                current != Phase::Idle && !current.is_terminal()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Initializing => write!(f, "Initializing"),
            Phase::Overwriting(pass) => write!(f, "Overwriting({})", pass),
            Phase::Verifying => write!(f, "Verifying"),
            Phase::Completed => write!(f, "Completed"),
            Phase::Failed => write!(f, "Failed"),
            Phase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalPhase {
    Completed,
    Failed,
    Cancelled,
}

impl FinalPhase {
    pub fn as_phase(&self) -> Phase {
        match self {
            FinalPhase::Completed => Phase::Completed,
            FinalPhase::Failed => Phase::Failed,
            FinalPhase::Cancelled => Phase::Cancelled,
        }
    }
}

impl fmt::Display for FinalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_phase())
    }
}

/// Reason code carried by every non-Completed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    IneligibleDevice,
    BackendError,
    VerificationFailed,
    Cancelled,
    InvalidTransition,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::IneligibleDevice => "INELIGIBLE_DEVICE",
            FailureReason::BackendError => "BACKEND_ERROR",
            FailureReason::VerificationFailed => "VERIFICATION_FAILED",
            FailureReason::Cancelled => "CANCELLED",
            FailureReason::InvalidTransition => "INVALID_TRANSITION",
        }
    }

    pub fn final_phase(&self) -> FinalPhase {
        match self {
            FailureReason::Cancelled => FinalPhase::Cancelled,
            _ => FinalPhase::Failed,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub detail: String,
}

impl Failure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<WipeError> for Failure {
    fn from(err: WipeError) -> Self {
        let reason = match err {
            WipeError::IneligibleDevice(_) => FailureReason::IneligibleDevice,
            WipeError::VerificationFailed(_) => FailureReason::VerificationFailed,
            WipeError::InvalidTransition(_) => FailureReason::InvalidTransition,
            _ => FailureReason::BackendError,
        };
        Failure::new(reason, err.to_string())
    }
}

/// `completed_units / total_units * 100`
pub fn percent_complete(completed_units: u32, total_units: u32) -> f64 {
    if total_units == 0 {
        return 0.0;
    }
    let completed = completed_units.min(total_units);
    f64::from(completed) * 100.0 / f64::from(total_units)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub device_id: String,
    pub phase: Phase,
    pub pass_index: u32,
    pub total_passes: u32,
    pub percent_complete: f64,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    /// Always the last message of a session
    Finished(WipeOutcome),
}

/// Immutable record of a terminated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeOutcome {
    pub session_id: String,
    pub device: DeviceIdentity,
    pub final_phase: FinalPhase,
    pub failure: Option<Failure>,
    pub method: String,
    pub compliance: Compliance,
    pub backend: String,
    /// Overwrite passes that ran to completion
    pub pass_count: u32,
    pub requested_passes: u32,
    pub verification_required: bool,
    pub pass_evidence: Vec<PassEvidence>,
    pub phase_history: Vec<Phase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
}

impl WipeOutcome {
    pub fn is_completed(&self) -> bool {
        self.final_phase == FinalPhase::Completed
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure.as_ref().map(|f| f.reason)
    }
}

/// Mutable session state, owned by the task that runs the session.
#[derive(Debug)]
pub struct WipeSession {
    pub session_id: String,
    pub device: DeviceIdentity,
    pub profile: SanitizationProfile,
    pub backend: String,
    pub phase: Phase,
    pub current_pass: u32,
    pub started_at: DateTime<Utc>,
    pub pass_evidence: Vec<PassEvidence>,
    pub phase_history: Vec<Phase>,
    completed_units: u32,
    clock: Instant,
}

impl WipeSession {
    pub fn new(device: DeviceIdentity, profile: SanitizationProfile, backend: String) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            device,
            profile,
            backend,
            phase: Phase::Idle,
            current_pass: 0,
            started_at: Utc::now(),
            pass_evidence: Vec::new(),
            phase_history: vec![Phase::Idle],
            completed_units: 0,
            clock: Instant::now(),
        }
    }

    pub fn total_passes(&self) -> u32 {
        self.profile.pass_count
    }

    pub fn transition(&mut self, next: Phase) -> WipeResult<()> {
        if !self.phase.can_transition_to(
            next,
            self.profile.pass_count,
            self.profile.verification_required,
        ) {
            return Err(WipeError::InvalidTransition(format!(
                "{} -> {} in session {}",
                self.phase, next, self.session_id
            )));
        }

        if let Phase::Overwriting(pass) = next {
            self.current_pass = pass;
        }
        self.phase = next;
        self.phase_history.push(next);
        Ok(())
    }

    /// Append evidence for a completed pass or verification
    pub fn record(&mut self, stage: EvidenceStage, report: &PassReport) {
        let index = match stage {
            EvidenceStage::Overwrite => self.current_pass,
            EvidenceStage::Verification => self.profile.pass_count + 1,
        };
        let elapsed_ms = self.clock.elapsed().as_millis() as u64;

        self.pass_evidence.push(PassEvidence::record(
            stage,
            index,
            &self.device.device_id,
            report,
            elapsed_ms,
        ));
        self.completed_units += 1;
    }

    /// Count a unit that was attempted but did not produce evidence
    pub fn mark_unit_attempted(&mut self) {
        self.completed_units += 1;
    }

    pub fn completed_units(&self) -> u32 {
        self.completed_units
    }

    pub fn progress(&self) -> ProgressEvent {
        let total_units = self.profile.total_units();
        // A cancelled session never reports 100, even if its last pass finished
        let completed_units = match self.phase {
            Phase::Cancelled => self.completed_units.min(total_units.saturating_sub(1)),
            _ => self.completed_units,
        };

        ProgressEvent {
            session_id: self.session_id.clone(),
            device_id: self.device.device_id.clone(),
            phase: self.phase,
            pass_index: self.current_pass,
            total_passes: self.profile.pass_count,
            percent_complete: percent_complete(completed_units, total_units),
        }
    }

    pub fn completed_passes(&self) -> u32 {
        self.pass_evidence
            .iter()
            .filter(|e| e.stage == EvidenceStage::Overwrite)
            .count() as u32
    }

    pub fn into_outcome(self, final_phase: FinalPhase, failure: Option<Failure>) -> WipeOutcome {
        let pass_count = self.completed_passes();
        WipeOutcome {
            session_id: self.session_id,
            device: self.device,
            final_phase,
            failure,
            method: self.profile.method,
            compliance: self.profile.compliance,
            backend: self.backend,
            pass_count,
            requested_passes: self.profile.pass_count,
            verification_required: self.profile.verification_required,
            pass_evidence: self.pass_evidence,
            phase_history: self.phase_history,
            started_at: self.started_at,
            completed_at: Utc::now(),
            duration: self.clock.elapsed(),
        }
    }
}
