// Orchestrator-wide progress observers

use super::session::{ProgressEvent, WipeOutcome};

/// Receives every progress event and outcome of every session.
///
/// Called from the session task; implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_outcome(&self, _outcome: &WipeOutcome) {}
}

/// Mirrors session activity into the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        tracing::debug!(
            session_id = %event.session_id,
            device = %event.device_id,
            phase = %event.phase,
            pass = event.pass_index,
            total_passes = event.total_passes,
            percent = event.percent_complete,
            "Sanitization progress"
        );
    }

    fn on_outcome(&self, outcome: &WipeOutcome) {
        match &outcome.failure {
            None => tracing::info!(
                session_id = %outcome.session_id,
                device = %outcome.device.device_id,
                passes = outcome.pass_count,
                "Sanitization completed"
            ),
            Some(failure) => tracing::warn!(
                session_id = %outcome.session_id,
                device = %outcome.device.device_id,
                final_phase = %outcome.final_phase,
                reason = %failure.reason,
                detail = %failure.detail,
                "Sanitization did not complete"
            ),
        }
    }
}
