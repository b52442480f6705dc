// Wipe Orchestrator - drives one sanitization session per device
//
// `start` validates synchronously, takes the device lock and returns a handle;
// the phase sequence then runs on a tokio task. Backend calls are the only
// suspension points and run on the blocking pool. Runtime failures end up in
// the `WipeOutcome`, never as errors crossing the session boundary.

pub mod lock;
pub mod observer;
pub mod session;

pub use lock::{DeviceLockGuard, DeviceLockTable};
pub use observer::{LoggingObserver, ProgressObserver};
pub use session::{
    percent_complete, Failure, FailureReason, FinalPhase, Phase, ProgressEvent, SessionEvent,
    WipeOutcome, WipeSession,
};

use crate::backend::{BackendFailure, BackendSelector, EraseBackend};
use crate::crypto::evidence::EvidenceStage;
use crate::{DeviceIdentity, SanitizationProfile, WipeError, WipeResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Cancellation state shared between the orchestrator and a running session
struct SessionControl {
    cancel_requested: AtomicBool,
    backend: Arc<dyn EraseBackend>,
}

type SessionRegistry = Arc<Mutex<HashMap<String, Arc<SessionControl>>>>;

fn registry(sessions: &SessionRegistry) -> MutexGuard<'_, HashMap<String, Arc<SessionControl>>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Main sanitization orchestrator
#[derive(Clone)]
pub struct SanitizationOrchestrator {
    locks: Arc<DeviceLockTable>,
    sessions: SessionRegistry,
    selector: Arc<dyn BackendSelector>,
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl SanitizationOrchestrator {
    pub fn new(selector: Arc<dyn BackendSelector>) -> Self {
        Self {
            locks: Arc::new(DeviceLockTable::new()),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            selector,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Start sanitizing `device` with `profile`.
    ///
    /// Must be called from within a tokio runtime. Profile, eligibility and
    /// lock failures are returned here and never create a session.
    pub fn start(
        &self,
        device: DeviceIdentity,
        profile: SanitizationProfile,
    ) -> WipeResult<SessionHandle> {
        profile.validate()?;
        device.check_eligible()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WipeError::RuntimeUnavailable(e.to_string()))?;

        let lock = self.locks.try_acquire(&device.device_id)?;
        let backend = self.selector.select(&device, &profile)?;

        let session = WipeSession::new(device, profile, backend.name());
        let session_id = session.session_id.clone();
        let device_id = session.device.device_id.clone();

        let control = Arc::new(SessionControl {
            cancel_requested: AtomicBool::new(false),
            backend: Arc::clone(&backend),
        });
        registry(&self.sessions).insert(session_id.clone(), Arc::clone(&control));

        tracing::info!(
            session_id = %session_id,
            device = %device_id,
            method = %session.profile.method,
            passes = session.profile.pass_count,
            verify = session.profile.verification_required,
            backend = %session.backend,
            "Sanitization session started"
        );

        let (events, receiver) = mpsc::unbounded_channel();
        let runner = SessionRunner {
            session,
            backend,
            control,
            events,
            observers: self.observers.clone(),
            sessions: Arc::clone(&self.sessions),
            lock,
        };
        runtime.spawn(runner.run());

        Ok(SessionHandle {
            session_id,
            device_id,
            events: receiver,
        })
    }

    /// Request cancellation of a running session.
    ///
    /// The backend is asked to abort; if it cannot, the current pass finishes
    /// and the session stops before the next one.
    pub fn cancel(&self, session_id: &str) -> WipeResult<()> {
        let sessions = registry(&self.sessions);
        let control = sessions.get(session_id).ok_or_else(|| {
            WipeError::SessionNotActive(format!("{} is not running", session_id))
        })?;

        control.cancel_requested.store(true, Ordering::SeqCst);
        let aborted = control.backend.abort();

        tracing::info!(
            session_id = %session_id,
            backend_abort = aborted,
            "Cancellation requested"
        );
        Ok(())
    }

    /// Ids of sessions that have not reached a terminal phase
    pub fn active_sessions(&self) -> Vec<String> {
        registry(&self.sessions).keys().cloned().collect()
    }

    pub fn is_device_busy(&self, device_id: &str) -> bool {
        self.locks.is_locked(device_id)
    }
}

/// Caller's view of a session: its id and the ordered event stream.
pub struct SessionHandle {
    session_id: String,
    device_id: String,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Next event, or `None` once the outcome has been delivered
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Wait for the outcome, discarding progress events
    pub async fn wait(self) -> WipeResult<WipeOutcome> {
        self.wait_with_progress().await.map(|(_, outcome)| outcome)
    }

    /// Wait for the outcome, returning every progress event in order
    pub async fn wait_with_progress(mut self) -> WipeResult<(Vec<ProgressEvent>, WipeOutcome)> {
        let mut progress = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                SessionEvent::Progress(p) => progress.push(p),
                SessionEvent::Finished(outcome) => return Ok((progress, outcome)),
            }
        }

        Err(WipeError::SessionNotActive(format!(
            "{} ended without an outcome",
            self.session_id
        )))
    }
}

struct SessionRunner {
    session: WipeSession,
    backend: Arc<dyn EraseBackend>,
    control: Arc<SessionControl>,
    events: mpsc::UnboundedSender<SessionEvent>,
    observers: Vec<Arc<dyn ProgressObserver>>,
    sessions: SessionRegistry,
    lock: DeviceLockGuard,
}

impl SessionRunner {
    async fn run(mut self) {
        let result = self.execute().await;

        // Deregister under the registry lock so a cancel accepted before this
        // point is always reflected in the outcome.
        let cancel_seen = {
            let mut sessions = registry(&self.sessions);
            sessions.remove(&self.session.session_id);
            self.control.cancel_requested.load(Ordering::SeqCst)
        };

        let failure = match result {
            Ok(()) if cancel_seen => Some(Failure::new(
                FailureReason::Cancelled,
                "cancelled after the final phase finished",
            )),
            Ok(()) => None,
            Err(failure) => Some(failure),
        };

        let final_phase = match &failure {
            None => FinalPhase::Completed,
            Some(f) => f.reason.final_phase(),
        };

        if let Err(e) = self.session.transition(final_phase.as_phase()) {
            tracing::error!(
                session_id = %self.session.session_id,
                error = %e,
                "Terminal transition rejected"
            );
        }
        self.emit();

        let SessionRunner {
            session,
            events,
            observers,
            lock,
            ..
        } = self;

        let outcome = session.into_outcome(final_phase, failure);
        drop(lock);

        for observer in &observers {
            observer.on_outcome(&outcome);
        }
        let _ = events.send(SessionEvent::Finished(outcome));
    }

    async fn execute(&mut self) -> Result<(), Failure> {
        self.advance(Phase::Initializing)?;

        let device = self.session.device.clone();
        let backend = Arc::clone(&self.backend);
        self.blocking(move || backend.prepare(&device))
            .await?
            .map_err(|e| Failure::new(FailureReason::IneligibleDevice, e.to_string()))?;
        self.check_cancel()?;

        let total_passes = self.session.total_passes();
        self.advance(Phase::Overwriting(1))?;

        for pass in 1..=total_passes {
            let device = self.session.device.clone();
            let backend = Arc::clone(&self.backend);
            let result = self.blocking(move || backend.run_pass(&device, pass)).await?;

            match result {
                Ok(report) => {
                    tracing::info!(
                        session_id = %self.session.session_id,
                        pass,
                        total_passes,
                        bytes = report.bytes_processed,
                        "Overwrite pass completed"
                    );
                    self.session.record(EvidenceStage::Overwrite, &report);
                }
                Err(e) => return Err(self.pass_failure(pass, e)),
            }

            self.check_cancel()?;
            if pass < total_passes {
                self.advance(Phase::Overwriting(pass + 1))?;
            }
        }

        if self.session.profile.verification_required {
            self.advance(Phase::Verifying)?;

            let device = self.session.device.clone();
            let backend = Arc::clone(&self.backend);
            let result = self.blocking(move || backend.verify(&device)).await?;

            match result {
                Ok(report) => self.session.record(EvidenceStage::Verification, &report),
                Err(e) => {
                    self.session.mark_unit_attempted();
                    if self.cancel_requested() && matches!(e, BackendFailure::Aborted(_)) {
                        return Err(Failure::new(FailureReason::Cancelled, e.to_string()));
                    }
                    return Err(Failure::new(FailureReason::VerificationFailed, e.to_string()));
                }
            }
            self.check_cancel()?;
        }

        // The terminal transition happens in `run` once the session is deregistered
        Ok(())
    }

    fn pass_failure(&self, pass: u32, failure: BackendFailure) -> Failure {
        if self.cancel_requested() && matches!(failure, BackendFailure::Aborted(_)) {
            tracing::info!(session_id = %self.session.session_id, pass, "Pass aborted on request");
            return Failure::new(FailureReason::Cancelled, failure.to_string());
        }

        tracing::error!(
            session_id = %self.session.session_id,
            pass,
            error = %failure,
            "Overwrite pass failed"
        );
        Failure::new(
            FailureReason::BackendError,
            format!("pass {}: {}", pass, failure),
        )
    }

    /// Run a backend call on the blocking pool
    async fn blocking<T, F>(&self, call: F) -> Result<T, Failure>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(call).await.map_err(|e| {
            Failure::new(
                FailureReason::BackendError,
                format!("backend task did not complete: {}", e),
            )
        })
    }

    fn cancel_requested(&self) -> bool {
        self.control.cancel_requested.load(Ordering::SeqCst)
    }

    fn check_cancel(&self) -> Result<(), Failure> {
        if self.cancel_requested() {
            return Err(Failure::new(
                FailureReason::Cancelled,
                format!("cancelled during {}", self.session.phase),
            ));
        }
        Ok(())
    }

    fn advance(&mut self, next: Phase) -> Result<(), Failure> {
        self.session.transition(next).map_err(Failure::from)?;
        self.emit();
        Ok(())
    }

    fn emit(&self) {
        let event = self.session.progress();
        for observer in &self.observers {
            observer.on_progress(&event);
        }
        // The handle may have been dropped; the session still runs to completion
        let _ = self.events.send(SessionEvent::Progress(event));
    }
}

/// Convenience function: run one session to its outcome
pub async fn sanitize_device(
    orchestrator: &SanitizationOrchestrator,
    device: DeviceIdentity,
    profile: SanitizationProfile,
) -> WipeResult<WipeOutcome> {
    orchestrator.start(device, profile)?.wait().await
}
