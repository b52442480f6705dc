/// Scripted erase backend for orchestrator integration tests
///
/// Records every call, fails on demand, and can hold a chosen pass open
/// behind a `PassGate` so tests can act while a session is mid-pass.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use wipecert::backend::{BackendFailure, EraseBackend, PassReport};
use wipecert::DeviceIdentity;

#[derive(Default)]
struct GateState {
    entered: bool,
    released: bool,
}

/// Blocks one pass until released
pub struct PassGate {
    pass: u32,
    state: Mutex<GateState>,
    cv: Condvar,
}

impl PassGate {
    pub fn new(pass: u32) -> Arc<Self> {
        Arc::new(Self {
            pass,
            state: Mutex::new(GateState::default()),
            cv: Condvar::new(),
        })
    }

    fn hold(&self, aborted: &AtomicBool) {
        let mut state = self.state.lock().unwrap();
        state.entered = true;
        self.cv.notify_all();
        while !state.released && !aborted.load(Ordering::SeqCst) {
            state = self
                .cv
                .wait_timeout(state, Duration::from_millis(5))
                .unwrap()
                .0;
        }
    }

    /// Block until the gated pass has started, or `timeout` expires
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !state.entered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self.cv.wait_timeout(state, deadline - now).unwrap().0;
        }
        true
    }

    /// Async wrapper around `wait_entered` with a 5 second limit
    pub async fn entered(self: &Arc<Self>) -> bool {
        let gate = Arc::clone(self);
        tokio::task::spawn_blocking(move || gate.wait_entered(Duration::from_secs(5)))
            .await
            .unwrap_or(false)
    }

    pub fn release(&self) {
        self.state.lock().unwrap().released = true;
        self.cv.notify_all();
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    reject_prepare: Option<String>,
    fail_pass: Option<u32>,
    fail_verification: bool,
    supports_abort: bool,
    pass_delay: Duration,
    bytes_per_pass: u64,
    gate: Option<Arc<PassGate>>,
    aborted: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            bytes_per_pass: 8_000_000_000,
            ..Self::default()
        }
    }

    pub fn reject_prepare(mut self, reason: &str) -> Self {
        self.reject_prepare = Some(reason.to_string());
        self
    }

    pub fn fail_at_pass(mut self, pass: u32) -> Self {
        self.fail_pass = Some(pass);
        self
    }

    pub fn fail_verification(mut self) -> Self {
        self.fail_verification = true;
        self
    }

    pub fn abortable(mut self) -> Self {
        self.supports_abort = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.pass_delay = delay;
        self
    }

    pub fn with_gate(mut self, gate: Arc<PassGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl EraseBackend for ScriptedBackend {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn prepare(&self, device: &DeviceIdentity) -> Result<(), BackendFailure> {
        self.log(format!("prepare {}", device.device_id));
        match &self.reject_prepare {
            Some(reason) => Err(BackendFailure::Rejected(reason.clone())),
            None => Ok(()),
        }
    }

    fn run_pass(&self, device: &DeviceIdentity, pass_index: u32) -> Result<PassReport, BackendFailure> {
        self.log(format!("pass {}", pass_index));

        if let Some(gate) = self.gate.as_ref().filter(|g| g.pass == pass_index) {
            gate.hold(&self.aborted);
        }
        if !self.pass_delay.is_zero() {
            std::thread::sleep(self.pass_delay);
        }
        if self.aborted.load(Ordering::SeqCst) {
            return Err(BackendFailure::Aborted(format!("pass {} aborted", pass_index)));
        }
        if self.fail_pass == Some(pass_index) {
            return Err(BackendFailure::Write(format!(
                "write error on {} during pass {}",
                device.device_id, pass_index
            )));
        }

        Ok(PassReport::new(
            format!("scripted pass {}", pass_index),
            self.bytes_per_pass,
        ))
    }

    fn verify(&self, device: &DeviceIdentity) -> Result<PassReport, BackendFailure> {
        self.log("verify".to_string());
        if self.fail_verification {
            return Err(BackendFailure::Mismatch(format!(
                "residual data found on {}",
                device.device_id
            )));
        }
        Ok(PassReport::new("scripted verification clean", 4096))
    }

    fn abort(&self) -> bool {
        self.log("abort".to_string());
        if self.supports_abort {
            self.aborted.store(true, Ordering::SeqCst);
        }
        self.supports_abort
    }
}
