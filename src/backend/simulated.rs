// Simulated backend - deterministic stand-in for physical media
//
// Used for dry runs and tests. Passes take `pass_delay`, report the device
// capacity as processed, and fail on demand.

use super::{BackendFailure, EraseBackend, PassReport};
use crate::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity at which a delayed pass checks for abort requests
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub pass_delay: Duration,
    /// Pass index (1-based) that reports a write failure
    pub fail_pass: Option<u32>,
    pub fail_verification: bool,
    pub supports_abort: bool,
}

pub struct SimulatedBackend {
    config: SimulationConfig,
    aborted: AtomicBool,
}

impl SimulatedBackend {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            aborted: AtomicBool::new(false),
        }
    }

    fn wait_pass(&self, pass_index: u32) -> Result<(), BackendFailure> {
        let started = Instant::now();
        while started.elapsed() < self.config.pass_delay {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(BackendFailure::Aborted(format!(
                    "simulated pass {} aborted",
                    pass_index
                )));
            }
            std::thread::sleep(ABORT_POLL_INTERVAL.min(self.config.pass_delay));
        }
        Ok(())
    }
}

impl EraseBackend for SimulatedBackend {
    fn name(&self) -> String {
        "simulated".to_string()
    }

    fn run_pass(
        &self,
        device: &DeviceIdentity,
        pass_index: u32,
    ) -> Result<PassReport, BackendFailure> {
        self.wait_pass(pass_index)?;

        if self.config.fail_pass == Some(pass_index) {
            return Err(BackendFailure::Write(format!(
                "simulated write failure on pass {}",
                pass_index
            )));
        }

        Ok(PassReport::new(
            format!("simulated pass {} over {} bytes", pass_index, device.capacity_bytes),
            device.capacity_bytes,
        ))
    }

    fn verify(&self, device: &DeviceIdentity) -> Result<PassReport, BackendFailure> {
        if self.config.fail_verification {
            return Err(BackendFailure::Mismatch(format!(
                "simulated readback mismatch on {}",
                device.device_id
            )));
        }

        Ok(PassReport::new("simulated readback clean", device.capacity_bytes))
    }

    fn abort(&self) -> bool {
        if self.config.supports_abort {
            self.aborted.store(true, Ordering::SeqCst);
        }
        self.config.supports_abort
    }
}
