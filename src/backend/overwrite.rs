// Overwrite backend - multi-pass pattern overwrite of a file or block target
//
// Each pass writes its pattern across `capacity_bytes` of the target in fixed
// chunks and syncs before reporting completion. Random passes are generated
// from a per-backend seed so verification can regenerate the exact bytes the
// final pass wrote and compare sampled chunks against them.

use super::{BackendFailure, EraseBackend, PassReport};
use crate::{DeviceIdentity, OverwriteScheme};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default write chunk (4MB)
const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Number of chunks read back during verification
const DEFAULT_VERIFY_SAMPLES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPattern {
    Fill(u8),
    Random,
}

impl PassPattern {
    /// Pattern written by `pass_index` (1-based) under `scheme`
    pub fn for_pass(scheme: OverwriteScheme, pass_index: u32, total_passes: u32) -> Self {
        match scheme {
            OverwriteScheme::Zeros => PassPattern::Fill(0x00),
            OverwriteScheme::Ones => PassPattern::Fill(0xFF),
            OverwriteScheme::Random => PassPattern::Random,
            OverwriteScheme::DoD5220 => match (pass_index.saturating_sub(1)) % 3 {
                0 => PassPattern::Fill(0x00),
                1 => PassPattern::Fill(0xFF),
                _ => PassPattern::Random,
            },
            OverwriteScheme::Alternating => {
                if pass_index == total_passes && total_passes > 1 {
                    PassPattern::Random
                } else if pass_index % 2 == 1 {
                    PassPattern::Fill(0x55)
                } else {
                    PassPattern::Fill(0xAA)
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            PassPattern::Fill(byte) => format!("0x{:02X}", byte),
            PassPattern::Random => "random data".to_string(),
        }
    }
}

pub struct OverwriteBackend {
    path: PathBuf,
    scheme: OverwriteScheme,
    total_passes: u32,
    seed: u64,
    chunk_size: usize,
    verify_samples: usize,
    abort_requested: AtomicBool,
}

impl OverwriteBackend {
    pub fn new(path: impl Into<PathBuf>, scheme: OverwriteScheme, total_passes: u32) -> Self {
        Self {
            path: path.into(),
            scheme,
            total_passes,
            seed: rand::random(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify_samples: DEFAULT_VERIFY_SAMPLES,
            abort_requested: AtomicBool::new(false),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_verify_samples(mut self, samples: usize) -> Self {
        self.verify_samples = samples.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fill `buffer` with the bytes `pattern` places at chunk `chunk_index`
    fn fill_chunk(&self, pattern: PassPattern, pass_index: u32, chunk_index: u64, buffer: &mut [u8]) {
        match pattern {
            PassPattern::Fill(byte) => buffer.fill(byte),
            PassPattern::Random => {
                let chunk_seed = self
                    .seed
                    .wrapping_add(u64::from(pass_index) << 40)
                    .wrapping_add(chunk_index);
                let mut rng = StdRng::seed_from_u64(chunk_seed);
                rng.fill_bytes(buffer);
            }
        }
    }

    fn chunk_count(&self, capacity: u64) -> u64 {
        capacity.div_ceil(self.chunk_size as u64)
    }

    fn chunk_len(&self, capacity: u64, chunk_index: u64) -> usize {
        let offset = chunk_index * self.chunk_size as u64;
        (capacity - offset).min(self.chunk_size as u64) as usize
    }
}

impl EraseBackend for OverwriteBackend {
    fn name(&self) -> String {
        "overwrite".to_string()
    }

    fn prepare(&self, device: &DeviceIdentity) -> Result<(), BackendFailure> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| {
            BackendFailure::Rejected(format!("{}: {}", self.path.display(), e))
        })?;

        // Block devices report a zero length; regular images must fit the device
        if metadata.is_file() && metadata.len() < device.capacity_bytes {
            return Err(BackendFailure::Rejected(format!(
                "{} holds {} bytes but device reports {}",
                self.path.display(),
                metadata.len(),
                device.capacity_bytes
            )));
        }

        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| BackendFailure::Rejected(format!("{}: {}", self.path.display(), e)))?;

        Ok(())
    }

    fn run_pass(
        &self,
        device: &DeviceIdentity,
        pass_index: u32,
    ) -> Result<PassReport, BackendFailure> {
        let pattern = PassPattern::for_pass(self.scheme, pass_index, self.total_passes);
        let capacity = device.capacity_bytes;

        tracing::debug!(
            device = %device.device_id,
            pass = pass_index,
            pattern = %pattern.describe(),
            "Starting overwrite pass"
        );

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(0))?;

        let mut buffer = vec![0u8; self.chunk_size.min(capacity as usize).max(1)];
        let mut written = 0u64;

        for chunk_index in 0..self.chunk_count(capacity) {
            if self.abort_requested.load(Ordering::SeqCst) {
                return Err(BackendFailure::Aborted(format!(
                    "pass {} stopped after {} bytes",
                    pass_index, written
                )));
            }

            let len = self.chunk_len(capacity, chunk_index);
            let chunk = &mut buffer[..len];
            self.fill_chunk(pattern, pass_index, chunk_index, chunk);
            file.write_all(chunk)?;
            written += len as u64;
        }

        file.sync_all()?;

        Ok(PassReport::new(
            format!(
                "pass {}/{} wrote {} over {} bytes",
                pass_index,
                self.total_passes,
                pattern.describe(),
                written
            ),
            written,
        ))
    }

    fn verify(&self, device: &DeviceIdentity) -> Result<PassReport, BackendFailure> {
        let capacity = device.capacity_bytes;
        let final_pass = self.total_passes;
        let pattern = PassPattern::for_pass(self.scheme, final_pass, self.total_passes);
        let chunks = self.chunk_count(capacity);

        // First and last chunk always, the rest sampled at random
        let mut samples = vec![0, chunks.saturating_sub(1)];
        let mut rng = rand::thread_rng();
        while samples.len() < self.verify_samples.min(chunks as usize).max(2) {
            samples.push(rng.gen_range(0..chunks));
        }
        samples.sort_unstable();
        samples.dedup();

        let mut file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| BackendFailure::Mismatch(format!("cannot read back target: {}", e)))?;

        let mut actual = vec![0u8; self.chunk_size.min(capacity as usize).max(1)];
        let mut expected = actual.clone();
        let mut bytes_read = 0u64;

        for &chunk_index in &samples {
            let offset = chunk_index * self.chunk_size as u64;
            let len = self.chunk_len(capacity, chunk_index);

            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut actual[..len]))
                .map_err(|e| {
                    BackendFailure::Mismatch(format!("read failed at offset {}: {}", offset, e))
                })?;

            self.fill_chunk(pattern, final_pass, chunk_index, &mut expected[..len]);
            if actual[..len] != expected[..len] {
                return Err(BackendFailure::Mismatch(format!(
                    "chunk at offset {} does not match final pass pattern {}",
                    offset,
                    pattern.describe()
                )));
            }
            bytes_read += len as u64;
        }

        Ok(PassReport::new(
            format!(
                "read back {} sampled chunks matching {}",
                samples.len(),
                pattern.describe()
            ),
            bytes_read,
        ))
    }

    fn abort(&self) -> bool {
        self.abort_requested.store(true, Ordering::SeqCst);
        true
    }
}
