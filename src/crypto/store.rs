// Certificate persistence
//
// A certificate is stored as two files: `wipe-cert-<id>.json` and
// `wipe-cert-<id>.txt`. Files are written once and never replaced; if the
// second file cannot be committed the first is removed again.

use super::certificates::{Certificate, CertificateRenderings};
use crate::{WipeError, WipeResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const FILE_PREFIX: &str = "wipe-cert-";

/// Where the two renderings of a certificate were stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    pub structured: PathBuf,
    pub document: PathBuf,
}

pub trait CertificateStore: Send + Sync {
    /// Persist both renderings. On error nothing may remain stored.
    fn persist(
        &self,
        certificate_id: &str,
        renderings: &CertificateRenderings,
    ) -> WipeResult<StoredCertificate>;

    fn load(&self, certificate_id: &str) -> WipeResult<Certificate>;

    /// Ids of all stored certificates, sorted
    fn list(&self) -> WipeResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    dir: PathBuf,
}

impl FileCertificateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn structured_path(&self, certificate_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", FILE_PREFIX, certificate_id))
    }

    pub fn document_path(&self, certificate_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.txt", FILE_PREFIX, certificate_id))
    }

    /// Read the human-readable document of a stored certificate
    pub fn load_document(&self, certificate_id: &str) -> WipeResult<String> {
        let path = self.document_path(certificate_id);
        fs::read_to_string(&path)
            .map_err(|e| WipeError::StorageFailure(format!("{}: {}", path.display(), e)))
    }

    fn stage(&self, contents: &str) -> WipeResult<NamedTempFile> {
        let mut file = NamedTempFile::new_in(&self.dir).map_err(|e| storage(&self.dir, e))?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| storage(file.path(), e))?;
        Ok(file)
    }
}

fn storage(path: &Path, error: impl std::fmt::Display) -> WipeError {
    WipeError::StorageFailure(format!("{}: {}", path.display(), error))
}

fn valid_id(certificate_id: &str) -> WipeResult<()> {
    let ok = !certificate_id.is_empty()
        && certificate_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(WipeError::StorageFailure(format!(
            "invalid certificate id '{}'",
            certificate_id
        )))
    }
}

impl CertificateStore for FileCertificateStore {
    fn persist(
        &self,
        certificate_id: &str,
        renderings: &CertificateRenderings,
    ) -> WipeResult<StoredCertificate> {
        valid_id(certificate_id)?;
        fs::create_dir_all(&self.dir).map_err(|e| storage(&self.dir, e))?;

        let structured = self.structured_path(certificate_id);
        let document = self.document_path(certificate_id);
        for path in [&structured, &document] {
            if path.exists() {
                return Err(storage(path, "certificate already exists"));
            }
        }

        let structured_tmp = self.stage(&renderings.structured)?;
        let document_tmp = self.stage(&renderings.document)?;

        structured_tmp
            .persist_noclobber(&structured)
            .map_err(|e| storage(&structured, e.error))?;

        if let Err(e) = document_tmp.persist_noclobber(&document) {
            if let Err(cleanup) = fs::remove_file(&structured) {
                tracing::error!(
                    path = %structured.display(),
                    error = %cleanup,
                    "Could not remove partially stored certificate"
                );
            }
            return Err(storage(&document, e.error));
        }

        // Make the new directory entries durable
        if let Ok(dir) = fs::File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        tracing::debug!(
            certificate_id = %certificate_id,
            dir = %self.dir.display(),
            "Certificate files written"
        );

        Ok(StoredCertificate {
            structured,
            document,
        })
    }

    fn load(&self, certificate_id: &str) -> WipeResult<Certificate> {
        valid_id(certificate_id)?;
        let path = self.structured_path(certificate_id);
        let json = fs::read_to_string(&path).map_err(|e| storage(&path, e))?;
        Certificate::from_json(&json)
    }

    fn list(&self) -> WipeResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = fs::read_dir(&self.dir)
            .map_err(|e| storage(&self.dir, e))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_prefix(FILE_PREFIX)?
                    .strip_suffix(".json")
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
