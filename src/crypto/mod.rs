pub mod certificates;
pub mod document;
pub mod evidence;
pub mod store;

// Re-export
pub use certificates::{
    Certificate, CertificateDevice, CertificateIssuer, CertificateRenderings, CertificateWipe,
    IssuedCertificate, CERTIFICATE_VERSION,
};
pub use evidence::{evidence_digest, pass_digest, EvidenceStage, EvidenceStatus, PassEvidence};
pub use store::{CertificateStore, FileCertificateStore, StoredCertificate};
