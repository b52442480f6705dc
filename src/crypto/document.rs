// Human-readable certificate document
//
// Plain text with a fixed section order. Every value shown here is read from
// the same `Certificate` that produces the structured rendering.

use super::certificates::Certificate;
use crate::ui::progress::human_bytes;
use chrono::SecondsFormat;
use std::fmt::Write;

pub const DOCUMENT_TITLE: &str = "SECURE DATA WIPE CERTIFICATE";

pub const SECTIONS: [&str; 4] = [
    "Certificate Information",
    "Device Information",
    "Wipe Details",
    "Compliance",
];

const RULE_WIDTH: usize = 64;

pub fn render(certificate: &Certificate) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "{}", center(DOCUMENT_TITLE));
    let _ = writeln!(
        out,
        "{}",
        center(&format!(
            "{} Compliant Data Sanitization",
            certificate.compliance.standard
        ))
    );
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));

    section(&mut out, SECTIONS[0]);
    field(&mut out, "Certificate ID", &certificate.id);
    field(&mut out, "Version", &certificate.version);
    field(
        &mut out,
        "Issued At",
        &certificate
            .issued_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );

    section(&mut out, SECTIONS[1]);
    field(&mut out, "Device ID", &certificate.device.id);
    field(&mut out, "Device Name", &certificate.device.name);
    field(
        &mut out,
        "Size",
        &format!(
            "{} ({} bytes)",
            human_bytes(certificate.device.size_bytes as f64),
            certificate.device.size_bytes
        ),
    );

    section(&mut out, SECTIONS[2]);
    field(&mut out, "Method", &certificate.wipe.method);
    field(&mut out, "Passes", &certificate.wipe.pass_count.to_string());
    field(&mut out, "Status", &certificate.wipe.final_phase.to_string());
    field(&mut out, "Duration", &certificate.wipe.duration);
    field(&mut out, "Evidence Digest", &certificate.wipe.evidence_digest);

    section(&mut out, SECTIONS[3]);
    field(&mut out, "Standard", &certificate.compliance.standard);
    field(&mut out, "Level", &certificate.compliance.level);

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    out
}

fn center(text: &str) -> String {
    let pad = RULE_WIDTH.saturating_sub(text.chars().count()) / 2;
    format!("{}{}", " ".repeat(pad), text)
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(title.chars().count()));
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{:<17}{}", format!("{}:", label), value);
}

/// Value printed for `label`, if the document has that line
pub fn field_value<'a>(document: &'a str, label: &str) -> Option<&'a str> {
    let prefix = format!("{}:", label);
    document
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::trim)
}
