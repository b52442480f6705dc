use crate::wipe_orchestrator::{Phase, ProgressEvent};
use colored::Colorize;
use std::io::{self, Write};
use std::time::Instant;

pub(crate) const CAT_FRAMES: [&str; 6] = [
    "ฅ(^･ω･^=)  ", // cat happy
    "ฅ(=^･ω･^ ) ",
    "ฅ(^･ᴥ･^=)  ",
    "ฅ(=^ᴥ^= )  ",
    "ฅ(^･ω･^=)  ",
    "ฅ(=^･ω･^ ) ",
];

/// Terminal progress display for one sanitization session
pub struct ProgressBar {
    width: usize,
    cat_pos: usize,
    cat_frame: usize,
    start: Instant,
    first_render: bool,
    capacity_bytes: Option<u64>,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            cat_pos: 0,
            cat_frame: 0,
            start: Instant::now(),
            first_render: true,
            capacity_bytes: None,
        }
    }

    /// Show throughput based on the device capacity
    pub fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = Some(capacity_bytes);
        self
    }

    /// Build the cat line and the bar line for `event`, advancing the animation
    pub fn lines(&mut self, event: &ProgressEvent) -> (String, String) {
        let pct = clamp_percent(event.percent_complete);
        let filled = filled_slots(pct, self.width);
        let empty = self.width.saturating_sub(filled);

        // cat walks across the bar while the session is running
        self.cat_frame = (self.cat_frame + 1) % CAT_FRAMES.len();
        if !event.phase.is_terminal() {
            self.cat_pos = (self.cat_pos + 1) % self.width.max(1);
        }

        let cat: Vec<char> = CAT_FRAMES[self.cat_frame].chars().collect();
        let mut cat_line = vec![' '; self.width + 2];
        let pos = self
            .cat_pos
            .min((self.width + 2).saturating_sub(cat.len()));
        for (i, c) in cat.iter().enumerate() {
            if let Some(slot) = cat_line.get_mut(pos + i) {
                *slot = *c;
            }
        }

        let bar_filled = "█".repeat(filled);
        let bar_empty = "░".repeat(empty);
        let bar_filled = match event.phase {
            Phase::Failed | Phase::Cancelled => bar_filled.red().bold(),
            _ => bar_filled.green().bold(),
        };

        let label = phase_label(&event.phase, event.pass_index, event.total_passes);
        let elapsed = self.start.elapsed().as_secs_f64();
        let mut info = format!("{}  {}", format!("{:.1}%", pct).bold(), label.cyan());

        if let Some(capacity) = self.capacity_bytes {
            // every pass writes the full capacity
            let done = capacity as f64 * f64::from(event.total_passes.max(1)) * pct / 100.0;
            if elapsed > 0.0 && done > 0.0 {
                info.push_str(&format!("  @ {}/s", human_bytes(done / elapsed)));
            }
        }
        if let Some(eta) = eta_secs(pct, elapsed) {
            info.push_str(&format!("  ETA {}", format_duration(eta)));
        }

        (
            cat_line.into_iter().collect(),
            format!("[{}{}] {}", bar_filled, bar_empty.dimmed(), info),
        )
    }

    /// Redraw the display for `event`
    pub fn render(&mut self, event: &ProgressEvent) {
        let (cat_line, bar_line) = self.lines(event);

        if self.first_render {
            print!("{}\n{}\n", cat_line, bar_line);
            self.first_render = false;
        } else {
            // move cursor up 2 lines, clear them, reprint
            print!("\x1b[2A\x1b[2K\r{}\n", cat_line);
            print!("\x1b[2K\r{}\n", bar_line);
        }

        io::stdout().flush().ok();
    }
}

pub(crate) fn clamp_percent(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}

pub(crate) fn filled_slots(pct: f64, width: usize) -> usize {
    ((clamp_percent(pct) / 100.0) * width as f64).round() as usize
}

/// Remaining seconds extrapolated from the share already done
pub(crate) fn eta_secs(pct: f64, elapsed_secs: f64) -> Option<u64> {
    if pct <= 0.0 || pct >= 100.0 || elapsed_secs <= 0.0 {
        return None;
    }
    Some((elapsed_secs * (100.0 - pct) / pct).round() as u64)
}

pub(crate) fn phase_label(phase: &Phase, pass_index: u32, total_passes: u32) -> String {
    match phase {
        Phase::Idle => "Waiting".to_string(),
        Phase::Initializing => "Preparing device".to_string(),
        Phase::Overwriting(_) => format!("Overwriting pass {}/{}", pass_index, total_passes),
        Phase::Verifying => "Verifying".to_string(),
        Phase::Completed => "Completed".to_string(),
        Phase::Failed => "Failed".to_string(),
        Phase::Cancelled => "Cancelled".to_string(),
    }
}

/// Convert a byte count (or bytes/sec) to a readable string
pub(crate) fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub(crate) fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
