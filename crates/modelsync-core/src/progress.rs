use std::io::{self, Write};
use std::time::{Duration, Instant};

const REDRAW_INTERVAL: Duration = Duration::from_millis(120);

fn clear_progress_line() {
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(b"\r\x1b[2K");
    let _ = stderr.flush();
}

/// Byte counter for a single transfer, drawn on one stderr line.
///
/// The total comes from `Content-Length` and is advisory: a missing or wrong
/// header only changes what is drawn.
pub struct TransferProgress {
    label: String,
    total: Option<u64>,
    current: u64,
    last_draw: Option<Instant>,
    enabled: bool,
}

impl TransferProgress {
    pub fn start(label: impl Into<String>, total: Option<u64>, enabled: bool) -> Self {
        Self {
            label: label.into(),
            total: total.filter(|total| *total > 0),
            current: 0,
            last_draw: None,
            enabled,
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.current = self.current.saturating_add(bytes);
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        if self
            .last_draw
            .is_some_and(|last| now.saturating_duration_since(last) < REDRAW_INTERVAL)
        {
            return;
        }
        self.last_draw = Some(now);
        self.draw();
    }

    pub fn finish(mut self) -> u64 {
        self.stop();
        self.current
    }

    fn draw(&self) {
        let line = render_line(&self.label, self.current, self.total);
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{line}");
        let _ = stderr.flush();
    }

    fn stop(&mut self) {
        if self.enabled {
            clear_progress_line();
            self.enabled = false;
        }
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_line(label: &str, current: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => {
            let percent = (current.min(total) * 100) / total;
            format!(
                "modelsync ▸ {label} {} / {} ({percent}%)",
                format_bytes(current),
                format_bytes(total)
            )
        }
        None => format!("modelsync ▸ {label} {}", format_bytes(current)),
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
