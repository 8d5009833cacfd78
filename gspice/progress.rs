use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

/// Observer for reporting incremental progress while scanning pixels.
///
/// Methods take `&self` because pixels may finish on several rayon workers at once.
pub trait ScanProgressObserver: Sync {
    fn on_scan_start(&self, total_pixels: usize) {
        let _ = total_pixels;
    }
    fn on_pixel_done(&self, pixel: usize) {
        let _ = pixel;
    }
    fn on_scan_finish(&self) {}
}

#[derive(Default)]
pub struct NoopScanProgress;

impl ScanProgressObserver for NoopScanProgress {}

/// Terminal progress bar. Hidden when stderr is not a terminal.
pub struct ConsoleScanProgress {
    bar: ProgressBar,
}

impl ConsoleScanProgress {
    pub fn new(message: &str) -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ScanProgressObserver for ConsoleScanProgress {
    fn on_scan_start(&self, total_pixels: usize) {
        self.bar.set_length(total_pixels as u64);
        self.bar.set_position(0);
    }

    fn on_pixel_done(&self, pixel: usize) {
        let _ = pixel;
        self.bar.inc(1);
    }

    fn on_scan_finish(&self) {
        self.bar.finish_and_clear();
    }
}
