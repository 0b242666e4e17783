// SPDX-License-Identifier: MIT

use indicatif::{ProgressBar, ProgressStyle};

/// Receives integer percentages in `[0, 100]`.
///
/// Reports are monotone non-decreasing and always end at exactly 100, but
/// arrive at no fixed cadence.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

/// Terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.white}] {pos}% {msg}")
                .unwrap()
                .progress_chars("█░░"),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn report(&mut self, percent: u8) {
        self.bar.set_position(percent as u64);
        if percent >= 100 {
            self.bar.finish();
        }
    }
}

/// Discards all reports.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&mut self, _percent: u8) {}
}
