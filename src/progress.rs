//! Progress reporting and cooperative cancellation.
//!
//! Every remote call is bracketed by `check_cancelled`, so cancelling an
//! indicator stops a sync or a listing at the next call boundary.

use crate::error::{Result, SyncError};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub trait ProgressIndicator: Send + Sync {
    fn is_cancelled(&self) -> bool;

    fn cancel(&self);

    fn set_text(&self, text: &str);

    /// Fraction of work done, in `0.0..=1.0`.
    fn set_fraction(&self, fraction: f64);

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Convenience for the `Option<&dyn ProgressIndicator>` threaded through calls.
pub fn check_cancelled(progress: Option<&dyn ProgressIndicator>) -> Result<()> {
    match progress {
        Some(p) => p.check_cancelled(),
        None => Ok(()),
    }
}

pub fn set_text(progress: Option<&dyn ProgressIndicator>, text: &str) {
    if let Some(p) = progress {
        p.set_text(text);
    }
}

// =============================================================================
// Progress (headless)
// =============================================================================

#[derive(Debug, Default)]
pub struct Progress {
    cancelled: AtomicBool,
    fraction_bits: AtomicU64,
    text: Mutex<String>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction_bits.load(Ordering::Relaxed))
    }
}

impl ProgressIndicator for Progress {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn set_text(&self, text: &str) {
        if let Ok(mut current) = self.text.lock() {
            current.clear();
            current.push_str(text);
        }
    }

    fn set_fraction(&self, fraction: f64) {
        self.fraction_bits
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

// =============================================================================
// ConsoleProgress
// =============================================================================

/// Spinner on stderr for command-line hosts.
pub struct ConsoleProgress {
    bar: ProgressBar,
    cancelled: AtomicBool,
}

impl ConsoleProgress {
    const TICK: Duration = Duration::from_millis(120);
    const SCALE: u64 = 1000;

    pub fn new() -> Self {
        let bar = ProgressBar::new(Self::SCALE);
        if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg} [{percent:>3}%]") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Self::TICK);
        Self::with_bar(bar)
    }

    /// Wrap an existing bar, e.g. `ProgressBar::hidden()` in tests.
    pub fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressIndicator for ConsoleProgress {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.bar.abandon_with_message("cancelled");
    }

    fn set_text(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn set_fraction(&self, fraction: f64) {
        let pos = (fraction.clamp(0.0, 1.0) * Self::SCALE as f64) as u64;
        self.bar.set_position(pos);
    }
}
