//! Single-line countdown shown between passes.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// How a countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Elapsed,
    Cancelled,
}

/// Formats whole seconds as `m:ss`, e.g. `15:00` or `0:09`.
pub fn format_remaining(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Waits out a cooldown, rewriting one status line once per tick.
///
/// The shutdown flag is checked every tick; a set flag ends the wait early.
/// The line is always cleared before returning.
#[derive(Debug, Clone)]
pub struct Countdown {
    duration: Duration,
    tick: Duration,
    visible: bool,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            tick: Duration::from_secs(1),
            visible: true,
        }
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Disables the status line. It is also suppressed when stdout is not a
    /// terminal.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.visible || !std::io::stdout().is_terminal() {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(ceil_secs(self.duration));
        let style = ProgressStyle::with_template("{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }

    pub async fn run(&self, shutdown: &AtomicBool) -> CountdownOutcome {
        let bar = self.progress_bar();
        let deadline = Instant::now() + self.duration;

        let outcome = loop {
            if shutdown.load(Ordering::Relaxed) {
                break CountdownOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                break CountdownOutcome::Elapsed;
            }

            let remaining = deadline - now;
            bar.set_position(ceil_secs(self.duration).saturating_sub(ceil_secs(remaining)));
            bar.set_message(format!(
                "Waiting {} until restart...",
                format_remaining(ceil_secs(remaining))
            ));
            tokio::time::sleep(remaining.min(self.tick)).await;
        };

        bar.finish_and_clear();
        outcome
    }
}
