//! Step progress reporter
//!
//! Shows a spinner for each captured-output step while it runs and a one-line
//! status when it ends. Steps that stream to the terminal get a plain header
//! line instead of a spinner so the two do not interleave.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::RefCell;
use std::time::Duration;

/// Progress reporter for build steps
pub struct StepReporter {
    enabled: bool,
    current: RefCell<Option<ProgressBar>>,
}

impl StepReporter {
    /// Create a reporter that draws to stderr
    pub fn new() -> Self {
        Self {
            enabled: true,
            current: RefCell::new(None),
        }
    }

    /// Create a reporter that prints nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            current: RefCell::new(None),
        }
    }

    /// Whether output is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A step is starting. `streaming` steps write to the terminal themselves.
    pub fn start(&self, step: &str, description: &str, streaming: bool) {
        if !self.enabled {
            return;
        }
        if streaming {
            eprintln!("{} {}", style("==>").cyan().bold(), description);
            return;
        }

        let bar = ProgressBar::new_spinner();
        if !console::Term::stderr().is_term() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
            bar.set_style(spinner);
        }
        bar.set_message(format!("{} ({})", description, step));
        bar.enable_steady_tick(Duration::from_millis(100));
        *self.current.borrow_mut() = Some(bar);
    }

    /// The running step finished successfully
    pub fn finish(&self, step: &str, duration: Duration) {
        self.clear();
        if self.enabled {
            eprintln!(
                "{} {} {}",
                style("✓").green(),
                step,
                style(format!("({})", humantime::format_duration(round_ms(duration)))).dim()
            );
        }
    }

    /// A step was skipped
    pub fn skip(&self, step: &str, reason: &str) {
        if self.enabled {
            eprintln!("{} {} {}", style("·").dim(), step, style(reason).dim());
        }
    }

    /// A step would run (dry run)
    pub fn planned(&self, step: &str, reason: &str, command: &str) {
        if self.enabled {
            eprintln!("{} {} {}", style("→").yellow(), step, style(format!("({})", reason)).dim());
            eprintln!("    {}", command);
        }
    }

    /// The running step failed
    pub fn fail(&self, step: &str) {
        self.clear();
        if self.enabled {
            eprintln!("{} {}", style("✗").red().bold(), step);
        }
    }

    fn clear(&self) {
        if let Some(bar) = self.current.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for StepReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn round_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = StepReporter::disabled();
        assert!(!reporter.is_enabled());
        reporter.start("compile-kernel", "Compiling kernel", false);
        assert!(reporter.current.borrow().is_none());
        reporter.finish("compile-kernel", Duration::from_millis(5));
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(Duration::from_micros(1_500)), Duration::from_millis(1));
    }
}
