//! Terminal feedback while audits run.
//!
//! Quiet runs show a progress bar over the audit list; verbose runs print
//! one line per audit instead. Both stay plain when stdout is not a
//! terminal, `NO_COLOR` is set, or `TERM=dumb`.

use crate::report::{ComparisonOutcome, RunSummary};
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Duration;

const SPINNER_TICK_MS: u64 = 80;

static FORCE_PLAIN: OnceLock<bool> = OnceLock::new();

/// Set up console output for the process. `force_plain` disables colors and
/// the progress bar. Only the first call takes effect.
pub fn init(force_plain: bool) {
    let _ = FORCE_PLAIN.set(force_plain);
    if !should_use_rich_output() {
        colored::control::set_override(false);
    }
}

/// Whether colors and progress bars should be drawn.
#[must_use]
pub fn should_use_rich_output() -> bool {
    if FORCE_PLAIN.get().copied().unwrap_or(false) {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }
    console::Term::stdout().is_term()
}

/// `SUCCESS` in green or `FAILED` in red.
#[must_use]
pub fn status_label(matched: bool) -> ColoredString {
    if matched {
        "SUCCESS".green()
    } else {
        "FAILED".red()
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} audits {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("█▓░"))
}

/// Per-run console reporter.
#[derive(Debug)]
pub struct Console {
    verbose: bool,
    total: usize,
    bar: Option<ProgressBar>,
}

impl Console {
    #[must_use]
    pub fn new(total: usize, verbose: bool) -> Self {
        let bar = (!verbose && should_use_rich_output()).then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(progress_style());
            bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            bar
        });
        Self {
            verbose,
            total,
            bar,
        }
    }

    /// Reporter that prints nothing.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            verbose: false,
            total: 0,
            bar: None,
        }
    }

    /// `index` is zero-based.
    pub fn audit_started(&self, index: usize, name: &str) {
        if self.verbose {
            print!("Audit started ({}/{}): ", index + 1, self.total);
            let _ = io::stdout().flush();
        } else if let Some(bar) = &self.bar {
            bar.set_message(name.to_string());
        }
    }

    pub fn audit_finished(&self, outcome: &ComparisonOutcome) {
        if self.verbose {
            println!("{}", status_label(outcome.matched));
        } else if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn finish(&self, summary: &RunSummary) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        if self.verbose {
            println!("{summary}");
        }
    }
}

/// Prints script output without tearing an active progress bar.
///
/// Cheap to clone; every clone sees the bar attached to any of them.
#[derive(Debug, Clone, Default)]
pub struct ConsolePrinter {
    bar: Rc<RefCell<Option<ProgressBar>>>,
}

impl ConsolePrinter {
    /// Print around `console`'s bar until [`detach`](Self::detach).
    pub fn attach(&self, console: &Console) {
        *self.bar.borrow_mut() = console.bar.clone();
    }

    pub fn detach(&self) {
        self.bar.borrow_mut().take();
    }

    pub fn is_attached(&self) -> bool {
        self.bar.borrow().is_some()
    }

    pub fn println(&self, text: &str) {
        match self.bar.borrow().as_ref() {
            Some(bar) => bar.suspend(|| println!("{text}")),
            None => println!("{text}"),
        }
    }
}
