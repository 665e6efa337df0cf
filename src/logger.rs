//! Phase-tagged run logging.
//!
//! Two outputs from one call: a colorized terminal line (tag color keyed by
//! phase) and an append-only plain-text progress log. The progress log is
//! the run's only persistence; external tools may tail it, so entries are
//! one line each with a trailing RFC 3339 timestamp.

use chrono::Utc;
use console::style;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::phase::Phase;

/// Logger handed to the runner; the current phase is always passed in
/// explicitly by the caller.
pub struct RunLogger {
    progress_file: PathBuf,
    verbose: bool,
}

impl RunLogger {
    pub fn new(progress_file: PathBuf, verbose: bool) -> Self {
        Self {
            progress_file,
            verbose,
        }
    }

    /// Location of the append-only progress log.
    pub fn progress_path(&self) -> &Path {
        &self.progress_file
    }

    /// Phase-tagged informational line.
    pub fn info(&self, phase: Phase, msg: &str) {
        println!("{} {}", self.tag(phase), msg);
        self.append(phase, "info", msg);
    }

    /// Phase-tagged warning.
    pub fn warn(&self, phase: Phase, msg: &str) {
        println!("{} {} {}", self.tag(phase), style("warning:").yellow().bold(), msg);
        self.append(phase, "warn", msg);
    }

    /// Phase-tagged error report.
    pub fn error(&self, phase: Phase, msg: &str) {
        eprintln!("{} {} {}", self.tag(phase), style("error:").red().bold(), msg);
        self.append(phase, "error", msg);
    }

    /// Iteration banner at the top of each loop pass.
    pub fn start_iteration(&self, phase: Phase, iteration: u32, budget: u32) {
        let banner = format!("iteration {iteration}/{budget}");
        println!("{} {}", self.tag(phase), style(&banner).bold());
        self.append(phase, "iteration", &banner);
    }

    /// Relay one line of live tool output, tagged with the tool's name.
    /// Display only, never persisted.
    pub fn tool_line(&self, tool: &str, line: &str) {
        println!("{} {}", style(format!("[{tool}]")).dim(), style(line).dim());
    }

    /// Extra diagnostics shown only with `--verbose`. Not persisted.
    pub fn debug(&self, phase: Phase, msg: &str) {
        if self.verbose {
            eprintln!("{} {}", self.tag(phase), style(msg).dim());
        }
    }

    fn tag(&self, phase: Phase) -> String {
        style(format!("[{phase}]"))
            .fg(phase.color())
            .bold()
            .to_string()
    }

    /// Progress entries are best effort; a failing log write is reported on
    /// stderr and never interrupts the run.
    fn append(&self, phase: Phase, level: &str, msg: &str) {
        if let Err(e) = self.try_append(phase, level, msg) {
            eprintln!("warning: could not write progress log: {e}");
        }
    }

    fn try_append(&self, phase: Phase, level: &str, msg: &str) -> std::io::Result<()> {
        if let Some(parent) = self.progress_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = format!("{}|{}|{}|{}\n", phase, level, msg, Utc::now().to_rfc3339());
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.progress_file)?
            .write_all(entry.as_bytes())
    }
}
