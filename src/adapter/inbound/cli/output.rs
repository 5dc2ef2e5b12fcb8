//! Terminal output for CLI handlers.
//!
//! Every user-facing line goes through here so `--json`, `--quiet` and
//! `--verbose` behave the same across commands. In JSON mode each call
//! prints one `{"type": ..., "payload": ...}` line on stdout.

use std::fmt::Display;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Runtime output configuration shared by CLI handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit machine-readable JSON output instead of human-readable text.
    pub json: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
    /// Verbosity level (0 = normal, 1+ = increasingly verbose).
    pub verbose: u8,
}

impl OutputConfig {
    #[must_use]
    pub const fn new(json: bool, quiet: bool, verbose: u8) -> Self {
        Self { json, quiet, verbose }
    }
}

static CONFIG: RwLock<OutputConfig> = RwLock::new(OutputConfig::new(false, false, 0));

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Whether a line survives `--quiet`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Priority {
    Regular,
    Always,
}

fn current() -> OutputConfig {
    *CONFIG.read()
}

fn json_line(kind: &str, payload: Value) -> String {
    json!({ "type": kind, "payload": payload }).to_string()
}

/// Route one line to JSON or to `render`, honouring `--quiet`.
fn emit(kind: &str, priority: Priority, payload: impl FnOnce() -> Value, render: impl FnOnce()) {
    let config = current();
    if config.json {
        println!("{}", json_line(kind, payload()));
    } else if !config.quiet || priority == Priority::Always {
        render();
    }
}

/// Apply output settings from global CLI flags.
pub fn configure(config: OutputConfig) {
    *CONFIG.write() = config;
}

#[must_use]
pub fn is_json() -> bool {
    current().json
}

/// Count of `-v` flags.
#[must_use]
pub fn verbosity() -> u8 {
    current().verbose
}

pub fn header(version: &str) {
    emit(
        "header",
        Priority::Regular,
        || json!({ "app": "nodewiz", "version": version }),
        || {
            println!("{} {}", "nodewiz".bold(), version.dimmed());
            println!();
        },
    );
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    let value = value.to_string();
    emit(
        "field",
        Priority::Regular,
        || json!({ "label": label, "value": value }),
        || println!("  {:<14} {}", label.dimmed(), value),
    );
}

pub fn success(message: &str) {
    emit(
        "success",
        Priority::Regular,
        || json!({ "message": message }),
        || println!("  {} {}", "✓".green(), message),
    );
}

/// Warnings are shown even in quiet mode.
pub fn warning(message: &str) {
    emit(
        "warning",
        Priority::Always,
        || json!({ "message": message }),
        || println!("  {} {}", "⚠".yellow(), message),
    );
}

/// Print an error line on stderr, in JSON mode too.
pub fn error(message: &str) {
    if is_json() {
        eprintln!("{}", json_line("error", json!({ "message": message })));
    } else {
        eprintln!("  {} {}", "×".red(), message);
    }
}

pub fn section(title: &str) {
    emit(
        "section",
        Priority::Regular,
        || json!({ "title": title }),
        || {
            println!();
            println!("{}", title.bold());
        },
    );
}

/// Progress line for one orchestrator stage, e.g. `S2 health gate ...`.
pub fn stage(code: &str, message: &str) {
    emit(
        "stage",
        Priority::Regular,
        || json!({ "code": code, "message": message }),
        || println!("  {:<4} {}", code.cyan(), message),
    );
}

/// A host that dropped out of a stage. Kept under `--quiet`.
pub fn host_line(host: &str, message: &str) {
    emit(
        "host",
        Priority::Always,
        || json!({ "host": host, "message": message }),
        || println!("       {} {} {}", "×".red(), host.bold(), message.dimmed()),
    );
}

/// Start a spinner. Hidden in JSON or quiet mode.
pub fn spinner(message: &str) -> ProgressBar {
    let config = current();
    if config.json || config.quiet {
        let pb = ProgressBar::hidden();
        pb.set_message(message.to_string());
        return pb;
    }

    let style = ProgressStyle::default_spinner()
        .tick_strings(SPINNER_FRAMES)
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner().with_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spinner_success(pb: &ProgressBar, message: &str) {
    let line = format!("{} {}", "✓".green(), message);
    finish_spinner(pb, "spinner_success", Priority::Regular, line, message);
}

/// Failures stay visible under `--quiet`.
pub fn spinner_fail(pb: &ProgressBar, message: &str) {
    let line = format!("{} {}", "×".red(), message);
    finish_spinner(pb, "spinner_fail", Priority::Always, line, message);
}

fn finish_spinner(pb: &ProgressBar, kind: &str, priority: Priority, line: String, message: &str) {
    let mut shown = false;
    emit(kind, priority, || json!({ "message": message }), || shown = true);
    if shown {
        pb.finish_with_message(line);
    } else {
        pb.finish_and_clear();
    }
}

/// Format a highlighted value in cyan.
pub fn highlight(value: impl Display) -> String {
    if is_json() {
        return value.to_string();
    }
    value.cyan().to_string()
}

/// Format a dimmed value.
pub fn muted(value: impl Display) -> String {
    if is_json() {
        return value.to_string();
    }
    value.dimmed().to_string()
}

pub fn note(message: &str) {
    emit(
        "note",
        Priority::Regular,
        || json!({ "message": message }),
        || println!("  {}", message.dimmed()),
    );
}

/// Print a hint with a "hint:" prefix.
pub fn hint(message: &str) {
    emit(
        "hint",
        Priority::Regular,
        || json!({ "message": message }),
        || println!("  {}: {}", "hint".cyan().dimmed(), message.dimmed()),
    );
}

/// Emit a JSON value directly, for commands with structured results.
pub fn json_output(value: Value) {
    println!("{value}");
}

/// Print rows as a table; in JSON mode, one `row` line per record.
pub fn table<T: Tabled + serde::Serialize>(rows: &[T]) {
    let config = current();
    if config.json {
        for row in rows {
            println!("{}", json_line("row", json!(row)));
        }
        return;
    }
    if config.quiet {
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    for line in table.to_string().lines() {
        println!("  {line}");
    }
}
