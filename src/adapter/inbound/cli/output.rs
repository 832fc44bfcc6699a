//! Terminal output for CLI handlers.
//!
//! Human-readable summaries go to stdout unless `--quiet` or `--json` is set.
//! In JSON mode the only stdout content is the result document, so the
//! output of every command can be piped into `jq`.

use std::fmt::Display;
use std::sync::{OnceLock, RwLock};

use owo_colors::OwoColorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Print the result document instead of the summary.
    pub json: bool,
    pub quiet: bool,
    /// `-v` shows every demand row and debug logs, `-vv` trace logs.
    pub verbose: u8,
}

impl OutputConfig {
    /// Create a new output configuration.
    #[must_use]
    pub const fn new(json: bool, quiet: bool, verbose: u8) -> Self {
        Self {
            json,
            quiet,
            verbose,
        }
    }
}

static OUTPUT_CONFIG: OnceLock<RwLock<OutputConfig>> = OnceLock::new();

fn config_cell() -> &'static RwLock<OutputConfig> {
    OUTPUT_CONFIG.get_or_init(|| RwLock::new(OutputConfig::default()))
}

fn read_config() -> OutputConfig {
    match config_cell().read() {
        Ok(config) => *config,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Human output is printed.
fn human(config: OutputConfig) -> bool {
    !config.json && !config.quiet
}

/// Apply output settings from global CLI flags.
pub fn configure(config: OutputConfig) {
    match config_cell().write() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// Number of `-v` flags.
#[must_use]
pub fn verbosity() -> u8 {
    read_config().verbose
}

/// Print the application header with name and version.
pub fn header(command: &str) {
    if !human(read_config()) {
        return;
    }
    println!(
        "{} {} {}",
        "metaopt".bold(),
        env!("CARGO_PKG_VERSION").dimmed(),
        command.dimmed()
    );
    println!();
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    if !human(read_config()) {
        return;
    }
    println!("  {:<16} {}", label.dimmed(), value);
}

/// Print a section header.
pub fn section(title: &str) {
    if !human(read_config()) {
        return;
    }
    println!();
    println!("{}", title.bold());
}

/// Print a success line.
pub fn success(message: &str) {
    if !human(read_config()) {
        return;
    }
    println!("  {} {}", "✓".green(), message);
}

/// Print a warning line; shown in every mode except JSON.
pub fn warning(message: &str) {
    if read_config().json {
        return;
    }
    eprintln!("  {} {}", "⚠".yellow(), message);
}

/// Print an error line to stderr.
pub fn error(message: &str) {
    if read_config().json {
        eprintln!("{}", serde_json::json!({ "error": message }));
        return;
    }
    eprintln!("  {} {}", "×".red(), message);
}

/// Print rows as a rounded table.
pub fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    if !human(read_config()) {
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    for line in table.to_string().lines() {
        println!("  {line}");
    }
}

/// Print the result document in JSON mode.
pub fn json_output(value: &serde_json::Value) {
    if read_config().json {
        println!("{value}");
    }
}

/// Braille spinner animation frames.
const BRAILLE_SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Create and start a progress spinner.
///
/// Returns a hidden progress bar in JSON or quiet mode.
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    if !human(read_config()) {
        let pb = indicatif::ProgressBar::hidden();
        pb.set_message(message.to_string());
        return pb;
    }

    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .tick_strings(BRAILLE_SPINNER)
        .template("  {spinner:.cyan} {msg} {elapsed:.dim}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Finish a spinner with a success checkmark.
pub fn spinner_success(pb: &indicatif::ProgressBar, message: &str) {
    if !human(read_config()) {
        pb.finish_and_clear();
        return;
    }
    pb.finish_with_message(format!("{} {}", "✓".green(), message));
}

/// Finish a spinner with a failure mark.
pub fn spinner_fail(pb: &indicatif::ProgressBar, message: &str) {
    if read_config().json {
        pb.finish_and_clear();
        return;
    }
    pb.finish_with_message(format!("{} {}", "×".red(), message));
}

/// Format a gap value, green when positive.
pub fn gap(value: f64) -> String {
    let text = format!("{value:.4}");
    if value > 0.0 {
        text.green().to_string()
    } else {
        text
    }
}
