// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn demo_name(name: &str) -> ColoredString {
    name.cyan().bold()
}

pub fn dimmed(msg: &str) -> ColoredString {
    msg.dimmed()
}

pub fn banner_ok(name: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} OK", name).green().bold(),
        "===".dimmed()
    )
}

pub fn banner_fail(name: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} FAILED", name).red().bold(),
        "===".dimmed()
    )
}
