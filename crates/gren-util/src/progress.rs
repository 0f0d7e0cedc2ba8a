//! Cargo-style status lines on stderr: `   Resolving my-app`.
//!
//! Labels are right-aligned to 12 columns so messages line up.

use std::io::Write;

use console::Style;

fn status_line(style: Style, label: &str, message: &str) {
    let _ = writeln!(
        std::io::stderr(),
        "{:>12} {message}",
        style.bold().apply_to(label),
    );
}

/// Action performed (bold green label).
pub fn status(label: &str, message: &str) {
    status_line(Style::new().green(), label, message);
}

/// Informational, nothing changed (bold cyan label).
pub fn status_info(label: &str, message: &str) {
    status_line(Style::new().cyan(), label, message);
}

/// Something worth noticing but not fatal (bold yellow label).
pub fn status_warn(label: &str, message: &str) {
    status_line(Style::new().yellow(), label, message);
}
