//! Output formatting utilities for the CLI
//!
//! Tables for the inventory and the pending registry, plus coloured status
//! messages.

use tabled::{settings::Style, Table, Tabled};

use sx_core::{HostEntry, PendingRequest};

/// Format the inventory as an ASCII table
///
/// Returns "No trusted hosts" when the inventory is empty.
pub fn format_hosts(hosts: &[HostEntry]) -> String {
    if hosts.is_empty() {
        return "No trusted hosts".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "ALIAS")]
        alias: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .map(|h| HostRow {
            alias: h.identity.clone(),
            address: h.address.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format outstanding registration requests as an ASCII table
pub fn format_pending(requests: &[PendingRequest]) -> String {
    if requests.is_empty() {
        return "No pending registrations".to_string();
    }

    #[derive(Tabled)]
    struct PendingRow {
        #[tabled(rename = "HOSTNAME")]
        hostname: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
    }

    let rows: Vec<PendingRow> = requests
        .iter()
        .map(|r| PendingRow {
            hostname: if r.claimed_identity.is_empty() {
                "-".to_string()
            } else {
                r.claimed_identity.clone()
            },
            address: r.source_address.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
///
/// Outputs to stderr; stdout is reserved for command output.
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
