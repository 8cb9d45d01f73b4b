//! Shared styling utilities for terminal output.

use console::Style;
use reconcile_core::tree::Overlay;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Overlay marker: arrows point at the side that will change.
pub fn overlay(overlay: Overlay) -> String {
    let (symbol, style) = match overlay {
        Overlay::AddToLocal => ("+ ←", Style::new().blue()),
        Overlay::ModifyInLocal => ("~ ←", Style::new().blue()),
        Overlay::DeleteFromLocal => ("- ←", Style::new().blue()),
        Overlay::AddToRemote => ("+ →", Style::new().green()),
        Overlay::ModifyInRemote => ("~ →", Style::new().green()),
        Overlay::DeleteFromRemote => ("- →", Style::new().green()),
        Overlay::Conflict => ("! ↔", Style::new().red().bold()),
        Overlay::Merged => ("✓ ↔", Style::new().magenta()),
    };
    format!("{} {}", style.apply_to(symbol), style.apply_to(overlay))
}
