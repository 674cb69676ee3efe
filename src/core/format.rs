//! Formatting utilities for countdown display.

/// Format remaining seconds as `MM:SS` or `H:MM:SS`.
pub fn format_countdown(secs: u32) -> String {
    let mins = secs / 60;
    let hours = mins / 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins % 60, secs % 60)
    } else {
        format!("{:02}:{:02}", mins, secs % 60)
    }
}
