//! Progress indicators for long-running commands
//!
//! Spinners draw to stderr and hide themselves when it is not a terminal.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run `work` behind a spinner, clearing it whatever the outcome
pub fn with_spinner<T>(message: &str, work: impl FnOnce() -> T) -> T {
    let pb = create_spinner(message);
    let result = work();
    pb.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spinner() {
        let pb = create_spinner("Packaging...");
        assert!(!pb.is_finished());
        pb.finish();
        assert!(pb.is_finished());
    }

    #[test]
    fn test_with_spinner_returns_result() {
        assert_eq!(with_spinner("Working", || 42), 42);
    }
}
