// src/utils/log.rs

//! Banner-style log helpers for the polling loop.
//!
//! Everything goes through the `log` facade, so output format and level are
//! decided by whichever logger the binary installs.

use chrono::Local;

const WIDTH: usize = 60;

/// Log a pass header with the local time.
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    log::info!("{}", border);
    log::info!("  {} ({})", title, Local::now().format("%Y-%m-%d %H:%M:%S"));
    log::info!("{}", border);
}

/// Log a step in a process.
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("{}", step_line(step_num, total, message));
}

/// Log a sub-item (indented).
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a separator line.
pub fn separator() {
    log::info!("{}", "─".repeat(WIDTH));
}

/// Log a summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

fn step_line(step_num: usize, total: usize, message: &str) -> String {
    format!("[{}/{}] {}", step_num, total, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_line() {
        assert_eq!(step_line(2, 4, "fema-nss.json"), "[2/4] fema-nss.json");
    }
}
