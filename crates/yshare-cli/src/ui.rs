//! Terminal output helpers.

use std::time::Duration;

use yshare_core::config::{Config, StorageBackend};

/// Print the startup banner.
pub fn print_banner(config: &Config) {
    let addr = config.server.bind_addr();
    let storage = match config.storage.backend {
        StorageBackend::Memory => "memory".to_string(),
        StorageBackend::Http => config
            .storage
            .base_url
            .clone()
            .unwrap_or_else(|| "http".to_string()),
    };

    println!();
    println!("Y-Share v{}", yshare_core::VERSION);
    println!("{}", "-".repeat(37));
    println!("  Listening:  http://{}", addr);
    println!("  Storage:    {}", storage);
    println!("  Codes last: {}", format_duration(config.session.ttl));
    println!();
}

/// Parse a duration string like "5m", "30s", or "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (num_str, unit) = if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        return None;
    };

    let num: u64 = num_str.parse().ok()?;
    let secs = num.checked_mul(unit)?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Format a duration as "10 minutes" or "45 seconds".
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 60, secs % 60) {
        (1, 0) => "1 minute".to_string(),
        (mins, 0) if mins > 0 => format!("{} minutes", mins),
        _ => format!("{} seconds", secs),
    }
}
