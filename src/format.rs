use chrono::{Local, TimeZone};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Rounds the exact binary value to `digits` decimals, ties to even.
pub fn round_to(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let digits = digits as usize;
    format!("{value:.digits$}").parse().unwrap_or(0.0)
}

/// Renders an already rounded number the short way: `12.0`, `12.5`, `0.25`.
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    round_to(bytes as f64 / GIB, 2)
}

pub fn bytes_to_mib(bytes: u64) -> f64 {
    round_to(bytes as f64 / MIB, 2)
}

pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    round_to(part / whole * 100.0, 1)
}

pub fn format_unix_local(unix_secs: i64) -> String {
    match Local.timestamp_opt(unix_secs, 0).earliest() {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => "unknown".to_string(),
    }
}

pub fn format_uptime(uptime_secs: u64) -> String {
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    format!("{hours} hours, {minutes} minutes")
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
