use std::{fmt::Write, time::Duration};

/// Pretty-print the elapsed time (used in progress bars)
pub fn elapsed_subsec(state: &indicatif::ProgressState, writer: &mut dyn Write) {
    let seconds = state.elapsed().as_secs();
    let sub_seconds = (state.elapsed().as_millis() % 1000) / 100;
    let _ = writer.write_str(&format!("{}.{}s", seconds, sub_seconds));
}

/// Pretty-print a duration (used in logs and diagnostics)
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();

    match seconds {
        0 => match duration.as_millis() {
            0 => format!("{}μs", duration.as_micros()),
            millis => format!("{}ms", millis),
        },
        1..=59 => format!("{:.3}s", duration.as_secs_f64()),
        60..=3_599 => format!("{:.3}m", duration.as_secs_f64() / 60.0),
        3_600..=86_399 => format!("{:.3}h", duration.as_secs_f64() / 3_600.0),
        _ => format!("{:.3}d", duration.as_secs_f64() / 86_400.0),
    }
}

/// Human-readable byte count in binary units, at most two decimals
/// (`0 B`, `1.5 KB`, `3.21 GB`).
pub fn format_bytes(bytes: u64) -> String {
    const SIZES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut exponent = 0;
    while exponent < SIZES.len() - 1 && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');

    format!("{} {}", trimmed, SIZES[exponent])
}

/// Uptime as `<days>d <hours>h <minutes>m`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}
