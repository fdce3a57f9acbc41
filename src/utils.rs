//! Formatting helpers for report and summary output.

/// Format a millisecond latency for display. Zero means "no samples" and
/// renders as a dash.
pub fn format_latency_ms(latency_ms: f64) -> String {
    if latency_ms <= 0.0 {
        "-".to_string()
    } else if latency_ms < 1.0 {
        format!("{latency_ms:.3} ms")
    } else {
        format!("{latency_ms:.2} ms")
    }
}

/// Format an operations-per-second rate.
pub fn format_rate(ops_per_second: f64) -> String {
    format!("{ops_per_second:.2} ops/s")
}

/// Format a kB/s throughput figure; zero renders as a dash.
pub fn format_throughput_kbps(kbps: f64) -> String {
    if kbps <= 0.0 {
        "-".to_string()
    } else {
        format!("{kbps:.2} kB/s")
    }
}
