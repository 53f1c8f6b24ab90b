//! Periodic terminal stats reporter.
//!
//! Samples the registry's global counters once a second and renders a
//! single-line status showing instantaneous throughput computed from the
//! delta since the previous sample. Purely cosmetic: it has no influence on
//! correctness and is fully suppressed in quiet mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::registry::Registry;

/// Runs until cancelled. Intended to be spawned as its own task and aborted
/// on shutdown.
pub async fn run(registry: Arc<Registry>, quiet: bool) {
    if quiet {
        return;
    }

    let mut ticker = interval(Duration::from_secs(1));
    let mut last = registry.snapshot_globals().await;

    loop {
        ticker.tick().await;
        let current = registry.snapshot_globals().await;

        let in_delta = current.bytes_in.saturating_sub(last.bytes_in);
        let out_delta = current.bytes_out.saturating_sub(last.bytes_out);

        println!(
            "[stats] total={} allowed={} blocked={} down={}/s up={}/s",
            current.total_connections,
            current.allowed_connections,
            current.blocked_connections,
            format_speed(in_delta),
            format_speed(out_delta),
        );

        last = current;
    }
}

/// Renders a byte count per second as a human bit-rate, e.g. `12.3 Mbps`.
fn format_speed(bytes_per_sec: u64) -> String {
    let bits = bytes_per_sec as f64 * 8.0;
    const UNITS: [&str; 4] = ["bps", "Kbps", "Mbps", "Gbps"];
    scale(bits, &UNITS)
}

/// Renders a byte count as a human size, e.g. `4.5 MB`. Kept alongside
/// [`format_speed`] since both are the same unit-scaling idiom over
/// different bases.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    scale(bytes as f64, &UNITS)
}

fn scale(mut value: f64, units: &[&str; 4]) -> String {
    let mut idx = 0;
    while value >= 1024.0 && idx < units.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    format!("{:.1} {}", value, units[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_scales_units() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn format_speed_scales_units() {
        assert_eq!(format_speed(128), "1.0 Kbps");
        assert_eq!(format_speed(0), "0.0 bps");
    }
}
