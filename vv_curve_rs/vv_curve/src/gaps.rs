use chrono::{DateTime, Utc};

use crate::GapBoundary;

/// Intervals between consecutive timestamps longer than `threshold_minutes`.
pub fn detect_gaps(times: &[DateTime<Utc>], threshold_minutes: f64) -> Vec<GapBoundary> {
    let mut gaps = Vec::new();
    for pair in times.windows(2) {
        let elapsed = (pair[1] - pair[0]).num_milliseconds() as f64 / 60_000.0;
        if elapsed > threshold_minutes {
            gaps.push(GapBoundary {
                at: pair[1],
                previous: pair[0],
                elapsed_minutes: elapsed,
            });
        }
    }
    gaps
}
