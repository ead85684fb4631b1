//! Structured reporting of client counters.

use espstream_client::ClientStats;

/// Share of received events that were dropped, in `[0, 1]`.
pub fn drop_ratio(stats: &ClientStats) -> f64 {
    let total = stats.events_decoded + stats.events_dropped;
    if total == 0 {
        return 0.0;
    }
    stats.events_dropped as f64 / total as f64
}

/// Emit one `info` line carrying every counter as a field.
pub fn log_stats(stats: &ClientStats) {
    tracing::info!(
        frames_received = stats.frames_received,
        frames_dropped = stats.frames_dropped,
        events_decoded = stats.events_decoded,
        events_dropped = stats.events_dropped,
        schemas_attached = stats.schemas_attached,
        faults_posted = stats.faults_posted,
        drop_ratio = drop_ratio(stats),
        "stream statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_ratio_of_empty_stream_is_zero() {
        assert_eq!(drop_ratio(&ClientStats::default()), 0.0);
    }

    #[test]
    fn drop_ratio_counts_events_only() {
        let stats = ClientStats {
            frames_dropped: 10,
            events_decoded: 3,
            events_dropped: 1,
            ..ClientStats::default()
        };
        assert_eq!(drop_ratio(&stats), 0.25);
    }
}
