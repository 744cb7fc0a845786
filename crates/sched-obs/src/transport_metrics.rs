//! Publishes a [`sched_transport::TransportStatsSnapshot`] into the process
//! Prometheus registry. The counters themselves live in `sched-transport`
//! (next to the queues that record into them); this module only mirrors a
//! snapshot into gauges on scrape.

use once_cell::sync::Lazy;
use prometheus::{IntGauge, IntGaugeVec};
use sched_transport::TransportStatsSnapshot;

static MESSAGES_SENT: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("sched_transport_messages_sent_total", "Messages sent over transport queues").unwrap()
});
static MESSAGES_RECV: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("sched_transport_messages_recv_total", "Messages received over transport queues").unwrap()
});
static BYTES_SENT: Lazy<IntGauge> =
    Lazy::new(|| prometheus::register_int_gauge!("sched_transport_bytes_sent_total", "Bytes sent over transport queues").unwrap());
static BYTES_RECV: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("sched_transport_bytes_recv_total", "Bytes received over transport queues").unwrap()
});
static STAGE_AVG_US: Lazy<IntGaugeVec> = Lazy::new(|| {
    prometheus::register_int_gauge_vec!(
        "sched_transport_stage_avg_microseconds",
        "Average per-message latency by transport pipeline stage",
        &["stage"]
    )
    .unwrap()
});

/// Called once per scrape (or on a timer); overwrites the gauges with the
/// latest snapshot rather than accumulating, since the snapshot is already
/// cumulative.
pub fn observe(snapshot: &TransportStatsSnapshot) {
    MESSAGES_SENT.set(snapshot.messages_sent as i64);
    MESSAGES_RECV.set(snapshot.messages_recv as i64);
    BYTES_SENT.set(snapshot.bytes_sent as i64);
    BYTES_RECV.set(snapshot.bytes_recv as i64);
    STAGE_AVG_US.with_label_values(&["encode"]).set(snapshot.avg_encode_us as i64);
    STAGE_AVG_US.with_label_values(&["pack"]).set(snapshot.avg_pack_us as i64);
    STAGE_AVG_US.with_label_values(&["send"]).set(snapshot.avg_send_us as i64);
    STAGE_AVG_US.with_label_values(&["recv"]).set(snapshot.avg_recv_us as i64);
    STAGE_AVG_US.with_label_values(&["unpack"]).set(snapshot.avg_unpack_us as i64);
    STAGE_AVG_US.with_label_values(&["decode"]).set(snapshot.avg_decode_us as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_transport::TransportStats;

    #[test]
    fn observe_reflects_snapshot_counts() {
        let stats = TransportStats::new(true);
        stats.record_send(100, 10, 10, 10);
        observe(&stats.snapshot(false));
        assert_eq!(MESSAGES_SENT.get(), 1);
        assert_eq!(BYTES_SENT.get(), 100);
    }
}
