//! Per-queue transport latency counters, mirroring the Python runtime's
//! `_TransportStats`: a mutex-guarded bundle of message/byte counts and
//! cumulative nanosecond timings for each stage of a send/recv round trip.

use std::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    messages_sent: u64,
    messages_recv: u64,
    bytes_sent: u64,
    bytes_recv: u64,
    encode_ns: u64,
    decode_ns: u64,
    pack_ns: u64,
    unpack_ns: u64,
    send_ns: u64,
    recv_ns: u64,
}

/// A point-in-time read of [`TransportStats`], with derived per-message
/// averages computed the same way the Python snapshot does (zero when the
/// denominator is zero rather than dividing by it).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TransportStatsSnapshot {
    pub enabled: bool,
    pub messages_sent: u64,
    pub messages_recv: u64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub encode_ns: u64,
    pub decode_ns: u64,
    pub pack_ns: u64,
    pub unpack_ns: u64,
    pub send_ns: u64,
    pub recv_ns: u64,
    pub avg_encode_us: f64,
    pub avg_pack_us: f64,
    pub avg_send_us: f64,
    pub avg_recv_us: f64,
    pub avg_unpack_us: f64,
    pub avg_decode_us: f64,
}

fn avg_us(total_ns: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_ns as f64 / count as f64 / 1000.0
    }
}

/// Recording is unconditional; callers gate the (cheap) timing calls behind
/// `enabled` themselves so a disabled instance costs one bool check per send.
pub struct TransportStats {
    enabled: bool,
    counters: Mutex<Counters>,
}

impl TransportStats {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, counters: Mutex::new(Counters::default()) }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_send(&self, size: usize, encode_ns: u64, pack_ns: u64, send_ns: u64) {
        if !self.enabled {
            return;
        }
        let mut c = self.counters.lock().unwrap();
        c.messages_sent += 1;
        c.bytes_sent += size as u64;
        c.encode_ns += encode_ns;
        c.pack_ns += pack_ns;
        c.send_ns += send_ns;
    }

    pub fn record_recv(&self, size: usize, recv_ns: u64, unpack_ns: u64, decode_ns: u64) {
        if !self.enabled {
            return;
        }
        let mut c = self.counters.lock().unwrap();
        c.messages_recv += 1;
        c.bytes_recv += size as u64;
        c.recv_ns += recv_ns;
        c.unpack_ns += unpack_ns;
        c.decode_ns += decode_ns;
    }

    pub fn snapshot(&self, reset: bool) -> TransportStatsSnapshot {
        let mut c = self.counters.lock().unwrap();
        let snapshot = TransportStatsSnapshot {
            enabled: self.enabled,
            messages_sent: c.messages_sent,
            messages_recv: c.messages_recv,
            bytes_sent: c.bytes_sent,
            bytes_recv: c.bytes_recv,
            encode_ns: c.encode_ns,
            decode_ns: c.decode_ns,
            pack_ns: c.pack_ns,
            unpack_ns: c.unpack_ns,
            send_ns: c.send_ns,
            recv_ns: c.recv_ns,
            avg_encode_us: avg_us(c.encode_ns, c.messages_sent),
            avg_pack_us: avg_us(c.pack_ns, c.messages_sent),
            avg_send_us: avg_us(c.send_ns, c.messages_sent),
            avg_recv_us: avg_us(c.recv_ns, c.messages_recv),
            avg_unpack_us: avg_us(c.unpack_ns, c.messages_recv),
            avg_decode_us: avg_us(c.decode_ns, c.messages_recv),
        };
        if reset {
            *c = Counters::default();
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_stats_stay_at_zero() {
        let stats = TransportStats::new(false);
        stats.record_send(100, 10, 10, 10);
        let snap = stats.snapshot(false);
        assert_eq!(snap.messages_sent, 0);
        assert!(!snap.enabled);
    }

    #[test]
    fn averages_divide_by_message_count_not_byte_count() {
        let stats = TransportStats::new(true);
        stats.record_send(50, 1000, 500, 2000);
        stats.record_send(50, 3000, 1500, 2000);
        let snap = stats.snapshot(false);
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.bytes_sent, 100);
        assert!((snap.avg_encode_us - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_counters_after_snapshot() {
        let stats = TransportStats::new(true);
        stats.record_recv(20, 10, 10, 10);
        let first = stats.snapshot(true);
        assert_eq!(first.messages_recv, 1);
        let second = stats.snapshot(false);
        assert_eq!(second.messages_recv, 0);
    }
}
