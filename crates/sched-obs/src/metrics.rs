//! Scheduler/tokenizer/backend-selection runtime counters, mirroring the
//! Python runtime's `_RuntimeMetrics`. Recording is a no-op unless enabled,
//! so callers on the hot admission/tokenizer path pay one bool check when
//! metrics are off.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
struct Counters {
    scheduler_step_count: u64,
    scheduler_step_ns: u64,
    scheduler_step_ns_max: u64,
    scheduler_last_step_ns: u64,
    queue_prefill_last: u64,
    queue_decode_last: u64,
    inflight_tokens_last: u64,
    queue_prefill_max: u64,
    queue_decode_max: u64,
    inflight_tokens_max: u64,

    tokenizer_call_count: u64,
    tokenizer_ns: u64,
    tokenizer_ns_max: u64,
    tokenize_items: u64,
    detokenize_items: u64,

    backend_selection_counts: HashMap<String, u64>,
    backend_fallback_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RuntimeMetricsSnapshot {
    pub enabled: bool,
    pub scheduler_step_count: u64,
    pub scheduler_step_ns: u64,
    pub scheduler_step_ns_max: u64,
    pub scheduler_last_step_ns: u64,
    pub scheduler_avg_step_us: f64,
    pub queue_prefill_last: u64,
    pub queue_decode_last: u64,
    pub inflight_tokens_last: u64,
    pub queue_prefill_max: u64,
    pub queue_decode_max: u64,
    pub inflight_tokens_max: u64,
    pub tokenizer_call_count: u64,
    pub tokenizer_ns: u64,
    pub tokenizer_ns_max: u64,
    pub tokenizer_avg_us: f64,
    pub tokenize_items: u64,
    pub detokenize_items: u64,
    pub backend_selection_counts: HashMap<String, u64>,
    pub backend_fallback_counts: HashMap<String, u64>,
}

fn avg_us(total_ns: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_ns as f64 / count as f64 / 1000.0
    }
}

pub struct RuntimeMetrics {
    enabled: bool,
    counters: Mutex<Counters>,
}

impl RuntimeMetrics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, counters: Mutex::new(Counters::default()) }
    }

    pub fn record_scheduler_step(&self, duration_ns: u64, queue_prefill: u64, queue_decode: u64, inflight_tokens: u64) {
        if !self.enabled {
            return;
        }
        let mut c = self.counters.lock().unwrap();
        c.scheduler_step_count += 1;
        c.scheduler_step_ns += duration_ns;
        c.scheduler_last_step_ns = duration_ns;
        c.scheduler_step_ns_max = c.scheduler_step_ns_max.max(duration_ns);
        c.queue_prefill_last = queue_prefill;
        c.queue_decode_last = queue_decode;
        c.inflight_tokens_last = inflight_tokens;
        c.queue_prefill_max = c.queue_prefill_max.max(queue_prefill);
        c.queue_decode_max = c.queue_decode_max.max(queue_decode);
        c.inflight_tokens_max = c.inflight_tokens_max.max(inflight_tokens);
    }

    pub fn record_tokenizer_latency(&self, duration_ns: u64, tokenize_count: u64, detokenize_count: u64) {
        if !self.enabled {
            return;
        }
        let mut c = self.counters.lock().unwrap();
        c.tokenizer_call_count += 1;
        c.tokenizer_ns += duration_ns;
        c.tokenizer_ns_max = c.tokenizer_ns_max.max(duration_ns);
        c.tokenize_items += tokenize_count;
        c.detokenize_items += detokenize_count;
    }

    pub fn record_backend_selection(&self, component: &str, backend: &str) {
        if !self.enabled {
            return;
        }
        let key = format!("{component}:{backend}");
        *self.counters.lock().unwrap().backend_selection_counts.entry(key).or_insert(0) += 1;
    }

    pub fn record_backend_fallback(&self, component: &str, requested: &str, selected: &str, reason: &str) {
        if !self.enabled {
            return;
        }
        let key = format!("{component}:{requested}->{selected}:{reason}");
        *self.counters.lock().unwrap().backend_fallback_counts.entry(key).or_insert(0) += 1;
    }

    pub fn snapshot(&self, reset: bool) -> RuntimeMetricsSnapshot {
        let mut c = self.counters.lock().unwrap();
        let snapshot = RuntimeMetricsSnapshot {
            enabled: self.enabled,
            scheduler_step_count: c.scheduler_step_count,
            scheduler_step_ns: c.scheduler_step_ns,
            scheduler_step_ns_max: c.scheduler_step_ns_max,
            scheduler_last_step_ns: c.scheduler_last_step_ns,
            scheduler_avg_step_us: avg_us(c.scheduler_step_ns, c.scheduler_step_count),
            queue_prefill_last: c.queue_prefill_last,
            queue_decode_last: c.queue_decode_last,
            inflight_tokens_last: c.inflight_tokens_last,
            queue_prefill_max: c.queue_prefill_max,
            queue_decode_max: c.queue_decode_max,
            inflight_tokens_max: c.inflight_tokens_max,
            tokenizer_call_count: c.tokenizer_call_count,
            tokenizer_ns: c.tokenizer_ns,
            tokenizer_ns_max: c.tokenizer_ns_max,
            tokenizer_avg_us: avg_us(c.tokenizer_ns, c.tokenizer_call_count),
            tokenize_items: c.tokenize_items,
            detokenize_items: c.detokenize_items,
            backend_selection_counts: c.backend_selection_counts.clone(),
            backend_fallback_counts: c.backend_fallback_counts.clone(),
        };
        if reset {
            *c = Counters::default();
        }
        snapshot
    }
}
