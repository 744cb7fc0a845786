//! Benchmark summary statistics and pass/fail gates over a batch of
//! request traces. Grounded on the Python runtime's throughput harness;
//! the harness itself (driving real generation) is out of scope here, only
//! the summarization and gate-evaluation math.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

impl MetricStats {
    pub fn from_times(times: &[f64], scale: f64) -> Self {
        if times.is_empty() {
            return Self { avg: 0.0, p50: 0.0, p90: 0.0, p99: 0.0, max: 0.0 };
        }
        let mut sorted = times.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = |frac: f64| -> usize { ((sorted.len() as f64 * frac) as usize).min(sorted.len() - 1) };
        Self {
            avg: scale * sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: scale * sorted[idx(0.5)],
            p90: scale * sorted[idx(0.9)],
            p99: scale * sorted[idx(0.99)],
            max: scale * sorted[sorted.len() - 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub schema_version: u32,
    pub num_requests: usize,
    pub num_tokens: usize,
    pub duration_s: f64,
    pub throughput_token_per_s: f64,
    pub throughput_req_per_s: f64,
    pub ttft_ms: MetricStats,
    pub tpot_ms: MetricStats,
    pub e2e_s: MetricStats,
}

#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    #[error("cannot summarize an empty benchmark batch")]
    EmptyBatch,
    #[error("each request trace must contain at least 2 timestamps")]
    TraceTooShort,
    #[error("benchmark duration must be positive")]
    NonPositiveDuration,
}

impl BenchmarkSummary {
    /// `batches[i]` is the sequence of per-token completion timestamps (in
    /// seconds) for request `i`: `[arrival, first_token, second_token, ...]`.
    pub fn from_tics_batches(batches: &[Vec<f64>]) -> Result<Self, BenchmarkError> {
        if batches.is_empty() {
            return Err(BenchmarkError::EmptyBatch);
        }
        if batches.iter().any(|tics| tics.len() < 2) {
            return Err(BenchmarkError::TraceTooShort);
        }

        let mut first_times = Vec::with_capacity(batches.len());
        let mut accum_times = Vec::new();
        let mut e2e_times = Vec::with_capacity(batches.len());

        for tics in batches {
            let deltas: Vec<f64> = tics.windows(2).map(|w| w[1] - w[0]).collect();
            first_times.push(deltas[0]);
            accum_times.extend_from_slice(&deltas[1..]);
            e2e_times.push(tics[tics.len() - 1] - tics[0]);
        }

        let min_time = batches.iter().flat_map(|t| t.iter().copied()).fold(f64::INFINITY, f64::min);
        let max_time = batches.iter().flat_map(|t| t.iter().copied()).fold(f64::NEG_INFINITY, f64::max);
        let duration_s = max_time - min_time;
        if duration_s <= 0.0 {
            return Err(BenchmarkError::NonPositiveDuration);
        }

        let num_tokens: usize = batches.iter().map(|t| t.len()).sum();
        let num_requests = batches.len();

        Ok(Self {
            schema_version: 1,
            num_requests,
            num_tokens,
            duration_s,
            throughput_token_per_s: num_tokens as f64 / duration_s,
            throughput_req_per_s: num_requests as f64 / duration_s,
            ttft_ms: MetricStats::from_times(&first_times, 1000.0),
            tpot_ms: MetricStats::from_times(&accum_times, 1000.0),
            e2e_s: MetricStats::from_times(&e2e_times, 1.0),
        })
    }

    pub fn from_throughput(num_requests: usize, num_tokens: usize, duration_s: f64) -> Result<Self, BenchmarkError> {
        if duration_s <= 0.0 {
            return Err(BenchmarkError::NonPositiveDuration);
        }
        Ok(Self {
            schema_version: 1,
            num_requests,
            num_tokens,
            duration_s,
            throughput_token_per_s: num_tokens as f64 / duration_s,
            throughput_req_per_s: num_requests as f64 / duration_s,
            ttft_ms: MetricStats::from_times(&[], 1.0),
            tpot_ms: MetricStats::from_times(&[], 1.0),
            e2e_s: MetricStats::from_times(&[], 1.0),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkGate {
    pub min_throughput_token_per_s: Option<f64>,
    pub min_throughput_req_per_s: Option<f64>,
    pub max_avg_ttft_ms: Option<f64>,
    pub max_avg_tpot_ms: Option<f64>,
    pub max_avg_e2e_s: Option<f64>,
}

pub fn evaluate_gates(summary: &BenchmarkSummary, gate: &BenchmarkGate) -> Vec<String> {
    let mut failures = Vec::new();
    if let Some(min) = gate.min_throughput_token_per_s {
        if summary.throughput_token_per_s < min {
            failures.push(format!("throughput_token_per_s {:.4} < min {:.4}", summary.throughput_token_per_s, min));
        }
    }
    if let Some(min) = gate.min_throughput_req_per_s {
        if summary.throughput_req_per_s < min {
            failures.push(format!("throughput_req_per_s {:.4} < min {:.4}", summary.throughput_req_per_s, min));
        }
    }
    if let Some(max) = gate.max_avg_ttft_ms {
        if summary.ttft_ms.avg > max {
            failures.push(format!("avg_ttft_ms {:.4} > max {:.4}", summary.ttft_ms.avg, max));
        }
    }
    if let Some(max) = gate.max_avg_tpot_ms {
        if summary.tpot_ms.avg > max {
            failures.push(format!("avg_tpot_ms {:.4} > max {:.4}", summary.tpot_ms.avg, max));
        }
    }
    if let Some(max) = gate.max_avg_e2e_s {
        if summary.e2e_s.avg > max {
            failures.push(format!("avg_e2e_s {:.4} > max {:.4}", summary.e2e_s.avg, max));
        }
    }
    failures
}

pub fn assert_gates(summary: &BenchmarkSummary, gate: &BenchmarkGate) -> Result<(), String> {
    let failures = evaluate_gates(summary, gate);
    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("benchmark gate check failed:\n{}", failures.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_from_two_equal_length_traces() {
        let batches = vec![vec![0.0, 0.1, 0.2, 0.3], vec![0.05, 0.2, 0.3, 0.4]];
        let summary = BenchmarkSummary::from_tics_batches(&batches).unwrap();
        assert_eq!(summary.num_requests, 2);
        assert_eq!(summary.num_tokens, 8);
        assert!((summary.duration_s - 0.4).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(BenchmarkSummary::from_tics_batches(&[]), Err(BenchmarkError::EmptyBatch)));
    }

    #[test]
    fn trace_with_single_timestamp_is_rejected() {
        let batches = vec![vec![0.0]];
        assert!(matches!(BenchmarkSummary::from_tics_batches(&batches), Err(BenchmarkError::TraceTooShort)));
    }

    #[test]
    fn gate_failures_list_every_violated_threshold() {
        let summary = BenchmarkSummary::from_throughput(10, 100, 5.0).unwrap();
        let gate = BenchmarkGate { min_throughput_token_per_s: Some(100.0), ..Default::default() };
        let failures = evaluate_gates(&summary, &gate);
        assert_eq!(failures.len(), 1);
        assert!(assert_gates(&summary, &gate).is_err());
    }

    #[test]
    fn gate_passes_when_no_thresholds_set() {
        let summary = BenchmarkSummary::from_throughput(10, 100, 5.0).unwrap();
        assert!(assert_gates(&summary, &BenchmarkGate::default()).is_ok());
    }
}
