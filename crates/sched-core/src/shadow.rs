//! Shadow-compare harness (C6): every call runs the primary C4 implementation
//! and returns its result unconditionally; a configurable fraction of calls
//! also runs a second ("shadow") implementation purely for comparison.
//! Divergences are appended as JSON lines to a log file and never change
//! what the caller receives.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use sched_common::Result;

use crate::batch::{make_metadata_buffers, BatchMetadata};

/// One C4 implementation as seen by the harness. The crate's own
/// [`make_metadata_buffers`] is the reference `NativeMetadataBackend`; a
/// second implementation (e.g. a future accelerated or legacy path) can be
/// substituted on either side without the harness caring which is which.
pub trait MetadataBackend: Send + Sync {
    fn name(&self) -> &str;

    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        padded_cached_len: &[usize],
        padded_device_len: &[usize],
        padded_table_idx: &[u32],
        req_table_idx: &[u32],
        req_device_len: &[usize],
        req_can_decode: &[bool],
    ) -> Result<BatchMetadata>;
}

pub struct NativeMetadataBackend {
    name: String,
}

impl NativeMetadataBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MetadataBackend for NativeMetadataBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(
        &self,
        padded_cached_len: &[usize],
        padded_device_len: &[usize],
        padded_table_idx: &[u32],
        req_table_idx: &[u32],
        req_device_len: &[usize],
        req_can_decode: &[bool],
    ) -> Result<BatchMetadata> {
        make_metadata_buffers(
            padded_cached_len,
            padded_device_len,
            padded_table_idx,
            req_table_idx,
            req_device_len,
            req_can_decode,
        )
    }
}

#[derive(Debug, Serialize)]
struct DivergenceRecord {
    timestamp_utc: String,
    kind: String,
    req_uids: Vec<u64>,
    reason: String,
    primary_backend: String,
    shadow_backend: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowSnapshot {
    pub shadow_compares: u64,
    pub shadow_divergences: u64,
    pub shadow_logged: u64,
    pub shadow_samples_skipped: u64,
}

struct HarnessState {
    calls: u64,
    snapshot: ShadowSnapshot,
}

pub struct ShadowHarness {
    primary: Box<dyn MetadataBackend>,
    shadow: Box<dyn MetadataBackend>,
    report_path: Option<PathBuf>,
    max_diffs: usize,
    compare_every_n: u64,
    state: Mutex<HarnessState>,
}

impl ShadowHarness {
    pub fn new(
        primary: Box<dyn MetadataBackend>,
        shadow: Box<dyn MetadataBackend>,
        report_path: Option<PathBuf>,
        max_diffs: usize,
        compare_every_n: u64,
    ) -> Self {
        Self {
            primary,
            shadow,
            report_path,
            max_diffs,
            compare_every_n: compare_every_n.max(1),
            state: Mutex::new(HarnessState { calls: 0, snapshot: ShadowSnapshot::default() }),
        }
    }

    pub fn snapshot(&self) -> ShadowSnapshot {
        self.state.lock().unwrap().snapshot
    }

    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        req_uids: &[u64],
        padded_cached_len: &[usize],
        padded_device_len: &[usize],
        padded_table_idx: &[u32],
        req_table_idx: &[u32],
        req_device_len: &[usize],
        req_can_decode: &[bool],
    ) -> Result<BatchMetadata> {
        let primary_result = self.primary.compute(
            padded_cached_len,
            padded_device_len,
            padded_table_idx,
            req_table_idx,
            req_device_len,
            req_can_decode,
        )?;

        let should_compare = {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            if state.calls % self.compare_every_n == 0 {
                state.snapshot.shadow_compares += 1;
                true
            } else {
                state.snapshot.shadow_samples_skipped += 1;
                false
            }
        };
        if !should_compare {
            return Ok(primary_result);
        }

        let diffs = match self.shadow.compute(
            padded_cached_len,
            padded_device_len,
            padded_table_idx,
            req_table_idx,
            req_device_len,
            req_can_decode,
        ) {
            Ok(shadow_result) => compare(&primary_result, &shadow_result),
            Err(e) => vec![("compute_exception".to_string(), e.to_string())],
        };
        if !diffs.is_empty() {
            self.record_divergences(req_uids, diffs);
        }

        Ok(primary_result)
    }

    fn record_divergences(&self, req_uids: &[u64], diffs: Vec<(String, String)>) {
        let mut state = self.state.lock().unwrap();
        state.snapshot.shadow_divergences += diffs.len() as u64;

        let Some(path) = &self.report_path else { return };
        let mut file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(_) => return,
        };
        for (kind, reason) in diffs {
            if state.snapshot.shadow_logged as usize >= self.max_diffs {
                break;
            }
            let record = DivergenceRecord {
                timestamp_utc: chrono::Utc::now().to_rfc3339(),
                kind,
                req_uids: req_uids.to_vec(),
                reason,
                primary_backend: self.primary.name().to_string(),
                shadow_backend: self.shadow.name().to_string(),
            };
            if let Ok(line) = serde_json::to_string(&record) {
                if writeln!(file, "{line}").is_ok() {
                    state.snapshot.shadow_logged += 1;
                }
            }
        }
    }
}

/// Element-wise comparison across all four arrays. A length mismatch on an
/// array is reported once for that array rather than element-by-element.
fn compare(primary: &BatchMetadata, shadow: &BatchMetadata) -> Vec<(String, String)> {
    let mut diffs = Vec::new();
    compare_array("positions", &primary.positions, &shadow.positions, &mut diffs);
    compare_array("input_mapping", &primary.input_mapping, &shadow.input_mapping, &mut diffs);
    compare_array("write_req_mapping", &primary.write_req_mapping, &shadow.write_req_mapping, &mut diffs);
    compare_array("write_pos", &primary.write_pos, &shadow.write_pos, &mut diffs);
    diffs
}

fn compare_array(kind: &str, primary: &[i32], shadow: &[i32], diffs: &mut Vec<(String, String)>) {
    if primary.len() != shadow.len() {
        diffs.push((kind.to_string(), format!("length mismatch: {} vs {}", primary.len(), shadow.len())));
        return;
    }
    for (i, (p, s)) in primary.iter().zip(shadow).enumerate() {
        if p != s {
            diffs.push((kind.to_string(), format!("value mismatch at index {i}: {p} vs {s}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        name: String,
        result: BatchMetadata,
    }

    impl MetadataBackend for FixedBackend {
        fn name(&self) -> &str {
            &self.name
        }
        fn compute(
            &self,
            _: &[usize],
            _: &[usize],
            _: &[u32],
            _: &[u32],
            _: &[usize],
            _: &[bool],
        ) -> Result<BatchMetadata> {
            Ok(self.result.clone())
        }
    }

    fn meta(positions: Vec<i32>, input_mapping: Vec<i32>) -> BatchMetadata {
        BatchMetadata { positions, input_mapping, write_req_mapping: vec![], write_pos: vec![] }
    }

    #[test]
    fn logs_divergence_and_still_returns_primary_result() {
        let dir = std::env::temp_dir().join(format!("shadow-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let report_path = dir.join("divergence.jsonl");
        let _ = std::fs::remove_file(&report_path);

        let primary = FixedBackend { name: "python".into(), result: meta(vec![1, 2, 3], vec![3, 3, 3]) };
        let shadow = FixedBackend { name: "rust_hotpath".into(), result: meta(vec![1, 2, 3], vec![3, 9, 3]) };
        let harness = ShadowHarness::new(Box::new(primary), Box::new(shadow), Some(report_path.clone()), 16, 1);

        let result = harness.compute(&[100, 101], &[1, 1], &[4, 3], &[3, 5], &[], &[], &[]).unwrap();
        assert_eq!(result.positions, vec![1, 2, 3]);

        let snapshot = harness.snapshot();
        assert_eq!(snapshot.shadow_compares, 1);
        assert_eq!(snapshot.shadow_divergences, 1);
        assert_eq!(snapshot.shadow_logged, 1);

        let logged = std::fs::read_to_string(&report_path).unwrap();
        assert!(logged.contains("\"kind\":\"input_mapping\""));
        assert!(logged.contains("\"req_uids\":[100,101]"));
    }

    #[test]
    fn shadow_exception_is_recorded_and_does_not_propagate() {
        struct FailingBackend;
        impl MetadataBackend for FailingBackend {
            fn name(&self) -> &str {
                "failing"
            }
            fn compute(
                &self,
                _: &[usize],
                _: &[usize],
                _: &[u32],
                _: &[u32],
                _: &[usize],
                _: &[bool],
            ) -> Result<BatchMetadata> {
                Err(sched_common::error::SchedError::external("forced shadow failure"))
            }
        }

        let primary = FixedBackend { name: "python".into(), result: meta(vec![1], vec![3]) };
        let harness = ShadowHarness::new(Box::new(primary), Box::new(FailingBackend), None, 16, 1);
        let result = harness.compute(&[1], &[0], &[1], &[3], &[], &[], &[]).unwrap();
        assert_eq!(result.positions, vec![1]);
        assert_eq!(harness.snapshot().shadow_divergences, 1);
    }

    #[test]
    fn compare_every_n_skips_most_calls() {
        let primary = FixedBackend { name: "python".into(), result: meta(vec![1], vec![3]) };
        let shadow = FixedBackend { name: "rust_hotpath".into(), result: meta(vec![1], vec![3]) };
        let harness = ShadowHarness::new(Box::new(primary), Box::new(shadow), None, 16, 3);

        for _ in 0..6 {
            harness.compute(&[1], &[0], &[1], &[3], &[], &[], &[]).unwrap();
        }
        let snapshot = harness.snapshot();
        assert_eq!(snapshot.shadow_compares, 2);
        assert_eq!(snapshot.shadow_samples_skipped, 4);
    }
}
