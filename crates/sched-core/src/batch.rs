//! Batch metadata builder (C4): turns an admitted batch into the flat index
//! vectors the accelerator kernels consume. Pure given its inputs, so it is
//! safe to invoke off the scheduler thread (used by the shadow-compare
//! harness in [`crate::shadow`]).

use sched_common::error::SchedError;
use sched_common::Result;

use crate::request::{AdmittedRequest, Batch};

/// The `-1` sentinel for `write_pos`: "do not write this request's output
/// this step." Must never be confused with a real position.
pub const WRITE_POS_SKIP: i32 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMetadata {
    pub positions: Vec<i32>,
    pub input_mapping: Vec<i32>,
    pub write_req_mapping: Vec<i32>,
    pub write_pos: Vec<i32>,
}

/// The fused path: builds all four arrays from six parallel input lists in
/// one call. `padded_*` describe the batch padded to a fixed kernel-launch
/// shape; `req_*` describe the unpadded batch.
pub fn make_metadata_buffers(
    padded_cached_len: &[usize],
    padded_device_len: &[usize],
    padded_table_idx: &[u32],
    req_table_idx: &[u32],
    req_device_len: &[usize],
    req_can_decode: &[bool],
) -> Result<BatchMetadata> {
    if padded_cached_len.len() != padded_device_len.len() || padded_cached_len.len() != padded_table_idx.len() {
        return Err(SchedError::protocol("padded batch input lists have mismatched lengths"));
    }
    if req_table_idx.len() != req_device_len.len() || req_table_idx.len() != req_can_decode.len() {
        return Err(SchedError::protocol("unpadded batch input lists have mismatched lengths"));
    }

    let total: usize = padded_cached_len
        .iter()
        .zip(padded_device_len)
        .map(|(&c, &d)| d.saturating_sub(c))
        .sum();
    let mut positions = Vec::with_capacity(total);
    let mut input_mapping = Vec::with_capacity(total);
    for ((&cached, &device), &table_idx) in padded_cached_len.iter().zip(padded_device_len).zip(padded_table_idx) {
        for pos in cached..device {
            positions.push(pos as i32);
            input_mapping.push(table_idx as i32);
        }
    }

    let write_req_mapping: Vec<i32> = req_table_idx.iter().map(|&idx| idx as i32).collect();
    let write_pos: Vec<i32> = req_device_len
        .iter()
        .zip(req_can_decode)
        .map(|(&device_len, &can_decode)| if can_decode { device_len as i32 } else { WRITE_POS_SKIP })
        .collect();

    Ok(BatchMetadata { positions, input_mapping, write_req_mapping, write_pos })
}

fn padded_inputs(reqs: &[AdmittedRequest]) -> (Vec<usize>, Vec<usize>, Vec<u32>) {
    let cached = reqs.iter().map(|r| r.cached_len).collect();
    let device = reqs.iter().map(|r| r.device_len).collect();
    let table = reqs.iter().map(|r| r.table_idx).collect();
    (cached, device, table)
}

fn unpadded_inputs(reqs: &[AdmittedRequest]) -> (Vec<u32>, Vec<usize>, Vec<bool>) {
    let table = reqs.iter().map(|r| r.table_idx).collect();
    let device = reqs.iter().map(|r| r.device_len).collect();
    let can_decode = reqs.iter().map(|r| r.can_decode()).collect();
    (table, device, can_decode)
}

/// Convenience wrapper over [`make_metadata_buffers`] for an already
/// assembled [`Batch`].
pub fn metadata_for_batch(batch: &Batch) -> Result<BatchMetadata> {
    let (padded_cached, padded_device, padded_table) = padded_inputs(&batch.padded_reqs);
    let (req_table, req_device, req_can_decode) = unpadded_inputs(&batch.reqs);
    make_metadata_buffers(&padded_cached, &padded_device, &padded_table, &req_table, &req_device, &req_can_decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radix::RadixCache;
    use crate::sampling::SamplingParams;

    fn admitted(uid: u64, table_idx: u32, cached_len: usize, device_len: usize, chunked: bool) -> AdmittedRequest {
        let mut cache = RadixCache::new();
        let (handle, _) = cache.match_prefix(&[]);
        AdmittedRequest {
            uid,
            input_ids: vec![0; device_len.max(cached_len)],
            sampling_params: SamplingParams::default(),
            table_idx,
            cached_len,
            device_len,
            output_len: 0,
            handle,
            chunked,
        }
    }

    #[test]
    fn positions_for_two_prefill_requests() {
        let meta = make_metadata_buffers(&[1, 1], &[4, 3], &[3, 5], &[], &[], &[]).unwrap();
        assert_eq!(meta.positions, vec![1, 2, 3, 1, 2]);
        assert_eq!(meta.input_mapping, vec![3, 3, 3, 5, 5]);
    }

    #[test]
    fn write_mapping_for_mixed_prefill_decode() {
        let meta = make_metadata_buffers(&[], &[], &[], &[3, 5], &[4, 3], &[true, true]).unwrap();
        assert_eq!(meta.write_req_mapping, vec![3, 5]);
        assert_eq!(meta.write_pos, vec![4, 3]);
    }

    #[test]
    fn write_pos_sentinel_matches_can_decode() {
        let meta = make_metadata_buffers(&[], &[], &[], &[1, 2], &[10, 20], &[true, false]).unwrap();
        assert_eq!(meta.write_pos, vec![10, WRITE_POS_SKIP]);
        for (i, &wp) in meta.write_pos.iter().enumerate() {
            assert_eq!(wp == WRITE_POS_SKIP, ![true, false][i]);
        }
    }

    #[test]
    fn mismatched_lengths_are_a_protocol_error() {
        let err = make_metadata_buffers(&[1, 1], &[4], &[3, 5], &[], &[], &[]).unwrap_err();
        assert!(matches!(err, SchedError::ProtocolError(_)));
    }

    #[test]
    fn metadata_for_batch_matches_fused_call() {
        let reqs = vec![admitted(1, 3, 1, 4, false), admitted(2, 5, 1, 3, false)];
        let batch = Batch { reqs: reqs.clone(), phase: crate::request::Phase::Prefill, padded_reqs: reqs };
        let meta = metadata_for_batch(&batch).unwrap();
        assert_eq!(meta.positions, vec![1, 2, 3, 1, 2]);
        assert_eq!(meta.write_req_mapping, vec![3, 5]);
    }
}
