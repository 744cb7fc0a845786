//! Request records: pending (not yet admitted) and admitted (with assigned
//! table slot, cache handle, and step-local length bookkeeping).

use crate::radix::Handle;
use crate::sampling::SamplingParams;

pub type Uid = u64;
pub type TokenId = i32;

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub uid: Uid,
    pub input_ids: Vec<TokenId>,
    pub sampling_params: SamplingParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prefill,
    Decode,
}

/// A request admitted into the current step's batch. `chunked` is true for
/// what the design calls a `ChunkedReq`: `device_len < cached_len +
/// input_ids.len()`, meaning it must re-enter admission on a later step.
#[derive(Debug, Clone)]
pub struct AdmittedRequest {
    pub uid: Uid,
    pub input_ids: Vec<TokenId>,
    pub sampling_params: SamplingParams,
    pub table_idx: u32,
    pub cached_len: usize,
    pub device_len: usize,
    pub output_len: usize,
    pub handle: Handle,
    pub chunked: bool,
}

impl AdmittedRequest {
    pub fn extend_len(&self) -> usize {
        self.device_len - self.cached_len
    }

    /// No chunk remains this step and `device_len` covers every input token.
    pub fn can_decode(&self) -> bool {
        !self.chunked && self.device_len >= self.cached_len + self.input_ids.len()
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub reqs: Vec<AdmittedRequest>,
    pub phase: Phase,
    /// Batch padded to a fixed shape for kernel-launch purposes; supplied as
    /// an input here, never recomputed by this crate.
    pub padded_reqs: Vec<AdmittedRequest>,
}

impl Batch {
    /// Length of the `out_loc` reservation: `Σ extend_len` over padded_reqs.
    pub fn out_loc_len(&self) -> usize {
        self.padded_reqs.iter().map(|r| r.extend_len()).sum()
    }
}
