//! Prefill admission planner (C3): decides, per pending request and in
//! strict FIFO order, how much of its prompt can be admitted into the
//! current step given the per-step token budget and KV/table headroom.
//!
//! The core algorithm is `try_add_one`, a single-candidate decision. A
//! [`Scheduler`] wraps it with the FIFO draining loop over pending and
//! in-flight chunked requests described in the design notes below.

use std::collections::VecDeque;

use sched_common::error::SchedError;
use sched_common::Result;

use crate::radix::RadixCache;
use crate::request::{AdmittedRequest, PendingRequest};
use crate::slots::{KvSlotPool, SlotTable};

/// Per-step mutable budget threaded through a run of `try_add_one` calls.
/// `token_budget` is `B_t`, consumed by `extend_cap` as requests are
/// admitted; `reserved` is `R`, the KV slots speculatively held for
/// in-flight requests' future output growth.
pub struct StepBudget {
    pub token_budget: usize,
    pub reserved: usize,
}

pub struct AdmissionPlanner<'a> {
    cache: &'a mut RadixCache,
    kv_pool: &'a mut KvSlotPool,
    table: &'a mut SlotTable,
}

impl<'a> AdmissionPlanner<'a> {
    pub fn new(cache: &'a mut RadixCache, kv_pool: &'a mut KvSlotPool, table: &'a mut SlotTable) -> Self {
        Self { cache, kv_pool, table }
    }

    /// The single-candidate admission decision.
    ///
    /// `reserve_full_budget` is true for a request's first entry into
    /// admission and false for a `ChunkedReq`'s later re-entries: the design
    /// mandates reserving the full `max_tokens` into `budget.reserved` at
    /// initial admission of a chunk chain, not incrementally per chunk, so
    /// only the first call adds to `R`.
    pub fn try_add_one(
        &mut self,
        req: &PendingRequest,
        budget: &mut StepBudget,
        reserve_full_budget: bool,
    ) -> Result<AdmittedRequest> {
        // 1. Match the longest cached prefix.
        let (handle, _) = self.cache.match_prefix(&req.input_ids);
        let cached_len = handle.matched_len();

        // 2. Headroom: reject outright if there's no table slot at all.
        if self.table.available_size() == 0 {
            return Err(SchedError::capacity("no table slot available"));
        }
        let kv_avail = self
            .cache
            .size_info()
            .evictable_size
            .saturating_add(self.kv_pool.available_size())
            .saturating_sub(budget.reserved);

        // 3/4. full_need (tokens needing KV slots, for bookkeeping/logging
        // only) = input_len + max_tokens - cached_len. extend_cap is the
        // portion of the *input* this step can cover.
        let input_len = req.input_ids.len();
        let max_tokens = req.sampling_params.max_tokens.max(0) as usize;
        let full_need_excluding_outputs = input_len.saturating_sub(cached_len);

        let mut extend_cap = budget.token_budget.min(full_need_excluding_outputs);
        let mut decode_only = false;
        if extend_cap == 0 {
            if full_need_excluding_outputs == 0 {
                // 5. The whole prompt is already cached: this is a resumed
                // decode continuation, not a prefill. Reserve one slot for
                // the next generated token.
                decode_only = true;
                extend_cap = 1;
            } else {
                return Err(SchedError::capacity("no token budget remaining this step"));
            }
        }

        // 6. KV headroom must already cover this candidate; chunking is
        // driven by the token budget alone, never by shrinking extend_cap
        // to whatever KV space happens to be free.
        if kv_avail < max_tokens + extend_cap {
            return Err(SchedError::capacity("insufficient KV headroom"));
        }

        let extend_input_len = extend_cap.min(full_need_excluding_outputs);
        // 7. Chunk vs. full.
        let chunked = !decode_only && extend_input_len < full_need_excluding_outputs;
        let device_len = if decode_only { cached_len + 1 } else { cached_len + extend_input_len };

        // 8. Lock + allocate.
        if extend_input_len > 0 {
            let new_slots = self.kv_pool.allocate_n(extend_input_len)?;
            if let Err(e) =
                self.cache.insert_prefix(&req.input_ids[cached_len..cached_len + extend_input_len], &new_slots)
            {
                self.kv_pool.free_slots(new_slots);
                return Err(e);
            }
        }
        let (locked_handle, _) = self.cache.match_prefix(&req.input_ids[..device_len.min(input_len)]);
        self.cache.lock_handle(&locked_handle, false)?;

        // 9. `lock_handle` itself moves the matched prefix's slots from
        // evictable to protected, which can push kv_avail below what's
        // needed even though the pre-lock snapshot at step 6 cleared it.
        // Re-check and roll back the lock if headroom no longer holds.
        let kv_avail_after_lock = self
            .cache
            .size_info()
            .evictable_size
            .saturating_add(self.kv_pool.available_size())
            .saturating_sub(budget.reserved);
        if kv_avail_after_lock < max_tokens + extend_cap {
            self.cache.lock_handle(&locked_handle, true).ok();
            return Err(SchedError::capacity("insufficient KV headroom after lock"));
        }

        let table_idx = match self.table.allocate() {
            Ok(idx) => idx,
            Err(e) => {
                self.cache.lock_handle(&locked_handle, true).ok();
                return Err(e);
            }
        };

        budget.token_budget -= extend_cap;
        if reserve_full_budget {
            budget.reserved += max_tokens;
        } else {
            budget.reserved += extend_cap;
        }

        Ok(AdmittedRequest {
            uid: req.uid,
            input_ids: req.input_ids.clone(),
            sampling_params: req.sampling_params,
            table_idx,
            cached_len,
            device_len,
            output_len: 0,
            handle: locked_handle,
            chunked,
        })
    }
}

/// Owns C1/C2/C3's state for a single scheduler thread and drives the FIFO
/// admission loop. `chunked_inflight` is drained ahead of `pending` each
/// step: those requests already hold a table slot and a locked handle, so
/// finishing them frees both sooner than leaving them to starve behind new
/// arrivals (a simplicity-over-fairness choice; see the design notes).
pub struct Scheduler {
    cache: RadixCache,
    kv_pool: KvSlotPool,
    table: SlotTable,
    pending: VecDeque<PendingRequest>,
    chunked_inflight: VecDeque<AdmittedRequest>,
    token_budget_per_step: usize,
}

impl Scheduler {
    pub fn new(kv_capacity: usize, table_capacity: u32, token_budget_per_step: usize) -> Self {
        Self {
            cache: RadixCache::new(),
            kv_pool: KvSlotPool::new(kv_capacity),
            table: SlotTable::new(table_capacity),
            pending: VecDeque::new(),
            chunked_inflight: VecDeque::new(),
            token_budget_per_step,
        }
    }

    pub fn enqueue(&mut self, req: PendingRequest) {
        self.pending.push_back(req);
    }

    pub fn cache(&self) -> &RadixCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut RadixCache {
        &mut self.cache
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Requests waiting to enter admission, not counting `chunked_inflight`.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Runs one admission pass: drains `chunked_inflight`, then `pending`,
    /// strictly in order, stopping at the first rejection in each queue.
    ///
    /// A `CapacityError` just stops the pass (the request stays queued for
    /// next step); a `StateError` is a cache/table invariant violation and
    /// is fatal, propagated to the caller rather than swallowed.
    pub fn step(&mut self, reserved: &mut usize) -> Result<Vec<AdmittedRequest>> {
        let mut budget = StepBudget { token_budget: self.token_budget_per_step, reserved: *reserved };
        let mut admitted = Vec::new();

        let mut still_inflight = VecDeque::new();
        while let Some(prev) = self.chunked_inflight.pop_front() {
            let pending_view = PendingRequest {
                uid: prev.uid,
                input_ids: prev.input_ids.clone(),
                sampling_params: prev.sampling_params,
            };
            let mut planner = AdmissionPlanner::new(&mut self.cache, &mut self.kv_pool, &mut self.table);
            match planner.try_add_one(&pending_view, &mut budget, false) {
                Ok(next) => {
                    if next.chunked {
                        still_inflight.push_back(next);
                    } else {
                        admitted.push(next);
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("admission hit a fatal state error, aborting scheduler thread: {e}");
                    return Err(e);
                }
                Err(_) => {
                    still_inflight.push_back(prev);
                    break;
                }
            }
        }
        self.chunked_inflight.extend(still_inflight);
        // Any remaining (unreached) in-flight requests stay queued untouched.

        while let Some(req) = self.pending.pop_front() {
            let mut planner = AdmissionPlanner::new(&mut self.cache, &mut self.kv_pool, &mut self.table);
            match planner.try_add_one(&req, &mut budget, true) {
                Ok(admitted_req) => {
                    if admitted_req.chunked {
                        self.chunked_inflight.push_back(admitted_req);
                    } else {
                        admitted.push(admitted_req);
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("admission hit a fatal state error, aborting scheduler thread: {e}");
                    return Err(e);
                }
                Err(_) => {
                    self.pending.push_front(req);
                    break;
                }
            }
        }

        *reserved = budget.reserved;
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SamplingParams;

    fn req(uid: u64, ids: &[i32], max_tokens: i32) -> PendingRequest {
        PendingRequest {
            uid,
            input_ids: ids.to_vec(),
            sampling_params: SamplingParams { max_tokens, ..SamplingParams::default() },
        }
    }

    /// A tight per-step token budget forces a chunked admission rather than
    /// a reject. `cached=1` models a prior admission (or shared prefix)
    /// that already matched the first token.
    #[test]
    fn tight_token_budget_forces_chunked_admission() {
        let mut cache = RadixCache::new();
        let mut kv_pool = KvSlotPool::new(64);
        let mut table = SlotTable::new(1);

        // Pre-seed one cached token shared with the incoming request.
        let seed_slots = kv_pool.allocate_n(1).unwrap();
        cache.insert_prefix(&[1], &seed_slots).unwrap();

        let mut budget = StepBudget { token_budget: 2, reserved: 0 };
        let mut planner = AdmissionPlanner::new(&mut cache, &mut kv_pool, &mut table);
        let r = req(1, &[1, 2, 3, 4, 5], 3);
        let admitted = planner.try_add_one(&r, &mut budget, true).unwrap();

        assert_eq!(admitted.cached_len, 1);
        assert!(admitted.chunked, "budget of 2 cannot cover the remaining 4 input tokens");
        assert_eq!(admitted.device_len, 1 + 2);
        assert_eq!(budget.token_budget, 0);
        assert_eq!(budget.reserved, 3, "full max_tokens reserved at initial admission");
    }

    /// KV headroom nearly exhausted forces a reject rather than a
    /// KV-limited chunk. Chunking is driven by the token budget alone;
    /// once `max_tokens + extend_cap` exceeds `kv_avail`, the request must
    /// defer, not shrink to whatever fits.
    #[test]
    fn reject_when_kv_headroom_near_capacity() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[7], &[100]).unwrap();
        let mut kv_pool = KvSlotPool::new(9);
        let mut table = SlotTable::new(1);

        // cache_avail = evictable(1) + free(9) = 10, reserved = 2, so
        // kv_avail = 8. input_len=5, cached_len=1 so extend_cap=4 against
        // the token budget; max_tokens(5) + extend_cap(4) = 9 > kv_avail(8).
        let mut budget = StepBudget { token_budget: 16, reserved: 2 };
        let mut planner = AdmissionPlanner::new(&mut cache, &mut kv_pool, &mut table);
        let r = req(1, &[7, 8, 9, 10, 11], 5);
        let err = planner.try_add_one(&r, &mut budget, true).unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(budget.token_budget, 16, "rejected candidate must not consume budget");
    }

    #[test]
    fn reject_when_no_table_slots() {
        let mut cache = RadixCache::new();
        let mut kv_pool = KvSlotPool::new(64);
        let mut table = SlotTable::new(0);
        let mut budget = StepBudget { token_budget: 10, reserved: 0 };
        let mut planner = AdmissionPlanner::new(&mut cache, &mut kv_pool, &mut table);
        let r = req(1, &[1, 2], 4);
        let err = planner.try_add_one(&r, &mut budget, true).unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn decode_only_resumes_fully_cached_request() {
        let mut cache = RadixCache::new();
        let mut kv_pool = KvSlotPool::new(64);
        let mut table = SlotTable::new(1);

        let slots = kv_pool.allocate_n(3).unwrap();
        cache.insert_prefix(&[1, 2, 3], &slots).unwrap();

        let mut budget = StepBudget { token_budget: 8, reserved: 0 };
        let mut planner = AdmissionPlanner::new(&mut cache, &mut kv_pool, &mut table);
        let r = req(1, &[1, 2, 3], 4);
        let admitted = planner.try_add_one(&r, &mut budget, true).unwrap();

        assert!(!admitted.chunked);
        assert_eq!(admitted.cached_len, 3);
        assert_eq!(admitted.device_len, 4, "decode-only reserves exactly one new slot");
        assert_eq!(budget.token_budget, 7);
    }

    #[test]
    fn fifo_stops_at_first_rejection() {
        let mut sched = Scheduler::new(8, 1, 100);
        sched.enqueue(req(1, &[1, 2, 3], 2));
        sched.enqueue(req(2, &[4, 5, 6, 7, 8, 9], 2));
        sched.enqueue(req(3, &[10, 11], 2));

        let mut reserved = 0usize;
        let admitted = sched.step(&mut reserved).unwrap();
        // req 1 takes the table's only slot; req 2 and req 3 are rejected
        // outright for lack of a table slot, and the loop stops at the
        // first rejection even though later requests are never tried.
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].uid, 1);
    }
}
