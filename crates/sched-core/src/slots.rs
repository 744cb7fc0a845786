//! Slot-table manager (C2): a fixed-size free-list of per-request table
//! slots, distinct from the KV slot indices the radix cache owns.

use sched_common::error::SchedError;
use sched_common::Result;

pub struct SlotTable {
    free: Vec<u32>,
    capacity: u32,
}

impl SlotTable {
    /// `capacity` table slot ids, 0..capacity, all initially free. `allocate`
    /// pops the highest-valued free id first (stack behavior), matching the
    /// deterministic ordering golden traces depend on.
    pub fn new(capacity: u32) -> Self {
        let free: Vec<u32> = (0..capacity).collect();
        Self { free, capacity }
    }

    pub fn allocate(&mut self) -> Result<u32> {
        self.free.pop().ok_or_else(|| SchedError::capacity("slot table exhausted"))
    }

    pub fn free(&mut self, id: u32) {
        debug_assert!(id < self.capacity, "freeing a slot id outside the table's range");
        self.free.push(id);
    }

    pub fn available_size(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// The KV slot free pool: raw, never-yet-placed KV slot indices. This is the
/// "external free pool" the admission planner adds to the radix cache's
/// `evictable_size` to get total KV headroom — a plain free-list like
/// [`SlotTable`], but over a distinct id space (KV slots, not table slots).
pub struct KvSlotPool {
    free: Vec<i32>,
}

impl KvSlotPool {
    pub fn new(capacity: usize) -> Self {
        let free: Vec<i32> = (0..capacity as i32).rev().collect();
        Self { free }
    }

    pub fn available_size(&self) -> usize {
        self.free.len()
    }

    /// Pops `n` slot ids off the pool. All-or-nothing: fails without taking
    /// any if fewer than `n` are free.
    pub fn allocate_n(&mut self, n: usize) -> Result<Vec<i32>> {
        if self.free.len() < n {
            return Err(SchedError::capacity("kv slot pool exhausted"));
        }
        Ok((0..n).map(|_| self.free.pop().unwrap()).collect())
    }

    pub fn free_slots<I: IntoIterator<Item = i32>>(&mut self, ids: I) {
        self.free.extend(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_pool_allocate_is_all_or_nothing() {
        let mut pool = KvSlotPool::new(2);
        assert!(pool.allocate_n(3).is_err());
        assert_eq!(pool.available_size(), 2);
        let ids = pool.allocate_n(2).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(pool.available_size(), 0);
        pool.free_slots(ids);
        assert_eq!(pool.available_size(), 2);
    }

    #[test]
    fn allocate_is_stack_ordered() {
        let mut table = SlotTable::new(4);
        assert_eq!(table.allocate().unwrap(), 3);
        assert_eq!(table.allocate().unwrap(), 2);
        table.free(3);
        assert_eq!(table.allocate().unwrap(), 3);
    }

    #[test]
    fn allocate_fails_when_exhausted() {
        let mut table = SlotTable::new(1);
        table.allocate().unwrap();
        let err = table.allocate().unwrap_err();
        assert!(err.is_capacity());
    }

    #[test]
    fn available_size_tracks_free_count() {
        let mut table = SlotTable::new(3);
        assert_eq!(table.available_size(), 3);
        table.allocate().unwrap();
        assert_eq!(table.available_size(), 2);
        table.free(2);
        assert_eq!(table.available_size(), 3);
    }
}
