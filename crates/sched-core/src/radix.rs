//! Radix-tree prefix cache (C1): content-addressed storage of KV slot indices
//! keyed by token-id prefixes, with node-granular locking and LRU eviction.
//!
//! Nodes live in a generational arena (`Vec<Slot>`) indexed by stable
//! [`NodeId`]s with parent-id back-references, so there are no cycles and no
//! raw pointers; freed slots are recycled and their epoch bumped so stale
//! [`Handle`]s are detected rather than silently aliased.

use std::collections::BTreeMap;

use sched_common::error::SchedError;
use sched_common::Result;

pub type TokenId = i32;
pub type SlotIdx = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

struct Node {
    parent: Option<NodeId>,
    children: BTreeMap<TokenId, NodeId>,
    label: Vec<TokenId>,
    slots: Vec<SlotIdx>,
    lock_count: u32,
    last_access: u64,
}

struct Slot {
    epoch: u64,
    node: Option<Node>,
}

/// Returned by `match_prefix`/`insert_prefix`: the sole legitimate means to
/// lock/unlock a path. The epoch guards against use-after-eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    node: NodeId,
    matched_len: usize,
    epoch: u64,
}

impl Handle {
    pub fn matched_len(&self) -> usize {
        self.matched_len
    }
}

/// Summed counts of slots in evictable vs. protected subtrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeInfo {
    pub evictable_size: usize,
    pub protected_size: usize,
}

impl SizeInfo {
    pub fn total(&self) -> usize {
        self.evictable_size + self.protected_size
    }
}

/// Eviction could not free the full amount requested. The slots that *were*
/// freed are still returned (the tree mutation is not rolled back); the
/// caller (the admission planner) must surface this as a capacity failure.
#[derive(Debug)]
pub struct EvictShortfall {
    pub freed: Vec<SlotIdx>,
    pub error: SchedError,
}

pub struct RadixCache {
    nodes: Vec<Slot>,
    free_list: Vec<u32>,
    root: NodeId,
    current_tick: u64,
    evictable_size: usize,
    protected_size: usize,
}

impl Default for RadixCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RadixCache {
    pub fn new() -> Self {
        let root_node = Node {
            parent: None,
            children: BTreeMap::new(),
            label: Vec::new(),
            slots: Vec::new(),
            lock_count: 0,
            last_access: 0,
        };
        Self {
            nodes: vec![Slot { epoch: 0, node: Some(root_node) }],
            free_list: Vec::new(),
            root: NodeId(0),
            current_tick: 0,
            evictable_size: 0,
            protected_size: 0,
        }
    }

    pub fn size_info(&self) -> SizeInfo {
        SizeInfo { evictable_size: self.evictable_size, protected_size: self.protected_size }
    }

    /// Advance the per-step monotone LRU tick. Called once per scheduler step,
    /// not per operation.
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    pub fn insert_prefix(&mut self, ids: &[TokenId], slots: &[SlotIdx]) -> Result<usize> {
        if ids.is_empty() || ids.len() != slots.len() {
            return Err(SchedError::state(
                "insert_prefix: ids and slots must be non-empty and of equal length",
            ));
        }
        let tick = self.current_tick;
        let mut cur = self.root;
        self.touch(cur, tick);
        let mut pos = 0usize;
        let mut matched_len = 0usize;

        while pos < ids.len() {
            let first = ids[pos];
            let existing = self.node(cur).children.get(&first).copied();
            match existing {
                None => {
                    let new_id = self.alloc_node(Node {
                        parent: Some(cur),
                        children: BTreeMap::new(),
                        label: ids[pos..].to_vec(),
                        slots: slots[pos..].to_vec(),
                        lock_count: 0,
                        last_access: tick,
                    });
                    self.node_mut(cur).children.insert(first, new_id);
                    self.evictable_size += ids.len() - pos;
                    pos = ids.len();
                }
                Some(child_id) => {
                    let edge_len = self.node(child_id).label.len();
                    let common = common_prefix_len(&self.node(child_id).label, &ids[pos..]);
                    if common == edge_len {
                        self.touch(child_id, tick);
                        matched_len += common;
                        pos += common;
                        cur = child_id;
                    } else {
                        let head_id = self.split_edge(cur, first, child_id, common);
                        self.touch(head_id, tick);
                        matched_len += common;
                        pos += common;
                        cur = head_id;
                        if pos < ids.len() {
                            let first2 = ids[pos];
                            let new_id = self.alloc_node(Node {
                                parent: Some(head_id),
                                children: BTreeMap::new(),
                                label: ids[pos..].to_vec(),
                                slots: slots[pos..].to_vec(),
                                lock_count: 0,
                                last_access: tick,
                            });
                            self.node_mut(head_id).children.insert(first2, new_id);
                            self.evictable_size += ids.len() - pos;
                            pos = ids.len();
                        }
                    }
                }
            }
        }
        Ok(matched_len)
    }

    /// Walks the longest matching path and returns a handle whose node ends
    /// exactly at the match boundary. A match that stops mid-edge splits
    /// that edge first, so the tokens past `cached_len` (e.g. slot 13 of an
    /// `[1,2,3,4]` insert matched only through `[1,2,3]`) stay on their own
    /// node and aren't locked or protected alongside the matched prefix.
    pub fn match_prefix(&mut self, ids: &[TokenId]) -> (Handle, Vec<SlotIdx>) {
        let mut cur = self.root;
        let mut pos = 0usize;
        let mut slots = Vec::new();

        while pos < ids.len() {
            let first = ids[pos];
            let Some(&child_id) = self.node(cur).children.get(&first) else { break };
            let edge_len = self.node(child_id).label.len();
            let common = common_prefix_len(&self.node(child_id).label, &ids[pos..]);
            slots.extend_from_slice(&self.node(child_id).slots[..common]);
            pos += common;
            if common < edge_len {
                // `common >= 1` always holds here: `child_id` is keyed by
                // `first`, so the edge's own first token already matched.
                cur = self.split_edge(cur, first, child_id, common);
                break;
            }
            cur = child_id;
        }
        (self.handle_for(cur, pos), slots)
    }

    pub fn lock_handle(&mut self, handle: &Handle, unlock: bool) -> Result<()> {
        self.validate(handle)?;
        let mut path = Vec::new();
        let mut cur = Some(handle.node);
        while let Some(id) = cur {
            path.push(id);
            cur = self.node(id).parent;
        }
        for id in path {
            let label_len;
            let became_zero_or_one;
            {
                let node = self.node_mut(id);
                if unlock {
                    if node.lock_count == 0 {
                        return Err(SchedError::state("lock_handle: unlock count underflow"));
                    }
                    node.lock_count -= 1;
                    became_zero_or_one = node.lock_count == 0;
                } else {
                    node.lock_count += 1;
                    became_zero_or_one = node.lock_count == 1;
                }
                label_len = node.label.len();
            }
            if became_zero_or_one {
                if unlock {
                    self.protected_size -= label_len;
                    self.evictable_size += label_len;
                } else {
                    self.evictable_size -= label_len;
                    self.protected_size += label_len;
                }
            }
        }
        Ok(())
    }

    pub fn evict(&mut self, size: usize) -> std::result::Result<Vec<SlotIdx>, EvictShortfall> {
        let mut freed = Vec::new();
        let mut freed_count = 0usize;

        while freed_count < size {
            let Some(leaf_id) = self.best_evictable_leaf() else { break };
            let (parent, label_len, leaf_slots) = {
                let n = self.node(leaf_id);
                (n.parent, n.label.len(), n.slots.clone())
            };
            self.evictable_size -= label_len;
            freed.extend(leaf_slots);
            freed_count += label_len;

            if let Some(p) = parent {
                let first = self.node(leaf_id).label[0];
                self.node_mut(p).children.remove(&first);
            }
            self.free_node(leaf_id);
            if let Some(p) = parent {
                self.maybe_merge(p);
            }
        }

        if freed_count < size {
            return Err(EvictShortfall {
                freed,
                error: SchedError::capacity(format!(
                    "evict: requested {size}, only {freed_count} evictable slots were available"
                )),
            });
        }
        Ok(freed)
    }

    fn handle_for(&self, node: NodeId, matched_len: usize) -> Handle {
        Handle { node, matched_len, epoch: self.nodes[node.0 as usize].epoch }
    }

    fn validate(&self, handle: &Handle) -> Result<()> {
        if self.nodes[handle.node.0 as usize].epoch != handle.epoch {
            return Err(SchedError::state(
                "handle refers to an evicted or recycled node (epoch mismatch)",
            ));
        }
        Ok(())
    }

    fn touch(&mut self, id: NodeId, tick: u64) {
        self.node_mut(id).last_access = tick;
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize].node.as_ref().expect("access to freed radix node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize].node.as_mut().expect("access to freed radix node")
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx as usize].node = Some(node);
            NodeId(idx)
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(Slot { epoch: 0, node: Some(node) });
            NodeId(idx)
        }
    }

    fn free_node(&mut self, id: NodeId) {
        let slot = &mut self.nodes[id.0 as usize];
        slot.node = None;
        slot.epoch += 1;
        self.free_list.push(id.0);
    }

    /// Split the edge from `parent` (keyed by `first_token`) to `child` at
    /// `split_at`. `child`'s identity and epoch are preserved on the deeper
    /// (tail) side so existing handles that matched through it stay valid;
    /// a new node is allocated for the shallower (head) side.
    fn split_edge(&mut self, parent: NodeId, first_token: TokenId, child: NodeId, split_at: usize) -> NodeId {
        let (head_label, head_slots, lock_count, last_access) = {
            let node = self.node_mut(child);
            let mut label = std::mem::take(&mut node.label);
            let mut slots = std::mem::take(&mut node.slots);
            let tail_label = label.split_off(split_at);
            let tail_slots = slots.split_off(split_at);
            node.label = tail_label;
            node.slots = tail_slots;
            (label, slots, node.lock_count, node.last_access)
        };
        let tail_first = self.node(child).label[0];
        let head_id = self.alloc_node(Node {
            parent: Some(parent),
            children: BTreeMap::from([(tail_first, child)]),
            label: head_label,
            slots: head_slots,
            lock_count,
            last_access,
        });
        self.node_mut(child).parent = Some(head_id);
        self.node_mut(parent).children.insert(first_token, head_id);
        head_id
    }

    fn maybe_merge(&mut self, parent_id: NodeId) {
        if parent_id == self.root {
            return;
        }
        let children: Vec<NodeId> = self.node(parent_id).children.values().copied().collect();
        if children.len() != 1 {
            return;
        }
        let child_id = children[0];
        if self.node(child_id).lock_count != 0 {
            return;
        }
        let parent_protected = self.node(parent_id).lock_count > 0;
        let (child_label, child_slots, child_children, child_last_access) = {
            let c = self.node_mut(child_id);
            (
                std::mem::take(&mut c.label),
                std::mem::take(&mut c.slots),
                std::mem::take(&mut c.children),
                c.last_access,
            )
        };
        let moved_len = child_label.len();
        {
            let p = self.node_mut(parent_id);
            p.label.extend(child_label);
            p.slots.extend(child_slots);
            p.last_access = p.last_access.max(child_last_access);
            p.children = child_children;
        }
        let grandchildren: Vec<NodeId> = self.node(parent_id).children.values().copied().collect();
        for g in grandchildren {
            self.node_mut(g).parent = Some(parent_id);
        }
        self.free_node(child_id);
        if parent_protected {
            self.evictable_size -= moved_len;
            self.protected_size += moved_len;
        }
    }

    fn best_evictable_leaf(&self) -> Option<NodeId> {
        let mut best: Option<(u64, &[SlotIdx], NodeId)> = None;
        for (idx, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot.node.as_ref() else { continue };
            let id = NodeId(idx as u32);
            if id == self.root || node.lock_count != 0 || !node.children.is_empty() {
                continue;
            }
            let better = match &best {
                None => true,
                Some((bt, bs, _)) => node.last_access < *bt || (node.last_access == *bt && node.slots.as_slice() < *bs),
            };
            if better {
                best = Some((node.last_access, &node.slots, id));
            }
        }
        best.map(|(_, _, id)| id)
    }
}

fn common_prefix_len(a: &[TokenId], b: &[TokenId]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_lands_exactly_at_match_boundary_leaving_remainder_evictable() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2, 3, 4], &[10, 11, 12, 13]).unwrap();
        cache.advance_tick();
        cache.insert_prefix(&[1, 2, 9], &[20, 21, 22]).unwrap();

        let (handle, matched) = cache.match_prefix(&[1, 2, 3, 8]);
        assert_eq!(handle.matched_len(), 3);
        assert_eq!(matched, vec![10, 11, 12]);

        cache.lock_handle(&handle, false).unwrap();
        // Slot 13 sits past the match boundary on its own split-off leaf, so
        // locking [10,11,12] doesn't protect it: it's still the first thing
        // evicted (older last_access than the unrelated [1,2,9] branch).
        let freed = cache.evict(1).unwrap();
        assert_eq!(freed, vec![13]);

        // With 13 gone, only the locked path and the [1,2,9] leaf remain.
        let freed = cache.evict(1).unwrap();
        assert_eq!(freed, vec![22]);
        let shortfall = cache.evict(1).unwrap_err();
        assert!(shortfall.freed.is_empty());

        cache.lock_handle(&handle, true).unwrap();
        let freed = cache.evict(3).unwrap();
        assert_eq!(freed, vec![12, 10, 11]);
    }

    #[test]
    fn insert_prefix_returns_full_length_on_exact_duplicate() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2, 3], &[1, 2, 3]).unwrap();
        let matched = cache.insert_prefix(&[1, 2, 3], &[9, 9, 9]).unwrap();
        assert_eq!(matched, 3);
    }

    #[test]
    fn insert_prefix_no_match_attaches_new_leaf() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2], &[10, 11]).unwrap();
        let matched = cache.insert_prefix(&[5, 6], &[50, 60]).unwrap();
        assert_eq!(matched, 0);
        assert_eq!(cache.size_info().total(), 4);
    }

    #[test]
    fn lock_unlock_symmetry_restores_size_info() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2, 3], &[10, 11, 12]).unwrap();
        let before = cache.size_info();
        let (handle, _) = cache.match_prefix(&[1, 2, 3]);
        cache.lock_handle(&handle, false).unwrap();
        cache.lock_handle(&handle, false).unwrap();
        cache.lock_handle(&handle, true).unwrap();
        cache.lock_handle(&handle, true).unwrap();
        assert_eq!(cache.size_info(), before);
    }

    #[test]
    fn handle_epoch_invalidated_after_eviction() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2], &[10, 11]).unwrap();
        let (handle, _) = cache.match_prefix(&[1, 2]);
        cache.evict(2).unwrap();
        let err = cache.lock_handle(&handle, false).unwrap_err();
        assert!(matches!(err, SchedError::StateError(_)));
    }

    #[test]
    fn evict_orders_by_tick_then_slot_lex() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1], &[100]).unwrap();
        cache.advance_tick();
        cache.insert_prefix(&[2], &[5]).unwrap();
        // both leaves share nothing locked; [2]->5 was touched on a later tick,
        // so the [1]->100 leaf (older tick) is evicted first despite larger slot id.
        let freed = cache.evict(1).unwrap();
        assert_eq!(freed, vec![100]);
    }

    #[test]
    fn eviction_frees_exactly_requested_when_available() {
        let mut cache = RadixCache::new();
        cache.insert_prefix(&[1, 2, 3, 4], &[1, 2, 3, 4]).unwrap();
        let freed = cache.evict(2).unwrap();
        assert!(freed.len() >= 2);
    }
}
