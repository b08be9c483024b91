//! The mapping table (spec §3 `MappingTable`, §4.1, C2): an immutable,
//! sorted partition of the sector space into per-target intervals, with an
//! implicit B-tree over `highs` for O(log N) lookup (spec §9 "Implicit
//! B-tree as arena+index" — a flat array of keys addressed by
//! `(level, node, slot)` arithmetic, no pointer graph).

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};

use crate::{
    constants::KEYS_PER_NODE,
    error::{DmError, DmResult},
    target::Target,
};

/// One bound target, as supplied by the (out-of-scope) table loader.
pub struct TargetEntry {
    /// Inclusive last sector this target owns.
    pub high: u64,
    pub target: Arc<dyn Target>,
}

impl TargetEntry {
    pub fn new(high: u64, target: Arc<dyn Target>) -> Self {
        Self { high, target }
    }
}

pub struct MappingTable {
    highs: Vec<u64>,
    targets: Vec<Arc<dyn Target>>,
    depth: usize,
    /// `nodes[level]` is a flat array of `level_len(level) * KEYS_PER_NODE`
    /// keys; node `n`'s keys occupy `[n*K, n*K+K)`.
    nodes: Vec<Vec<u64>>,
    level_len: Vec<usize>,
    pending: AtomicU32,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
    hardsect_size: u32,
}

impl MappingTable {
    /// Builds a frozen mapping table from a sorted list of target entries.
    /// `highs` must be strictly increasing and non-empty (spec §3
    /// invariants; spec §4.6 guards `activate` on `num_targets > 0`).
    pub fn new(entries: Vec<TargetEntry>, hardsect_size: u32) -> DmResult<Self> {
        if entries.is_empty() {
            return Err(DmError::InvalidArgument {
                reason: "mapping table must have at least one target".into(),
            });
        }

        let mut highs = Vec::with_capacity(entries.len());
        let mut targets = Vec::with_capacity(entries.len());
        let mut prev: Option<u64> = None;
        for e in entries {
            if let Some(p) = prev {
                if e.high <= p {
                    return Err(DmError::InvalidArgument {
                        reason: "target highs must be strictly increasing".into(),
                    });
                }
            }
            prev = Some(e.high);
            highs.push(e.high);
            targets.push(e.target);
        }

        let (level_len, nodes, depth) = build_tree(&highs);

        Ok(Self {
            highs,
            targets,
            depth,
            nodes,
            level_len,
            pending: AtomicU32::new(0),
            wait_lock: Mutex::new(()),
            wait_cv: Condvar::new(),
            hardsect_size,
        })
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn hardsect_size(&self) -> u32 {
        self.hardsect_size
    }

    /// Total addressable size of the table, in sectors.
    pub fn size_in_sectors(&self) -> u64 {
        *self.highs.last().expect("non-empty table") + 1
    }

    pub fn target(&self, idx: usize) -> &Arc<dyn Target> {
        &self.targets[idx]
    }

    pub fn high(&self, idx: usize) -> u64 {
        self.highs[idx]
    }

    /// Descends the implicit B-tree to find the target index owning
    /// `sector` (spec §4.1 "Lookup"). Returns `None` if `sector` exceeds the
    /// table's addressable range. Boundary sectors belong to the
    /// lower-indexed target (spec §4.1 "Tie-break").
    pub fn lookup(&self, sector: u64) -> Option<usize> {
        let mut node = 0usize;
        for level in 0..self.depth {
            let k = self.scan_node(level, node, sector);
            if level == self.depth - 1 {
                let leaf = node * KEYS_PER_NODE + k;
                return if leaf < self.highs.len() {
                    Some(leaf)
                } else {
                    None
                };
            }
            node = node * (KEYS_PER_NODE + 1) + k;
            if node >= self.level_len[level + 1] {
                return None;
            }
        }
        unreachable!("depth is always >= 1")
    }

    /// Linear scan of one node's `KEYS_PER_NODE` keys, picking the smallest
    /// index whose key is `>= sector` (spec §4.1: "deliberate... the inner
    /// loop is branch-predictable and cache-resident").
    fn scan_node(&self, level: usize, node: usize, sector: u64) -> usize {
        let base = node * KEYS_PER_NODE;
        let keys = &self.nodes[level][base..base + KEYS_PER_NODE];
        keys.iter()
            .position(|&key| key >= sector)
            .unwrap_or(KEYS_PER_NODE)
    }

    /// Current count of in-flight `FORWARDED` requests issued against this
    /// table instance (spec §3 `pending`).
    pub fn pending_count(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn inc_pending(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements `pending`; wakes any waiter blocked in
    /// `wait_until_drained` if the count just reached zero (spec §4.5 step
    /// 3, §3 invariant "`wait` is signalled exactly on transitions
    /// `pending: k→0`").
    pub(crate) fn dec_pending(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "pending must never go negative");
        if prev == 1 {
            let _guard = self.wait_lock.lock();
            self.wait_cv.notify_all();
        }
    }

    /// Blocks the calling thread until `pending` reaches zero (spec §4.6
    /// `suspend`). May block arbitrarily long by contract — callers needing
    /// a timeout must impose one externally (spec §5).
    pub fn wait_until_drained(&self) {
        let mut guard = self.wait_lock.lock();
        while self.pending.load(Ordering::Acquire) != 0 {
            self.wait_cv.wait(&mut guard);
        }
    }
}

/// Builds the implicit B-tree bottom-up: the leaf level mirrors `highs`
/// padded with `+∞` sentinels to a multiple of `KEYS_PER_NODE`; each
/// internal level's node stores, for each of its `KEYS_PER_NODE + 1`
/// children, the maximum leaf key reachable through that child (spec §4.1).
fn build_tree(highs: &[u64]) -> (Vec<usize>, Vec<Vec<u64>>, usize) {
    let k = KEYS_PER_NODE;

    let mut level_len = vec![highs.len().div_ceil(k).max(1)];
    while *level_len.last().unwrap() > 1 {
        let prev = *level_len.last().unwrap();
        level_len.push(prev.div_ceil(k + 1));
    }
    level_len.reverse();
    let depth = level_len.len();

    let mut nodes: Vec<Vec<u64>> = level_len.iter().map(|&n| vec![u64::MAX; n * k]).collect();

    // Fill the leaf level (last) from `highs`.
    let leaf = nodes.last_mut().unwrap();
    for (i, &h) in highs.iter().enumerate() {
        leaf[i] = h;
    }

    // Fill internal levels bottom-up: node n's key k is the max leaf key
    // under child n*(K+1)+k, i.e. that child node's own last slot (which,
    // by construction, already holds its subtree's max).
    for level in (0..depth - 1).rev() {
        let child_len = level_len[level + 1];
        let this_len = level_len[level];
        let mut this_nodes = vec![u64::MAX; this_len * k];
        for n in 0..this_len {
            for slot in 0..k {
                let child = n * (k + 1) + slot;
                if child < child_len {
                    this_nodes[n * k + slot] = nodes[level + 1][child * k + (k - 1)];
                }
            }
        }
        nodes[level] = this_nodes;
    }

    (level_len, nodes, depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::linear::LinearTarget;

    fn table_of(highs: &[u64]) -> MappingTable {
        let entries = highs
            .iter()
            .enumerate()
            .map(|(i, &h)| {
                TargetEntry::new(
                    h,
                    Arc::new(LinearTarget::new(format!("t{i}"), 0, 0)),
                )
            })
            .collect();
        MappingTable::new(entries, 512).unwrap()
    }

    #[test]
    fn rejects_empty_table() {
        assert!(MappingTable::new(vec![], 512).is_err());
    }

    #[test]
    fn rejects_non_increasing_highs() {
        let entries = vec![
            TargetEntry::new(99, Arc::new(LinearTarget::new("a", 0, 0))),
            TargetEntry::new(50, Arc::new(LinearTarget::new("b", 0, 0))),
        ];
        assert!(MappingTable::new(entries, 512).is_err());
    }

    #[test]
    fn lookup_two_targets_boundaries() {
        let t = table_of(&[99, 299]);
        assert_eq!(t.lookup(0), Some(0));
        assert_eq!(t.lookup(50), Some(0));
        assert_eq!(t.lookup(99), Some(0));
        assert_eq!(t.lookup(100), Some(1));
        assert_eq!(t.lookup(299), Some(1));
        assert_eq!(t.lookup(300), None);
    }

    #[test]
    fn lookup_spans_multiple_tree_levels() {
        // Force at least 3 levels: (KEYS_PER_NODE+1)^2 * KEYS_PER_NODE+ targets.
        let n = (KEYS_PER_NODE + 1) * (KEYS_PER_NODE + 1) * 2;
        let highs: Vec<u64> = (0..n).map(|i| (i as u64 + 1) * 10 - 1).collect();
        let t = table_of(&highs);

        for (i, &h) in highs.iter().enumerate() {
            assert_eq!(t.lookup(h), Some(i), "boundary sector {h}");
            if h > 0 {
                assert_eq!(t.lookup(h - 1), Some(i), "sector {} below boundary", h - 1);
            }
        }
        assert_eq!(t.lookup(*highs.last().unwrap() + 1), None);
    }

    #[test]
    fn pending_wakes_waiter_on_drain() {
        let t = Arc::new(table_of(&[99]));
        t.inc_pending();
        t.inc_pending();

        let t2 = t.clone();
        let handle = std::thread::spawn(move || {
            t2.wait_until_drained();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        t.dec_pending();
        t.dec_pending();
        handle.join().unwrap();
        assert_eq!(t.pending_count(), 0);
    }
}
