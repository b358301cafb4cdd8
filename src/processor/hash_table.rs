use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use tracing::debug;

use crate::processor::{
    byte_string::FixedByteBuffer,
    region::{RowAccumulator, RowInit, SharedRegion},
    schema::round_up4,
};

// Link states. Any value from HANDLE_BASE up names a node.
const NIL: u32 = 0;
const LOCKED: u32 = 1;
const FULL: u32 = 2;
const HANDLE_BASE: u32 = 3;

/// Index of a node in the table's arenas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u32);

impl NodeHandle {
    #[inline]
    fn from_link(link: u32) -> Self {
        debug_assert!(link >= HANDLE_BASE);
        NodeHandle(link - HANDLE_BASE)
    }

    #[inline]
    fn link(self) -> u32 {
        self.0 + HANDLE_BASE
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First writer for the key; `on_insert` ran.
    Inserted(NodeHandle),
    /// Key already present; `on_update` ran.
    Updated(NodeHandle),
    /// Capacity exhausted on this key's chain; neither callback ran.
    Full,
}

/// Fixed-capacity hash table with separate chaining, safe for concurrent
/// insert-or-accumulate.
///
/// Every link (bucket head or node `next`) is a word that is `NIL`, `LOCKED`,
/// `FULL` or a node handle. A writer extends a chain by CAS-ing its tail link
/// from `NIL` to `LOCKED`, allocating a node, and publishing the handle with a
/// release store. Writers that find a link `LOCKED` park on it until the
/// holder publishes. Nodes are never moved or freed and there is no growth:
/// once `capacity` nodes exist, the next link that tries to allocate becomes
/// `FULL` for good.
///
/// Keys are copied once at creation and never rewritten; row payloads only
/// receive atomic adds after publication.
#[derive(Debug)]
pub struct ConcurrentHashTable {
    buckets: Box<[AtomicU32]>,
    next: Box<[AtomicU32]>,
    keys: SharedRegion,
    rows: SharedRegion,
    key_size: usize,
    key_stride: usize,
    row_size: usize,
    capacity: u32,
    length: AtomicU32,
    rejected: AtomicU32,
}

impl ConcurrentHashTable {
    pub fn new(capacity: u32, key_size: usize, row_size: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = capacity as usize;
        let key_stride = round_up4(key_size);
        debug!(capacity, key_size, row_size, "allocating hash table");

        Self {
            buckets: (0..slots).map(|_| AtomicU32::new(NIL)).collect(),
            next: (0..slots).map(|_| AtomicU32::new(NIL)).collect(),
            keys: SharedRegion::new(slots * key_stride),
            rows: SharedRegion::new(slots * row_size),
            key_size,
            key_stride,
            row_size,
            capacity,
            length: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        }
    }

    /// Finds `key`'s node, creating it if absent.
    ///
    /// `on_insert` initializes a new node's row before it becomes visible to
    /// other threads. `on_update` runs for every later writer of the same key
    /// and may only accumulate atomically.
    pub fn insert_or_update<I, U>(
        &self,
        key: &FixedByteBuffer<'_>,
        on_insert: I,
        on_update: U,
    ) -> InsertOutcome
    where
        I: FnOnce(&mut RowInit<'_>),
        U: FnOnce(&RowAccumulator<'_>),
    {
        debug_assert_eq!(key.len(), self.key_size, "key length must match the table");

        let bucket = (key.hash() % self.capacity) as usize;
        let mut link = &self.buckets[bucket];

        loop {
            match link.compare_exchange(NIL, LOCKED, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return self.append(link, key, on_insert),
                Err(LOCKED) => self.wait_while_locked(link),
                Err(FULL) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return InsertOutcome::Full;
                }
                Err(current) => {
                    let node = NodeHandle::from_link(current);
                    if self.key_matches(node, key) {
                        on_update(&RowAccumulator::new(&self.rows, self.row_offset(node)));
                        return InsertOutcome::Updated(node);
                    }
                    link = &self.next[node.index()];
                }
            }
        }
    }

    /// Allocates a node behind a link this thread holds `LOCKED`.
    fn append<I>(&self, link: &AtomicU32, key: &FixedByteBuffer<'_>, on_insert: I) -> InsertOutcome
    where
        I: FnOnce(&mut RowInit<'_>),
    {
        let index = self.length.fetch_add(1, Ordering::Relaxed);
        if index >= self.capacity {
            self.length.fetch_sub(1, Ordering::Relaxed);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            self.publish(link, FULL);
            return InsertOutcome::Full;
        }

        let node = NodeHandle(index);
        self.keys
            .store_bytes(node.index() * self.key_stride, key.as_bytes());
        on_insert(&mut RowInit::new(&self.rows, self.row_offset(node)));

        self.publish(link, node.link());
        InsertOutcome::Inserted(node)
    }

    fn publish(&self, link: &AtomicU32, value: u32) {
        link.store(value, Ordering::Release);
        // SAFETY: the key is the address of a link owned by this table and no
        // callback is passed.
        unsafe {
            parking_lot_core::unpark_all(link_addr(link), DEFAULT_UNPARK_TOKEN);
        }
    }

    fn wait_while_locked(&self, link: &AtomicU32) {
        while link.load(Ordering::Acquire) == LOCKED {
            // SAFETY: the validate closure only loads an atomic; it cannot
            // panic or re-enter the parking lot.
            unsafe {
                parking_lot_core::park(
                    link_addr(link),
                    || link.load(Ordering::Acquire) == LOCKED,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }

    #[inline]
    fn key_matches(&self, node: NodeHandle, key: &FixedByteBuffer<'_>) -> bool {
        self.keys
            .bytes_eq(node.index() * self.key_stride, key.as_bytes())
    }

    #[inline]
    fn row_offset(&self, node: NodeHandle) -> usize {
        node.index() * self.row_size
    }

    /// Read-only lookup of a published key.
    pub fn lookup(&self, key: &FixedByteBuffer<'_>) -> Option<NodeHandle> {
        let bucket = (key.hash() % self.capacity) as usize;
        let mut current = self.buckets[bucket].load(Ordering::Acquire);
        while current >= HANDLE_BASE {
            let node = NodeHandle::from_link(current);
            if self.key_matches(node, key) {
                return Some(node);
            }
            current = self.next[node.index()].load(Ordering::Acquire);
        }
        None
    }

    /// Reads a `u32` field of a node's row.
    pub fn row_u32(&self, node: NodeHandle, field: usize) -> u32 {
        self.rows.load_u32(self.row_offset(node) + field)
    }

    pub fn key_bytes(&self, node: NodeHandle) -> Vec<u8> {
        let mut out = vec![0u8; self.key_size];
        self.keys
            .load_bytes(node.index() * self.key_stride, &mut out);
        out
    }

    /// Number of nodes allocated.
    pub fn len(&self) -> u32 {
        self.length.load(Ordering::Acquire).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Inserts refused because the table was full.
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Copy of the rows of every allocated node, in allocation order.
    ///
    /// Call once writers are done; rows still being initialized are not
    /// guaranteed to be complete.
    pub fn rows_snapshot(&self) -> Vec<u8> {
        self.rows.to_bytes(self.len() as usize * self.row_size)
    }
}

#[inline]
fn link_addr(link: &AtomicU32) -> usize {
    link as *const AtomicU32 as usize
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const INSTANCES: usize = 0;
    const TOTAL: usize = 4;

    fn add(table: &ConcurrentHashTable, key: &[u8], value: u32) -> InsertOutcome {
        table.insert_or_update(
            &FixedByteBuffer::new(key),
            |row| {
                row.put_u32(INSTANCES, 1);
                row.put_u32(TOTAL, value);
            },
            |row| {
                row.add_u32(INSTANCES, 1);
                row.add_u32(TOTAL, value);
            },
        )
    }

    fn records(n: u32, distinct: u32) -> Vec<([u8; 6], u32)> {
        (0..n)
            .map(|i| {
                let k = i % distinct;
                let key = [b'A' + (k % 26) as u8, b'A' + (k / 26) as u8, b'X', b'Y', b'Z', 0];
                (key, i % 97)
            })
            .collect()
    }

    fn totals(table: &ConcurrentHashTable, keys: &[[u8; 6]]) -> HashMap<[u8; 6], (u32, u32)> {
        keys.iter()
            .map(|k| {
                let node = table.lookup(&FixedByteBuffer::new(k)).unwrap();
                (*k, (table.row_u32(node, INSTANCES), table.row_u32(node, TOTAL)))
            })
            .collect()
    }

    #[test]
    fn test_insert_then_update() {
        let table = ConcurrentHashTable::new(16, 6, 8);
        assert!(matches!(add(&table, b"BOSLAX", 120), InsertOutcome::Inserted(_)));
        assert!(matches!(add(&table, b"BOSLAX", 80), InsertOutcome::Updated(_)));
        assert!(matches!(add(&table, b"ORDLAX", 50), InsertOutcome::Inserted(_)));

        let node = table.lookup(&FixedByteBuffer::new(b"BOSLAX")).unwrap();
        assert_eq!(table.row_u32(node, INSTANCES), 2);
        assert_eq!(table.row_u32(node, TOTAL), 200);
        assert_eq!(table.key_bytes(node), b"BOSLAX");
        assert_eq!(table.len(), 2);
        assert!(table.lookup(&FixedByteBuffer::new(b"JFKSFO")).is_none());
    }

    #[test]
    fn test_trailing_zeros_distinguish_keys() {
        let table = ConcurrentHashTable::new(8, 4, 8);
        add(&table, b"AB\0\0", 1);
        add(&table, b"AB\0\x01", 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_chains_hold_colliding_keys() {
        // as many keys as buckets: some buckets must chain
        let table = ConcurrentHashTable::new(8, 6, 8);
        let keys: Vec<[u8; 6]> = records(8, 8).into_iter().map(|(k, _)| k).collect();
        for key in &keys {
            assert!(matches!(add(&table, key, 1), InsertOutcome::Inserted(_)));
        }
        for key in &keys {
            assert!(table.lookup(&FixedByteBuffer::new(key)).is_some());
        }
        assert_eq!(table.rejected(), 0);
    }

    #[test]
    fn test_full_table_rejects_new_keys_only() {
        let table = ConcurrentHashTable::new(4, 6, 8);
        let keys: Vec<[u8; 6]> = records(10, 10).into_iter().map(|(k, _)| k).collect();
        let inserted = keys
            .iter()
            .filter(|k| matches!(add(&table, *k, 1), InsertOutcome::Inserted(_)))
            .count();

        assert_eq!(inserted, 4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.rejected(), 6);
        assert_eq!(table.rows_snapshot().len(), 32);

        let stored = keys
            .iter()
            .find(|k| table.lookup(&FixedByteBuffer::new(*k)).is_some())
            .unwrap();
        assert!(matches!(add(&table, stored, 1), InsertOutcome::Updated(_)));
    }

    #[test]
    fn test_concurrent_matches_single_threaded_baseline() {
        let input = records(20_000, 50);
        let keys: Vec<[u8; 6]> = records(50, 50).into_iter().map(|(k, _)| k).collect();

        let baseline = ConcurrentHashTable::new(64, 6, 8);
        for (key, value) in &input {
            add(&baseline, key, *value);
        }
        let expected = totals(&baseline, &keys);
        assert_eq!(baseline.len(), 50);

        for threads in [2, 4, 8] {
            let table = ConcurrentHashTable::new(64, 6, 8);
            std::thread::scope(|s| {
                for t in 0..threads {
                    let table = &table;
                    let input = &input;
                    s.spawn(move || {
                        for (key, value) in input.iter().skip(t).step_by(threads) {
                            add(table, key, *value);
                        }
                    });
                }
            });
            assert_eq!(table.len(), 50);
            assert_eq!(totals(&table, &keys), expected);
        }
    }

    #[test]
    fn test_contended_single_key() {
        let table = ConcurrentHashTable::new(4, 6, 8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        add(&table, b"BOSLAX", 2);
                    }
                });
            }
        });
        let node = table.lookup(&FixedByteBuffer::new(b"BOSLAX")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.row_u32(node, INSTANCES), 8000);
        assert_eq!(table.row_u32(node, TOTAL), 16000);
    }
}
