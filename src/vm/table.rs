//! Open-addressing hash table keyed by interned strings.
//!
//! Keys are compared by identity: every distinct string content has exactly
//! one heap object, so `ObjRef` equality is string equality. The key's hash
//! is stored alongside it so probing and rehashing never touch the heap.

use super::heap::ObjRef;
use super::value::Value;

const TABLE_MAX_LOAD: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub key: ObjRef,
    pub hash: u32,
    pub value: Value,
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Empty,
    /// A deleted entry. Probing continues past it.
    Tombstone,
    Occupied(Entry),
}

#[derive(Debug, Default)]
pub struct Table {
    buckets: Vec<Bucket>,
    /// Occupied buckets plus tombstones.
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        match self.buckets[find_bucket(&self.buckets, key, hash)] {
            Bucket::Occupied(entry) => Some(entry.value),
            _ => None,
        }
    }

    /// Insert or overwrite. Returns `true` if the key was not present.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            let capacity = (self.capacity() * 2).max(MIN_CAPACITY);
            self.adjust_capacity(capacity);
        }

        let index = find_bucket(&self.buckets, key, hash);
        let is_new = match self.buckets[index] {
            Bucket::Empty => {
                self.count += 1;
                true
            }
            // Reusing a tombstone: it was already counted.
            Bucket::Tombstone => true,
            Bucket::Occupied(_) => false,
        };
        self.buckets[index] = Bucket::Occupied(Entry { key, hash, value });
        is_new
    }

    /// Remove a key, leaving a tombstone. Returns `true` if it was present.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = find_bucket(&self.buckets, key, hash);
        if !matches!(self.buckets[index], Bucket::Occupied(_)) {
            return false;
        }
        self.buckets[index] = Bucket::Tombstone;
        true
    }

    /// Probe for a key by hash without knowing its `ObjRef`; `matches` decides
    /// whether a candidate with the same hash is the one wanted. Used to look
    /// up interned strings by content.
    pub fn find_by(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = hash as usize % capacity;
        loop {
            match self.buckets[index] {
                Bucket::Empty => return None,
                Bucket::Occupied(entry) if entry.hash == hash && matches(entry.key) => {
                    return Some(entry.key);
                }
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Tombstone every entry whose key is not marked.
    pub fn remove_white(&mut self, is_marked: impl Fn(ObjRef) -> bool) -> usize {
        let mut removed = 0;
        for bucket in &mut self.buckets {
            if let Bucket::Occupied(entry) = bucket
                && !is_marked(entry.key)
            {
                *bucket = Bucket::Tombstone;
                removed += 1;
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.buckets.iter().filter_map(|bucket| match bucket {
            Bucket::Occupied(entry) => Some(entry),
            _ => None,
        })
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::Empty; capacity]);
        self.count = 0;
        for bucket in old {
            if let Bucket::Occupied(entry) = bucket {
                let index = find_bucket(&self.buckets, entry.key, entry.hash);
                self.buckets[index] = Bucket::Occupied(entry);
                self.count += 1;
            }
        }
    }
}

/// Linear probe for `key`. Returns the bucket holding it, or the bucket where
/// it should be inserted: the first tombstone passed, else the empty bucket
/// that ended the probe.
fn find_bucket(buckets: &[Bucket], key: ObjRef, hash: u32) -> usize {
    let capacity = buckets.len();
    let mut index = hash as usize % capacity;
    let mut tombstone = None;
    loop {
        match buckets[index] {
            Bucket::Empty => return tombstone.unwrap_or(index),
            Bucket::Tombstone => {
                tombstone.get_or_insert(index);
            }
            Bucket::Occupied(entry) if entry.key == key => return index,
            Bucket::Occupied(_) => {}
        }
        index = (index + 1) % capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn key(i: u32) -> ObjRef {
        ObjRef::new(i, 0)
    }

    /// Deliberately collide a lot so probing and tombstones are exercised.
    fn hash(i: u32) -> u32 {
        i % 5
    }

    #[test]
    fn test_set_get() {
        let mut table = Table::new();
        assert!(table.set(key(1), hash(1), Value::Number(1.0)));
        assert!(!table.set(key(1), hash(1), Value::Number(2.0)));
        assert_eq!(table.get(key(1), hash(1)), Some(Value::Number(2.0)));
        assert_eq!(table.get(key(2), hash(2)), None);
    }

    #[test]
    fn test_get_on_empty_table() {
        let table = Table::new();
        assert_eq!(table.get(key(0), 0), None);
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn test_delete_leaves_probe_chain_intact() {
        let mut table = Table::new();
        // keys 0, 5 and 10 share a home bucket
        table.set(key(0), hash(0), Value::Nil);
        table.set(key(5), hash(5), Value::Bool(true));
        table.set(key(10), hash(10), Value::Bool(false));

        assert!(table.delete(key(5), hash(5)));
        assert!(!table.delete(key(5), hash(5)));
        assert_eq!(table.get(key(5), hash(5)), None);
        assert_eq!(table.get(key(10), hash(10)), Some(Value::Bool(false)));
    }

    #[test]
    fn test_reinsert_after_delete_reuses_tombstone() {
        let mut table = Table::new();
        table.set(key(3), hash(3), Value::Number(3.0));
        table.delete(key(3), hash(3));
        assert!(table.set(key(3), hash(3), Value::Number(4.0)));
        assert_eq!(table.get(key(3), hash(3)), Some(Value::Number(4.0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_grows_past_load_factor() {
        let mut table = Table::new();
        for i in 0..6 {
            table.set(key(i), i, Value::Number(i as f64));
        }
        assert_eq!(table.capacity(), 8);
        table.set(key(6), 6, Value::Nil);
        assert_eq!(table.capacity(), 16);
        for i in 0..6 {
            assert_eq!(table.get(key(i), i), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn test_rehash_drops_tombstones() {
        let mut table = Table::new();
        for i in 0..6 {
            table.set(key(i), i, Value::Nil);
        }
        for i in 0..6 {
            table.delete(key(i), i);
        }
        assert_eq!(table.count, 6);
        table.set(key(100), 100, Value::Nil);
        assert_eq!(table.count, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_by_uses_predicate() {
        let mut table = Table::new();
        table.set(key(1), 42, Value::Nil);
        table.set(key(2), 42, Value::Nil);
        assert_eq!(table.find_by(42, |k| k == key(2)), Some(key(2)));
        assert_eq!(table.find_by(42, |_| false), None);
        assert_eq!(table.find_by(7, |_| true), None);
    }

    #[test]
    fn test_remove_white() {
        let mut table = Table::new();
        for i in 0..4 {
            table.set(key(i), hash(i), Value::Nil);
        }
        let removed = table.remove_white(|k| k == key(2));
        assert_eq!(removed, 3);
        assert_eq!(table.len(), 1);
        assert!(table.get(key(2), hash(2)).is_some());
    }

    #[derive(Debug, Clone)]
    enum TableOp {
        Set(u32, f64),
        Delete(u32),
        Get(u32),
    }

    fn arb_op() -> impl Strategy<Value = TableOp> {
        prop_oneof![
            (0u32..32, -100.0f64..100.0).prop_map(|(k, v)| TableOp::Set(k, v)),
            (0u32..32).prop_map(TableOp::Delete),
            (0u32..32).prop_map(TableOp::Get),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The table agrees with a HashMap model under any operation sequence.
        #[test]
        fn table_matches_hashmap_model(ops in prop::collection::vec(arb_op(), 0..200)) {
            let mut table = Table::new();
            let mut model: HashMap<u32, f64> = HashMap::new();

            for op in ops {
                match op {
                    TableOp::Set(k, v) => {
                        let is_new = table.set(key(k), hash(k), Value::Number(v));
                        prop_assert_eq!(is_new, model.insert(k, v).is_none());
                    }
                    TableOp::Delete(k) => {
                        let deleted = table.delete(key(k), hash(k));
                        prop_assert_eq!(deleted, model.remove(&k).is_some());
                    }
                    TableOp::Get(k) => {
                        let got = table.get(key(k), hash(k));
                        prop_assert_eq!(got, model.get(&k).map(|v| Value::Number(*v)));
                    }
                }
            }
            prop_assert_eq!(table.len(), model.len());
        }
    }
}
