//! String-keyed hash table.
//!
//! Backs globals, module exports, class method/static tables, instance
//! fields, and the string intern set. Open addressing with linear
//! probing, power-of-two capacity, load factor 0.75. A deleted slot is a
//! tombstone: no key, value `true`. Interning makes key comparison a
//! handle comparison; each entry also carries the key's fixed hash so
//! resizing never has to consult the heap.

use crate::object::Handle;
use crate::value::Value;

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Entry {
    pub(crate) key: Option<Handle>,
    pub(crate) hash: u32,
    pub(crate) value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        hash: 0,
        value: Value::NULL,
    };

    #[cfg(test)]
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && self.value.is_bool()
    }
}

/// Open-addressed table keyed on interned strings.
#[derive(Debug, Default)]
pub struct Table {
    /// Live entries plus tombstones.
    count: usize,
    pub(crate) entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_slot(entries: &[Entry], key: Handle, hash: u32) -> usize {
        let mask = entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone: Option<usize> = None;

        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if entry.value.is_null() {
                        return tombstone.unwrap_or(index);
                    }
                    // Tombstone; keep probing but remember the first one.
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if k == key => return index,
                Some(_) => {}
            }
            index = (index + 1) & mask;
        }
    }

    pub fn get(&self, key: Handle, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_slot(&self.entries, key, hash);
        let entry = &self.entries[index];
        entry.key.map(|_| entry.value)
    }

    /// Insert or overwrite. Returns true when the key was not present.
    pub fn set(&mut self, key: Handle, hash: u32, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }

        let index = Self::find_slot(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        if is_new && entry.value.is_null() {
            self.count += 1;
        }
        *entry = Entry {
            key: Some(key),
            hash,
            value,
        };
        is_new
    }

    /// Remove a key, leaving a tombstone. Returns false if absent.
    pub fn delete(&mut self, key: Handle, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_slot(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        *entry = Entry {
            key: None,
            hash: 0,
            value: Value::TRUE,
        };
        true
    }

    /// Copy every live entry of `from` into this table.
    pub fn add_all(&mut self, from: &Table) {
        for entry in &from.entries {
            if let Some(key) = entry.key {
                self.set(key, entry.hash, entry.value);
            }
        }
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.entries.clear();
    }

    /// Live entries, probe order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    fn grow(&mut self) {
        let capacity = if self.entries.is_empty() {
            8
        } else {
            self.entries.len() * 2
        };
        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; capacity]);

        // Tombstones are dropped on the floor here, so recount.
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = Self::find_slot(&self.entries, key, entry.hash);
                self.entries[index] = entry;
                self.count += 1;
            }
        }
    }

    /// Retain only entries whose key survives the predicate. Used by the
    /// weak intern sweep; dead keys become tombstones.
    pub(crate) fn remove_unmarked(&mut self, mut is_marked: impl FnMut(Handle) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !is_marked(key) {
                    *entry = Entry {
                        key: None,
                        hash: 0,
                        value: Value::TRUE,
                    };
                }
            }
        }
    }

    /// Approximate backing-store size for allocation accounting.
    pub fn byte_size(&self) -> usize {
        self.entries.len() * std::mem::size_of::<Entry>()
    }

    #[cfg(test)]
    fn has_tombstone(&self) -> bool {
        self.entries.iter().any(|e| e.is_tombstone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32) -> (Handle, u32) {
        // Interned strings guarantee distinct handles for distinct
        // content; the tests just need stable (handle, hash) pairs.
        (Handle::from_raw(i), i.wrapping_mul(2654435761))
    }

    #[test]
    fn set_get_roundtrip() {
        let mut table = Table::new();
        let (k, h) = key(7);
        assert!(table.set(k, h, Value::number(1.0)));
        assert!(!table.set(k, h, Value::number(2.0)));
        let got = table.get(k, h).expect("key should be present");
        assert!(got.identical(Value::number(2.0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_key() {
        let table = Table::new();
        let (k, h) = key(1);
        assert!(table.get(k, h).is_none());
    }

    #[test]
    fn delete_leaves_tombstone() {
        let mut table = Table::new();
        let (k1, h1) = key(1);
        let (k2, h2) = key(2);
        table.set(k1, h1, Value::TRUE);
        table.set(k2, h2, Value::FALSE);
        assert!(table.delete(k1, h1));
        assert!(!table.delete(k1, h1));
        assert!(table.has_tombstone());
        // The survivor is still reachable across the tombstone.
        assert!(table.get(k2, h2).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn grows_past_load_factor() {
        let mut table = Table::new();
        for i in 0..100 {
            let (k, h) = key(i);
            table.set(k, h, Value::number(i as f64));
        }
        assert_eq!(table.len(), 100);
        for i in 0..100 {
            let (k, h) = key(i);
            let got = table.get(k, h).expect("entry should survive growth");
            assert!(got.identical(Value::number(i as f64)));
        }
        // Power-of-two capacity.
        assert_eq!(table.entries.len().count_ones(), 1);
    }

    #[test]
    fn resize_discards_tombstones() {
        let mut table = Table::new();
        for i in 0..8 {
            let (k, h) = key(i);
            table.set(k, h, Value::NULL);
        }
        for i in 0..4 {
            let (k, h) = key(i);
            table.delete(k, h);
        }
        for i in 8..64 {
            let (k, h) = key(i);
            table.set(k, h, Value::NULL);
        }
        assert!(!table.has_tombstone() || table.len() == 60);
        assert_eq!(table.len(), 60);
    }

    #[test]
    fn add_all_copies_live_entries() {
        let mut a = Table::new();
        let mut b = Table::new();
        let (k1, h1) = key(1);
        let (k2, h2) = key(2);
        a.set(k1, h1, Value::TRUE);
        a.set(k2, h2, Value::FALSE);
        a.delete(k2, h2);
        b.add_all(&a);
        assert_eq!(b.len(), 1);
        assert!(b.get(k1, h1).is_some());
        assert!(b.get(k2, h2).is_none());
    }
}
