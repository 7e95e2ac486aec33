//! Heap and garbage collector.
//!
//! Objects live in a slab of slots indexed by [`Handle`]; freed slots go
//! on a free list. Collection is precise, non-moving, stop-the-world
//! mark-and-sweep with the usual tri-color discipline: marking pushes a
//! handle onto the gray stack, blackening walks its outgoing references.
//! The string intern set holds weak entries and is pruned before the
//! object sweep so no dangling key survives.
//!
//! Any allocation may trigger a cycle, so a caller holding a
//! half-constructed object must park it in the `protect` buffer (or on
//! the VM stack) before allocating again. The `Vm` constructors in
//! `vm/mod.rs` enforce this for every compound object.

use log::debug;

use crate::limits::{GC_FIRST_THRESHOLD, GC_GROW_FACTOR};
use crate::map::hash_bits;
use crate::object::{Handle, Obj, ObjString, ObjUpvalue};
use crate::table::Table;
use crate::value::{number_to_string, Value};

/// FNV-1a over raw bytes. Fixed at string allocation, never recomputed.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// The object heap.
pub struct Heap {
    slots: Vec<Option<Obj>>,
    marks: Vec<bool>,
    free: Vec<u32>,
    gray: Vec<Handle>,
    /// Weak intern set: content-unique strings, pruned before sweep.
    strings: Table,
    /// Roots buffer for half-constructed object graphs.
    pub(crate) protect: Vec<Value>,
    bytes_allocated: usize,
    next_gc: usize,
    /// Force a cycle before every allocation.
    pub gc_stress: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            slots: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
            gray: Vec::new(),
            strings: Table::new(),
            protect: Vec::new(),
            bytes_allocated: 0,
            next_gc: GC_FIRST_THRESHOLD,
            gc_stress: false,
        }
    }

    /// Whether the next allocation of roughly `upcoming` bytes should
    /// run a cycle first.
    pub fn wants_collection(&self, upcoming: usize) -> bool {
        self.gc_stress || self.bytes_allocated + upcoming > self.next_gc
    }

    /// Place an object in a slot. Collection scheduling happens in the
    /// caller, which can see the roots.
    pub fn alloc(&mut self, obj: Obj) -> Handle {
        self.bytes_allocated += obj.size_hint();
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(obj);
                self.marks[index as usize] = false;
                Handle::from_raw(index)
            }
            None => {
                self.slots.push(Some(obj));
                self.marks.push(false);
                Handle::from_raw((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn get(&self, handle: Handle) -> &Obj {
        match &self.slots[handle.index()] {
            Some(obj) => obj,
            None => unreachable!("dangling handle"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> &mut Obj {
        match &mut self.slots[handle.index()] {
            Some(obj) => obj,
            None => unreachable!("dangling handle"),
        }
    }

    pub fn string(&self, handle: Handle) -> &ObjString {
        match self.get(handle) {
            Obj::String(s) => s,
            _ => unreachable!("expected string"),
        }
    }

    pub fn string_chars(&self, handle: Handle) -> &str {
        &self.string(handle).chars
    }

    pub fn string_hash(&self, handle: Handle) -> u32 {
        self.string(handle).hash
    }

    /// Look up an interned string by content.
    pub fn find_interned(&self, chars: &str, hash: u32) -> Option<Handle> {
        if self.strings.entries.is_empty() {
            return None;
        }
        let mask = self.strings.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.strings.entries[index];
            match entry.key {
                None => {
                    if entry.value.is_null() {
                        return None;
                    }
                    // Tombstone, keep probing.
                }
                Some(key) => {
                    let s = self.string(key);
                    if s.hash == hash && s.chars == chars {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Record a freshly allocated string in the intern set.
    pub fn intern_record(&mut self, handle: Handle, hash: u32) {
        self.strings.set(handle, hash, Value::NULL);
    }

    /// The hashable-key hash, or `None` for unhashable values.
    pub fn value_hash(&self, value: Value) -> Option<u32> {
        if value.is_object() {
            match self.get(value.as_object()) {
                Obj::String(s) => Some(s.hash),
                _ => None,
            }
        } else if value.is_empty() {
            None
        } else {
            Some(hash_bits(value.bits()))
        }
    }

    /// Structural equality. Strings compare by identity (interning makes
    /// that correct), lists and maps structurally, ranges field-wise,
    /// everything else by identity.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        if a.is_object() && b.is_object() {
            let (ha, hb) = (a.as_object(), b.as_object());
            if ha == hb {
                return true;
            }
            match (self.get(ha), self.get(hb)) {
                (Obj::List(x), Obj::List(y)) => {
                    x.items.len() == y.items.len()
                        && x.items
                            .iter()
                            .zip(&y.items)
                            .all(|(&u, &v)| self.values_equal(u, v))
                }
                (Obj::Map(x), Obj::Map(y)) => {
                    x.entries.len() == y.entries.len()
                        && x.entries.iter().all(|(k, v)| match self.value_hash(k) {
                            Some(hash) => y
                                .entries
                                .get(k, hash)
                                .is_some_and(|other| self.values_equal(v, other)),
                            None => false,
                        })
                }
                (Obj::Range(x), Obj::Range(y)) => {
                    x.start == y.start && x.end == y.end && x.step == y.step
                }
                _ => false,
            }
        } else {
            a.identical(b)
        }
    }

    /// The falsiness predicate: `null`, `false`, `0`, the empty string,
    /// the empty list and the empty map are falsy.
    pub fn is_falsey(&self, value: Value) -> bool {
        if value.is_null() {
            return true;
        }
        if value.is_bool() {
            return !value.as_bool();
        }
        if value.is_number() {
            return value.as_number() == 0.0;
        }
        if value.is_object() {
            return match self.get(value.as_object()) {
                Obj::String(s) => s.is_empty(),
                Obj::List(l) => l.items.is_empty(),
                Obj::Map(m) => m.entries.is_empty(),
                _ => false,
            };
        }
        false
    }

    /// User-visible type name.
    pub fn type_name(&self, value: Value) -> &'static str {
        if value.is_bool() {
            "bool"
        } else if value.is_null() {
            "null"
        } else if value.is_number() {
            "number"
        } else if value.is_object() {
            self.get(value.as_object()).type_name()
        } else {
            "unknown"
        }
    }

    /// Numeric coercion: numbers pass through, booleans become 0/1,
    /// strings parse. Returns `None` when the value has no numeric form.
    pub fn to_number(&self, value: Value) -> Option<f64> {
        if value.is_number() {
            return Some(value.as_number());
        }
        if value.is_bool() {
            return Some(if value.as_bool() { 1.0 } else { 0.0 });
        }
        if value.is_object() {
            if let Obj::String(s) = self.get(value.as_object()) {
                return s.chars.trim().parse::<f64>().ok();
            }
        }
        None
    }

    /// Render a value the way the language prints it.
    pub fn value_to_string(&self, value: Value) -> String {
        let mut visiting = Vec::new();
        self.render(value, &mut visiting)
    }

    fn render(&self, value: Value, visiting: &mut Vec<Handle>) -> String {
        if value.is_null() {
            return "null".to_string();
        }
        if value.is_bool() {
            return if value.as_bool() { "true" } else { "false" }.to_string();
        }
        if value.is_number() {
            return number_to_string(value.as_number());
        }
        if value.is_empty() {
            return "<empty>".to_string();
        }

        let handle = value.as_object();
        match self.get(handle) {
            Obj::String(s) => s.chars.clone(),
            Obj::List(list) => {
                if visiting.contains(&handle) {
                    return "[...]".to_string();
                }
                visiting.push(handle);
                let parts: Vec<String> = list
                    .items
                    .iter()
                    .map(|&item| self.render(item, visiting))
                    .collect();
                visiting.pop();
                format!("[{}]", parts.join(", "))
            }
            Obj::Map(map) => {
                if visiting.contains(&handle) {
                    return "{...}".to_string();
                }
                visiting.push(handle);
                let parts: Vec<String> = map
                    .entries
                    .iter()
                    .map(|(k, v)| {
                        let v = self.render(v, visiting);
                        if k.is_object() && matches!(self.get(k.as_object()), Obj::String(_)) {
                            format!("{} = {}", self.string_chars(k.as_object()), v)
                        } else {
                            format!("[{}] = {}", self.render(k, visiting), v)
                        }
                    })
                    .collect();
                visiting.pop();
                format!("{{{}}}", parts.join(", "))
            }
            Obj::Range(range) => format!(
                "{}...{}",
                number_to_string(range.start),
                number_to_string(range.end)
            ),
            Obj::Function(f) => {
                if f.kind == crate::object::FunctionKind::Script {
                    "<script>".to_string()
                } else {
                    "<function>".to_string()
                }
            }
            Obj::Closure(c) => {
                if let Obj::Function(f) = self.get(c.function) {
                    if f.kind == crate::object::FunctionKind::Script {
                        return "<script>".to_string();
                    }
                }
                "<function>".to_string()
            }
            Obj::Native(_) => "<function>".to_string(),
            Obj::BoundMethod(_) => "<method>".to_string(),
            Obj::Class(c) => format!("<{}>", self.string_chars(c.name)),
            Obj::Instance(i) => {
                let class_name = match self.get(i.class) {
                    Obj::Class(c) => self.string_chars(c.name),
                    _ => "?",
                };
                format!("<{class_name} instance>")
            }
            Obj::Module(m) => format!("<{} module>", self.string_chars(m.name)),
            Obj::File(_) => "<file>".to_string(),
            Obj::Upvalue(_) => "<upvalue>".to_string(),
        }
    }

    // === Marking ===

    pub fn mark_value(&mut self, value: Value) {
        if value.is_object() {
            self.mark_object(value.as_object());
        }
    }

    pub fn mark_object(&mut self, handle: Handle) {
        mark(&mut self.marks, &mut self.gray, handle);
    }

    /// Mark every key and value of an externally owned table.
    pub fn mark_table(&mut self, table: &Table) {
        for entry in &table.entries {
            if let Some(key) = entry.key {
                self.mark_object(key);
            }
            self.mark_value(entry.value);
        }
    }

    /// Mark the protect buffer, the engine's roots for mid-construction
    /// object graphs.
    pub fn mark_protected(&mut self) {
        for i in 0..self.protect.len() {
            let value = self.protect[i];
            self.mark_value(value);
        }
    }

    /// Blacken gray objects until none remain.
    pub fn trace(&mut self) {
        let Heap {
            slots, marks, gray, ..
        } = self;

        while let Some(handle) = gray.pop() {
            let obj = match &slots[handle.index()] {
                Some(obj) => obj,
                None => continue,
            };
            match obj {
                Obj::String(_) | Obj::Range(_) => {}
                Obj::Native(native) => mark(marks, gray, native.name),
                Obj::List(list) => {
                    for &item in &list.items {
                        mark_value(marks, gray, item);
                    }
                }
                Obj::Map(map) => {
                    for entry in &map.entries.entries {
                        mark_value(marks, gray, entry.key);
                        mark_value(marks, gray, entry.value);
                    }
                }
                Obj::Function(f) => {
                    if let Some(name) = f.name {
                        mark(marks, gray, name);
                    }
                    mark(marks, gray, f.module);
                    for &constant in &f.chunk.constants {
                        mark_value(marks, gray, constant);
                    }
                }
                Obj::Closure(c) => {
                    mark(marks, gray, c.function);
                    for &upvalue in &c.upvalues {
                        mark(marks, gray, upvalue);
                    }
                }
                Obj::Upvalue(u) => {
                    if let ObjUpvalue::Closed(value) = u {
                        mark_value(marks, gray, *value);
                    }
                }
                Obj::Class(c) => {
                    mark(marks, gray, c.name);
                    if let Some(superclass) = c.superclass {
                        mark(marks, gray, superclass);
                    }
                    mark_value(marks, gray, c.constructor);
                    mark_entries(marks, gray, &c.statics);
                    mark_entries(marks, gray, &c.methods);
                }
                Obj::Instance(i) => {
                    mark(marks, gray, i.class);
                    mark_entries(marks, gray, &i.fields);
                }
                Obj::BoundMethod(b) => {
                    mark_value(marks, gray, b.receiver);
                    mark_value(marks, gray, b.method);
                }
                Obj::Module(m) => {
                    mark(marks, gray, m.name);
                    mark(marks, gray, m.path);
                    mark_entries(marks, gray, &m.values);
                }
                Obj::File(f) => {
                    mark(marks, gray, f.path);
                    mark(marks, gray, f.mode);
                }
            }
        }
    }

    /// Prune the intern set, free unmarked objects, clear survivor
    /// marks, and reset the collection threshold.
    pub fn sweep(&mut self) {
        let before = self.bytes_allocated;

        // Intern entries are weak: drop them while their strings are
        // still present, so no dangling key survives the object sweep.
        let marks = std::mem::take(&mut self.marks);
        self.strings.remove_unmarked(|key| marks[key.index()]);
        self.marks = marks;

        for index in 0..self.slots.len() {
            if self.marks[index] {
                self.marks[index] = false;
                continue;
            }
            if let Some(obj) = self.slots[index].take() {
                self.bytes_allocated = self.bytes_allocated.saturating_sub(obj.size_hint());
                self.free.push(index as u32);
            }
        }

        self.next_gc = self.bytes_allocated.max(1) * GC_GROW_FACTOR;
        debug!(
            "gc cycle: {} -> {} bytes, next at {}",
            before, self.bytes_allocated, self.next_gc
        );
    }
}

#[inline]
fn mark(marks: &mut [bool], gray: &mut Vec<Handle>, handle: Handle) {
    if !marks[handle.index()] {
        marks[handle.index()] = true;
        gray.push(handle);
    }
}

#[inline]
fn mark_value(marks: &mut [bool], gray: &mut Vec<Handle>, value: Value) {
    if value.is_object() {
        mark(marks, gray, value.as_object());
    }
}

fn mark_entries(marks: &mut [bool], gray: &mut Vec<Handle>, table: &Table) {
    for entry in &table.entries {
        if let Some(key) = entry.key {
            mark(marks, gray, key);
        }
        mark_value(marks, gray, entry.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjList;

    fn new_string(heap: &mut Heap, s: &str) -> Handle {
        let hash = fnv1a(s.as_bytes());
        if let Some(existing) = heap.find_interned(s, hash) {
            return existing;
        }
        let handle = heap.alloc(Obj::String(ObjString {
            chars: s.to_string(),
            hash,
        }));
        heap.intern_record(handle, hash);
        handle
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 2166136261);
        assert_eq!(fnv1a(b"a"), 0xe40c292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn interning_deduplicates() {
        let mut heap = Heap::new();
        let a = new_string(&mut heap, "tea");
        let b = new_string(&mut heap, "tea");
        let c = new_string(&mut heap, "chai");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.live_objects(), 2);
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let mut heap = Heap::new();
        let kept = new_string(&mut heap, "kept");
        let _lost = new_string(&mut heap, "lost");
        heap.mark_object(kept);
        heap.trace();
        heap.sweep();
        assert_eq!(heap.live_objects(), 1);
        assert_eq!(heap.string_chars(kept), "kept");
        // The dead intern entry is gone, so the content can be re-made.
        let again = new_string(&mut heap, "lost");
        assert_eq!(heap.string_chars(again), "lost");
    }

    #[test]
    fn intern_set_is_weak() {
        let mut heap = Heap::new();
        let lost = new_string(&mut heap, "ghost");
        let hash = heap.string_hash(lost);
        heap.trace();
        heap.sweep();
        assert!(heap.find_interned("ghost", hash).is_none());
    }

    #[test]
    fn protect_buffer_roots_objects() {
        let mut heap = Heap::new();
        let handle = new_string(&mut heap, "held");
        heap.protect.push(Value::object(handle));
        heap.mark_protected();
        heap.trace();
        heap.sweep();
        assert_eq!(heap.live_objects(), 1);
        heap.protect.pop();
    }

    #[test]
    fn marking_traces_list_contents() {
        let mut heap = Heap::new();
        let item = new_string(&mut heap, "item");
        let list = heap.alloc(Obj::List(ObjList {
            items: vec![Value::object(item)],
        }));
        heap.mark_object(list);
        heap.trace();
        heap.sweep();
        assert_eq!(heap.live_objects(), 2);
        assert_eq!(heap.string_chars(item), "item");
    }

    #[test]
    fn structural_equality() {
        let mut heap = Heap::new();
        let a = heap.alloc(Obj::List(ObjList {
            items: vec![Value::number(1.0), Value::number(2.0)],
        }));
        let b = heap.alloc(Obj::List(ObjList {
            items: vec![Value::number(1.0), Value::number(2.0)],
        }));
        let c = heap.alloc(Obj::List(ObjList {
            items: vec![Value::number(1.0)],
        }));
        assert!(heap.values_equal(Value::object(a), Value::object(b)));
        assert!(!heap.values_equal(Value::object(a), Value::object(c)));
    }

    #[test]
    fn falsiness() {
        let mut heap = Heap::new();
        let empty = new_string(&mut heap, "");
        let full = new_string(&mut heap, "x");
        assert!(heap.is_falsey(Value::NULL));
        assert!(heap.is_falsey(Value::FALSE));
        assert!(heap.is_falsey(Value::number(0.0)));
        assert!(heap.is_falsey(Value::object(empty)));
        assert!(!heap.is_falsey(Value::object(full)));
        assert!(!heap.is_falsey(Value::number(0.5)));
        assert!(!heap.is_falsey(Value::TRUE));
    }

    #[test]
    fn hash_equals_for_equal_values() {
        let mut heap = Heap::new();
        let a = new_string(&mut heap, "key");
        let b = new_string(&mut heap, "key");
        assert_eq!(heap.value_hash(Value::object(a)), heap.value_hash(Value::object(b)));
        assert_eq!(
            heap.value_hash(Value::number(3.5)),
            heap.value_hash(Value::number(3.5))
        );
        let list = heap.alloc(Obj::List(ObjList::default()));
        assert!(heap.value_hash(Value::object(list)).is_none());
    }
}
