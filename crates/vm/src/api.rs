//! Host embedding API.
//!
//! Inside a native callback the host sees a logical slot window: slot 0
//! is the receiver (methods, properties) or the first argument
//! (functions), ascending to the last argument. Results are pushed on
//! top of the window; the VM collapses the window around the single
//! return slot when the callback finishes.

use crate::error::{TeaError, TeaResult};
use crate::object::{Handle, NativeFn, NativeKind, Obj};
use crate::value::Value;
use crate::vm::Vm;

impl Vm {
    #[inline]
    fn window_base(&self) -> usize {
        self.windows.last().copied().unwrap_or(0)
    }

    /// Number of slots in the current window.
    pub fn get_top(&self) -> usize {
        self.stack.len() - self.window_base()
    }

    /// Raw value in window slot `index`.
    pub fn get_value(&self, index: usize) -> Value {
        self.stack[self.window_base() + index]
    }

    // === Predicates ===

    pub fn is_null(&self, index: usize) -> bool {
        self.get_value(index).is_null()
    }

    pub fn is_bool(&self, index: usize) -> bool {
        self.get_value(index).is_bool()
    }

    pub fn is_number(&self, index: usize) -> bool {
        self.get_value(index).is_number()
    }

    fn is_obj_kind(&self, index: usize, matcher: fn(&Obj) -> bool) -> bool {
        let value = self.get_value(index);
        value.is_object() && matcher(self.heap.get(value.as_object()))
    }

    pub fn is_string(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| matches!(obj, Obj::String(_)))
    }

    pub fn is_list(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| matches!(obj, Obj::List(_)))
    }

    pub fn is_map(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| matches!(obj, Obj::Map(_)))
    }

    pub fn is_range(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| matches!(obj, Obj::Range(_)))
    }

    pub fn is_file(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| matches!(obj, Obj::File(_)))
    }

    pub fn is_function(&self, index: usize) -> bool {
        self.is_obj_kind(index, |obj| {
            matches!(
                obj,
                Obj::Closure(_) | Obj::Native(_) | Obj::BoundMethod(_) | Obj::Class(_)
            )
        })
    }

    /// The falsiness predicate applied to a slot.
    pub fn is_falsey(&self, index: usize) -> bool {
        self.heap.is_falsey(self.get_value(index))
    }

    // === Getters ===

    pub fn get_bool(&self, index: usize) -> bool {
        let value = self.get_value(index);
        value.is_bool() && value.as_bool()
    }

    pub fn get_number(&self, index: usize) -> f64 {
        let value = self.get_value(index);
        if value.is_number() {
            value.as_number()
        } else {
            0.0
        }
    }

    /// String contents of a slot, or `""` when it is not a string.
    pub fn get_lstring(&self, index: usize) -> &str {
        let value = self.get_value(index);
        if value.is_object() {
            if let Obj::String(s) = self.heap.get(value.as_object()) {
                return &s.chars;
            }
        }
        ""
    }

    pub fn get_range(&self, index: usize) -> (f64, f64, f64) {
        let value = self.get_value(index);
        if value.is_object() {
            if let Obj::Range(r) = self.heap.get(value.as_object()) {
                return (r.start, r.end, r.step);
            }
        }
        (0.0, 0.0, 0.0)
    }

    // === Checked accessors ===

    fn check_type_error(&self, index: usize, expected: &str) -> TeaError {
        let actual = self.heap.type_name(self.get_value(index));
        self.error(format!("Expected {expected}, got {actual}"))
    }

    pub fn check_bool(&self, index: usize) -> TeaResult<bool> {
        if !self.is_bool(index) {
            return Err(self.check_type_error(index, "bool"));
        }
        Ok(self.get_value(index).as_bool())
    }

    pub fn check_number(&self, index: usize) -> TeaResult<f64> {
        if !self.is_number(index) {
            return Err(self.check_type_error(index, "number"));
        }
        Ok(self.get_value(index).as_number())
    }

    pub fn check_string(&self, index: usize) -> TeaResult<&str> {
        if !self.is_string(index) {
            return Err(self.check_type_error(index, "string"));
        }
        Ok(self.get_lstring(index))
    }

    pub fn check_list(&self, index: usize) -> TeaResult<Handle> {
        if !self.is_list(index) {
            return Err(self.check_type_error(index, "list"));
        }
        Ok(self.get_value(index).as_object())
    }

    pub fn check_map(&self, index: usize) -> TeaResult<Handle> {
        if !self.is_map(index) {
            return Err(self.check_type_error(index, "map"));
        }
        Ok(self.get_value(index).as_object())
    }

    pub fn check_range(&self, index: usize) -> TeaResult<(f64, f64, f64)> {
        if !self.is_range(index) {
            return Err(self.check_type_error(index, "range"));
        }
        Ok(self.get_range(index))
    }

    pub fn check_file(&self, index: usize) -> TeaResult<Handle> {
        if !self.is_file(index) {
            return Err(self.check_type_error(index, "file"));
        }
        Ok(self.get_value(index).as_object())
    }

    // === Argument-count checks ===

    pub fn ensure_min_args(&self, count: usize, minimum: usize) -> TeaResult<()> {
        if count < minimum {
            return Err(self.error(format!(
                "Expected at least {minimum} arguments, got {count}"
            )));
        }
        Ok(())
    }

    pub fn ensure_max_args(&self, count: usize, maximum: usize) -> TeaResult<()> {
        if count > maximum {
            return Err(self.error(format!(
                "Expected at most {maximum} arguments, got {count}"
            )));
        }
        Ok(())
    }

    // === Producers ===

    pub fn push_null(&mut self) {
        self.push(Value::NULL);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push(Value::boolean(value));
    }

    pub fn push_number(&mut self, value: f64) {
        self.push(Value::number(value));
    }

    pub fn push_string(&mut self, value: &str) {
        let handle = self.intern(value);
        self.push(Value::object(handle));
    }

    pub fn push_owned_string(&mut self, value: String) {
        let handle = self.intern_owned(value);
        self.push(Value::object(handle));
    }

    /// Duplicate a window slot onto the top of the stack.
    pub fn push_value(&mut self, index: usize) {
        self.push(self.get_value(index));
    }

    pub fn push_raw(&mut self, value: Value) {
        self.push(value);
    }

    /// Pop the top of the stack and return it.
    pub fn pop_value(&mut self) -> Value {
        self.pop()
    }

    /// Push a fresh empty list and return its handle.
    pub fn push_list(&mut self) -> Handle {
        let list = self.new_list();
        self.push(Value::object(list));
        list
    }

    /// Push a fresh empty map and return its handle.
    pub fn push_map(&mut self) -> Handle {
        let map = self.new_map();
        self.push(Value::object(map));
        map
    }

    pub fn push_range(&mut self, start: f64, end: f64, step: f64) {
        let range = self.new_range(start, end, step);
        self.push(Value::object(range));
    }

    /// Push a host callback as a first-class function value.
    pub fn push_cfunction(&mut self, name: &str, function: NativeFn) {
        let name_handle = self.intern(name);
        let native = self.new_native(NativeKind::Function, name_handle, function);
        self.push(Value::object(native));
    }

    // === Aggregates ===

    /// Push element `item_index` of the list in slot `index`.
    pub fn get_item(&mut self, index: usize, item_index: usize) -> TeaResult<()> {
        let list = self.check_list(index)?;
        let item = match self.heap.get(list) {
            Obj::List(l) => l.items.get(item_index).copied(),
            _ => None,
        };
        match item {
            Some(item) => {
                self.push(item);
                Ok(())
            }
            None => Err(self.error("List index out of bounds")),
        }
    }

    /// Pop the top of the stack into element `item_index` of the list
    /// in slot `index`.
    pub fn set_item(&mut self, index: usize, item_index: usize) -> TeaResult<()> {
        let list = self.check_list(index)?;
        let value = self.pop();
        match self.heap.get_mut(list) {
            Obj::List(l) if item_index < l.items.len() => {
                l.items[item_index] = value;
                Ok(())
            }
            _ => Err(self.error("List index out of bounds")),
        }
    }

    /// Pop the top of the stack and append it to the list in slot
    /// `index`.
    pub fn add_item(&mut self, index: usize) -> TeaResult<()> {
        let list = self.check_list(index)?;
        let value = self.pop();
        if let Obj::List(l) = self.heap.get_mut(list) {
            l.items.push(value);
        }
        Ok(())
    }

    /// Pop a value and a key and insert them into the map in slot
    /// `index`.
    pub fn set_key(&mut self, index: usize) -> TeaResult<()> {
        let map = self.check_map(index)?;
        let value = self.pop();
        let key = self.pop();
        let hash = match self.heap.value_hash(key) {
            Some(hash) => hash,
            None => return Err(self.error("Map key isn't hashable")),
        };
        if let Obj::Map(m) = self.heap.get_mut(map) {
            m.entries.set(key, hash, value);
        }
        Ok(())
    }

    /// Push `container.name` for a map, instance, or module in slot
    /// `index`.
    pub fn get_field(&mut self, index: usize, name: &str) -> TeaResult<()> {
        let container = self.get_value(index);
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);

        let value = if container.is_object() {
            match self.heap.get(container.as_object()) {
                Obj::Map(m) => m.entries.get(Value::object(key), hash),
                Obj::Instance(i) => i.fields.get(key, hash),
                Obj::Module(m) => m.values.get(key, hash),
                _ => None,
            }
        } else {
            None
        };

        match value {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => Err(self.error(format!("Undefined field '{name}'"))),
        }
    }

    /// Pop the top of the stack into `container.name`.
    pub fn set_field(&mut self, index: usize, name: &str) -> TeaResult<()> {
        let container = self.get_value(index);
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);
        let value = self.pop();

        if container.is_object() {
            let stored = match self.heap.get_mut(container.as_object()) {
                Obj::Map(m) => {
                    m.entries.set(Value::object(key), hash, value);
                    true
                }
                Obj::Instance(i) => {
                    i.fields.set(key, hash, value);
                    true
                }
                Obj::Module(m) => {
                    m.values.set(key, hash, value);
                    true
                }
                Obj::Class(c) => {
                    c.statics.set(key, hash, value);
                    true
                }
                _ => false,
            };
            if stored {
                return Ok(());
            }
        }

        let type_name = self.heap.type_name(container);
        Err(self.error(format!("Cannot set field on type {type_name}")))
    }

    // === Control ===

    /// Call the value below `arg_count` arguments on the stack; the
    /// result replaces them.
    pub fn call(&mut self, arg_count: usize) -> TeaResult<()> {
        self.api_call(arg_count)
    }

    /// Hash of a hashable value, `None` otherwise. Exposed for hosts
    /// and tests.
    pub fn hash_value(&self, value: Value) -> Option<u32> {
        self.heap.value_hash(value)
    }

    /// Register a named value into the shared globals table.
    pub fn set_global(&mut self, name: &str) {
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);
        let value = self.pop();
        self.globals.set(key, hash, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmOptions;

    fn double(vm: &mut Vm) -> TeaResult<()> {
        let count = vm.get_top();
        vm.ensure_min_args(count, 1)?;
        let n = vm.check_number(0)?;
        vm.push_number(n * 2.0);
        Ok(())
    }

    #[test]
    fn registered_function_is_callable_from_scripts() {
        let mut vm = Vm::new(VmOptions::default());
        vm.register_function("double", double);
        vm.interpret("test", "var x = double(21)").expect("runs");
        let x = vm.module_export("test", "x").expect("x");
        assert_eq!(x.as_number(), 42.0);
    }

    #[test]
    fn check_raises_standard_message() {
        let mut vm = Vm::new(VmOptions::default());
        vm.register_function("double", double);
        let error = vm
            .interpret("test", "double(\"nope\")")
            .expect_err("type mismatch");
        assert!(error.message().contains("Expected number"), "{error}");
    }

    #[test]
    fn host_call_reenters_the_vm() {
        fn apply(vm: &mut Vm) -> TeaResult<()> {
            // apply(f, x) == f(x)
            vm.push_value(0);
            vm.push_value(1);
            vm.call(1)?;
            Ok(())
        }

        let mut vm = Vm::new(VmOptions::default());
        vm.register_function("apply", apply);
        vm.interpret("test", "var y = apply((n) => n + 1, 41)")
            .expect("runs");
        let y = vm.module_export("test", "y").expect("y");
        assert_eq!(y.as_number(), 42.0);
    }
}
