//! Subscripting and slicing over lists, maps, strings, and ranges.
//!
//! Negative indices count from the end. Slices accept any omitted
//! bound: defaults follow the sign of the step, and bounds are clamped
//! to the valid range of the receiver.

use super::Vm;
use crate::error::TeaResult;
use crate::object::Obj;
use crate::utf;
use crate::value::Value;

/// Normalized slice bounds over a sequence of `len` elements.
fn slice_bounds(len: i64, start: Value, end: Value, step: f64) -> (i64, i64) {
    let step = step as i64;
    let (default_start, default_end) = if step >= 0 { (0, len) } else { (len - 1, -1) };

    let normalize = |value: Value, default: i64, min: i64, max: i64| -> i64 {
        if value.is_null() {
            return default;
        }
        let mut index = value.as_number() as i64;
        if index < 0 {
            index += len;
        }
        index.clamp(min, max)
    };

    if step >= 0 {
        (
            normalize(start, default_start, 0, len),
            normalize(end, default_end, 0, len),
        )
    } else {
        (
            normalize(start, default_start, -1, len - 1),
            normalize(end, default_end, -1, len - 1),
        )
    }
}

fn collect_indices(len: i64, start: Value, end: Value, step: f64) -> Vec<usize> {
    let (start, end) = slice_bounds(len, start, end, step);
    let step = step as i64;
    let mut indices = Vec::new();
    if step > 0 {
        let mut i = start;
        while i < end {
            indices.push(i as usize);
            i += step;
        }
    } else if step < 0 {
        let mut i = start;
        while i > end {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

impl Vm {
    /// `object[index]`: pops both, pushes the element.
    pub(crate) fn subscript(&mut self, index: Value, object: Value) -> TeaResult<()> {
        if object.is_object() {
            match self.heap.get(object.as_object()) {
                Obj::Range(range) => {
                    if !index.is_number() {
                        return Err(self.error("Range index must be a number"));
                    }
                    let (start, end, step) = (range.start, range.end, range.step);
                    let len = (end - start) / step;
                    let mut i = index.as_number();
                    if i < 0.0 {
                        i += len;
                    }
                    if i >= 0.0 && i < len {
                        self.pop();
                        self.pop();
                        self.push(Value::number(start + i * step));
                        return Ok(());
                    }
                    return Err(self.error("Range index out of bounds"));
                }
                Obj::List(list) => {
                    if !index.is_number() {
                        return Err(self.error("List index must be a number"));
                    }
                    let mut i = index.as_number() as i64;
                    if i < 0 {
                        i += list.items.len() as i64;
                    }
                    if i >= 0 && (i as usize) < list.items.len() {
                        let value = list.items[i as usize];
                        self.pop();
                        self.pop();
                        self.push(value);
                        return Ok(());
                    }
                    return Err(self.error("List index out of bounds"));
                }
                Obj::Map(map) => {
                    let hash = match self.heap.value_hash(index) {
                        Some(hash) => hash,
                        None => return Err(self.error("Map key isn't hashable")),
                    };
                    match map.entries.get(index, hash) {
                        Some(value) => {
                            self.pop();
                            self.pop();
                            self.push(value);
                            return Ok(());
                        }
                        None => return Err(self.error("Key does not exist within map")),
                    }
                }
                Obj::String(s) => {
                    if !index.is_number() {
                        let type_name = self.heap.type_name(index);
                        return Err(self.error(format!(
                            "String index must be a number (got {type_name})"
                        )));
                    }
                    let len = utf::char_len(&s.chars) as i64;
                    let mut i = index.as_number() as i64;
                    if i < 0 {
                        i += len;
                    }
                    if i >= 0 && i < len {
                        let offset = utf::char_offset(&s.chars, i as usize);
                        let ch = utf::code_point_at(&s.chars, offset).to_string();
                        let result = self.intern_owned(ch);
                        self.pop();
                        self.pop();
                        self.push(Value::object(result));
                        return Ok(());
                    }
                    return Err(self.error("String index out of bounds"));
                }
                _ => {}
            }
        }

        let type_name = self.heap.type_name(object);
        Err(self.error(format!("{type_name} is not subscriptable")))
    }

    /// `object[index] = item` (assign) or the compound-assignment
    /// prelude that leaves `[object, index, old, item]` on the stack.
    pub(crate) fn subscript_store(
        &mut self,
        item: Value,
        index: Value,
        object: Value,
        assign: bool,
    ) -> TeaResult<()> {
        if object.is_object() {
            match self.heap.get(object.as_object()) {
                Obj::List(list) => {
                    if !index.is_number() {
                        let type_name = self.heap.type_name(index);
                        return Err(
                            self.error(format!("List index must be a number (got {type_name})"))
                        );
                    }
                    let mut i = index.as_number() as i64;
                    if i < 0 {
                        i += list.items.len() as i64;
                    }
                    if i < 0 || i as usize >= list.items.len() {
                        return Err(self.error("List index out of bounds"));
                    }
                    let i = i as usize;
                    if assign {
                        let handle = object.as_object();
                        if let Obj::List(l) = self.heap.get_mut(handle) {
                            l.items[i] = item;
                        }
                        self.pop();
                        self.pop();
                        self.pop();
                        self.push(item);
                    } else {
                        let old = list.items[i];
                        self.set_top(old);
                        self.push(item);
                    }
                    Ok(())
                }
                Obj::Map(map) => {
                    let hash = match self.heap.value_hash(index) {
                        Some(hash) => hash,
                        None => return Err(self.error("Map key isn't hashable")),
                    };
                    if assign {
                        let handle = object.as_object();
                        if let Obj::Map(m) = self.heap.get_mut(handle) {
                            m.entries.set(index, hash, item);
                        }
                        self.pop();
                        self.pop();
                        self.pop();
                        self.push(item);
                        Ok(())
                    } else {
                        match map.entries.get(index, hash) {
                            Some(old) => {
                                self.set_top(old);
                                self.push(item);
                                Ok(())
                            }
                            None => Err(self.error("Key does not exist within the map")),
                        }
                    }
                }
                _ => {
                    let type_name = self.heap.type_name(object);
                    Err(self.error(format!("{type_name} does not support item assignment")))
                }
            }
        } else {
            let type_name = self.heap.type_name(object);
            Err(self.error(format!("{type_name} does not support item assignment")))
        }
    }

    /// `object[start:end:step]`: pops all four, pushes the new
    /// sequence.
    pub(crate) fn slice(
        &mut self,
        object: Value,
        start: Value,
        end: Value,
        step: Value,
    ) -> TeaResult<()> {
        if !step.is_number()
            || (!start.is_number() && !start.is_null())
            || (!end.is_number() && !end.is_null())
        {
            return Err(self.error("Slice index must be a number"));
        }
        let step_n = step.as_number();
        if step_n == 0.0 {
            return Err(self.error("Slice step cannot be zero"));
        }

        if object.is_object() {
            match self.heap.get(object.as_object()) {
                Obj::List(list) => {
                    let indices = collect_indices(list.items.len() as i64, start, end, step_n);
                    let items: Vec<Value> = indices.iter().map(|&i| list.items[i]).collect();
                    let result = self.new_list();
                    if let Obj::List(l) = self.heap.get_mut(result) {
                        l.items = items;
                    }
                    self.stack.truncate(self.stack.len() - 4);
                    self.push(Value::object(result));
                    return Ok(());
                }
                Obj::String(s) => {
                    let chars: Vec<&str> = {
                        let mut parts = Vec::new();
                        let mut offset = 0;
                        while offset < s.chars.len() {
                            let part = utf::code_point_at(&s.chars, offset);
                            offset += part.len();
                            parts.push(part);
                        }
                        parts
                    };
                    let indices = collect_indices(chars.len() as i64, start, end, step_n);
                    let sliced: String = indices.iter().map(|&i| chars[i]).collect();
                    let result = self.intern_owned(sliced);
                    self.stack.truncate(self.stack.len() - 4);
                    self.push(Value::object(result));
                    return Ok(());
                }
                _ => {}
            }
        }

        let type_name = self.heap.type_name(object);
        Err(self.error(format!("{type_name} is not slicable")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_with_positive_step() {
        assert_eq!(slice_bounds(6, Value::number(1.0), Value::number(4.0), 1.0), (1, 4));
        assert_eq!(slice_bounds(6, Value::NULL, Value::number(3.0), 1.0), (0, 3));
        assert_eq!(slice_bounds(6, Value::number(3.0), Value::NULL, 1.0), (3, 6));
        assert_eq!(slice_bounds(6, Value::number(-2.0), Value::NULL, 1.0), (4, 6));
        assert_eq!(slice_bounds(6, Value::number(10.0), Value::NULL, 1.0), (6, 6));
    }

    #[test]
    fn bounds_with_negative_step() {
        assert_eq!(slice_bounds(6, Value::NULL, Value::NULL, -1.0), (5, -1));
    }

    #[test]
    fn collected_indices_reverse() {
        assert_eq!(collect_indices(4, Value::NULL, Value::NULL, -1.0), vec![3, 2, 1, 0]);
        assert_eq!(collect_indices(4, Value::NULL, Value::NULL, 1.0), vec![0, 1, 2, 3]);
        assert_eq!(collect_indices(6, Value::number(1.0), Value::number(4.0), 1.0), vec![1, 2, 3]);
    }
}
