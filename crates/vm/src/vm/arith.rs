//! Operator semantics: arithmetic, comparison, bitwise, membership,
//! and the instance operator-method fallback.
//!
//! Binary operators on instances dispatch to a method named after the
//! operator, invoked with both operands as arguments and the left
//! operand (or the instance operand) as the receiver.

use super::Vm;
use crate::error::TeaResult;
use crate::object::{Handle, Obj};
use crate::value::Value;

impl Vm {
    /// Find the operator method on either operand's class.
    fn operator_method(&mut self, a: Value, b: Value, name: &str) -> TeaResult<Value> {
        let name_handle = self.intern(name);
        let hash = self.heap.string_hash(name_handle);

        let lookup = |vm: &Vm, operand: Value| -> Option<Value> {
            if !vm.is_instance(operand) {
                return None;
            }
            let class = match vm.heap.get(operand.as_object()) {
                Obj::Instance(i) => i.class,
                _ => return None,
            };
            match vm.heap.get(class) {
                Obj::Class(c) => c.methods.get(name_handle, hash),
                _ => None,
            }
        };

        if let Some(method) = lookup(self, a).or_else(|| lookup(self, b)) {
            Ok(method)
        } else {
            Err(self.error(format!("Undefined '{name}' overload")))
        }
    }

    /// Invoke an operator method with the receiver and two arguments
    /// already arranged on the stack.
    pub(crate) fn invoke_operator(&mut self, a: Value, b: Value, name: &str) -> TeaResult<()> {
        let method = self.operator_method(a, b, name)?;
        self.call_value(method, 2)
    }

    /// Rearrange `[a, b]` into `[a, a, b]` and invoke the operator
    /// method with two arguments.
    pub(crate) fn binary_operator_call(&mut self, a: Value, b: Value, name: &str) -> TeaResult<()> {
        let insert_at = self.stack.len() - 1;
        self.stack.insert(insert_at, a);
        self.invoke_operator(a, b, name)
    }

    /// Unary operator on an instance: `[a]` becomes `[a, a, null]` and
    /// the method receives the operand plus a null placeholder.
    pub(crate) fn unary_operator_call(&mut self, a: Value, name: &str) -> TeaResult<()> {
        self.push(a);
        self.push(Value::NULL);
        self.invoke_operator(a, Value::NULL, name)
    }

    fn binary_type_error(&mut self, name: &str, a: Value, b: Value) -> TeaResult<()> {
        let left = self.heap.type_name(a);
        let right = self.heap.type_name(b);
        Err(self.error(format!(
            "Attempt to use {name} operator with {left} and {right}"
        )))
    }

    /// `- / % **` over numbers, with instance fallback.
    pub(crate) fn arithmetic_op(&mut self, name: &str) -> TeaResult<()> {
        let b = self.peek(0);
        let a = self.peek(1);

        if a.is_number() && b.is_number() {
            let (x, y) = (a.as_number(), b.as_number());
            let result = match name {
                "-" => x - y,
                "/" => x / y,
                "%" => x % y,
                "**" => x.powf(y),
                _ => unreachable!("unknown arithmetic operator"),
            };
            self.pop();
            self.pop();
            self.push(Value::number(result));
            return Ok(());
        }

        if self.is_instance(a) || self.is_instance(b) {
            return self.binary_operator_call(a, b, name);
        }

        self.binary_type_error(name, a, b)
    }

    /// `+`: numbers add; strings concatenate; lists and maps combine
    /// into fresh aggregates; instances dispatch.
    pub(crate) fn add_op(&mut self) -> TeaResult<()> {
        let b = self.peek(0);
        let a = self.peek(1);

        if a.is_number() && b.is_number() {
            self.pop();
            self.pop();
            self.push(Value::number(a.as_number() + b.as_number()));
            return Ok(());
        }

        if a.is_object() && b.is_object() {
            let (ha, hb) = (a.as_object(), b.as_object());
            match (self.heap.get(ha), self.heap.get(hb)) {
                (Obj::String(x), Obj::String(y)) => {
                    let mut combined = String::with_capacity(x.len() + y.len());
                    combined.push_str(&x.chars);
                    combined.push_str(&y.chars);
                    let result = self.intern_owned(combined);
                    self.pop();
                    self.pop();
                    self.push(Value::object(result));
                    return Ok(());
                }
                (Obj::List(x), Obj::List(y)) => {
                    let mut items = x.items.clone();
                    items.extend_from_slice(&y.items);
                    let result = self.new_list();
                    if let Obj::List(l) = self.heap.get_mut(result) {
                        l.items = items;
                    }
                    self.pop();
                    self.pop();
                    self.push(Value::object(result));
                    return Ok(());
                }
                (Obj::Map(_), Obj::Map(_)) => {
                    let result = self.new_map();
                    let merged = match (self.heap.get(ha), self.heap.get(hb)) {
                        (Obj::Map(x), Obj::Map(y)) => {
                            let mut merged = crate::map::ValueMap::new();
                            merged.add_all(&x.entries);
                            merged.add_all(&y.entries);
                            merged
                        }
                        _ => unreachable!("checked above"),
                    };
                    if let Obj::Map(m) = self.heap.get_mut(result) {
                        m.entries = merged;
                    }
                    self.pop();
                    self.pop();
                    self.push(Value::object(result));
                    return Ok(());
                }
                _ => {}
            }
        }

        if self.is_instance(a) || self.is_instance(b) {
            return self.binary_operator_call(a, b, "+");
        }

        self.binary_type_error("+", a, b)
    }

    /// `*`: numbers multiply; string-by-integer repeats.
    pub(crate) fn multiply_op(&mut self) -> TeaResult<()> {
        let b = self.peek(0);
        let a = self.peek(1);

        if a.is_number() && b.is_number() {
            self.pop();
            self.pop();
            self.push(Value::number(a.as_number() * b.as_number()));
            return Ok(());
        }

        let repeat = |vm: &Vm, s: Value, n: Value| -> Option<(Handle, i64)> {
            if !s.is_object() || !n.is_number() {
                return None;
            }
            match vm.heap.get(s.as_object()) {
                Obj::String(_) => Some((s.as_object(), n.as_number() as i64)),
                _ => None,
            }
        };

        if let Some((string, count)) = repeat(self, a, b).or_else(|| repeat(self, b, a)) {
            let result = if count <= 0 {
                self.intern("")
            } else if count == 1 {
                string
            } else {
                let repeated = self.heap.string_chars(string).repeat(count as usize);
                self.intern_owned(repeated)
            };
            self.pop();
            self.pop();
            self.push(Value::object(result));
            return Ok(());
        }

        if self.is_instance(a) || self.is_instance(b) {
            return self.binary_operator_call(a, b, "*");
        }

        self.binary_type_error("*", a, b)
    }

    /// `< <= > >=` over numbers, with instance fallback.
    pub(crate) fn comparison_op(&mut self, name: &str) -> TeaResult<()> {
        let b = self.peek(0);
        let a = self.peek(1);

        if a.is_number() && b.is_number() {
            let (x, y) = (a.as_number(), b.as_number());
            let result = match name {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                ">=" => x >= y,
                _ => unreachable!("unknown comparison operator"),
            };
            self.pop();
            self.pop();
            self.push(Value::boolean(result));
            return Ok(());
        }

        if self.is_instance(a) || self.is_instance(b) {
            return self.binary_operator_call(a, b, name);
        }

        self.binary_type_error(name, a, b)
    }

    /// `& | ^ << >>` over integers, with instance fallback.
    pub(crate) fn bitwise_op(&mut self, name: &str) -> TeaResult<()> {
        let b = self.peek(0);
        let a = self.peek(1);

        if a.is_number() && b.is_number() {
            let (x, y) = (a.as_number() as i32, b.as_number() as i32);
            let result = match name {
                "&" => x & y,
                "|" => x | y,
                "^" => x ^ y,
                "<<" => x.wrapping_shl(y as u32),
                ">>" => x.wrapping_shr(y as u32),
                _ => unreachable!("unknown bitwise operator"),
            };
            self.pop();
            self.pop();
            self.push(Value::number(result as f64));
            return Ok(());
        }

        if self.is_instance(a) || self.is_instance(b) {
            return self.binary_operator_call(a, b, name);
        }

        self.binary_type_error(name, a, b)
    }

    /// `in`: substring for strings, numeric containment for ranges,
    /// element equality for lists, key presence for maps.
    pub(crate) fn contains(&mut self, object: Value, value: Value) -> TeaResult<()> {
        if object.is_object() {
            let result = match self.heap.get(object.as_object()) {
                Obj::String(s) => {
                    if !value.is_object() {
                        Some(false)
                    } else {
                        match self.heap.get(value.as_object()) {
                            Obj::String(sub) => Some(s.chars.contains(&sub.chars)),
                            _ => Some(false),
                        }
                    }
                }
                Obj::Range(r) => {
                    // Bounds only. `Range.contains()` additionally
                    // requires step alignment; the two differ on
                    // purpose.
                    if !value.is_number() {
                        Some(false)
                    } else {
                        let n = value.as_number();
                        Some(n >= r.start && n <= r.end)
                    }
                }
                Obj::List(l) => {
                    let items = l.items.clone();
                    Some(items.iter().any(|&item| self.heap.values_equal(item, value)))
                }
                Obj::Map(m) => match self.heap.value_hash(value) {
                    Some(hash) => Some(m.entries.contains(value, hash)),
                    None => Some(false),
                },
                _ => None,
            };

            if let Some(found) = result {
                self.pop();
                self.pop();
                self.push(Value::boolean(found));
                return Ok(());
            }
        }

        let type_name = self.heap.type_name(object);
        Err(self.error(format!("{type_name} is not an iterable")))
    }
}
