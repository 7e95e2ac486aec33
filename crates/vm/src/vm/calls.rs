//! Call machinery: closures, natives, bound methods, classes, and the
//! variadic/default adjustment at the call boundary.

use std::rc::Rc;

use super::{CallFrame, Vm};
use crate::error::TeaResult;
use crate::limits::MAX_FRAMES;
use crate::object::{Handle, NativeFn, NativeKind, Obj};
use crate::value::Value;

enum Callee {
    Bound(Value, Value),
    Class(Handle, Value),
    Closure(Handle),
    Native(Handle),
    NotCallable,
}

impl Vm {
    /// Dispatch a call on `callee` with `arg_count` arguments already
    /// on the stack above it.
    pub(crate) fn call_value(&mut self, callee: Value, arg_count: usize) -> TeaResult<()> {
        let kind = if callee.is_object() {
            match self.heap.get(callee.as_object()) {
                Obj::BoundMethod(b) => Callee::Bound(b.receiver, b.method),
                Obj::Class(c) => Callee::Class(callee.as_object(), c.constructor),
                Obj::Closure(_) => Callee::Closure(callee.as_object()),
                Obj::Native(n) if n.kind != NativeKind::Property => {
                    Callee::Native(callee.as_object())
                }
                _ => Callee::NotCallable,
            }
        } else {
            Callee::NotCallable
        };

        match kind {
            Callee::Bound(receiver, method) => {
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = receiver;
                self.call_value(method, arg_count)
            }
            Callee::Class(class, constructor) => {
                let instance = self.new_instance(class);
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = Value::object(instance);
                if !constructor.is_null() {
                    return self.call_value(constructor, arg_count);
                }
                if arg_count != 0 {
                    return Err(self.error(format!("Expected 0 arguments but got {arg_count}")));
                }
                Ok(())
            }
            Callee::Closure(closure) => self.call_closure(closure, arg_count),
            Callee::Native(native) => self.call_native(native, arg_count),
            Callee::NotCallable => {
                let type_name = self.heap.type_name(callee);
                Err(self.error(format!("{type_name} is not callable")))
            }
        }
    }

    /// Push a frame for `closure`, adjusting arguments for arity,
    /// defaults, and the variadic tail.
    pub(crate) fn call_closure(&mut self, closure: Handle, arg_count: usize) -> TeaResult<()> {
        let function = self.function_of_closure(closure);
        let (arity, optional, variadic, max_slots, chunk, module) = match self.heap.get(function) {
            Obj::Function(f) => (
                f.arity as usize,
                f.arity_optional as usize,
                f.is_variadic(),
                f.max_slots,
                Rc::clone(&f.chunk),
                f.module,
            ),
            _ => unreachable!("closure without function"),
        };

        let mut arg_count = arg_count;
        if variadic {
            // The declared arity includes the variadic parameter.
            let positional = arity - 1;
            let fixed = positional + optional;
            if arg_count < positional {
                return Err(self.error(format!(
                    "Expected {arity} arguments, but got {arg_count}"
                )));
            }
            if arg_count > fixed {
                // Pack the surplus tail into a list.
                let surplus = arg_count - fixed;
                let list = self.new_list();
                self.push(Value::object(list));
                for distance in (1..=surplus).rev() {
                    let item = self.peek(distance);
                    if let Obj::List(l) = self.heap.get_mut(list) {
                        l.items.push(item);
                    }
                }
                self.stack.truncate(self.stack.len() - surplus - 1);
                self.push(Value::object(list));
                arg_count = fixed + 1;
            } else {
                // The variadic parameter receives an empty list; the
                // default shuffle keeps it in the last slot.
                let list = self.new_list();
                self.push(Value::object(list));
                arg_count += 1;
            }
        } else if arg_count < arity {
            return Err(self.error(format!(
                "Expected {arity} arguments, but got {arg_count}"
            )));
        } else if arg_count > arity + optional {
            return Err(self.error(format!(
                "Expected {} arguments, but got {arg_count}",
                arity + optional
            )));
        }

        if self.frames.len() == MAX_FRAMES {
            return Err(self.error("Stack overflow"));
        }

        self.stack.reserve(max_slots);
        let base = self.stack.len() - arg_count - 1;
        self.frames.push(CallFrame {
            closure,
            chunk,
            module,
            ip: 0,
            base,
        });
        Ok(())
    }

    /// Run a native callback over a slot window into the value stack.
    pub(crate) fn call_native(&mut self, native: Handle, arg_count: usize) -> TeaResult<()> {
        let (kind, function): (NativeKind, NativeFn) = match self.heap.get(native) {
            Obj::Native(n) => (n.kind, n.function),
            _ => unreachable!("expected native"),
        };

        let callee_slot = self.stack.len() - arg_count - 1;
        let window_base = match kind {
            NativeKind::Function => callee_slot + 1,
            NativeKind::Method | NativeKind::Property => callee_slot,
        };

        self.windows.push(window_base);
        let outcome = function(self);
        self.windows.pop();
        outcome?;

        let result = self.pop();
        self.stack.truncate(callee_slot);
        self.push(result);
        Ok(())
    }

    /// Invoke a native property getter: the receiver sits on top of
    /// the stack and is replaced by the property value.
    pub(crate) fn call_native_property(&mut self, native: Handle) -> TeaResult<()> {
        let function = match self.heap.get(native) {
            Obj::Native(n) => n.function,
            _ => unreachable!("expected native"),
        };

        let receiver_slot = self.stack.len() - 1;
        self.windows.push(receiver_slot);
        let outcome = function(self);
        self.windows.pop();
        outcome?;

        let result = self.pop();
        self.stack.truncate(receiver_slot);
        self.push(result);
        Ok(())
    }

    /// Host-facing call: callee and `arg_count` arguments are on top
    /// of the stack; on return the single result replaces them.
    pub(crate) fn api_call(&mut self, arg_count: usize) -> TeaResult<()> {
        let depth = self.frames.len();
        let callee = self.peek(arg_count);
        self.call_value(callee, arg_count)?;
        if self.frames.len() > depth {
            self.run(depth)?;
        }
        Ok(())
    }

    // === Method invocation ===

    pub(crate) fn invoke(
        &mut self,
        receiver: Value,
        name: Handle,
        arg_count: usize,
    ) -> TeaResult<()> {
        if !receiver.is_object() {
            // Primitive receivers dispatch through their builtin class.
            return self.invoke_on_builtin(receiver, name, arg_count);
        }

        let hash = self.heap.string_hash(name);
        enum Target {
            Call(Value),
            Field(Value),
            Module(Option<Value>, Handle),
            ClassStatic(Option<Value>, Handle),
            Builtin,
        }

        let target = match self.heap.get(receiver.as_object()) {
            Obj::Module(m) => Target::Module(m.values.get(name, hash), m.name),
            Obj::Instance(i) => {
                if let Some(field) = i.fields.get(name, hash) {
                    Target::Field(field)
                } else {
                    let method = match self.heap.get(i.class) {
                        Obj::Class(c) => c.methods.get(name, hash),
                        _ => None,
                    };
                    match method {
                        Some(method) => Target::Call(method),
                        None => {
                            return Err(self.error(format!(
                                "Undefined property '{}'",
                                self.heap.string_chars(name)
                            )))
                        }
                    }
                }
            }
            Obj::Class(c) => Target::ClassStatic(c.methods.get(name, hash), receiver.as_object()),
            _ => Target::Builtin,
        };

        match target {
            Target::Call(method) => self.call_value(method, arg_count),
            Target::Field(field) => {
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = field;
                self.call_value(field, arg_count)
            }
            Target::Module(value, module_name) => match value {
                Some(value) => self.call_value(value, arg_count),
                None => Err(self.error(format!(
                    "Undefined property '{}' in '{}' module",
                    self.heap.string_chars(name),
                    self.heap.string_chars(module_name)
                ))),
            },
            Target::ClassStatic(method, _class) => match method {
                Some(method) => {
                    let is_static = match method.is_object() {
                        true => match self.heap.get(method.as_object()) {
                            Obj::Closure(c) => {
                                self.function_kind(c.function)
                                    == crate::object::FunctionKind::Static
                            }
                            _ => false,
                        },
                        false => false,
                    };
                    if !is_static {
                        return Err(self.error(format!(
                            "'{}' is not static. Only static methods can be invoked directly from a class",
                            self.heap.string_chars(name)
                        )));
                    }
                    self.call_value(method, arg_count)
                }
                None => Err(self.error(format!(
                    "Undefined property '{}'",
                    self.heap.string_chars(name)
                ))),
            },
            Target::Builtin => self.invoke_on_builtin(receiver, name, arg_count),
        }
    }

    fn invoke_on_builtin(
        &mut self,
        receiver: Value,
        name: Handle,
        arg_count: usize,
    ) -> TeaResult<()> {
        let hash = self.heap.string_hash(name);
        let class = self.class_of(receiver);
        let method = class.and_then(|class| match self.heap.get(class) {
            Obj::Class(c) => c.methods.get(name, hash),
            _ => None,
        });
        match method {
            Some(method) => self.call_value(method, arg_count),
            None => {
                let type_name = self.heap.type_name(receiver);
                Err(self.error(format!(
                    "{type_name} has no method {}()",
                    self.heap.string_chars(name)
                )))
            }
        }
    }

    pub(crate) fn invoke_from_class(
        &mut self,
        class: Handle,
        name: Handle,
        arg_count: usize,
    ) -> TeaResult<()> {
        let hash = self.heap.string_hash(name);
        let method = match self.heap.get(class) {
            Obj::Class(c) => c.methods.get(name, hash),
            _ => None,
        };
        match method {
            Some(method) => self.call_value(method, arg_count),
            None => Err(self.error(format!(
                "Undefined property '{}'",
                self.heap.string_chars(name)
            ))),
        }
    }
}
