//! Property access: fields, methods, statics, map keys, module
//! exports, and the builtin classes behind primitive values.

use super::Vm;
use crate::error::TeaResult;
use crate::object::{Handle, NativeKind, Obj};
use crate::value::Value;

impl Vm {
    /// Bind `class.methods[name]` to the receiver on top of the stack.
    pub(crate) fn bind_method(&mut self, class: Handle, name: Handle) -> TeaResult<()> {
        let hash = self.heap.string_hash(name);
        let method = match self.heap.get(class) {
            Obj::Class(c) => c.methods.get(name, hash),
            _ => None,
        };
        let method = match method {
            Some(method) => method,
            None => {
                return Err(self.error(format!(
                    "Undefined property '{}'",
                    self.heap.string_chars(name)
                )))
            }
        };

        let receiver = self.peek(0);
        let bound = self.new_bound_method(receiver, method);
        self.pop();
        self.push(Value::object(bound));
        Ok(())
    }

    /// Read `receiver.name`, leaving the result on the stack. With
    /// `do_pop` false the receiver stays beneath it for compound
    /// assignment. Resolution order on instances: fields, then bound
    /// methods, then statics up the superclass chain.
    pub(crate) fn get_property(
        &mut self,
        receiver: Value,
        name: Handle,
        do_pop: bool,
    ) -> TeaResult<()> {
        if !receiver.is_object() {
            return Err(self.error("Only objects have properties"));
        }

        let hash = self.heap.string_hash(name);
        let handle = receiver.as_object();

        enum Found {
            Value(Value),
            Bind(Handle),
            /// A native property: invoked on read.
            Property(Handle),
            Builtin,
            InstanceMissing(Handle),
        }

        let found = match self.heap.get(handle) {
            Obj::Instance(instance) => {
                if let Some(value) = instance.fields.get(name, hash) {
                    Found::Value(value)
                } else {
                    let class = instance.class;
                    let method = match self.heap.get(class) {
                        Obj::Class(c) => c.methods.get(name, hash),
                        _ => None,
                    };
                    let property = method.filter(|m| {
                        m.is_object()
                            && matches!(
                                self.heap.get(m.as_object()),
                                Obj::Native(n) if n.kind == NativeKind::Property
                            )
                    });
                    if let Some(property) = property {
                        Found::Property(property.as_object())
                    } else if method.is_some() {
                        Found::Bind(class)
                    } else {
                        // Statics up the superclass chain.
                        let mut found = Found::InstanceMissing(class);
                        let mut current = Some(class);
                        while let Some(class_handle) = current {
                            match self.heap.get(class_handle) {
                                Obj::Class(c) => {
                                    if let Some(value) = c.statics.get(name, hash) {
                                        found = Found::Value(value);
                                        break;
                                    }
                                    current = c.superclass;
                                }
                                _ => break,
                            }
                        }
                        found
                    }
                }
            }
            Obj::Class(_) => {
                let mut found: Option<Value> = None;
                let mut current = Some(handle);
                while let Some(class_handle) = current {
                    match self.heap.get(class_handle) {
                        Obj::Class(c) => {
                            if let Some(value) = c
                                .statics
                                .get(name, hash)
                                .or_else(|| c.methods.get(name, hash))
                            {
                                found = Some(value);
                                break;
                            }
                            current = c.superclass;
                        }
                        _ => break,
                    }
                }
                match found {
                    Some(value) => Found::Value(value),
                    None => {
                        let class_name = match self.heap.get(handle) {
                            Obj::Class(c) => self.heap.string_chars(c.name).to_string(),
                            _ => String::new(),
                        };
                        return Err(self.error(format!(
                            "'{}' class has no property: '{}'",
                            class_name,
                            self.heap.string_chars(name)
                        )));
                    }
                }
            }
            Obj::Module(module) => match module.values.get(name, hash) {
                Some(value) => Found::Value(value),
                None => {
                    let module_name = self.heap.string_chars(module.name).to_string();
                    return Err(self.error(format!(
                        "'{}' module has no property: '{}'",
                        module_name,
                        self.heap.string_chars(name)
                    )));
                }
            },
            Obj::Map(map) => match map.entries.get(Value::object(name), hash) {
                Some(value) => Found::Value(value),
                None => Found::Builtin,
            },
            _ => Found::Builtin,
        };

        match found {
            Found::Value(value) => {
                if do_pop {
                    self.pop();
                }
                self.push(value);
                Ok(())
            }
            Found::Bind(class) => {
                if do_pop {
                    self.bind_method(class, name)
                } else {
                    // Keep the receiver under the bound method.
                    let receiver = self.peek(0);
                    self.push(receiver);
                    self.bind_method(class, name)
                }
            }
            Found::Property(native) => self.call_native_property(native),
            Found::InstanceMissing(class) => {
                let class_name = match self.heap.get(class) {
                    Obj::Class(c) => self.heap.string_chars(c.name).to_string(),
                    _ => String::new(),
                };
                Err(self.error(format!(
                    "'{}' instance has no property: '{}'",
                    class_name,
                    self.heap.string_chars(name)
                )))
            }
            Found::Builtin => self.get_builtin_property(receiver, name, hash),
        }
    }

    /// Methods and properties provided by the builtin class for a
    /// primitive value. Native properties invoke on read; native
    /// methods bind to their receiver.
    fn get_builtin_property(&mut self, receiver: Value, name: Handle, hash: u32) -> TeaResult<()> {
        let class = self.class_of(receiver);
        let member = class.and_then(|class| match self.heap.get(class) {
            Obj::Class(c) => c.methods.get(name, hash),
            _ => None,
        });

        if let Some(member) = member {
            let is_property = member.is_object()
                && matches!(
                    self.heap.get(member.as_object()),
                    Obj::Native(n) if n.kind == NativeKind::Property
                );
            if is_property {
                return self.call_native_property(member.as_object());
            }
            let bound = self.new_bound_method(receiver, member);
            self.pop();
            self.push(Value::object(bound));
            return Ok(());
        }

        let type_name = self.heap.type_name(receiver);
        Err(self.error(format!(
            "{type_name} has no property '{}'",
            self.heap.string_chars(name)
        )))
    }

    /// Store `receiver.name = item`, leaving the value on the stack.
    pub(crate) fn set_property(
        &mut self,
        name: Handle,
        receiver: Value,
        item: Value,
    ) -> TeaResult<()> {
        if !receiver.is_object() {
            let type_name = self.heap.type_name(receiver);
            return Err(self.error(format!("Cannot set property on type {type_name}")));
        }

        let hash = self.heap.string_hash(name);
        let handle = receiver.as_object();
        let stored = match self.heap.get_mut(handle) {
            Obj::Instance(instance) => {
                instance.fields.set(name, hash, item);
                true
            }
            Obj::Class(class) => {
                class.statics.set(name, hash, item);
                true
            }
            Obj::Map(map) => {
                map.entries.set(Value::object(name), hash, item);
                true
            }
            Obj::Module(module) => {
                module.values.set(name, hash, item);
                true
            }
            _ => false,
        };

        if !stored {
            let type_name = self.heap.type_name(receiver);
            return Err(self.error(format!("Cannot set property on type {type_name}")));
        }

        self.pop();
        self.pop();
        self.push(item);
        Ok(())
    }
}
