//! The bytecode executor.
//!
//! One call frame per active function; a dense-`match` dispatch loop
//! reads one opcode at a time. Frame-local `ip`/`base` are cached in
//! locals and written back to the frame around anything that can push a
//! frame or raise, so stack traces and the GC always see a consistent
//! frame array.

mod arith;
mod calls;
mod imports;
mod index;
mod property;

use std::rc::Rc;

use log::trace;

use crate::builtins::{self, BuiltinClasses};
use crate::chunk::Chunk;
use crate::compiler;
use crate::error::{TeaError, TeaResult};
use crate::gc::{fnv1a, Heap};
use crate::modules::NativeModules;
use crate::object::{
    FunctionFlags, FunctionKind, Handle, NativeFn, NativeKind, Obj, ObjBoundMethod, ObjClass,
    ObjClosure, ObjFile, ObjInstance, ObjList, ObjMap, ObjModule, ObjNative, ObjRange, ObjString,
    ObjUpvalue,
};
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::Value;

/// Host-tunable engine options.
#[derive(Debug, Clone, Default)]
pub struct VmOptions {
    /// Collect before every allocation.
    pub gc_stress: bool,
    /// Print the value of expression statements at module scope.
    pub repl: bool,
    /// Arguments exposed to scripts by the host.
    pub argv: Vec<String>,
}

/// One activation record.
pub(crate) struct CallFrame {
    pub(crate) closure: Handle,
    pub(crate) chunk: Rc<Chunk>,
    pub(crate) module: Handle,
    pub(crate) ip: usize,
    pub(crate) base: usize,
}

/// The engine: heap, stacks, tables, and everything the GC must see.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    /// Open upvalues, sorted by stack slot descending.
    pub(crate) open_upvalues: Vec<Handle>,
    pub(crate) globals: Table,
    /// Names declared `const` at module scope.
    pub(crate) constants: Table,
    pub(crate) modules: Table,
    pub(crate) last_module: Option<Handle>,
    pub(crate) builtin_classes: Option<BuiltinClasses>,
    pub(crate) native_modules: NativeModules,
    pub(crate) constructor_string: Handle,
    /// Native slot-window bases, innermost last.
    pub(crate) windows: Vec<usize>,
    pub(crate) options: VmOptions,
}

impl Vm {
    /// Create an engine with the core classes and globals registered.
    pub fn new(options: VmOptions) -> Vm {
        let mut heap = Heap::new();
        let constructor_string = {
            let hash = fnv1a(b"constructor");
            let handle = heap.alloc(Obj::String(ObjString {
                chars: "constructor".to_string(),
                hash,
            }));
            heap.intern_record(handle, hash);
            handle
        };

        let mut vm = Vm {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            open_upvalues: Vec::new(),
            globals: Table::new(),
            constants: Table::new(),
            modules: Table::new(),
            last_module: None,
            builtin_classes: None,
            native_modules: NativeModules::new(),
            constructor_string,
            windows: Vec::new(),
            options: VmOptions::default(),
        };

        builtins::open(&mut vm);
        crate::modules::open(&mut vm);

        // Stress mode only after bootstrap: the setup above allocates
        // before every root is in place.
        vm.heap.gc_stress = options.gc_stress;
        vm.options = options;
        vm
    }

    // === Allocation and interning ===

    /// Allocate, collecting first when the threshold says so.
    pub(crate) fn alloc(&mut self, obj: Obj) -> Handle {
        if self.heap.wants_collection(obj.size_hint()) {
            // The object being allocated has no handle yet; its
            // components must already be protected by the caller.
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    /// Intern by copy.
    pub fn intern(&mut self, chars: &str) -> Handle {
        let hash = fnv1a(chars.as_bytes());
        if let Some(existing) = self.heap.find_interned(chars, hash) {
            return existing;
        }
        let handle = self.alloc(Obj::String(ObjString {
            chars: chars.to_string(),
            hash,
        }));
        self.heap.intern_record(handle, hash);
        handle
    }

    /// Intern taking ownership of the buffer.
    pub fn intern_owned(&mut self, chars: String) -> Handle {
        let hash = fnv1a(chars.as_bytes());
        if let Some(existing) = self.heap.find_interned(&chars, hash) {
            return existing;
        }
        let handle = self.alloc(Obj::String(ObjString { chars, hash }));
        self.heap.intern_record(handle, hash);
        handle
    }

    pub(crate) fn new_list(&mut self) -> Handle {
        self.alloc(Obj::List(ObjList::default()))
    }

    pub(crate) fn new_map(&mut self) -> Handle {
        self.alloc(Obj::Map(ObjMap::default()))
    }

    pub(crate) fn new_range(&mut self, start: f64, end: f64, step: f64) -> Handle {
        self.alloc(Obj::Range(ObjRange { start, end, step }))
    }

    pub(crate) fn new_closure(&mut self, function: Handle) -> Handle {
        self.heap.protect.push(Value::object(function));
        let closure = self.alloc(Obj::Closure(ObjClosure {
            function,
            upvalues: Vec::new(),
        }));
        self.heap.protect.pop();
        closure
    }

    pub(crate) fn new_instance(&mut self, class: Handle) -> Handle {
        self.heap.protect.push(Value::object(class));
        let instance = self.alloc(Obj::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }));
        self.heap.protect.pop();
        instance
    }

    pub(crate) fn new_bound_method(&mut self, receiver: Value, method: Value) -> Handle {
        self.heap.protect.push(receiver);
        self.heap.protect.push(method);
        let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod { receiver, method }));
        self.heap.protect.truncate(self.heap.protect.len() - 2);
        bound
    }

    pub(crate) fn new_class(&mut self, name: Handle) -> Handle {
        self.heap.protect.push(Value::object(name));
        let class = self.alloc(Obj::Class(ObjClass {
            name,
            superclass: None,
            constructor: Value::NULL,
            statics: Table::new(),
            methods: Table::new(),
        }));
        self.heap.protect.pop();
        class
    }

    pub(crate) fn new_native(&mut self, kind: NativeKind, name: Handle, function: NativeFn) -> Handle {
        self.heap.protect.push(Value::object(name));
        let native = self.alloc(Obj::Native(ObjNative {
            kind,
            name,
            function,
        }));
        self.heap.protect.pop();
        native
    }

    pub(crate) fn new_file(&mut self, file: std::fs::File, path: Handle, mode: Handle) -> Handle {
        self.heap.protect.push(Value::object(path));
        self.heap.protect.push(Value::object(mode));
        let handle = self.alloc(Obj::File(ObjFile {
            file: Some(file),
            path,
            mode,
            is_open: true,
        }));
        self.heap.protect.truncate(self.heap.protect.len() - 2);
        handle
    }

    /// Create (or return the cached) module for `name`, registering it
    /// in the modules table.
    pub(crate) fn new_module(&mut self, name: Handle) -> Handle {
        let hash = self.heap.string_hash(name);
        if let Some(existing) = self.modules.get(name, hash) {
            return existing.as_object();
        }
        self.heap.protect.push(Value::object(name));
        let module = self.alloc(Obj::Module(ObjModule {
            name,
            path: name,
            values: Table::new(),
        }));
        self.heap.protect.pop();
        self.modules.set(name, hash, Value::object(module));
        module
    }

    // === Garbage collection ===

    /// Run one full mark-and-sweep cycle over every root the engine
    /// knows about.
    pub fn collect_garbage(&mut self) {
        for i in 0..self.stack.len() {
            let value = self.stack[i];
            self.heap.mark_value(value);
        }
        for i in 0..self.frames.len() {
            let closure = self.frames[i].closure;
            self.heap.mark_object(closure);
        }
        for i in 0..self.open_upvalues.len() {
            let upvalue = self.open_upvalues[i];
            self.heap.mark_object(upvalue);
        }

        let globals = std::mem::take(&mut self.globals);
        self.heap.mark_table(&globals);
        self.globals = globals;
        let constants = std::mem::take(&mut self.constants);
        self.heap.mark_table(&constants);
        self.constants = constants;
        let modules = std::mem::take(&mut self.modules);
        self.heap.mark_table(&modules);
        self.modules = modules;

        if let Some(module) = self.last_module {
            self.heap.mark_object(module);
        }
        if let Some(classes) = self.builtin_classes {
            for class in classes.all() {
                self.heap.mark_object(class);
            }
        }
        self.heap.mark_object(self.constructor_string);

        // Compiler scratch state and half-constructed objects.
        self.heap.mark_protected();

        self.heap.trace();
        self.heap.sweep();
    }

    // === Value stack ===

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::NULL)
    }

    #[inline]
    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    #[inline]
    pub(crate) fn set_top(&mut self, value: Value) {
        let top = self.stack.len() - 1;
        self.stack[top] = value;
    }

    // === Upvalues ===

    /// Find or create the open upvalue for an absolute stack slot.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> Handle {
        // The list is sorted by slot descending; stop at the first
        // entry at or below the target.
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let handle = self.open_upvalues[index];
            match self.heap.get(handle) {
                Obj::Upvalue(ObjUpvalue::Open(existing)) => {
                    if *existing == slot {
                        return handle;
                    }
                    if *existing < slot {
                        break;
                    }
                }
                _ => unreachable!("closed upvalue in open list"),
            }
            index += 1;
        }

        let created = self.alloc(Obj::Upvalue(ObjUpvalue::Open(slot)));
        self.open_upvalues.insert(index, created);
        created
    }

    /// Close every open upvalue at or above `threshold`.
    pub(crate) fn close_upvalues(&mut self, threshold: usize) {
        while let Some(&handle) = self.open_upvalues.first() {
            let slot = match self.heap.get(handle) {
                Obj::Upvalue(ObjUpvalue::Open(slot)) => *slot,
                _ => unreachable!("closed upvalue in open list"),
            };
            if slot < threshold {
                break;
            }
            let value = self.stack[slot];
            *self.heap.get_mut(handle) = Obj::Upvalue(ObjUpvalue::Closed(value));
            self.open_upvalues.remove(0);
        }
    }

    // === Errors ===

    /// Format a runtime error with a stack trace. Native callbacks
    /// raise through this as well; the nearest protected call resets
    /// the engine.
    pub fn error(&self, message: impl Into<String>) -> TeaError {
        let mut trace = String::new();
        for frame in self.frames.iter().rev() {
            let line = frame.chunk.line_for(frame.ip.saturating_sub(1));
            let function = match self.heap.get(frame.closure) {
                Obj::Closure(c) => c.function,
                _ => unreachable!("frame without closure"),
            };
            let (name, kind) = match self.heap.get(function) {
                Obj::Function(f) => (f.name, f.kind),
                _ => unreachable!("closure without function"),
            };
            match name {
                Some(name) => trace.push_str(&format!(
                    "[line {}] in {}()\n",
                    line,
                    self.heap.string_chars(name)
                )),
                None if kind == FunctionKind::Script => {
                    trace.push_str(&format!("[line {line}] in script\n"))
                }
                None => trace.push_str(&format!("[line {line}] in anonymous()\n")),
            }
        }
        TeaError::runtime(message.into(), trace.trim_end().to_string())
    }

    /// Reset execution state after a runtime error escaped to the
    /// protected boundary.
    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        self.windows.clear();
        self.heap.protect.clear();
    }

    // === Entry points ===

    /// Compile and run `source` as the module named `module_name`.
    /// Returns the script's result value (usually `null`).
    pub fn interpret(&mut self, module_name: &str, source: &str) -> TeaResult<Value> {
        let name = self.intern(module_name);
        let module = self.new_module(name);

        let dir = std::path::Path::new(module_name)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let path = self.intern(&dir);
        if let Obj::Module(m) = self.heap.get_mut(module) {
            m.path = path;
        }

        let function = compiler::compile(self, source, module)?;

        self.heap.protect.push(Value::object(function));
        let closure = self.new_closure(function);
        self.heap.protect.pop();

        self.push(Value::object(closure));
        let result = self
            .call_closure(closure, 0)
            .and_then(|()| self.run(0))
            .map(|()| self.pop());

        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                self.reset();
                Err(error)
            }
        }
    }

    /// Read an exported value from a loaded module.
    pub fn module_export(&mut self, module_name: &str, name: &str) -> Option<Value> {
        let module_key = self.intern(module_name);
        let module_hash = self.heap.string_hash(module_key);
        let module = self.modules.get(module_key, module_hash)?.as_object();
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);
        match self.heap.get(module) {
            Obj::Module(m) => m.values.get(key, hash),
            _ => None,
        }
    }

    /// Read a global registered by the host or builtins.
    pub fn global(&mut self, name: &str) -> Option<Value> {
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);
        self.globals.get(key, hash)
    }

    /// Render a value the way `print` would.
    pub fn to_display_string(&self, value: Value) -> String {
        self.heap.value_to_string(value)
    }

    /// Structural equality over values, exposed for hosts and tests.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        self.heap.values_equal(a, b)
    }

    /// Heap statistics: live object count and allocated byte estimate.
    pub fn gc_stats(&self) -> (usize, usize) {
        (self.heap.live_objects(), self.heap.bytes_allocated())
    }

    // === Dispatch ===

    /// Execute until the frame stack shrinks back to `exit_depth`.
    pub(crate) fn run(&mut self, exit_depth: usize) -> TeaResult<()> {
        let mut frame = self.frames.len() - 1;
        let mut chunk = Rc::clone(&self.frames[frame].chunk);
        let mut ip = self.frames[frame].ip;
        let mut base = self.frames[frame].base;

        macro_rules! store_frame {
            () => {
                self.frames[frame].ip = ip;
            };
        }
        macro_rules! read_frame {
            () => {
                frame = self.frames.len() - 1;
                chunk = Rc::clone(&self.frames[frame].chunk);
                ip = self.frames[frame].ip;
                base = self.frames[frame].base;
            };
        }
        macro_rules! read_byte {
            () => {{
                let byte = chunk.code[ip];
                ip += 1;
                byte
            }};
        }
        macro_rules! read_short {
            () => {{
                let hi = chunk.code[ip] as u16;
                let lo = chunk.code[ip + 1] as u16;
                ip += 2;
                (hi << 8) | lo
            }};
        }
        macro_rules! read_constant {
            () => {{
                let index = read_byte!() as usize;
                chunk.constants[index]
            }};
        }
        macro_rules! read_string {
            () => {
                read_constant!().as_object()
            };
        }
        macro_rules! bail {
            ($($arg:tt)*) => {{
                store_frame!();
                return Err(self.error(format!($($arg)*)));
            }};
        }

        loop {
            let op = match OpCode::try_from(chunk.code[ip]) {
                Ok(op) => op,
                Err(byte) => {
                    store_frame!();
                    return Err(self.error(format!("Unknown opcode {byte:#04x}")));
                }
            };
            ip += 1;

            match op {
                OpCode::Constant => {
                    let value = read_constant!();
                    self.push(value);
                }
                OpCode::Null => self.push(Value::NULL),
                OpCode::True => self.push(Value::TRUE),
                OpCode::False => self.push(Value::FALSE),
                OpCode::Dup => self.push(self.peek(0)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::PopRepl => {
                    let value = self.peek(0);
                    if !value.is_null() {
                        println!("{}", self.heap.value_to_string(value));
                    }
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = read_byte!() as usize;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = read_byte!() as usize;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value),
                        None => {
                            bail!("Undefined variable '{}'", self.heap.string_chars(name))
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    if self.globals.set(name, hash, self.peek(0)) {
                        self.globals.delete(name, hash);
                        bail!("Undefined variable '{}'", self.heap.string_chars(name));
                    }
                }
                OpCode::GetModule => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    let module = self.frames[frame].module;
                    let value = match self.heap.get(module) {
                        Obj::Module(m) => m.values.get(name, hash),
                        _ => None,
                    };
                    match value {
                        Some(value) => self.push(value),
                        None => {
                            bail!("Undefined variable '{}'", self.heap.string_chars(name))
                        }
                    }
                }
                OpCode::SetModule => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    let module = self.frames[frame].module;
                    let top = self.peek(0);
                    let undefined = match self.heap.get_mut(module) {
                        Obj::Module(m) => {
                            if m.values.set(name, hash, top) {
                                m.values.delete(name, hash);
                                true
                            } else {
                                false
                            }
                        }
                        _ => true,
                    };
                    if undefined {
                        bail!("Undefined variable '{}'", self.heap.string_chars(name));
                    }
                }
                OpCode::DefineGlobal => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                OpCode::DefineModule => {
                    let name = read_string!();
                    let hash = self.heap.string_hash(name);
                    let module = self.frames[frame].module;
                    let value = self.peek(0);
                    if let Obj::Module(m) = self.heap.get_mut(module) {
                        m.values.set(name, hash, value);
                    }
                    self.pop();
                }
                OpCode::DefineOptional => {
                    let arity = read_byte!() as usize;
                    let optional = read_byte!() as usize;
                    self.define_optional(base, arity, optional, frame);
                }
                OpCode::GetUpvalue => {
                    let slot = read_byte!() as usize;
                    let value = self.upvalue_get(frame, slot);
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = read_byte!() as usize;
                    let value = self.peek(0);
                    self.upvalue_set(frame, slot, value);
                }
                OpCode::GetProperty => {
                    let receiver = self.peek(0);
                    let name = read_string!();
                    store_frame!();
                    self.get_property(receiver, name, true)?;
                }
                OpCode::GetPropertyNoPop => {
                    let receiver = self.peek(0);
                    let name = read_string!();
                    store_frame!();
                    self.get_property(receiver, name, false)?;
                }
                OpCode::SetProperty => {
                    let name = read_string!();
                    let receiver = self.peek(1);
                    let item = self.peek(0);
                    store_frame!();
                    self.set_property(name, receiver, item)?;
                }
                OpCode::GetSuper => {
                    let name = read_string!();
                    let superclass = self.pop().as_object();
                    store_frame!();
                    self.bind_method(superclass, name)?;
                }
                OpCode::SetClassVar => {
                    let key = read_string!();
                    let hash = self.heap.string_hash(key);
                    let value = self.peek(0);
                    let class = self.peek(1).as_object();
                    if let Obj::Class(c) = self.heap.get_mut(class) {
                        c.statics.set(key, hash, value);
                    }
                    self.pop();
                }
                OpCode::Range => {
                    let step = self.pop();
                    let end = self.pop();
                    let start = self.pop();
                    if !start.is_number() || !end.is_number() || !step.is_number() {
                        bail!("Range operands must be numbers");
                    }
                    let range =
                        self.new_range(start.as_number(), end.as_number(), step.as_number());
                    self.push(Value::object(range));
                }
                OpCode::List => {
                    let list = self.new_list();
                    self.push(Value::object(list));
                }
                OpCode::PushListItem => {
                    let item = self.peek(0);
                    let list = self.peek(1).as_object();
                    if let Obj::List(l) = self.heap.get_mut(list) {
                        l.items.push(item);
                    }
                    self.pop();
                }
                OpCode::Map => {
                    let map = self.new_map();
                    self.push(Value::object(map));
                }
                OpCode::PushMapField => {
                    let value = self.peek(0);
                    let key = self.peek(1);
                    let map = self.peek(2).as_object();
                    let hash = match self.heap.value_hash(key) {
                        Some(hash) => hash,
                        None => bail!("Map key isn't hashable"),
                    };
                    if let Obj::Map(m) = self.heap.get_mut(map) {
                        m.entries.set(key, hash, value);
                    }
                    self.pop();
                    self.pop();
                }
                OpCode::UnpackList => {
                    let var_count = read_byte!() as usize;
                    store_frame!();
                    self.unpack_list(var_count)?;
                }
                OpCode::UnpackRestList => {
                    let var_count = read_byte!() as usize;
                    let rest_pos = read_byte!() as usize;
                    store_frame!();
                    self.unpack_rest_list(var_count, rest_pos)?;
                }
                OpCode::Subscript => {
                    let index = self.peek(0);
                    let object = self.peek(1);
                    store_frame!();
                    if self.is_instance(object) {
                        // Rewrite into a "[]" method invocation.
                        self.pop();
                        self.push(index);
                        self.push(Value::NULL);
                        self.invoke_operator(object, Value::NULL, "[]")?;
                        read_frame!();
                    } else {
                        self.subscript(index, object)?;
                    }
                }
                OpCode::SubscriptStore => {
                    let item = self.peek(0);
                    let index = self.peek(1);
                    let object = self.peek(2);
                    store_frame!();
                    if self.is_instance(object) {
                        self.pop();
                        self.pop();
                        self.push(index);
                        self.push(item);
                        self.invoke_operator(object, Value::NULL, "[]")?;
                        read_frame!();
                    } else {
                        self.subscript_store(item, index, object, true)?;
                    }
                }
                OpCode::SubscriptPush => {
                    let item = self.peek(0);
                    let index = self.peek(1);
                    let object = self.peek(2);
                    store_frame!();
                    self.subscript_store(item, index, object, false)?;
                }
                OpCode::Slice => {
                    let step = self.peek(0);
                    let end = self.peek(1);
                    let start = self.peek(2);
                    let object = self.peek(3);
                    store_frame!();
                    self.slice(object, start, end, step)?;
                }
                OpCode::Is => {
                    let class = self.peek(0);
                    let instance = self.peek(1);
                    if !self.is_class(class) {
                        bail!("Right operand must be a class");
                    }
                    let result = self.instance_of(instance, class.as_object());
                    self.pop();
                    self.pop();
                    self.push(Value::boolean(result));
                }
                OpCode::In => {
                    let object = self.peek(0);
                    let value = self.peek(1);
                    store_frame!();
                    self.contains(object, value)?;
                }
                OpCode::Equal => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    if self.is_instance(a) || self.is_instance(b) {
                        store_frame!();
                        self.binary_operator_call(a, b, "==")?;
                        read_frame!();
                    } else {
                        self.pop();
                        self.pop();
                        let equal = self.heap.values_equal(a, b);
                        self.push(Value::boolean(equal));
                    }
                }
                OpCode::Greater => {
                    store_frame!();
                    self.comparison_op(">")?;
                    read_frame!();
                }
                OpCode::GreaterEqual => {
                    store_frame!();
                    self.comparison_op(">=")?;
                    read_frame!();
                }
                OpCode::Less => {
                    store_frame!();
                    self.comparison_op("<")?;
                    read_frame!();
                }
                OpCode::LessEqual => {
                    store_frame!();
                    self.comparison_op("<=")?;
                    read_frame!();
                }
                OpCode::Add => {
                    store_frame!();
                    self.add_op()?;
                    read_frame!();
                }
                OpCode::Subtract => {
                    store_frame!();
                    self.arithmetic_op("-")?;
                    read_frame!();
                }
                OpCode::Multiply => {
                    store_frame!();
                    self.multiply_op()?;
                    read_frame!();
                }
                OpCode::Divide => {
                    store_frame!();
                    self.arithmetic_op("/")?;
                    read_frame!();
                }
                OpCode::Mod => {
                    store_frame!();
                    self.arithmetic_op("%")?;
                    read_frame!();
                }
                OpCode::Pow => {
                    store_frame!();
                    self.arithmetic_op("**")?;
                    read_frame!();
                }
                OpCode::Band => {
                    store_frame!();
                    self.bitwise_op("&")?;
                    read_frame!();
                }
                OpCode::Bor => {
                    store_frame!();
                    self.bitwise_op("|")?;
                    read_frame!();
                }
                OpCode::Bxor => {
                    store_frame!();
                    self.bitwise_op("^")?;
                    read_frame!();
                }
                OpCode::Lshift => {
                    store_frame!();
                    self.bitwise_op("<<")?;
                    read_frame!();
                }
                OpCode::Rshift => {
                    store_frame!();
                    self.bitwise_op(">>")?;
                    read_frame!();
                }
                OpCode::Bnot => {
                    let operand = self.peek(0);
                    if self.is_instance(operand) {
                        store_frame!();
                        self.unary_operator_call(operand, "~")?;
                        read_frame!();
                    } else if operand.is_number() {
                        self.pop();
                        self.push(Value::number(!(operand.as_number() as i32) as f64));
                    } else {
                        bail!("Operand must be a number");
                    }
                }
                OpCode::Negate => {
                    let operand = self.peek(0);
                    if self.is_instance(operand) {
                        store_frame!();
                        self.unary_operator_call(operand, "-")?;
                        read_frame!();
                    } else if operand.is_number() {
                        self.pop();
                        self.push(Value::number(-operand.as_number()));
                    } else {
                        bail!("Operand must be a number");
                    }
                }
                OpCode::And => {
                    let offset = read_short!() as usize;
                    if self.heap.is_falsey(self.peek(0)) {
                        ip += offset;
                    } else {
                        self.pop();
                    }
                }
                OpCode::Or => {
                    let offset = read_short!() as usize;
                    if self.heap.is_falsey(self.peek(0)) {
                        self.pop();
                    } else {
                        ip += offset;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    let falsey = self.heap.is_falsey(value);
                    self.push(Value::boolean(falsey));
                }
                OpCode::MultiCase => {
                    let count = read_byte!() as usize;
                    let switch_value = self.peek(count + 1);
                    let mut case_value = self.pop();
                    let mut i = 0;
                    while i < count {
                        if self.heap.values_equal(switch_value, case_value) {
                            i += 1;
                            while i <= count {
                                self.pop();
                                i += 1;
                            }
                            break;
                        }
                        case_value = self.pop();
                        i += 1;
                    }
                    self.push(case_value);
                }
                OpCode::CompareJump => {
                    let offset = read_short!() as usize;
                    let a = self.pop();
                    if !self.heap.values_equal(self.peek(0), a) {
                        ip += offset;
                    } else {
                        self.pop();
                    }
                }
                OpCode::Jump => {
                    let offset = read_short!() as usize;
                    ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_short!() as usize;
                    if self.heap.is_falsey(self.peek(0)) {
                        ip += offset;
                    }
                }
                OpCode::JumpIfNull => {
                    let offset = read_short!() as usize;
                    if self.peek(0).is_null() {
                        ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = read_short!() as usize;
                    ip -= offset;
                }
                OpCode::Call => {
                    let arg_count = read_byte!() as usize;
                    store_frame!();
                    self.call_value(self.peek(arg_count), arg_count)?;
                    read_frame!();
                }
                OpCode::Invoke => {
                    let method = read_string!();
                    let arg_count = read_byte!() as usize;
                    store_frame!();
                    self.invoke(self.peek(arg_count), method, arg_count)?;
                    read_frame!();
                }
                OpCode::Super => {
                    let method = read_string!();
                    let arg_count = read_byte!() as usize;
                    store_frame!();
                    let superclass = self.pop().as_object();
                    self.invoke_from_class(superclass, method, arg_count)?;
                    read_frame!();
                }
                OpCode::Closure => {
                    let function = read_constant!().as_object();
                    let upvalue_count = match self.heap.get(function) {
                        Obj::Function(f) => f.upvalue_count,
                        _ => 0,
                    };
                    let closure = self.new_closure(function);
                    self.push(Value::object(closure));
                    for _ in 0..upvalue_count {
                        let is_local = read_byte!() != 0;
                        let index = read_byte!() as usize;
                        let upvalue = if is_local {
                            self.capture_upvalue(base + index)
                        } else {
                            match self.heap.get(self.frames[frame].closure) {
                                Obj::Closure(c) => c.upvalues[index],
                                _ => unreachable!("frame without closure"),
                            }
                        };
                        if let Obj::Closure(c) = self.heap.get_mut(closure) {
                            c.upvalues.push(upvalue);
                        }
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    self.close_upvalues(base);
                    let finished = self.frames.len() - 1;
                    self.frames.pop();
                    self.stack.truncate(base);
                    self.push(result);
                    if finished == exit_depth {
                        return Ok(());
                    }
                    read_frame!();
                }
                OpCode::Class => {
                    let name = read_string!();
                    let class = self.new_class(name);
                    self.push(Value::object(class));
                }
                OpCode::Inherit => {
                    let superclass_value = self.peek(1);
                    if !self.is_class(superclass_value) {
                        bail!("Superclass must be a class");
                    }
                    let superclass = superclass_value.as_object();
                    let class = self.peek(0).as_object();
                    if class == superclass {
                        bail!("A class can't inherit from itself");
                    }
                    let (methods, statics, constructor) = match self.heap.get(superclass) {
                        Obj::Class(s) => {
                            let mut methods = Table::new();
                            methods.add_all(&s.methods);
                            let mut statics = Table::new();
                            statics.add_all(&s.statics);
                            (methods, statics, s.constructor)
                        }
                        _ => unreachable!("checked above"),
                    };
                    if let Obj::Class(c) = self.heap.get_mut(class) {
                        c.superclass = Some(superclass);
                        c.methods.add_all(&methods);
                        c.statics.add_all(&statics);
                        c.constructor = constructor;
                    }
                    self.pop();
                }
                OpCode::Method => {
                    let name = read_string!();
                    self.define_method(name);
                }
                OpCode::ExtensionMethod => {
                    let name = read_string!();
                    if !self.is_class(self.peek(1)) {
                        let type_name = self.heap.type_name(self.peek(1));
                        bail!("Cannot assign extension method to {}", type_name);
                    }
                    self.define_method(name);
                    self.pop();
                }
                OpCode::ImportString => {
                    let path = read_string!();
                    store_frame!();
                    self.import_string(path, frame)?;
                    read_frame!();
                }
                OpCode::ImportName => {
                    let name = read_string!();
                    store_frame!();
                    self.import_name(name)?;
                }
                OpCode::ImportVariable => {
                    let name = read_string!();
                    store_frame!();
                    self.import_variable(name)?;
                }
                OpCode::ImportAlias => {
                    let module = match self.last_module {
                        Some(module) => module,
                        None => bail!("No module imported"),
                    };
                    self.push(Value::object(module));
                }
                OpCode::ImportEnd => {
                    self.last_module = Some(self.frames[frame].module);
                }
                OpCode::End => {
                    // Unpatched loop-exit sentinel; the loop closer
                    // rewrites these to Jump before execution.
                    let _ = read_short!();
                }
            }
        }
    }

    // === Small shared helpers for the dispatch loop ===

    pub(crate) fn is_instance(&self, value: Value) -> bool {
        value.is_object() && matches!(self.heap.get(value.as_object()), Obj::Instance(_))
    }

    pub(crate) fn is_class(&self, value: Value) -> bool {
        value.is_object() && matches!(self.heap.get(value.as_object()), Obj::Class(_))
    }

    fn instance_of(&self, instance: Value, class: Handle) -> bool {
        if !self.is_instance(instance) {
            return false;
        }
        let mut current = match self.heap.get(instance.as_object()) {
            Obj::Instance(i) => Some(i.class),
            _ => None,
        };
        while let Some(handle) = current {
            if handle == class {
                return true;
            }
            current = match self.heap.get(handle) {
                Obj::Class(c) => c.superclass,
                _ => None,
            };
        }
        false
    }

    fn upvalue_get(&self, frame: usize, slot: usize) -> Value {
        let upvalue = match self.heap.get(self.frames[frame].closure) {
            Obj::Closure(c) => c.upvalues[slot],
            _ => unreachable!("frame without closure"),
        };
        match self.heap.get(upvalue) {
            Obj::Upvalue(ObjUpvalue::Open(stack_slot)) => self.stack[*stack_slot],
            Obj::Upvalue(ObjUpvalue::Closed(value)) => *value,
            _ => unreachable!("closure upvalue is not an upvalue"),
        }
    }

    fn upvalue_set(&mut self, frame: usize, slot: usize, value: Value) {
        let upvalue = match self.heap.get(self.frames[frame].closure) {
            Obj::Closure(c) => c.upvalues[slot],
            _ => unreachable!("frame without closure"),
        };
        match self.heap.get_mut(upvalue) {
            Obj::Upvalue(ObjUpvalue::Open(stack_slot)) => {
                let stack_slot = *stack_slot;
                self.stack[stack_slot] = value;
            }
            Obj::Upvalue(u @ ObjUpvalue::Closed(_)) => *u = ObjUpvalue::Closed(value),
            _ => unreachable!("closure upvalue is not an upvalue"),
        }
    }

    /// `class.methods[name] = method`; a method named `constructor`
    /// also becomes the class constructor.
    fn define_method(&mut self, name: Handle) {
        let method = self.peek(0);
        let class = self.peek(1).as_object();
        let hash = self.heap.string_hash(name);
        let is_constructor = name == self.constructor_string;
        if let Obj::Class(c) = self.heap.get_mut(class) {
            c.methods.set(name, hash, method);
            if is_constructor {
                c.constructor = method;
            }
        }
        self.pop();
    }

    /// Shuffle provided arguments and compiled default values into
    /// declaration order at function entry. For variadic functions the
    /// synthesized tail list stays in the last parameter slot.
    fn define_optional(&mut self, base: usize, arity: usize, optional: usize, frame: usize) {
        let variadic = {
            let function = match self.heap.get(self.frames[frame].closure) {
                Obj::Closure(c) => c.function,
                _ => unreachable!("frame without closure"),
            };
            match self.heap.get(function) {
                Obj::Function(f) => f.flags.contains(FunctionFlags::VARIADIC),
                _ => false,
            }
        };

        let total_on_stack = self.stack.len() - base - 1;
        let provided = total_on_stack - optional;
        let defaults = self.stack.split_off(self.stack.len() - optional);

        if variadic {
            let tail = self.pop();
            let provided_fixed = provided - 1;
            let positional = arity - 1;
            let needed = positional + optional - provided_fixed;
            for &default in &defaults[optional - needed..] {
                self.push(default);
            }
            self.push(tail);
        } else {
            let needed = arity + optional - provided;
            for &default in &defaults[optional - needed..] {
                self.push(default);
            }
        }
    }

    fn unpack_list(&mut self, var_count: usize) -> TeaResult<()> {
        let top = self.peek(0);
        let items = match top.is_object() {
            true => match self.heap.get(top.as_object()) {
                Obj::List(l) => l.items.clone(),
                _ => return Err(self.error("Can only unpack lists")),
            },
            false => return Err(self.error("Can only unpack lists")),
        };
        if var_count < items.len() {
            return Err(self.error("Too many values to unpack"));
        }
        if var_count > items.len() {
            return Err(self.error("Not enough values to unpack"));
        }
        self.pop();
        for item in items {
            self.push(item);
        }
        Ok(())
    }

    fn unpack_rest_list(&mut self, var_count: usize, rest_pos: usize) -> TeaResult<()> {
        let top = self.peek(0);
        let items = match top.is_object() {
            true => match self.heap.get(top.as_object()) {
                Obj::List(l) => l.items.clone(),
                _ => return Err(self.error("Can only unpack lists")),
            },
            false => return Err(self.error("Can only unpack lists")),
        };
        if var_count > items.len() {
            return Err(self.error("Not enough values to unpack"));
        }
        self.pop();

        let rest_len = items.len() - (var_count - 1);
        for item in &items[..rest_pos] {
            self.push(*item);
        }
        let rest = self.new_list();
        self.push(Value::object(rest));
        if let Obj::List(l) = self.heap.get_mut(rest) {
            l.items.extend_from_slice(&items[rest_pos..rest_pos + rest_len]);
        }
        for item in &items[rest_pos + rest_len..] {
            self.push(*item);
        }
        Ok(())
    }

    /// The builtin class that provides methods for a primitive value,
    /// if any.
    pub(crate) fn class_of(&self, value: Value) -> Option<Handle> {
        let classes = self.builtin_classes?;
        if value.is_number() {
            return Some(classes.number);
        }
        if !value.is_object() {
            return None;
        }
        match self.heap.get(value.as_object()) {
            Obj::String(_) => Some(classes.string),
            Obj::List(_) => Some(classes.list),
            Obj::Map(_) => Some(classes.map),
            Obj::Range(_) => Some(classes.range),
            Obj::File(_) => Some(classes.file),
            _ => None,
        }
    }

    /// Register a global native function, used by builtins and hosts.
    pub fn register_function(&mut self, name: &str, function: NativeFn) {
        let name_handle = self.intern(name);
        let hash = self.heap.string_hash(name_handle);
        let native = self.new_native(NativeKind::Function, name_handle, function);
        self.globals.set(name_handle, hash, Value::object(native));
        trace!("registered native function {name}");
    }

    /// Create a class and attach native members in bulk. A member
    /// named `constructor` also becomes the class constructor.
    pub fn register_class(&mut self, name: &str, members: &[(&str, NativeKind, NativeFn)]) -> Handle {
        let name_handle = self.intern(name);
        let class = self.new_class(name_handle);
        self.heap.protect.push(Value::object(class));
        for &(member, kind, function) in members {
            let member_handle = self.intern(member);
            let hash = self.heap.string_hash(member_handle);
            let native = self.new_native(kind, member_handle, function);
            let is_constructor = member_handle == self.constructor_string;
            if let Obj::Class(c) = self.heap.get_mut(class) {
                c.methods.set(member_handle, hash, Value::object(native));
                if is_constructor {
                    c.constructor = Value::object(native);
                }
            }
        }
        self.heap.protect.pop();
        class
    }

    /// Create (or fetch) a module and attach native functions in bulk.
    pub fn register_module(&mut self, name: &str, members: &[(&str, NativeFn)]) -> Handle {
        let name_handle = self.intern(name);
        let module = self.new_module(name_handle);
        for &(member, function) in members {
            let member_handle = self.intern(member);
            let hash = self.heap.string_hash(member_handle);
            let native = self.new_native(NativeKind::Function, member_handle, function);
            if let Obj::Module(m) = self.heap.get_mut(module) {
                m.values.set(member_handle, hash, Value::object(native));
            }
        }
        trace!("registered native module {name}");
        module
    }

    /// The native module registry, for host registration.
    pub fn native_modules_mut(&mut self) -> &mut NativeModules {
        &mut self.native_modules
    }

    /// Set one exported value on a module.
    pub fn set_module_value(&mut self, module: Handle, name: &str, value: Value) {
        let key = self.intern(name);
        let hash = self.heap.string_hash(key);
        if let Obj::Module(m) = self.heap.get_mut(module) {
            m.values.set(key, hash, value);
        }
    }

    pub(crate) fn function_of_closure(&self, closure: Handle) -> Handle {
        match self.heap.get(closure) {
            Obj::Closure(c) => c.function,
            _ => unreachable!("expected closure"),
        }
    }

    pub(crate) fn function_kind(&self, function: Handle) -> FunctionKind {
        match self.heap.get(function) {
            Obj::Function(f) => f.kind,
            _ => unreachable!("expected function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Vm {
        let mut vm = Vm::new(VmOptions::default());
        vm.interpret("test", source).expect("script should run");
        vm
    }

    fn export(vm: &mut Vm, name: &str) -> Value {
        vm.module_export("test", name).expect("export should exist")
    }

    #[test]
    fn arithmetic_and_module_scope() {
        let mut vm = run("var a = 1 + 2 * 3");
        assert_eq!(export(&mut vm, "a").as_number(), 7.0);
    }

    #[test]
    fn string_interning_is_canonical() {
        let mut vm = Vm::new(VmOptions::default());
        let a = vm.intern("x");
        let b = vm.intern("x");
        assert_eq!(a, b);
        let mut vm2 = run(r#"var s = "he" + "llo" var t = "hello""#);
        let s = export(&mut vm2, "s");
        let t = export(&mut vm2, "t");
        assert_eq!(s.as_object(), t.as_object());
    }

    #[test]
    fn locals_and_blocks() {
        let mut vm = run("var a = 0 { var b = 5 a = b + 1 }");
        assert_eq!(export(&mut vm, "a").as_number(), 6.0);
    }

    #[test]
    fn short_circuit_keeps_deciding_value() {
        let mut vm = run("var a = null or 5 var b = 0 and \"x\"");
        assert_eq!(export(&mut vm, "a").as_number(), 5.0);
        assert_eq!(export(&mut vm, "b").as_number(), 0.0);
    }

    #[test]
    fn upvalue_closure_counts() {
        let mut vm = run(
            "function make() { var n = 0 return () => { n += 1 return n } } \
             var f = make() \
             var a = f() var b = f() var c = f()",
        );
        assert_eq!(export(&mut vm, "a").as_number(), 1.0);
        assert_eq!(export(&mut vm, "b").as_number(), 2.0);
        assert_eq!(export(&mut vm, "c").as_number(), 3.0);
    }

    #[test]
    fn stack_overflow_reported() {
        let mut vm = Vm::new(VmOptions::default());
        let error = vm
            .interpret("test", "function f() { f() } f()")
            .expect_err("must overflow");
        assert!(error.message().contains("Stack overflow"), "{error}");
    }

    #[test]
    fn undefined_variable_is_runtime_error() {
        let mut vm = Vm::new(VmOptions::default());
        let error = vm.interpret("test", "var a = missing").expect_err("undefined");
        assert!(error.message().contains("Undefined variable"), "{error}");
    }

    #[test]
    fn gc_stress_mode_runs_programs() {
        let mut vm = Vm::new(VmOptions {
            gc_stress: true,
            ..VmOptions::default()
        });
        vm.interpret(
            "test",
            "var a = [] for (var i = 0; i < 50; i += 1) a.add(i.tostring()) var n = a.len",
        )
        .expect("stress mode should not corrupt state");
        let n = vm.module_export("test", "n").expect("n");
        assert_eq!(n.as_number(), 50.0);
    }
}
