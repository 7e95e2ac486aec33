//! Heap object model.
//!
//! The object space is a closed set of variants. Every heap value is
//! reached through a [`Handle`], an index into the engine heap; precise
//! marking guarantees a live handle never dangles.

use std::fs::File;
use std::rc::Rc;

use bitflags::bitflags;

use crate::chunk::Chunk;
use crate::error::TeaResult;
use crate::map::ValueMap;
use crate::table::Table;
use crate::value::Value;
use crate::vm::Vm;

/// Index of an object in the engine heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(u32);

impl Handle {
    #[inline]
    pub fn from_raw(raw: u32) -> Handle {
        Handle(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind a function was declared as. Drives `this`/`super` binding and
/// return rules in the compiler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FunctionKind {
    Script,
    Function,
    Constructor,
    Static,
    Method,
}

bitflags! {
    /// Calling-convention details of a function prototype.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct FunctionFlags: u8 {
        /// Last parameter collects surplus arguments into a list.
        const VARIADIC = 1 << 0;
        /// One or more parameters carry default values.
        const OPTIONALS = 1 << 1;
    }
}

/// Interned string. The hash is FNV-1a, fixed at allocation.
#[derive(Debug)]
pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

impl ObjString {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Ordered, mutable sequence.
#[derive(Debug, Default)]
pub struct ObjList {
    pub items: Vec<Value>,
}

/// Value-keyed hash map.
#[derive(Debug, Default)]
pub struct ObjMap {
    pub entries: ValueMap,
}

/// Half-open numeric range.
#[derive(Debug, Clone, Copy)]
pub struct ObjRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

/// Function prototype. Immutable once the compiler seals it.
#[derive(Debug)]
pub struct ObjFunction {
    pub kind: FunctionKind,
    pub arity: u8,
    pub arity_optional: u8,
    pub flags: FunctionFlags,
    pub upvalue_count: usize,
    pub max_slots: usize,
    pub chunk: Rc<Chunk>,
    /// Interned name; `None` for the top-level script function.
    pub name: Option<Handle>,
    pub module: Handle,
}

impl ObjFunction {
    pub fn is_variadic(&self) -> bool {
        self.flags.contains(FunctionFlags::VARIADIC)
    }
}

/// The callable value: a prototype plus its captured upvalues.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: Handle,
    pub upvalues: Vec<Handle>,
}

/// A captured variable. Open while its slot is still on the VM stack.
#[derive(Debug)]
pub enum ObjUpvalue {
    Open(usize),
    Closed(Value),
}

/// How a native integrates with the VM.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NativeKind {
    Function,
    Method,
    /// Invoked automatically when the named field is read.
    Property,
}

/// Host callback signature. Arguments arrive in the slot window; the
/// callback leaves its single result on top of it.
pub type NativeFn = fn(&mut Vm) -> TeaResult<()>;

/// Host-provided callable.
pub struct ObjNative {
    pub kind: NativeKind,
    pub name: Handle,
    pub function: NativeFn,
}

impl std::fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjNative")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Class object: single inheritance, separate static and method tables.
#[derive(Debug)]
pub struct ObjClass {
    pub name: Handle,
    pub superclass: Option<Handle>,
    pub constructor: Value,
    pub statics: Table,
    pub methods: Table,
}

/// Instance with dynamic fields.
#[derive(Debug)]
pub struct ObjInstance {
    pub class: Handle,
    pub fields: Table,
}

/// A method read off a receiver, remembering both.
#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: Value,
}

/// One loaded source unit. `values` is the per-module name scope.
#[derive(Debug)]
pub struct ObjModule {
    pub name: Handle,
    pub path: Handle,
    pub values: Table,
}

/// An open (or closed) OS file.
#[derive(Debug)]
pub struct ObjFile {
    pub file: Option<File>,
    pub path: Handle,
    pub mode: Handle,
    pub is_open: bool,
}

/// A heap object.
#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    List(ObjList),
    Map(ObjMap),
    Range(ObjRange),
    Function(ObjFunction),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Native(ObjNative),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
    Module(ObjModule),
    File(ObjFile),
}

impl Obj {
    /// The user-visible type name of a value of this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::List(_) => "list",
            Obj::Map(_) => "map",
            Obj::Range(_) => "range",
            Obj::Function(_) | Obj::Closure(_) | Obj::BoundMethod(_) | Obj::Native(_) => {
                "function"
            }
            Obj::Upvalue(_) => "upvalue",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::Module(_) => "module",
            Obj::File(_) => "file",
        }
    }

    /// Rough payload size, fed into the allocation accounting that
    /// drives collection scheduling.
    pub fn size_hint(&self) -> usize {
        let base = std::mem::size_of::<Obj>();
        base + match self {
            Obj::String(s) => s.chars.capacity(),
            Obj::List(l) => l.items.capacity() * std::mem::size_of::<Value>(),
            Obj::Map(m) => m.entries.byte_size(),
            Obj::Function(f) => f.chunk.byte_size(),
            Obj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<Handle>(),
            Obj::Class(c) => c.methods.byte_size() + c.statics.byte_size(),
            Obj::Instance(i) => i.fields.byte_size(),
            Obj::Module(m) => m.values.byte_size(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(
            Obj::String(ObjString {
                chars: String::new(),
                hash: 0
            })
            .type_name(),
            "string"
        );
        assert_eq!(Obj::List(ObjList::default()).type_name(), "list");
        assert_eq!(
            Obj::Range(ObjRange {
                start: 0.0,
                end: 1.0,
                step: 1.0
            })
            .type_name(),
            "range"
        );
    }

    #[test]
    fn function_flags() {
        let mut flags = FunctionFlags::default();
        assert!(!flags.contains(FunctionFlags::VARIADIC));
        flags |= FunctionFlags::VARIADIC;
        assert!(flags.contains(FunctionFlags::VARIADIC));
    }
}
