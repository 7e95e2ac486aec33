//! # Teascript Virtual Machine
//!
//! A complete implementation of the Teascript language engine: a
//! single-pass compiler that lexes source and emits bytecode through
//! recursive-descent Pratt parsing, a stack-based virtual machine that
//! executes it, and a precise mark-and-sweep garbage collector that
//! owns every heap object.
//!
//! ## Architecture
//!
//! - **Lexer / Compiler**: source text straight to bytecode chunks, no
//!   AST in between
//! - **Vm**: frame stack, dense-`match` dispatch loop, upvalue
//!   discipline, operator semantics
//! - **Heap**: handle-based object slab with tri-color mark-and-sweep
//!   collection and a weak string intern set
//! - **Host API**: slot-window push/pop/check surface for native
//!   functions, methods, and properties
//! - **Builtins**: method tables behind string, list, map, range,
//!   file, and number values
//! - **Modules**: source-file imports cached by canonical path, plus a
//!   registry of native modules
//!
//! ## Example
//!
//! ```rust
//! use tea_vm::{Vm, VmOptions};
//!
//! let mut vm = Vm::new(VmOptions::default());
//! vm.interpret("demo", "var greeting = \"tea\" * 2").unwrap();
//! let value = vm.module_export("demo", "greeting").unwrap();
//! assert_eq!(vm.to_display_string(value), "teatea");
//! ```

mod api;
mod builtins;
mod chunk;
mod compiler;
mod error;
mod gc;
mod lexer;
mod limits;
mod map;
mod modules;
mod object;
mod opcode;
mod table;
mod token;
mod utf;
mod value;
mod vm;

pub use builtins::BuiltinClasses;
pub use chunk::Chunk;
pub use error::{TeaError, TeaResult};
pub use gc::Heap;
pub use lexer::Lexer;
pub use modules::{ModuleBuilder, NativeModules};
pub use object::{Handle, NativeFn, NativeKind};
pub use opcode::OpCode;
pub use token::{Token, TokenKind, TokenValue};
pub use value::Value;
pub use vm::{Vm, VmOptions};
