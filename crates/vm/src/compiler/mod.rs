//! Single-pass compiler.
//!
//! Recursive descent over statements with a Pratt table for
//! expressions, emitting bytecode directly into the current function's
//! chunk. No AST is built. Compile errors are reported once per panic
//! sequence; parsing resumes at a synchronization keyword, and a
//! compilation with any error yields no function.

mod expr;
mod stmt;

use crate::chunk::Chunk;
use crate::error::{TeaError, TeaResult};
use crate::lexer::Lexer;
use crate::limits::{MAX_CONSTANTS, MAX_JUMP, MAX_LOCALS, MAX_UPVALUES};
use crate::object::{FunctionFlags, FunctionKind, Handle, Obj, ObjFunction};
use crate::opcode::{OpCode, OPERAND_VARIABLE};
use crate::token::{Token, TokenKind, TokenValue};
use crate::value::Value;
use crate::vm::Vm;

/// Compile `source` into a top-level function for `module`.
pub fn compile(vm: &mut Vm, source: &str, module: Handle) -> TeaResult<Handle> {
    let lexer = Lexer::new(source);
    let source = lexer.source();
    let mut parser = Parser {
        vm,
        lexer,
        source,
        previous: Token::synthetic(TokenKind::Eof),
        current: Token::synthetic(TokenKind::Eof),
        had_error: false,
        panic_mode: false,
        first_error: None,
        states: Vec::new(),
        class_states: Vec::new(),
        module,
    };

    parser.begin_state(FunctionKind::Script, None);
    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }
    let function = parser.end_state();

    if parser.had_error {
        let error = parser.first_error.take().unwrap_or_else(|| {
            TeaError::compile(parser.previous.line, String::new(), "Compile error".to_string())
        });
        Err(error)
    } else {
        Ok(function)
    }
}

/// A resolved variable name: its text plus the line it appeared on.
#[derive(Clone, Debug)]
pub(crate) struct Ident {
    pub(crate) text: String,
    pub(crate) line: u32,
}

impl Ident {
    pub(crate) fn synthetic(text: &str) -> Ident {
        Ident {
            text: text.to_string(),
            line: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Local {
    pub(crate) name: String,
    /// `-1` while declared but not yet initialized.
    pub(crate) depth: i32,
    pub(crate) is_captured: bool,
    pub(crate) constant: bool,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct UpvalueDesc {
    pub(crate) index: u8,
    pub(crate) is_local: bool,
    pub(crate) constant: bool,
}

/// Innermost-loop bookkeeping for `break`/`continue` patching.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LoopState {
    pub(crate) start: usize,
    pub(crate) body: usize,
    pub(crate) end: Option<usize>,
    pub(crate) scope_depth: i32,
}

/// Per-function compiler state; the vector of these is the compiler
/// chain the GC treats as a root (through the heap protect buffer).
pub(crate) struct FuncState {
    pub(crate) kind: FunctionKind,
    pub(crate) chunk: Chunk,
    pub(crate) name: Option<Handle>,
    pub(crate) arity: u8,
    pub(crate) arity_optional: u8,
    pub(crate) flags: FunctionFlags,
    pub(crate) locals: Vec<Local>,
    pub(crate) upvalues: Vec<UpvalueDesc>,
    pub(crate) loops: Vec<LoopState>,
    pub(crate) scope_depth: i32,
    pub(crate) slot_count: i32,
    pub(crate) max_slots: i32,
    pub(crate) protect_base: usize,
}

/// Transient class context for `this`/`super`/`static` resolution.
pub(crate) struct ClassState {
    pub(crate) has_superclass: bool,
    pub(crate) is_static: bool,
}

pub(crate) struct Parser<'s, 'v> {
    pub(crate) vm: &'v mut Vm,
    pub(crate) lexer: Lexer<'s>,
    pub(crate) source: &'s str,
    pub(crate) previous: Token,
    pub(crate) current: Token,
    pub(crate) had_error: bool,
    pub(crate) panic_mode: bool,
    pub(crate) first_error: Option<TeaError>,
    pub(crate) states: Vec<FuncState>,
    pub(crate) class_states: Vec<ClassState>,
    pub(crate) module: Handle,
}

impl<'s, 'v> Parser<'s, 'v> {
    // === Errors ===

    fn error_at(&mut self, at_current: bool, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let token = if at_current {
            &self.current
        } else {
            &self.previous
        };
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme(self.source)),
        };
        if self.first_error.is_none() {
            self.first_error = Some(TeaError::compile(
                token.line,
                location,
                message.to_string(),
            ));
        }
    }

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(false, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(true, message);
    }

    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Return
                | TokenKind::Import
                | TokenKind::From => return,
                _ => {}
            }
            self.advance();
        }
    }

    // === Token plumbing ===

    pub(crate) fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::synthetic(TokenKind::Eof));
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = match self.current.value {
                TokenValue::Error(message) => message,
                _ => "Unexpected character",
            };
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub(crate) fn ident_from_previous(&self) -> Ident {
        Ident {
            text: self.previous.lexeme(self.source).to_string(),
            line: self.previous.line,
        }
    }

    // === Function states ===

    pub(crate) fn state(&self) -> &FuncState {
        self.states.last().expect("compiler state")
    }

    pub(crate) fn state_mut(&mut self) -> &mut FuncState {
        self.states.last_mut().expect("compiler state")
    }

    pub(crate) fn begin_state(&mut self, kind: FunctionKind, name: Option<Ident>) {
        let protect_base = self.vm.heap.protect.len();
        let name = name.map(|ident| {
            let handle = self.vm.intern(&ident.text);
            self.vm.heap.protect.push(Value::object(handle));
            handle
        });

        // Slot zero belongs to the callee; methods use it for `this`.
        let slot_zero = Local {
            name: if kind == FunctionKind::Function {
                String::new()
            } else {
                "this".to_string()
            },
            depth: 0,
            is_captured: false,
            constant: false,
        };

        self.states.push(FuncState {
            kind,
            chunk: Chunk::new(),
            name,
            arity: 0,
            arity_optional: 0,
            flags: FunctionFlags::default(),
            locals: vec![slot_zero],
            upvalues: Vec::new(),
            loops: Vec::new(),
            scope_depth: 0,
            slot_count: 1,
            max_slots: 1,
            protect_base,
        });
    }

    /// Seal the current function, and in the enclosing function emit
    /// the `Closure` instruction that will instantiate it.
    pub(crate) fn end_state(&mut self) -> Handle {
        self.emit_return();
        let state = self.states.pop().expect("compiler state");

        let function = Obj::Function(ObjFunction {
            kind: state.kind,
            arity: state.arity,
            arity_optional: state.arity_optional,
            flags: state.flags,
            upvalue_count: state.upvalues.len(),
            max_slots: state.max_slots.max(1) as usize,
            chunk: std::rc::Rc::new(state.chunk),
            name: state.name,
            module: self.module,
        });
        let handle = self.vm.alloc(function);
        self.vm.heap.protect.truncate(state.protect_base);

        if !self.states.is_empty() {
            let constant = self.make_constant(Value::object(handle));
            self.emit_argued(OpCode::Closure, constant);
            for upvalue in &state.upvalues {
                let is_local = if upvalue.is_local { 1 } else { 0 };
                let index = upvalue.index;
                self.emit_raw(is_local);
                self.emit_raw(index);
            }
        }

        handle
    }

    // === Emission ===

    pub(crate) fn emit_raw(&mut self, byte: u8) {
        let line = self.previous.line;
        self.state_mut().chunk.write(byte, line);
    }

    pub(crate) fn adjust_slots(&mut self, effect: i32) {
        let state = self.state_mut();
        state.slot_count += effect;
        if state.slot_count > state.max_slots {
            state.max_slots = state.slot_count;
        }
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit_raw(op as u8);
        self.adjust_slots(op.stack_effect());
    }

    pub(crate) fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    pub(crate) fn emit_argued(&mut self, op: OpCode, operand: u8) {
        self.emit_raw(op as u8);
        self.emit_raw(operand);
        self.adjust_slots(op.stack_effect());
    }

    pub(crate) fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Constructor {
            self.emit_argued(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Null);
        }
        self.emit_op(OpCode::Return);
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let before = self.state().chunk.constants.len();
        let index = self.state_mut().chunk.add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk");
            return 0;
        }
        if self.state().chunk.constants.len() > before {
            // New constant: keep it reachable while compilation runs.
            self.vm.heap.protect.push(value);
        }
        index as u8
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_argued(OpCode::Constant, constant);
    }

    pub(crate) fn identifier_constant(&mut self, ident: &Ident) -> u8 {
        let handle = self.vm.intern(&ident.text);
        self.make_constant(Value::object(handle))
    }

    pub(crate) fn invoke_method(&mut self, args: u8, name: &str) {
        let handle = self.vm.intern(name);
        let constant = self.make_constant(Value::object(handle));
        self.emit_argued(OpCode::Invoke, constant);
        self.emit_raw(args);
        self.adjust_slots(-(args as i32));
    }

    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_raw(0xff);
        self.emit_raw(0xff);
        self.state().chunk.code.len() - 2
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the offset bytes themselves.
        let jump = self.state().chunk.code.len() - offset - 2;
        if jump > MAX_JUMP {
            self.error("Too much code to jump over");
        }
        let state = self.state_mut();
        state.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        state.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.state().chunk.code.len() - loop_start + 2;
        if offset > MAX_JUMP {
            self.error("Loop body too large");
        }
        self.emit_raw(((offset >> 8) & 0xff) as u8);
        self.emit_raw((offset & 0xff) as u8);
    }

    // === Scopes, locals, upvalues ===

    pub(crate) fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    /// Emit the pops/closes for locals at or above `depth` without
    /// touching the local table. Returns how many were discarded.
    pub(crate) fn discard_locals(&mut self, depth: i32) -> usize {
        let mut discarded = 0;
        let count = self.state().locals.len();
        for index in (0..count).rev() {
            let local = &self.state().locals[index];
            if local.depth < depth {
                break;
            }
            let op = if local.is_captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            };
            self.emit_raw(op as u8);
            discarded += 1;
        }
        discarded
    }

    pub(crate) fn end_scope(&mut self) {
        let depth = self.state().scope_depth;
        let discarded = self.discard_locals(depth);
        let state = self.state_mut();
        state.locals.truncate(state.locals.len() - discarded);
        state.slot_count -= discarded as i32;
        state.scope_depth -= 1;
    }

    pub(crate) fn add_local(&mut self, ident: Ident) {
        if self.state().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function");
            return;
        }
        self.state_mut().locals.push(Local {
            name: ident.text,
            depth: -1,
            is_captured: false,
            constant: false,
        });
    }

    /// Add a local already marked initialized; used for hidden loop
    /// variables and the synthesized `super` slot.
    pub(crate) fn add_init_local(&mut self, ident: Ident) -> usize {
        self.add_local(ident);
        let depth = self.state().scope_depth;
        let state = self.state_mut();
        if let Some(local) = state.locals.last_mut() {
            local.depth = depth;
        }
        state.locals.len() - 1
    }

    pub(crate) fn resolve_local_in(&self, state_index: usize, name: &str) -> Option<usize> {
        let state = &self.states[state_index];
        for (index, local) in state.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    // Declared but uninitialized; fall through to an
                    // outer scope or module resolution.
                    return None;
                }
                return Some(index);
            }
        }
        None
    }

    pub(crate) fn resolve_local(&self, name: &str) -> Option<usize> {
        self.resolve_local_in(self.states.len() - 1, name)
    }

    fn add_upvalue(&mut self, state_index: usize, index: u8, is_local: bool, constant: bool) -> u8 {
        let state = &self.states[state_index];
        for (i, upvalue) in state.upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return i as u8;
            }
        }
        if state.upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function");
            return 0;
        }
        self.states[state_index].upvalues.push(UpvalueDesc {
            index,
            is_local,
            constant,
        });
        (self.states[state_index].upvalues.len() - 1) as u8
    }

    fn resolve_upvalue_in(&mut self, state_index: usize, name: &str) -> Option<u8> {
        if state_index == 0 {
            return None;
        }
        let parent = state_index - 1;

        if let Some(local) = self.resolve_local_in(parent, name) {
            self.states[parent].locals[local].is_captured = true;
            let constant = self.states[parent].locals[local].constant;
            return Some(self.add_upvalue(state_index, local as u8, true, constant));
        }

        if let Some(upvalue) = self.resolve_upvalue_in(parent, name) {
            let constant = self.states[parent].upvalues[upvalue as usize].constant;
            return Some(self.add_upvalue(state_index, upvalue, false, constant));
        }

        None
    }

    pub(crate) fn resolve_upvalue(&mut self, name: &str) -> Option<u8> {
        self.resolve_upvalue_in(self.states.len() - 1, name)
    }

    pub(crate) fn declare_variable(&mut self, ident: &Ident) {
        if self.state().scope_depth == 0 {
            return;
        }
        self.add_local(ident.clone());
    }

    /// Consume a name token and declare it; at module scope return its
    /// identifier constant.
    pub(crate) fn parse_variable(&mut self, message: &str) -> (u8, Ident) {
        self.consume(TokenKind::Name, message);
        let ident = self.ident_from_previous();
        let constant = self.parse_variable_at(ident.clone());
        (constant, ident)
    }

    pub(crate) fn parse_variable_at(&mut self, ident: Ident) -> u8 {
        self.declare_variable(&ident);
        if self.state().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(&ident)
    }

    pub(crate) fn mark_initialized(&mut self, constant: bool) {
        if self.state().scope_depth == 0 {
            return;
        }
        let depth = self.state().scope_depth;
        if let Some(local) = self.state_mut().locals.last_mut() {
            local.depth = depth;
            local.constant = constant;
        }
    }

    /// Define a declared variable: mark the local initialized, or emit
    /// the global/module definition. Module-scope resolution prefers
    /// the shared globals table when the name already exists there.
    pub(crate) fn define_variable(&mut self, constant_index: u8, constant: bool) {
        if self.state().scope_depth > 0 {
            self.mark_initialized(constant);
            return;
        }

        let name = self.state().chunk.constants[constant_index as usize];
        if !name.is_object() {
            return;
        }
        let handle = name.as_object();
        let hash = self.vm.heap.string_hash(handle);
        if constant {
            self.vm.constants.set(handle, hash, Value::NULL);
        }

        if self.vm.globals.get(handle, hash).is_some() {
            self.emit_argued(OpCode::DefineGlobal, constant_index);
        } else {
            self.emit_argued(OpCode::DefineModule, constant_index);
        }
    }

    /// Compile-time enforcement of `const`.
    pub(crate) fn check_const(&mut self, set_op: OpCode, arg: u8) {
        match set_op {
            OpCode::SetLocal => {
                if self.state().locals[arg as usize].constant {
                    self.error("Cannot assign to a constant");
                }
            }
            OpCode::SetUpvalue => {
                if self.state().upvalues[arg as usize].constant {
                    self.error("Cannot assign to a constant");
                }
            }
            OpCode::SetGlobal | OpCode::SetModule => {
                let name = self.state().chunk.constants[arg as usize];
                if !name.is_object() {
                    return;
                }
                let handle = name.as_object();
                let hash = self.vm.heap.string_hash(handle);
                if self.vm.constants.get(handle, hash).is_some() {
                    self.error("Cannot assign to a constant");
                }
            }
            _ => {}
        }
    }

    // === Loop bookkeeping ===

    pub(crate) fn begin_loop(&mut self) {
        let start = self.state().chunk.code.len();
        let scope_depth = self.state().scope_depth;
        self.state_mut().loops.push(LoopState {
            start,
            body: start,
            end: None,
            scope_depth,
        });
    }

    /// Patch the loop-exit jump and rewrite `End` sentinels emitted by
    /// `break` into plain jumps past the loop.
    pub(crate) fn end_loop(&mut self) {
        let loop_state = match self.state_mut().loops.pop() {
            Some(l) => l,
            None => return,
        };

        if let Some(end) = loop_state.end {
            self.patch_jump(end);
            self.emit_op(OpCode::Pop);
        }

        let mut i = loop_state.body;
        while i < self.state().chunk.code.len() {
            if self.state().chunk.code[i] == OpCode::End as u8 {
                self.state_mut().chunk.code[i] = OpCode::Jump as u8;
                self.patch_jump(i + 1);
                i += 3;
            } else {
                i += 1 + self.instruction_width(i);
            }
        }
    }

    /// Operand bytes of the instruction at `offset` in the current
    /// chunk, resolving `Closure`'s variable operand via its function
    /// constant.
    fn instruction_width(&self, offset: usize) -> usize {
        let chunk = &self.state().chunk;
        let op = match OpCode::try_from(chunk.code[offset]) {
            Ok(op) => op,
            Err(_) => return 0,
        };
        match op.operand_width() {
            OPERAND_VARIABLE => {
                let constant = chunk.code[offset + 1] as usize;
                let function = chunk.constants[constant];
                let upvalues = match self.vm.heap.get(function.as_object()) {
                    Obj::Function(f) => f.upvalue_count,
                    _ => 0,
                };
                1 + upvalues * 2
            }
            width => width as usize,
        }
    }

    pub(crate) fn in_loop(&self) -> bool {
        !self.state().loops.is_empty()
    }

    pub(crate) fn current_loop(&self) -> LoopState {
        *self.state().loops.last().expect("loop state")
    }

    pub(crate) fn set_loop_end(&mut self, end: usize) {
        if let Some(l) = self.state_mut().loops.last_mut() {
            l.end = Some(end);
        }
    }

    pub(crate) fn set_loop_body(&mut self) {
        let body = self.state().chunk.code.len();
        if let Some(l) = self.state_mut().loops.last_mut() {
            l.body = body;
        }
    }

    pub(crate) fn set_loop_start(&mut self, start: usize) {
        if let Some(l) = self.state_mut().loops.last_mut() {
            l.start = start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Vm, VmOptions};

    fn compile_in(vm: &mut Vm, source: &str) -> TeaResult<Handle> {
        let name = vm.intern("test");
        let module = vm.new_module(name);
        compile(vm, source, module)
    }

    fn compiled_chunk_len(vm: &Vm, function: Handle) -> usize {
        match vm.heap.get(function) {
            Obj::Function(f) => f.chunk.code.len(),
            _ => 0,
        }
    }

    #[test]
    fn empty_source_compiles_to_a_return() {
        let mut vm = Vm::new(VmOptions::default());
        let function = compile_in(&mut vm, "").expect("empty source compiles");
        // Just the implicit `null; return`.
        assert_eq!(compiled_chunk_len(&vm, function), 2);
    }

    #[test]
    fn number_constants_share_pool_slots() {
        let mut vm = Vm::new(VmOptions::default());
        let function = compile_in(&mut vm, "var a = 7 + 7 + 7").expect("compiles");
        let sevens = match vm.heap.get(function) {
            Obj::Function(f) => f
                .chunk
                .constants
                .iter()
                .filter(|c| c.is_number() && c.as_number() == 7.0)
                .count(),
            _ => 0,
        };
        assert_eq!(sevens, 1);
    }

    #[test]
    fn break_sentinels_are_rewritten() {
        let mut vm = Vm::new(VmOptions::default());
        let function =
            compile_in(&mut vm, "while (true) { break } var after = 1").expect("compiles");
        let code = match vm.heap.get(function) {
            Obj::Function(f) => f.chunk.code.clone(),
            _ => Vec::new(),
        };
        // Walking the stream must find no End opcode left behind.
        let mut i = 0;
        while i < code.len() {
            let op = OpCode::try_from(code[i]).expect("valid opcode");
            assert_ne!(op, OpCode::End, "unpatched loop sentinel at {i}");
            let width = match op.operand_width() {
                OPERAND_VARIABLE => {
                    let constant = code[i + 1] as usize;
                    let function = match vm.heap.get(function) {
                        Obj::Function(f) => f.chunk.constants[constant],
                        _ => unreachable!(),
                    };
                    let upvalues = match vm.heap.get(function.as_object()) {
                        Obj::Function(f) => f.upvalue_count,
                        _ => 0,
                    };
                    1 + upvalues * 2
                }
                w => w as usize,
            };
            i += 1 + width;
        }
    }

    #[test]
    fn functions_record_arity_and_flags() {
        let mut vm = Vm::new(VmOptions::default());
        let script = compile_in(&mut vm, "function f(a, b=1, ...c) { return a }")
            .expect("compiles");
        let inner = match vm.heap.get(script) {
            Obj::Function(f) => f
                .chunk
                .constants
                .iter()
                .copied()
                .find(|c| {
                    c.is_object() && matches!(vm.heap.get(c.as_object()), Obj::Function(_))
                })
                .expect("inner function in constant pool"),
            _ => unreachable!(),
        };
        match vm.heap.get(inner.as_object()) {
            Obj::Function(f) => {
                assert_eq!(f.arity, 2);
                assert_eq!(f.arity_optional, 1);
                assert!(f.is_variadic());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn upvalues_are_counted_once_per_capture() {
        let mut vm = Vm::new(VmOptions::default());
        let script = compile_in(
            &mut vm,
            "function make() { var n = 0 return () => n + n + n }",
        )
        .expect("compiles");

        // Walk: script constants -> make -> arrow.
        let mut functions = vec![script];
        let mut deepest_upvalues = 0;
        while let Some(handle) = functions.pop() {
            if let Obj::Function(f) = vm.heap.get(handle) {
                deepest_upvalues = deepest_upvalues.max(f.upvalue_count);
                for constant in &f.chunk.constants {
                    if constant.is_object() {
                        if let Obj::Function(_) = vm.heap.get(constant.as_object()) {
                            functions.push(constant.as_object());
                        }
                    }
                }
            }
        }
        assert_eq!(deepest_upvalues, 1, "n is captured exactly once");
    }

    #[test]
    fn too_many_constants_is_reported() {
        let mut vm = Vm::new(VmOptions::default());
        let mut source = String::from("function f() { var a = 0 ");
        for i in 0..300 {
            source.push_str(&format!("a = {i}.5 "));
        }
        source.push('}');
        let error = compile_in(&mut vm, &source).expect_err("constant pool overflows");
        assert!(error.message().contains("Too many constants"), "{error}");
    }

    #[test]
    fn only_the_first_error_is_reported() {
        let mut vm = Vm::new(VmOptions::default());
        let error = compile_in(&mut vm, "break\ncontinue\n")
            .expect_err("both statements are invalid");
        assert!(error.message().contains("break"), "{error}");
    }

    #[test]
    fn max_slots_covers_expression_depth() {
        let mut vm = Vm::new(VmOptions::default());
        let function = compile_in(&mut vm, "var a = 1 + (2 + (3 + (4 + 5)))").expect("compiles");
        match vm.heap.get(function) {
            Obj::Function(f) => assert!(f.max_slots >= 5, "max_slots = {}", f.max_slots),
            _ => unreachable!(),
        }
    }
}
