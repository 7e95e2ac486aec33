//! Statement and declaration parsing.

use super::{ClassState, Ident, Parser};
use crate::object::{FunctionFlags, FunctionKind};
use crate::opcode::OpCode;
use crate::token::{TokenKind, TokenValue};
use crate::value::Value;

impl<'s, 'v> Parser<'s, 'v> {
    pub(crate) fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Function) {
            self.function_declaration();
        } else if self.match_token(TokenKind::Const) {
            self.var_declaration(true);
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration(false);
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    pub(crate) fn statement(&mut self) {
        if self.check(TokenKind::Semicolon) {
            self.advance();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Switch) {
            self.switch_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::Do) {
            self.do_statement();
        } else if self.match_token(TokenKind::Import) {
            self.import_statement();
        } else if self.match_token(TokenKind::From) {
            self.from_import_statement();
        } else if self.match_token(TokenKind::Break) {
            self.break_statement();
        } else if self.match_token(TokenKind::Continue) {
            self.continue_statement();
        } else if self.check(TokenKind::Name) && self.multi_assign_ahead() {
            self.multiple_assignment();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    pub(crate) fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block");
    }

    fn expression_statement(&mut self) {
        self.expression();
        if self.vm.options.repl && self.state().kind == FunctionKind::Script {
            self.emit_op(OpCode::PopRepl);
        } else {
            self.emit_op(OpCode::Pop);
        }
    }

    // === Functions ===

    fn check_duplicate_parameter(&mut self, ident: &Ident) {
        let duplicate = self
            .state()
            .locals
            .iter()
            .rev()
            .any(|local| local.name == ident.text);
        if duplicate {
            self.error("Duplicate parameter name in function declaration");
        }
    }

    /// Parse a parameter list and emit the default-value prologue.
    fn begin_function(&mut self, kind: FunctionKind, name: Option<Ident>) {
        self.begin_state(kind, name);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name");

        if !self.check(TokenKind::RightParen) {
            let mut optional = false;
            let mut spread = false;

            loop {
                if spread {
                    self.error("Spread parameter must be last in the parameter list");
                }

                spread = self.match_token(TokenKind::DotDotDot);
                self.consume(TokenKind::Name, "Expect parameter name");
                let ident = self.ident_from_previous();
                self.check_duplicate_parameter(&ident);

                if spread {
                    self.state_mut().flags |= FunctionFlags::VARIADIC;
                }

                if self.match_token(TokenKind::Equal) {
                    if spread {
                        self.error("Spread parameter cannot have an optional value");
                    }
                    self.state_mut().arity_optional += 1;
                    self.state_mut().flags |= FunctionFlags::OPTIONALS;
                    optional = true;
                    self.expression();
                } else {
                    self.state_mut().arity += 1;
                    if optional && !spread {
                        self.error("Cannot have non-optional parameter after optional");
                    }
                }

                if self.state().arity as u32 + self.state().arity_optional as u32 > 255 {
                    self.error("Cannot have more than 255 parameters");
                }

                let constant = self.parse_variable_at(ident);
                self.define_variable(constant, false);

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }

            if self.state().arity_optional > 0 {
                let arity = self.state().arity;
                let arity_optional = self.state().arity_optional;
                self.emit_op(OpCode::DefineOptional);
                self.emit_raw(arity);
                self.emit_raw(arity_optional);
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after parameters");
    }

    pub(crate) fn function(&mut self, kind: FunctionKind, name: Option<Ident>) {
        self.begin_function(kind, name);
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body");
        self.block();
        self.end_state();
    }

    fn function_declaration(&mut self) {
        self.consume(TokenKind::Name, "Expect function name");
        let ident = self.ident_from_previous();

        if self.check(TokenKind::Dot) || self.check(TokenKind::Colon) {
            self.named_variable(ident, false);
            self.function_assignment();
            return;
        }

        let global = self.parse_variable_at(ident.clone());
        self.mark_initialized(false);
        self.function(FunctionKind::Function, Some(ident));
        self.define_variable(global, false);
    }

    /// `function target.prop() {}` and `function Class:method() {}`.
    fn function_assignment(&mut self) {
        if self.match_token(TokenKind::Dot) {
            self.consume(TokenKind::Name, "Expect property name");
            let ident = self.ident_from_previous();
            let constant = self.identifier_constant(&ident);
            if !self.check(TokenKind::LeftParen) {
                self.emit_argued(OpCode::GetProperty, constant);
                self.function_assignment();
            } else {
                self.function(FunctionKind::Function, Some(ident));
                self.emit_argued(OpCode::SetProperty, constant);
                self.emit_op(OpCode::Pop);
            }
        } else if self.match_token(TokenKind::Colon) {
            self.consume(TokenKind::Name, "Expect method name");
            let ident = self.ident_from_previous();
            let constant = self.identifier_constant(&ident);

            self.class_states.push(ClassState {
                has_superclass: false,
                is_static: false,
            });
            self.function(FunctionKind::Method, Some(ident));
            self.class_states.pop();

            self.emit_argued(OpCode::ExtensionMethod, constant);
        }
    }

    // === Classes ===

    fn method(&mut self, kind: FunctionKind) {
        let ident = self.ident_from_previous();
        let constant = self.identifier_constant(&ident);

        let kind = if ident.text == "constructor" {
            FunctionKind::Constructor
        } else {
            kind
        };

        self.function(kind, Some(ident));
        self.emit_argued(OpCode::Method, constant);
    }

    const OPERATORS: &'static [TokenKind] = &[
        TokenKind::Plus,
        TokenKind::Minus,
        TokenKind::Star,
        TokenKind::Slash,
        TokenKind::Percent,
        TokenKind::StarStar,
        TokenKind::Ampersand,
        TokenKind::Pipe,
        TokenKind::Tilde,
        TokenKind::Caret,
        TokenKind::LessLess,
        TokenKind::GreaterGreater,
        TokenKind::Less,
        TokenKind::LessEqual,
        TokenKind::Greater,
        TokenKind::GreaterEqual,
        TokenKind::EqualEqual,
        TokenKind::LeftBracket,
    ];

    /// An operator method: `+(a, b) { ... }` or `[](index, value) {}`.
    fn operator_method(&mut self) {
        let mut matched = false;
        for &kind in Self::OPERATORS {
            if self.match_token(kind) {
                matched = true;
                break;
            }
        }
        if !matched {
            self.error_at_current("Expect method name");
            self.advance();
            return;
        }

        let name = if self.previous.kind == TokenKind::LeftBracket {
            self.consume(TokenKind::RightBracket, "Expect ']' after '[' operator method");
            if let Some(class) = self.class_states.last_mut() {
                class.is_static = false;
            }
            Ident::synthetic("[]")
        } else {
            if let Some(class) = self.class_states.last_mut() {
                class.is_static = true;
            }
            self.ident_from_previous()
        };

        let constant = self.identifier_constant(&name);
        self.function(FunctionKind::Method, Some(name));
        self.emit_argued(OpCode::Method, constant);

        if let Some(class) = self.class_states.last_mut() {
            class.is_static = false;
        }
    }

    fn class_body(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if self.match_token(TokenKind::Var) {
                self.consume(TokenKind::Name, "Expect class variable name");
                let ident = self.ident_from_previous();
                let name = self.identifier_constant(&ident);
                if self.match_token(TokenKind::Equal) {
                    self.expression();
                } else {
                    self.emit_op(OpCode::Null);
                }
                self.emit_argued(OpCode::SetClassVar, name);
            } else if self.match_token(TokenKind::Static) {
                if let Some(class) = self.class_states.last_mut() {
                    class.is_static = true;
                }
                self.consume(TokenKind::Name, "Expect method name after 'static' keyword");
                self.method(FunctionKind::Static);
                if let Some(class) = self.class_states.last_mut() {
                    class.is_static = false;
                }
            } else if self.match_token(TokenKind::Name) {
                self.method(FunctionKind::Method);
            } else {
                self.operator_method();
            }
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Name, "Expect class name");
        let class_ident = self.ident_from_previous();
        let name_constant = self.identifier_constant(&class_ident);
        self.declare_variable(&class_ident);

        self.emit_argued(OpCode::Class, name_constant);
        self.define_variable(name_constant, false);

        self.class_states.push(ClassState {
            has_superclass: false,
            is_static: false,
        });

        let mut has_superclass = false;
        if self.match_token(TokenKind::Colon) {
            self.expression();

            self.begin_scope();
            self.add_local(Ident::synthetic("super"));
            self.define_variable(0, false);

            self.named_variable(class_ident.clone(), false);
            self.emit_op(OpCode::Inherit);
            has_superclass = true;
            if let Some(class) = self.class_states.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(class_ident, false);

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body");
        self.class_body();
        self.consume(TokenKind::RightBrace, "Expect '}' after class body");

        self.emit_op(OpCode::Pop);

        if has_superclass {
            self.end_scope();
        }
        self.class_states.pop();
    }

    // === Variable declarations ===

    fn var_declaration(&mut self, constant: bool) {
        let mut variables: Vec<Ident> = Vec::new();
        let mut rest_seen = 0u32;
        let mut rest_pos = 0usize;

        loop {
            if rest_seen > 1 {
                self.error("Multiple '...'");
            }

            let rest = self.match_token(TokenKind::DotDotDot);
            if rest {
                rest_seen += 1;
            }

            self.consume(TokenKind::Name, "Expect variable name");
            variables.push(self.ident_from_previous());
            if rest {
                rest_pos = variables.len();
            }

            // Plain single-variable initializer, possibly followed by
            // more `name = expr` pairs.
            if variables.len() == 1 && self.match_token(TokenKind::Equal) {
                if rest_seen > 0 {
                    self.error("Cannot rest single variable");
                }

                let global = self.parse_variable_at(variables[0].clone());
                self.expression();
                self.define_variable(global, constant);

                while self.match_token(TokenKind::Comma) {
                    let (global, _) = self.parse_variable("Expect variable name");
                    self.consume(TokenKind::Equal, "Expected an assignment");
                    self.expression();
                    self.define_variable(global, constant);
                }
                return;
            }

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        if rest_seen > 0 {
            self.consume(TokenKind::Equal, "Expected variable assignment");
            self.expression();
            self.emit_op(OpCode::UnpackRestList);
            self.emit_raw(variables.len() as u8);
            self.emit_raw((rest_pos - 1) as u8);
            self.adjust_slots(variables.len() as i32 - 1);
            self.finish_var_declaration(&variables, constant);
            return;
        }

        if self.match_token(TokenKind::Equal) {
            let mut expr_count = 0usize;
            loop {
                self.expression();
                expr_count += 1;
                if expr_count == 1 && !self.check(TokenKind::Comma) {
                    self.emit_argued(OpCode::UnpackList, variables.len() as u8);
                    self.adjust_slots(variables.len() as i32 - 1);
                    self.finish_var_declaration(&variables, constant);
                    return;
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
            if expr_count != variables.len() {
                self.error("Not enough values to assign to");
            }
        } else {
            for _ in 0..variables.len() {
                self.emit_op(OpCode::Null);
            }
        }

        self.finish_var_declaration(&variables, constant);
    }

    fn finish_var_declaration(&mut self, variables: &[Ident], constant: bool) {
        if self.state().scope_depth == 0 {
            for ident in variables.iter().rev() {
                let index = self.identifier_constant(ident);
                self.define_variable(index, constant);
            }
        } else {
            for ident in variables {
                self.declare_variable(ident);
                self.define_variable(0, constant);
            }
        }
    }

    // === Multiple assignment ===

    /// After a leading name: does `(, NAME)+ =` follow?
    fn multi_assign_ahead(&self) -> bool {
        let mut lexer = self.lexer.clone();
        let mut token = lexer.next_token();
        if token.kind != TokenKind::Comma {
            return false;
        }
        loop {
            token = lexer.next_token();
            if token.kind != TokenKind::Name {
                return false;
            }
            token = lexer.next_token();
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::Equal => return true,
                _ => return false,
            }
        }
    }

    fn multiple_assignment(&mut self) {
        self.consume(TokenKind::Name, "Expect variable name");
        let mut variables = vec![self.ident_from_previous()];

        while self.match_token(TokenKind::Comma) {
            self.consume(TokenKind::Name, "Expect variable name");
            variables.push(self.ident_from_previous());
        }

        self.consume(TokenKind::Equal, "Expect '=' multiple assignment");

        let mut expr_count = 0usize;
        let mut unpacked = false;
        loop {
            self.expression();
            expr_count += 1;
            if expr_count == 1 && !self.check(TokenKind::Comma) {
                self.emit_argued(OpCode::UnpackList, variables.len() as u8);
                self.adjust_slots(variables.len() as i32 - 1);
                unpacked = true;
                break;
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        if !unpacked && expr_count != variables.len() {
            self.error("Not enough values to assign to");
        }

        for ident in variables.iter().rev() {
            let (_, set_op, arg) = self.resolve_variable(ident);
            self.check_const(set_op, arg);
            self.emit_argued(set_op, arg);
            self.emit_op(OpCode::Pop);
        }
    }

    // === Control flow ===

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition");

        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }

        self.patch_jump(end_jump);
    }

    fn switch_statement(&mut self) {
        let mut case_ends: Vec<usize> = Vec::new();

        self.consume(TokenKind::LeftParen, "Expect '(' after switch");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression");
        self.consume(TokenKind::LeftBrace, "Expect '{' before switch body");

        if self.match_token(TokenKind::Case) {
            loop {
                self.expression();
                let mut extra_cases = 0u32;
                if self.match_token(TokenKind::Comma) {
                    loop {
                        extra_cases += 1;
                        self.expression();
                        if !self.match_token(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.emit_argued(OpCode::MultiCase, extra_cases as u8);
                    self.adjust_slots(-(extra_cases as i32 - 1));
                }
                let compare_jump = self.emit_jump(OpCode::CompareJump);
                self.consume(TokenKind::Colon, "Expect ':' after expression");
                self.statement();
                case_ends.push(self.emit_jump(OpCode::Jump));
                self.patch_jump(compare_jump);
                if case_ends.len() > 255 {
                    self.error_at_current("Switch statement can not have more than 256 case blocks");
                }
                if !self.match_token(TokenKind::Case) {
                    break;
                }
            }
        }

        self.emit_op(OpCode::Pop); // Switch expression.
        if self.match_token(TokenKind::Default) {
            self.consume(TokenKind::Colon, "Expect ':' after default");
            self.statement();
        }

        if self.match_token(TokenKind::Case) {
            self.error("Unexpected case after default");
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after switch body");

        for end in case_ends {
            self.patch_jump(end);
        }
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error("Can't return from top-level code");
        }

        if self.check(TokenKind::RightBrace) || self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.state().kind == FunctionKind::Constructor {
                self.error("Can't return a value from a constructor");
            }
            self.expression();
            self.emit_op(OpCode::Return);
        }
    }

    fn while_statement(&mut self) {
        self.begin_loop();

        if !self.check(TokenKind::LeftParen) {
            self.emit_op(OpCode::True);
        } else {
            self.consume(TokenKind::LeftParen, "Expect '(' after 'while'");
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after condition");
        }

        let end = self.emit_jump(OpCode::JumpIfFalse);
        self.set_loop_end(end);
        self.emit_op(OpCode::Pop);

        self.set_loop_body();
        self.statement();

        let start = self.current_loop().start;
        self.emit_loop(start);
        self.end_loop();
    }

    fn do_statement(&mut self) {
        self.begin_loop();

        self.set_loop_body();
        self.statement();

        self.consume(TokenKind::While, "Expect while after do statement");

        if !self.check(TokenKind::LeftParen) {
            self.emit_op(OpCode::True);
        } else {
            self.consume(TokenKind::LeftParen, "Expect '(' after 'while'");
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after condition");
        }

        let end = self.emit_jump(OpCode::JumpIfFalse);
        self.set_loop_end(end);
        self.emit_op(OpCode::Pop);

        let start = self.current_loop().start;
        self.emit_loop(start);
        self.end_loop();
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'");

        let is_var = self.match_token(TokenKind::Var);
        let constant = !is_var && self.match_token(TokenKind::Const);
        if is_var || constant {
            self.consume(TokenKind::Name, "Expect variable name");
            let ident = self.ident_from_previous();

            if self.check(TokenKind::In) || self.check(TokenKind::Comma) {
                self.for_in_statement(ident, constant);
                return;
            }

            let global = self.parse_variable_at(ident);
            if self.match_token(TokenKind::Equal) {
                self.expression();
            } else {
                self.emit_op(OpCode::Null);
            }
            self.define_variable(global, constant);
            self.consume(TokenKind::Semicolon, "Expect ';' after loop variable");
        } else {
            self.expression_statement();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop expression");
        }

        self.begin_loop();

        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after loop condition");

        let end = self.emit_jump(OpCode::JumpIfFalse);
        self.set_loop_end(end);
        self.emit_op(OpCode::Pop);

        let body_jump = self.emit_jump(OpCode::Jump);

        let increment_start = self.state().chunk.code.len();
        self.expression();
        self.emit_op(OpCode::Pop);
        self.consume(TokenKind::RightParen, "Expect ')' after for clauses");

        let start = self.current_loop().start;
        self.emit_loop(start);
        self.set_loop_start(increment_start);

        self.patch_jump(body_jump);

        self.set_loop_body();
        self.statement();

        let start = self.current_loop().start;
        self.emit_loop(start);

        self.end_loop();
        self.end_scope();
    }

    /// `for (var x in seq)` lowers onto the iterator protocol: the
    /// sequence's `iterate`/`iteratorvalue` methods drive the loop
    /// through two hidden locals.
    fn for_in_statement(&mut self, first: Ident, constant: bool) {
        if self.state().locals.len() + 2 > 256 {
            self.error("Too many local variables in function");
        }

        let mut variables = vec![first];
        if self.match_token(TokenKind::Comma) {
            loop {
                self.consume(TokenKind::Name, "Expect variable name");
                variables.push(self.ident_from_previous());
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::In, "Expect for iterator");

        self.expression();
        let seq_slot = self.add_init_local(Ident::synthetic("seq ")) as u8;

        self.emit_op(OpCode::Null);
        let iter_slot = self.add_init_local(Ident::synthetic("iter ")) as u8;

        self.consume(TokenKind::RightParen, "Expect ')' after loop expression");

        self.begin_loop();

        // iter = seq.iterate(iter); loop ends when it returns null.
        self.emit_argued(OpCode::GetLocal, seq_slot);
        self.emit_argued(OpCode::GetLocal, iter_slot);
        self.invoke_method(1, "iterate");
        self.emit_argued(OpCode::SetLocal, iter_slot);
        let end = self.emit_jump(OpCode::JumpIfNull);
        self.set_loop_end(end);
        self.emit_op(OpCode::Pop);

        // The loop variables receive seq.iteratorvalue(iter).
        self.emit_argued(OpCode::GetLocal, seq_slot);
        self.emit_argued(OpCode::GetLocal, iter_slot);
        self.invoke_method(1, "iteratorvalue");

        self.begin_scope();

        if variables.len() > 1 {
            self.emit_argued(OpCode::UnpackList, variables.len() as u8);
            self.adjust_slots(variables.len() as i32 - 1);
        }
        for ident in &variables {
            self.declare_variable(ident);
            self.define_variable(0, constant);
        }

        self.set_loop_body();
        self.statement();

        self.end_scope();

        let start = self.current_loop().start;
        self.emit_loop(start);
        self.end_loop();

        // Hidden locals.
        self.end_scope();
    }

    fn break_statement(&mut self) {
        if !self.in_loop() {
            self.error("Cannot use 'break' outside of a loop");
            return;
        }

        // Discard locals created inside the loop, then leave a
        // sentinel the loop closer rewrites into a forward jump.
        let depth = self.current_loop().scope_depth + 1;
        self.discard_locals(depth);
        self.emit_jump(OpCode::End);
    }

    fn continue_statement(&mut self) {
        if !self.in_loop() {
            self.error("Cannot use 'continue' outside of a loop");
            return;
        }

        let depth = self.current_loop().scope_depth + 1;
        self.discard_locals(depth);
        let start = self.current_loop().start;
        self.emit_loop(start);
    }

    // === Imports ===

    fn import_path_constant(&mut self) -> u8 {
        let path = match self.previous.value.clone() {
            TokenValue::String(s) => s,
            _ => String::new(),
        };
        let handle = self.vm.intern_owned(path);
        self.make_constant(Value::object(handle))
    }

    fn import_statement(&mut self) {
        if self.match_token(TokenKind::String) {
            let constant = self.import_path_constant();

            self.emit_argued(OpCode::ImportString, constant);
            self.emit_op(OpCode::Pop);

            if self.match_token(TokenKind::As) {
                let (name, _) = self.parse_variable("Expect import alias");
                self.emit_op(OpCode::ImportAlias);
                self.define_variable(name, false);
            }

            self.emit_op(OpCode::ImportEnd);

            if self.match_token(TokenKind::Comma) {
                self.import_statement();
            }
        } else {
            self.consume(TokenKind::Name, "Expect import identifier");
            let ident = self.ident_from_previous();
            let name = self.identifier_constant(&ident);
            self.declare_variable(&ident);

            if self.match_token(TokenKind::As) {
                let (alias, _) = self.parse_variable("Expect import alias");
                self.emit_argued(OpCode::ImportName, name);
                self.define_variable(alias, false);
            } else {
                self.emit_argued(OpCode::ImportName, name);
                self.define_variable(name, false);
            }

            self.emit_op(OpCode::ImportEnd);

            if self.match_token(TokenKind::Comma) {
                self.import_statement();
            }
        }
    }

    fn from_import_statement(&mut self) {
        if self.match_token(TokenKind::String) {
            let constant = self.import_path_constant();
            self.consume(TokenKind::Import, "Expect 'import' after import path");
            self.emit_argued(OpCode::ImportString, constant);
            self.emit_op(OpCode::Pop);
        } else {
            self.consume(TokenKind::Name, "Expect import identifier");
            let ident = self.ident_from_previous();
            let name = self.identifier_constant(&ident);
            self.consume(TokenKind::Import, "Expect 'import' after identifier");
            self.emit_argued(OpCode::ImportName, name);
            self.emit_op(OpCode::Pop);
        }

        let mut var_count = 0u32;
        loop {
            self.consume(TokenKind::Name, "Expect variable name");
            let ident = self.ident_from_previous();
            let var_constant = self.identifier_constant(&ident);

            let slot = if self.match_token(TokenKind::As) {
                let (slot, _) = self.parse_variable("Expect variable name");
                slot
            } else {
                self.parse_variable_at(ident)
            };

            self.emit_argued(OpCode::ImportVariable, var_constant);
            self.define_variable(slot, false);

            var_count += 1;
            if var_count > 255 {
                self.error("Cannot have more than 255 variables");
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.emit_op(OpCode::ImportEnd);
    }
}
