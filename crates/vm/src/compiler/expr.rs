//! Expression parsing: the Pratt table and its parse functions.
//!
//! These functions are the only place in the crate that emits
//! expression bytecode; each consumes tokens for one construct and
//! leaves exactly one value on the stack.

use super::{Ident, Parser};
use crate::limits::MAX_ARGS;
use crate::object::FunctionKind;
use crate::opcode::OpCode;
use crate::token::{TokenKind, TokenValue};
use crate::value::Value;

type ParseFn<'s, 'v> = fn(&mut Parser<'s, 'v>, bool);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub(crate) enum Precedence {
    None,
    Assignment, // =
    Ternary,    // ?:
    Or,         // or
    And,        // and
    Equality,   // == !=
    Is,         // is
    Comparison, // < <= > >= in
    Bor,        // |
    Bxor,       // ^
    Band,       // &
    Shift,      // << >>
    Range,      // ..
    Term,       // + -
    Factor,     // * / %
    Indices,    // **
    Unary,      // - ! ~ not
    Subscript,  // []
    Call,       // () .
    Primary,
}

impl Precedence {
    const ALL: &'static [Precedence] = &[
        Precedence::None,
        Precedence::Assignment,
        Precedence::Ternary,
        Precedence::Or,
        Precedence::And,
        Precedence::Equality,
        Precedence::Is,
        Precedence::Comparison,
        Precedence::Bor,
        Precedence::Bxor,
        Precedence::Band,
        Precedence::Shift,
        Precedence::Range,
        Precedence::Term,
        Precedence::Factor,
        Precedence::Indices,
        Precedence::Unary,
        Precedence::Subscript,
        Precedence::Call,
        Precedence::Primary,
    ];

    fn next(self) -> Precedence {
        let index = (self as usize + 1).min(Self::ALL.len() - 1);
        Self::ALL[index]
    }
}

pub(crate) struct ParseRule<'s, 'v> {
    prefix: Option<ParseFn<'s, 'v>>,
    infix: Option<ParseFn<'s, 'v>>,
    precedence: Precedence,
}

fn rule<'s, 'v>(kind: TokenKind) -> ParseRule<'s, 'v> {
    use Precedence as P;
    use TokenKind as T;

    fn make<'s, 'v>(
        prefix: Option<ParseFn<'s, 'v>>,
        infix: Option<ParseFn<'s, 'v>>,
        precedence: Precedence,
    ) -> ParseRule<'s, 'v> {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }

    match kind {
        T::LeftParen => make(Some(Parser::grouping), Some(Parser::call_expr), P::Call),
        T::LeftBracket => make(Some(Parser::list), Some(Parser::subscript_expr), P::Subscript),
        T::LeftBrace => make(Some(Parser::map), None, P::None),
        T::Dot => make(None, Some(Parser::dot), P::Call),
        T::Question => make(None, Some(Parser::ternary), P::Ternary),
        T::Minus => make(Some(Parser::unary), Some(Parser::binary), P::Term),
        T::Plus => make(None, Some(Parser::binary), P::Term),
        T::Slash | T::Star | T::Percent => make(None, Some(Parser::binary), P::Factor),
        T::Bang => make(Some(Parser::unary), Some(Parser::binary), P::Is),
        T::BangEqual | T::EqualEqual => make(None, Some(Parser::binary), P::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            make(None, Some(Parser::binary), P::Comparison)
        }
        T::In => make(None, Some(Parser::binary), P::Comparison),
        T::Is => make(None, Some(Parser::binary), P::Is),
        T::StarStar => make(None, Some(Parser::binary), P::Indices),
        T::DotDot => make(None, Some(Parser::range), P::Range),
        T::Ampersand => make(None, Some(Parser::binary), P::Band),
        T::Pipe => make(None, Some(Parser::binary), P::Bor),
        T::Caret => make(None, Some(Parser::binary), P::Bxor),
        T::Tilde => make(Some(Parser::unary), None, P::None),
        T::GreaterGreater | T::LessLess => make(None, Some(Parser::binary), P::Shift),
        T::Name => make(Some(Parser::variable), None, P::None),
        T::String => make(Some(Parser::literal), None, P::None),
        T::Interpolation => make(Some(Parser::interpolation), None, P::None),
        T::Number => make(Some(Parser::literal), None, P::None),
        T::And => make(None, Some(Parser::and_), P::And),
        T::Or => make(None, Some(Parser::or_), P::Or),
        T::False | T::True => make(Some(Parser::boolean), None, P::None),
        T::Null => make(Some(Parser::null), None, P::None),
        T::Function => make(Some(Parser::anonymous), None, P::None),
        T::Super => make(Some(Parser::super_), None, P::None),
        T::This => make(Some(Parser::this_), None, P::None),
        T::Static => make(Some(Parser::static_), None, P::None),
        _ => make(None, None, P::None),
    }
}

impl<'s, 'v> Parser<'s, 'v> {
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = match rule(self.previous.kind).prefix {
            Some(prefix) => prefix,
            None => {
                self.error("Expect expression");
                return;
            }
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target");
        }
    }

    pub(crate) fn argument_list(&mut self) -> u8 {
        let mut arg_count: usize = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if arg_count == MAX_ARGS {
                    self.error("Can't have more than 255 arguments");
                }
                arg_count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments");
        arg_count.min(MAX_ARGS) as u8
    }

    /// Compound-assignment operator at the current token, if any.
    fn compound_op(&self) -> Option<OpCode> {
        match self.current.kind {
            TokenKind::PlusEqual => Some(OpCode::Add),
            TokenKind::MinusEqual => Some(OpCode::Subtract),
            TokenKind::StarEqual => Some(OpCode::Multiply),
            TokenKind::SlashEqual => Some(OpCode::Divide),
            TokenKind::PercentEqual => Some(OpCode::Mod),
            TokenKind::StarStarEqual => Some(OpCode::Pow),
            TokenKind::AmpersandEqual => Some(OpCode::Band),
            TokenKind::PipeEqual => Some(OpCode::Bor),
            TokenKind::CaretEqual => Some(OpCode::Bxor),
            _ => None,
        }
    }

    // === Prefix functions ===

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.value.clone() {
            TokenValue::Number(n) => self.emit_constant(Value::number(n)),
            TokenValue::String(s) => {
                let handle = self.vm.intern_owned(s);
                self.emit_constant(Value::object(handle));
            }
            _ => self.error("Expect literal"),
        }
    }

    fn boolean(&mut self, _can_assign: bool) {
        let op = if self.previous.kind == TokenKind::False {
            OpCode::False
        } else {
            OpCode::True
        };
        self.emit_op(op);
    }

    fn null(&mut self, _can_assign: bool) {
        self.emit_op(OpCode::Null);
    }

    fn variable(&mut self, can_assign: bool) {
        let ident = self.ident_from_previous();
        self.named_variable(ident, can_assign);
    }

    /// A string literal broken by `{expression}` segments lowers to
    /// building a list of parts and joining it.
    fn interpolation(&mut self, _can_assign: bool) {
        self.emit_op(OpCode::List);

        loop {
            self.literal(false);
            self.invoke_method(1, "add");

            self.expression();
            self.invoke_method(1, "add");

            if !self.match_token(TokenKind::Interpolation) {
                break;
            }
        }

        self.consume(TokenKind::String, "Expect end of string interpolation");
        self.literal(false);
        self.invoke_method(1, "add");

        self.invoke_method(0, "join");
    }

    fn list(&mut self, _can_assign: bool) {
        self.emit_op(OpCode::List);

        if !self.check(TokenKind::RightBracket) {
            loop {
                if self.check(TokenKind::RightBracket) {
                    // Trailing comma.
                    break;
                }
                self.expression();
                self.emit_op(OpCode::PushListItem);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightBracket, "Expect ']' after list literal");
    }

    fn map(&mut self, _can_assign: bool) {
        self.emit_op(OpCode::Map);

        if !self.check(TokenKind::RightBrace) {
            loop {
                if self.check(TokenKind::RightBrace) {
                    // Trailing comma.
                    break;
                }
                if self.match_token(TokenKind::LeftBracket) {
                    self.expression();
                    self.consume(TokenKind::RightBracket, "Expect ']' after key expression");
                    self.consume(TokenKind::Equal, "Expected '=' after key expression");
                    self.expression();
                } else if self.match_token(TokenKind::Name) {
                    let ident = self.ident_from_previous();
                    let handle = self.vm.intern(&ident.text);
                    self.emit_constant(Value::object(handle));
                    self.consume(TokenKind::Equal, "Expected '=' after key name");
                    self.expression();
                } else {
                    self.error_at_current("Expect map key");
                    break;
                }
                self.emit_op(OpCode::PushMapField);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after map literal");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Tilde => self.emit_op(OpCode::Bnot),
            _ => {}
        }
    }

    /// `(` opens a grouping, an arrow-function parameter list, or the
    /// empty `()` of a zero-argument arrow. A lookahead over a cloned
    /// lexer decides without consuming anything.
    fn grouping(&mut self, _can_assign: bool) {
        if self.check(TokenKind::RightParen) || self.arrow_ahead() {
            self.arrow_function();
            return;
        }
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after grouping expression");
    }

    /// After `(`: does `NAME (, NAME)* ) =>` follow?
    fn arrow_ahead(&self) -> bool {
        let mut lexer = self.lexer.clone();
        let mut token = self.current.clone();
        loop {
            if token.kind != TokenKind::Name {
                return false;
            }
            token = lexer.next_token();
            if token.kind == TokenKind::Comma {
                token = lexer.next_token();
                continue;
            }
            if token.kind == TokenKind::RightParen {
                return lexer.next_token().kind == TokenKind::Arrow;
            }
            return false;
        }
    }

    fn arrow_function(&mut self) {
        self.begin_state(FunctionKind::Function, None);
        self.begin_scope();

        if !self.check(TokenKind::RightParen) {
            loop {
                self.state_mut().arity += 1;
                if self.state().arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters");
                }
                let (constant, _) = self.parse_variable("Expect parameter name");
                self.define_variable(constant, false);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after parameters");
        self.consume(TokenKind::Arrow, "Expect '=>' after function arguments");

        if self.match_token(TokenKind::LeftBrace) {
            self.block();
        } else {
            self.expression();
            self.emit_op(OpCode::Return);
        }

        self.end_state();
    }

    fn anonymous(&mut self, _can_assign: bool) {
        self.function(FunctionKind::Function, None);
    }

    fn super_(&mut self, _can_assign: bool) {
        match self.class_states.last() {
            None => self.error("Can't use 'super' outside of a class"),
            Some(class) if class.is_static => {
                self.error("Can't use 'super' inside a static method")
            }
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass")
            }
            _ => {}
        }

        // Bare `super`.
        if !self.check(TokenKind::LeftParen) && !self.check(TokenKind::Dot) {
            self.named_variable(Ident::synthetic("super"), false);
            return;
        }

        // `super(...)` forwards to the superclass constructor.
        if self.match_token(TokenKind::LeftParen) {
            let constant = {
                let ident = Ident::synthetic("constructor");
                self.identifier_constant(&ident)
            };
            self.named_variable(Ident::synthetic("this"), false);
            let arg_count = self.argument_list();
            self.named_variable(Ident::synthetic("super"), false);
            self.emit_argued(OpCode::Super, constant);
            self.emit_raw(arg_count);
            self.adjust_slots(-(arg_count as i32));
            return;
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'");
        self.consume(TokenKind::Name, "Expect superclass method name");
        let ident = self.ident_from_previous();
        let constant = self.identifier_constant(&ident);

        self.named_variable(Ident::synthetic("this"), false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable(Ident::synthetic("super"), false);
            self.emit_argued(OpCode::Super, constant);
            self.emit_raw(arg_count);
            self.adjust_slots(-(arg_count as i32));
        } else {
            self.named_variable(Ident::synthetic("super"), false);
            self.emit_argued(OpCode::GetSuper, constant);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        match self.class_states.last() {
            None => self.error("Can't use 'this' outside of a class"),
            Some(class) if class.is_static => {
                self.error("Can't use 'this' inside a static method")
            }
            _ => {}
        }
        self.named_variable(Ident::synthetic("this"), false);
    }

    fn static_(&mut self, _can_assign: bool) {
        if self.class_states.is_empty() {
            self.error("Can't use 'static' outside of a class");
        }
    }

    // === Infix functions ===

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;

        // `not in` arrives as a Bang infix.
        if operator == TokenKind::Bang {
            self.consume(TokenKind::In, "Expected 'not in' binary operator");
            self.parse_precedence(rule(operator).precedence.next());
            self.emit_ops(OpCode::In, OpCode::Not);
            return;
        }

        // `is not` is a two-token operator.
        if operator == TokenKind::Is && self.match_token(TokenKind::Bang) {
            self.parse_precedence(rule(operator).precedence.next());
            self.emit_ops(OpCode::Is, OpCode::Not);
            return;
        }

        // `**` is right-associative; everything else binds left.
        let precedence = if operator == TokenKind::StarStar {
            rule(operator).precedence
        } else {
            rule(operator).precedence.next()
        };
        self.parse_precedence(precedence);

        match operator {
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Is => self.emit_op(OpCode::Is),
            TokenKind::In => self.emit_op(OpCode::In),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_op(OpCode::GreaterEqual),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_op(OpCode::LessEqual),
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::Percent => self.emit_op(OpCode::Mod),
            TokenKind::StarStar => self.emit_op(OpCode::Pow),
            TokenKind::Ampersand => self.emit_op(OpCode::Band),
            TokenKind::Pipe => self.emit_op(OpCode::Bor),
            TokenKind::Caret => self.emit_op(OpCode::Bxor),
            TokenKind::GreaterGreater => self.emit_op(OpCode::Rshift),
            TokenKind::LessLess => self.emit_op(OpCode::Lshift),
            _ => {}
        }
    }

    fn ternary(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.expression();
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.consume(TokenKind::Colon, "Expected colon after ternary expression");
        self.expression();

        self.patch_jump(end_jump);
    }

    fn and_(&mut self, _can_assign: bool) {
        let jump = self.emit_jump(OpCode::And);
        self.parse_precedence(Precedence::And);
        self.patch_jump(jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let jump = self.emit_jump(OpCode::Or);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(jump);
    }

    fn range(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(rule(operator).precedence.next());

        if self.match_token(TokenKind::DotDot) {
            // `a..b..step`
            let step_operator = self.previous.kind;
            self.parse_precedence(rule(step_operator).precedence.next());
        } else {
            self.emit_constant(Value::number(1.0));
        }

        self.emit_op(OpCode::Range);
    }

    fn call_expr(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_argued(OpCode::Call, arg_count);
        self.adjust_slots(-(arg_count as i32));
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Name, "Expect property name after '.'");
        let ident = self.ident_from_previous();
        let name = self.identifier_constant(&ident);

        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_argued(OpCode::Invoke, name);
            self.emit_raw(arg_count);
            self.adjust_slots(-(arg_count as i32));
            return;
        }

        let compound = if can_assign { self.compound_op() } else { None };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_argued(OpCode::SetProperty, name);
        } else if let Some(op) = compound {
            self.advance();
            self.emit_argued(OpCode::GetPropertyNoPop, name);
            self.expression();
            self.emit_op(op);
            self.emit_argued(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::PlusPlus) {
            self.emit_argued(OpCode::GetPropertyNoPop, name);
            self.emit_constant(Value::number(1.0));
            self.emit_op(OpCode::Add);
            self.emit_argued(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::MinusMinus) {
            self.emit_argued(OpCode::GetPropertyNoPop, name);
            self.emit_constant(Value::number(1.0));
            self.emit_op(OpCode::Subtract);
            self.emit_argued(OpCode::SetProperty, name);
        } else {
            self.emit_argued(OpCode::GetProperty, name);
        }
    }

    /// `[` after a value: subscript, slice, or their assignment forms.
    fn subscript_expr(&mut self, can_assign: bool) {
        // A slice with every index omissible: [a], [a:], [a:b:c], [:],
        // [::-1], ...
        let slice = if self.match_token(TokenKind::Colon) {
            self.emit_op(OpCode::Null);
            true
        } else {
            self.expression();
            self.match_token(TokenKind::Colon)
        };

        if slice {
            if self.check(TokenKind::RightBracket) {
                self.emit_op(OpCode::Null);
                self.emit_constant(Value::number(1.0));
            } else if self.match_token(TokenKind::Colon) {
                self.emit_op(OpCode::Null);
                self.expression();
            } else {
                self.expression();
                if self.match_token(TokenKind::Colon) {
                    if self.check(TokenKind::RightBracket) {
                        self.emit_constant(Value::number(1.0));
                    } else {
                        self.expression();
                    }
                } else {
                    self.emit_constant(Value::number(1.0));
                }
            }
            self.emit_op(OpCode::Slice);
            self.consume(TokenKind::RightBracket, "Expect ']' after slice");
            return;
        }

        self.consume(TokenKind::RightBracket, "Expect ']' after subscript");

        let compound = if can_assign { self.compound_op() } else { None };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::SubscriptStore);
        } else if let Some(op) = compound {
            self.advance();
            self.expression();
            self.emit_ops(OpCode::SubscriptPush, op);
            self.emit_op(OpCode::SubscriptStore);
        } else if self.match_token(TokenKind::PlusPlus) {
            self.emit_constant(Value::number(1.0));
            self.emit_ops(OpCode::SubscriptPush, OpCode::Add);
            self.emit_op(OpCode::SubscriptStore);
        } else if self.match_token(TokenKind::MinusMinus) {
            self.emit_constant(Value::number(1.0));
            self.emit_ops(OpCode::SubscriptPush, OpCode::Subtract);
            self.emit_op(OpCode::SubscriptStore);
        } else {
            self.emit_op(OpCode::Subscript);
        }
    }

    // === Variables ===

    /// Resolve `ident` to its get/set opcodes: local slot, upvalue, or
    /// module-scope name (globals win if the host seeded one).
    pub(crate) fn resolve_variable(&mut self, ident: &Ident) -> (OpCode, OpCode, u8) {
        if let Some(local) = self.resolve_local(&ident.text) {
            return (OpCode::GetLocal, OpCode::SetLocal, local as u8);
        }
        if let Some(upvalue) = self.resolve_upvalue(&ident.text) {
            return (OpCode::GetUpvalue, OpCode::SetUpvalue, upvalue);
        }

        let arg = self.identifier_constant(ident);
        let handle = self.vm.intern(&ident.text);
        let hash = self.vm.heap.string_hash(handle);
        if self.vm.globals.get(handle, hash).is_some() {
            (OpCode::GetGlobal, OpCode::SetGlobal, arg)
        } else {
            (OpCode::GetModule, OpCode::SetModule, arg)
        }
    }

    pub(crate) fn named_variable(&mut self, ident: Ident, can_assign: bool) {
        let (get_op, set_op, arg) = self.resolve_variable(&ident);

        let compound = if can_assign { self.compound_op() } else { None };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.check_const(set_op, arg);
            self.expression();
            self.emit_argued(set_op, arg);
        } else if let Some(op) = compound {
            self.advance();
            self.check_const(set_op, arg);
            self.emit_argued(get_op, arg);
            self.expression();
            self.emit_op(op);
            self.emit_argued(set_op, arg);
        } else if self.match_token(TokenKind::PlusPlus) {
            self.check_const(set_op, arg);
            self.emit_argued(get_op, arg);
            self.emit_constant(Value::number(1.0));
            self.emit_op(OpCode::Add);
            self.emit_argued(set_op, arg);
        } else if self.match_token(TokenKind::MinusMinus) {
            self.check_const(set_op, arg);
            self.emit_argued(get_op, arg);
            self.emit_constant(Value::number(1.0));
            self.emit_op(OpCode::Subtract);
            self.emit_argued(set_op, arg);
        } else {
            self.emit_argued(get_op, arg);
        }
    }
}
