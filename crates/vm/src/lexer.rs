//! Source scanner.
//!
//! Byte-oriented over UTF-8 text (a leading BOM is skipped). Number
//! literals accept `0x`/`0b`/`0c` bases, `_` digit separators, and
//! scientific notation. Non-raw strings support escapes and up to four
//! nesting levels of `{expression}` interpolation; an `r` prefix makes
//! backslashes literal. Comments are `//`, nesting `/* */`, and a
//! first-line shebang.

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::limits::MAX_INTERPOLATION_NESTING;
use crate::token::{Token, TokenKind, TokenValue};

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from_iter([
        ("and", TokenKind::And),
        ("as", TokenKind::As),
        ("break", TokenKind::Break),
        ("case", TokenKind::Case),
        ("class", TokenKind::Class),
        ("const", TokenKind::Const),
        ("continue", TokenKind::Continue),
        ("default", TokenKind::Default),
        ("do", TokenKind::Do),
        ("else", TokenKind::Else),
        ("enum", TokenKind::Enum),
        ("false", TokenKind::False),
        ("for", TokenKind::For),
        ("from", TokenKind::From),
        ("function", TokenKind::Function),
        ("if", TokenKind::If),
        ("import", TokenKind::Import),
        ("in", TokenKind::In),
        ("is", TokenKind::Is),
        ("not", TokenKind::Bang),
        ("null", TokenKind::Null),
        ("or", TokenKind::Or),
        ("return", TokenKind::Return),
        ("static", TokenKind::Static),
        ("super", TokenKind::Super),
        ("switch", TokenKind::Switch),
        ("this", TokenKind::This),
        ("true", TokenKind::True),
        ("var", TokenKind::Var),
        ("while", TokenKind::While),
    ])
});

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_name_part(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// The scanner. `Clone` deliberately: the parser snapshots and restores
/// it for the couple of places that need unbounded lookahead (arrow
/// functions, multiple assignment).
#[derive(Clone)]
pub struct Lexer<'s> {
    source: &'s str,
    start: usize,
    current: usize,
    line: u32,
    /// Quote character of the string being scanned.
    quote: u8,
    /// Backslashes are literal in the string being scanned.
    raw: bool,
    /// Open-brace depth per interpolation nesting level.
    braces: [u8; MAX_INTERPOLATION_NESTING],
    num_braces: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Lexer<'s> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Lexer {
            source,
            start: 0,
            current: 0,
            line: 1,
            quote: b'"',
            raw: false,
            braces: [0; MAX_INTERPOLATION_NESTING],
            num_braces: 0,
        }
    }

    /// The scanned source, BOM already stripped.
    pub fn source(&self) -> &'s str {
        self.source
    }

    fn at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> u8 {
        *self.source.as_bytes().get(self.current).unwrap_or(&0)
    }

    fn peek_next(&self) -> u8 {
        *self.source.as_bytes().get(self.current + 1).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.current += 1;
        c
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek() != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            start: self.start,
            length: self.current - self.start,
            line: self.line,
            value: TokenValue::None,
        }
    }

    fn make_value(&self, kind: TokenKind, value: TokenValue) -> Token {
        Token {
            value,
            ..self.make(kind)
        }
    }

    fn error(&self, message: &'static str) -> Token {
        Token {
            kind: TokenKind::Error,
            start: self.start,
            length: self.current - self.start,
            line: self.line,
            value: TokenValue::Error(message),
        }
    }

    fn pick(&mut self, a: u8, ka: TokenKind, b: u8, kb: TokenKind, fallback: TokenKind) -> Token {
        let kind = if self.match_char(a) {
            ka
        } else if self.match_char(b) {
            kb
        } else {
            fallback
        };
        self.make(kind)
    }

    fn skip_line_comment(&mut self) {
        while self.peek() != b'\n' && !self.at_end() {
            self.current += 1;
        }
    }

    /// Returns an error token on an unterminated block comment.
    fn skip_whitespace(&mut self) -> Option<Token> {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'#' => {
                    if self.line == 1 && self.peek_next() == b'!' {
                        self.skip_line_comment();
                    } else {
                        return None;
                    }
                }
                b'/' => {
                    if self.peek_next() == b'/' {
                        self.skip_line_comment();
                    } else if self.peek_next() == b'*' {
                        self.current += 2;
                        let mut nesting = 1;
                        while nesting > 0 {
                            if self.at_end() {
                                return Some(self.error("Unterminated block comment"));
                            }
                            if self.peek() == b'/' && self.peek_next() == b'*' {
                                self.current += 2;
                                nesting += 1;
                            } else if self.peek() == b'*' && self.peek_next() == b'/' {
                                self.current += 2;
                                nesting -= 1;
                            } else {
                                if self.peek() == b'\n' {
                                    self.line += 1;
                                }
                                self.current += 1;
                            }
                        }
                    } else {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }

    fn identifier(&mut self) -> Token {
        while is_name_part(self.peek()) {
            self.current += 1;
        }
        let text = &self.source[self.start..self.current];
        let kind = KEYWORDS.get(text).copied().unwrap_or(TokenKind::Name);
        self.make(kind)
    }

    /// Scan digits, allowing `_` separators between digits only.
    /// `seen_digit` seeds the state when the caller already consumed
    /// the first digit. Returns an error on misplaced underscores.
    fn digits(&mut self, is_digit: fn(u8) -> bool, seen_digit: bool) -> Result<(), &'static str> {
        let mut last_underscore = false;
        let mut any = seen_digit;
        loop {
            let c = self.peek();
            if c == b'_' {
                if !any {
                    return Err("Cannot have leading underscores in a number");
                }
                if last_underscore {
                    return Err("Cannot have consecutive underscores in a number");
                }
                last_underscore = true;
                self.current += 1;
            } else if is_digit(c) {
                last_underscore = false;
                any = true;
                self.current += 1;
            } else {
                break;
            }
        }
        if last_underscore {
            return Err("Cannot have a trailing underscore in a number");
        }
        Ok(())
    }

    fn stripped(&self) -> String {
        self.source[self.start..self.current]
            .chars()
            .filter(|&c| c != '_')
            .collect()
    }

    fn radix_number(&mut self, radix: u32, is_digit: fn(u8) -> bool) -> Token {
        if let Err(message) = self.digits(is_digit, false) {
            return self.error(message);
        }
        if self.current - self.start <= 2 {
            return self.error("Expected digits after number base");
        }
        let text = self.stripped();
        match i64::from_str_radix(&text[2..], radix) {
            Ok(n) => self.make_value(TokenKind::Number, TokenValue::Number(n as f64)),
            Err(_) => self.error("Number too big"),
        }
    }

    fn number(&mut self) -> Token {
        let starts_with_digit = self.source.as_bytes()[self.start].is_ascii_digit();
        if let Err(message) = self.digits(|c| c.is_ascii_digit(), starts_with_digit) {
            return self.error(message);
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.current += 1;
            if let Err(message) = self.digits(|c| c.is_ascii_digit(), false) {
                return self.error(message);
            }
        }

        if self.match_char(b'e') || self.match_char(b'E') {
            if !self.match_char(b'+') {
                self.match_char(b'-');
            }
            if !self.peek().is_ascii_digit() {
                return self.error("Unterminated scientific notation");
            }
            if let Err(message) = self.digits(|c| c.is_ascii_digit(), false) {
                return self.error(message);
            }
        }

        match self.stripped().parse::<f64>() {
            Ok(n) if n.is_finite() => self.make_value(TokenKind::Number, TokenValue::Number(n)),
            _ => self.error("Number too big"),
        }
    }

    fn read_hex_escape(&mut self, digits: usize) -> Option<u32> {
        let mut value: u32 = 0;
        for _ in 0..digits {
            let c = self.peek();
            if c == self.quote || c == 0 {
                return None;
            }
            let digit = (c as char).to_digit(16)?;
            self.current += 1;
            value = (value << 4) | digit;
        }
        Some(value)
    }

    /// Scan a string (or the continuation of one after an interpolated
    /// expression). Emits `Interpolation` when the segment stops at `{`.
    fn string(&mut self) -> Token {
        let mut kind = TokenKind::String;
        let mut bytes: Vec<u8> = Vec::new();
        let interpolation = !self.raw;

        loop {
            if self.at_end() {
                return self.error("Unterminated string");
            }
            let c = self.advance();

            if c == self.quote {
                break;
            }
            if interpolation && c == b'{' {
                if self.num_braces >= MAX_INTERPOLATION_NESTING {
                    return self.error("String interpolation is too deep");
                }
                kind = TokenKind::Interpolation;
                self.braces[self.num_braces] = 1;
                self.num_braces += 1;
                break;
            }

            match c {
                b'\r' => continue,
                b'\n' => {
                    self.line += 1;
                    bytes.push(c);
                }
                b'\\' if !self.raw => {
                    if self.at_end() {
                        return self.error("Unterminated string");
                    }
                    match self.advance() {
                        b'"' => bytes.push(b'"'),
                        b'\'' => bytes.push(b'\''),
                        b'\\' => bytes.push(b'\\'),
                        b'{' => bytes.push(b'{'),
                        b'0' => bytes.push(0),
                        b'a' => bytes.push(0x07),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0c),
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'v' => bytes.push(0x0b),
                        b'x' => match self.read_hex_escape(2) {
                            Some(value) => bytes.push(value as u8),
                            None => return self.error("Incomplete byte escape sequence"),
                        },
                        b'u' => match self.read_hex_escape(4).and_then(crate::utf::encode_codepoint)
                        {
                            Some(s) => bytes.extend_from_slice(s.as_bytes()),
                            None => return self.error("Incomplete unicode escape sequence"),
                        },
                        b'U' => match self.read_hex_escape(8).and_then(crate::utf::encode_codepoint)
                        {
                            Some(s) => bytes.extend_from_slice(s.as_bytes()),
                            None => return self.error("Incomplete unicode escape sequence"),
                        },
                        _ => return self.error("Invalid escape character"),
                    }
                }
                _ => bytes.push(c),
            }
        }

        self.raw = false;
        match String::from_utf8(bytes) {
            Ok(s) => self.make_value(kind, TokenValue::String(s)),
            Err(_) => self.error("Invalid UTF-8 in string"),
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        if let Some(error) = self.skip_whitespace() {
            return error;
        }
        self.start = self.current;

        if self.at_end() {
            return self.make(TokenKind::Eof);
        }

        let c = self.advance();

        if c == b'0' {
            if self.peek() == b'x' || self.peek() == b'X' {
                self.current += 1;
                return self.radix_number(16, |c| c.is_ascii_hexdigit());
            }
            if self.peek() == b'b' || self.peek() == b'B' {
                self.current += 1;
                return self.radix_number(2, |c| c == b'0' || c == b'1');
            }
            if self.peek() == b'c' || self.peek() == b'C' {
                self.current += 1;
                return self.radix_number(8, |c| (b'0'..=b'7').contains(&c));
            }
        } else if (c == b'r' || c == b'f') && (self.peek() == b'"' || self.peek() == b'\'') {
            self.raw = c == b'r';
            self.quote = self.advance();
            return self.string();
        }

        if is_name_start(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make(TokenKind::LeftParen),
            b')' => self.make(TokenKind::RightParen),
            b'[' => self.make(TokenKind::LeftBracket),
            b']' => self.make(TokenKind::RightBracket),
            b'{' => {
                if self.num_braces > 0 {
                    self.braces[self.num_braces - 1] += 1;
                }
                self.make(TokenKind::LeftBrace)
            }
            b'}' => {
                if self.num_braces > 0 {
                    self.braces[self.num_braces - 1] -= 1;
                    if self.braces[self.num_braces - 1] == 0 {
                        self.num_braces -= 1;
                        return self.string();
                    }
                }
                self.make(TokenKind::RightBrace)
            }
            b',' => self.make(TokenKind::Comma),
            b';' => self.make(TokenKind::Semicolon),
            b':' => self.make(TokenKind::Colon),
            b'?' => self.make(TokenKind::Question),
            b'.' => {
                if self.peek().is_ascii_digit() {
                    return self.number();
                }
                if !self.match_char(b'.') {
                    return self.make(TokenKind::Dot);
                }
                if self.match_char(b'.') {
                    self.make(TokenKind::DotDotDot)
                } else {
                    self.make(TokenKind::DotDot)
                }
            }
            b'-' => self.pick(
                b'=',
                TokenKind::MinusEqual,
                b'-',
                TokenKind::MinusMinus,
                TokenKind::Minus,
            ),
            b'+' => self.pick(
                b'=',
                TokenKind::PlusEqual,
                b'+',
                TokenKind::PlusPlus,
                TokenKind::Plus,
            ),
            b'*' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::StarEqual)
                } else if self.match_char(b'*') {
                    if self.match_char(b'=') {
                        self.make(TokenKind::StarStarEqual)
                    } else {
                        self.make(TokenKind::StarStar)
                    }
                } else {
                    self.make(TokenKind::Star)
                }
            }
            b'/' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::SlashEqual)
                } else {
                    self.make(TokenKind::Slash)
                }
            }
            b'%' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::PercentEqual)
                } else {
                    self.make(TokenKind::Percent)
                }
            }
            b'&' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::AmpersandEqual)
                } else {
                    self.make(TokenKind::Ampersand)
                }
            }
            b'|' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::PipeEqual)
                } else {
                    self.make(TokenKind::Pipe)
                }
            }
            b'^' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::CaretEqual)
                } else {
                    self.make(TokenKind::Caret)
                }
            }
            b'~' => self.make(TokenKind::Tilde),
            b'!' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::BangEqual)
                } else {
                    self.make(TokenKind::Bang)
                }
            }
            b'=' => {
                if self.match_char(b'=') {
                    self.make(TokenKind::EqualEqual)
                } else if self.match_char(b'>') {
                    self.make(TokenKind::Arrow)
                } else {
                    self.make(TokenKind::Equal)
                }
            }
            b'<' => self.pick(
                b'=',
                TokenKind::LessEqual,
                b'<',
                TokenKind::LessLess,
                TokenKind::Less,
            ),
            b'>' => self.pick(
                b'=',
                TokenKind::GreaterEqual,
                b'>',
                TokenKind::GreaterGreater,
                TokenKind::Greater,
            ),
            b'"' | b'\'' => {
                self.quote = c;
                self.raw = false;
                self.string()
            }
            _ => self.error("Unexpected character"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof || kind == TokenKind::Error {
                break;
            }
        }
        out
    }

    fn number(source: &str) -> f64 {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Number, "{source}");
        match token.value {
            TokenValue::Number(n) => n,
            _ => panic!("number token without value"),
        }
    }

    fn string_value(source: &str) -> String {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::String, "{source}");
        match token.value {
            TokenValue::String(s) => s,
            _ => panic!("string token without value"),
        }
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            kinds("( ) [ ] , ; . .. ... ** << >> => != == <= >= ++ --"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Semicolon,
                TokenKind::Dot,
                TokenKind::DotDot,
                TokenKind::DotDotDot,
                TokenKind::StarStar,
                TokenKind::LessLess,
                TokenKind::GreaterGreater,
                TokenKind::Arrow,
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_names() {
        assert_eq!(
            kinds("var x = null not y"),
            vec![
                TokenKind::Var,
                TokenKind::Name,
                TokenKind::Equal,
                TokenKind::Null,
                TokenKind::Bang,
                TokenKind::Name,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(number("42"), 42.0);
        assert_eq!(number("4.25"), 4.25);
        assert_eq!(number("1_000_000"), 1_000_000.0);
        assert_eq!(number("0xFF"), 255.0);
        assert_eq!(number("0xDEAD_BEEF"), 3735928559.0);
        assert_eq!(number("0b1010"), 10.0);
        assert_eq!(number("0c777"), 511.0);
        assert_eq!(number("1e3"), 1000.0);
        assert_eq!(number("2.5e-2"), 0.025);
        assert_eq!(number(".5"), 0.5);
    }

    #[test]
    fn bad_underscores() {
        assert!(kinds("1__2").contains(&TokenKind::Error));
        assert!(kinds("12_").contains(&TokenKind::Error));
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(string_value(r#""hello""#), "hello");
        assert_eq!(string_value(r#"'a\tb'"#), "a\tb");
        assert_eq!(string_value(r#""\x41é""#), "Aé");
        assert_eq!(string_value(r#"r"a\nb""#), "a\\nb");
    }

    #[test]
    fn interpolation_token_stream() {
        let mut lexer = Lexer::new(r#""a{x}b""#);
        let first = lexer.next_token();
        assert_eq!(first.kind, TokenKind::Interpolation);
        assert!(matches!(first.value, TokenValue::String(ref s) if s == "a"));
        assert_eq!(lexer.next_token().kind, TokenKind::Name);
        let tail = lexer.next_token();
        assert_eq!(tail.kind, TokenKind::String);
        assert!(matches!(tail.value, TokenValue::String(ref s) if s == "b"));
    }

    #[test]
    fn nested_interpolation_depth_limit() {
        let source = r#""{ "{ "{ "{ "{x}" }" }" }" }""#;
        let mut lexer = Lexer::new(source);
        let mut saw_error = false;
        for _ in 0..64 {
            let token = lexer.next_token();
            if token.kind == TokenKind::Error {
                saw_error = true;
                break;
            }
            if token.kind == TokenKind::Eof {
                break;
            }
        }
        assert!(saw_error, "five levels of interpolation should fail");
    }

    #[test]
    fn comments_and_shebang() {
        assert_eq!(
            kinds("#!/usr/bin/env tea\n// line\n/* block /* nested */ */ 1"),
            vec![TokenKind::Number, TokenKind::Eof]
        );
        assert!(kinds("/* open").contains(&TokenKind::Error));
    }

    #[test]
    fn bom_is_skipped() {
        assert_eq!(
            kinds("\u{feff}var"),
            vec![TokenKind::Var, TokenKind::Eof]
        );
    }

    #[test]
    fn token_spans_reproduce_source() {
        // Re-serializing by span matches the source modulo whitespace.
        let source = "var x = 1 + foo(bar, \"s\") // trailing";
        let mut lexer = Lexer::new(source);
        let mut rebuilt = String::new();
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            rebuilt.push_str(token.lexeme(source));
        }
        let stripped: String = source
            .split("//")
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(rebuilt, stripped);
    }
}
