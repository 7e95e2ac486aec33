//! UTF-8 helpers shared by the lexer and the string class.
//!
//! String values are byte strings holding valid UTF-8; user-visible
//! indexing counts code points, not bytes.

/// Encode a code point, if valid, as a UTF-8 string.
pub fn encode_codepoint(value: u32) -> Option<String> {
    char::from_u32(value).map(|c| c.to_string())
}

/// Number of code points in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`th code point, clamped to the end of `s`.
pub fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices()
        .nth(n)
        .map(|(offset, _)| offset)
        .unwrap_or(s.len())
}

/// The code point starting at byte offset `offset`, as a string slice.
pub fn code_point_at(s: &str, offset: usize) -> &str {
    let rest = &s[offset..];
    match rest.chars().next() {
        Some(c) => &rest[..c.len_utf8()],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_ascii_and_multibyte() {
        assert_eq!(encode_codepoint(0x41).as_deref(), Some("A"));
        assert_eq!(encode_codepoint(0x3b1).as_deref(), Some("α"));
        assert_eq!(encode_codepoint(0x1f375).as_deref(), Some("🍵"));
        assert!(encode_codepoint(0xd800).is_none());
    }

    #[test]
    fn char_counting() {
        assert_eq!(char_len("tea"), 3);
        assert_eq!(char_len("чай"), 3);
        assert_eq!(char_offset("чай", 1), 2);
        assert_eq!(char_offset("abc", 10), 3);
    }

    #[test]
    fn code_points() {
        assert_eq!(code_point_at("чай", 0), "ч");
        assert_eq!(code_point_at("чай", 2), "а");
    }
}
