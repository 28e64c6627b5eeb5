//! String-literal escaping for generated Typst code.

/// Escape `text` for use inside a double-quoted Typst string literal.
///
/// `\` -> `\\`, `"` -> `\"`, newline -> `\n`, carriage return -> `\r`.
/// Every other character (including `#` and `$`) is data inside a string
/// literal and passes through unchanged.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
pub(super) fn unescape(literal: &str) -> Option<String> {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            // a bare quote would have terminated the literal
            if ch == '"' {
                return None;
            }
            out.push(ch);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_metacharacters() {
        assert_eq!(escape(r#"A"B\C"#), r#"A\"B\\C"#);
        assert_eq!(escape("Line1\nLine2\r"), r"Line1\nLine2\r");
    }

    #[test]
    fn test_escape_leaves_markup_alone() {
        assert_eq!(escape("#let x = $a^2$"), "#let x = $a^2$");
    }

    #[test]
    fn test_escape_roundtrip() {
        let cases = [
            "",
            "plain",
            r"\\server\share",
            "quote \" inside",
            "windows\r\nline endings",
            "trailing backslash \\",
            "\\\"\n\r mixed \\n literal",
            "unicode 测试 ∑",
        ];
        for case in cases {
            assert_eq!(unescape(&escape(case)).as_deref(), Some(case), "case {case:?}");
        }
    }
}
