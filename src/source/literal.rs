//! Typst literal writer.
//!
//! Arrays and dictionaries are written one entry per line, each entry
//! followed by a comma. That keeps a one-element array `(x,)` from being
//! read as a parenthesized scalar.

use super::escape;

const INDENT: &str = "  ";

pub(super) enum Value {
    Str(String),
    Bool(bool),
    None,
    Array(Vec<Value>),
    Dict(Vec<(&'static str, Value)>),
}

impl Value {
    pub(super) fn str(text: &str) -> Self {
        Self::Str(escape(text))
    }

    pub(super) fn opt_str(text: Option<&str>) -> Self {
        text.map_or(Self::None, Self::str)
    }

    fn write(&self, out: &mut String, depth: usize) {
        match self {
            Self::Str(escaped) => {
                out.push('"');
                out.push_str(escaped);
                out.push('"');
            }
            Self::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            Self::None => out.push_str("none"),
            Self::Array(items) if items.is_empty() => out.push_str("()"),
            Self::Array(items) => {
                out.push_str("(\n");
                for item in items {
                    indent(out, depth + 1);
                    item.write(out, depth + 1);
                    out.push_str(",\n");
                }
                indent(out, depth);
                out.push(')');
            }
            Self::Dict(entries) if entries.is_empty() => out.push_str("(:)"),
            Self::Dict(entries) => write_entries(out, entries, depth),
        }
    }
}

/// Write a named argument list: `(\n  name: value,\n)`.
pub(super) fn write_args(out: &mut String, args: &[(&'static str, Value)]) {
    write_entries(out, args, 0);
}

fn write_entries(out: &mut String, entries: &[(&'static str, Value)], depth: usize) {
    out.push_str("(\n");
    for (name, value) in entries {
        indent(out, depth + 1);
        out.push_str(name);
        out.push_str(": ");
        value.write(out, depth + 1);
        out.push_str(",\n");
    }
    indent(out, depth);
    out.push(')');
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: &Value) -> String {
        let mut out = String::new();
        value.write(&mut out, 0);
        out
    }

    #[test]
    fn test_empty_collections() {
        assert_eq!(render(&Value::Array(vec![])), "()");
        assert_eq!(render(&Value::Dict(vec![])), "(:)");
    }

    #[test]
    fn test_single_element_array_has_trailing_comma() {
        let array = Value::Array(vec![Value::Bool(true)]);
        assert_eq!(render(&array), "(\n  true,\n)");
    }

    #[test]
    fn test_scalars() {
        assert_eq!(render(&Value::None), "none");
        assert_eq!(render(&Value::str("a\"b")), "\"a\\\"b\"");
    }
}
