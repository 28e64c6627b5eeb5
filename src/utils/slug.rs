//! Path-safe slugs for remote storage roots.

use deunicode::deunicode;

/// Turn a contest title into a single path segment.
///
/// Transliterates to ASCII, lowercases, and collapses every run of
/// non-alphanumeric characters into one `-`. Empty input yields `"untitled"`.
pub fn slugify(title: &str) -> String {
    let ascii = deunicode(title);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
