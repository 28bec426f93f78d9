/// Returns the prefix of `s` holding at most `max_chars` Unicode scalar
/// values, and whether anything was cut.
///
/// Always splits on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> (&str, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&s[..byte_idx], true),
        None => (s, false),
    }
}

/// `true` for empty or whitespace-only text.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
