//! UTF-8-safe truncation helpers for captured output and tool observations.

/// Largest index `<= max` that falls on a char boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Cut `s` down to at most `max` bytes without splitting a character.
/// Returns `true` if anything was removed.
pub fn truncate_in_place(s: &mut String, max: usize) -> bool {
    if s.len() <= max {
        return false;
    }
    let cut = floor_char_boundary(s, max);
    s.truncate(cut);
    true
}

/// Truncate a tool observation to at most `max` bytes of content, appending
/// a notice with the original size if anything was cut.
pub fn truncate_result(mut s: String, max: usize) -> String {
    let total = s.len();
    if truncate_in_place(&mut s, max) {
        s.push_str(&format!("...\n[truncated: {total} bytes total]"));
    }
    s
}

/// The last `max` bytes of `s` (rounded forward to a char boundary).
pub fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s.get(start..).unwrap_or_default()
}
