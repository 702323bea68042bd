//! UTF-8-safe byte-budget truncation, shared by every entity sanitizer.

/// Truncates `s` in place to at most `max_bytes` UTF-8 bytes, backing off to
/// the nearest preceding character boundary rather than splitting a
/// multi-byte code point.
pub fn truncate_utf8_bytes(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
