/// Truncate `s` to at most `max_bytes`, backing off to a char boundary and
/// appending `...` when anything was cut.
pub fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string_untouched() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn test_ascii_truncation() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn test_multibyte_boundary() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_str("héllo", 2), "h...");
        assert_eq!(truncate_str("🦀🦀", 5), "🦀...");
    }

    #[test]
    fn test_zero_budget() {
        assert_eq!(truncate_str("abc", 0), "...");
    }
}
