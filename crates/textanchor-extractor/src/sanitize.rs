//! Control-character stripping for raw model output

use std::borrow::Cow;

/// Strip control characters except `\n`, `\r` and `\t`
///
/// Borrows the input when there is nothing to strip.
pub fn strip_control_chars(raw: &str) -> Cow<'_, str> {
    if !raw.chars().any(is_stripped) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(raw.chars().filter(|c| !is_stripped(*c)).collect())
}

fn is_stripped(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_bytes() {
        let clean = strip_control_chars("[{\"character\": \"ROMEO\x00\"}]");
        assert_eq!(clean, "[{\"character\": \"ROMEO\"}]");
    }

    #[test]
    fn keeps_layout_whitespace() {
        let raw = "```json\r\n[\n\t{}\n]\n```";
        assert_eq!(strip_control_chars(raw), raw);
    }

    #[test]
    fn borrows_clean_input() {
        assert!(matches!(strip_control_chars("clean text"), Cow::Borrowed(_)));
        assert!(matches!(strip_control_chars("dirty\x07"), Cow::Owned(_)));
    }

    #[test]
    fn strips_c1_controls_and_escape() {
        let clean = strip_control_chars("a\x1b[0mb\u{0085}c");
        assert_eq!(clean, "a[0mbc");
    }
}
