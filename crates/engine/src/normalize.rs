//! Canonical dedup key for pattern names

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Accent-, case- and punctuation-insensitive key.
///
/// NFD-decomposes, drops combining marks, folds `đ`/`Đ` to `d`, lowercases and
/// keeps only `[a-z0-9]`. Idempotent.
pub fn normalize_name(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diacritics_and_punctuation_collapse() {
        assert_eq!(normalize_name("Cầu [Bộ] (G7+5)"), "caubog75");
        assert_eq!(normalize_name("cau bo g75"), "caubog75");
        assert_eq!(
            normalize_name("Cầu [Bộ] (G7+5)"),
            normalize_name("cau bo g75")
        );
    }

    #[test]
    fn test_d_with_stroke() {
        assert_eq!(normalize_name("Cầu Lô 01 (GĐB+5)"), "caulo01gdb5");
        assert_eq!(normalize_name("đề"), "de");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_name("Cầu Lô 04 (Áp chót GĐB+Đuôi G1)");
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn test_blank_and_symbol_only() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name(" +-[]() "), "");
    }
}
