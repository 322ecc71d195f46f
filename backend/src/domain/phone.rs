//! Client phone normalisation.

use std::sync::OnceLock;

use regex::Regex;

static PHONE_RE: OnceLock<Regex> = OnceLock::new();

/// Russian-style number: `+7` or `8` prefix followed by ten digits that may be
/// split by spaces, dashes or parentheses.
pub(crate) fn phone_regex() -> &'static Regex {
    PHONE_RE.get_or_init(|| {
        Regex::new(r"(?:\+7|\b8|\b7)[\s\-]*\(?\d{3}\)?[\s\-]*\d{3}[\s\-]*\d{2}[\s\-]*\d{2}\b")
            .unwrap_or_else(|error| panic!("phone regex failed to compile: {error}"))
    })
}

/// Normalise a phone number to `+7XXXXXXXXXX`.
///
/// Returns `None` when the input does not contain exactly eleven digits with a
/// `7` or `8` country prefix (or ten digits starting with `9`).
///
/// # Examples
/// ```
/// use dispatch_backend::domain::normalize_phone;
///
/// assert_eq!(normalize_phone("8 (900) 123-45-67").as_deref(), Some("+79001234567"));
/// assert_eq!(normalize_phone("12345"), None);
/// ```
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let national = match digits.len() {
        11 if digits.starts_with('7') || digits.starts_with('8') => &digits[1..],
        10 if digits.starts_with('9') => digits.as_str(),
        _ => return None,
    };
    Some(format!("+7{national}"))
}
