//! Brazilian phone number detection.
//!
//! Optional country code (`55`, optionally after `+` or `00`), optional area code
//! (two digits, optionally in parentheses), a 5-digit mobile (`9xxxx`) or 4-digit
//! prefix, an optional `-`/`.`/whitespace separator, then four digits.

use regex::Regex;
use std::sync::LazyLock;

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:\+|00)?55\s?)?(?:\(?[0-9]{2}\)?\s?)?(?:9[0-9]{4}|[0-9]{4})[-.\s]?[0-9]{4}",
    )
    .expect("phone pattern is valid")
});

/// First phone number in `text`, as written by the user. Later numbers are ignored.
pub fn find_first(text: &str) -> Option<&str> {
    PHONE_PATTERN.find(text).map(|m| m.as_str())
}
