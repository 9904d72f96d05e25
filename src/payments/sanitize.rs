//! Buyer field normalisation required by gateway parsers.

use once_cell::sync::Lazy;
use regex::Regex;

pub const NAME_PLACEHOLDER: &str = "User";
pub const PAYER_NAME_PLACEHOLDER: &str = "Customer";
pub const PHONE_PLACEHOLDER: &str = "7012345678";

static DISALLOWED_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9\s]").expect("static regex"));

/// Strips everything except ASCII alphanumerics and whitespace, then collapses
/// whitespace runs to single spaces.
pub fn alnum_words(input: &str) -> String {
    let stripped = DISALLOWED_NAME_CHARS.replace_all(input, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a full name into (first, last) on the first space after
/// sanitisation. A single token fills both; nothing usable gives the
/// placeholder for both.
pub fn split_name(full_name: &str) -> (String, String) {
    let sanitized = alnum_words(full_name);
    if sanitized.is_empty() {
        return (NAME_PLACEHOLDER.to_string(), NAME_PLACEHOLDER.to_string());
    }
    match sanitized.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (sanitized.clone(), sanitized),
    }
}

/// SabPaisa payer name: email local part, alphanumerics only, title case.
pub fn payer_name(name: &str) -> String {
    let local = match name.split_once('@') {
        Some((local, _)) => local,
        None => name,
    };
    let sanitized = title_case(&alnum_words(local));
    if sanitized.is_empty() {
        PAYER_NAME_PLACEHOLDER.to_string()
    } else {
        sanitized
    }
}

/// Upper-cases a letter that follows a non-letter and lower-cases the rest,
/// so digits start a new word: `abc123def` becomes `Abc123Def`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_is_letter = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(ch);
            previous_is_letter = false;
        }
    }
    out
}

/// Digits only; anything other than exactly ten digits is replaced whole.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        digits
    } else {
        PHONE_PLACEHOLDER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn split_name_handles_documented_cases() {
        assert_eq!(split_name("John Doe"), pair("John", "Doe"));
        assert_eq!(split_name("John"), pair("John", "John"));
        assert_eq!(split_name(""), pair("User", "User"));
        assert_eq!(split_name("   \t "), pair("User", "User"));
        assert_eq!(split_name("!!! ???"), pair("User", "User"));
    }

    #[test]
    fn split_name_keeps_remaining_words_in_last_name() {
        assert_eq!(split_name("John Michael Doe"), pair("John", "Michael Doe"));
        assert_eq!(split_name("  John    Doe  "), pair("John", "Doe"));
    }

    #[test]
    fn split_name_drops_non_ascii_and_punctuation() {
        assert_eq!(split_name("O'Brien"), pair("OBrien", "OBrien"));
        assert_eq!(split_name("José García"), pair("Jos", "Garca"));
        assert_eq!(split_name("李明"), pair("User", "User"));
        assert_eq!(split_name("Dr. A.B. Rao"), pair("Dr", "AB Rao"));
    }

    #[test]
    fn payer_name_uses_email_local_part() {
        assert_eq!(payer_name("ravi.kumar@example.com"), "Ravikumar");
        assert_eq!(payer_name("john doe"), "John Doe");
        assert_eq!(payer_name("JOHN DOE"), "John Doe");
        assert_eq!(payer_name("abc123def"), "Abc123Def");
        assert_eq!(payer_name("@example.com"), "Customer");
        assert_eq!(payer_name(""), "Customer");
    }

    #[test]
    fn phone_is_ten_digits_or_placeholder() {
        assert_eq!(normalize_phone("98765-43210"), "9876543210");
        assert_eq!(normalize_phone("(987) 654 3210"), "9876543210");
        assert_eq!(normalize_phone("+91 98765 43210"), PHONE_PLACEHOLDER);
        assert_eq!(normalize_phone("12345"), PHONE_PLACEHOLDER);
        assert_eq!(normalize_phone(""), PHONE_PLACEHOLDER);
    }
}
