//! # ISBN Module
//!
//! Conversion between the two book numbering standards, ISBN-10 and ISBN-13.
//!
//! ## Why Two Forms?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The same physical title can arrive under either number:               │
//! │                                                                         │
//! │    ISBN-10:  0-14-044913-2      (older stock, back covers)              │
//! │    ISBN-13:  978-0-14-044913-6  (barcodes, metadata catalogs)           │
//! │                                                                         │
//! │  ISBN-10 → ISBN-13                                                      │
//! │    prefix "978" + first 9 digits, new check digit (weights 1,3,1,3...)  │
//! │                                                                         │
//! │  ISBN-13 → ISBN-10 (only for the "978" prefix)                          │
//! │    digits 4..12, new check digit (weights 10..2, mod 11, 10 = 'X')     │
//! │                                                                         │
//! │  "979" titles have NO ISBN-10 equivalent.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here is total: unparseable input passes through unchanged
//! (or yields `None`) instead of failing.

/// The only ISBN-13 prefix that maps back to ISBN-10.
const BOOKLAND_PREFIX: &str = "978";

/// Strips everything except digits and `X`/`x`, then uppercases.
///
/// ## Example
/// ```rust
/// use estante_core::isbn::sanitize;
///
/// assert_eq!(sanitize("978-0-14-044913-6"), "9780140449136");
/// assert_eq!(sanitize(" 0-8044-2957-x "), "080442957X");
/// ```
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Converts an ISBN-10 to ISBN-13.
///
/// - 13 digits: returned unchanged
/// - 10 characters (9 digits + digit or `X`): `978` prefix, checksum recomputed
/// - anything else: returned unchanged
pub fn to_isbn13(isbn: &str) -> String {
    if is_digits(isbn) && isbn.len() == 13 {
        return isbn.to_string();
    }

    if isbn.len() == 10 && isbn.is_ascii() && is_digits(&isbn[..9]) {
        let body = format!("{}{}", BOOKLAND_PREFIX, &isbn[..9]);
        return format!("{}{}", body, isbn13_check_digit(&body));
    }

    isbn.to_string()
}

/// Converts an ISBN-13 to ISBN-10.
///
/// Returns `None` unless the input is 13 digits starting with `978`.
pub fn to_isbn10(isbn13: &str) -> Option<String> {
    if isbn13.len() != 13 || !is_digits(isbn13) || !isbn13.starts_with(BOOKLAND_PREFIX) {
        return None;
    }

    let core9 = &isbn13[3..12];
    Some(format!("{}{}", core9, isbn10_check_digit(core9)))
}

/// Checks an ISBN-10 checksum (sanitized input).
pub fn is_valid_isbn10(isbn: &str) -> bool {
    if isbn.len() != 10 || !isbn.is_ascii() || !is_digits(&isbn[..9]) {
        return false;
    }
    let last = isbn.as_bytes()[9] as char;
    if !(last.is_ascii_digit() || last == 'X') {
        return false;
    }
    isbn10_check_digit(&isbn[..9]) == last
}

/// Checks an ISBN-13 checksum (sanitized input).
pub fn is_valid_isbn13(isbn: &str) -> bool {
    if isbn.len() != 13 || !is_digits(isbn) {
        return false;
    }
    isbn13_check_digit(&isbn[..12]) == isbn.as_bytes()[12] as char
}

// =============================================================================
// Resolution Candidates
// =============================================================================

/// The document keys a user-supplied ISBN may be stored under.
///
/// ## Preference
/// `isbn13` is always tried first and is the key for new books.
/// `isbn10` is the legacy form, when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsbnForms {
    pub isbn13: String,
    pub isbn10: Option<String>,
}

impl IsbnForms {
    /// Computes both forms from raw user input.
    ///
    /// ## Example
    /// ```rust
    /// use estante_core::isbn::IsbnForms;
    ///
    /// let forms = IsbnForms::from_raw("0140449132");
    /// assert_eq!(forms.isbn13, "9780140449136");
    /// assert_eq!(forms.isbn10.as_deref(), Some("0140449132"));
    /// ```
    pub fn from_raw(raw: &str) -> Self {
        let clean = sanitize(raw);
        match clean.len() {
            10 => IsbnForms {
                isbn13: to_isbn13(&clean),
                isbn10: Some(clean),
            },
            13 => IsbnForms {
                isbn10: to_isbn10(&clean),
                isbn13: clean,
            },
            _ => IsbnForms {
                isbn13: clean,
                isbn10: None,
            },
        }
    }

    /// Keys in preference order, without duplicates.
    pub fn candidates(&self) -> Vec<&str> {
        let mut keys = vec![self.isbn13.as_str()];
        if let Some(ref ten) = self.isbn10 {
            if ten != &self.isbn13 {
                keys.push(ten.as_str());
            }
        }
        keys
    }

    /// True when sanitizing left nothing to look up.
    pub fn is_empty(&self) -> bool {
        self.isbn13.is_empty()
    }
}

// =============================================================================
// Checksums
// =============================================================================

/// Check digit for a 12-digit ISBN-13 body.
fn isbn13_check_digit(body12: &str) -> char {
    let sum: u32 = body12
        .bytes()
        .enumerate()
        .map(|(idx, b)| {
            let digit = (b - b'0') as u32;
            if idx % 2 == 0 {
                digit
            } else {
                digit * 3
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    char::from(b'0' + check as u8)
}

/// Check digit for a 9-digit ISBN-10 body.
fn isbn10_check_digit(core9: &str) -> char {
    let sum: u32 = core9
        .bytes()
        .enumerate()
        .map(|(idx, b)| (b - b'0') as u32 * (10 - idx as u32))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => 'X',
        check => char::from(b'0' + check as u8),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("978-0-14-044913-6"), "9780140449136");
        assert_eq!(sanitize("ISBN 0-8044-2957-x"), "080442957X");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("abc"), "");
    }

    #[test]
    fn test_to_isbn13() {
        assert_eq!(to_isbn13("0140449132"), "9780140449136");
        assert_eq!(to_isbn13("080442957X"), "9780804429573");
        assert_eq!(to_isbn13("9780140449136"), "9780140449136");
        // Pass-through on anything else
        assert_eq!(to_isbn13("12345"), "12345");
        assert_eq!(to_isbn13(""), "");
    }

    #[test]
    fn test_to_isbn10() {
        assert_eq!(to_isbn10("9780140449136").as_deref(), Some("0140449132"));
        assert_eq!(to_isbn10("9780804429573").as_deref(), Some("080442957X"));
        // 979 prefix has no ISBN-10 form
        assert_eq!(to_isbn10("9791034300304"), None);
        assert_eq!(to_isbn10("0140449132"), None);
        assert_eq!(to_isbn10(""), None);
    }

    #[test]
    fn test_checksum_validation() {
        assert!(is_valid_isbn13("9780140449136"));
        assert!(!is_valid_isbn13("9780140449137"));
        assert!(is_valid_isbn10("0140449132"));
        assert!(is_valid_isbn10("080442957X"));
        assert!(!is_valid_isbn10("0140449133"));
        assert!(!is_valid_isbn10("01404X9132"));
    }

    #[test]
    fn test_multibyte_input_is_returned_unchanged() {
        // 10 bytes, but byte 9 falls inside 'é'.
        assert_eq!("12345678é".len(), 10);
        assert_eq!(to_isbn13("12345678é"), "12345678é");
        assert!(!is_valid_isbn10("12345678é"));
        assert_eq!(to_isbn13("ÉÉÉÉÉ"), "ÉÉÉÉÉ");
        assert!(!is_valid_isbn10("ÉÉÉÉÉ"));
        assert_eq!(to_isbn10("9780140449é3"), None);
        assert!(!is_valid_isbn13("9780140449é3"));
    }

    #[test]
    fn test_forms_from_thirteen() {
        let forms = IsbnForms::from_raw("978-0-14-044913-6");
        assert_eq!(forms.isbn13, "9780140449136");
        assert_eq!(forms.isbn10.as_deref(), Some("0140449132"));
        assert_eq!(forms.candidates(), vec!["9780140449136", "0140449132"]);
    }

    #[test]
    fn test_forms_without_ten_digit_equivalent() {
        let forms = IsbnForms::from_raw("979-10-343-0030-4");
        assert_eq!(forms.isbn10, None);
        assert_eq!(forms.candidates(), vec!["9791034300304"]);
    }

    #[test]
    fn test_forms_of_garbage() {
        let forms = IsbnForms::from_raw("not an isbn");
        assert!(forms.is_empty());
    }

    /// Builds a valid ISBN-10 from any 9-digit core.
    fn valid_isbn10(core: u32) -> String {
        let core9 = format!("{:09}", core);
        format!("{}{}", core9, isbn10_check_digit(&core9))
    }

    proptest! {
        #[test]
        fn prop_isbn10_round_trips_through_isbn13(core in 0u32..1_000_000_000) {
            let isbn10 = valid_isbn10(core);
            let isbn13 = to_isbn13(&isbn10);
            prop_assert!(is_valid_isbn13(&isbn13));
            prop_assert_eq!(to_isbn10(&isbn13), Some(isbn10));
        }

        #[test]
        fn prop_conversions_never_panic(raw in "\\PC{0,14}") {
            let _ = to_isbn13(&raw);
            let _ = to_isbn10(&raw);
            let _ = is_valid_isbn10(&raw);
            let _ = is_valid_isbn13(&raw);
        }

        #[test]
        fn prop_sanitize_is_idempotent(raw in ".{0,40}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once.clone());
        }
    }
}
