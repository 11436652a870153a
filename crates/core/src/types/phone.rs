//! Customer phone numbers in dialable form.
//!
//! Inbound payloads carry phones in whatever shape the storefront collected
//! them: `0300-1234567`, `+92 300 1234567`, `3001234567`. Everything the
//! system stores or dials goes through [`Phone::normalize`] first so that a
//! reply from WhatsApp (always country-code digits) matches the order it
//! belongs to.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A normalized phone number: digits only, leading country code.
///
/// Construct via [`Phone::normalize`]; [`Phone::from_stored`] exists only to
/// rehydrate values that already went through `normalize` before being
/// persisted.
///
/// ## Examples
///
/// ```
/// use orderloop_core::Phone;
///
/// let phone = Phone::normalize("0300-1234567", "92").unwrap();
/// assert_eq!(phone.as_str(), "923001234567");
///
/// // Already normalized input passes through unchanged.
/// let again = Phone::normalize(phone.as_str(), "92").unwrap();
/// assert_eq!(again, phone);
///
/// // Empty input is "no phone", not an error.
/// assert!(Phone::normalize("", "92").is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

/// Numbers at or below this many digits are local notation and get the
/// country code prefixed.
const SHORT_NUMBER_THRESHOLD: usize = 10;

impl Phone {
    /// Normalize a raw phone string against a dialing country code.
    ///
    /// The ladder, in order:
    /// 1. strip every non-digit character;
    /// 2. empty result means "no phone" (`None`);
    /// 3. a leading zero is replaced by the country code;
    /// 4. a number already starting with the country code is kept as-is;
    /// 5. a short number (<= 10 digits) gets the country code prefixed;
    /// 6. anything else passes through unchanged.
    ///
    /// Total over its input domain and idempotent:
    /// `normalize(normalize(x)) == normalize(x)`.
    #[must_use]
    pub fn normalize(raw: &str, country_code: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return None;
        }

        if let Some(rest) = digits.strip_prefix('0') {
            return Some(Self(format!("{country_code}{rest}")));
        }

        if digits.starts_with(country_code) {
            return Some(Self(digits));
        }

        if digits.len() <= SHORT_NUMBER_THRESHOLD {
            return Some(Self(format!("{country_code}{digits}")));
        }

        Some(Self(digits))
    }

    /// Rehydrate a phone that was normalized before being persisted.
    ///
    /// The store writes only normalized values, so no re-validation happens
    /// here.
    #[must_use]
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the phone number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Phone` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CC: &str = "92";

    fn norm(raw: &str) -> Option<String> {
        Phone::normalize(raw, CC).map(Phone::into_inner)
    }

    #[test]
    fn test_strips_formatting_characters() {
        assert_eq!(norm("+92 300-123 4567"), Some("923001234567".to_string()));
        assert_eq!(norm("(0300) 1234567"), Some("923001234567".to_string()));
    }

    #[test]
    fn test_leading_zero_replaced_with_country_code() {
        assert_eq!(norm("03001234567"), Some("923001234567".to_string()));
    }

    #[test]
    fn test_country_code_prefix_kept() {
        assert_eq!(norm("923001234567"), Some("923001234567".to_string()));
    }

    #[test]
    fn test_short_number_gets_country_code() {
        assert_eq!(norm("3001234567"), Some("923001234567".to_string()));
    }

    #[test]
    fn test_long_foreign_number_passes_through() {
        // 12 digits, no leading zero, doesn't start with our country code
        assert_eq!(norm("443001234567"), Some("443001234567".to_string()));
    }

    #[test]
    fn test_empty_and_non_numeric_are_no_phone() {
        assert_eq!(norm(""), None);
        assert_eq!(norm("n/a"), None);
        assert_eq!(norm("---"), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["03001234567", "3001234567", "923001234567", "+92-300-1234567", "443001234567"] {
            let once = Phone::normalize(raw, CC).expect("digits present");
            let twice = Phone::normalize(once.as_str(), CC).expect("digits present");
            assert_eq!(once, twice, "normalize not idempotent for {raw}");
        }
    }
}
