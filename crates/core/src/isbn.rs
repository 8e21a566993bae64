//! ISBN business key.
//!
//! Every book record is keyed by a canonical 13-digit ISBN. Inputs arrive from
//! upstream publishers in several shapes (hyphenated, ISBN-10, surrounding
//! whitespace); `Isbn::parse` normalizes the acceptable ones and rejects the rest.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

const ISBN13_LEN: usize = 13;
const ISBN10_LEN: usize = 10;
const ISBN10_TO_13_PREFIX: &str = "978";

/// Canonical ISBN-13.
///
/// Only the *shape* of a 13-digit input is checked; the check digit is not
/// verified because catalog keys coming from upstream are not always
/// checksum-valid. ISBN-10 inputs must carry a valid check digit, since the
/// ISBN-13 check digit is recomputed during normalization and would otherwise
/// hide a typo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Isbn(String);

impl ValueObject for Isbn {}

impl Isbn {
    /// Parse and normalize a raw ISBN.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != ' ')
            .collect();

        match compact.len() {
            ISBN13_LEN if compact.bytes().all(|b| b.is_ascii_digit()) => Ok(Self(compact)),
            ISBN10_LEN => Self::from_isbn10(&compact),
            _ => Err(DomainError::validation(format!(
                "'{}' is not a 13-digit ISBN",
                raw
            ))),
        }
    }

    fn from_isbn10(isbn10: &str) -> DomainResult<Self> {
        let bytes = isbn10.as_bytes();
        let (body, check) = bytes.split_at(ISBN10_LEN - 1);

        if !body.iter().all(u8::is_ascii_digit) {
            return Err(DomainError::validation(format!(
                "'{}' is not a valid ISBN-10",
                isbn10
            )));
        }

        let check_value = match check[0] {
            b'X' | b'x' => 10,
            b if b.is_ascii_digit() => u32::from(b - b'0'),
            _ => {
                return Err(DomainError::validation(format!(
                    "'{}' has an invalid ISBN-10 check character",
                    isbn10
                )));
            }
        };

        // Weighted sum 10..=1 over all ten positions must be divisible by 11.
        let weighted: u32 = body
            .iter()
            .zip((2..=10).rev())
            .map(|(b, w)| u32::from(b - b'0') * w)
            .sum::<u32>()
            + check_value;

        if weighted % 11 != 0 {
            return Err(DomainError::validation(format!(
                "'{}' fails the ISBN-10 checksum",
                isbn10
            )));
        }

        let mut digits = String::with_capacity(ISBN13_LEN);
        digits.push_str(ISBN10_TO_13_PREFIX);
        // `body` is ASCII digits (checked above).
        digits.extend(body.iter().map(|b| char::from(*b)));
        digits.push(isbn13_check_digit(digits.as_bytes()));

        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ISBN-13 check digit over the first twelve digits (alternating weights 1 and 3).
fn isbn13_check_digit(first_twelve: &[u8]) -> char {
    let sum: u32 = first_twelve
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    // `check` is in 0..=9.
    char::from(b'0' + check as u8)
}

impl core::fmt::Display for Isbn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Isbn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Isbn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Isbn::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_thirteen_digits() {
        let isbn = Isbn::parse("9780596004651").unwrap();
        assert_eq!(isbn.as_str(), "9780596004651");
    }

    #[test]
    fn accepts_thirteen_digits_without_checksum_validation() {
        assert!(Isbn::parse("1234567891234").is_ok());
    }

    #[test]
    fn strips_separators_and_whitespace() {
        let isbn = Isbn::parse("  978-0-596-00465-1 ").unwrap();
        assert_eq!(isbn.as_str(), "9780596004651");
    }

    #[test]
    fn normalizes_isbn10() {
        // Head First Java, 1st edition.
        let isbn = Isbn::parse("0596004656").unwrap();
        assert_eq!(isbn.as_str(), "9780596004651");
    }

    #[test]
    fn normalizes_isbn10_with_x_check_digit() {
        let isbn = Isbn::parse("0-8044-2957-X").unwrap();
        assert_eq!(isbn.as_str(), "9780804429573");
    }

    #[test]
    fn rejects_isbn10_with_bad_checksum() {
        assert!(Isbn::parse("0596004657").is_err());
    }

    #[test]
    fn rejects_short_and_non_numeric_input() {
        for raw in ["43", "", "978059600465", "97805960046511", "97805960O4651", "abcdefghij"] {
            assert!(Isbn::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn deserializes_through_validation() {
        let ok: Isbn = serde_json::from_str("\"9780596004651\"").unwrap();
        assert_eq!(ok.as_str(), "9780596004651");

        let err = serde_json::from_str::<Isbn>("\"43\"");
        assert!(err.is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn isbn10_check_char(body: &[u8]) -> char {
            let sum: u32 = body
                .iter()
                .zip((2..=10).rev())
                .map(|(b, w)| u32::from(b - b'0') * w)
                .sum();
            match (11 - sum % 11) % 11 {
                10 => 'X',
                d => char::from(b'0' + d as u8),
            }
        }

        proptest! {
            /// Property: any 13 ASCII digits are accepted unchanged.
            #[test]
            fn thirteen_digits_are_canonical(digits in "[0-9]{13}") {
                let isbn = Isbn::parse(&digits).unwrap();
                prop_assert_eq!(isbn.as_str(), digits.as_str());
            }

            /// Property: a checksum-valid ISBN-10 normalizes to a checksum-valid 978 ISBN-13.
            #[test]
            fn isbn10_normalizes_to_valid_isbn13(body in "[0-9]{9}") {
                let raw = format!("{}{}", body, isbn10_check_char(body.as_bytes()));
                let isbn = Isbn::parse(&raw).unwrap();
                let s = isbn.as_str();

                prop_assert_eq!(s.len(), 13);
                prop_assert!(s.starts_with("978"));
                prop_assert_eq!(&s[3..12], body.as_str());
                prop_assert_eq!(isbn13_check_digit(&s.as_bytes()[..12]), s.chars().last().unwrap());
            }

            /// Property: inputs whose digit count is neither 10 nor 13 are rejected.
            #[test]
            fn wrong_lengths_are_rejected(digits in "[0-9]{0,9}|[0-9]{11,12}|[0-9]{14,20}") {
                prop_assert!(Isbn::parse(&digits).is_err());
            }
        }
    }
}
