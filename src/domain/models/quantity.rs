//! Resource quantity strings (`500m`, `1Gi`, `10`, `1e3`).

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 9] = ["n", "u", "m", "k", "M", "G", "T", "P", "E"];

/// A validated quantity string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(String);

impl Quantity {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if is_valid_quantity(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DomainError::InvalidQuantity(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Quantity {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_valid_quantity(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    if !is_valid_number(number) {
        return false;
    }
    if suffix.is_empty() || BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix) {
        return true;
    }
    // Decimal exponent, e.g. 1e3 or 2E-2.
    suffix
        .strip_prefix(['e', 'E'])
        .map(|exp| exp.strip_prefix(['+', '-']).unwrap_or(exp))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn is_valid_number(s: &str) -> bool {
    if s.is_empty() || s == "." {
        return false;
    }
    s.chars().filter(|c| *c == '.').count() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_common_quantities() {
        for q in ["1", "500m", "1Gi", "512Mi", "10", "0.5", "1e3", "2E-2", "100k", " 4 "] {
            assert!(Quantity::parse(q).is_ok(), "{q} should parse");
        }
        assert_eq!(Quantity::parse(" 4 ").unwrap().as_str(), "4");
    }

    #[test]
    fn test_rejects_malformed_quantities() {
        for q in ["", "Gi", "1.2.3", "1GB", "abc", "1e", ".", "1 Gi"] {
            assert!(
                matches!(Quantity::parse(q), Err(DomainError::InvalidQuantity(_))),
                "{q} should be rejected"
            );
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<Quantity, _> = serde_json::from_str("\"8Gi\"");
        assert!(ok.is_ok());
        let bad: Result<Quantity, _> = serde_json::from_str("\"eight\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_with_known_suffix_parses(n in 0u64..1_000_000, idx in 0usize..15) {
            let suffixes: Vec<&str> = BINARY_SUFFIXES.iter().chain(DECIMAL_SUFFIXES.iter()).copied().collect();
            let q = format!("{n}{}", suffixes[idx]);
            prop_assert!(Quantity::parse(&q).is_ok());
        }

        #[test]
        fn prop_alphabetic_garbage_is_rejected(s in "[a-zA-Z]{1,8}") {
            prop_assert!(Quantity::parse(&s).is_err());
        }
    }
}
