//! Digit math behind every pattern: shadow digits and pair building

use serde::{Deserialize, Serialize};

/// Two zero-padded two-digit numbers predicted for the next period.
/// The two may be equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictedPair(pub [String; 2]);

/// Returned by tail-pair patterns when the source field has no usable digits
pub const NEUTRAL_DIGITS: (u8, u8) = (0, 0);

impl PredictedPair {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> [String; 2] {
        self.0
    }

    /// `build_pair(0, 0)`, i.e. `["00", "55"]`
    pub fn neutral() -> Self {
        build_pair(NEUTRAL_DIGITS.0, NEUTRAL_DIGITS.1)
    }

    /// "ab,ba" form used for persisted predictions
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

/// Shadow digit: d ↔ (d + 5) mod 10
pub fn shadow(d: u8) -> u8 {
    (d % 10 + 5) % 10
}

/// `[ab, ba]`, or `[aa, ss]` with `s = shadow(a)` when both digits match
pub fn build_pair(a: u8, b: u8) -> PredictedPair {
    let (a, b) = (a % 10, b % 10);
    if a == b {
        let s = shadow(a);
        PredictedPair([format!("{a}{a}"), format!("{s}{s}")])
    } else {
        PredictedPair([format!("{a}{b}"), format!("{b}{a}")])
    }
}

/// Both digits shifted by `k` (mod 10) before building the pair
pub fn shifted_pair(a: u8, b: u8, k: u8) -> PredictedPair {
    build_pair((a % 10 + k % 10) % 10, (b % 10 + k % 10) % 10)
}

/// A two-digit value and its reversal, smallest first (`21` -> `["12", "21"]`).
/// Palindromes such as `33` give the same number twice.
pub fn mirrored_pair(value: u8) -> PredictedPair {
    let forward = format!("{:02}", value % 100);
    let reversed: String = forward.chars().rev().collect();
    if forward <= reversed {
        PredictedPair([forward, reversed])
    } else {
        PredictedPair([reversed, forward])
    }
}

/// Numeric value of an ASCII digit; anything else reads as 0
pub fn digit_or_zero(c: Option<char>) -> u8 {
    c.and_then(|c| c.to_digit(10)).map(|d| d as u8).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &str, b: &str) -> PredictedPair {
        PredictedPair([a.to_string(), b.to_string()])
    }

    #[test]
    fn test_shadow_is_involutive() {
        for d in 0..10 {
            assert_eq!(shadow(shadow(d)), d);
            assert_ne!(shadow(d), d);
        }
        assert_eq!(shadow(3), 8);
        assert_eq!(shadow(7), 2);
    }

    #[test]
    fn test_build_pair() {
        assert_eq!(build_pair(3, 3), pair("33", "88"));
        assert_eq!(build_pair(0, 0), pair("00", "55"));
        assert_eq!(build_pair(1, 2), pair("12", "21"));
        assert_eq!(PredictedPair::neutral(), pair("00", "55"));
    }

    #[test]
    fn test_shifted_pair_wraps() {
        assert_eq!(shifted_pair(2, 3, 5), pair("78", "87"));
        assert_eq!(shifted_pair(9, 8, 2), pair("10", "01"));
        assert_eq!(shifted_pair(4, 4, 0), build_pair(4, 4));
    }

    #[test]
    fn test_mirrored_pair() {
        assert_eq!(mirrored_pair(21), pair("12", "21"));
        assert_eq!(mirrored_pair(12), pair("12", "21"));
        assert_eq!(mirrored_pair(5), pair("05", "50"));
        assert_eq!(mirrored_pair(33), pair("33", "33"));
    }

    #[test]
    fn test_digit_or_zero() {
        assert_eq!(digit_or_zero(Some('7')), 7);
        assert_eq!(digit_or_zero(Some('x')), 0);
        assert_eq!(digit_or_zero(None), 0);
    }

    #[test]
    fn test_joined() {
        assert_eq!(build_pair(1, 2).joined(), "12,21");
    }
}
