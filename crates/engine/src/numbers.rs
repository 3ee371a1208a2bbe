//! Two-digit number set of a draw ("lô" numbers)

use std::collections::BTreeSet;

use crate::types::{DrawRecord, PrizeTier};

/// All distinct two-digit endings published in one draw (at most 27)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberSet(BTreeSet<String>);

impl NumberSet {
    pub fn from_draw(draw: &DrawRecord) -> Self {
        let mut set = BTreeSet::new();

        for tier in PrizeTier::ALL {
            for value in draw.field(tier).split(',').take(tier.slots()) {
                if let Some(n) = two_digit_tail(value) {
                    set.insert(n);
                }
            }
        }

        Self(set)
    }

    pub fn contains(&self, number: &str) -> bool {
        self.0.contains(number)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// Last two characters of a trimmed value, left-padded with '0'.
/// None for empty values or tails that are not two ASCII digits.
pub fn two_digit_tail(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let chars: Vec<char> = value.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(2)..].iter().collect();
    let padded = format!("{tail:0>2}");

    if padded.len() == 2 && padded.bytes().all(|b| b.is_ascii_digit()) {
        Some(padded)
    } else {
        None
    }
}
