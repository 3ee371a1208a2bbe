//! Pattern registry: every pattern the engine can backtest
//!
//! Each pattern is a declarative [`PatternSpec`]: where to read its inputs
//! from a draw and how to turn them into a pair. One evaluator
//! ([`PatternSpec::predict`]) handles every spec, so a pattern is a table row
//! or a generated value, never a function.
//!
//! Three families make up the registry:
//! - the fifteen classic patterns (static table)
//! - positional patterns: every pair of the 214 digit positions (107 plain
//!   plus their shadows)
//! - memory patterns: sum or difference of two of the 27 prize tails

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::digits::{digit_or_zero, mirrored_pair, shadow, shifted_pair, PredictedPair};
use crate::numbers::two_digit_tail;
use crate::types::{DrawRecord, PatternFamily, PatternKind, PrizeTier};

/// Which character of a prize value to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CharPick {
    /// 0-based from the start
    Index(usize),
    /// 1-based from the end (`FromEnd(1)` is the last character)
    FromEnd(usize),
    /// 0-based after left-padding the value with '0' to the tier's digit width
    Padded(usize),
}

/// One digit position: tier, comma-separated sub-value, character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitSource {
    pub tier: PrizeTier,
    pub sub: usize,
    pub pick: CharPick,
    /// Read the shadow of the digit instead
    pub shadow: bool,
}

impl DigitSource {
    /// Missing values, short values and non-digit characters all read as 0
    pub fn read(&self, draw: &DrawRecord) -> u8 {
        let value = draw.sub_value(self.tier, self.sub).unwrap_or("");
        let c = match self.pick {
            CharPick::Index(i) => value.chars().nth(i),
            CharPick::FromEnd(n) if n >= 1 => value.chars().rev().nth(n - 1),
            CharPick::FromEnd(_) => None,
            CharPick::Padded(i) => {
                let pad = self.tier.digit_width().saturating_sub(value.chars().count());
                if i < pad {
                    Some('0')
                } else {
                    value.chars().nth(i - pad)
                }
            }
        };

        let digit = digit_or_zero(c);
        if self.shadow {
            shadow(digit)
        } else {
            digit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemoryOp {
    Sum,
    Diff,
}

impl MemoryOp {
    /// `(a + b) mod 100` or `|a - b|`
    pub fn apply(self, a: u8, b: u8) -> u8 {
        match self {
            MemoryOp::Sum => ((u16::from(a) + u16::from(b)) % 100) as u8,
            MemoryOp::Diff => a.abs_diff(b) % 100,
        }
    }
}

/// Where a pattern gets its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PairSource {
    /// Two independent digit positions
    Digits(DigitSource, DigitSource),
    /// Last two digits of one value; falls back to the neutral pair when
    /// they are not numeric
    Tail { tier: PrizeTier, sub: usize },
    /// Two prize tails combined into one number, predicted with its reversal.
    /// Unreadable tails give the neutral pair.
    Memory {
        op: MemoryOp,
        first: (PrizeTier, usize),
        second: (PrizeTier, usize),
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternSpec {
    pub id: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub label: Cow<'static, str>,
    pub kind: PatternKind,
    pub family: PatternFamily,
    /// Added (mod 10) to both digits before building the pair
    pub shift: u8,
    pub source: PairSource,
}

impl PatternSpec {
    /// Predict the pair for the period following `draw`. Never fails.
    pub fn predict(&self, draw: &DrawRecord) -> PredictedPair {
        let (a, b) = match self.source {
            PairSource::Digits(first, second) => (first.read(draw), second.read(draw)),
            PairSource::Tail { tier, sub } => {
                let value = draw.sub_value(tier, sub).unwrap_or("");
                // Empty reads as "00", which is the neutral pair anyway
                let tail = if value.is_empty() {
                    Some("00".to_string())
                } else {
                    two_digit_tail(value)
                };
                match tail {
                    Some(tail) => {
                        let mut chars = tail.chars();
                        (digit_or_zero(chars.next()), digit_or_zero(chars.next()))
                    }
                    None => return PredictedPair::neutral(),
                }
            }
            PairSource::Memory { op, first, second } => {
                let tail = |(tier, sub): (PrizeTier, usize)| {
                    draw.sub_value(tier, sub)
                        .and_then(two_digit_tail)
                        .and_then(|t| t.parse::<u8>().ok())
                };
                return match (tail(first), tail(second)) {
                    (Some(a), Some(b)) => mirrored_pair(op.apply(a, b)),
                    _ => PredictedPair::neutral(),
                };
            }
        };

        shifted_pair(a, b, self.shift)
    }

    /// Human-readable line for a prediction, e.g. "Cầu Lô 01 (GĐB+5): 78,87"
    pub fn describe(&self, pair: &PredictedPair) -> String {
        format!("{}: {}", self.name, pair.joined())
    }
}

// ============================================================================
// Classic table
// ============================================================================

const fn at(tier: PrizeTier, sub: usize, pick: CharPick) -> DigitSource {
    DigitSource {
        tier,
        sub,
        pick,
        shadow: false,
    }
}

const fn classic(
    id: &'static str,
    name: &'static str,
    label: &'static str,
    shift: u8,
    source: PairSource,
) -> PatternSpec {
    PatternSpec {
        id: Cow::Borrowed(id),
        name: Cow::Borrowed(name),
        label: Cow::Borrowed(label),
        kind: PatternKind::LO_SINGLE,
        family: PatternFamily::Classic,
        shift,
        source,
    }
}

const LAST: CharPick = CharPick::FromEnd(1);
const HEAD: CharPick = CharPick::Index(0);

use PrizeTier::*;

static CLASSIC_SPECS: [PatternSpec; 15] = [
    classic(
        "LO_STL_FIXED_01",
        "Cầu Lô 01 (GĐB+5)",
        "GĐB+5",
        5,
        PairSource::Tail { tier: Special, sub: 0 },
    ),
    classic(
        "LO_STL_FIXED_02",
        "Cầu Lô 02 (G6.3+G7.4)",
        "G6.3+G7.4",
        0,
        PairSource::Digits(at(Sixth, 2, LAST), at(Seventh, 3, LAST)),
    ),
    classic(
        "LO_STL_FIXED_03",
        "Cầu Lô 03 (Đuôi GĐB+Đuôi G1)",
        "Đuôi GĐB+Đuôi G1",
        0,
        PairSource::Digits(at(Special, 0, LAST), at(First, 0, LAST)),
    ),
    classic(
        "LO_STL_FIXED_04",
        "Cầu Lô 04 (Áp chót GĐB+Đuôi G1)",
        "Áp chót GĐB+Đuôi G1",
        0,
        PairSource::Digits(at(Special, 0, CharPick::FromEnd(2)), at(First, 0, LAST)),
    ),
    classic(
        "LO_STL_FIXED_05",
        "Cầu Lô 05 (Đầu G7.1+Đuôi G7.4)",
        "Đầu G7.1+Đuôi G7.4",
        0,
        PairSource::Digits(at(Seventh, 0, HEAD), at(Seventh, 3, LAST)),
    ),
    classic(
        "LO_STL_FIXED_06",
        "Cầu Lô 06 (G7.2+G7.3)",
        "G7.2+G7.3",
        0,
        PairSource::Digits(at(Seventh, 1, LAST), at(Seventh, 2, HEAD)),
    ),
    classic(
        "LO_STL_FIXED_07",
        "Cầu Lô 07 (G5.1+G7.1)",
        "G5.1+G7.1",
        0,
        PairSource::Digits(at(Fifth, 0, HEAD), at(Seventh, 0, HEAD)),
    ),
    classic(
        "LO_STL_FIXED_08",
        "Cầu Lô 08 (G3.1+G4.1)",
        "G3.1+G4.1",
        0,
        PairSource::Digits(at(Third, 0, HEAD), at(Fourth, 0, HEAD)),
    ),
    classic(
        "LO_STL_FIXED_09",
        "Cầu Lô 09 (Đầu GĐB+Đầu G1)",
        "Đầu GĐB+Đầu G1",
        0,
        PairSource::Digits(at(Special, 0, HEAD), at(First, 0, HEAD)),
    ),
    classic(
        "LO_STL_FIXED_10",
        "Cầu Lô 10 (G2.2+G3.3)",
        "G2.2+G3.3",
        0,
        PairSource::Digits(at(Second, 1, CharPick::Index(1)), at(Third, 2, LAST)),
    ),
    classic(
        "LO_STL_FIXED_11",
        "Cầu Lô 11 (GĐB+G3.2)",
        "GĐB+G3.2",
        0,
        PairSource::Digits(at(Special, 0, CharPick::Index(1)), at(Third, 1, LAST)),
    ),
    classic(
        "LO_STL_FIXED_12",
        "Cầu Lô 12 (Đuôi GĐB+G3.3)",
        "Đuôi GĐB+G3.3",
        0,
        PairSource::Digits(at(Special, 0, LAST), at(Third, 2, CharPick::Index(2))),
    ),
    classic(
        "LO_STL_FIXED_13",
        "Cầu Lô 13 (G7.3+8)",
        "G7.3+8",
        8,
        PairSource::Tail { tier: Seventh, sub: 2 },
    ),
    classic(
        "LO_STL_FIXED_14",
        "Cầu Lô 14 (G1+2)",
        "G1+2",
        2,
        PairSource::Tail { tier: First, sub: 0 },
    ),
    classic(
        "LO_STL_FIXED_15",
        "Cầu Lô 15 (GĐB+7)",
        "GĐB+7",
        7,
        PairSource::Tail { tier: Special, sub: 0 },
    ),
];

// ============================================================================
// Generated families
// ============================================================================

/// One digit position with its display label ("GDB[0]", "Bong(G7.4[1])")
/// and the id token derived from it ("GDB_0", "Bong_G7_4_1")
struct Position {
    source: DigitSource,
    label: String,
    token: String,
}

/// The 107 digit positions in prize order, then their 107 shadows
fn positions() -> Vec<Position> {
    let mut plain = Vec::with_capacity(107);
    for tier in PrizeTier::ALL {
        for sub in 0..tier.slots() {
            let slot = tier.slot_label(sub);
            for index in 0..tier.digit_width() {
                plain.push(Position {
                    source: DigitSource {
                        tier,
                        sub,
                        pick: CharPick::Padded(index),
                        shadow: false,
                    },
                    label: format!("{slot}[{index}]"),
                    token: format!("{}_{index}", slot.replace('.', "_")),
                });
            }
        }
    }

    let shadows: Vec<Position> = plain
        .iter()
        .map(|p| Position {
            source: DigitSource {
                shadow: true,
                ..p.source
            },
            label: format!("Bong({})", p.label),
            token: format!("Bong_{}", p.token),
        })
        .collect();

    plain.extend(shadows);
    plain
}

/// Every unordered pair (i <= j) of positions
fn positional_specs() -> Vec<PatternSpec> {
    let positions = positions();
    let mut specs = Vec::with_capacity(positions.len() * (positions.len() + 1) / 2);

    for (i, first) in positions.iter().enumerate() {
        for second in &positions[i..] {
            let id = format!("LO_POS_{}_{}", first.token, second.token);
            specs.push(PatternSpec {
                name: Cow::Owned(id.clone()),
                id: Cow::Owned(id),
                label: Cow::Owned(format!("{}+{}", first.label, second.label)),
                kind: PatternKind::LO_SINGLE,
                family: PatternFamily::Positional,
                shift: 0,
                source: PairSource::Digits(first.source, second.source),
            });
        }
    }

    specs
}

/// Sum and difference over every unordered pair (i <= j) of the 27 prize slots
fn memory_specs() -> Vec<PatternSpec> {
    let slots: Vec<(PrizeTier, usize)> = PrizeTier::ALL
        .iter()
        .flat_map(|&tier| (0..tier.slots()).map(move |sub| (tier, sub)))
        .collect();

    let mut specs = Vec::with_capacity(slots.len() * (slots.len() + 1));
    for (i, &first) in slots.iter().enumerate() {
        for &second in &slots[i..] {
            let (l1, l2) = (first.0.slot_label(first.1), second.0.slot_label(second.1));
            let (t1, t2) = (l1.replace('.', "_"), l2.replace('.', "_"));

            for op in [MemoryOp::Sum, MemoryOp::Diff] {
                let (id, name, label) = match op {
                    MemoryOp::Sum => (
                        format!("LO_MEM_SUM_{t1}_{t2}"),
                        format!("Tổng({l1}+{l2})"),
                        format!("{l1}+{l2}"),
                    ),
                    MemoryOp::Diff => (
                        format!("LO_MEM_DIFF_{t1}_{t2}"),
                        format!("Hiệu(|{l1}-{l2}|)"),
                        format!("|{l1}-{l2}|"),
                    ),
                };
                specs.push(PatternSpec {
                    id: Cow::Owned(id),
                    name: Cow::Owned(name),
                    label: Cow::Owned(label),
                    kind: PatternKind::LO_SINGLE,
                    family: PatternFamily::Memory,
                    shift: 0,
                    source: PairSource::Memory { op, first, second },
                });
            }
        }
    }

    specs
}

struct Registry {
    specs: Vec<PatternSpec>,
    by_id: HashMap<String, usize>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut specs = CLASSIC_SPECS.to_vec();
        specs.extend(positional_specs());
        specs.extend(memory_specs());

        let by_id = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.id.to_string(), i))
            .collect();
        Registry { specs, by_id }
    })
}

/// Every registered pattern: classic first, then positional, then memory
pub fn all_specs() -> &'static [PatternSpec] {
    &registry().specs
}

pub fn find_spec(id: &str) -> Option<&'static PatternSpec> {
    let registry = registry();
    registry.by_id.get(id).map(|&i| &registry.specs[i])
}
