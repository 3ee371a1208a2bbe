//! Hit classification of a predicted pair against a drawn number set

use serde::{Deserialize, Serialize};

use crate::numbers::NumberSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitClassification {
    DoubleHit,
    SingleHit,
    Miss,
    /// The prediction did not have exactly two numbers
    Malformed,
}

impl HitClassification {
    pub fn is_hit(self) -> bool {
        matches!(self, HitClassification::DoubleHit | HitClassification::SingleHit)
    }
}

/// Classify `pair` against the numbers drawn in the following period
pub fn classify<S: AsRef<str>>(pair: &[S], set: &NumberSet) -> HitClassification {
    if pair.len() != 2 {
        return HitClassification::Malformed;
    }

    let hits = pair.iter().filter(|n| set.contains(n.as_ref())).count();
    match hits {
        2 => HitClassification::DoubleHit,
        1 => HitClassification::SingleHit,
        _ => HitClassification::Miss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DrawRecord;
    use chrono::NaiveDate;

    fn set_of(special: &str, seventh: &str) -> NumberSet {
        NumberSet::from_draw(&DrawRecord {
            period: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            special: special.into(),
            first: String::new(),
            second: String::new(),
            third: String::new(),
            fourth: String::new(),
            fifth: String::new(),
            sixth: String::new(),
            seventh: seventh.into(),
        })
    }

    #[test]
    fn test_classification() {
        let set = set_of("12378", "87,10,11,12");
        assert_eq!(classify(&["78", "87"], &set), HitClassification::DoubleHit);
        assert_eq!(classify(&["78", "99"], &set), HitClassification::SingleHit);
        assert_eq!(classify(&["33", "88"], &set), HitClassification::Miss);
    }

    #[test]
    fn test_repeated_number_counts_twice() {
        let set = set_of("12333", "");
        assert_eq!(classify(&["33", "33"], &set), HitClassification::DoubleHit);
    }

    #[test]
    fn test_malformed_is_not_a_miss() {
        let set = set_of("12378", "");
        assert_eq!(classify(&["78"], &set), HitClassification::Malformed);
        assert_eq!(classify(&["78", "87", "11"], &set), HitClassification::Malformed);
        let empty: [&str; 0] = [];
        assert_eq!(classify(&empty, &set), HitClassification::Malformed);
        assert!(!HitClassification::Malformed.is_hit());
        assert!(!HitClassification::Miss.is_hit());
        assert!(HitClassification::SingleHit.is_hit());
    }
}
