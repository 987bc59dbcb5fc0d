//! Attribute generation methods for character creation.
//!
//! Four methods: roll (4d6 drop lowest), point-buy (27-point standard),
//! standard array, and custom scores. Custom scores are repaired by
//! clamping into the legal range rather than rejected.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Attribute, Attributes, ATTRIBUTE_MAX, ATTRIBUTE_MIN};
use crate::error::DomainError;

/// The standard array, assigned to attributes in caller-specified order.
pub const STANDARD_ARRAY: [i32; 6] = [15, 14, 13, 12, 10, 8];

/// Points available for point-buy.
pub const POINT_BUY_BUDGET: i32 = 27;

/// How a new character's attributes are determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AttributeMethod {
    /// 4d6 drop lowest, once per attribute in canonical order
    Roll,
    /// 27-point buy; scores in [8, 15], priced on the standard curve
    PointBuy { scores: [i32; 6] },
    /// `[15,14,13,12,10,8]` assigned to attributes in the given order
    StandardArray { order: [Attribute; 6] },
    /// Caller supplies the six values; out-of-range values are clamped
    Custom { scores: [i32; 6] },
}

impl AttributeMethod {
    /// Produce the attribute block. `rng` is only consulted by `Roll`.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Attributes, DomainError> {
        match self {
            Self::Roll => Ok(roll_attributes(rng)),
            Self::PointBuy { scores } => point_buy(*scores),
            Self::StandardArray { order } => Ok(standard_array(*order)),
            Self::Custom { scores } => Ok(Attributes::from_scores(*scores)),
        }
    }
}

/// 4d6 drop lowest for each attribute, in canonical order.
fn roll_attributes<R: Rng + ?Sized>(rng: &mut R) -> Attributes {
    let mut scores = [0i32; 6];
    for score in &mut scores {
        let mut dice = [0i32; 4];
        for die in &mut dice {
            *die = rng.gen_range(1..=6);
        }
        dice.sort_unstable();
        *score = dice[1] + dice[2] + dice[3];
    }
    Attributes::from_scores(scores)
}

/// Point cost of one score on the standard 27-point curve.
fn point_cost(score: i32) -> Option<i32> {
    match score {
        8 => Some(0),
        9 => Some(1),
        10 => Some(2),
        11 => Some(3),
        12 => Some(4),
        13 => Some(5),
        14 => Some(7),
        15 => Some(9),
        _ => None,
    }
}

fn point_buy(scores: [i32; 6]) -> Result<Attributes, DomainError> {
    let mut total = 0;
    for (index, score) in scores.iter().enumerate() {
        let cost = point_cost(*score).ok_or_else(|| {
            DomainError::validation(format!(
                "point-buy score {} for {} outside [8, 15]",
                score,
                Attribute::all()[index]
            ))
        })?;
        total += cost;
    }
    if total > POINT_BUY_BUDGET {
        return Err(DomainError::validation(format!(
            "point-buy total {total} exceeds budget {POINT_BUY_BUDGET}"
        )));
    }
    Ok(Attributes::from_scores(scores))
}

fn standard_array(order: [Attribute; 6]) -> Attributes {
    let mut attrs = Attributes::from_scores([ATTRIBUTE_MIN; 6]);
    for (value, attribute) in STANDARD_ARRAY.iter().zip(order.iter()) {
        attrs.set(*attribute, *value);
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_roll_is_in_legal_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let attrs = AttributeMethod::Roll.generate(&mut rng).expect("rolls");
            for attribute in Attribute::all() {
                let v = attrs.get(attribute);
                assert!((3..=18).contains(&v), "4d6kh3 out of range: {v}");
            }
        }
    }

    #[test]
    fn test_standard_array_respects_order() {
        let order = [
            Attribute::Dexterity,
            Attribute::Strength,
            Attribute::Constitution,
            Attribute::Intelligence,
            Attribute::Wisdom,
            Attribute::Charisma,
        ];
        let attrs = AttributeMethod::StandardArray { order }
            .generate(&mut StdRng::seed_from_u64(0))
            .expect("generates");
        assert_eq!(attrs.dexterity, 15);
        assert_eq!(attrs.strength, 14);
        assert_eq!(attrs.charisma, 8);
    }

    #[test]
    fn test_point_buy_budget_enforced() {
        // All 15s cost 54 points - over budget
        let result = AttributeMethod::PointBuy { scores: [15; 6] }
            .generate(&mut StdRng::seed_from_u64(0));
        assert!(result.is_err());

        // Legal spread
        let attrs = AttributeMethod::PointBuy {
            scores: [15, 15, 15, 8, 8, 8],
        }
        .generate(&mut StdRng::seed_from_u64(0))
        .expect("27 points exactly");
        assert_eq!(attrs.strength, 15);
    }

    #[test]
    fn test_point_buy_rejects_out_of_range() {
        let result = AttributeMethod::PointBuy {
            scores: [16, 8, 8, 8, 8, 8],
        }
        .generate(&mut StdRng::seed_from_u64(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_is_clamped_not_rejected() {
        let attrs = AttributeMethod::Custom {
            scores: [0, 50, 12, 12, 12, 12],
        }
        .generate(&mut StdRng::seed_from_u64(0))
        .expect("clamps");
        assert_eq!(attrs.strength, ATTRIBUTE_MIN);
        assert_eq!(attrs.dexterity, ATTRIBUTE_MAX);
        assert_eq!(attrs.constitution, 12);
    }
}
