//! Dice rolling value objects and parsing
//!
//! Supports dice formulas like "1d20+5", "2d6-1", "1d100", etc. Rolls take
//! the RNG by argument so combat resolution stays deterministic under an
//! encounter seed.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error when parsing a dice formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The formula string is empty
    #[error("Empty dice formula")]
    Empty,
    /// Invalid format - expected XdY or XdY+Z
    #[error("Invalid dice format: {0}")]
    InvalidFormat(String),
    /// Dice count must be at least 1
    #[error("Dice count must be at least 1")]
    InvalidDiceCount,
    /// Die size must be at least 2
    #[error("Die size must be at least 2")]
    InvalidDieSize,
}

/// A parsed dice formula like "2d6+3"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceFormula {
    /// Number of dice to roll (X in XdY)
    pub dice_count: u8,
    /// Size of each die (Y in XdY)
    pub die_size: u8,
    /// Modifier to add/subtract after rolling (+Z or -Z)
    pub modifier: i32,
}

impl DiceFormula {
    /// Create a new dice formula
    pub fn new(dice_count: u8, die_size: u8, modifier: i32) -> Result<Self, DiceParseError> {
        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }
        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }
        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    /// A single unmodified d20, the to-hit die.
    pub fn d20() -> Self {
        Self {
            dice_count: 1,
            die_size: 20,
            modifier: 0,
        }
    }

    /// A single die of the given size (hit dice, damage dice).
    pub fn single(die_size: u8) -> Self {
        Self {
            dice_count: 1,
            die_size: die_size.max(2),
            modifier: 0,
        }
    }

    /// Parse a dice formula string like "1d20+5", "2d6-1", "1d100"
    ///
    /// Supported formats:
    /// - "XdY" - Roll X dice of size Y
    /// - "XdY+Z" - Roll X dice of size Y, add Z
    /// - "XdY-Z" - Roll X dice of size Y, subtract Z
    /// - "dY" - Roll 1 die of size Y (shorthand)
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        let d_pos = input.find('d').ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Missing 'd' separator in '{input}'"))
        })?;

        let dice_count_str = &input[..d_pos];
        let dice_count: u8 = if dice_count_str.is_empty() {
            1 // "d20" means "1d20"
        } else {
            dice_count_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid dice count: '{dice_count_str}'"))
            })?
        };

        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }

        let after_d = &input[d_pos + 1..];

        // rfind for '-' so negative modifiers parse while "d-6" stays invalid
        let (die_size_str, modifier) = if let Some(plus_pos) = after_d.find('+') {
            let die_str = &after_d[..plus_pos];
            let mod_str = &after_d[plus_pos + 1..];
            let modifier: i32 = mod_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '+{mod_str}'"))
            })?;
            (die_str, modifier)
        } else if let Some(minus_pos) = after_d.rfind('-') {
            if minus_pos == 0 {
                return Err(DiceParseError::InvalidFormat(format!(
                    "Invalid die size: '{after_d}'"
                )));
            }
            let die_str = &after_d[..minus_pos];
            let mod_str = &after_d[minus_pos + 1..];
            let modifier: i32 = mod_str.parse::<i32>().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '-{mod_str}'"))
            })?;
            (die_str, -modifier)
        } else {
            (after_d, 0)
        };

        let die_size: u8 = die_size_str.parse().map_err(|_| {
            DiceParseError::InvalidFormat(format!("Invalid die size: '{die_size_str}'"))
        })?;

        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }

        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    /// Roll the dice with the supplied RNG and return the result
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> DiceRollResult {
        let mut individual_rolls = Vec::with_capacity(self.dice_count as usize);

        for _ in 0..self.dice_count {
            let roll = rng.gen_range(1..=self.die_size as i32);
            individual_rolls.push(roll);
        }

        let dice_total: i32 = individual_rolls.iter().sum();
        let total = dice_total + self.modifier;

        DiceRollResult {
            formula: *self,
            individual_rolls,
            dice_total,
            modifier_applied: self.modifier,
            total,
        }
    }

    /// Get the minimum possible roll
    pub fn min_roll(&self) -> i32 {
        self.dice_count as i32 + self.modifier
    }

    /// Get the maximum possible roll
    pub fn max_roll(&self) -> i32 {
        (self.dice_count as i32 * self.die_size as i32) + self.modifier
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier == 0 {
            write!(f, "{}d{}", self.dice_count, self.die_size)
        } else if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.dice_count, self.die_size, self.modifier)
        } else {
            write!(f, "{}d{}{}", self.dice_count, self.die_size, self.modifier)
        }
    }
}

/// Result of rolling dice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollResult {
    /// The formula that was rolled
    pub formula: DiceFormula,
    /// Individual die results
    pub individual_rolls: Vec<i32>,
    /// Sum of dice before modifier
    pub dice_total: i32,
    /// Modifier that was applied
    pub modifier_applied: i32,
    /// Final total (dice_total + modifier)
    pub total: i32,
}

impl DiceRollResult {
    /// Whether the underlying single die came up at its maximum (a natural
    /// 20 on a d20 is a critical hit).
    pub fn is_natural_max(&self) -> bool {
        self.individual_rolls.len() == 1
            && self.individual_rolls[0] == self.formula.die_size as i32
    }

    /// Whether the underlying single die came up 1 (a fumble on a d20).
    pub fn is_natural_one(&self) -> bool {
        self.individual_rolls.len() == 1 && self.individual_rolls[0] == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_basic() {
        let f = DiceFormula::parse("2d6+3").expect("valid formula");
        assert_eq!(f.dice_count, 2);
        assert_eq!(f.die_size, 6);
        assert_eq!(f.modifier, 3);
    }

    #[test]
    fn test_parse_shorthand_and_negative() {
        assert_eq!(
            DiceFormula::parse("d20").expect("valid"),
            DiceFormula::d20()
        );
        let f = DiceFormula::parse("1d8-2").expect("valid");
        assert_eq!(f.modifier, -2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(DiceFormula::parse(""), Err(DiceParseError::Empty));
        assert!(matches!(
            DiceFormula::parse("20"),
            Err(DiceParseError::InvalidFormat(_))
        ));
        assert_eq!(
            DiceFormula::parse("0d6"),
            Err(DiceParseError::InvalidDiceCount)
        );
        assert_eq!(
            DiceFormula::parse("1d1"),
            Err(DiceParseError::InvalidDieSize)
        );
    }

    #[test]
    fn test_roll_within_bounds() {
        let f = DiceFormula::parse("3d6+2").expect("valid");
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let result = f.roll(&mut rng);
            assert!(result.total >= f.min_roll());
            assert!(result.total <= f.max_roll());
            assert_eq!(result.individual_rolls.len(), 3);
        }
    }

    #[test]
    fn test_roll_deterministic_under_seed() {
        let f = DiceFormula::parse("1d20").expect("valid");
        let a = f.roll(&mut StdRng::seed_from_u64(42)).total;
        let b = f.roll(&mut StdRng::seed_from_u64(42)).total;
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["1d20", "2d6+3", "4d8-1"] {
            let f = DiceFormula::parse(s).expect("valid");
            assert_eq!(f.to_string(), s);
        }
    }
}
