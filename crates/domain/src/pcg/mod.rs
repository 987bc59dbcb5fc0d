//! Procedural content generation.
//!
//! Every generator takes `GenerationParams` and derives all randomness
//! from `params.seed`: the same seed and constraints produce the same
//! artifact, apart from wall-clock timestamps in metadata.

pub mod dungeon;
pub mod items;
pub mod noise;
pub mod path;
pub mod quests;
pub mod terrain;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::items::Rarity;

/// Difficulty band fed into generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Nightmare,
}

impl Difficulty {
    /// Scalar multiplier applied to encounter strength and loot quality.
    pub fn scalar(&self) -> f64 {
        match self {
            Self::Easy => 0.75,
            Self::Normal => 1.0,
            Self::Hard => 1.35,
            Self::Nightmare => 1.8,
        }
    }

    /// One step easier, saturating.
    pub fn step_down(&self) -> Self {
        match self {
            Self::Easy | Self::Normal => Self::Easy,
            Self::Hard => Self::Normal,
            Self::Nightmare => Self::Hard,
        }
    }

    /// One step harder, saturating.
    pub fn step_up(&self) -> Self {
        match self {
            Self::Easy => Self::Normal,
            Self::Normal => Self::Hard,
            Self::Hard | Self::Nightmare => Self::Nightmare,
        }
    }
}

/// How densely corridors connect the rooms of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Spanning chain only
    Low,
    /// Chain plus a few extra corridors
    Moderate,
    /// Chain plus extra corridors between many pairs
    High,
    /// Every pair of rooms connected
    Complete,
}

impl Connectivity {
    /// Fraction of non-chain room pairs that get an extra corridor.
    pub fn extra_share(&self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Moderate => 0.25,
            Self::High => 0.6,
            Self::Complete => 1.0,
        }
    }
}

/// Visual/population theme of a generated dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DungeonTheme {
    Classic,
    Crypt,
    Cavern,
    Fortress,
}

/// Dungeon shape constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonConstraints {
    pub levels: u8,
    pub width: u32,
    pub height: u32,
    /// Minimum rooms the generator must place on each level
    pub rooms_per_level: u32,
    pub theme: DungeonTheme,
    pub connectivity: Connectivity,
}

impl Default for DungeonConstraints {
    fn default() -> Self {
        Self {
            levels: 3,
            width: 40,
            height: 30,
            rooms_per_level: 6,
            theme: DungeonTheme::Classic,
            connectivity: Connectivity::Moderate,
        }
    }
}

/// Loot quality bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemConstraints {
    pub min_rarity: Rarity,
    pub max_rarity: Rarity,
}

impl Default for ItemConstraints {
    fn default() -> Self {
        Self {
            min_rarity: Rarity::Common,
            max_rarity: Rarity::Legendary,
        }
    }
}

/// All generator constraints bundled together.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConstraints {
    pub dungeon: DungeonConstraints,
    pub items: ItemConstraints,
}

/// Input to every generator. The seed fully determines the output for
/// fixed constraints; `timeout` only bounds runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub seed: u64,
    pub difficulty: Difficulty,
    pub player_level: u8,
    #[serde(default)]
    pub constraints: GenerationConstraints,
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl GenerationParams {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            difficulty: Difficulty::Normal,
            player_level: 1,
            constraints: GenerationConstraints::default(),
            timeout: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_player_level(mut self, player_level: u8) -> Self {
        self.player_level = player_level;
        self
    }

    pub fn with_constraints(mut self, constraints: GenerationConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Typed generation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PcgError {
    #[error("Invalid generation constraints: {0}")]
    InvalidConstraints(String),

    #[error("Generation timed out in {0}")]
    Timeout(&'static str),

    #[error("No valid target for generation: {0}")]
    NoValidTarget(String),

    #[error("Generation failed: {0}")]
    Exhausted(String),
}

/// Deadline helper for generators that loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<std::time::Instant>,
}

impl Deadline {
    pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| std::time::Instant::now() + t),
        }
    }

    pub(crate) fn expired(&self) -> bool {
        self.at.map(|at| std::time::Instant::now() >= at).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_steps_saturate() {
        assert_eq!(Difficulty::Easy.step_down(), Difficulty::Easy);
        assert_eq!(Difficulty::Nightmare.step_up(), Difficulty::Nightmare);
        assert_eq!(Difficulty::Normal.step_up(), Difficulty::Hard);
    }

    #[test]
    fn test_params_builder() {
        let params = GenerationParams::new(7)
            .with_difficulty(Difficulty::Hard)
            .with_player_level(4)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(params.seed, 7);
        assert_eq!(params.difficulty, Difficulty::Hard);
        assert_eq!(params.player_level, 4);
        assert!(params.timeout.is_some());
    }

    #[test]
    fn test_deadline_without_timeout_never_expires() {
        let deadline = Deadline::from_timeout(None);
        assert!(!deadline.expired());
    }
}
