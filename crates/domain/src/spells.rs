//! Spells and the immutable spell catalogue.
//!
//! The catalogue is built once at startup (from bootstrap or a snapshot)
//! and never mutated afterwards, so readers need no lock.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effects::EffectTemplate;
use crate::error::DomainError;
use crate::ids::SpellId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

impl SpellSchool {
    pub fn all() -> [SpellSchool; 8] {
        [
            Self::Abjuration,
            Self::Conjuration,
            Self::Divination,
            Self::Enchantment,
            Self::Evocation,
            Self::Illusion,
            Self::Necromancy,
            Self::Transmutation,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abjuration => "abjuration",
            Self::Conjuration => "conjuration",
            Self::Divination => "divination",
            Self::Enchantment => "enchantment",
            Self::Evocation => "evocation",
            Self::Illusion => "illusion",
            Self::Necromancy => "necromancy",
            Self::Transmutation => "transmutation",
        }
    }
}

impl fmt::Display for SpellSchool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SpellSchool {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|school| school.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| DomainError::parse(format!("unknown spell school '{s}'")))
    }
}

/// Casting components a spell requires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellComponents {
    pub verbal: bool,
    pub somatic: bool,
    #[serde(default)]
    pub material: Option<String>,
}

/// Area-of-effect shape; ranges and sizes in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum AoeShape {
    SingleTarget,
    Circle { radius: u32 },
    Cone { length: u32 },
    Line { length: u32 },
    OnSelf,
}

/// A spell catalogue entry; immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spell {
    pub id: SpellId,
    pub name: String,
    pub school: SpellSchool,
    /// Spell level, 0 (cantrip) through 9
    pub level: u8,
    pub components: SpellComponents,
    /// Action points spent to cast
    pub cast_cost: u8,
    /// Maximum range in tiles; 0 = self only
    pub range: u32,
    pub aoe: AoeShape,
    pub effect: EffectTemplate,
    #[serde(default)]
    pub description: String,
}

impl Spell {
    pub fn new(
        name: impl Into<String>,
        school: SpellSchool,
        level: u8,
        range: u32,
        effect: EffectTemplate,
    ) -> Self {
        Self {
            id: SpellId::new(),
            name: name.into(),
            school,
            level: level.min(9),
            components: SpellComponents {
                verbal: true,
                somatic: true,
                material: None,
            },
            cast_cost: 1,
            range,
            aoe: AoeShape::SingleTarget,
            effect,
            description: String::new(),
        }
    }

    pub fn with_aoe(mut self, aoe: AoeShape) -> Self {
        self.aoe = aoe;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Read-only spell catalogue with the lookup surface the RPC layer
/// exposes: by id, by level, by school, all, and name search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellCatalog {
    spells: HashMap<SpellId, Spell>,
}

impl SpellCatalog {
    pub fn new(spells: Vec<Spell>) -> Self {
        Self {
            spells: spells.into_iter().map(|spell| (spell.id, spell)).collect(),
        }
    }

    pub fn get(&self, id: SpellId) -> Option<&Spell> {
        self.spells.get(&id)
    }

    /// All spells, sorted by level then name for stable output.
    pub fn all(&self) -> Vec<&Spell> {
        let mut spells: Vec<&Spell> = self.spells.values().collect();
        spells.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        spells
    }

    pub fn by_level(&self, level: u8) -> Vec<&Spell> {
        self.all()
            .into_iter()
            .filter(|spell| spell.level == level)
            .collect()
    }

    pub fn by_school(&self, school: SpellSchool) -> Vec<&Spell> {
        self.all()
            .into_iter()
            .filter(|spell| spell.school == school)
            .collect()
    }

    /// Case-insensitive substring search over spell names.
    pub fn search(&self, query: &str) -> Vec<&Spell> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.all()
            .into_iter()
            .filter(|spell| spell.name.to_lowercase().contains(&query))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectDuration, EffectKind};

    fn catalog() -> SpellCatalog {
        let dot = EffectTemplate::new(EffectKind::DamageOverTime, 4, EffectDuration::Rounds(3));
        let heal = EffectTemplate::new(EffectKind::HealOverTime, 5, EffectDuration::Rounds(2));
        SpellCatalog::new(vec![
            Spell::new("Magic Missile", SpellSchool::Evocation, 1, 12, dot.clone()),
            Spell::new("Fireball", SpellSchool::Evocation, 3, 15, dot.clone())
                .with_aoe(AoeShape::Circle { radius: 3 }),
            Spell::new("Cure Light Wounds", SpellSchool::Conjuration, 1, 1, heal),
            Spell::new("Acid Arrow", SpellSchool::Evocation, 2, 10, dot),
        ])
    }

    #[test]
    fn test_all_sorted_by_level_then_name() {
        let catalog = catalog();
        let names: Vec<&str> = catalog.all().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Cure Light Wounds", "Magic Missile", "Acid Arrow", "Fireball"]
        );
    }

    #[test]
    fn test_query_surface() {
        let catalog = catalog();
        assert_eq!(catalog.by_level(1).len(), 2);
        assert_eq!(catalog.by_school(SpellSchool::Evocation).len(), 3);
        assert_eq!(catalog.search("fire").len(), 1);
        assert_eq!(catalog.search("ARROW").len(), 1);
        assert!(catalog.search("  ").is_empty());
    }

    #[test]
    fn test_get_by_id() {
        let catalog = catalog();
        let spell = catalog.all()[0];
        assert_eq!(catalog.get(spell.id).map(|s| s.name.as_str()), Some("Cure Light Wounds"));
        assert!(catalog.get(SpellId::new()).is_none());
    }
}
