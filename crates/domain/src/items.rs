//! Items: templates, rarity, equipment slots.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::character::CharacterClass;
use crate::dice::DiceFormula;
use crate::effects::EffectTemplate;
use crate::error::DomainError;
use crate::ids::ItemId;

/// Item rarity tiers, ordered from most to least common.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn all() -> [Rarity; 5] {
        [
            Self::Common,
            Self::Uncommon,
            Self::Rare,
            Self::Epic,
            Self::Legendary,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Weapon,
    Armor,
    Consumable,
    Magic,
    Misc,
}

/// Equipment slots on a character.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Head,
    Body,
    MainHand,
    OffHand,
    Feet,
    AccessoryLeft,
    AccessoryRight,
}

impl EquipSlot {
    pub fn all() -> [EquipSlot; 7] {
        [
            Self::Head,
            Self::Body,
            Self::MainHand,
            Self::OffHand,
            Self::Feet,
            Self::AccessoryLeft,
            Self::AccessoryRight,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Body => "body",
            Self::MainHand => "main_hand",
            Self::OffHand => "off_hand",
            Self::Feet => "feet",
            Self::AccessoryLeft => "accessory_left",
            Self::AccessoryRight => "accessory_right",
        }
    }
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EquipSlot {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "head" => Ok(Self::Head),
            "body" => Ok(Self::Body),
            "main_hand" | "mainhand" => Ok(Self::MainHand),
            "off_hand" | "offhand" => Ok(Self::OffHand),
            "feet" => Ok(Self::Feet),
            "accessory_left" => Ok(Self::AccessoryLeft),
            "accessory_right" => Ok(Self::AccessoryRight),
            other => Err(DomainError::parse(format!("unknown equip slot '{other}'"))),
        }
    }
}

/// A concrete item instance.
///
/// Items are owned by inventories (or equipment slots); cross-references
/// from effects and quests use the id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    /// Template name, stable across instances ("longsword", "healing_potion")
    pub template: String,
    pub name: String,
    pub rarity: Rarity,
    pub item_type: ItemType,
    /// Weight in stones; never negative
    pub weight: f32,
    /// Slot this item occupies when equipped; `None` = not equippable
    #[serde(default)]
    pub slot: Option<EquipSlot>,
    /// Damage dice for weapons
    #[serde(default)]
    pub damage: Option<DiceFormula>,
    /// Armor bonus contributed while equipped
    #[serde(default)]
    pub armor_bonus: i32,
    /// Classes allowed to equip this item; empty = unrestricted
    #[serde(default)]
    pub class_restrictions: Vec<CharacterClass>,
    /// Effect template applied while equipped
    #[serde(default)]
    pub on_equip: Option<EffectTemplate>,
    /// Effect template applied when used (consumables)
    #[serde(default)]
    pub on_use: Option<EffectTemplate>,
    /// Value in gold pieces
    #[serde(default)]
    pub value: u32,
}

impl Item {
    pub fn new(
        template: impl Into<String>,
        name: impl Into<String>,
        rarity: Rarity,
        item_type: ItemType,
        weight: f32,
    ) -> Self {
        Self {
            id: ItemId::new(),
            template: template.into(),
            name: name.into(),
            rarity,
            item_type,
            weight: weight.max(0.0),
            slot: None,
            damage: None,
            armor_bonus: 0,
            class_restrictions: Vec::new(),
            on_equip: None,
            on_use: None,
            value: 0,
        }
    }

    pub fn with_slot(mut self, slot: EquipSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_damage(mut self, damage: DiceFormula) -> Self {
        self.damage = Some(damage);
        self
    }

    pub fn with_armor_bonus(mut self, bonus: i32) -> Self {
        self.armor_bonus = bonus;
        self
    }

    pub fn with_on_use(mut self, effect: EffectTemplate) -> Self {
        self.on_use = Some(effect);
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    pub fn restricted_to(mut self, classes: Vec<CharacterClass>) -> Self {
        self.class_restrictions = classes;
        self
    }

    /// Whether the given class may equip this item.
    pub fn usable_by(&self, class: CharacterClass) -> bool {
        self.class_restrictions.is_empty() || self.class_restrictions.contains(&class)
    }

    pub fn is_equippable(&self) -> bool {
        self.slot.is_some()
    }

    pub fn is_consumable(&self) -> bool {
        self.item_type == ItemType::Consumable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_ordering() {
        assert!(Rarity::Common < Rarity::Legendary);
        assert!(Rarity::Rare > Rarity::Uncommon);
    }

    #[test]
    fn test_weight_never_negative() {
        let item = Item::new("rock", "Rock", Rarity::Common, ItemType::Misc, -3.0);
        assert_eq!(item.weight, 0.0);
    }

    #[test]
    fn test_class_restrictions() {
        let sword = Item::new(
            "longsword",
            "Longsword",
            Rarity::Common,
            ItemType::Weapon,
            4.0,
        )
        .with_slot(EquipSlot::MainHand)
        .restricted_to(vec![CharacterClass::Fighter, CharacterClass::Paladin]);

        assert!(sword.usable_by(CharacterClass::Fighter));
        assert!(!sword.usable_by(CharacterClass::Mage));

        let dagger = Item::new("dagger", "Dagger", Rarity::Common, ItemType::Weapon, 1.0);
        assert!(dagger.usable_by(CharacterClass::Mage));
    }

    #[test]
    fn test_slot_parse_round_trip() {
        for slot in EquipSlot::all() {
            let parsed: EquipSlot = slot.as_str().parse().expect("parses");
            assert_eq!(parsed, slot);
        }
    }
}
