//! Character system: attributes, classes, derived stats, inventory,
//! equipment, experience.
//!
//! Attribute scores live in [3, 25]; levels in [1, 20]. Derived values
//! (modifiers, armor class, attack bonus) are computed on demand so that
//! active stat-modifier effects can be composed on top without double
//! counting.

pub mod generation;

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dice::DiceFormula;
use crate::error::DomainError;
use crate::events::EventKind;
use crate::ids::{ItemId, SpellId};
use crate::items::{EquipSlot, Item};

pub use generation::AttributeMethod;

/// Lowest legal attribute score.
pub const ATTRIBUTE_MIN: i32 = 3;
/// Highest legal attribute score.
pub const ATTRIBUTE_MAX: i32 = 25;
/// Level cap.
pub const LEVEL_MAX: u8 = 20;

/// The six core abilities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Attribute {
    pub fn all() -> [Attribute; 6] {
        [
            Self::Strength,
            Self::Dexterity,
            Self::Constitution,
            Self::Intelligence,
            Self::Wisdom,
            Self::Charisma,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strength => "strength",
            Self::Dexterity => "dexterity",
            Self::Constitution => "constitution",
            Self::Intelligence => "intelligence",
            Self::Wisdom => "wisdom",
            Self::Charisma => "charisma",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The six ability scores of a character or monster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Attributes {
    /// Build from six raw scores in canonical order, clamping each into
    /// the legal range.
    pub fn from_scores(scores: [i32; 6]) -> Self {
        let c = |v: i32| v.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX);
        Self {
            strength: c(scores[0]),
            dexterity: c(scores[1]),
            constitution: c(scores[2]),
            intelligence: c(scores[3]),
            wisdom: c(scores[4]),
            charisma: c(scores[5]),
        }
    }

    pub fn get(&self, attribute: Attribute) -> i32 {
        match attribute {
            Attribute::Strength => self.strength,
            Attribute::Dexterity => self.dexterity,
            Attribute::Constitution => self.constitution,
            Attribute::Intelligence => self.intelligence,
            Attribute::Wisdom => self.wisdom,
            Attribute::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, attribute: Attribute, value: i32) {
        let value = value.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX);
        match attribute {
            Attribute::Strength => self.strength = value,
            Attribute::Dexterity => self.dexterity = value,
            Attribute::Constitution => self.constitution = value,
            Attribute::Intelligence => self.intelligence = value,
            Attribute::Wisdom => self.wisdom = value,
            Attribute::Charisma => self.charisma = value,
        }
    }

    /// Standard ability modifier: `(score - 10) / 2`, rounded down.
    pub fn modifier(&self, attribute: Attribute) -> i32 {
        (self.get(attribute) - 10).div_euclid(2)
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::from_scores([10; 6])
    }
}

/// Character classes, with their hit dice and casting traditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Fighter,
    Cleric,
    Mage,
    Thief,
    Ranger,
    Paladin,
}

impl CharacterClass {
    pub fn all() -> [CharacterClass; 6] {
        [
            Self::Fighter,
            Self::Cleric,
            Self::Mage,
            Self::Thief,
            Self::Ranger,
            Self::Paladin,
        ]
    }

    pub fn hit_die(&self) -> u8 {
        match self {
            Self::Fighter => 10,
            Self::Cleric => 8,
            Self::Mage => 4,
            Self::Thief => 6,
            Self::Ranger => 10,
            Self::Paladin => 10,
        }
    }

    /// Whether the class prepares spells at all.
    pub fn is_caster(&self) -> bool {
        !matches!(self, Self::Fighter | Self::Thief)
    }

    /// Highest spell level available at the given character level, or
    /// `None` for non-casters. Full casters reach level `(n+1)/2`, half
    /// casters lag two levels behind.
    pub fn max_spell_level(&self, level: u8) -> Option<u8> {
        match self {
            Self::Mage | Self::Cleric => Some(((level + 1) / 2).min(9)),
            Self::Ranger | Self::Paladin => {
                if level < 2 {
                    None
                } else {
                    Some(((level - 1) / 4 + 1).min(4))
                }
            }
            Self::Fighter | Self::Thief => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fighter => "fighter",
            Self::Cleric => "cleric",
            Self::Mage => "mage",
            Self::Thief => "thief",
            Self::Ranger => "ranger",
            Self::Paladin => "paladin",
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CharacterClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fighter" => Ok(Self::Fighter),
            "cleric" => Ok(Self::Cleric),
            "mage" | "magic_user" | "wizard" => Ok(Self::Mage),
            "thief" | "rogue" => Ok(Self::Thief),
            "ranger" => Ok(Self::Ranger),
            "paladin" => Ok(Self::Paladin),
            other => Err(DomainError::parse(format!("unknown class '{other}'"))),
        }
    }
}

/// Hit points. `current` is always within `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        let max = max.max(1);
        Self { current: max, max }
    }

    /// Apply damage, clamping at 0. Returns the amount actually dealt.
    pub fn damage(&mut self, amount: i32) -> i32 {
        let amount = amount.max(0);
        let dealt = amount.min(self.current);
        self.current -= dealt;
        dealt
    }

    /// Apply healing, clamping at max. Returns the amount actually healed.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let amount = amount.max(0);
        let healed = amount.min(self.max - self.current);
        self.current += healed;
        healed
    }

    /// Raise max HP (level up), healing by the same amount.
    pub fn raise_max(&mut self, by: i32) {
        let by = by.max(0);
        self.max += by;
        self.current = (self.current + by).min(self.max);
    }

    pub fn is_defeated(&self) -> bool {
        self.current == 0
    }
}

/// Spell slots per spell level (index 0 = cantrips, unlimited and unused).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellSlots {
    /// `remaining[l]` and `maximum[l]` for spell level `l` in 1..=9
    pub remaining: [u8; 10],
    pub maximum: [u8; 10],
}

impl SpellSlots {
    /// Slot table derived from class and character level.
    pub fn for_class(class: CharacterClass, level: u8) -> Self {
        let mut slots = Self::default();
        let Some(max_spell_level) = class.max_spell_level(level) else {
            return slots;
        };
        for spell_level in 1..=max_spell_level {
            // Deeper slots are scarcer; minimum of one at each unlocked level
            let count = (level / (spell_level * 2)).clamp(1, 4);
            slots.maximum[spell_level as usize] = count;
            slots.remaining[spell_level as usize] = count;
        }
        slots
    }

    pub fn available(&self, spell_level: u8) -> u8 {
        if spell_level == 0 {
            return u8::MAX; // cantrips are not slot-limited
        }
        self.remaining
            .get(spell_level as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Consume a slot of the given level.
    pub fn consume(&mut self, spell_level: u8) -> Result<(), DomainError> {
        if spell_level == 0 {
            return Ok(());
        }
        let idx = spell_level as usize;
        if idx >= self.remaining.len() || self.remaining[idx] == 0 {
            return Err(DomainError::InsufficientResources(format!(
                "no level-{spell_level} spell slots remaining"
            )));
        }
        self.remaining[idx] -= 1;
        Ok(())
    }

    /// Restore all slots (rest).
    pub fn restore(&mut self) {
        self.remaining = self.maximum;
    }
}

/// A player character: attributes, class, progression, equipment, inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub class: CharacterClass,
    pub level: u8,
    pub experience: u32,
    pub attributes: Attributes,
    pub hp: Health,
    /// Equipped items by slot
    pub equipment: BTreeMap<EquipSlot, Item>,
    /// Carried items, in acquisition order
    pub inventory: Vec<Item>,
    pub known_spells: Vec<SpellId>,
    pub spell_slots: SpellSlots,
    pub gold: u32,
}

impl Character {
    /// Create a level-1 character. HP at level 1 is the class hit die
    /// maximum plus the CON modifier (minimum 1).
    pub fn new(name: impl Into<String>, class: CharacterClass, attributes: Attributes) -> Self {
        let con_mod = attributes.modifier(Attribute::Constitution);
        let max_hp = (class.hit_die() as i32 + con_mod).max(1);
        Self {
            name: name.into(),
            class,
            level: 1,
            experience: 0,
            attributes,
            hp: Health::new(max_hp),
            equipment: BTreeMap::new(),
            inventory: Vec::new(),
            known_spells: Vec::new(),
            spell_slots: SpellSlots::for_class(class, 1),
            gold: 0,
        }
    }

    /// Cumulative experience required to reach `level`.
    pub fn xp_for_level(level: u8) -> u32 {
        let l = level as u32;
        500 * l * (l.saturating_sub(1))
    }

    /// Add experience, levelling up as thresholds are crossed. Each level
    /// rolls the class hit die and adds the CON modifier. Returns the
    /// emitted progression events.
    pub fn add_experience<R: Rng + ?Sized>(&mut self, amount: u32, rng: &mut R) -> Vec<EventKind> {
        let mut events = Vec::new();
        self.experience = self.experience.saturating_add(amount);
        events.push(EventKind::ExperienceGained {
            amount,
            total: self.experience,
        });

        while self.level < LEVEL_MAX && self.experience >= Self::xp_for_level(self.level + 1) {
            self.level += 1;
            let roll = DiceFormula::single(self.class.hit_die()).roll(rng).total;
            let gained = (roll + self.attributes.modifier(Attribute::Constitution)).max(1);
            self.hp.raise_max(gained);
            self.spell_slots = SpellSlots::for_class(self.class, self.level);
            events.push(EventKind::LevelGained {
                new_level: self.level,
                new_max_hp: self.hp.max,
            });
        }
        events
    }

    /// Armor class: 10 + DEX modifier + equipped armor bonuses.
    pub fn armor_class(&self) -> i32 {
        10 + self.attributes.modifier(Attribute::Dexterity)
            + self
                .equipment
                .values()
                .map(|item| item.armor_bonus)
                .sum::<i32>()
    }

    /// Melee attack bonus: half level + STR modifier.
    pub fn attack_bonus(&self) -> i32 {
        (self.level as i32) / 2 + self.attributes.modifier(Attribute::Strength)
    }

    /// Damage soaked per hit from worn armor.
    pub fn damage_resistance(&self) -> i32 {
        self.equipment
            .values()
            .map(|item| item.armor_bonus)
            .sum::<i32>()
            / 2
    }

    pub fn equipped_weapon(&self) -> Option<&Item> {
        self.equipment.get(&EquipSlot::MainHand)
    }

    /// Move an item from inventory into its slot. The previous occupant of
    /// the slot (if any) returns to the inventory.
    pub fn equip(&mut self, item_id: ItemId) -> Result<(Item, Option<ItemId>), DomainError> {
        let index = self
            .inventory
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| DomainError::not_found("Item", item_id))?;

        let slot = self.inventory[index]
            .slot
            .ok_or_else(|| DomainError::validation("item is not equippable"))?;

        if !self.inventory[index].usable_by(self.class) {
            return Err(DomainError::constraint(format!(
                "{} cannot be equipped by a {}",
                self.inventory[index].name, self.class
            )));
        }

        let item = self.inventory.remove(index);
        let displaced = self.equipment.insert(slot, item.clone());
        let displaced_id = displaced.as_ref().map(|prev| prev.id);
        if let Some(prev) = displaced {
            self.inventory.push(prev);
        }
        Ok((item, displaced_id))
    }

    /// Remove the occupant of a slot back into inventory.
    pub fn unequip(&mut self, slot: EquipSlot) -> Result<Item, DomainError> {
        let item = self
            .equipment
            .remove(&slot)
            .ok_or_else(|| DomainError::validation(format!("nothing equipped in {slot}")))?;
        self.inventory.push(item.clone());
        Ok(item)
    }

    pub fn inventory_item(&self, item_id: ItemId) -> Option<&Item> {
        self.inventory.iter().find(|item| item.id == item_id)
    }

    /// Remove an item from the inventory (consumption, drop).
    pub fn take_from_inventory(&mut self, item_id: ItemId) -> Option<Item> {
        let index = self.inventory.iter().position(|item| item.id == item_id)?;
        Some(self.inventory.remove(index))
    }

    pub fn carried_weight(&self) -> f32 {
        self.inventory.iter().map(|item| item.weight).sum::<f32>()
            + self.equipment.values().map(|item| item.weight).sum::<f32>()
    }

    pub fn knows_spell(&self, spell_id: SpellId) -> bool {
        self.known_spells.contains(&spell_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{ItemType, Rarity};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sword() -> Item {
        Item::new(
            "longsword",
            "Longsword",
            Rarity::Common,
            ItemType::Weapon,
            4.0,
        )
        .with_slot(EquipSlot::MainHand)
    }

    #[test]
    fn test_modifier_table() {
        let mut attrs = Attributes::default();
        attrs.set(Attribute::Strength, 18);
        assert_eq!(attrs.modifier(Attribute::Strength), 4);
        attrs.set(Attribute::Strength, 3);
        assert_eq!(attrs.modifier(Attribute::Strength), -4);
        attrs.set(Attribute::Strength, 10);
        assert_eq!(attrs.modifier(Attribute::Strength), 0);
    }

    #[test]
    fn test_attributes_clamped_on_construction() {
        let attrs = Attributes::from_scores([0, 50, 12, 12, 12, 12]);
        assert_eq!(attrs.strength, ATTRIBUTE_MIN);
        assert_eq!(attrs.dexterity, ATTRIBUTE_MAX);
        assert_eq!(attrs.constitution, 12);
    }

    #[test]
    fn test_level_one_hp_is_max_hit_die_plus_con() {
        let mut attrs = Attributes::default();
        attrs.set(Attribute::Constitution, 14);
        let character = Character::new("Aria", CharacterClass::Fighter, attrs);
        assert_eq!(character.hp.max, 12); // d10 max + CON mod 2
        assert_eq!(character.hp.current, character.hp.max);
    }

    #[test]
    fn test_equip_swaps_previous_occupant() {
        let mut character = Character::new("Aria", CharacterClass::Fighter, Attributes::default());
        let first = sword();
        let second = sword();
        let (first_id, second_id) = (first.id, second.id);
        character.inventory.push(first);
        character.inventory.push(second);

        let (_, displaced) = character.equip(first_id).expect("equips");
        assert!(displaced.is_none());
        let (_, displaced) = character.equip(second_id).expect("equips");
        assert_eq!(displaced, Some(first_id));
        assert!(character
            .inventory
            .iter()
            .any(|item| item.id == first_id));
    }

    #[test]
    fn test_equip_unequip_is_inverse() {
        let mut character = Character::new("Aria", CharacterClass::Fighter, Attributes::default());
        let item = sword();
        let item_id = item.id;
        character.inventory.push(item);
        let before = character.inventory.clone();

        character.equip(item_id).expect("equips");
        character.unequip(EquipSlot::MainHand).expect("unequips");

        assert_eq!(character.inventory, before);
        assert!(character.equipment.is_empty());
    }

    #[test]
    fn test_class_restriction_enforced() {
        let mut character = Character::new("Zara", CharacterClass::Mage, Attributes::default());
        let item = sword().restricted_to(vec![CharacterClass::Fighter]);
        let item_id = item.id;
        character.inventory.push(item);
        assert!(matches!(
            character.equip(item_id),
            Err(DomainError::Constraint(_))
        ));
        // item stays in inventory on failure
        assert!(character.inventory_item(item_id).is_some());
    }

    #[test]
    fn test_level_up_on_xp_threshold() {
        let mut character = Character::new("Aria", CharacterClass::Fighter, Attributes::default());
        let mut rng = StdRng::seed_from_u64(1);
        let before_max = character.hp.max;
        let events = character.add_experience(Character::xp_for_level(2), &mut rng);
        assert_eq!(character.level, 2);
        assert!(character.hp.max > before_max);
        assert!(events
            .iter()
            .any(|event| matches!(event, EventKind::LevelGained { new_level: 2, .. })));
    }

    #[test]
    fn test_spell_slots_consume_and_restore() {
        let mut slots = SpellSlots::for_class(CharacterClass::Mage, 3);
        assert!(slots.available(1) > 0);
        let initial = slots.available(1);
        slots.consume(1).expect("has slots");
        assert_eq!(slots.available(1), initial - 1);
        slots.restore();
        assert_eq!(slots.available(1), initial);
        assert!(slots.consume(9).is_err());
    }

    #[test]
    fn test_health_clamps() {
        let mut hp = Health::new(10);
        assert_eq!(hp.damage(4), 4);
        assert_eq!(hp.current, 6);
        assert_eq!(hp.damage(100), 6);
        assert!(hp.is_defeated());
        assert_eq!(hp.heal(25), 10);
        assert_eq!(hp.current, 10);
    }
}
