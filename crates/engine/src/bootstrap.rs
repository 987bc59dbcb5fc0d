//! Zero-configuration first run: generate a dungeon, populate it, and
//! build the spell catalogue.
//!
//! Runs when no snapshot can be loaded. Everything derives from one
//! world seed, so a dev-mode restart reproduces the same world.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use grimbox_domain::pcg::dungeon::{self, RoomType};
use grimbox_domain::pcg::GenerationParams;
use grimbox_domain::{
    Attributes, CharacterClass, DiceFormula, EffectDuration, EffectKind, EffectTemplate, Entity,
    EquipSlot, Item, ItemType, ObjectKind, Position, Rarity, Spell, SpellCatalog, SpellSchool,
};

use crate::game::GameState;

/// Output of a successful bootstrap.
pub struct Bootstrapped {
    pub state: GameState,
    pub spells: SpellCatalog,
    pub entry: Position,
    pub seed: u64,
}

/// Build a fresh world from the seed: dungeon, monsters, scenery,
/// catalogue.
pub fn bootstrap(seed: u64) -> anyhow::Result<Bootstrapped> {
    let params = GenerationParams::new(seed);
    let complex = dungeon::generate(&params)?;
    let entry = complex
        .entry_position()
        .ok_or_else(|| anyhow::anyhow!("generated complex has no entry"))?;

    let mut world = complex.to_world()?;
    let mut rng = StdRng::seed_from_u64(seed ^ 0xB007);

    for level in complex.levels.values() {
        let depth = level.level;
        for room in &level.rooms {
            let (cx, cy) = room.center();
            match room.room_type {
                RoomType::Entry => {
                    if depth == 0 {
                        // a villager near the entrance anchors escort quests
                        let _ = world.place_entity(Entity::npc(
                            "villager",
                            "Lost Villager",
                            Position::new(cx + 1, cy, depth),
                            1,
                            Attributes::default(),
                            false,
                        ));
                    }
                }
                RoomType::Lair | RoomType::Barracks => {
                    let pack = rng.gen_range(1..=2 + depth as i32 / 2);
                    for n in 0..pack {
                        let (template, name, level_bonus) = if depth >= 2 {
                            ("skeleton", "Skeleton", 2)
                        } else {
                            ("goblin", "Goblin", 0)
                        };
                        let mut attrs = Attributes::default();
                        attrs.set(
                            grimbox_domain::Attribute::Strength,
                            10 + depth as i32,
                        );
                        let _ = world.place_entity(Entity::npc(
                            template,
                            format!("{name} {}", n + 1),
                            Position::new(cx + n % 3 - 1, cy + n / 3, depth),
                            1 + depth + level_bonus,
                            attrs,
                            true,
                        ));
                    }
                }
                RoomType::Treasure => {
                    let _ = world.place_entity(Entity::object(
                        "Iron-bound Chest",
                        Position::new(cx, cy, depth),
                        ObjectKind::Chest,
                        false,
                    ));
                }
                RoomType::Shrine => {
                    let _ = world.place_entity(Entity::object(
                        "Ancient Fountain",
                        Position::new(cx, cy, depth),
                        ObjectKind::Fountain,
                        false,
                    ));
                }
                RoomType::Chamber | RoomType::Library => {
                    if rng.gen_bool(0.3) {
                        let _ = world.place_entity(Entity::npc(
                            "giant_rat",
                            "Giant Rat",
                            Position::new(cx, cy, depth),
                            1,
                            Attributes::default(),
                            true,
                        ));
                    }
                }
            }
        }
    }

    tracing::info!(
        seed,
        name = %complex.name,
        levels = complex.levels.len(),
        entities = world.entity_count(),
        "bootstrapped world"
    );

    Ok(Bootstrapped {
        state: GameState::new(world),
        spells: default_spell_catalog(),
        entry,
        seed,
    })
}

/// The built-in spell catalogue; immutable for the process lifetime.
pub fn default_spell_catalog() -> SpellCatalog {
    let dot = |magnitude, rounds| {
        EffectTemplate::new(
            EffectKind::DamageOverTime,
            magnitude,
            EffectDuration::Rounds(rounds),
        )
    };
    let hot = |magnitude, rounds| {
        EffectTemplate::new(
            EffectKind::HealOverTime,
            magnitude,
            EffectDuration::Rounds(rounds),
        )
    };

    SpellCatalog::new(vec![
        Spell::new("Spark", SpellSchool::Evocation, 0, 8, dot(2, 1))
            .with_description("A crackle of static leaps to the target."),
        Spell::new("Magic Missile", SpellSchool::Evocation, 1, 12, dot(4, 1))
            .with_description("Unerring darts of force."),
        Spell::new("Cure Light Wounds", SpellSchool::Conjuration, 1, 1, hot(6, 1))
            .with_description("Closes minor cuts and bruises."),
        Spell::new(
            "Hold Person",
            SpellSchool::Enchantment,
            2,
            10,
            EffectTemplate::new(EffectKind::Stun, 0, EffectDuration::Rounds(2)),
        )
        .with_description("The target's limbs lock in place."),
        Spell::new("Acid Arrow", SpellSchool::Evocation, 2, 10, dot(3, 3))
            .with_description("A sizzling bolt that keeps burning."),
        Spell::new(
            "Entangle",
            SpellSchool::Transmutation,
            1,
            9,
            EffectTemplate::new(EffectKind::Root, 0, EffectDuration::Rounds(3)),
        )
        .with_description("Roots and vines grip the target's legs."),
        Spell::new(
            "Bull's Strength",
            SpellSchool::Transmutation,
            2,
            1,
            EffectTemplate::new(
                EffectKind::StatModifier {
                    attribute: grimbox_domain::Attribute::Strength,
                },
                4,
                EffectDuration::Rounds(10),
            ),
        )
        .with_description("Muscles swell with borrowed might."),
        Spell::new("Fireball", SpellSchool::Evocation, 3, 15, dot(8, 1))
            .with_aoe(grimbox_domain::AoeShape::Circle { radius: 3 })
            .with_description("The classic. Mind your friends."),
        Spell::new("Regenerate", SpellSchool::Necromancy, 3, 1, hot(4, 5))
            .with_description("Flesh knits itself over several rounds."),
        Spell::new(
            "Phantasmal Gale",
            SpellSchool::Illusion,
            4,
            12,
            EffectTemplate::new(EffectKind::Stun, 0, EffectDuration::Rounds(1)),
        )
        .with_aoe(grimbox_domain::AoeShape::Cone { length: 6 })
        .with_description("A howling wind only the victims can hear."),
    ])
}

/// The starting kit for a freshly created character.
pub fn starting_equipment(class: CharacterClass) -> Vec<Item> {
    let weapon = match class {
        CharacterClass::Fighter | CharacterClass::Paladin => {
            Item::new("longsword", "Longsword", Rarity::Common, ItemType::Weapon, 3.0)
                .with_slot(EquipSlot::MainHand)
                .with_damage(DiceFormula::single(8))
        }
        CharacterClass::Cleric => {
            Item::new("mace", "Mace", Rarity::Common, ItemType::Weapon, 4.0)
                .with_slot(EquipSlot::MainHand)
                .with_damage(DiceFormula::single(6))
        }
        CharacterClass::Mage => {
            Item::new("quarterstaff", "Quarterstaff", Rarity::Common, ItemType::Weapon, 4.0)
                .with_slot(EquipSlot::MainHand)
                .with_damage(DiceFormula::single(4))
        }
        CharacterClass::Thief => {
            Item::new("dagger", "Dagger", Rarity::Common, ItemType::Weapon, 1.0)
                .with_slot(EquipSlot::MainHand)
                .with_damage(DiceFormula::single(4))
        }
        CharacterClass::Ranger => {
            Item::new("shortbow", "Shortbow", Rarity::Common, ItemType::Weapon, 2.0)
                .with_slot(EquipSlot::MainHand)
                .with_damage(DiceFormula::single(6))
        }
    };

    let armor = if class == CharacterClass::Mage {
        Item::new("robes", "Traveler's Robes", Rarity::Common, ItemType::Armor, 4.0)
            .with_slot(EquipSlot::Body)
            .with_armor_bonus(1)
    } else {
        Item::new("leather_armor", "Leather Armor", Rarity::Common, ItemType::Armor, 10.0)
            .with_slot(EquipSlot::Body)
            .with_armor_bonus(2)
    };

    let potion = Item::new(
        "healing_potion",
        "Potion of Healing",
        Rarity::Common,
        ItemType::Consumable,
        0.5,
    )
    .with_on_use(EffectTemplate::new(
        EffectKind::HealOverTime,
        8,
        EffectDuration::Rounds(1),
    ));

    vec![weapon, armor, potion]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_reproducible() {
        let a = bootstrap(12345).expect("bootstraps");
        let b = bootstrap(12345).expect("bootstraps");
        assert_eq!(a.entry, b.entry);
        assert_eq!(a.state.world.entity_count(), b.state.world.entity_count());
        assert_eq!(a.state.world.level_count(), b.state.world.level_count());
    }

    #[test]
    fn test_bootstrap_spawns_on_walkable_entry() {
        let result = bootstrap(999).expect("bootstraps");
        assert!(result.state.world.is_walkable(&result.entry));
        assert!(result.state.world.entity_count() > 0);
        assert!(!result.spells.is_empty());
    }

    #[test]
    fn test_catalog_covers_levels_and_schools() {
        let catalog = default_spell_catalog();
        assert!(!catalog.by_level(1).is_empty());
        assert!(!catalog.by_school(SpellSchool::Evocation).is_empty());
        assert_eq!(catalog.search("fireball").len(), 1);
    }

    #[test]
    fn test_starting_equipment_fits_class() {
        for class in CharacterClass::all() {
            let kit = starting_equipment(class);
            assert!(kit.iter().any(|item| item.item_type == ItemType::Weapon));
            for item in &kit {
                assert!(item.usable_by(class), "{} cannot use {}", class, item.name);
            }
        }
    }
}
