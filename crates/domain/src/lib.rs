//! Grimbox domain: the rules of a turn-based, grid-based RPG.
//!
//! Pure game logic with no async runtime and no I/O. All randomness in
//! deterministic paths (combat, PCG) derives from explicit seeds; the
//! engine crate owns locking and decides when mutations run.

pub mod character;
pub mod combat;
pub mod dice;
pub mod effects;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod items;
pub mod magic;
pub mod pcg;
pub mod position;
pub mod quests;
pub mod spells;
pub mod world;

pub use character::{
    Attribute, AttributeMethod, Attributes, Character, CharacterClass, Health, SpellSlots,
};
pub use combat::{
    AttackOutcome, AttackProfile, CombatPhase, DefenseProfile, Encounter, Participant, Side,
    TurnAdvance, ACTION_POINTS_PER_ROUND,
};
pub use dice::{DiceFormula, DiceParseError, DiceRollResult};
pub use effects::{
    Effect, EffectDuration, EffectEngine, EffectKind, EffectPulse, EffectTemplate, StackOutcome,
    StackRule, TickBasis, TickReport,
};
pub use entities::{Entity, NpcEntity, ObjectEntity, ObjectKind, PlayerEntity};
pub use error::DomainError;
pub use events::{EventKind, GameEvent};
pub use ids::{
    ComplexId, EffectId, EncounterId, EntityId, ItemId, QuestId, SessionId, SpellId,
};
pub use items::{EquipSlot, Item, ItemType, Rarity};
pub use magic::CastTarget;
pub use position::{Facing, Position};
pub use quests::{Objective, ObjectiveKind, Quest, QuestLog, QuestRewards, QuestStatus};
pub use spells::{AoeShape, Spell, SpellCatalog, SpellComponents, SpellSchool};
pub use world::{MapLevel, SpatialIndex, TerrainType, Tile, World};
