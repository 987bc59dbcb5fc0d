//! Typed game events.
//!
//! Every world mutation emits one or more `GameEvent`s. The engine's event
//! bus stamps the monotonic sequence number at publish time and delivers
//! events synchronously, in emission order, while the world write lock is
//! still held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::character::CharacterClass;
use crate::effects::{EffectDuration, EffectKind};
use crate::ids::{EffectId, EncounterId, EntityId, ItemId, QuestId, SessionId};
use crate::items::EquipSlot;
use crate::position::Position;

/// The payload of a game event, tagged by type on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    EntitySpawned {
        position: Position,
        name: String,
    },
    EntityMoved {
        from: Position,
        to: Position,
    },
    EntityDefeated {
        /// Template name, matched against kill objectives
        template: String,
        xp_awarded: u32,
    },
    EntityRemoved,
    DamageDealt {
        amount: i32,
        remaining_hp: i32,
    },
    HealingApplied {
        amount: i32,
        remaining_hp: i32,
    },
    AttackLanded {
        roll: i32,
        damage: i32,
        critical: bool,
    },
    AttackMissed {
        roll: i32,
        fumble: bool,
    },
    CombatStarted {
        encounter: EncounterId,
        order: Vec<EntityId>,
    },
    TurnAdvanced {
        encounter: EncounterId,
        round: u32,
    },
    RoundEnded {
        encounter: EncounterId,
        round: u32,
    },
    CombatEnded {
        encounter: EncounterId,
        victors: Vec<EntityId>,
    },
    EffectApplied {
        effect: EffectId,
        kind: EffectKind,
        magnitude: i32,
        duration: EffectDuration,
    },
    EffectTicked {
        effect: EffectId,
        magnitude: i32,
    },
    EffectExpired {
        effect: EffectId,
        kind: EffectKind,
    },
    SpellCast {
        spell_name: String,
    },
    ItemAcquired {
        item: ItemId,
        template: String,
    },
    ItemEquipped {
        item: ItemId,
        slot: EquipSlot,
    },
    ItemUnequipped {
        item: ItemId,
        slot: EquipSlot,
    },
    ItemUsed {
        item: ItemId,
    },
    CharacterCreated {
        class: CharacterClass,
        level: u8,
    },
    ExperienceGained {
        amount: u32,
        total: u32,
    },
    LevelGained {
        new_level: u8,
        new_max_hp: i32,
    },
    LocationReached {
        position: Position,
    },
    QuestStarted {
        quest: QuestId,
        title: String,
    },
    ObjectiveUpdated {
        quest: QuestId,
        objective: usize,
        progress: u32,
        required: u32,
    },
    QuestCompleted {
        quest: QuestId,
        xp_reward: u32,
    },
    QuestFailed {
        quest: QuestId,
    },
    SessionStarted {
        session: SessionId,
    },
    SessionEnded {
        session: SessionId,
        reason: String,
    },
    /// Emitted by PCG after every generation call; feeds the quality loop.
    ContentGenerated {
        content_kind: String,
        duration_ms: u64,
        quality: f64,
    },
    /// Emitted by the quality monitor when a generator parameter changes.
    GenerationAdjusted {
        adjustment: String,
        reason: String,
    },
}

impl EventKind {
    /// Stable name used for subscription matching and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EntitySpawned { .. } => "entity_spawned",
            Self::EntityMoved { .. } => "entity_moved",
            Self::EntityDefeated { .. } => "entity_defeated",
            Self::EntityRemoved => "entity_removed",
            Self::DamageDealt { .. } => "damage_dealt",
            Self::HealingApplied { .. } => "healing_applied",
            Self::AttackLanded { .. } => "attack_landed",
            Self::AttackMissed { .. } => "attack_missed",
            Self::CombatStarted { .. } => "combat_started",
            Self::TurnAdvanced { .. } => "turn_advanced",
            Self::RoundEnded { .. } => "round_ended",
            Self::CombatEnded { .. } => "combat_ended",
            Self::EffectApplied { .. } => "effect_applied",
            Self::EffectTicked { .. } => "effect_ticked",
            Self::EffectExpired { .. } => "effect_expired",
            Self::SpellCast { .. } => "spell_cast",
            Self::ItemAcquired { .. } => "item_acquired",
            Self::ItemEquipped { .. } => "item_equipped",
            Self::ItemUnequipped { .. } => "item_unequipped",
            Self::ItemUsed { .. } => "item_used",
            Self::CharacterCreated { .. } => "character_created",
            Self::ExperienceGained { .. } => "experience_gained",
            Self::LevelGained { .. } => "level_gained",
            Self::LocationReached { .. } => "location_reached",
            Self::QuestStarted { .. } => "quest_started",
            Self::ObjectiveUpdated { .. } => "objective_updated",
            Self::QuestCompleted { .. } => "quest_completed",
            Self::QuestFailed { .. } => "quest_failed",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionEnded { .. } => "session_ended",
            Self::ContentGenerated { .. } => "content_generated",
            Self::GenerationAdjusted { .. } => "generation_adjusted",
        }
    }

    /// Whether the fan-out may shed this event under backpressure.
    /// Session-lifecycle and combat-state transitions are never dropped.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            Self::EntityMoved { .. }
                | Self::DamageDealt { .. }
                | Self::HealingApplied { .. }
                | Self::EffectTicked { .. }
                | Self::LocationReached { .. }
        )
    }
}

/// A game event: typed payload plus envelope metadata.
///
/// `seq` is 0 until the event bus stamps it; subscribers always observe a
/// strictly increasing sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl GameEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            source: None,
            target: None,
            kind,
        }
    }

    pub fn from_source(source: EntityId, kind: EventKind) -> Self {
        Self {
            source: Some(source),
            ..Self::new(kind)
        }
    }

    pub fn targeted(source: EntityId, target: EntityId, kind: EventKind) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            ..Self::new(kind)
        }
    }

    pub fn on_target(target: EntityId, kind: EventKind) -> Self {
        Self {
            target: Some(target),
            ..Self::new(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        let ev = EventKind::EntityRemoved;
        assert_eq!(ev.name(), "entity_removed");
    }

    #[test]
    fn test_droppable_classification() {
        let moved = EventKind::EntityMoved {
            from: Position::new(0, 0, 0),
            to: Position::new(1, 0, 0),
        };
        assert!(moved.is_droppable());

        let ended = EventKind::SessionEnded {
            session: SessionId::new(),
            reason: "ttl".into(),
        };
        assert!(!ended.is_droppable());

        let combat = EventKind::CombatStarted {
            encounter: EncounterId::new(),
            order: vec![],
        };
        assert!(!combat.is_droppable());
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let ev = GameEvent::new(EventKind::EntityRemoved);
        let json = serde_json::to_value(&ev).expect("serializes");
        assert_eq!(json["type"], "entity_removed");
        assert_eq!(json["seq"], 0);
    }
}
