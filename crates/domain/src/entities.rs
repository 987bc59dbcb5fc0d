//! World entities: players, NPCs, and static objects.
//!
//! Capability dispatch is a tagged enum with small accessor methods, not
//! an inheritance hierarchy. Cross-references (effects, quests, combat)
//! store `EntityId`s; the world entity table is the single ownership
//! authority.

use serde::{Deserialize, Serialize};

use crate::character::{Attribute, Attributes, Character, Health};
use crate::dice::DiceFormula;
use crate::ids::EntityId;
use crate::position::Position;

/// What a static object is; drives interaction and blocking defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Door,
    Chest,
    Portal,
    Stairs,
    Fountain,
    Brazier,
}

/// A connected player's avatar. Health lives on the owned character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntity {
    pub id: EntityId,
    pub position: Position,
    pub character: Character,
}

/// A non-player creature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcEntity {
    pub id: EntityId,
    /// Template name, stable across instances ("goblin", "skeleton")
    pub template: String,
    pub name: String,
    pub position: Position,
    pub level: u8,
    pub attributes: Attributes,
    pub hp: Health,
    pub hostile: bool,
    /// Experience awarded to the party on defeat
    pub xp_value: u32,
    pub damage: DiceFormula,
    pub armor: i32,
    /// Defeated creatures stay in the world until removed or resurrected
    pub defeated: bool,
}

impl NpcEntity {
    pub fn armor_class(&self) -> i32 {
        10 + self.attributes.modifier(Attribute::Dexterity) + self.armor
    }

    pub fn attack_bonus(&self) -> i32 {
        (self.level as i32) / 2 + self.attributes.modifier(Attribute::Strength)
    }

    pub fn damage_resistance(&self) -> i32 {
        self.armor / 2
    }
}

/// Scenery the rules can address: doors, chests, portals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntity {
    pub id: EntityId,
    pub name: String,
    pub position: Position,
    pub kind: ObjectKind,
    pub blocks_movement: bool,
}

/// Any addressable, positioned object in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    Player(PlayerEntity),
    Npc(NpcEntity),
    StaticObject(ObjectEntity),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Player(p) => p.id,
            Self::Npc(n) => n.id,
            Self::StaticObject(o) => o.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Player(p) => &p.character.name,
            Self::Npc(n) => &n.name,
            Self::StaticObject(o) => &o.name,
        }
    }

    /// Template string used for quest objective matching.
    pub fn template(&self) -> &str {
        match self {
            Self::Player(p) => &p.character.name,
            Self::Npc(n) => &n.template,
            Self::StaticObject(o) => &o.name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Player(p) => p.position,
            Self::Npc(n) => n.position,
            Self::StaticObject(o) => o.position,
        }
    }

    /// Only the world model may call this; it keeps the spatial index in
    /// step with the stored position.
    pub(crate) fn set_position(&mut self, position: Position) {
        match self {
            Self::Player(p) => p.position = position,
            Self::Npc(n) => n.position = position,
            Self::StaticObject(o) => o.position = position,
        }
    }

    pub fn health(&self) -> Option<&Health> {
        match self {
            Self::Player(p) => Some(&p.character.hp),
            Self::Npc(n) => Some(&n.hp),
            Self::StaticObject(_) => None,
        }
    }

    pub fn health_mut(&mut self) -> Option<&mut Health> {
        match self {
            Self::Player(p) => Some(&mut p.character.hp),
            Self::Npc(n) => Some(&mut n.hp),
            Self::StaticObject(_) => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::Player(p) => Some(&p.character.attributes),
            Self::Npc(n) => Some(&n.attributes),
            Self::StaticObject(_) => None,
        }
    }

    /// Whether this entity takes part in turn order.
    pub fn acts_in_turn(&self) -> bool {
        matches!(self, Self::Player(_) | Self::Npc(_))
    }

    /// Whether this entity keeps others off its tile.
    pub fn blocks_movement(&self) -> bool {
        match self {
            Self::Player(_) | Self::Npc(_) => true,
            Self::StaticObject(o) => o.blocks_movement,
        }
    }

    pub fn is_defeated(&self) -> bool {
        match self {
            Self::Player(p) => p.character.hp.is_defeated(),
            Self::Npc(n) => n.defeated || n.hp.is_defeated(),
            Self::StaticObject(_) => false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health().is_some() && !self.is_defeated()
    }

    pub fn as_player(&self) -> Option<&PlayerEntity> {
        match self {
            Self::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut PlayerEntity> {
        match self {
            Self::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_npc(&self) -> Option<&NpcEntity> {
        match self {
            Self::Npc(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_npc_mut(&mut self) -> Option<&mut NpcEntity> {
        match self {
            Self::Npc(n) => Some(n),
            _ => None,
        }
    }
}

/// Convenience constructors used by bootstrap and PCG.
impl Entity {
    pub fn player(position: Position, character: Character) -> Self {
        Self::Player(PlayerEntity {
            id: EntityId::new(),
            position,
            character,
        })
    }

    pub fn npc(
        template: impl Into<String>,
        name: impl Into<String>,
        position: Position,
        level: u8,
        attributes: Attributes,
        hostile: bool,
    ) -> Self {
        let hit_points = 4 + 5 * level as i32 + attributes.modifier(Attribute::Constitution);
        Self::Npc(NpcEntity {
            id: EntityId::new(),
            template: template.into(),
            name: name.into(),
            position,
            level,
            attributes,
            hp: Health::new(hit_points),
            hostile,
            xp_value: 50 * level as u32,
            damage: DiceFormula::single(6),
            armor: 0,
            defeated: false,
        })
    }

    pub fn object(
        name: impl Into<String>,
        position: Position,
        kind: ObjectKind,
        blocks_movement: bool,
    ) -> Self {
        Self::StaticObject(ObjectEntity {
            id: EntityId::new(),
            name: name.into(),
            position,
            kind,
            blocks_movement,
        })
    }
}
