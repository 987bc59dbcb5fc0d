//! Per-method parameter and result structs.
//!
//! Every RPC method decodes its params into one of these typed structs;
//! there is no reflective validation anywhere. Results serialize into the
//! JSON-RPC `result` member.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grimbox_domain::{
    AttributeMethod, Character, CharacterClass, CombatPhase, EffectId, EncounterId, EntityId,
    EquipSlot, Item, ItemId, Position, Quest, QuestId, SessionId, Spell, SpellId, SpellSchool,
};

// ---------------------------------------------------------------------------
// Shared state fragments (also carried by WebSocket state updates)
// ---------------------------------------------------------------------------

/// The caller's own entity and character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerFragment {
    pub id: EntityId,
    pub position: Position,
    pub character: Character,
}

/// World summary; entity details come from the query methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldFragment {
    pub width: u32,
    pub height: u32,
    pub levels: u8,
    pub turn: u64,
    pub entity_count: usize,
}

/// Active combat summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatFragment {
    pub encounter: EncounterId,
    pub phase: CombatPhase,
    pub round: u32,
    pub active: Option<EntityId>,
    pub order: Vec<EntityId>,
}

/// A positioned entity as returned by the spatial query methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub id: EntityId,
    pub name: String,
    pub kind: String,
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Session & character methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameParams {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameResult {
    pub session_id: SessionId,
    pub player_id: EntityId,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveGameResult {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetGameStateResult {
    pub player: Option<PlayerFragment>,
    pub world: WorldFragment,
    pub combat: Option<CombatFragment>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCharacterParams {
    pub name: String,
    pub class: CharacterClass,
    pub attribute_method: AttributeMethod,
    /// Grant the class's starting kit
    #[serde(default)]
    pub starting_equipment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCharacterResult {
    pub session_id: SessionId,
    pub player_id: EntityId,
    pub character: Character,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Movement & combat methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveParams {
    /// One of the eight compass directions
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackParams {
    pub target_id: EntityId,
    /// Defaults to the equipped main-hand weapon
    #[serde(default)]
    pub weapon_id: Option<ItemId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_health: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCombatParams {
    pub participant_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCombatResult {
    pub success: bool,
    pub combat: CombatFragment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndTurnResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_turn: Option<EntityId>,
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEffectParams {
    /// Effect kind name ("damage_over_time", "stun", ...)
    pub effect_type: String,
    pub target_id: EntityId,
    pub magnitude: i32,
    /// Duration in combat rounds
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEffectResult {
    pub success: bool,
    pub effect_id: EffectId,
}

// ---------------------------------------------------------------------------
// Spells & items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastSpellParams {
    pub spell_id: SpellId,
    #[serde(default)]
    pub target_id: Option<EntityId>,
    #[serde(default)]
    pub target_position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastSpellResult {
    pub success: bool,
    #[serde(default)]
    pub effects: Vec<EffectId>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseItemParams {
    pub item_id: ItemId,
    pub target_id: EntityId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseItemResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipItemParams {
    pub item_id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnequipItemParams {
    pub slot: EquipSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentResult {
    pub success: bool,
    /// Slot name -> equipped item
    pub equipment: std::collections::BTreeMap<EquipSlot, Item>,
    pub inventory: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSpellParams {
    pub spell_id: SpellId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSpellsByLevelParams {
    pub level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSpellsBySchoolParams {
    pub school: SpellSchool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpellsParams {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellResult {
    pub success: bool,
    pub spell: Spell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellListResult {
    pub success: bool,
    pub spells: Vec<Spell>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Spatial queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetObjectsInRangeParams {
    pub level: u8,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetObjectsInRadiusParams {
    pub x: i32,
    pub y: i32,
    pub level: u8,
    pub radius: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNearestObjectsParams {
    pub x: i32,
    pub y: i32,
    pub level: u8,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsResult {
    pub success: bool,
    pub objects: Vec<ObjectSummary>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Quests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartQuestParams {
    /// Omitted: the server generates a quest fitting the current world
    #[serde(default)]
    pub quest_id: Option<QuestId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestIdParams {
    pub quest_id: QuestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateObjectiveParams {
    pub quest_id: QuestId,
    pub objective_index: usize,
    pub delta: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestResult {
    pub success: bool,
    pub quest: Quest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestListResult {
    pub success: bool,
    pub quests: Vec<Quest>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_character_params_decode() {
        let raw = json!({
            "name": "Aria",
            "class": "fighter",
            "attribute_method": {
                "method": "standard_array",
                "order": ["strength", "constitution", "dexterity",
                          "wisdom", "intelligence", "charisma"]
            },
            "starting_equipment": true
        });
        let params: CreateCharacterParams = serde_json::from_value(raw).expect("decodes");
        assert_eq!(params.class, CharacterClass::Fighter);
        assert!(params.starting_equipment);
    }

    #[test]
    fn test_optional_fields_default() {
        let params: CastSpellParams =
            serde_json::from_value(json!({"spell_id": uuid::Uuid::new_v4()})).expect("decodes");
        assert!(params.target_id.is_none());
        assert!(params.target_position.is_none());

        let params: StartQuestParams = serde_json::from_value(json!({})).expect("decodes");
        assert!(params.quest_id.is_none());
    }

    #[test]
    fn test_move_result_omits_empty_fields() {
        let result = MoveResult {
            success: true,
            new_position: None,
            message: None,
        };
        let value = serde_json::to_value(&result).expect("serializes");
        assert!(value.get("new_position").is_none());
        assert!(value.get("message").is_none());
    }
}
