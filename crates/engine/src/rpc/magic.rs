//! Spell and item handlers: casting, consuming, equipping, and the
//! read-only spell catalogue queries.

use std::sync::Arc;

use grimbox_domain::{
    magic, CastTarget, DomainError, Entity, EventKind, GameEvent, Spell,
};
use grimbox_protocol::methods::{
    CastSpellParams, CastSpellResult, EquipItemParams, EquipmentResult, GetSpellParams,
    GetSpellsByLevelParams, GetSpellsBySchoolParams, SearchSpellsParams, SpellListResult,
    SpellResult, UnequipItemParams, UseItemParams, UseItemResult,
};
use grimbox_protocol::RpcError;

use super::{to_value, HandlerResult};
use crate::session::Session;
use crate::state::Engine;

/// World write lock. Validates, spends resources, applies effects.
pub async fn cast_spell(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: CastSpellParams,
) -> HandlerResult {
    let spell: Spell = engine
        .spells
        .get(params.spell_id)
        .cloned()
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Spell", params.spell_id)))?;

    let target = match (params.target_id, params.target_position) {
        (Some(entity), _) => CastTarget::Entity(entity),
        (None, Some(position)) => CastTarget::Position(position),
        (None, None) => {
            return Err(RpcError::invalid_params(
                "castSpell needs target_id or target_position",
            ))
        }
    };

    let mut state = engine.game.write().await;

    let targets = magic::validate_cast(&state.world, &state.effects, caller.player, &spell, target)
        .map_err(|err| RpcError::from(&err))?;

    // casting costs a turn action when an encounter is running
    let in_combat = state
        .encounter
        .as_ref()
        .map(|encounter| encounter.is_participant(caller.player))
        .unwrap_or(false);
    if in_combat {
        if let Some(encounter) = state.encounter.as_mut() {
            encounter
                .begin_action(caller.player, spell.cast_cost.max(1))
                .map_err(|err| RpcError::from(&err))?;
        }
    }

    // resource spend happens after all validation so failures change
    // nothing
    {
        let character = &mut state
            .world
            .entity_mut(caller.player)
            .and_then(Entity::as_player_mut)
            .ok_or_else(RpcError::session_invalid)?
            .character;
        character
            .spell_slots
            .consume(spell.level)
            .map_err(|err| RpcError::from(&err))?;
    }

    let mut events = vec![GameEvent::from_source(
        caller.player,
        EventKind::SpellCast {
            spell_name: spell.name.clone(),
        },
    )];
    let mut applied = Vec::new();
    for target_id in targets {
        let effect = spell.effect.instantiate(caller.player, target_id);
        let (effect_id, effect_events) = state.apply_effect(effect);
        applied.push(effect_id);
        events.extend(effect_events);
    }

    if in_combat {
        if let Some(encounter) = state.encounter.as_mut() {
            let advance = encounter.finish_action();
            events.extend(state.apply_turn_advance(advance, &mut rand::thread_rng()));
        }
    }
    engine.settle(&mut state, events);

    let count = applied.len();
    to_value(CastSpellResult {
        success: true,
        effects: applied,
        message: format!("{} affected {} target(s)", spell.name, count),
    })
}

/// World write lock. Consumes the item and applies its use effect.
pub async fn use_item(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: UseItemParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;

    let item = state
        .world
        .entity(caller.player)
        .and_then(Entity::as_player)
        .and_then(|player| player.character.inventory_item(params.item_id))
        .cloned()
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Item", params.item_id)))?;

    magic::validate_item_use(&state.world, &state.effects, caller.player, &item, params.target_id)
        .map_err(|err| RpcError::from(&err))?;

    let in_combat = state
        .encounter
        .as_ref()
        .map(|encounter| encounter.is_participant(caller.player))
        .unwrap_or(false);
    if in_combat {
        if let Some(encounter) = state.encounter.as_mut() {
            encounter
                .begin_action(caller.player, 1)
                .map_err(|err| RpcError::from(&err))?;
        }
    }

    let mut events = vec![GameEvent::from_source(
        caller.player,
        EventKind::ItemUsed { item: item.id },
    )];

    // consumables leave the inventory on use
    if item.is_consumable() {
        if let Some(player) = state
            .world
            .entity_mut(caller.player)
            .and_then(Entity::as_player_mut)
        {
            player.character.take_from_inventory(item.id);
        }
    }

    let effect_id = match &item.on_use {
        Some(template) => {
            let effect = template.instantiate(caller.player, params.target_id);
            let (effect_id, effect_events) = state.apply_effect(effect);
            events.extend(effect_events);
            Some(effect_id)
        }
        None => None,
    };

    if in_combat {
        if let Some(encounter) = state.encounter.as_mut() {
            let advance = encounter.finish_action();
            events.extend(state.apply_turn_advance(advance, &mut rand::thread_rng()));
        }
    }
    engine.settle(&mut state, events);

    to_value(UseItemResult {
        success: true,
        effect: effect_id,
    })
}

/// World write lock. Slot and class rules live on the character.
pub async fn equip_item(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: EquipItemParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;

    let (item, displaced) = {
        let character = &mut state
            .world
            .entity_mut(caller.player)
            .and_then(Entity::as_player_mut)
            .ok_or_else(RpcError::session_invalid)?
            .character;
        character
            .equip(params.item_id)
            .map_err(|err| RpcError::from(&err))?
    };

    let slot = item.slot.unwrap_or(grimbox_domain::EquipSlot::MainHand);
    let mut events = Vec::new();
    if let Some(previous) = displaced {
        events.push(GameEvent::on_target(
            caller.player,
            EventKind::ItemUnequipped {
                item: previous,
                slot,
            },
        ));
    }
    events.push(GameEvent::on_target(
        caller.player,
        EventKind::ItemEquipped {
            item: item.id,
            slot,
        },
    ));

    // worn enchantments last until the item comes off
    if let Some(template) = &item.on_equip {
        let effect = template.instantiate(caller.player, caller.player);
        let (_, effect_events) = state.apply_effect(effect);
        events.extend(effect_events);
    }
    engine.settle(&mut state, events);
    drop(state);

    equipment_result(engine, caller).await
}

/// World write lock.
pub async fn unequip_item(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: UnequipItemParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;

    let item = {
        let character = &mut state
            .world
            .entity_mut(caller.player)
            .and_then(Entity::as_player_mut)
            .ok_or_else(RpcError::session_invalid)?
            .character;
        character
            .unequip(params.slot)
            .map_err(|err| RpcError::from(&err))?
    };

    let mut events = vec![GameEvent::on_target(
        caller.player,
        EventKind::ItemUnequipped {
            item: item.id,
            slot: params.slot,
        },
    )];

    // retire the enchantment the item was granting
    if let Some(template) = &item.on_equip {
        let matching: Vec<_> = state
            .effects
            .active_on(caller.player)
            .iter()
            .filter(|effect| effect.kind == template.kind && effect.source == caller.player)
            .map(|effect| effect.id)
            .collect();
        for effect_id in matching {
            if let Some(effect) = state.effects.remove(effect_id) {
                events.push(GameEvent::on_target(
                    caller.player,
                    EventKind::EffectExpired {
                        effect: effect.id,
                        kind: effect.kind,
                    },
                ));
            }
        }
    }
    engine.settle(&mut state, events);
    drop(state);

    equipment_result(engine, caller).await
}

/// World read lock.
pub async fn get_equipment(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    equipment_result(engine, caller).await
}

async fn equipment_result(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let state = engine.game.read().await;
    let character = &state
        .world
        .entity(caller.player)
        .and_then(Entity::as_player)
        .ok_or_else(RpcError::session_invalid)?
        .character;
    to_value(EquipmentResult {
        success: true,
        equipment: character.equipment.clone(),
        inventory: character.inventory.clone(),
    })
}

// ---------------------------------------------------------------------------
// Catalogue queries: no lock, the catalogue is immutable after startup
// ---------------------------------------------------------------------------

pub fn get_spell(engine: &Arc<Engine>, params: GetSpellParams) -> HandlerResult {
    let spell = engine
        .spells
        .get(params.spell_id)
        .cloned()
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Spell", params.spell_id)))?;
    to_value(SpellResult {
        success: true,
        spell,
    })
}

pub fn spells_by_level(engine: &Arc<Engine>, params: GetSpellsByLevelParams) -> HandlerResult {
    if params.level > 9 {
        return Err(RpcError::invalid_params("spell level must be 0..=9"));
    }
    spell_list(engine.spells.by_level(params.level))
}

pub fn spells_by_school(engine: &Arc<Engine>, params: GetSpellsBySchoolParams) -> HandlerResult {
    spell_list(engine.spells.by_school(params.school))
}

pub fn all_spells(engine: &Arc<Engine>) -> HandlerResult {
    spell_list(engine.spells.all())
}

pub fn search_spells(engine: &Arc<Engine>, params: SearchSpellsParams) -> HandlerResult {
    if params.query.trim().is_empty() {
        return Err(RpcError::invalid_params("query must not be empty"));
    }
    spell_list(engine.spells.search(&params.query))
}

fn spell_list(spells: Vec<&Spell>) -> HandlerResult {
    let spells: Vec<Spell> = spells.into_iter().cloned().collect();
    let count = spells.len();
    to_value(SpellListResult {
        success: true,
        spells,
        count,
    })
}
