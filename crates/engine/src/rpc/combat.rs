//! Combat handlers: startCombat, attack, endTurn, applyEffect.

use std::sync::Arc;

use grimbox_domain::{
    AttackProfile, DefenseProfile, DomainError, Effect, EffectDuration, EffectKind,
    EffectTemplate, Encounter, Entity, EntityId, EventKind, GameEvent, Side,
};
use grimbox_protocol::methods::{
    ApplyEffectParams, ApplyEffectResult, AttackParams, AttackResult, EndTurnResult,
    StartCombatParams, StartCombatResult,
};
use grimbox_protocol::RpcError;

use super::session::combat_fragment;
use super::{to_value, HandlerResult};
use crate::game::GameState;
use crate::session::Session;
use crate::state::Engine;

/// World write lock. Rolls initiative and opens round 1.
pub async fn start_combat(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: StartCombatParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;
    if state.encounter.is_some() {
        return Err(RpcError::from(&DomainError::constraint(
            "an encounter is already running",
        )));
    }

    let mut ids = params.participant_ids.clone();
    if !ids.contains(&caller.player) {
        ids.push(caller.player);
    }
    ids.sort_unstable();
    ids.dedup();

    let mut entrants = Vec::new();
    for id in &ids {
        let entity = state
            .world
            .entity(*id)
            .ok_or_else(|| RpcError::from(&DomainError::not_found("Entity", id)))?;
        if !entity.acts_in_turn() {
            return Err(RpcError::from(&DomainError::invalid_target(format!(
                "{} cannot act in combat",
                entity.name()
            ))));
        }
        if !entity.is_alive() {
            return Err(RpcError::from(&DomainError::invalid_target(format!(
                "{} is already defeated",
                entity.name()
            ))));
        }
        let side = match entity {
            Entity::Npc(npc) if npc.hostile => Side::Hostile,
            _ => Side::Party,
        };
        let dex_mod = entity
            .attributes()
            .map(|attrs| attrs.modifier(grimbox_domain::Attribute::Dexterity))
            .unwrap_or(0);
        entrants.push((*id, dex_mod, side));
    }

    // dev mode keeps encounters reproducible across restarts
    let seed = if engine.config.enable_dev_mode {
        engine.world_seed ^ state.world.turn
    } else {
        rand::Rng::gen(&mut rand::thread_rng())
    };
    let mut encounter = Encounter::new(seed);
    encounter
        .roll_initiative(entrants)
        .map_err(|err| RpcError::from(&err))?;

    let events = vec![GameEvent::new(EventKind::CombatStarted {
        encounter: encounter.id,
        order: encounter.turn_order(),
    })];
    state.encounter = Some(encounter);
    engine.settle(&mut state, events);

    let combat = combat_fragment(&state).ok_or_else(|| RpcError::internal("encounter vanished"))?;
    to_value(StartCombatResult {
        success: true,
        combat,
    })
}

/// World write lock. One attack action by the current participant.
pub async fn attack(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: AttackParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;
    if state.encounter.is_none() {
        return Err(RpcError::from(&DomainError::NotInCombat));
    }
    if state.effects.is_stunned(caller.player) {
        return Err(RpcError::from(&DomainError::constraint(
            "you are stunned",
        )));
    }

    let (attack_profile, attacker_pos) = attacker_profile(&state, caller.player, &params)?;
    let (defense_profile, target_pos, target_alive) = defender_profile(&state, params.target_id)?;
    if !target_alive {
        return Err(RpcError::from(&DomainError::invalid_target(
            "target is already defeated",
        )));
    }
    let distance = attacker_pos.chebyshev_distance(&target_pos);
    if distance > 1 {
        return Err(RpcError::from(&DomainError::NotInRange {
            distance,
            max: 1,
        }));
    }

    let outcome = {
        let encounter = state
            .encounter
            .as_mut()
            .ok_or_else(|| RpcError::from(&DomainError::NotInCombat))?;
        encounter
            .begin_action(caller.player, 1)
            .map_err(|err| RpcError::from(&err))?;
        encounter.resolve_attack(&attack_profile, &defense_profile)
    };

    let mut events = Vec::new();
    let mut rng = rand::thread_rng();
    let (damage, target_health) = if outcome.hit {
        events.push(GameEvent::targeted(
            caller.player,
            params.target_id,
            EventKind::AttackLanded {
                roll: outcome.attack_roll,
                damage: outcome.damage,
                critical: outcome.critical,
            },
        ));
        events.extend(state.apply_damage(
            Some(caller.player),
            params.target_id,
            outcome.damage,
            &mut rng,
        ));
        let health = state
            .world
            .entity(params.target_id)
            .and_then(Entity::health)
            .map(|hp| hp.current);
        (Some(outcome.damage), health)
    } else {
        events.push(GameEvent::targeted(
            caller.player,
            params.target_id,
            EventKind::AttackMissed {
                roll: outcome.attack_roll,
                fumble: outcome.fumble,
            },
        ));
        (None, None)
    };

    // the encounter may have ended with the target's defeat
    if let Some(encounter) = state.encounter.as_mut() {
        let advance = encounter.finish_action();
        events.extend(state.apply_turn_advance(advance, &mut rng));
    }
    engine.settle(&mut state, events);

    let message = if outcome.fumble {
        "a fumble!".to_string()
    } else if outcome.critical {
        format!("critical hit for {} damage", outcome.damage)
    } else if outcome.hit {
        format!("hit for {} damage", outcome.damage)
    } else {
        format!("missed (rolled {})", outcome.attack_roll)
    };
    to_value(AttackResult {
        success: outcome.hit,
        damage,
        target_health,
        message,
    })
}

/// World write lock. Forces the turn advance.
pub async fn end_turn(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let mut state = engine.game.write().await;
    let advance = {
        let encounter = state
            .encounter
            .as_mut()
            .ok_or_else(|| RpcError::from(&DomainError::NotInCombat))?;
        encounter
            .end_turn(caller.player)
            .map_err(|err| RpcError::from(&err))?
    };
    let events = state.apply_turn_advance(advance, &mut rand::thread_rng());
    engine.settle(&mut state, events);

    let (next_turn, round) = state
        .encounter
        .as_ref()
        .map(|encounter| {
            (
                encounter.current_participant().map(|p| p.entity),
                encounter.round,
            )
        })
        .unwrap_or((None, 0));
    to_value(EndTurnResult {
        success: true,
        next_turn,
        round,
    })
}

/// World write lock. Direct effect application (dev tooling and scripted
/// content).
pub async fn apply_effect(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: ApplyEffectParams,
) -> HandlerResult {
    if params.duration == 0 {
        return Err(RpcError::invalid_params("duration must be > 0"));
    }
    let kind = parse_effect_kind(&params.effect_type)?;

    let mut state = engine.game.write().await;
    let target = state
        .world
        .entity(params.target_id)
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Entity", params.target_id)))?;
    if target.health().is_none() {
        return Err(RpcError::from(&DomainError::invalid_target(
            "target cannot receive effects",
        )));
    }

    let effect: Effect = EffectTemplate::new(
        kind,
        params.magnitude,
        EffectDuration::Rounds(params.duration),
    )
    .instantiate(caller.player, params.target_id);
    let (effect_id, events) = state.apply_effect(effect);
    engine.settle(&mut state, events);

    to_value(ApplyEffectResult {
        success: true,
        effect_id,
    })
}

fn parse_effect_kind(raw: &str) -> Result<EffectKind, RpcError> {
    let kind = match raw.trim().to_lowercase().as_str() {
        "damage_over_time" | "dot" => EffectKind::DamageOverTime,
        "heal_over_time" | "hot" => EffectKind::HealOverTime,
        "stun" => EffectKind::Stun,
        "root" => EffectKind::Root,
        other if other.starts_with("stat_modifier") => {
            let attribute = parse_attribute(
                other.strip_prefix("stat_modifier:").unwrap_or("strength"),
            )?;
            EffectKind::StatModifier { attribute }
        }
        other if !other.is_empty() => EffectKind::Custom {
            name: other.to_string(),
        },
        _ => return Err(RpcError::invalid_params("effect_type is empty")),
    };
    Ok(kind)
}

fn parse_attribute(raw: &str) -> Result<grimbox_domain::Attribute, RpcError> {
    grimbox_domain::Attribute::all()
        .into_iter()
        .find(|attribute| attribute.as_str() == raw.trim())
        .ok_or_else(|| RpcError::invalid_params(format!("unknown attribute '{raw}'")))
}

fn attacker_profile(
    state: &GameState,
    attacker: EntityId,
    params: &AttackParams,
) -> Result<(AttackProfile, grimbox_domain::Position), RpcError> {
    let entity = state
        .world
        .entity(attacker)
        .ok_or_else(|| RpcError::session_invalid())?;
    match entity {
        Entity::Player(player) => {
            let character = &player.character;
            let weapon = match params.weapon_id {
                Some(weapon_id) => character
                    .equipment
                    .values()
                    .find(|item| item.id == weapon_id)
                    .or_else(|| character.inventory_item(weapon_id))
                    .ok_or_else(|| {
                        RpcError::from(&DomainError::not_found("Item", weapon_id))
                    })?,
                None => character.equipped_weapon().ok_or_else(|| {
                    RpcError::from(&DomainError::InsufficientResources(
                        "no weapon equipped".into(),
                    ))
                })?,
            };
            let damage = weapon
                .damage
                .ok_or_else(|| RpcError::from(&DomainError::invalid_target("item is not a weapon")))?;
            Ok((
                AttackProfile {
                    attack_bonus: character.attack_bonus(),
                    damage,
                    damage_bonus: character
                        .attributes
                        .modifier(grimbox_domain::Attribute::Strength),
                },
                player.position,
            ))
        }
        Entity::Npc(npc) => Ok((
            AttackProfile {
                attack_bonus: npc.attack_bonus(),
                damage: npc.damage,
                damage_bonus: 0,
            },
            npc.position,
        )),
        Entity::StaticObject(_) => Err(RpcError::from(&DomainError::invalid_target(
            "objects cannot attack",
        ))),
    }
}

fn defender_profile(
    state: &GameState,
    target: EntityId,
) -> Result<(DefenseProfile, grimbox_domain::Position, bool), RpcError> {
    let entity = state
        .world
        .entity(target)
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Entity", target)))?;
    match entity {
        Entity::Player(player) => Ok((
            DefenseProfile {
                armor_class: player.character.armor_class(),
                resistance: player.character.damage_resistance(),
            },
            player.position,
            entity.is_alive(),
        )),
        Entity::Npc(npc) => Ok((
            DefenseProfile {
                armor_class: npc.armor_class(),
                resistance: npc.damage_resistance(),
            },
            npc.position,
            entity.is_alive(),
        )),
        Entity::StaticObject(_) => Err(RpcError::from(&DomainError::invalid_target(
            "target cannot be attacked",
        ))),
    }
}
