//! Spell and item use validation.
//!
//! Pure checks over the world, the effect engine, and the caster's
//! resources; on success the caller decrements resources and applies the
//! produced effects under the world write lock. Failure modes:
//! not-in-range, no-line-of-sight, insufficient-resources,
//! invalid-target, already-affected.

use serde::{Deserialize, Serialize};

use crate::effects::{EffectEngine, StackRule};
use crate::error::DomainError;
use crate::ids::EntityId;
use crate::items::Item;
use crate::position::Position;
use crate::spells::{AoeShape, Spell};
use crate::world::World;

/// What a cast is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastTarget {
    Entity(EntityId),
    Position(Position),
}

/// Validate a cast and resolve the concrete set of affected entities.
///
/// Checks, in order: caster state (alive, not stunned), spell knowledge
/// and slot availability, target validity, range, and line of sight.
/// Area spells centred on a position need no living target but still
/// need range and sight to the centre tile.
pub fn validate_cast(
    world: &World,
    effects: &EffectEngine,
    caster_id: EntityId,
    spell: &Spell,
    target: CastTarget,
) -> Result<Vec<EntityId>, DomainError> {
    let caster = world
        .entity(caster_id)
        .ok_or_else(|| DomainError::not_found("Entity", caster_id))?;
    if !caster.is_alive() {
        return Err(DomainError::invalid_target("caster is defeated"));
    }
    if effects.is_stunned(caster_id) {
        return Err(DomainError::constraint("caster is stunned"));
    }

    let player = caster
        .as_player()
        .ok_or_else(|| DomainError::invalid_target("only characters cast spells"))?;
    if !player.character.knows_spell(spell.id) {
        return Err(DomainError::InsufficientResources(format!(
            "spell {} is not known",
            spell.name
        )));
    }
    if player.character.spell_slots.available(spell.level) == 0 {
        return Err(DomainError::InsufficientResources(format!(
            "no level-{} spell slots remaining",
            spell.level
        )));
    }

    let caster_pos = caster.position();
    let center = match target {
        CastTarget::Entity(target_id) => {
            let entity = world
                .entity(target_id)
                .ok_or_else(|| DomainError::not_found("Entity", target_id))?;
            if entity.health().is_none() {
                return Err(DomainError::invalid_target(
                    "target cannot receive effects",
                ));
            }
            entity.position()
        }
        CastTarget::Position(position) => {
            if !world.in_bounds(&position) {
                return Err(DomainError::OutOfBounds(position));
            }
            position
        }
    };

    if spell.aoe == AoeShape::OnSelf {
        return Ok(vec![caster_id]);
    }

    check_range_and_sight(world, &caster_pos, &center, spell.range)?;

    let targets = match (target, spell.aoe) {
        (CastTarget::Entity(target_id), AoeShape::SingleTarget) => {
            check_already_affected(effects, caster_id, spell, target_id)?;
            vec![target_id]
        }
        (_, AoeShape::Circle { radius }) => {
            let mut hit: Vec<EntityId> = world
                .spatial()
                .radius_query(center, radius)
                .into_iter()
                .filter(|id| {
                    world
                        .entity(*id)
                        .map(|entity| entity.health().is_some())
                        .unwrap_or(false)
                })
                .collect();
            hit.sort_unstable();
            hit
        }
        (_, AoeShape::Cone { length } | AoeShape::Line { length }) => {
            // cones and lines resolve as entities along the sight line
            let mut hit: Vec<EntityId> = world
                .spatial()
                .radius_query(caster_pos, length)
                .into_iter()
                .filter(|id| {
                    *id != caster_id
                        && world
                            .entity(*id)
                            .map(|entity| {
                                entity.health().is_some()
                                    && world.line_of_sight(&caster_pos, &entity.position())
                            })
                            .unwrap_or(false)
                })
                .collect();
            hit.sort_unstable();
            hit
        }
        (CastTarget::Position(_), AoeShape::SingleTarget) => {
            return Err(DomainError::invalid_target(
                "spell needs an entity target",
            ));
        }
        (_, AoeShape::OnSelf) => vec![caster_id],
    };

    if targets.is_empty() {
        return Err(DomainError::invalid_target("no valid targets in area"));
    }
    Ok(targets)
}

/// Validate using a consumable or targeted item from the inventory.
pub fn validate_item_use(
    world: &World,
    effects: &EffectEngine,
    user_id: EntityId,
    item: &Item,
    target_id: EntityId,
) -> Result<(), DomainError> {
    let user = world
        .entity(user_id)
        .ok_or_else(|| DomainError::not_found("Entity", user_id))?;
    if !user.is_alive() {
        return Err(DomainError::invalid_target("user is defeated"));
    }
    if effects.is_stunned(user_id) {
        return Err(DomainError::constraint("user is stunned"));
    }
    if item.on_use.is_none() {
        return Err(DomainError::validation(format!(
            "{} has no use effect",
            item.name
        )));
    }

    let target = world
        .entity(target_id)
        .ok_or_else(|| DomainError::not_found("Entity", target_id))?;
    if target.health().is_none() {
        return Err(DomainError::invalid_target(
            "target cannot receive effects",
        ));
    }

    // items work at touch range: same tile or adjacent
    let distance = user.position().chebyshev_distance(&target.position());
    if distance > 1 {
        return Err(DomainError::NotInRange {
            distance,
            max: 1,
        });
    }
    Ok(())
}

fn check_range_and_sight(
    world: &World,
    from: &Position,
    to: &Position,
    range: u32,
) -> Result<(), DomainError> {
    let range_sq = (range as u64) * (range as u64);
    let distance_sq = from.distance_squared(to);
    if distance_sq > range_sq {
        // report the rounded-down distance for the error message
        let distance = (distance_sq as f64).sqrt() as u32;
        return Err(DomainError::NotInRange {
            distance,
            max: range,
        });
    }
    if !world.line_of_sight(from, to) {
        return Err(DomainError::NoLineOfSight);
    }
    Ok(())
}

/// A refresh-stacked effect that could not extend the existing instance
/// would be a no-op; reject the cast instead of silently wasting the slot.
fn check_already_affected(
    effects: &EffectEngine,
    caster_id: EntityId,
    spell: &Spell,
    target_id: EntityId,
) -> Result<(), DomainError> {
    let rule = spell
        .effect
        .stack_rule
        .unwrap_or_else(|| spell.effect.kind.default_stack_rule());
    if rule != StackRule::Refresh {
        return Ok(());
    }
    let duplicate = effects.active_on(target_id).iter().any(|active| {
        active.kind == spell.effect.kind
            && active.source == caster_id
            && active.remaining.remaining_units() >= spell.effect.duration.remaining_units()
    });
    if duplicate {
        return Err(DomainError::AlreadyAffected);
    }
    Ok(())
}
