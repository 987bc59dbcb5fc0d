//! Movement and spatial query handlers.

use std::sync::Arc;

use grimbox_domain::{
    DomainError, Entity, EventKind, Facing, GameEvent, Position,
};
use grimbox_protocol::methods::{
    GetNearestObjectsParams, GetObjectsInRadiusParams, GetObjectsInRangeParams, MoveParams,
    MoveResult, ObjectSummary, ObjectsResult,
};
use grimbox_protocol::RpcError;

use super::{to_value, HandlerResult};
use crate::session::Session;
use crate::state::Engine;

/// World write lock. Collisions report `success=false` with a message
/// rather than a JSON-RPC error; the world is unchanged either way.
pub async fn do_move(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: MoveParams,
) -> HandlerResult {
    let direction: Facing = params
        .direction
        .parse()
        .map_err(|err: DomainError| RpcError::invalid_params(err.to_string()))?;

    let mut state = engine.game.write().await;

    let mover = state
        .world
        .entity(caller.player)
        .ok_or_else(RpcError::session_invalid)?;
    if !mover.is_alive() {
        return to_value(MoveResult {
            success: false,
            new_position: None,
            message: Some("you are in no state to move".into()),
        });
    }
    if state.effects.is_rooted(caller.player) || state.effects.is_stunned(caller.player) {
        return to_value(MoveResult {
            success: false,
            new_position: None,
            message: Some("you cannot move right now".into()),
        });
    }

    let from = mover.position();
    let to = from.step(direction);

    // in combat, moving is an action on your turn
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

    let moved = state.world.move_entity(caller.player, to);

    let mut events = Vec::new();
    let result = match moved {
        Ok(()) => {
            events.push(GameEvent::from_source(
                caller.player,
                EventKind::EntityMoved { from, to },
            ));
            events.push(GameEvent::from_source(
                caller.player,
                EventKind::LocationReached { position: to },
            ));
            MoveResult {
                success: true,
                new_position: Some(to),
                message: None,
            }
        }
        Err(err @ (DomainError::Blocked(..) | DomainError::OutOfBounds(_))) => MoveResult {
            success: false,
            new_position: None,
            message: Some(err.to_string()),
        },
        Err(err) => return Err(RpcError::from(&err)),
    };

    if in_combat {
        if let Some(encounter) = state.encounter.as_mut() {
            let advance = encounter.finish_action();
            events.extend(state.apply_turn_advance(advance, &mut rand::thread_rng()));
        }
    }
    engine.settle(&mut state, events);
    to_value(result)
}

/// World read lock.
pub async fn objects_in_range(
    engine: &Arc<Engine>,
    params: GetObjectsInRangeParams,
) -> HandlerResult {
    let state = engine.game.read().await;
    let ids = state.world.spatial().range_query(
        params.level,
        params.min_x,
        params.min_y,
        params.max_x,
        params.max_y,
    );
    to_value(summarize(&state.world, ids))
}

/// World read lock.
pub async fn objects_in_radius(
    engine: &Arc<Engine>,
    params: GetObjectsInRadiusParams,
) -> HandlerResult {
    let state = engine.game.read().await;
    let center = Position::new(params.x, params.y, params.level);
    let ids = state.world.spatial().radius_query(center, params.radius);
    to_value(summarize(&state.world, ids))
}

/// World read lock.
pub async fn nearest_objects(
    engine: &Arc<Engine>,
    params: GetNearestObjectsParams,
) -> HandlerResult {
    if params.count == 0 || params.count > 256 {
        return Err(RpcError::invalid_params("count must be in 1..=256"));
    }
    let state = engine.game.read().await;
    let center = Position::new(params.x, params.y, params.level);
    let ids = state.world.spatial().k_nearest(center, params.count);
    to_value(summarize(&state.world, ids))
}

fn summarize(world: &grimbox_domain::World, ids: Vec<grimbox_domain::EntityId>) -> ObjectsResult {
    let objects: Vec<ObjectSummary> = ids
        .into_iter()
        .filter_map(|id| world.entity(id))
        .map(|entity| ObjectSummary {
            id: entity.id(),
            name: entity.name().to_string(),
            kind: match entity {
                Entity::Player(_) => "player".to_string(),
                Entity::Npc(_) => "npc".to_string(),
                Entity::StaticObject(_) => "static_object".to_string(),
            },
            position: entity.position(),
        })
        .collect();
    let count = objects.len();
    ObjectsResult {
        success: true,
        objects,
        count,
    }
}
