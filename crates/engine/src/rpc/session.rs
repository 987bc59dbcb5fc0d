//! Session and character handlers: joinGame, leaveGame, getGameState,
//! createCharacter.

use std::sync::Arc;

use chrono::Utc;

use grimbox_domain::{
    Character, Entity, EventKind, GameEvent, Position,
};
use grimbox_protocol::methods::{
    CombatFragment, CreateCharacterParams, CreateCharacterResult, GetGameStateResult,
    JoinGameParams, JoinGameResult, LeaveGameResult, PlayerFragment, WorldFragment,
};
use grimbox_protocol::RpcError;

use super::{to_value, HandlerResult};
use crate::game::GameState;
use crate::session::Session;
use crate::state::Engine;

/// World write lock. Creates the player entity and the session.
pub async fn join_game(engine: &Arc<Engine>, params: JoinGameParams) -> HandlerResult {
    let name = params.player_name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(RpcError::invalid_params(
            "player_name must be 1..=64 characters",
        ));
    }

    let mut state = engine.game.write().await;
    let player_id = engine
        .spawn_player(&mut state, name)
        .map_err(|err| RpcError::from(&err))?;
    let session = engine.sessions.create(player_id);

    let spawn = state
        .world
        .entity(player_id)
        .map(Entity::position)
        .unwrap_or(engine.entry);
    let events = vec![
        GameEvent::from_source(
            player_id,
            EventKind::EntitySpawned {
                position: spawn,
                name: name.to_string(),
            },
        ),
        GameEvent::new(EventKind::SessionStarted {
            session: session.id,
        }),
    ];
    engine.settle(&mut state, events);

    tracing::info!(player = %player_id, session = %session.id, name, "player joined");
    to_value(JoinGameResult {
        session_id: session.id,
        player_id,
        success: true,
    })
}

/// World write lock (entity removal).
pub async fn leave_game(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    engine.end_session(caller, "player left").await;
    to_value(LeaveGameResult { success: true })
}

/// World read lock.
pub async fn get_game_state(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let state = engine.game.read().await;
    to_value(GetGameStateResult {
        player: player_fragment(&state, caller.player),
        world: world_fragment(&state),
        combat: combat_fragment(&state),
        timestamp: Utc::now(),
    })
}

/// World write lock. Replaces the provisional character created at join
/// with the requested one.
pub async fn create_character(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: CreateCharacterParams,
) -> HandlerResult {
    let name = params.name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(RpcError::invalid_params("name must be 1..=64 characters"));
    }

    let attributes = {
        let mut rng = rand::thread_rng();
        params
            .attribute_method
            .generate(&mut rng)
            .map_err(|err| RpcError::from(&err))?
    };

    let mut character = Character::new(name, params.class, attributes);
    // every prepared spell the class can cast at level 1
    if let Some(max_level) = params.class.max_spell_level(1) {
        for spell in engine.spells.all() {
            if spell.level <= max_level {
                character.known_spells.push(spell.id);
            }
        }
    }

    let mut events = Vec::new();
    if params.starting_equipment {
        for item in crate::bootstrap::starting_equipment(params.class) {
            events.push(GameEvent::on_target(
                caller.player,
                EventKind::ItemAcquired {
                    item: item.id,
                    template: item.template.clone(),
                },
            ));
            character.inventory.push(item);
        }
    }

    let mut state = engine.game.write().await;
    let player = state
        .world
        .entity_mut(caller.player)
        .and_then(Entity::as_player_mut)
        .ok_or_else(|| RpcError::session_invalid())?;
    player.character = character.clone();

    events.insert(
        0,
        GameEvent::from_source(
            caller.player,
            EventKind::CharacterCreated {
                class: params.class,
                level: 1,
            },
        ),
    );
    engine.settle(&mut state, events);

    to_value(CreateCharacterResult {
        session_id: caller.id,
        player_id: caller.player,
        character,
        success: true,
    })
}

// ---------------------------------------------------------------------------
// Fragment builders shared with the WebSocket layer
// ---------------------------------------------------------------------------

pub fn player_fragment(state: &GameState, player: grimbox_domain::EntityId) -> Option<PlayerFragment> {
    state
        .world
        .entity(player)
        .and_then(Entity::as_player)
        .map(|entity| PlayerFragment {
            id: entity.id,
            position: entity.position,
            character: entity.character.clone(),
        })
}

pub fn world_fragment(state: &GameState) -> WorldFragment {
    WorldFragment {
        width: state.world.width,
        height: state.world.height,
        levels: state.world.level_count(),
        turn: state.world.turn,
        entity_count: state.world.entity_count(),
    }
}

pub fn combat_fragment(state: &GameState) -> Option<CombatFragment> {
    state.encounter.as_ref().map(|encounter| CombatFragment {
        encounter: encounter.id,
        phase: encounter.phase,
        round: encounter.round,
        active: encounter.current_participant().map(|p| p.entity),
        order: encounter.turn_order(),
    })
}

/// Spawn position helper for tests.
#[allow(dead_code)]
pub fn spawn_of(state: &GameState, player: grimbox_domain::EntityId) -> Option<Position> {
    state.world.entity(player).map(Entity::position)
}
