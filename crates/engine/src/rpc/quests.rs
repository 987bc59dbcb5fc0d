//! Quest handlers: starting (including server-side generation),
//! progression, and the quest log queries.

use std::sync::Arc;

use grimbox_domain::{DomainError, Entity, Quest, QuestId};
use grimbox_protocol::methods::{
    QuestIdParams, QuestListResult, QuestResult, StartQuestParams, UpdateObjectiveParams,
};
use grimbox_protocol::RpcError;

use super::{to_value, HandlerResult};
use crate::session::Session;
use crate::state::Engine;

/// World write lock. Without a `quest_id` the server generates a quest
/// fitting the current world and the caller's level.
pub async fn start_quest(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: StartQuestParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;

    if let Some(quest_id) = params.quest_id {
        // quests are generated server-side and started immediately, so a
        // caller-supplied id can only name something unknown
        return Err(RpcError::from(&DomainError::not_found("Quest", quest_id)));
    }

    let player_level = state
        .world
        .entity(caller.player)
        .and_then(Entity::as_player)
        .map(|player| player.character.level)
        .ok_or_else(RpcError::session_invalid)?;

    let quest = engine
        .generate_quest(&state, caller.player, player_level)
        .map_err(|err| RpcError::internal(err.to_string()))?;
    let quest_id = quest.id;

    let events = state
        .quests
        .start(quest)
        .map_err(|err| RpcError::from(&err))?;
    engine.settle(&mut state, events);

    let quest = state
        .quests
        .get(quest_id)
        .cloned()
        .ok_or_else(|| RpcError::internal("quest vanished after start"))?;
    to_value(QuestResult {
        success: true,
        quest,
    })
}

/// World write lock. Force-completes an active quest and grants rewards.
pub async fn complete_quest(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: QuestIdParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;
    owned_quest(&state, caller, params.quest_id)?;

    let events = state
        .quests
        .complete(params.quest_id)
        .map_err(|err| RpcError::from(&err))?;
    // settle grants completion rewards via the quest tracker pass
    engine.settle(&mut state, events);

    quest_response(&state, params.quest_id)
}

/// World write lock.
pub async fn update_objective(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: UpdateObjectiveParams,
) -> HandlerResult {
    if params.delta == 0 {
        return Err(RpcError::invalid_params("delta must be > 0"));
    }
    let mut state = engine.game.write().await;
    owned_quest(&state, caller, params.quest_id)?;

    let events = state
        .quests
        .update_objective(params.quest_id, params.objective_index, params.delta)
        .map_err(|err| RpcError::from(&err))?;
    engine.settle(&mut state, events);

    quest_response(&state, params.quest_id)
}

/// World write lock. Terminal.
pub async fn fail_quest(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: QuestIdParams,
) -> HandlerResult {
    let mut state = engine.game.write().await;
    owned_quest(&state, caller, params.quest_id)?;

    let events = state
        .quests
        .fail(params.quest_id)
        .map_err(|err| RpcError::from(&err))?;
    engine.settle(&mut state, events);

    quest_response(&state, params.quest_id)
}

/// World read lock.
pub async fn get_quest(
    engine: &Arc<Engine>,
    caller: &Arc<Session>,
    params: QuestIdParams,
) -> HandlerResult {
    let state = engine.game.read().await;
    owned_quest(&state, caller, params.quest_id)?;
    quest_response(&state, params.quest_id)
}

/// World read lock.
pub async fn get_active_quests(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let state = engine.game.read().await;
    quest_list(state.quests.active(caller.player))
}

/// World read lock.
pub async fn get_completed_quests(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let state = engine.game.read().await;
    quest_list(state.quests.completed(caller.player))
}

/// World read lock.
pub async fn get_quest_log(engine: &Arc<Engine>, caller: &Arc<Session>) -> HandlerResult {
    let state = engine.game.read().await;
    quest_list(state.quests.log(caller.player))
}

/// Ownership gate: players only touch their own quests.
fn owned_quest(
    state: &crate::game::GameState,
    caller: &Arc<Session>,
    quest_id: QuestId,
) -> Result<(), RpcError> {
    let quest = state
        .quests
        .get(quest_id)
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Quest", quest_id)))?;
    if quest.owner != caller.player {
        return Err(RpcError::from(&DomainError::constraint(
            "quest belongs to another player",
        )));
    }
    Ok(())
}

fn quest_response(state: &crate::game::GameState, quest_id: QuestId) -> HandlerResult {
    let quest = state
        .quests
        .get(quest_id)
        .cloned()
        .ok_or_else(|| RpcError::from(&DomainError::not_found("Quest", quest_id)))?;
    to_value(QuestResult {
        success: true,
        quest,
    })
}

fn quest_list(quests: Vec<&Quest>) -> HandlerResult {
    let quests: Vec<Quest> = quests.into_iter().cloned().collect();
    let count = quests.len();
    to_value(QuestListResult {
        success: true,
        quests,
        count,
    })
}
