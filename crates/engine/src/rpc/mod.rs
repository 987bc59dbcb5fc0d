//! The JSON-RPC dispatcher.
//!
//! Dispatch steps: validate the envelope, authenticate the session
//! (every method except `joinGame`), decode the method's typed parameter
//! struct, run the handler under the per-request deadline, and map the
//! outcome onto the JSON-RPC result/error shape. Each handler acquires
//! the world read or write lock itself; the dispatcher never holds it.

mod combat;
mod magic;
mod quests;
mod session;
mod world;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use grimbox_domain::SessionId;
use grimbox_protocol::rpc::{self, RpcError, RpcRequest, RpcResponse};

use crate::session::{Session, SessionError};
use crate::state::Engine;

/// Outcome of a handler: a JSON result or a typed error.
pub type HandlerResult = Result<Value, RpcError>;

/// Dispatch one request to its handler.
pub async fn dispatch(engine: &Arc<Engine>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone().unwrap_or(Value::Null);
    if !request.is_valid_version() {
        return RpcResponse::failure(
            id,
            RpcError::new(rpc::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    let method = request.method.as_str();
    tracing::debug!(method, "rpc dispatch");

    let outcome = tokio::time::timeout(
        engine.config.request_timeout,
        route(engine, method, &request.params),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => RpcResponse::success(id, result),
        Ok(Err(error)) => RpcResponse::failure(id, error),
        Err(_) => RpcResponse::failure(
            id,
            RpcError::new(rpc::REQUEST_TIMEOUT, "request deadline exceeded"),
        ),
    }
}

async fn route(engine: &Arc<Engine>, method: &str, params: &Value) -> HandlerResult {
    // the one method that creates a session rather than requiring one
    if method == "joinGame" {
        return session::join_game(engine, decode(params)?).await;
    }

    let caller = authenticate(engine, params)?;
    match method {
        "leaveGame" => session::leave_game(engine, &caller).await,
        "getGameState" => session::get_game_state(engine, &caller).await,
        "createCharacter" => {
            session::create_character(engine, &caller, decode(params)?).await
        }

        "move" => world::do_move(engine, &caller, decode(params)?).await,
        "getObjectsInRange" => world::objects_in_range(engine, decode(params)?).await,
        "getObjectsInRadius" => world::objects_in_radius(engine, decode(params)?).await,
        "getNearestObjects" => world::nearest_objects(engine, decode(params)?).await,

        "startCombat" => combat::start_combat(engine, &caller, decode(params)?).await,
        "attack" => combat::attack(engine, &caller, decode(params)?).await,
        "endTurn" => combat::end_turn(engine, &caller).await,
        "applyEffect" => combat::apply_effect(engine, &caller, decode(params)?).await,

        "castSpell" => magic::cast_spell(engine, &caller, decode(params)?).await,
        "useItem" => magic::use_item(engine, &caller, decode(params)?).await,
        "equipItem" => magic::equip_item(engine, &caller, decode(params)?).await,
        "unequipItem" => magic::unequip_item(engine, &caller, decode(params)?).await,
        "getEquipment" => magic::get_equipment(engine, &caller).await,
        "getSpell" => magic::get_spell(engine, decode(params)?),
        "getSpellsByLevel" => magic::spells_by_level(engine, decode(params)?),
        "getSpellsBySchool" => magic::spells_by_school(engine, decode(params)?),
        "getAllSpells" => magic::all_spells(engine),
        "searchSpells" => magic::search_spells(engine, decode(params)?),

        "startQuest" => quests::start_quest(engine, &caller, decode(params)?).await,
        "completeQuest" => quests::complete_quest(engine, &caller, decode(params)?).await,
        "updateObjective" => quests::update_objective(engine, &caller, decode(params)?).await,
        "failQuest" => quests::fail_quest(engine, &caller, decode(params)?).await,
        "getQuest" => quests::get_quest(engine, &caller, decode(params)?).await,
        "getActiveQuests" => quests::get_active_quests(engine, &caller).await,
        "getCompletedQuests" => quests::get_completed_quests(engine, &caller).await,
        "getQuestLog" => quests::get_quest_log(engine, &caller).await,

        other => Err(RpcError::method_not_found(other)),
    }
}

/// Pull `session_id` out of the params and authenticate it, refreshing
/// the TTL on success.
fn authenticate(engine: &Engine, params: &Value) -> Result<Arc<Session>, RpcError> {
    let raw = params
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("missing session_id"))?;
    let session_id: SessionId = raw
        .parse()
        .map_err(|_| RpcError::invalid_params("session_id is not a UUID"))?;
    engine.sessions.authenticate(session_id).map_err(|err| match err {
        SessionError::NotFound => RpcError::session_invalid(),
        SessionError::Expired => RpcError::session_expired(),
    })
}

/// Decode the method's typed parameter struct; unknown fields (such as
/// the shared `session_id`) are ignored.
fn decode<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    serde_json::from_value(params.clone())
        .map_err(|err| RpcError::invalid_params(err.to_string()))
}

/// Serialize a handler result struct.
fn to_value<T: serde::Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|err| RpcError::internal(err.to_string()))
}
