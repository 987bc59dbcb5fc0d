//! Scenario tests that drive the engine through the dispatcher, the way
//! a headless client would, without a network in between.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use grimbox_domain::{Entity, EntityId, Position};
use grimbox_protocol::methods::{
    CreateCharacterResult, GetGameStateResult, JoinGameResult, MoveResult,
};
use grimbox_protocol::{RpcRequest, RpcResponse};

use crate::config::{AppConfig, PersistenceConfig};
use crate::rpc;
use crate::state::Engine;

fn test_config(data_dir: PathBuf, persistence: bool) -> AppConfig {
    AppConfig {
        server_port: 0,
        web_dir: PathBuf::from("./web"),
        data_dir,
        session_timeout: Duration::from_secs(300),
        log_level: "warn".into(),
        enable_dev_mode: true,
        persistence: PersistenceConfig {
            enabled: persistence,
            auto_save_interval: Duration::from_secs(3600),
        },
        request_timeout: Duration::from_secs(10),
        bootstrap_timeout: Duration::from_secs(60),
        shutdown_timeout: Duration::from_secs(30),
        shutdown_grace_period: Duration::from_millis(10),
    }
}

async fn test_engine() -> (Arc<Engine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new(test_config(dir.path().to_path_buf(), false))
        .await
        .expect("engine boots");
    (engine, dir)
}

async fn call(engine: &Arc<Engine>, method: &str, params: Value) -> RpcResponse {
    rpc::dispatch(engine, RpcRequest::new(method, params, 1)).await
}

fn result<T: serde::de::DeserializeOwned>(response: RpcResponse) -> T {
    let value = response
        .result
        .unwrap_or_else(|| panic!("rpc failed: {:?}", response.error));
    serde_json::from_value(value).expect("result decodes")
}

async fn join(engine: &Arc<Engine>, name: &str) -> JoinGameResult {
    result(call(engine, "joinGame", json!({ "player_name": name })).await)
}

async fn create_fighter(engine: &Arc<Engine>, session: &JoinGameResult, name: &str) -> CreateCharacterResult {
    result(
        call(
            engine,
            "createCharacter",
            json!({
                "session_id": session.session_id.to_string(),
                "name": name,
                "class": "fighter",
                "attribute_method": {
                    "method": "standard_array",
                    "order": ["strength", "constitution", "dexterity",
                              "wisdom", "intelligence", "charisma"]
                },
                "starting_equipment": true
            }),
        )
        .await,
    )
}

/// Teleport a player to an exact tile for scenario setup.
async fn teleport(engine: &Arc<Engine>, player: EntityId, to: Position) {
    let mut state = engine.game.write().await;
    state.world.move_entity(player, to).expect("teleport target free");
}

/// Three free tiles in a row on level 0, away from the walls.
async fn free_row(engine: &Arc<Engine>) -> Position {
    let state = engine.game.read().await;
    for y in 1..state.world.height as i32 - 1 {
        for x in 1..state.world.width as i32 - 3 {
            let row = [
                Position::new(x, y, 0),
                Position::new(x + 1, y, 0),
                Position::new(x + 2, y, 0),
            ];
            if row.iter().all(|p| {
                state.world.is_walkable(p) && state.world.blocking_occupant(p).is_none()
            }) {
                return row[0];
            }
        }
    }
    panic!("no free row in generated dungeon");
}

#[tokio::test]
async fn happy_path_session() {
    let (engine, _dir) = test_engine().await;

    let joined = join(&engine, "Aria").await;
    assert!(joined.success);

    let created = create_fighter(&engine, &joined, "Aria").await;
    assert!(created.success);
    assert_eq!(created.player_id, joined.player_id);

    let state: GetGameStateResult = result(
        call(
            &engine,
            "getGameState",
            json!({ "session_id": joined.session_id.to_string() }),
        )
        .await,
    );
    let player = state.player.expect("player fragment present");
    assert_eq!(player.id, joined.player_id);
    assert_eq!(player.character.name, "Aria");
    assert_eq!(player.character.level, 1);
    assert_eq!(player.character.hp.current, player.character.hp.max);
    assert_eq!(player.position, engine.entry);
    assert!(state.combat.is_none());
}

#[tokio::test]
async fn invalid_session_and_method_errors() {
    let (engine, _dir) = test_engine().await;

    let response = call(
        &engine,
        "getGameState",
        json!({ "session_id": uuid::Uuid::new_v4().to_string() }),
    )
    .await;
    assert_eq!(
        response.error.expect("session error").code,
        grimbox_protocol::rpc::SESSION_INVALID
    );

    let joined = join(&engine, "Aria").await;
    let response = call(
        &engine,
        "castFireballAtEveryone",
        json!({ "session_id": joined.session_id.to_string() }),
    )
    .await;
    assert_eq!(
        response.error.expect("method error").code,
        grimbox_protocol::rpc::METHOD_NOT_FOUND
    );
}

#[tokio::test]
async fn movement_collision_leaves_both_in_place() {
    let (engine, _dir) = test_engine().await;

    let first = join(&engine, "Aria").await;
    let second = join(&engine, "Borin").await;
    create_fighter(&engine, &first, "Aria").await;
    create_fighter(&engine, &second, "Borin").await;

    // A . C in a free row; Aria steps east into the middle, Borin's step
    // west then collides with her
    let row_start = free_row(&engine).await;
    teleport(&engine, first.player_id, row_start).await;
    teleport(
        &engine,
        second.player_id,
        Position::new(row_start.x + 2, row_start.y, 0),
    )
    .await;

    let moved: MoveResult = result(
        call(
            &engine,
            "move",
            json!({ "session_id": first.session_id.to_string(), "direction": "east" }),
        )
        .await,
    );
    assert!(moved.success);
    let middle = Position::new(row_start.x + 1, row_start.y, 0);
    assert_eq!(moved.new_position.map(|p| (p.x, p.y)), Some((middle.x, middle.y)));

    let blocked: MoveResult = result(
        call(
            &engine,
            "move",
            json!({ "session_id": second.session_id.to_string(), "direction": "west" }),
        )
        .await,
    );
    assert!(!blocked.success);
    assert!(
        blocked.message.as_deref().unwrap_or("").contains("occupied"),
        "message should mention occupation: {:?}",
        blocked.message
    );

    // neither position changed
    let state = engine.game.read().await;
    let aria = state.world.entity(first.player_id).expect("aria").position();
    let borin = state.world.entity(second.player_id).expect("borin").position();
    assert!(aria.same_tile(&middle));
    assert_eq!((borin.x, borin.y), (row_start.x + 2, row_start.y));
}

#[tokio::test]
async fn combat_rounds_tick_effects_and_keep_order() {
    let (engine, _dir) = test_engine().await;
    let joined = join(&engine, "Aria").await;
    create_fighter(&engine, &joined, "Aria").await;
    let session = joined.session_id.to_string();

    // two goblins well away from the player so they pass their turns
    let (goblin_a, goblin_b) = {
        let mut state = engine.game.write().await;
        let row = {
            let mut found = None;
            'scan: for y in 1..state.world.height as i32 - 1 {
                for x in 1..state.world.width as i32 - 2 {
                    let a = Position::new(x, y, 0);
                    let b = Position::new(x + 1, y, 0);
                    let player_pos = state
                        .world
                        .entity(joined.player_id)
                        .expect("player")
                        .position();
                    if player_pos.chebyshev_distance(&a) > 4
                        && [a, b].iter().all(|p| {
                            state.world.is_walkable(p)
                                && state.world.blocking_occupant(p).is_none()
                        })
                    {
                        found = Some((a, b));
                        break 'scan;
                    }
                }
            }
            found.expect("free pair away from player")
        };
        let a = state
            .world
            .place_entity(Entity::npc(
                "goblin",
                "Goblin A",
                row.0,
                1,
                Default::default(),
                true,
            ))
            .expect("places");
        let b = state
            .world
            .place_entity(Entity::npc(
                "goblin",
                "Goblin B",
                row.1,
                1,
                Default::default(),
                true,
            ))
            .expect("places");
        (a, b)
    };

    let started = call(
        &engine,
        "startCombat",
        json!({
            "session_id": session,
            "participant_ids": [goblin_a.to_string(), goblin_b.to_string()]
        }),
    )
    .await;
    let combat: grimbox_protocol::methods::StartCombatResult = result(started);
    let order = combat.combat.order.clone();
    assert_eq!(order.len(), 3);

    // after start, NPC turns auto-resolve until the player is up
    {
        let state = engine.game.read().await;
        let encounter = state.encounter.as_ref().expect("in combat");
        assert_eq!(
            encounter.current_participant().expect("current").entity,
            joined.player_id
        );
    }

    // a 2-round DoT on goblin A, applied during round 1
    let effect: grimbox_protocol::methods::ApplyEffectResult = result(
        call(
            &engine,
            "applyEffect",
            json!({
                "session_id": session,
                "effect_type": "damage_over_time",
                "target_id": goblin_a.to_string(),
                "magnitude": 1,
                "duration": 2
            }),
        )
        .await,
    );
    assert!(effect.success);

    let hp_before = {
        let state = engine.game.read().await;
        state
            .world
            .entity(goblin_a)
            .and_then(Entity::health)
            .expect("goblin hp")
            .current
    };

    // round 1 -> round 2
    let end: grimbox_protocol::methods::EndTurnResult = result(
        call(&engine, "endTurn", json!({ "session_id": session })).await,
    );
    assert!(end.success);
    assert_eq!(end.round, 2);
    assert_eq!(end.next_turn, Some(joined.player_id));

    {
        let state = engine.game.read().await;
        let encounter = state.encounter.as_ref().expect("still in combat");
        assert_eq!(encounter.turn_order(), order, "order is stable across rounds");
        // one tick so far
        assert_eq!(state.effects.active_on(goblin_a).len(), 1);
    }

    // round 2 -> round 3: second tick, then expiry
    let end: grimbox_protocol::methods::EndTurnResult = result(
        call(&engine, "endTurn", json!({ "session_id": session })).await,
    );
    assert_eq!(end.round, 3);

    let state = engine.game.read().await;
    assert!(state.effects.active_on(goblin_a).is_empty(), "DoT expired");
    let hp_after = state
        .world
        .entity(goblin_a)
        .and_then(Entity::health)
        .expect("goblin hp")
        .current;
    assert_eq!(hp_before - hp_after, 2, "one point per round tick");
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf(), true);

    let (player_id, session_count) = {
        let engine = Engine::new(config.clone()).await.expect("boots");
        let joined = join(&engine, "Aria").await;
        create_fighter(&engine, &joined, "Aria").await;
        engine.save().await.expect("saves");
        (joined.player_id, engine.sessions.len())
    };
    assert_eq!(session_count, 1);

    let engine = Engine::new(config).await.expect("boots from snapshot");
    let state = engine.game.read().await;
    let player = state
        .world
        .entity(player_id)
        .and_then(Entity::as_player)
        .expect("player restored");
    assert_eq!(player.character.name, "Aria");
    assert_eq!(player.character.level, 1);
    // still-live session was rebound
    assert_eq!(engine.sessions.len(), 1);
}

#[tokio::test]
async fn leave_game_restores_cardinality() {
    let (engine, _dir) = test_engine().await;
    let before_sessions = engine.sessions.len();
    let before_entities = engine.game.read().await.world.entity_count();

    let joined = join(&engine, "Aria").await;
    assert_eq!(engine.sessions.len(), before_sessions + 1);

    let left: grimbox_protocol::methods::LeaveGameResult = result(
        call(
            &engine,
            "leaveGame",
            json!({ "session_id": joined.session_id.to_string() }),
        )
        .await,
    );
    assert!(left.success);
    assert_eq!(engine.sessions.len(), before_sessions);
    assert_eq!(
        engine.game.read().await.world.entity_count(),
        before_entities
    );
}

#[tokio::test]
async fn spell_catalogue_queries() {
    let (engine, _dir) = test_engine().await;
    let joined = join(&engine, "Zara").await;
    let session = joined.session_id.to_string();

    let all: grimbox_protocol::methods::SpellListResult = result(
        call(&engine, "getAllSpells", json!({ "session_id": session })).await,
    );
    assert!(all.count >= 8);

    let found: grimbox_protocol::methods::SpellListResult = result(
        call(
            &engine,
            "searchSpells",
            json!({ "session_id": session, "query": "fireball" }),
        )
        .await,
    );
    assert_eq!(found.count, 1);

    let level_one: grimbox_protocol::methods::SpellListResult = result(
        call(
            &engine,
            "getSpellsByLevel",
            json!({ "session_id": session, "level": 1 }),
        )
        .await,
    );
    assert!(level_one.spells.iter().all(|spell| spell.level == 1));
}

#[tokio::test]
async fn generated_quest_progresses_on_kills() {
    let (engine, _dir) = test_engine().await;
    let joined = join(&engine, "Aria").await;
    create_fighter(&engine, &joined, "Aria").await;
    let session = joined.session_id.to_string();

    // guarantee at least one hostile template in the world
    {
        let mut state = engine.game.write().await;
        let spot = crate::state::find_free_tile_near(&state, engine.entry)
            .expect("free tile");
        let _ = state.world.place_entity(Entity::npc(
            "goblin",
            "Quest Fodder",
            spot,
            1,
            Default::default(),
            true,
        ));
    }

    // generate until a kill quest appears (the world has hostiles, so
    // the taxonomy includes them)
    let mut kill_quest = None;
    for _ in 0..12 {
        let quest: grimbox_protocol::methods::QuestResult = result(
            call(&engine, "startQuest", json!({ "session_id": session })).await,
        );
        let is_kill = quest.quest.objectives.iter().any(|objective| {
            matches!(
                objective.kind,
                grimbox_domain::ObjectiveKind::Kill { .. }
            )
        });
        if is_kill {
            kill_quest = Some(quest.quest);
            break;
        }
    }
    let quest = kill_quest.expect("a kill quest within a dozen draws");

    let active: grimbox_protocol::methods::QuestListResult = result(
        call(&engine, "getActiveQuests", json!({ "session_id": session })).await,
    );
    assert!(active.quests.iter().any(|q| q.id == quest.id));

    // defeat one matching hostile directly through the game state
    let template = quest
        .objectives
        .iter()
        .find_map(|objective| match &objective.kind {
            grimbox_domain::ObjectiveKind::Kill { template } => Some(template.clone()),
            _ => None,
        })
        .expect("kill objective");
    {
        let mut state = engine.game.write().await;
        let victim = state
            .world
            .entities_where(|entity| {
                entity.template() == template && entity.is_alive()
            })
            .next()
            .expect("a live target")
            .id();
        let events = state.apply_damage(
            Some(joined.player_id),
            victim,
            i32::MAX,
            &mut rand::thread_rng(),
        );
        engine.settle(&mut state, events);
    }

    let refreshed: grimbox_protocol::methods::QuestResult = result(
        call(
            &engine,
            "getQuest",
            json!({ "session_id": session, "quest_id": quest.id.to_string() }),
        )
        .await,
    );
    let progressed = refreshed
        .quest
        .objectives
        .iter()
        .any(|objective| objective.progress > 0);
    assert!(progressed, "kill should advance the quest objective");
}
