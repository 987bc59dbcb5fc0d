//! The engine value: all shared state, constructed once at startup and
//! passed explicitly to every handler. No process-wide singletons.
//!
//! Lock order is `world -> session`, never the reverse. The event bus
//! and the session registry carry their own internal locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::sync::{watch, RwLock};

use grimbox_domain::pcg::{self, GenerationParams};
use grimbox_domain::{
    Attributes, Character, CharacterClass, Entity, EntityId, EventKind, GameEvent, Position,
    Quest, SpellCatalog, TickBasis,
};
use grimbox_protocol::WsFrame;

use crate::bootstrap;
use crate::config::AppConfig;
use crate::events::EventBus;
use crate::game::GameState;
use crate::persistence::{self, Snapshot};
use crate::quality::{MetricsCollector, PcgController, QualityMonitor, QualityThresholds};
use crate::resilience::{self, CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use crate::session::{Session, SessionRegistry};

/// Seed used when dev mode wants a reproducible world.
const DEV_SEED: u64 = 12345;

pub struct Engine {
    pub config: AppConfig,
    /// Everything behind the world write lock
    pub game: RwLock<GameState>,
    pub sessions: SessionRegistry,
    pub bus: Arc<EventBus>,
    /// Immutable after startup; reads need no lock
    pub spells: SpellCatalog,
    pub pcg: Arc<PcgController>,
    pub metrics: Arc<MetricsCollector>,
    pub world_seed: u64,
    /// Spawn tile for new players
    pub entry: Position,
    ready: AtomicBool,
    save_breaker: CircuitBreaker,
}

impl Engine {
    /// Construct the engine: load the snapshot if persistence is enabled
    /// and one exists, otherwise bootstrap a fresh world.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>> {
        let seed = if config.enable_dev_mode {
            DEV_SEED
        } else {
            rand::thread_rng().gen()
        };

        let snapshot_path = config.snapshot_path();
        let restored = if config.persistence.enabled && snapshot_path.exists() {
            match persistence::load(&snapshot_path) {
                Ok(snapshot) => {
                    tracing::info!(
                        path = %snapshot_path.display(),
                        saved_at = %snapshot.saved_at,
                        "restored snapshot"
                    );
                    Some(snapshot)
                }
                Err(err) => {
                    tracing::error!(%err, "snapshot load failed; bootstrapping fresh world");
                    None
                }
            }
        } else {
            None
        };

        let (state, spells, entry, world_seed, restored_sessions) = match restored {
            Some(snapshot) => (
                snapshot.state,
                SpellCatalog::new(snapshot.spells),
                snapshot.entry,
                snapshot.world_seed,
                snapshot.sessions,
            ),
            None => {
                let started = std::time::Instant::now();
                let fresh = bootstrap::bootstrap(seed).context("bootstrap failed")?;
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(duration_ms, "bootstrap complete");
                (fresh.state, fresh.spells, fresh.entry, fresh.seed, Vec::new())
            }
        };

        let bus = Arc::new(EventBus::new());
        let metrics = Arc::new(MetricsCollector::new());
        QualityMonitor::install_collector(&bus, metrics.clone());

        let engine = Arc::new(Self {
            sessions: SessionRegistry::new(config.session_timeout),
            save_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            config,
            game: RwLock::new(state),
            bus,
            spells,
            pcg: Arc::new(PcgController::new(pcg::Difficulty::Normal, 16)),
            metrics,
            world_seed,
            entry,
            ready: AtomicBool::new(false),
        });

        // rebind sessions that survived the restart and are still live
        let now = chrono::Utc::now();
        for saved in restored_sessions {
            if saved.expires_at > now {
                let session = engine.sessions.create(saved.player);
                tracing::debug!(old = %saved.id, new = %session.id, "session rebound after restart");
            }
        }

        engine.install_fanout();
        Ok(engine)
    }

    /// Wildcard bus subscriber that enqueues every event onto every
    /// session's bounded queue. Enqueue-only: runs inside the publisher's
    /// locked path without taking any further locks.
    fn install_fanout(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        self.bus.subscribe(None, move |event: &GameEvent| {
            if let Some(engine) = engine.upgrade() {
                engine.sessions.broadcast(&WsFrame::event(event.clone()));
            }
        });
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Stamp and deliver events; call while still holding the world
    /// write lock so subscribers observe the mutation atomically.
    pub fn publish(&self, mut events: Vec<GameEvent>) -> Vec<GameEvent> {
        self.bus.publish_all(&mut events);
        events
    }

    /// The standard tail of every mutating handler: resolve any pending
    /// NPC turns, run the quest tracker over everything that happened,
    /// then publish while the write lock is still held.
    pub fn settle(&self, state: &mut GameState, mut events: Vec<GameEvent>) -> Vec<GameEvent> {
        let mut rng = rand::thread_rng();
        events.extend(state.run_npc_turns(&mut rng));
        let follow_ups = state.advance_quests(&events, &mut rng);
        events.extend(follow_ups);
        self.publish(events)
    }

    /// Place a new player entity on a free tile near the entry point.
    pub fn spawn_player(
        &self,
        state: &mut GameState,
        name: &str,
    ) -> Result<EntityId, grimbox_domain::DomainError> {
        let character = Character::new(name, CharacterClass::Fighter, Attributes::default());
        let spawn = find_free_tile_near(state, self.entry)
            .ok_or_else(|| grimbox_domain::DomainError::constraint("no free spawn tile"))?;
        state.world.place_entity(Entity::player(spawn, character))
    }

    /// Generate a quest for a player using the controller's current
    /// parameters; feeds the quality loop.
    pub fn generate_quest(
        &self,
        state: &GameState,
        owner: EntityId,
        player_level: u8,
    ) -> Result<Quest, pcg::PcgError> {
        let started = std::time::Instant::now();
        let params = GenerationParams::new(
            self.world_seed
                ^ self.pcg.variety_salt()
                ^ rand::thread_rng().gen::<u64>(),
        )
        .with_difficulty(self.pcg.difficulty())
        .with_player_level(player_level);

        let result = pcg::quests::generate(&params, &state.world, owner);
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(quest) => {
                let quality = (0.6 + 0.1 * quest.objectives.len() as f64).min(1.0);
                self.emit_content_generated("quest", duration_ms, quality);
            }
            Err(_) => self.metrics.record_error(),
        }
        result
    }

    /// Publish a `content_generated` event (which the metrics collector
    /// consumes).
    pub fn emit_content_generated(&self, kind: &str, duration_ms: u64, quality: f64) {
        let mut event = GameEvent::new(EventKind::ContentGenerated {
            content_kind: kind.to_string(),
            duration_ms,
            quality,
        });
        self.bus.publish(&mut event);
    }

    /// Tear a session down: remove its player from the world, close its
    /// queue, and announce both. `reason` lands in the session-ended
    /// event.
    pub async fn end_session(&self, session: &Arc<Session>, reason: &str) {
        {
            let mut state = self.game.write().await;
            let mut events = Vec::new();
            for effect in state.effects.clear_target(session.player) {
                events.push(GameEvent::on_target(
                    session.player,
                    EventKind::EffectExpired {
                        effect: effect.id,
                        kind: effect.kind,
                    },
                ));
            }
            if state.world.remove_entity(session.player).is_some() {
                events.push(GameEvent::on_target(
                    session.player,
                    EventKind::EntityRemoved,
                ));
            }
            events.push(GameEvent::new(EventKind::SessionEnded {
                session: session.id,
                reason: reason.to_string(),
            }));
            self.settle(&mut state, events);
        }
        self.sessions.remove(session.id);
    }

    /// Capture a snapshot under the read lock, then write it with retry
    /// and the circuit breaker. Never holds the world lock during I/O.
    pub async fn save(&self) -> Result<()> {
        if !self.config.persistence.enabled {
            return Ok(());
        }
        if let Err(open) = self.save_breaker.allow() {
            anyhow::bail!("snapshot skipped: {open}");
        }

        let snapshot = {
            let state = self.game.read().await;
            Snapshot::capture(
                &state,
                &self.sessions,
                self.spells.all().into_iter().cloned().collect(),
                self.world_seed,
                self.entry,
            )
        };

        let path = self.config.snapshot_path();
        let policy = RetryPolicy::default();
        let result = resilience::retry(
            &policy,
            |_err: &anyhow::Error| true,
            || {
                let snapshot = snapshot.clone();
                let path = path.clone();
                async move {
                    tokio::task::spawn_blocking(move || persistence::write_atomic(&snapshot, &path))
                        .await
                        .context("snapshot writer panicked")?
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.save_breaker.record_success();
                Ok(())
            }
            Err(err) => {
                self.save_breaker.record_failure();
                self.metrics.record_error();
                Err(err.into_inner())
            }
        }
    }

    /// Spawn the long-lived background tasks under supervision: a task
    /// that panics is logged and restarted; a clean exit (shutdown) is
    /// final.
    pub fn spawn_background_tasks(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let engine = self.clone();
            handles.push(supervise("session-sweeper", shutdown.clone(), move |stop| {
                run_sweeper(engine.clone(), stop)
            }));
        }

        if self.config.persistence.enabled {
            let engine = self.clone();
            handles.push(supervise("auto-save", shutdown.clone(), move |stop| {
                run_autosave(engine.clone(), stop)
            }));
        }

        {
            let engine = self.clone();
            handles.push(supervise("effect-scheduler", shutdown.clone(), move |stop| {
                run_effect_scheduler(engine.clone(), stop)
            }));
        }

        {
            let engine = self.clone();
            handles.push(supervise("quality-monitor", shutdown.clone(), move |stop| {
                let monitor = QualityMonitor::new(
                    engine.metrics.clone(),
                    engine.pcg.clone(),
                    QualityThresholds::default(),
                    Duration::from_secs(10),
                );
                let bus = engine.bus.clone();
                async move {
                    let mut stop = stop;
                    tokio::select! {
                        _ = monitor.run(bus) => {}
                        _ = stop.changed() => {}
                    }
                }
            }));
        }

        handles
    }
}

/// Run a worker, restarting it if it panics. Clean returns end the
/// supervision (the worker observed shutdown).
fn supervise<F, Fut>(
    name: &'static str,
    shutdown: watch::Receiver<bool>,
    factory: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let worker = tokio::spawn(factory(shutdown.clone()));
            match worker.await {
                Ok(()) => break,
                Err(err) if err.is_panic() => {
                    tracing::error!(worker = name, %err, "worker panicked; restarting");
                    if *shutdown.borrow() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(_) => break,
            }
        }
    })
}

async fn run_sweeper(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(engine.config.sweep_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for session in engine.sessions.sweep_expired() {
                    tracing::info!(session = %session.id, "session expired");
                    engine.end_session(&session, "session timed out").await;
                }
                // fan-out shed counters surface through the collector
                let dropped: u64 = engine
                    .sessions
                    .iter_sessions()
                    .iter()
                    .map(|session| session.outbound.dropped_count())
                    .sum();
                engine.metrics.set_dropped_frames(dropped);
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_autosave(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(engine.config.persistence.auto_save_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = engine.save().await {
                    tracing::error!(%err, "auto-save failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn run_effect_scheduler(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut state = engine.game.write().await;
                let events = state.tick_effects(TickBasis::RealTime, &mut rand::thread_rng());
                if !events.is_empty() {
                    engine.settle(&mut state, events);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Breadth-first search outward from `near` for a walkable, unoccupied
/// tile.
pub fn find_free_tile_near(state: &GameState, near: Position) -> Option<Position> {
    use std::collections::{HashSet, VecDeque};
    let world = &state.world;
    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();
    queue.push_back(near);
    seen.insert((near.x, near.y));

    while let Some(position) = queue.pop_front() {
        if world.is_walkable(&position) && world.blocking_occupant(&position).is_none() {
            return Some(position);
        }
        for facing in grimbox_domain::Facing::all() {
            let next = position.step(facing);
            if world.in_bounds(&next) && seen.insert((next.x, next.y)) {
                queue.push_back(next);
            }
        }
    }
    None
}
