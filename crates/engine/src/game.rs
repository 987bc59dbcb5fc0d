//! The locked game state and its mutation flows.
//!
//! `GameState` bundles everything the world write lock guards: the world
//! grid and entity table, the effect engine, the quest log, and the
//! active encounter. Mutation helpers return the events they produced;
//! the caller publishes them on the bus before releasing the lock, which
//! is what makes "mutate, quest tracker observes, fan-out enqueues" a
//! single atomic step.

use rand::Rng;
use serde::{Deserialize, Serialize};

use grimbox_domain::{
    combat::TurnAdvance, CombatPhase, Effect, EffectEngine, EffectKind, Encounter, Entity,
    EntityId, EventKind, GameEvent, QuestLog, StackOutcome, TickBasis, World,
};

struct NpcSwing {
    attack: grimbox_domain::AttackProfile,
    defense: grimbox_domain::DefenseProfile,
}

/// Everything mutated only under the world write lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub world: World,
    pub effects: EffectEngine,
    pub quests: QuestLog,
    pub encounter: Option<Encounter>,
}

impl GameState {
    pub fn new(world: World) -> Self {
        Self {
            world,
            effects: EffectEngine::new(),
            quests: QuestLog::new(),
            encounter: None,
        }
    }

    /// Deal damage to an entity, processing defeat when HP reaches zero.
    pub fn apply_damage<R: Rng + ?Sized>(
        &mut self,
        source: Option<EntityId>,
        target: EntityId,
        amount: i32,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(entity) = self.world.entity_mut(target) else {
            return events;
        };
        let Some(hp) = entity.health_mut() else {
            return events;
        };
        let dealt = hp.damage(amount);
        let remaining = hp.current;

        let mut event = GameEvent::on_target(
            target,
            EventKind::DamageDealt {
                amount: dealt,
                remaining_hp: remaining,
            },
        );
        event.source = source;
        events.push(event);

        if remaining == 0 {
            events.extend(self.process_defeat(source, target, rng));
        }
        events
    }

    /// Heal an entity, clamped at max HP.
    pub fn apply_heal(
        &mut self,
        source: Option<EntityId>,
        target: EntityId,
        amount: i32,
    ) -> Vec<GameEvent> {
        let Some(hp) = self
            .world
            .entity_mut(target)
            .and_then(Entity::health_mut)
        else {
            return Vec::new();
        };
        let healed = hp.heal(amount);
        let remaining = hp.current;
        let mut event = GameEvent::on_target(
            target,
            EventKind::HealingApplied {
                amount: healed,
                remaining_hp: remaining,
            },
        );
        event.source = source;
        vec![event]
    }

    /// Defeat transition: the entity stays in the world in its defeated
    /// sub-state; combat bookkeeping and experience follow.
    fn process_defeat<R: Rng + ?Sized>(
        &mut self,
        source: Option<EntityId>,
        target: EntityId,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();

        let (template, xp_value) = match self.world.entity_mut(target) {
            Some(Entity::Npc(npc)) => {
                npc.defeated = true;
                (npc.template.clone(), npc.xp_value)
            }
            Some(entity) => (entity.template().to_string(), 0),
            None => return events,
        };

        // defeated entities keep no effects
        for effect in self.effects.clear_target(target) {
            events.push(GameEvent::on_target(
                target,
                EventKind::EffectExpired {
                    effect: effect.id,
                    kind: effect.kind,
                },
            ));
        }

        let mut defeat = GameEvent::on_target(
            target,
            EventKind::EntityDefeated {
                template,
                xp_awarded: xp_value,
            },
        );
        defeat.source = source;
        events.push(defeat);

        if xp_value > 0 {
            if let Some(victor) = source {
                events.extend(self.grant_experience(victor, xp_value, rng));
            }
        }

        if let Some(encounter) = self.encounter.as_mut() {
            if encounter.is_participant(target) {
                encounter.mark_defeated(target);
                if let Some(victors) = encounter.check_over() {
                    events.push(GameEvent::new(EventKind::CombatEnded {
                        encounter: encounter.id,
                        victors,
                    }));
                    self.encounter = None;
                }
            }
        }
        events
    }

    /// Grant XP to a player entity, emitting progression events.
    pub fn grant_experience<R: Rng + ?Sized>(
        &mut self,
        entity: EntityId,
        amount: u32,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let Some(player) = self
            .world
            .entity_mut(entity)
            .and_then(Entity::as_player_mut)
        else {
            return Vec::new();
        };
        player
            .character
            .add_experience(amount, rng)
            .into_iter()
            .map(|kind| GameEvent::on_target(entity, kind))
            .collect()
    }

    /// Apply an effect under its stacking rule and emit the events.
    pub fn apply_effect(&mut self, effect: Effect) -> (grimbox_domain::EffectId, Vec<GameEvent>) {
        let source = effect.source;
        let target = effect.target;
        let kind = effect.kind.clone();
        let magnitude = effect.magnitude;
        let duration = effect.remaining;

        let outcome = self.effects.apply(effect);
        let mut events = Vec::new();
        if let StackOutcome::Replaced { removed, .. } = &outcome {
            events.push(GameEvent::on_target(
                target,
                EventKind::EffectExpired {
                    effect: *removed,
                    kind: kind.clone(),
                },
            ));
        }
        let active = outcome.active_id();
        events.push(GameEvent::targeted(
            source,
            target,
            EventKind::EffectApplied {
                effect: active,
                kind,
                magnitude,
                duration,
            },
        ));
        (active, events)
    }

    /// Advance the effect engine on one basis, applying DoT/HoT pulses
    /// and emitting tick/expiry events.
    pub fn tick_effects<R: Rng + ?Sized>(&mut self, basis: TickBasis, rng: &mut R) -> Vec<GameEvent> {
        let report = self.effects.tick(basis);
        let mut events = Vec::new();

        for pulse in report.pulses {
            events.push(GameEvent::targeted(
                pulse.source,
                pulse.target,
                EventKind::EffectTicked {
                    effect: pulse.effect,
                    magnitude: pulse.magnitude,
                },
            ));
            match pulse.kind {
                EffectKind::DamageOverTime => {
                    events.extend(self.apply_damage(
                        Some(pulse.source),
                        pulse.target,
                        pulse.magnitude,
                        rng,
                    ));
                }
                EffectKind::HealOverTime => {
                    events.extend(self.apply_heal(
                        Some(pulse.source),
                        pulse.target,
                        pulse.magnitude,
                    ));
                }
                _ => {}
            }
        }
        for effect in report.expired {
            events.push(GameEvent::on_target(
                effect.target,
                EventKind::EffectExpired {
                    effect: effect.id,
                    kind: effect.kind,
                },
            ));
        }
        events
    }

    /// Round boundary: run the round tick, advance the world turn
    /// counter, and open the next round.
    pub fn finish_round<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let Some(encounter) = self.encounter.as_ref() else {
            return events;
        };
        let (encounter_id, completed_round) = (encounter.id, encounter.round);

        events.push(GameEvent::new(EventKind::RoundEnded {
            encounter: encounter_id,
            round: completed_round,
        }));
        events.extend(self.tick_effects(TickBasis::Round, rng));
        self.world.turn += 1;

        // the tick may have finished the fight
        if let Some(encounter) = self.encounter.as_mut() {
            if encounter.phase == CombatPhase::EndingRound {
                match encounter.begin_round() {
                    Ok(_) => {
                        events.push(GameEvent::new(EventKind::TurnAdvanced {
                            encounter: encounter_id,
                            round: encounter.round,
                        }));
                    }
                    Err(_) => {
                        events.push(GameEvent::new(EventKind::CombatEnded {
                            encounter: encounter_id,
                            victors: Vec::new(),
                        }));
                        self.encounter = None;
                    }
                }
            }
        }
        events
    }

    /// Handle a turn advance produced by `finish_action`/`end_turn`:
    /// turn-basis effects tick, and a round ending rolls the round over.
    pub fn apply_turn_advance<R: Rng + ?Sized>(
        &mut self,
        advance: TurnAdvance,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        match advance {
            TurnAdvance::Continues { .. } => {}
            TurnAdvance::Next { .. } => {
                events.extend(self.tick_effects(TickBasis::Turn, rng));
                if let Some(encounter) = self.encounter.as_ref() {
                    events.push(GameEvent::new(EventKind::TurnAdvanced {
                        encounter: encounter.id,
                        round: encounter.round,
                    }));
                }
            }
            TurnAdvance::RoundEnding { .. } => {
                events.extend(self.tick_effects(TickBasis::Turn, rng));
                events.extend(self.finish_round(rng));
            }
        }
        events
    }

    /// Resolve NPC turns until a player is up, the round state settles,
    /// or combat ends. NPC behaviour is deliberately simple: attack an
    /// adjacent opposing participant, otherwise pass. Bounded so two
    /// leaderless NPC sides cannot spin the lock forever.
    pub fn run_npc_turns<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..64 {
            let Some(encounter) = self.encounter.as_ref() else {
                break;
            };
            if encounter.phase != CombatPhase::AwaitingAction {
                break;
            }
            let Some(current) = encounter.current_participant() else {
                break;
            };
            let actor = current.entity;
            let actor_side = current.side;
            if !matches!(self.world.entity(actor), Some(Entity::Npc(_))) {
                break;
            }

            let stunned = self.effects.is_stunned(actor);
            let target = if stunned {
                None
            } else {
                self.pick_adjacent_enemy(actor, actor_side)
            };

            let advance = match target {
                Some(target) => {
                    let Some(swing) = self.npc_swing(actor, target) else {
                        break;
                    };
                    let Some(encounter) = self.encounter.as_mut() else {
                        break;
                    };
                    if encounter.begin_action(actor, 1).is_err() {
                        match encounter.end_turn(actor) {
                            Ok(advance) => advance,
                            Err(_) => break,
                        }
                    } else {
                        let outcome =
                            encounter.resolve_attack(&swing.attack, &swing.defense);
                        if outcome.hit {
                            events.push(GameEvent::targeted(
                                actor,
                                target,
                                EventKind::AttackLanded {
                                    roll: outcome.attack_roll,
                                    damage: outcome.damage,
                                    critical: outcome.critical,
                                },
                            ));
                            events.extend(self.apply_damage(
                                Some(actor),
                                target,
                                outcome.damage,
                                rng,
                            ));
                        } else {
                            events.push(GameEvent::targeted(
                                actor,
                                target,
                                EventKind::AttackMissed {
                                    roll: outcome.attack_roll,
                                    fumble: outcome.fumble,
                                },
                            ));
                        }
                        match self.encounter.as_mut() {
                            Some(encounter) => encounter.finish_action(),
                            None => break, // combat ended with that blow
                        }
                    }
                }
                None => {
                    let Some(encounter) = self.encounter.as_mut() else {
                        break;
                    };
                    match encounter.end_turn(actor) {
                        Ok(advance) => advance,
                        Err(_) => break,
                    }
                }
            };
            events.extend(self.apply_turn_advance(advance, rng));
        }
        events
    }

    fn pick_adjacent_enemy(&self, actor: EntityId, actor_side: grimbox_domain::Side) -> Option<EntityId> {
        let encounter = self.encounter.as_ref()?;
        let actor_pos = self.world.entity(actor)?.position();
        encounter
            .participants
            .iter()
            .filter(|p| p.side != actor_side && !p.defeated)
            .filter_map(|p| self.world.entity(p.entity))
            .filter(|entity| {
                entity.is_alive()
                    && entity.position().chebyshev_distance(&actor_pos) <= 1
            })
            .map(Entity::id)
            .min()
    }

    fn npc_swing(&self, actor: EntityId, target: EntityId) -> Option<NpcSwing> {
        let npc = self.world.entity(actor)?.as_npc()?;
        let attack = grimbox_domain::AttackProfile {
            attack_bonus: npc.attack_bonus(),
            damage: npc.damage,
            damage_bonus: 0,
        };
        let defense = match self.world.entity(target)? {
            Entity::Player(player) => grimbox_domain::DefenseProfile {
                armor_class: player.character.armor_class(),
                resistance: player.character.damage_resistance(),
            },
            Entity::Npc(other) => grimbox_domain::DefenseProfile {
                armor_class: other.armor_class(),
                resistance: other.damage_resistance(),
            },
            Entity::StaticObject(_) => return None,
        };
        Some(NpcSwing { attack, defense })
    }

    /// Run the quest tracker over freshly emitted events. Completions
    /// grant their rewards here, inside the same locked mutation; reward
    /// events get one further observation pass so fetch objectives can
    /// see reward items.
    pub fn advance_quests<R: Rng + ?Sized>(
        &mut self,
        events: &[GameEvent],
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let mut produced = Vec::new();
        for event in events {
            produced.extend(self.quests.observe(event));
        }

        // completions may sit in the incoming batch (forced completes)
        // or in the tracker's own output; each grants exactly once
        let mut rewards = Vec::new();
        for event in events.iter().chain(produced.iter()) {
            if let EventKind::QuestCompleted { quest, .. } = &event.kind {
                rewards.extend(self.grant_quest_rewards(*quest, rng));
            }
        }
        for event in &rewards {
            produced.extend(self.quests.observe(event));
        }
        produced.extend(rewards);
        produced
    }

    fn grant_quest_rewards<R: Rng + ?Sized>(
        &mut self,
        quest_id: grimbox_domain::QuestId,
        rng: &mut R,
    ) -> Vec<GameEvent> {
        let Some(quest) = self.quests.get(quest_id) else {
            return Vec::new();
        };
        let owner = quest.owner;
        let rewards = quest.rewards.clone();

        let mut events = Vec::new();
        if rewards.experience > 0 {
            events.extend(self.grant_experience(owner, rewards.experience, rng));
        }
        if let Some(player) = self
            .world
            .entity_mut(owner)
            .and_then(Entity::as_player_mut)
        {
            player.character.gold += rewards.gold;
            for item in rewards.items {
                events.push(GameEvent::on_target(
                    owner,
                    EventKind::ItemAcquired {
                        item: item.id,
                        template: item.template.clone(),
                    },
                ));
                player.character.inventory.push(item);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimbox_domain::{
        Attributes, Character, CharacterClass, EffectDuration, EffectTemplate, Position,
        Quest, QuestRewards, Objective, ObjectiveKind,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state_with_pair() -> (GameState, EntityId, EntityId) {
        let mut world = World::open(16, 16, 1);
        let player = world
            .place_entity(Entity::player(
                Position::new(2, 2, 0),
                Character::new("Aria", CharacterClass::Fighter, Attributes::default()),
            ))
            .expect("places");
        let goblin = world
            .place_entity(Entity::npc(
                "goblin",
                "Goblin",
                Position::new(3, 2, 0),
                1,
                Attributes::default(),
                true,
            ))
            .expect("places");
        (GameState::new(world), player, goblin)
    }

    #[test]
    fn test_damage_emits_and_defeat_awards_xp() {
        let (mut state, player, goblin) = state_with_pair();
        let mut rng = StdRng::seed_from_u64(0);

        let events = state.apply_damage(Some(player), goblin, 1000, &mut rng);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::DamageDealt { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::EntityDefeated { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::ExperienceGained { .. })));

        // defeated entity remains in the world in its defeated sub-state
        let goblin_entity = state.world.entity(goblin).expect("still present");
        assert!(goblin_entity.is_defeated());
    }

    #[test]
    fn test_dot_pulse_kills_through_tick() {
        let (mut state, player, goblin) = state_with_pair();
        let mut rng = StdRng::seed_from_u64(0);

        let dot = EffectTemplate::new(
            EffectKind::DamageOverTime,
            9999,
            EffectDuration::Rounds(2),
        )
        .instantiate(player, goblin);
        let (_, _) = state.apply_effect(dot);

        let events = state.tick_effects(TickBasis::Round, &mut rng);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::EffectTicked { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::EntityDefeated { .. })));
    }

    #[test]
    fn test_quest_completion_grants_rewards() {
        let (mut state, player, _) = state_with_pair();
        let mut rng = StdRng::seed_from_u64(1);

        let quest = Quest::new(
            "Rat Problem",
            "",
            player,
            vec![Objective::new(
                "kill",
                ObjectiveKind::Kill {
                    template: "goblin".into(),
                },
                1,
            )],
            QuestRewards {
                experience: 50,
                gold: 7,
                items: vec![],
            },
        );
        state.quests.start(quest).expect("starts");

        let kill = GameEvent::from_source(
            player,
            EventKind::EntityDefeated {
                template: "goblin".into(),
                xp_awarded: 0,
            },
        );
        let produced = state.advance_quests(&[kill], &mut rng);
        assert!(produced
            .iter()
            .any(|e| matches!(e.kind, EventKind::QuestCompleted { .. })));
        let character = &state
            .world
            .entity(player)
            .and_then(Entity::as_player)
            .expect("player")
            .character;
        assert_eq!(character.gold, 7);
        assert_eq!(character.experience, 50);
    }
}
