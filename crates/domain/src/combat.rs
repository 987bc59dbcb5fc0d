//! The combat state machine: initiative, turn order, action points, and
//! attack resolution.
//!
//! An `Encounter` exists only while combat is running; "not in combat" is
//! the absence of one. Every random draw inside an encounter derives from
//! the encounter seed and a draw counter, so a replay with the same seed
//! and the same action sequence resolves identically.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dice::{DiceFormula, DiceRollResult};
use crate::error::DomainError;
use crate::ids::{EncounterId, EntityId};

/// Action points granted to each participant at the top of a round.
pub const ACTION_POINTS_PER_ROUND: u8 = 3;

/// Phases of an active encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    RollingInitiative,
    AwaitingAction,
    ResolvingAction,
    EndingRound,
    CombatOver,
}

/// Which side a participant fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Party,
    Hostile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub entity: EntityId,
    pub initiative: i32,
    pub side: Side,
    pub action_points: u8,
    /// Defeated participants stay listed but are skipped in turn order
    pub defeated: bool,
}

/// What a completed action or forced end-turn advanced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAdvance {
    /// Same participant continues (action points remain)
    Continues { entity: EntityId },
    /// Next participant's turn
    Next { entity: EntityId },
    /// Last participant finished; the round is ending. The caller must run
    /// the round tick, then call `begin_round`.
    RoundEnding { completed_round: u32 },
}

/// Attacker-side numbers for one swing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackProfile {
    pub attack_bonus: i32,
    pub damage: DiceFormula,
    pub damage_bonus: i32,
}

/// Defender-side numbers for one swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenseProfile {
    pub armor_class: i32,
    pub resistance: i32,
}

/// Resolution of one attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
    pub attack_roll: i32,
    pub damage: i32,
}

/// A running combat encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: EncounterId,
    pub seed: u64,
    /// Number of random draws consumed; with the seed, fully determines
    /// the next draw
    draws: u64,
    pub phase: CombatPhase,
    pub round: u32,
    current: usize,
    pub participants: Vec<Participant>,
}

impl Encounter {
    pub fn new(seed: u64) -> Self {
        Self {
            id: EncounterId::new(),
            seed,
            draws: 0,
            phase: CombatPhase::RollingInitiative,
            round: 0,
            current: 0,
            participants: Vec::new(),
        }
    }

    /// Derive the RNG for the next draw and advance the counter.
    fn next_rng(&mut self) -> StdRng {
        let stream = self
            .seed
            .wrapping_add(self.draws.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self.draws += 1;
        StdRng::seed_from_u64(stream)
    }

    fn roll(&mut self, formula: DiceFormula) -> DiceRollResult {
        let mut rng = self.next_rng();
        formula.roll(&mut rng)
    }

    /// Roll initiative for the given participants and enter
    /// `AwaitingAction` at round 1.
    ///
    /// Initiative is `d20 + dex_mod`, rolled in ascending entity-id order
    /// so the outcome depends only on the seed and the participant set.
    /// Ordering is descending initiative, ties by ascending id.
    pub fn roll_initiative(
        &mut self,
        mut entrants: Vec<(EntityId, i32, Side)>,
    ) -> Result<(), DomainError> {
        if self.phase != CombatPhase::RollingInitiative {
            return Err(DomainError::invalid_state_transition(
                "initiative already rolled",
            ));
        }
        if entrants.len() < 2 {
            return Err(DomainError::validation(
                "combat needs at least two participants",
            ));
        }

        entrants.sort_by_key(|(id, _, _)| *id);
        let mut participants = Vec::with_capacity(entrants.len());
        for (entity, dex_mod, side) in entrants {
            let initiative = self.roll(DiceFormula::d20()).total + dex_mod;
            participants.push(Participant {
                entity,
                initiative,
                side,
                action_points: ACTION_POINTS_PER_ROUND,
                defeated: false,
            });
        }
        participants.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        self.participants = participants;

        self.phase = CombatPhase::AwaitingAction;
        self.round = 1;
        self.current = 0;
        Ok(())
    }

    pub fn turn_order(&self) -> Vec<EntityId> {
        self.participants.iter().map(|p| p.entity).collect()
    }

    pub fn current_participant(&self) -> Option<&Participant> {
        self.participants.get(self.current)
    }

    pub fn participant(&self, entity: EntityId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.entity == entity)
    }

    pub fn is_participant(&self, entity: EntityId) -> bool {
        self.participant(entity).is_some()
    }

    /// Whether this entity may act right now.
    pub fn can_act(&self, entity: EntityId) -> bool {
        self.phase == CombatPhase::AwaitingAction
            && self
                .current_participant()
                .map(|p| p.entity == entity && !p.defeated && p.action_points > 0)
                .unwrap_or(false)
    }

    /// Enter `ResolvingAction` for the current participant, spending
    /// `cost` action points. Illegal actors are rejected without any
    /// state change.
    pub fn begin_action(&mut self, entity: EntityId, cost: u8) -> Result<(), DomainError> {
        if self.phase != CombatPhase::AwaitingAction {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot act during {:?}",
                self.phase
            )));
        }
        let current = self
            .current_participant()
            .ok_or_else(|| DomainError::constraint("encounter has no participants"))?;
        if current.entity != entity {
            return Err(DomainError::NotYourTurn(entity.to_string()));
        }
        if current.defeated {
            return Err(DomainError::constraint("defeated participants cannot act"));
        }
        if current.action_points < cost {
            return Err(DomainError::InsufficientResources(format!(
                "action needs {cost} AP, {} remaining",
                current.action_points
            )));
        }
        self.participants[self.current].action_points -= cost;
        self.phase = CombatPhase::ResolvingAction;
        Ok(())
    }

    /// Leave `ResolvingAction`. The participant keeps the turn while
    /// action points remain; otherwise the index advances.
    pub fn finish_action(&mut self) -> TurnAdvance {
        debug_assert_eq!(self.phase, CombatPhase::ResolvingAction);
        self.phase = CombatPhase::AwaitingAction;
        let current = &self.participants[self.current];
        if !current.defeated && current.action_points > 0 {
            TurnAdvance::Continues {
                entity: current.entity,
            }
        } else {
            self.advance_index()
        }
    }

    /// Forced turn end by the current participant.
    pub fn end_turn(&mut self, entity: EntityId) -> Result<TurnAdvance, DomainError> {
        if self.phase != CombatPhase::AwaitingAction {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot end turn during {:?}",
                self.phase
            )));
        }
        let current = self
            .current_participant()
            .ok_or_else(|| DomainError::constraint("encounter has no participants"))?;
        if current.entity != entity {
            return Err(DomainError::NotYourTurn(entity.to_string()));
        }
        Ok(self.advance_index())
    }

    fn advance_index(&mut self) -> TurnAdvance {
        loop {
            self.current += 1;
            if self.current >= self.participants.len() {
                self.phase = CombatPhase::EndingRound;
                return TurnAdvance::RoundEnding {
                    completed_round: self.round,
                };
            }
            if !self.participants[self.current].defeated {
                return TurnAdvance::Next {
                    entity: self.participants[self.current].entity,
                };
            }
        }
    }

    /// Start the next round after the round tick has run: round + 1,
    /// action points refreshed, first living participant up.
    pub fn begin_round(&mut self) -> Result<EntityId, DomainError> {
        if self.phase != CombatPhase::EndingRound {
            return Err(DomainError::invalid_state_transition(
                "round is not ending",
            ));
        }
        self.round += 1;
        for participant in &mut self.participants {
            participant.action_points = ACTION_POINTS_PER_ROUND;
        }
        self.current = 0;
        while self
            .participants
            .get(self.current)
            .map(|p| p.defeated)
            .unwrap_or(false)
        {
            self.current += 1;
        }
        self.phase = CombatPhase::AwaitingAction;
        self.current_participant()
            .map(|p| p.entity)
            .ok_or_else(|| DomainError::constraint("no living participants"))
    }

    /// Mark a participant defeated (their turn entries are skipped).
    pub fn mark_defeated(&mut self, entity: EntityId) {
        if let Some(participant) = self
            .participants
            .iter_mut()
            .find(|p| p.entity == entity)
        {
            participant.defeated = true;
        }
    }

    /// Combat ends when fewer than two sides have living participants.
    /// Returns the surviving entities when that happens.
    pub fn check_over(&mut self) -> Option<Vec<EntityId>> {
        let mut party_alive = false;
        let mut hostile_alive = false;
        for participant in &self.participants {
            if participant.defeated {
                continue;
            }
            match participant.side {
                Side::Party => party_alive = true,
                Side::Hostile => hostile_alive = true,
            }
        }
        if party_alive && hostile_alive {
            return None;
        }
        self.phase = CombatPhase::CombatOver;
        Some(
            self.participants
                .iter()
                .filter(|p| !p.defeated)
                .map(|p| p.entity)
                .collect(),
        )
    }

    /// Resolve one attack under the encounter's deterministic RNG.
    ///
    /// A natural 20 is a critical hit (damage dice doubled); a natural 1
    /// is a fumble and always misses. Otherwise the attack lands when
    /// `d20 + attack_bonus >= armor_class`. Damage is reduced by the
    /// defender's resistance, minimum 1 on a hit.
    pub fn resolve_attack(
        &mut self,
        attacker: &AttackProfile,
        defender: &DefenseProfile,
    ) -> AttackOutcome {
        let to_hit = self.roll(DiceFormula::d20());
        let critical = to_hit.is_natural_max();
        let fumble = to_hit.is_natural_one();
        let attack_roll = to_hit.total + attacker.attack_bonus;

        let hit = !fumble && (critical || attack_roll >= defender.armor_class);
        if !hit {
            return AttackOutcome {
                hit: false,
                critical: false,
                fumble,
                attack_roll,
                damage: 0,
            };
        }

        let mut damage_roll = self.roll(attacker.damage).dice_total;
        if critical {
            damage_roll += self.roll(attacker.damage).dice_total;
        }
        let damage = (damage_roll + attacker.damage_bonus - defender.resistance).max(1);

        AttackOutcome {
            hit: true,
            critical,
            fumble: false,
            attack_roll,
            damage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u128) -> EntityId {
        EntityId::from_uuid(Uuid::from_u128(n))
    }

    fn three_way() -> Encounter {
        let mut encounter = Encounter::new(12345);
        encounter
            .roll_initiative(vec![
                (id(1), 2, Side::Party),
                (id(2), 0, Side::Hostile),
                (id(3), -1, Side::Hostile),
            ])
            .expect("rolls");
        encounter
    }

    #[test]
    fn test_initiative_is_deterministic() {
        let a = three_way();
        let b = three_way();
        assert_eq!(a.turn_order(), b.turn_order());
        assert_eq!(
            a.participants.iter().map(|p| p.initiative).collect::<Vec<_>>(),
            b.participants.iter().map(|p| p.initiative).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_initiative_orders_descending() {
        let encounter = three_way();
        let initiatives: Vec<i32> = encounter.participants.iter().map(|p| p.initiative).collect();
        let mut sorted = initiatives.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(initiatives, sorted);
        assert_eq!(encounter.phase, CombatPhase::AwaitingAction);
        assert_eq!(encounter.round, 1);
    }

    #[test]
    fn test_initiative_ties_break_by_ascending_id() {
        // zero dex mods and a fixed seed; find a seed where two rolls tie
        for seed in 0..200 {
            let mut encounter = Encounter::new(seed);
            encounter
                .roll_initiative(vec![
                    (id(7), 0, Side::Party),
                    (id(3), 0, Side::Hostile),
                ])
                .expect("rolls");
            let p = &encounter.participants;
            if p[0].initiative == p[1].initiative {
                assert!(p[0].entity < p[1].entity);
                return;
            }
        }
        // With 200 seeds a d20 tie is effectively certain; reaching here
        // means the RNG derivation changed.
        panic!("no tie found in 200 seeds");
    }

    #[test]
    fn test_wrong_actor_rejected_without_state_change() {
        let mut encounter = three_way();
        let current = encounter.current_participant().expect("has current").entity;
        let other = encounter
            .participants
            .iter()
            .find(|p| p.entity != current)
            .expect("other")
            .entity;

        let before = encounter.clone();
        assert!(matches!(
            encounter.begin_action(other, 1),
            Err(DomainError::NotYourTurn(_))
        ));
        assert_eq!(encounter, before);
    }

    #[test]
    fn test_end_turn_cycles_to_next_round() {
        let mut encounter = three_way();
        let order = encounter.turn_order();

        let advance = encounter.end_turn(order[0]).expect("ends");
        assert_eq!(advance, TurnAdvance::Next { entity: order[1] });
        let advance = encounter.end_turn(order[1]).expect("ends");
        assert_eq!(advance, TurnAdvance::Next { entity: order[2] });
        let advance = encounter.end_turn(order[2]).expect("ends");
        assert_eq!(advance, TurnAdvance::RoundEnding { completed_round: 1 });
        assert_eq!(encounter.phase, CombatPhase::EndingRound);

        let first = encounter.begin_round().expect("next round");
        assert_eq!(first, order[0]);
        assert_eq!(encounter.round, 2);
        assert_eq!(encounter.turn_order(), order);
    }

    #[test]
    fn test_action_points_deplete_then_advance() {
        let mut encounter = three_way();
        let first = encounter.turn_order()[0];
        let second = encounter.turn_order()[1];

        // spend all action points one at a time
        for spent in 1..=ACTION_POINTS_PER_ROUND {
            encounter.begin_action(first, 1).expect("acts");
            let advance = encounter.finish_action();
            if spent < ACTION_POINTS_PER_ROUND {
                assert_eq!(advance, TurnAdvance::Continues { entity: first });
            } else {
                assert_eq!(advance, TurnAdvance::Next { entity: second });
            }
        }
        // out of AP now; a further action is rejected next round only
        assert!(!encounter.can_act(first));
    }

    #[test]
    fn test_defeated_participants_are_skipped() {
        let mut encounter = three_way();
        let order = encounter.turn_order();
        encounter.mark_defeated(order[1]);

        let advance = encounter.end_turn(order[0]).expect("ends");
        assert_eq!(advance, TurnAdvance::Next { entity: order[2] });
    }

    #[test]
    fn test_combat_over_when_one_side_remains() {
        let mut encounter = three_way();
        let hostiles: Vec<EntityId> = encounter
            .participants
            .iter()
            .filter(|p| p.side == Side::Hostile)
            .map(|p| p.entity)
            .collect();

        assert!(encounter.check_over().is_none());
        for hostile in hostiles {
            encounter.mark_defeated(hostile);
        }
        let victors = encounter.check_over().expect("over");
        assert_eq!(victors, vec![id(1)]);
        assert_eq!(encounter.phase, CombatPhase::CombatOver);
    }

    #[test]
    fn test_attack_resolution_is_deterministic() {
        let attacker = AttackProfile {
            attack_bonus: 4,
            damage: DiceFormula::parse("1d8").expect("valid"),
            damage_bonus: 2,
        };
        let defender = DefenseProfile {
            armor_class: 13,
            resistance: 1,
        };

        let mut a = Encounter::new(999);
        let mut b = Encounter::new(999);
        for _ in 0..20 {
            assert_eq!(
                a.resolve_attack(&attacker, &defender),
                b.resolve_attack(&attacker, &defender)
            );
        }
    }

    #[test]
    fn test_hit_damage_is_at_least_one() {
        let attacker = AttackProfile {
            attack_bonus: 20,
            damage: DiceFormula::parse("1d4").expect("valid"),
            damage_bonus: 0,
        };
        let defender = DefenseProfile {
            armor_class: 5,
            resistance: 50,
        };
        let mut encounter = Encounter::new(7);
        for _ in 0..30 {
            let outcome = encounter.resolve_attack(&attacker, &defender);
            if outcome.hit {
                assert!(outcome.damage >= 1);
            }
        }
    }
}
