//! Quests: objectives, progression, rewards.
//!
//! Quests advance when the tracker observes quest-relevant events (kills,
//! item pickups, locations reached) emitted by the same locked mutation.
//! Objective progress saturates at `required`; completing the last
//! objective completes the quest; failure is terminal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::events::{EventKind, GameEvent};
use crate::ids::{EntityId, QuestId};
use crate::items::Item;
use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    NotStarted,
    Active,
    Completed,
    Failed,
}

/// What an objective counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "objective", rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Defeat entities of a template ("goblin")
    Kill { template: String },
    /// Acquire items of a template ("ancient_relic")
    Fetch { template: String },
    /// Stand within `radius` tiles of the location
    Explore { position: Position, radius: u32 },
    /// Keep an entity alive until it reaches the location
    Escort { ward: EntityId, position: Position },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub description: String,
    #[serde(flatten)]
    pub kind: ObjectiveKind,
    pub progress: u32,
    pub required: u32,
}

impl Objective {
    pub fn new(description: impl Into<String>, kind: ObjectiveKind, required: u32) -> Self {
        Self {
            description: description.into(),
            kind,
            progress: 0,
            required: required.max(1),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= self.required
    }

    /// Advance progress, saturating at `required`. Returns true if the
    /// stored progress changed.
    fn advance(&mut self, delta: u32) -> bool {
        let next = self.progress.saturating_add(delta).min(self.required);
        if next == self.progress {
            return false;
        }
        self.progress = next;
        true
    }
}

/// Rewards granted on completion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRewards {
    pub experience: u32,
    pub gold: u32,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: QuestId,
    pub title: String,
    pub description: String,
    pub status: QuestStatus,
    /// The player entity that owns this quest
    pub owner: EntityId,
    pub objectives: Vec<Objective>,
    pub rewards: QuestRewards,
}

impl Quest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        owner: EntityId,
        objectives: Vec<Objective>,
        rewards: QuestRewards,
    ) -> Self {
        Self {
            id: QuestId::new(),
            title: title.into(),
            description: description.into(),
            status: QuestStatus::NotStarted,
            owner,
            objectives,
            rewards,
        }
    }

    pub fn all_objectives_complete(&self) -> bool {
        self.objectives.iter().all(Objective::is_complete)
    }
}

/// The quest registry, mutated only under the world write lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestLog {
    quests: BTreeMap<QuestId, Quest>,
}

impl QuestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a quest. Returns the emitted events.
    pub fn start(&mut self, mut quest: Quest) -> Result<Vec<GameEvent>, DomainError> {
        if quest.objectives.is_empty() {
            return Err(DomainError::validation("quest has no objectives"));
        }
        if self.quests.contains_key(&quest.id) {
            return Err(DomainError::constraint(format!(
                "quest {} already started",
                quest.id
            )));
        }
        quest.status = QuestStatus::Active;
        let event = GameEvent::on_target(
            quest.owner,
            EventKind::QuestStarted {
                quest: quest.id,
                title: quest.title.clone(),
            },
        );
        self.quests.insert(quest.id, quest);
        Ok(vec![event])
    }

    pub fn get(&self, id: QuestId) -> Option<&Quest> {
        self.quests.get(&id)
    }

    pub fn active(&self, owner: EntityId) -> Vec<&Quest> {
        self.quests
            .values()
            .filter(|quest| quest.owner == owner && quest.status == QuestStatus::Active)
            .collect()
    }

    pub fn completed(&self, owner: EntityId) -> Vec<&Quest> {
        self.quests
            .values()
            .filter(|quest| quest.owner == owner && quest.status == QuestStatus::Completed)
            .collect()
    }

    /// The full log for an owner, regardless of status.
    pub fn log(&self, owner: EntityId) -> Vec<&Quest> {
        self.quests
            .values()
            .filter(|quest| quest.owner == owner)
            .collect()
    }

    /// Manually advance one objective. Completion is detected here, but
    /// reward granting is the caller's job (it needs the character).
    pub fn update_objective(
        &mut self,
        id: QuestId,
        index: usize,
        delta: u32,
    ) -> Result<Vec<GameEvent>, DomainError> {
        let quest = self
            .quests
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Quest", id))?;
        if quest.status != QuestStatus::Active {
            return Err(DomainError::invalid_state_transition(format!(
                "quest is {:?}",
                quest.status
            )));
        }
        let objective = quest
            .objectives
            .get_mut(index)
            .ok_or_else(|| DomainError::validation(format!("no objective {index}")))?;

        let mut events = Vec::new();
        if objective.advance(delta) {
            events.push(GameEvent::on_target(
                quest.owner,
                EventKind::ObjectiveUpdated {
                    quest: id,
                    objective: index,
                    progress: objective.progress,
                    required: objective.required,
                },
            ));
        }
        if quest.all_objectives_complete() {
            events.extend(self.complete(id)?);
        }
        Ok(events)
    }

    /// Force-complete a quest.
    pub fn complete(&mut self, id: QuestId) -> Result<Vec<GameEvent>, DomainError> {
        let quest = self
            .quests
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Quest", id))?;
        if quest.status != QuestStatus::Active {
            return Err(DomainError::invalid_state_transition(format!(
                "quest is {:?}",
                quest.status
            )));
        }
        quest.status = QuestStatus::Completed;
        Ok(vec![GameEvent::on_target(
            quest.owner,
            EventKind::QuestCompleted {
                quest: id,
                xp_reward: quest.rewards.experience,
            },
        )])
    }

    /// Fail a quest; terminal.
    pub fn fail(&mut self, id: QuestId) -> Result<Vec<GameEvent>, DomainError> {
        let quest = self
            .quests
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Quest", id))?;
        match quest.status {
            QuestStatus::Active | QuestStatus::NotStarted => {
                quest.status = QuestStatus::Failed;
                Ok(vec![GameEvent::on_target(
                    quest.owner,
                    EventKind::QuestFailed { quest: id },
                )])
            }
            status => Err(DomainError::invalid_state_transition(format!(
                "quest is {status:?}"
            ))),
        }
    }

    /// Feed one emitted event through every active quest of the acting
    /// player. Returns follow-up events (objective updates, completions).
    pub fn observe(&mut self, event: &GameEvent) -> Vec<GameEvent> {
        let mut follow_ups = Vec::new();

        // (quest, objective index, delta) tuples to apply after matching,
        // so the borrow of `self.quests` ends first
        let mut advances: Vec<(QuestId, usize)> = Vec::new();

        for quest in self.quests.values() {
            if quest.status != QuestStatus::Active {
                continue;
            }
            for (index, objective) in quest.objectives.iter().enumerate() {
                if objective.is_complete() {
                    continue;
                }
                let matched = match (&objective.kind, &event.kind) {
                    (
                        ObjectiveKind::Kill { template },
                        EventKind::EntityDefeated {
                            template: defeated, ..
                        },
                    ) => event.source == Some(quest.owner) && template == defeated,
                    (
                        ObjectiveKind::Fetch { template },
                        EventKind::ItemAcquired {
                            template: acquired, ..
                        },
                    ) => event.target == Some(quest.owner) && template == acquired,
                    (
                        ObjectiveKind::Explore { position, radius },
                        EventKind::LocationReached { position: reached },
                    ) => {
                        event.source == Some(quest.owner)
                            && position.distance_squared(reached)
                                <= (*radius as u64) * (*radius as u64)
                    }
                    (
                        ObjectiveKind::Escort { ward, position },
                        EventKind::LocationReached { position: reached },
                    ) => event.source == Some(*ward) && position.same_tile(reached),
                    _ => false,
                };
                if matched {
                    advances.push((quest.id, index));
                }
            }
        }

        for (quest_id, index) in advances {
            if let Ok(events) = self.update_objective(quest_id, index, 1) {
                follow_ups.extend(events);
            }
        }
        follow_ups
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill_quest(owner: EntityId, required: u32) -> Quest {
        Quest::new(
            "Rat Problem",
            "Clear the cellar of giant rats.",
            owner,
            vec![Objective::new(
                "Defeat giant rats",
                ObjectiveKind::Kill {
                    template: "giant_rat".into(),
                },
                required,
            )],
            QuestRewards {
                experience: 100,
                gold: 10,
                items: vec![],
            },
        )
    }

    #[test]
    fn test_start_and_query() {
        let owner = EntityId::new();
        let mut log = QuestLog::new();
        let quest = kill_quest(owner, 3);
        let id = quest.id;
        let events = log.start(quest).expect("starts");
        assert!(matches!(events[0].kind, EventKind::QuestStarted { .. }));
        assert_eq!(log.active(owner).len(), 1);
        assert_eq!(log.get(id).expect("exists").status, QuestStatus::Active);
    }

    #[test]
    fn test_progress_saturates_at_required() {
        let owner = EntityId::new();
        let mut log = QuestLog::new();
        let quest = kill_quest(owner, 2);
        let id = quest.id;
        log.start(quest).expect("starts");

        log.update_objective(id, 0, 100).expect("updates");
        let quest = log.get(id).expect("exists");
        assert_eq!(quest.objectives[0].progress, 2);
        assert_eq!(quest.status, QuestStatus::Completed);
    }

    #[test]
    fn test_observe_matches_kill_events() {
        let owner = EntityId::new();
        let victim = EntityId::new();
        let mut log = QuestLog::new();
        let quest = kill_quest(owner, 2);
        let id = quest.id;
        log.start(quest).expect("starts");

        let kill = GameEvent::targeted(
            owner,
            victim,
            EventKind::EntityDefeated {
                template: "giant_rat".into(),
                xp_awarded: 25,
            },
        );
        let events = log.observe(&kill);
        assert!(matches!(
            events[0].kind,
            EventKind::ObjectiveUpdated { progress: 1, .. }
        ));

        // someone else's kill does not count
        let other_kill = GameEvent::targeted(
            EntityId::new(),
            victim,
            EventKind::EntityDefeated {
                template: "giant_rat".into(),
                xp_awarded: 25,
            },
        );
        assert!(log.observe(&other_kill).is_empty());

        // second kill completes
        let events = log.observe(&kill);
        assert!(events
            .iter()
            .any(|event| matches!(event.kind, EventKind::QuestCompleted { .. })));
        assert_eq!(log.completed(owner).len(), 1);
        assert_eq!(log.get(id).expect("exists").status, QuestStatus::Completed);
    }

    #[test]
    fn test_explore_objective_radius() {
        let owner = EntityId::new();
        let mut log = QuestLog::new();
        let quest = Quest::new(
            "Scout the Gate",
            "Find the old gate.",
            owner,
            vec![Objective::new(
                "Reach the gate",
                ObjectiveKind::Explore {
                    position: Position::new(10, 10, 0),
                    radius: 2,
                },
                1,
            )],
            QuestRewards::default(),
        );
        log.start(quest).expect("starts");

        let near = GameEvent::from_source(
            owner,
            EventKind::LocationReached {
                position: Position::new(11, 10, 0),
            },
        );
        let events = log.observe(&near);
        assert!(events
            .iter()
            .any(|event| matches!(event.kind, EventKind::QuestCompleted { .. })));
    }

    #[test]
    fn test_fail_is_terminal() {
        let owner = EntityId::new();
        let mut log = QuestLog::new();
        let quest = kill_quest(owner, 1);
        let id = quest.id;
        log.start(quest).expect("starts");

        log.fail(id).expect("fails");
        assert!(log.update_objective(id, 0, 1).is_err());
        assert!(log.complete(id).is_err());
        assert!(log.fail(id).is_err());
        assert_eq!(log.get(id).expect("exists").status, QuestStatus::Failed);
    }
}
