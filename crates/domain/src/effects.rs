//! Durative effects: buffs, damage-over-time, stuns, and their stacking.
//!
//! Effects are owned by their target and live in the `EffectEngine`, which
//! advances them at round boundaries, turn boundaries, or wall-clock ticks
//! depending on the duration unit. Ticking never touches the world
//! directly; it returns the health pulses for the caller to apply under
//! the world write lock, keeping tick application and event emission in
//! one mutation path.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::character::{Attribute, Attributes, ATTRIBUTE_MAX, ATTRIBUTE_MIN};
use crate::ids::{EffectId, EntityId};

/// What an effect does to its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    /// Damage each tick
    DamageOverTime,
    /// Healing each tick
    HealOverTime,
    /// Additive modifier to one attribute while active
    StatModifier { attribute: Attribute },
    /// Target cannot act
    Stun,
    /// Target cannot move
    Root,
    /// Named effect with no built-in tick semantics
    Custom { name: String },
}

impl EffectKind {
    /// Default stacking policy for this kind. Custom kinds default to
    /// refresh.
    pub fn default_stack_rule(&self) -> StackRule {
        match self {
            Self::DamageOverTime | Self::HealOverTime => StackRule::Independent,
            Self::StatModifier { .. } => StackRule::StackUpTo(3),
            Self::Stun | Self::Root => StackRule::Refresh,
            Self::Custom { .. } => StackRule::Refresh,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::DamageOverTime => "damage_over_time",
            Self::HealOverTime => "heal_over_time",
            Self::StatModifier { .. } => "stat_modifier",
            Self::Stun => "stun",
            Self::Root => "root",
            Self::Custom { name } => name,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remaining duration, in one of three tick bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "amount", rename_all = "snake_case")]
pub enum EffectDuration {
    /// Combat rounds; ticks at each round boundary
    Rounds(u32),
    /// Participant turns; ticks at each turn boundary
    Turns(u32),
    /// Wall-clock ticks (one per second), advanced by the scheduler
    RealTime(u32),
}

impl EffectDuration {
    /// Which tick basis advances this duration.
    pub fn basis(&self) -> TickBasis {
        match self {
            Self::Rounds(_) => TickBasis::Round,
            Self::Turns(_) => TickBasis::Turn,
            Self::RealTime(_) => TickBasis::RealTime,
        }
    }

    /// Remaining units regardless of basis, for stacking comparisons.
    pub fn remaining_units(&self) -> u32 {
        match self {
            Self::Rounds(n) | Self::Turns(n) | Self::RealTime(n) => *n,
        }
    }

    fn decremented(self) -> Self {
        match self {
            Self::Rounds(n) => Self::Rounds(n.saturating_sub(1)),
            Self::Turns(n) => Self::Turns(n.saturating_sub(1)),
            Self::RealTime(n) => Self::RealTime(n.saturating_sub(1)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_units() == 0
    }

    /// Same basis with the larger remaining amount (refresh semantics).
    fn max_units(self, other: Self) -> Self {
        if other.remaining_units() > self.remaining_units() {
            other
        } else {
            self
        }
    }
}

/// The three tick drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickBasis {
    Round,
    Turn,
    RealTime,
}

/// How repeated applications of the same effect interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "limit", rename_all = "snake_case")]
pub enum StackRule {
    /// A new effect of the same kind+source removes the old one
    Replace,
    /// Keep existing magnitude, reset duration to max(existing, new)
    Refresh,
    /// Up to N instances; the (N+1)-th replaces the shortest-lived
    StackUpTo(u8),
    /// Any number of instances coexist
    Independent,
}

/// A reusable effect description carried by items and spells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectTemplate {
    #[serde(flatten)]
    pub kind: EffectKind,
    pub magnitude: i32,
    pub duration: EffectDuration,
    #[serde(default)]
    pub stack_rule: Option<StackRule>,
}

impl EffectTemplate {
    pub fn new(kind: EffectKind, magnitude: i32, duration: EffectDuration) -> Self {
        Self {
            kind,
            magnitude,
            duration,
            stack_rule: None,
        }
    }

    /// Instantiate onto a target.
    pub fn instantiate(&self, source: EntityId, target: EntityId) -> Effect {
        Effect {
            id: EffectId::new(),
            source,
            target,
            kind: self.kind.clone(),
            magnitude: self.magnitude,
            remaining: self.duration,
            stack_rule: self
                .stack_rule
                .unwrap_or_else(|| self.kind.default_stack_rule()),
        }
    }
}

/// A live effect instance, owned by its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub id: EffectId,
    pub source: EntityId,
    pub target: EntityId,
    #[serde(flatten)]
    pub kind: EffectKind,
    pub magnitude: i32,
    pub remaining: EffectDuration,
    pub stack_rule: StackRule,
}

/// Outcome of applying an effect under its stacking rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOutcome {
    /// New instance added
    Applied(EffectId),
    /// Old instance removed, new instance added
    Replaced { removed: EffectId, added: EffectId },
    /// Existing instance kept with extended duration; new one discarded
    Refreshed(EffectId),
}

impl StackOutcome {
    /// The id now active as a result of the application.
    pub fn active_id(&self) -> EffectId {
        match self {
            Self::Applied(id) | Self::Refreshed(id) => *id,
            Self::Replaced { added, .. } => *added,
        }
    }
}

/// One DoT/HoT pulse produced by a tick, to be applied to the target's
/// health by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPulse {
    pub effect: EffectId,
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EffectKind,
    pub magnitude: i32,
}

/// Everything a tick produced: pulses to apply, then effects that expired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub pulses: Vec<EffectPulse>,
    pub expired: Vec<Effect>,
}

/// Holds all active effects, keyed by target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectEngine {
    active: HashMap<EntityId, Vec<Effect>>,
}

impl EffectEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an effect under its stacking rule.
    pub fn apply(&mut self, effect: Effect) -> StackOutcome {
        let effects = self.active.entry(effect.target).or_default();

        match effect.stack_rule {
            StackRule::Independent => {
                let id = effect.id;
                effects.push(effect);
                StackOutcome::Applied(id)
            }
            StackRule::Replace => {
                let removed = effects
                    .iter()
                    .position(|e| e.kind == effect.kind && e.source == effect.source)
                    .map(|index| effects.remove(index).id);
                let added = effect.id;
                effects.push(effect);
                match removed {
                    Some(removed) => StackOutcome::Replaced { removed, added },
                    None => StackOutcome::Applied(added),
                }
            }
            StackRule::Refresh => {
                if let Some(existing) = effects
                    .iter_mut()
                    .find(|e| e.kind == effect.kind && e.source == effect.source)
                {
                    existing.remaining = existing.remaining.max_units(effect.remaining);
                    StackOutcome::Refreshed(existing.id)
                } else {
                    let id = effect.id;
                    effects.push(effect);
                    StackOutcome::Applied(id)
                }
            }
            StackRule::StackUpTo(limit) => {
                let instances: Vec<usize> = effects
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.kind == effect.kind && e.source == effect.source)
                    .map(|(index, _)| index)
                    .collect();
                if instances.len() >= limit.max(1) as usize {
                    // replace the shortest-lived instance
                    let shortest = instances
                        .into_iter()
                        .min_by_key(|index| effects[*index].remaining.remaining_units())
                        .map(|index| effects.remove(index).id);
                    let added = effect.id;
                    effects.push(effect);
                    match shortest {
                        Some(removed) => StackOutcome::Replaced { removed, added },
                        None => StackOutcome::Applied(added),
                    }
                } else {
                    let id = effect.id;
                    effects.push(effect);
                    StackOutcome::Applied(id)
                }
            }
        }
    }

    /// Advance every effect on the given basis: emit its pulse, decrement
    /// its duration, and retire it at zero. Expired effects are removed
    /// before any later observer can see them.
    pub fn tick(&mut self, basis: TickBasis) -> TickReport {
        let mut report = TickReport::default();

        for effects in self.active.values_mut() {
            for effect in effects.iter_mut() {
                if effect.remaining.basis() != basis {
                    continue;
                }
                match effect.kind {
                    EffectKind::DamageOverTime | EffectKind::HealOverTime => {
                        report.pulses.push(EffectPulse {
                            effect: effect.id,
                            source: effect.source,
                            target: effect.target,
                            kind: effect.kind.clone(),
                            magnitude: effect.magnitude,
                        });
                    }
                    _ => {}
                }
                effect.remaining = effect.remaining.decremented();
            }
            effects.retain(|effect| {
                if effect.remaining.is_expired() {
                    report.expired.push(effect.clone());
                    false
                } else {
                    true
                }
            });
        }
        self.active.retain(|_, effects| !effects.is_empty());
        report
    }

    /// Active effects on a target, in application order.
    pub fn active_on(&self, target: EntityId) -> &[Effect] {
        self.active.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_stunned(&self, target: EntityId) -> bool {
        self.active_on(target)
            .iter()
            .any(|effect| effect.kind == EffectKind::Stun)
    }

    pub fn is_rooted(&self, target: EntityId) -> bool {
        self.active_on(target)
            .iter()
            .any(|effect| effect.kind == EffectKind::Root)
    }

    /// Sum of all active modifiers for one attribute on a target.
    pub fn modifier_total(&self, target: EntityId, attribute: Attribute) -> i32 {
        self.active_on(target)
            .iter()
            .filter(|effect| {
                matches!(&effect.kind, EffectKind::StatModifier { attribute: a } if *a == attribute)
            })
            .map(|effect| effect.magnitude)
            .sum()
    }

    /// Base score plus modifiers, clamped to the legal attribute range.
    pub fn effective_attribute(
        &self,
        target: EntityId,
        attributes: &Attributes,
        attribute: Attribute,
    ) -> i32 {
        (attributes.get(attribute) + self.modifier_total(target, attribute))
            .clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX)
    }

    /// Remove a single effect (dispel). Returns it if it was active.
    pub fn remove(&mut self, effect_id: EffectId) -> Option<Effect> {
        for effects in self.active.values_mut() {
            if let Some(index) = effects.iter().position(|effect| effect.id == effect_id) {
                let effect = effects.remove(index);
                self.active.retain(|_, list| !list.is_empty());
                return Some(effect);
            }
        }
        None
    }

    /// Drop every effect on a target (death, removal from world).
    pub fn clear_target(&mut self, target: EntityId) -> Vec<Effect> {
        self.active.remove(&target).unwrap_or_default()
    }

    pub fn total_active(&self) -> usize {
        self.active.values().map(Vec::len).sum()
    }
}
