//! Unified error types for the domain layer
//!
//! Provides a common error type usable across all domain operations, so
//! adapters never have to fall back to String or anyhow. Variants map onto
//! the server's error taxonomy: validation, conflict, and resource errors
//! are all reportable to the caller without any state change.

use thiserror::Error;

use crate::dice::DiceParseError;
use crate::position::Position;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Position lies outside the world bounds
    #[error("Position out of bounds: {0}")]
    OutOfBounds(Position),

    /// Destination tile is unwalkable or occupied
    #[error("Tile blocked at {0}: {reason}", reason = .1)]
    Blocked(Position, String),

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Actor tried to act outside its combat turn
    #[error("Not this entity's turn: {0}")]
    NotYourTurn(String),

    /// Action requires an active combat encounter
    #[error("No active combat encounter")]
    NotInCombat,

    /// Target is beyond the ability's range
    #[error("Target out of range: distance {distance}, maximum {max}")]
    NotInRange { distance: u32, max: u32 },

    /// Line of sight to the target is obstructed
    #[error("No line of sight to target")]
    NoLineOfSight,

    /// Caster/user lacks the required resource
    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    /// Target cannot receive this action
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Target already carries a conflicting effect
    #[error("Target is already affected")]
    AlreadyAffected,

    /// Parse error (for value objects)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Create an invalid target error
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Whether this error reports a conflict with current world state
    /// (rejected without any state change) rather than bad input.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Blocked(..)
                | Self::Constraint(_)
                | Self::InvalidStateTransition(_)
                | Self::NotYourTurn(_)
                | Self::AlreadyAffected
        )
    }
}

impl From<DiceParseError> for DomainError {
    fn from(err: DiceParseError) -> Self {
        Self::Parse(err.to_string())
    }
}
