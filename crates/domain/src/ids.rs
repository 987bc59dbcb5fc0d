use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// World entities (players, NPCs, static objects)
define_id!(EntityId);

// Client sessions
define_id!(SessionId);

// Items and effects
define_id!(ItemId);
define_id!(EffectId);

// Spells (catalogue entries, immutable after startup)
define_id!(SpellId);

// Quests
define_id!(QuestId);

// Combat encounters
define_id!(EncounterId);

// Generated dungeon complexes
define_id!(ComplexId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_round_trip() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().expect("valid uuid string");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_id_ordering_is_uuid_ordering() {
        let a = EntityId::from_uuid(Uuid::from_u128(1));
        let b = EntityId::from_uuid(Uuid::from_u128(2));
        assert!(a < b);
    }
}
