//! The authoritative world: tile grids per level, the entity table, and
//! the spatial index.
//!
//! All mutators are `&mut self`; the engine reaches them only while
//! holding the world write lock. Movement and placement validate bounds,
//! walkability, and occupancy, and update the spatial index inside the
//! same call so the index never reports a stale position.

pub mod spatial;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::Entity;
use crate::error::DomainError;
use crate::ids::EntityId;
use crate::position::Position;

pub use spatial::SpatialIndex;

/// Terrain of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    Floor,
    Corridor,
    Wall,
    Door,
    Water,
    Lava,
    StairsUp,
    StairsDown,
    Portal,
    Rubble,
}

impl TerrainType {
    /// Default walkability for freshly carved tiles.
    pub fn default_walkable(&self) -> bool {
        !matches!(self, Self::Wall | Self::Rubble)
    }

    /// Whether multiple blocking entities may share this tile.
    pub fn allows_colocation(&self) -> bool {
        matches!(self, Self::Portal | Self::StairsUp | Self::StairsDown)
    }

    /// Whether the tile blocks line of sight.
    pub fn blocks_sight(&self) -> bool {
        matches!(self, Self::Wall | Self::Door | Self::Rubble)
    }

    /// Movement cost in action-point tenths; water slows, lava burns.
    pub fn movement_cost(&self) -> u32 {
        match self {
            Self::Water => 2,
            Self::Rubble => 3,
            _ => 1,
        }
    }
}

/// One tile of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub terrain: TerrainType,
    pub walkable: bool,
}

impl Tile {
    pub fn new(terrain: TerrainType) -> Self {
        Self {
            terrain,
            walkable: terrain.default_walkable(),
        }
    }

    pub fn wall() -> Self {
        Self::new(TerrainType::Wall)
    }

    pub fn floor() -> Self {
        Self::new(TerrainType::Floor)
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::floor()
    }
}

/// One dungeon level's tile grid, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLevel {
    pub width: u32,
    pub height: u32,
    tiles: Vec<Tile>,
}

impl MapLevel {
    pub fn filled(width: u32, height: u32, tile: Tile) -> Self {
        Self {
            width,
            height,
            tiles: vec![tile; (width * height) as usize],
        }
    }

    pub fn open(width: u32, height: u32) -> Self {
        Self::filled(width, height, Tile::floor())
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as u32 * self.width + x as u32) as usize)
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<&Tile> {
        self.index(x, y).map(|i| &self.tiles[i])
    }

    pub fn tile_mut(&mut self, x: i32, y: i32) -> Option<&mut Tile> {
        self.index(x, y).map(move |i| &mut self.tiles[i])
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.tile(x, y).map(|tile| tile.walkable).unwrap_or(false)
    }
}

/// The authoritative game world.
///
/// The spatial index is derived state: it is skipped by serde and rebuilt
/// from the entity table on snapshot load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub width: u32,
    pub height: u32,
    levels: Vec<MapLevel>,
    entities: HashMap<EntityId, Entity>,
    /// Global turn counter, advanced once per completed combat round
    pub turn: u64,
    #[serde(skip)]
    spatial: SpatialIndex,
}

impl World {
    /// An open world of the given size; every tile walkable floor.
    pub fn open(width: u32, height: u32, level_count: u8) -> Self {
        let levels = (0..level_count.max(1))
            .map(|_| MapLevel::open(width, height))
            .collect();
        Self {
            width,
            height,
            levels,
            entities: HashMap::new(),
            turn: 0,
            spatial: SpatialIndex::new(),
        }
    }

    pub fn from_levels(levels: Vec<MapLevel>) -> Result<Self, DomainError> {
        let first = levels
            .first()
            .ok_or_else(|| DomainError::validation("world needs at least one level"))?;
        Ok(Self {
            width: first.width,
            height: first.height,
            levels,
            entities: HashMap::new(),
            turn: 0,
            spatial: SpatialIndex::new(),
        })
    }

    pub fn level_count(&self) -> u8 {
        self.levels.len() as u8
    }

    pub fn level(&self, level: u8) -> Option<&MapLevel> {
        self.levels.get(level as usize)
    }

    pub fn level_mut(&mut self, level: u8) -> Option<&mut MapLevel> {
        self.levels.get_mut(level as usize)
    }

    pub fn in_bounds(&self, position: &Position) -> bool {
        self.level(position.level)
            .map(|lvl| {
                position.x >= 0
                    && position.y >= 0
                    && position.x < lvl.width as i32
                    && position.y < lvl.height as i32
            })
            .unwrap_or(false)
    }

    pub fn tile(&self, position: &Position) -> Option<&Tile> {
        self.level(position.level)?.tile(position.x, position.y)
    }

    pub fn set_tile(&mut self, position: &Position, tile: Tile) -> bool {
        match self.level_mut(position.level) {
            Some(level) => level.set_tile(position.x, position.y, tile),
            None => false,
        }
    }

    pub fn is_walkable(&self, position: &Position) -> bool {
        self.tile(position).map(|tile| tile.walkable).unwrap_or(false)
    }

    /// The blocking entity on a tile, if any.
    pub fn blocking_occupant(&self, position: &Position) -> Option<EntityId> {
        self.spatial
            .at_tile(position.level, position.x, position.y)
            .iter()
            .copied()
            .find(|id| {
                self.entities
                    .get(id)
                    .map(Entity::blocks_movement)
                    .unwrap_or(false)
            })
    }

    fn tile_accepts(&self, position: &Position, mover_blocks: bool) -> Result<(), DomainError> {
        let tile = self
            .tile(position)
            .ok_or(DomainError::OutOfBounds(*position))?;
        if !tile.walkable {
            return Err(DomainError::Blocked(
                *position,
                "tile is not walkable".into(),
            ));
        }
        if mover_blocks && !tile.terrain.allows_colocation() {
            if let Some(occupant) = self.blocking_occupant(position) {
                return Err(DomainError::Blocked(
                    *position,
                    format!("tile occupied by {occupant}"),
                ));
            }
        }
        Ok(())
    }

    /// Add an entity to the world at its stored position.
    pub fn place_entity(&mut self, entity: Entity) -> Result<EntityId, DomainError> {
        let id = entity.id();
        let position = entity.position();
        if self.entities.contains_key(&id) {
            return Err(DomainError::constraint(format!(
                "entity {id} already placed"
            )));
        }
        self.tile_accepts(&position, entity.blocks_movement())?;
        self.spatial.insert(id, position);
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Move an entity, validating bounds, walkability, and occupancy. The
    /// spatial index and the stored position change together.
    pub fn move_entity(&mut self, id: EntityId, new_position: Position) -> Result<(), DomainError> {
        let blocks = {
            let entity = self
                .entities
                .get(&id)
                .ok_or_else(|| DomainError::not_found("Entity", id))?;
            entity.blocks_movement()
        };
        self.tile_accepts(&new_position, blocks)?;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_position(new_position);
        }
        self.spatial.update(id, new_position);
        Ok(())
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.spatial.remove(id);
        self.entities.remove(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access for non-positional changes (health, inventory).
    /// Position changes must go through `move_entity`.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_where<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Entity>
    where
        P: Fn(&Entity) -> bool + 'a,
    {
        self.entities.values().filter(move |entity| predicate(entity))
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Rebuild the spatial index from the entity table (snapshot load).
    pub fn rebuild_spatial_index(&mut self) {
        self.spatial = SpatialIndex::new();
        for (id, entity) in &self.entities {
            self.spatial.insert(*id, entity.position());
        }
    }

    /// Line of sight between two tiles on the same level, traced with
    /// Bresenham's algorithm. Endpoints never block themselves.
    pub fn line_of_sight(&self, from: &Position, to: &Position) -> bool {
        if from.level != to.level {
            return false;
        }
        let level = match self.level(from.level) {
            Some(level) => level,
            None => return false,
        };

        let (mut x, mut y) = (from.x, from.y);
        let (x1, y1) = (to.x, to.y);
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            if (x, y) == (x1, y1) {
                return true;
            }
            // skip the starting tile; intermediate tiles must not block
            if (x, y) != (from.x, from.y) {
                if let Some(tile) = level.tile(x, y) {
                    if tile.terrain.blocks_sight() {
                        return false;
                    }
                } else {
                    return false;
                }
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "World {}x{} ({} levels, {} entities, turn {})",
            self.width,
            self.height,
            self.level_count(),
            self.entity_count(),
            self.turn
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Attributes;
    use crate::entities::ObjectKind;

    fn npc_at(x: i32, y: i32) -> Entity {
        Entity::npc(
            "goblin",
            "Goblin",
            Position::new(x, y, 0),
            1,
            Attributes::default(),
            true,
        )
    }

    #[test]
    fn test_place_and_move() {
        let mut world = World::open(10, 10, 1);
        let id = world.place_entity(npc_at(2, 2)).expect("places");

        world.move_entity(id, Position::new(3, 2, 0)).expect("moves");
        let entity = world.entity(id).expect("exists");
        assert_eq!(entity.position(), Position::new(3, 2, 0));
        assert_eq!(world.spatial().position_of(id), Some(entity.position()));
    }

    #[test]
    fn test_move_out_of_bounds() {
        let mut world = World::open(4, 4, 1);
        let id = world.place_entity(npc_at(0, 0)).expect("places");
        let err = world.move_entity(id, Position::new(-1, 0, 0));
        assert!(matches!(err, Err(DomainError::OutOfBounds(_))));
    }

    #[test]
    fn test_move_into_occupied_tile_is_blocked() {
        let mut world = World::open(10, 10, 1);
        let a = world.place_entity(npc_at(2, 2)).expect("places");
        world.place_entity(npc_at(3, 2)).expect("places");

        let err = world.move_entity(a, Position::new(3, 2, 0));
        assert!(matches!(err, Err(DomainError::Blocked(..))));
        // neither entity moved
        assert_eq!(
            world.entity(a).expect("a").position(),
            Position::new(2, 2, 0)
        );
    }

    #[test]
    fn test_colocation_allowed_on_portal() {
        let mut world = World::open(10, 10, 1);
        world.set_tile(&Position::new(5, 5, 0), Tile::new(TerrainType::Portal));
        world.place_entity(npc_at(5, 5)).expect("places first");
        let second = npc_at(5, 5);
        world.place_entity(second).expect("portal permits co-location");
    }

    #[test]
    fn test_non_blocking_object_does_not_block() {
        let mut world = World::open(10, 10, 1);
        world
            .place_entity(Entity::object(
                "Fountain",
                Position::new(4, 4, 0),
                ObjectKind::Fountain,
                false,
            ))
            .expect("places");
        let id = world.place_entity(npc_at(3, 4)).expect("places");
        world.move_entity(id, Position::new(4, 4, 0)).expect("moves onto fountain");
    }

    #[test]
    fn test_wall_blocks_movement_and_sight() {
        let mut world = World::open(10, 10, 1);
        world.set_tile(&Position::new(5, 5, 0), Tile::wall());
        let id = world.place_entity(npc_at(4, 5)).expect("places");
        assert!(world.move_entity(id, Position::new(5, 5, 0)).is_err());

        assert!(!world.line_of_sight(&Position::new(3, 5, 0), &Position::new(7, 5, 0)));
        assert!(world.line_of_sight(&Position::new(3, 4, 0), &Position::new(7, 4, 0)));
    }

    #[test]
    fn test_index_and_table_agree_after_mutations() {
        let mut world = World::open(12, 12, 2);
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(world.place_entity(npc_at(i, i)).expect("places"));
        }
        world.move_entity(ids[0], Position::new(9, 9, 0)).expect("moves");
        world.remove_entity(ids[1]);

        // every entity indexed exactly at its stored position
        for entity in world.entities() {
            assert_eq!(
                world.spatial().position_of(entity.id()),
                Some(entity.position())
            );
        }
        assert_eq!(world.spatial().len(), world.entity_count());
    }

    #[test]
    fn test_rebuild_spatial_index() {
        let mut world = World::open(8, 8, 1);
        let id = world.place_entity(npc_at(1, 1)).expect("places");
        world.rebuild_spatial_index();
        assert_eq!(world.spatial().position_of(id), Some(Position::new(1, 1, 0)));
    }
}
