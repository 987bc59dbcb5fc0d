//! Seeded multi-level dungeon generation.
//!
//! Rooms are placed without overlap inside each level's bounds, corridors
//! connect them at the configured connectivity, and every adjacent pair
//! of levels gets at least one stair connection, so the level graph is
//! always connected. Reachability of every room from the level's entry is
//! validated with a flood fill and repaired by direct carving before the
//! complex is returned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::path::flood_fill;
use super::{Connectivity, Deadline, Difficulty, DungeonTheme, GenerationParams, PcgError};
use crate::error::DomainError;
use crate::ids::ComplexId;
use crate::position::Position;
use crate::world::{MapLevel, TerrainType, Tile, World};

/// What a room is for; drives population and loot placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Entry,
    Chamber,
    Treasure,
    Shrine,
    Barracks,
    Library,
    Lair,
}

/// A rectangular room, in tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub room_type: RoomType,
}

impl Room {
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    /// Overlap test with a safety margin so rooms never share walls.
    fn intersects(&self, other: &Room, margin: i32) -> bool {
        self.x - margin < other.x + other.width as i32
            && other.x - margin < self.x + self.width as i32
            && self.y - margin < other.y + other.height as i32
            && other.y - margin < self.y + self.height as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Stairs,
    Ladder,
}

/// A two-way connection between levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConnection {
    pub kind: ConnectionKind,
    pub from_level: u8,
    pub from: (i32, i32),
    pub to_level: u8,
    pub to: (i32, i32),
}

/// One generated level: its tile grid plus the room layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonLevel {
    pub level: u8,
    pub map: MapLevel,
    pub rooms: Vec<Room>,
    /// Index into `rooms` of the entry room
    pub entry_room: usize,
}

impl DungeonLevel {
    pub fn entry_center(&self) -> (i32, i32) {
        self.rooms[self.entry_room].center()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexMetadata {
    /// Rooms per level, in level order
    pub room_counts: Vec<u32>,
    pub difficulty: Difficulty,
    pub theme: DungeonTheme,
    pub generated_at: DateTime<Utc>,
}

/// A generated multi-level dungeon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonComplex {
    pub id: ComplexId,
    pub name: String,
    pub levels: BTreeMap<u8, DungeonLevel>,
    pub connections: Vec<LevelConnection>,
    pub metadata: ComplexMetadata,
}

impl DungeonComplex {
    /// Entry position of the whole complex: the entry room of level 0.
    pub fn entry_position(&self) -> Option<Position> {
        self.levels.get(&0).map(|level| {
            let (x, y) = level.entry_center();
            Position::new(x, y, 0)
        })
    }

    /// Whether the `LevelConnection` endpoints form a connected graph
    /// over the levels.
    pub fn level_graph_connected(&self) -> bool {
        let level_count = self.levels.len();
        if level_count <= 1 {
            return true;
        }
        let mut reached = vec![false; level_count];
        let mut stack = vec![0u8];
        reached[0] = true;
        while let Some(current) = stack.pop() {
            for connection in &self.connections {
                let next = if connection.from_level == current {
                    Some(connection.to_level)
                } else if connection.to_level == current {
                    Some(connection.from_level)
                } else {
                    None
                };
                if let Some(next) = next {
                    if let Some(flag) = reached.get_mut(next as usize) {
                        if !*flag {
                            *flag = true;
                            stack.push(next);
                        }
                    }
                }
            }
        }
        reached.into_iter().all(|flag| flag)
    }

    /// Assemble the world grid from the generated levels.
    pub fn to_world(&self) -> Result<World, DomainError> {
        let levels: Vec<MapLevel> = self
            .levels
            .values()
            .map(|level| level.map.clone())
            .collect();
        World::from_levels(levels)
    }
}

/// Generate a dungeon complex from the params. Deterministic per seed:
/// two calls with equal seed and constraints differ only in ids and the
/// metadata timestamp.
pub fn generate(params: &GenerationParams) -> Result<DungeonComplex, PcgError> {
    let constraints = params.constraints.dungeon;
    if constraints.levels == 0 {
        return Err(PcgError::InvalidConstraints("levels must be >= 1".into()));
    }
    if constraints.width < 16 || constraints.height < 16 {
        return Err(PcgError::InvalidConstraints(
            "dungeon must be at least 16x16".into(),
        ));
    }
    let area = constraints.width * constraints.height;
    if constraints.rooms_per_level * 100 > area {
        return Err(PcgError::InvalidConstraints(format!(
            "{} rooms cannot fit a {}x{} level",
            constraints.rooms_per_level, constraints.width, constraints.height
        )));
    }

    let deadline = Deadline::from_timeout(params.timeout);
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut levels = BTreeMap::new();
    for level_number in 0..constraints.levels {
        if deadline.expired() {
            return Err(PcgError::Timeout("dungeon generation"));
        }
        let level = generate_level(&mut rng, level_number, params, &deadline)?;
        levels.insert(level_number, level);
    }

    // one stair connection per adjacent level pair keeps the graph connected
    let mut connections = Vec::new();
    for upper in 0..constraints.levels.saturating_sub(1) {
        let lower = upper + 1;
        let from = pick_connection_tile(&mut rng, &levels[&upper]);
        let to = pick_connection_tile(&mut rng, &levels[&lower]);
        if let Some(level) = levels.get_mut(&upper) {
            level
                .map
                .set_tile(from.0, from.1, Tile::new(TerrainType::StairsDown));
        }
        if let Some(level) = levels.get_mut(&lower) {
            level
                .map
                .set_tile(to.0, to.1, Tile::new(TerrainType::StairsUp));
        }
        connections.push(LevelConnection {
            kind: ConnectionKind::Stairs,
            from_level: upper,
            from,
            to_level: lower,
            to,
        });
    }

    let room_counts = levels
        .values()
        .map(|level| level.rooms.len() as u32)
        .collect();

    Ok(DungeonComplex {
        id: ComplexId::new(),
        name: complex_name(&mut rng, constraints.theme),
        levels,
        connections,
        metadata: ComplexMetadata {
            room_counts,
            difficulty: params.difficulty,
            theme: constraints.theme,
            generated_at: Utc::now(),
        },
    })
}

fn generate_level(
    rng: &mut StdRng,
    level_number: u8,
    params: &GenerationParams,
    deadline: &Deadline,
) -> Result<DungeonLevel, PcgError> {
    let constraints = params.constraints.dungeon;
    let (width, height) = (constraints.width, constraints.height);
    let mut map = MapLevel::filled(width, height, Tile::wall());

    // room placement: rejection sampling with a one-tile margin
    let mut rooms: Vec<Room> = Vec::new();
    let wanted = constraints.rooms_per_level.max(2);
    let mut attempts = 0u32;
    let max_attempts = wanted * 60;

    while rooms.len() < wanted as usize && attempts < max_attempts {
        if deadline.expired() {
            return Err(PcgError::Timeout("room placement"));
        }
        attempts += 1;
        let room_width = rng.gen_range(4..=9u32).min(width - 4);
        let room_height = rng.gen_range(4..=7u32).min(height - 4);
        let x = rng.gen_range(1..(width - room_width - 1)) as i32;
        let y = rng.gen_range(1..(height - room_height - 1)) as i32;
        let candidate = Room {
            x,
            y,
            width: room_width,
            height: room_height,
            room_type: RoomType::Chamber,
        };
        if rooms.iter().any(|room| room.intersects(&candidate, 1)) {
            continue;
        }
        rooms.push(candidate);
    }

    if rooms.len() < wanted as usize {
        return Err(PcgError::Exhausted(format!(
            "placed {} of {} rooms on level {}",
            rooms.len(),
            wanted,
            level_number
        )));
    }

    // first room is the entry; the rest draw from the theme's distribution
    rooms[0].room_type = RoomType::Entry;
    for room in rooms.iter_mut().skip(1) {
        room.room_type = themed_room_type(rng, constraints.theme);
    }

    for room in &rooms {
        carve_room(&mut map, room);
    }

    // spanning chain, then extra corridors per connectivity
    for i in 1..rooms.len() {
        carve_corridor(rng, &mut map, rooms[i - 1].center(), rooms[i].center());
    }
    let extra_share = constraints.connectivity.extra_share();
    if extra_share > 0.0 {
        for i in 0..rooms.len() {
            for j in (i + 2)..rooms.len() {
                if rng.gen_bool(extra_share) {
                    carve_corridor(rng, &mut map, rooms[i].center(), rooms[j].center());
                }
            }
        }
    }

    // every room must be reachable from the entry; carve straight repairs
    // for stragglers, then re-validate
    let entry = rooms[0].center();
    for _ in 0..2 {
        let reachable = flood_fill(width, height, |x, y| map.is_walkable(x, y), entry);
        let unreached: Vec<(i32, i32)> = rooms
            .iter()
            .map(Room::center)
            .filter(|center| !reachable.contains(center))
            .collect();
        if unreached.is_empty() {
            break;
        }
        for center in unreached {
            carve_corridor(rng, &mut map, entry, center);
        }
    }
    let reachable = flood_fill(width, height, |x, y| map.is_walkable(x, y), entry);
    if let Some(stranded) = rooms
        .iter()
        .map(Room::center)
        .find(|center| !reachable.contains(center))
    {
        return Err(PcgError::Exhausted(format!(
            "room at {stranded:?} unreachable on level {level_number}"
        )));
    }

    Ok(DungeonLevel {
        level: level_number,
        map,
        rooms,
        entry_room: 0,
    })
}

fn carve_room(map: &mut MapLevel, room: &Room) {
    for y in room.y..room.y + room.height as i32 {
        for x in room.x..room.x + room.width as i32 {
            map.set_tile(x, y, Tile::floor());
        }
    }
}

/// L-shaped corridor between two points; carves corridor tiles through
/// rock but leaves existing floor untouched.
fn carve_corridor(rng: &mut StdRng, map: &mut MapLevel, from: (i32, i32), to: (i32, i32)) {
    let horizontal_first = rng.gen_bool(0.5);
    let corner = if horizontal_first {
        (to.0, from.1)
    } else {
        (from.0, to.1)
    };
    carve_segment(map, from, corner);
    carve_segment(map, corner, to);
}

fn carve_segment(map: &mut MapLevel, from: (i32, i32), to: (i32, i32)) {
    let (mut x, mut y) = from;
    let dx = (to.0 - from.0).signum();
    let dy = (to.1 - from.1).signum();
    loop {
        if let Some(tile) = map.tile(x, y) {
            if !tile.walkable {
                map.set_tile(x, y, Tile::new(TerrainType::Corridor));
            }
        }
        if (x, y) == to {
            break;
        }
        if x != to.0 {
            x += dx;
        } else {
            y += dy;
        }
    }
}

fn themed_room_type(rng: &mut StdRng, theme: DungeonTheme) -> RoomType {
    // weighted draws per theme; chambers dominate everywhere
    let roll = rng.gen_range(0..100u32);
    match theme {
        DungeonTheme::Classic => match roll {
            0..=49 => RoomType::Chamber,
            50..=64 => RoomType::Treasure,
            65..=79 => RoomType::Barracks,
            80..=89 => RoomType::Shrine,
            90..=94 => RoomType::Library,
            _ => RoomType::Lair,
        },
        DungeonTheme::Crypt => match roll {
            0..=39 => RoomType::Chamber,
            40..=64 => RoomType::Shrine,
            65..=84 => RoomType::Lair,
            _ => RoomType::Treasure,
        },
        DungeonTheme::Cavern => match roll {
            0..=59 => RoomType::Chamber,
            60..=84 => RoomType::Lair,
            _ => RoomType::Treasure,
        },
        DungeonTheme::Fortress => match roll {
            0..=39 => RoomType::Chamber,
            40..=69 => RoomType::Barracks,
            70..=84 => RoomType::Library,
            _ => RoomType::Treasure,
        },
    }
}

fn pick_connection_tile(rng: &mut StdRng, level: &DungeonLevel) -> (i32, i32) {
    // stairs go inside a random room, off-centre so they rarely collide
    // with the entry tile
    let room = &level.rooms[rng.gen_range(0..level.rooms.len())];
    let x = rng.gen_range(room.x..room.x + room.width as i32);
    let y = rng.gen_range(room.y..room.y + room.height as i32);
    (x, y)
}

fn complex_name(rng: &mut StdRng, theme: DungeonTheme) -> String {
    const PREFIXES: [&str; 8] = [
        "Forgotten", "Sunken", "Black", "Howling", "Broken", "Silent", "Ashen", "Gilded",
    ];
    let noun = match theme {
        DungeonTheme::Classic => "Halls",
        DungeonTheme::Crypt => "Crypt",
        DungeonTheme::Cavern => "Caverns",
        DungeonTheme::Fortress => "Keep",
    };
    let prefix = PREFIXES[rng.gen_range(0..PREFIXES.len())];
    format!("The {prefix} {noun}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcg::{DungeonConstraints, GenerationConstraints};

    fn params(seed: u64) -> GenerationParams {
        GenerationParams::new(seed).with_constraints(GenerationConstraints {
            dungeon: DungeonConstraints {
                levels: 3,
                width: 40,
                height: 30,
                rooms_per_level: 6,
                theme: DungeonTheme::Classic,
                connectivity: Connectivity::Moderate,
            },
            items: Default::default(),
        })
    }

    #[test]
    fn test_generates_requested_shape() {
        let complex = generate(&params(12345)).expect("generates");
        assert_eq!(complex.levels.len(), 3);
        for level in complex.levels.values() {
            assert!(level.rooms.len() >= 6);
            assert_eq!(level.rooms[level.entry_room].room_type, RoomType::Entry);
        }
        assert!(complex.level_graph_connected());
        assert!(!complex.connections.is_empty());
    }

    #[test]
    fn test_same_seed_same_structure() {
        let a = generate(&params(12345)).expect("generates");
        let b = generate(&params(12345)).expect("generates");
        assert_eq!(a.name, b.name);
        assert_eq!(a.metadata.room_counts, b.metadata.room_counts);
        for (level_a, level_b) in a.levels.values().zip(b.levels.values()) {
            assert_eq!(level_a.rooms, level_b.rooms);
            assert_eq!(level_a.map, level_b.map);
        }
        assert_eq!(a.connections, b.connections);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate(&params(1)).expect("generates");
        let b = generate(&params(2)).expect("generates");
        let rooms_a: Vec<_> = a.levels[&0].rooms.clone();
        let rooms_b: Vec<_> = b.levels[&0].rooms.clone();
        assert_ne!(rooms_a, rooms_b);
    }

    #[test]
    fn test_rooms_do_not_overlap() {
        let complex = generate(&params(777)).expect("generates");
        for level in complex.levels.values() {
            for (i, a) in level.rooms.iter().enumerate() {
                for b in level.rooms.iter().skip(i + 1) {
                    assert!(!a.intersects(b, 0), "rooms {a:?} and {b:?} overlap");
                }
            }
        }
    }

    #[test]
    fn test_every_room_reachable_from_entry() {
        let complex = generate(&params(2024)).expect("generates");
        for level in complex.levels.values() {
            let map = &level.map;
            let region = flood_fill(
                map.width,
                map.height,
                |x, y| map.is_walkable(x, y),
                level.entry_center(),
            );
            for room in &level.rooms {
                assert!(
                    region.contains(&room.center()),
                    "room {room:?} unreachable on level {}",
                    level.level
                );
            }
        }
    }

    #[test]
    fn test_connections_land_on_walkable_stairs() {
        let complex = generate(&params(31337)).expect("generates");
        for connection in &complex.connections {
            let upper = &complex.levels[&connection.from_level].map;
            let lower = &complex.levels[&connection.to_level].map;
            assert!(upper.is_walkable(connection.from.0, connection.from.1));
            assert!(lower.is_walkable(connection.to.0, connection.to.1));
        }
    }

    #[test]
    fn test_complete_connectivity_has_more_floor() {
        let mut sparse = params(5);
        sparse.constraints.dungeon.connectivity = Connectivity::Low;
        let mut dense = params(5);
        dense.constraints.dungeon.connectivity = Connectivity::Complete;

        let count_floor = |complex: &DungeonComplex| {
            complex
                .levels
                .values()
                .map(|level| {
                    let map = &level.map;
                    (0..map.height as i32)
                        .flat_map(|y| (0..map.width as i32).map(move |x| (x, y)))
                        .filter(|(x, y)| map.is_walkable(*x, *y))
                        .count()
                })
                .sum::<usize>()
        };
        let sparse_floor = count_floor(&generate(&sparse).expect("generates"));
        let dense_floor = count_floor(&generate(&dense).expect("generates"));
        assert!(dense_floor > sparse_floor);
    }

    #[test]
    fn test_invalid_constraints_rejected() {
        let mut bad = params(1);
        bad.constraints.dungeon.width = 8;
        assert!(matches!(
            generate(&bad),
            Err(PcgError::InvalidConstraints(_))
        ));

        let mut crowded = params(1);
        crowded.constraints.dungeon.rooms_per_level = 500;
        assert!(matches!(
            generate(&crowded),
            Err(PcgError::InvalidConstraints(_))
        ));
    }

    #[test]
    fn test_to_world_round_trip() {
        let complex = generate(&params(4242)).expect("generates");
        let world = complex.to_world().expect("builds world");
        assert_eq!(world.level_count(), 3);
        let entry = complex.entry_position().expect("has entry");
        assert!(world.is_walkable(&entry));
    }
}
