//! Spatial index over entity positions.
//!
//! Tile-bucket index: one bucket per occupied tile per level, plus a
//! reverse map from entity to position for O(1) removal and updates.
//! Queries walk only candidate buckets — the tiles inside the query
//! rectangle or bounding box, or expanding rings for k-nearest — and
//! fall back to scanning the occupied-bucket set when the query area is
//! larger than it. Because every entity sits exactly on its bucket's
//! tile, the bucket key gives the exact distance for the whole bucket.
//!
//! The world model updates the index inside the same mutation that
//! changes an entity's stored position, so readers never observe a stale
//! position.

use std::collections::HashMap;

use crate::ids::EntityId;
use crate::position::Position;

type TileKey = (u8, i32, i32);

fn key_of(position: &Position) -> TileKey {
    (position.level, position.x, position.y)
}

#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    buckets: HashMap<TileKey, Vec<EntityId>>,
    positions: HashMap<EntityId, Position>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, position: Position) {
        self.remove(id);
        self.buckets.entry(key_of(&position)).or_default().push(id);
        self.positions.insert(id, position);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Position> {
        let position = self.positions.remove(&id)?;
        let key = key_of(&position);
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        Some(position)
    }

    pub fn update(&mut self, id: EntityId, new_position: Position) {
        self.insert(id, new_position);
    }

    pub fn position_of(&self, id: EntityId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    /// Entities on one tile, in insertion order.
    pub fn at_tile(&self, level: u8, x: i32, y: i32) -> &[EntityId] {
        self.buckets
            .get(&(level, x, y))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All entities inside the axis-aligned rectangle (inclusive bounds)
    /// on one level, sorted by ascending id for deterministic output.
    pub fn range_query(
        &self,
        level: u8,
        min_x: i32,
        min_y: i32,
        max_x: i32,
        max_y: i32,
    ) -> Vec<EntityId> {
        if min_x > max_x || min_y > max_y {
            return Vec::new();
        }
        let area = (max_x as i64 - min_x as i64 + 1) as u128
            * (max_y as i64 - min_y as i64 + 1) as u128;

        let mut found: Vec<EntityId> = Vec::new();
        if area <= self.buckets.len() as u128 {
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    found.extend_from_slice(self.at_tile(level, x, y));
                }
            }
        } else {
            // the rectangle covers more tiles than there are occupied
            // buckets; the bucket set is the smaller candidate list
            for ((l, x, y), bucket) in &self.buckets {
                if *l == level
                    && (min_x..=max_x).contains(x)
                    && (min_y..=max_y).contains(y)
                {
                    found.extend_from_slice(bucket);
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// All entities within Euclidean distance `radius` of the centre.
    /// The test is done on squared distances; results are sorted by
    /// distance, then ascending id.
    pub fn radius_query(&self, center: Position, radius: u32) -> Vec<EntityId> {
        let radius_sq = (radius as u64) * (radius as u64);
        let area = (2 * radius as u128 + 1) * (2 * radius as u128 + 1);

        let mut found: Vec<(u64, EntityId)> = Vec::new();
        if area <= self.buckets.len() as u128 {
            let r = radius as i32;
            for y in (center.y - r)..=(center.y + r) {
                for x in (center.x - r)..=(center.x + r) {
                    let Some(bucket) = self.buckets.get(&(center.level, x, y)) else {
                        continue;
                    };
                    let d2 = center.distance_squared(&Position::new(x, y, center.level));
                    if d2 <= radius_sq {
                        found.extend(bucket.iter().map(|id| (d2, *id)));
                    }
                }
            }
        } else {
            for ((level, x, y), bucket) in &self.buckets {
                if *level != center.level {
                    continue;
                }
                let d2 = center.distance_squared(&Position::new(*x, *y, center.level));
                if d2 <= radius_sq {
                    found.extend(bucket.iter().map(|id| (d2, *id)));
                }
            }
        }
        found.sort_unstable();
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// The k entities nearest the centre, ties broken by ascending id.
    ///
    /// Buckets are visited in expanding square rings. A ring at Chebyshev
    /// distance `d` cannot hold anything closer than `d` tiles, so once k
    /// candidates are in hand the search stops at the first ring that can
    /// no longer beat the k-th best.
    pub fn k_nearest(&self, center: Position, k: usize) -> Vec<EntityId> {
        if k == 0 {
            return Vec::new();
        }

        // envelope of occupied buckets on this level bounds the search
        let mut max_ring: Option<u32> = None;
        for (level, x, y) in self.buckets.keys() {
            if *level != center.level {
                continue;
            }
            let d = center.x.abs_diff(*x).max(center.y.abs_diff(*y));
            max_ring = Some(max_ring.map_or(d, |current| current.max(d)));
        }
        let Some(max_ring) = max_ring else {
            return Vec::new();
        };

        let mut found: Vec<(u64, EntityId)> = Vec::new();
        for ring in 0..=max_ring {
            if found.len() >= k {
                let kth = found[k - 1].0;
                if (ring as u64) * (ring as u64) > kth {
                    break;
                }
            }
            for (x, y) in ring_tiles(center.x, center.y, ring) {
                let Some(bucket) = self.buckets.get(&(center.level, x, y)) else {
                    continue;
                };
                let d2 = center.distance_squared(&Position::new(x, y, center.level));
                found.extend(bucket.iter().map(|id| (d2, *id)));
            }
            found.sort_unstable();
        }
        found.truncate(k);
        found.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Position)> + '_ {
        self.positions.iter().map(|(id, pos)| (*id, *pos))
    }
}

/// The perimeter tiles of the square at Chebyshev distance `ring` from
/// `(cx, cy)`; just the centre tile for ring 0.
fn ring_tiles(cx: i32, cy: i32, ring: u32) -> Vec<(i32, i32)> {
    if ring == 0 {
        return vec![(cx, cy)];
    }
    let r = ring as i32;
    let mut tiles = Vec::with_capacity(8 * r as usize);
    for x in (cx - r)..=(cx + r) {
        tiles.push((x, cy - r));
        tiles.push((x, cy + r));
    }
    for y in (cy - r + 1)..(cy + r) {
        tiles.push((cx - r, y));
        tiles.push((cx + r, y));
    }
    tiles
}
