//! Seeded terrain generation: cellular-automata caves and noise
//! heightmaps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::noise::{FractalNoise, Noise2, Perlin};
use super::path::flood_fill;
use super::{GenerationParams, PcgError};
use crate::world::{MapLevel, TerrainType, Tile};

/// Which algorithm carves the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainStyle {
    /// Cellular-automata cave carving
    Caves,
    /// Perlin heightmap banded into terrain kinds
    Heightmap,
}

/// Generate one level of terrain of the given size.
pub fn generate(
    params: &GenerationParams,
    width: u32,
    height: u32,
    style: TerrainStyle,
) -> Result<MapLevel, PcgError> {
    if width < 8 || height < 8 {
        return Err(PcgError::InvalidConstraints(
            "terrain must be at least 8x8".into(),
        ));
    }
    match style {
        TerrainStyle::Caves => Ok(caves(params.seed, width, height)),
        TerrainStyle::Heightmap => Ok(heightmap(params.seed, width, height)),
    }
}

/// Classic cellular automata: random fill, smoothing passes, then keep
/// only the largest connected open region.
fn caves(seed: u64, width: u32, height: u32) -> MapLevel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut open = vec![vec![false; width as usize]; height as usize];
    for (y, row) in open.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let edge =
                x == 0 || y == 0 || x == width as usize - 1 || y == height as usize - 1;
            *cell = !edge && rng.gen_bool(0.55);
        }
    }

    for _ in 0..5 {
        let snapshot = open.clone();
        for y in 1..height as usize - 1 {
            for x in 1..width as usize - 1 {
                let mut wall_neighbours = 0;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = ((x as i32 + dx) as usize, (y as i32 + dy) as usize);
                        if !snapshot[ny][nx] {
                            wall_neighbours += 1;
                        }
                    }
                }
                open[y][x] = wall_neighbours < 5;
            }
        }
    }

    // keep only the largest open region; fill the rest back in.
    // scan order makes region selection deterministic.
    let walkable = |x: i32, y: i32| open[y as usize][x as usize];
    let mut best_region = std::collections::HashSet::new();
    let mut seen = std::collections::HashSet::new();
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            if walkable(x, y) && !seen.contains(&(x, y)) {
                let region = flood_fill(width, height, walkable, (x, y));
                seen.extend(region.iter().copied());
                if region.len() > best_region.len() {
                    best_region = region;
                }
            }
        }
    }

    let mut map = MapLevel::filled(width, height, Tile::wall());
    for (x, y) in best_region {
        map.set_tile(x, y, Tile::floor());
    }
    map
}

/// Fractal Perlin heightmap banded into water, floor, rubble, and wall.
fn heightmap(seed: u64, width: u32, height: u32) -> MapLevel {
    let noise = Perlin::new(seed);
    let fractal = FractalNoise {
        octaves: 4,
        persistence: 0.5,
        scale: 0.12,
    };

    let mut map = MapLevel::filled(width, height, Tile::wall());
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let elevation = fractal.sample(&noise, x as f64, y as f64);
            let terrain = if elevation < -0.35 {
                TerrainType::Water
            } else if elevation < 0.3 {
                TerrainType::Floor
            } else if elevation < 0.5 {
                TerrainType::Rubble
            } else {
                TerrainType::Wall
            };
            map.set_tile(x, y, Tile::new(terrain));
        }
    }
    map
}
