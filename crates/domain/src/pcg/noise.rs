//! Deterministic 2D gradient noise.
//!
//! Perlin and Simplex implementations over a 512-entry permutation table
//! seeded from a 64-bit integer, plus a fractal combinator. The same seed
//! always produces the same field.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Anything that yields a scalar field over the plane in [-1, 1].
pub trait Noise2 {
    fn sample(&self, x: f64, y: f64) -> f64;
}

/// The doubled permutation table both noise kinds index into.
#[derive(Debug, Clone)]
struct PermutationTable {
    perm: [u8; 512],
}

impl PermutationTable {
    fn new(seed: u64) -> Self {
        let mut base: [u8; 256] = [0; 256];
        for (i, slot) in base.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        base.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = base[i & 255];
        }
        Self { perm }
    }

    #[inline]
    fn at(&self, index: usize) -> usize {
        self.perm[index & 511] as usize
    }
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

fn grad(hash: usize, x: f64, y: f64) -> f64 {
    // eight gradient directions
    match hash & 7 {
        0 => x + y,
        1 => x - y,
        2 => -x + y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}

/// Classic 2D Perlin noise.
#[derive(Debug, Clone)]
pub struct Perlin {
    table: PermutationTable,
}

impl Perlin {
    pub fn new(seed: u64) -> Self {
        Self {
            table: PermutationTable::new(seed),
        }
    }
}

impl Noise2 for Perlin {
    fn sample(&self, x: f64, y: f64) -> f64 {
        let xi = x.floor() as i64 & 255;
        let yi = y.floor() as i64 & 255;
        let xf = x - x.floor();
        let yf = y - y.floor();

        let u = fade(xf);
        let v = fade(yf);

        let t = &self.table;
        let aa = t.at(t.at(xi as usize) + yi as usize);
        let ab = t.at(t.at(xi as usize) + yi as usize + 1);
        let ba = t.at(t.at(xi as usize + 1) + yi as usize);
        let bb = t.at(t.at(xi as usize + 1) + yi as usize + 1);

        let x1 = lerp(grad(aa, xf, yf), grad(ba, xf - 1.0, yf), u);
        let x2 = lerp(grad(ab, xf, yf - 1.0), grad(bb, xf - 1.0, yf - 1.0), u);
        lerp(x1, x2, v)
    }
}

/// 2D Simplex noise.
#[derive(Debug, Clone)]
pub struct Simplex {
    table: PermutationTable,
}

impl Simplex {
    pub fn new(seed: u64) -> Self {
        Self {
            table: PermutationTable::new(seed),
        }
    }
}

const F2: f64 = 0.366_025_403_784_438_6; // (sqrt(3) - 1) / 2
const G2: f64 = 0.211_324_865_405_187_1; // (3 - sqrt(3)) / 6

impl Noise2 for Simplex {
    fn sample(&self, x: f64, y: f64) -> f64 {
        // skew into simplex cell space
        let s = (x + y) * F2;
        let i = (x + s).floor();
        let j = (y + s).floor();

        let t = (i + j) * G2;
        let x0 = x - (i - t);
        let y0 = y - (j - t);

        // which simplex triangle we are in
        let (i1, j1) = if x0 > y0 { (1.0, 0.0) } else { (0.0, 1.0) };

        let x1 = x0 - i1 + G2;
        let y1 = y0 - j1 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;
        let table = &self.table;

        let mut total = 0.0;
        let corners = [
            (x0, y0, table.at(ii + table.at(jj))),
            (
                x1,
                y1,
                table.at(ii + i1 as usize + table.at(jj + j1 as usize)),
            ),
            (x2, y2, table.at(ii + 1 + table.at(jj + 1))),
        ];
        for (cx, cy, hash) in corners {
            let mut contribution = 0.5 - cx * cx - cy * cy;
            if contribution > 0.0 {
                contribution *= contribution;
                total += contribution * contribution * grad(hash, cx, cy);
            }
        }
        // scale into roughly [-1, 1]
        70.0 * total
    }
}

/// Sums octaves of any 2D noise with per-octave persistence and scale.
#[derive(Debug, Clone, Copy)]
pub struct FractalNoise {
    pub octaves: u32,
    pub persistence: f64,
    pub scale: f64,
}

impl Default for FractalNoise {
    fn default() -> Self {
        Self {
            octaves: 4,
            persistence: 0.5,
            scale: 0.1,
        }
    }
}

impl FractalNoise {
    /// Sample the fractal field; result is normalised into [-1, 1].
    pub fn sample<N: Noise2>(&self, noise: &N, x: f64, y: f64) -> f64 {
        let mut amplitude = 1.0;
        let mut frequency = self.scale;
        let mut total = 0.0;
        let mut max_amplitude = 0.0;

        for _ in 0..self.octaves.max(1) {
            total += noise.sample(x * frequency, y * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= self.persistence;
            frequency *= 2.0;
        }
        total / max_amplitude
    }
}
