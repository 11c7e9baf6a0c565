//! Subtractive dithering for `ZQUANTIZ=SUBTRACTIVE_DITHER_{1,2}` tiles.
//!
//! Dequantization without dithering is `v * scale + zero`. With subtractive
//! dithering, decode additionally removes a per-pixel random offset drawn
//! from a fixed 10000-entry Park-Miller sequence before rescaling, so that
//! `v` and the offset recombine to the original (noisy) float sample.

/// Park-Miller minimal-standard LCG: `r[n+1] = 16807 * r[n] mod (2^31 - 1)`,
/// seeded with `r[0] = 1`, scaled to `[0, 1)`.
const MODULUS: u64 = 2_147_483_647; // 2^31 - 1
const MULTIPLIER: u64 = 16807;
const SEQUENCE_LEN: usize = 10_000;

/// The `n`-th term of the sequence (0-indexed), computed by modular
/// exponentiation rather than iterating `n` times.
fn park_miller_raw(n: usize) -> u64 {
    let mut result = 1u64;
    let mut base = MULTIPLIER;
    let mut exp = n as u64 + 1; // r[0] = 1 is the seed; r[1] is the first generated term.
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % MODULUS;
        }
        base = base * base % MODULUS;
        exp >>= 1;
    }
    result
}

fn park_miller(n: usize) -> f64 {
    park_miller_raw(n % SEQUENCE_LEN) as f64 / MODULUS as f64
}

/// NaN sentinel for a dequantized tile sample.
pub const NAN_SENTINEL: i32 = -2_147_483_647;
/// Exact-zero sentinel for a dequantized tile sample.
pub const ZERO_SENTINEL: i32 = -2_147_483_646;

/// Per-pixel dithering offset `r` for pixel `pixel_index` (0-based, local to
/// tile `tile_index`: it resets to zero at the start of each tile, it is
/// not a running offset across the whole image) of tile `tile_index`
/// (1-based, per the FITS tile compression convention), given the header's
/// `ZDITHER0` seed.
///
/// The walk `start + pixel_index` is not reduced by a plain modulo when it
/// reaches the end of the 10000-entry table: each time it would overflow,
/// a secondary Park-Miller draw (keyed off how many times the table has
/// been exhausted so far) picks a fresh restart point in `[0, 500)` and the
/// walk continues from there with the leftover pixel count, rather than
/// wrapping straight back to index 0.
pub fn dither_offset(tile_index: u64, pixel_index: u64, z_dither_seed: i64) -> f64 {
    let seed_index = ((tile_index as i64 + z_dither_seed - 1) - 1).rem_euclid(SEQUENCE_LEN as i64) as usize;
    let start = (park_miller(seed_index) * 500.0).floor() as u64;
    park_miller(walk_with_reseed(seed_index, start, pixel_index) as usize)
}

/// Advance `start + pixel_index` through the sequence, re-seeding from a
/// secondary draw (rather than wrapping via plain modulo) every time the
/// walk would run past the end of the table.
fn walk_with_reseed(seed_index: usize, start: u64, pixel_index: u64) -> u64 {
    let mut idx = start + pixel_index;
    let mut wraps = 0u64;
    while idx >= SEQUENCE_LEN as u64 {
        let remaining = idx - SEQUENCE_LEN as u64;
        wraps += 1;
        let reseed_index = (seed_index as u64 + wraps) as usize % SEQUENCE_LEN;
        let reseed_start = (park_miller(reseed_index) * 500.0).floor() as u64;
        idx = reseed_start + remaining;
    }
    idx
}

/// Dequantize one decoded integer sample, applying sentinels and (if
/// `dither` is `Some`) the subtractive-dither correction.
pub fn dequantize(v: i32, scale: f64, zero: f64, dither: Option<f64>) -> f64 {
    if v == NAN_SENTINEL {
        return f64::NAN;
    }
    if v == ZERO_SENTINEL {
        return 0.0;
    }
    match dither {
        Some(r) => (v as f64 - r + 0.5) * scale + zero,
        None => v as f64 * scale + zero,
    }
}

/// Parse the `ZQUANTIZ` keyword value into whether subtractive dithering is active.
pub fn quantiz_uses_dither(zquantiz: &str) -> bool {
    matches!(zquantiz, "SUBTRACTIVE_DITHER_1" | "SUBTRACTIVE_DITHER_2")
}
