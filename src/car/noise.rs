//! Seeded 1-D value noise for AI wander.
//!
//! The simulation must stay reproducible under test, so wander is keyed on
//! simulated time plus a per-instance seed instead of wall-clock noise.
//! Integer lattice points are hashed (splitmix-style mix, the same family the
//! deterministic RNGs in this codebase's lineage use) and blended with a
//! smoothstep, giving a continuous value in [0, 1).

/// Hash a lattice coordinate + seed to [0, 1).
#[inline]
fn lattice01(i: i64, seed: u32) -> f32 {
    let mut x = (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ ((seed as u64) << 32 | seed as u64);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    // top 24 bits -> exact f32 in [0, 1)
    (x >> 40) as f32 / (1u64 << 24) as f32
}

/// Smooth value noise in [0, 1) at continuous coordinate `t`.
pub fn noise01(t: f32, seed: u32) -> f32 {
    let i = t.floor();
    let f = t - i;
    let i = i as i64;

    let a = lattice01(i, seed);
    let b = lattice01(i + 1, seed);

    let u = f * f * (3.0 - 2.0 * f);
    a + (b - a) * u
}

/// Smooth value noise remapped to [-1, 1).
#[inline]
pub fn noise11(t: f32, seed: u32) -> f32 {
    noise01(t, seed) * 2.0 - 1.0
}
