//! String concealment transform
//!
//! Payload layout: 16 random seed bytes followed by the transformed data,
//! base64 encoded. The transform maps byte offsets into an N-dimensional
//! grid and perturbs each byte with a set of interference waves whose
//! parameters derive from a PRNG seeded by the leading bytes. Decoding
//! replays the waves in reverse. The emitted JS decoder mirrors this
//! arithmetic operation for operation, so every step here sticks to
//! integer math or IEEE operations that behave identically in JS.

use crate::error::{CompileError, CompileResult};
use crate::rng::Prng;
use data_encoding::BASE64;

/// Length of the random seed prefix
pub const SEED_LEN: usize = 16;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// Wave-parameter PRNG: FNV-style seed mixer feeding a 32-bit xorshift.
struct WaveRng {
    s: u32,
}

impl WaveRng {
    fn new(seed: &[u8]) -> Self {
        let mut s = FNV_OFFSET;
        for &b in seed {
            s = (s ^ b as u32).wrapping_mul(FNV_PRIME);
        }
        if s == 0 {
            s = FNV_OFFSET;
        }
        Self { s }
    }

    fn next(&mut self) -> u32 {
        let mut s = self.s;
        s ^= s << 13;
        s ^= s >> 17;
        s ^= s << 5;
        self.s = s;
        s
    }

    /// Uniform value in [0, 1) with 1/4096 granularity
    fn next_unit(&mut self) -> f64 {
        (self.next() % 4096) as f64 / 4096.0
    }
}

struct Wave {
    origin: Vec<u32>,
    amplitude: u32,
    frequency: f64,
    phase: f64,
    rotation: u32,
}

struct Geometry {
    extents: Vec<u32>,
    strides: Vec<u64>,
}

/// Pick a dimensionality in [2, 5] and the smallest uniform extent whose
/// d-fold product covers `n`. Integer-only so the JS decoder agrees exactly.
fn derive_geometry(n: usize, rng: &mut WaveRng) -> Geometry {
    let d = (rng.next() % 4 + 2) as usize;
    let mut extent: u64 = 1;
    loop {
        let mut product: u64 = 1;
        for _ in 0..d {
            product = product.saturating_mul(extent);
        }
        if product >= n as u64 {
            break;
        }
        extent += 1;
    }
    let extents = vec![extent as u32; d];
    let mut strides = vec![1u64; d];
    for k in (0..d - 1).rev() {
        strides[k] = strides[k + 1] * extents[k + 1] as u64;
    }
    Geometry { extents, strides }
}

fn wave_count(n: usize) -> usize {
    ((n as f64).sqrt().floor() as usize).clamp(8, 64)
}

fn derive_waves(n: usize, geometry: &Geometry, rng: &mut WaveRng) -> Vec<Wave> {
    (0..wave_count(n))
        .map(|_| Wave {
            origin: geometry
                .extents
                .iter()
                .map(|&e| rng.next() % e.max(1))
                .collect(),
            amplitude: rng.next() % 256,
            frequency: 0.5 + rng.next_unit() * 4.0,
            phase: rng.next_unit() * 2.0 * std::f64::consts::PI,
            rotation: rng.next() % 8 + 1,
        })
        .collect()
}

/// Interference mask for byte offset `i` under one wave
fn wave_mask(wave: &Wave, i: usize, geometry: &Geometry) -> u8 {
    let mut dist_sq = 0.0f64;
    for (k, &stride) in geometry.strides.iter().enumerate() {
        let coord = (i as u64 / stride) % geometry.extents[k] as u64;
        let delta = coord as f64 - wave.origin[k] as f64;
        dist_sq += delta * delta;
    }
    let dist = dist_sq.sqrt();
    let m = (wave.amplitude as f64 * ((dist * wave.frequency + wave.phase).sin() + 1.0) / 2.0)
        .floor();
    m as u8
}

/// Apply the transform to `data` in place using `seed`
fn transform(data: &mut [u8], seed: &[u8], forward: bool) {
    let mut rng = WaveRng::new(seed);
    let geometry = derive_geometry(data.len(), &mut rng);
    let waves = derive_waves(data.len(), &geometry, &mut rng);

    if forward {
        for wave in &waves {
            for (i, byte) in data.iter_mut().enumerate() {
                let m = wave_mask(wave, i, &geometry);
                *byte = byte.rotate_left(wave.rotation) ^ m;
            }
        }
    } else {
        for wave in waves.iter().rev() {
            for (i, byte) in data.iter_mut().enumerate() {
                let m = wave_mask(wave, i, &geometry);
                *byte = (*byte ^ m).rotate_right(wave.rotation);
            }
        }
    }
}

/// Conceal `data` with an explicit seed. Same data + same seed gives the
/// same payload byte for byte.
pub fn conceal_with_seed(data: &[u8], seed: [u8; SEED_LEN]) -> String {
    let mut bytes = data.to_vec();
    transform(&mut bytes, &seed, true);
    let mut payload = Vec::with_capacity(SEED_LEN + bytes.len());
    payload.extend_from_slice(&seed);
    payload.extend_from_slice(&bytes);
    BASE64.encode(&payload)
}

/// Conceal `data`, drawing a fresh seed from the pipeline PRNG
pub fn conceal(data: &[u8], prng: &mut Prng) -> String {
    let mut seed = [0u8; SEED_LEN];
    prng.fill_bytes(&mut seed);
    conceal_with_seed(data, seed)
}

/// Invert a payload produced by [`conceal`]
pub fn decode_payload(payload: &str) -> CompileResult<Vec<u8>> {
    let raw = BASE64
        .decode(payload.as_bytes())
        .map_err(|e| CompileError::internal(format!("malformed payload base64: {e}")))?;
    if raw.len() < SEED_LEN {
        return Err(CompileError::internal("payload shorter than seed"));
    }
    let (seed, data) = raw.split_at(SEED_LEN);
    let mut bytes = data.to_vec();
    transform(&mut bytes, seed, false);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[u8]) {
        let mut prng = Prng::new(Some(99));
        let payload = conceal(data, &mut prng);
        assert_eq!(decode_payload(&payload).unwrap(), data);
    }

    #[test]
    fn test_round_trip_empty() {
        round_trip(b"");
    }

    #[test]
    fn test_round_trip_single_byte() {
        for b in [0u8, 1, 127, 255] {
            round_trip(&[b]);
        }
    }

    #[test]
    fn test_round_trip_text() {
        round_trip(b"hello, world");
        round_trip("déjà vu — ユニコード".as_bytes());
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let data: Vec<u8> = (0..=255).collect();
        round_trip(&data);
    }

    #[test]
    fn test_round_trip_large() {
        let data: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8).collect();
        round_trip(&data);
    }

    #[test]
    fn test_seed_determinism() {
        let seed = [7u8; SEED_LEN];
        let a = conceal_with_seed(b"payload", seed);
        let b = conceal_with_seed(b"payload", seed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = conceal_with_seed(b"payload-payload-payload", [1u8; SEED_LEN]);
        let b = conceal_with_seed(b"payload-payload-payload", [2u8; SEED_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_is_seed_plus_data() {
        let seed = [3u8; SEED_LEN];
        let payload = conceal_with_seed(b"abcdef", seed);
        let raw = BASE64.decode(payload.as_bytes()).unwrap();
        assert_eq!(raw.len(), SEED_LEN + 6);
        assert_eq!(&raw[..SEED_LEN], &seed);
    }

    #[test]
    fn test_mixer_avoids_zero_state() {
        let rng = WaveRng::new(&[]);
        assert_ne!(rng.s, 0);
    }
}
