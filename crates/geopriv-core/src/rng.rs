//! Random Sources for Noise Generation
//!
//! Every mechanism takes its randomness as an explicit parameter. Anything
//! implementing [`rand::RngCore`] is a [`UniformSource`] already, so callers
//! can pass a `ChaCha20Rng`, `thread_rng()`, or a scripted source in tests.
//!
//! # Concurrency
//!
//! Two safe patterns:
//! - one independent generator per concurrent call (no shared state), or
//! - a single generator behind [`SharedSource`] when a reproducible seed has
//!   to be shared across threads.

use crate::{GeoPrivError, Result, Seed};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::{Arc, Mutex};

/// A supplier of uniform reals in `[0, 1)`
pub trait UniformSource {
    /// Draw one uniform value in `[0, 1)`
    fn next_uniform(&mut self) -> Result<f64>;
}

impl<R: RngCore + ?Sized> UniformSource for R {
    fn next_uniform(&mut self) -> Result<f64> {
        // 53 random bits, the mantissa precision of f64
        Ok(self.gen::<f64>())
    }
}

/// Upper bound on redraws when a source keeps returning unusable values
const MAX_DRAWS: usize = 64;

/// Draw from `(0, 1)`, redrawing exact zeros
///
/// Zero maps to the logarithm singularity of the Laplace inverse CDF.
pub fn open_unit<S: UniformSource + ?Sized>(source: &mut S) -> Result<f64> {
    for _ in 0..MAX_DRAWS {
        let u = source.next_uniform()?;
        if u > 0.0 && u < 1.0 {
            return Ok(u);
        }
    }
    Err(GeoPrivError::RandomSource(format!(
        "no value in (0, 1) after {} draws",
        MAX_DRAWS
    )))
}

/// Uniform value in `(-0.5, 0.5)` for the Laplace inverse-CDF transform
pub fn centered<S: UniformSource + ?Sized>(source: &mut S) -> Result<f64> {
    Ok(open_unit(source)? - 0.5)
}

/// ChaCha20 generator seeded for reproducible runs
pub fn seeded(seed: Seed) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed.0)
}

/// ChaCha20 generator seeded from OS entropy
pub fn from_entropy() -> ChaCha20Rng {
    ChaCha20Rng::from_entropy()
}

/// One generator shared behind a mutex
///
/// Clones share the same underlying generator. A poisoned mutex (a panic in
/// another holder) fails closed with [`GeoPrivError::RandomSource`] rather
/// than handing out possibly inconsistent state.
#[derive(Debug)]
pub struct SharedSource<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> SharedSource<R> {
    pub fn new(rng: R) -> Self {
        SharedSource {
            inner: Arc::new(Mutex::new(rng)),
        }
    }
}

impl SharedSource<ChaCha20Rng> {
    /// Shared ChaCha20 generator with a fixed seed
    pub fn from_seed(seed: Seed) -> Self {
        Self::new(seeded(seed))
    }
}

impl<R> Clone for SharedSource<R> {
    fn clone(&self) -> Self {
        SharedSource {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: UniformSource> UniformSource for SharedSource<R> {
    fn next_uniform(&mut self) -> Result<f64> {
        let mut rng = self
            .inner
            .lock()
            .map_err(|_| GeoPrivError::RandomSource("shared generator poisoned".to_string()))?;
        rng.next_uniform()
    }
}

/// Replays a fixed list of values, cycling when exhausted
///
/// Meant for deterministic tests of the mechanisms.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    position: usize,
}

impl ScriptedSource {
    pub fn new(values: Vec<f64>) -> Self {
        ScriptedSource { values, position: 0 }
    }
}

impl UniformSource for ScriptedSource {
    fn next_uniform(&mut self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(GeoPrivError::RandomSource("scripted source is empty".to_string()));
        }
        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_range() {
        let mut rng = seeded(Seed::from_string("uniform"));
        for _ in 0..1000 {
            let value = rng.next_uniform().unwrap();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn test_centered_range() {
        let mut rng = from_entropy();
        for _ in 0..1000 {
            let value = centered(&mut rng).unwrap();
            assert!(value > -0.5);
            assert!(value < 0.5);
        }
    }

    #[test]
    fn test_zero_is_redrawn() {
        let mut source = ScriptedSource::new(vec![0.0, 0.0, 0.25]);
        assert_eq!(open_unit(&mut source).unwrap(), 0.25);
    }

    #[test]
    fn test_stuck_source_fails() {
        let mut source = ScriptedSource::new(vec![0.0]);
        assert!(matches!(open_unit(&mut source), Err(GeoPrivError::RandomSource(_))));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = seeded(Seed::from_string("same"));
        let mut b = seeded(Seed::from_string("same"));
        for _ in 0..10 {
            assert_eq!(a.next_uniform().unwrap(), b.next_uniform().unwrap());
        }
    }

    #[test]
    fn test_shared_source_clones_share_state() {
        let mut shared = SharedSource::from_seed(Seed::from_string("shared"));
        let mut clone = shared.clone();
        let mut reference = seeded(Seed::from_string("shared"));

        let first = shared.next_uniform().unwrap();
        let second = clone.next_uniform().unwrap();

        assert_eq!(first, reference.next_uniform().unwrap());
        assert_eq!(second, reference.next_uniform().unwrap());
    }

    #[test]
    fn test_shared_source_across_threads() {
        let shared = SharedSource::from_seed(Seed::from_string("threads"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut source = shared.clone();
                std::thread::spawn(move || {
                    (0..100).map(|_| source.next_uniform().unwrap()).count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 400);
    }
}
