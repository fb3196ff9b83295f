//! Deterministic per-week RNG derivation.
//!
//! A master seed expands into per-week sub-seeds via BLAKE3 hashing, so a
//! week's RNG stream is identical regardless of the order in which weeks are
//! replayed or the number of rayon workers. No process-wide RNG state exists;
//! the generator is created per run and passed down explicitly.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Run-scoped RNG root.
#[derive(Debug, Clone)]
pub struct RunRng {
    master_seed: u64,
}

impl RunRng {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the deterministic sub-seed for one sampled week.
    ///
    /// Derivation is hash-based, not order-dependent: deriving week A before
    /// week B yields the same seeds as the reverse order.
    pub fn week_seed(&self, week_start: NaiveDate) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(week_start.to_string().as_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("8-byte slice"))
    }

    /// Seeded StdRng for one sampled week.
    pub fn rng_for_week(&self, week_start: NaiveDate) -> StdRng {
        StdRng::seed_from_u64(self.week_seed(week_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn week_seeds_are_deterministic() {
        let rng = RunRng::new(42);
        assert_eq!(rng.week_seed(week(11)), rng.week_seed(week(11)));
    }

    #[test]
    fn different_weeks_different_seeds() {
        let rng = RunRng::new(42);
        assert_ne!(rng.week_seed(week(11)), rng.week_seed(week(18)));
    }

    #[test]
    fn derivation_order_independent() {
        let rng = RunRng::new(42);
        let a_first = rng.week_seed(week(11));
        let _b = rng.week_seed(week(18));
        let a_second = rng.week_seed(week(11));
        assert_eq!(a_first, a_second);
    }

    #[test]
    fn different_master_seeds_different_output() {
        assert_ne!(
            RunRng::new(42).week_seed(week(11)),
            RunRng::new(43).week_seed(week(11))
        );
    }
}
