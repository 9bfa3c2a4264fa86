//! Seeded random number generation for reproducible runs
//!
//! The stochastic stages (t-SNE, the UMAP-style layout, GSEA permutations)
//! all draw from this Mersenne-Twister generator so that a fixed `--seed`
//! reproduces the report bit for bit.

/// Mersenne-Twister (MT19937) pseudo-random generator
pub struct MersenneTwister {
    state: [u32; 624],
    index: usize,
}

impl MersenneTwister {
    const N: usize = 624;
    const M: usize = 397;
    const MATRIX_A: u32 = 0x9908B0DF;
    const UPPER_MASK: u32 = 0x80000000;
    const LOWER_MASK: u32 = 0x7FFFFFFF;

    pub fn new(seed: u32) -> Self {
        let mut mt = MersenneTwister {
            state: [0; Self::N],
            index: Self::N,
        };
        mt.state[0] = seed;
        for i in 1..Self::N {
            let prev = mt.state[i - 1];
            mt.state[i] = 1812433253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        mt
    }

    /// Regenerate the next 624 words of state
    fn generate_numbers(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & Self::UPPER_MASK)
                | (self.state[(i + 1) % Self::N] & Self::LOWER_MASK);
            self.state[i] = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 != 0 {
                self.state[i] ^= Self::MATRIX_A;
            }
        }
        self.index = 0;
    }

    pub fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.generate_numbers();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C5680;
        y ^= (y << 15) & 0xEFC60000;
        y ^= y >> 18;
        y
    }

    /// Uniform double in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        // 53-bit resolution from two draws
        let a = (self.next_u32() >> 5) as f64; // 27 bits
        let b = (self.next_u32() >> 6) as f64; // 26 bits
        (a * 67108864.0 + b) / 9007199254740992.0
    }

    /// Uniform integer in [0, bound)
    pub fn next_below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        (self.next_f64() * bound as f64) as usize % bound
    }

    /// Standard normal via Box-Muller
    pub fn next_gaussian(&mut self) -> f64 {
        let mut u1 = self.next_f64();
        if u1 <= f64::MIN_POSITIVE {
            u1 = f64::MIN_POSITIVE;
        }
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// In-place Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        for i in (1..values.len()).rev() {
            let j = self.next_below(i + 1);
            values.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_sequence() {
        let mut a = MersenneTwister::new(42);
        let mut b = MersenneTwister::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_seed_changes_sequence() {
        let mut a = MersenneTwister::new(1);
        let mut b = MersenneTwister::new(2);
        let same = (0..100).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 5);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = MersenneTwister::new(7);
        for _ in 0..10_000 {
            let u = rng.next_f64();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = MersenneTwister::new(3);
        let mut values: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut values);
        let mut sorted = values.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(values, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = MersenneTwister::new(11);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| rng.next_gaussian()).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        assert!(mean.abs() < 0.05, "mean={}", mean);
        assert!((var - 1.0).abs() < 0.1, "var={}", var);
    }
}
