use crate::real;

/// The linear congruential generator word2vec has always used.
///
/// It is fast and each training thread owns one, so there is no shared state.
/// Statistical quality is poor in the low bits; callers that index tables
/// shift those bits away first.
#[derive(Debug, Clone)]
pub struct Rng(pub u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng(seed)
    }

    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`, with 16 bits of precision.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }

    /// Get a uniformly distributed random number in `0.0 ..= 1.0`, with 53 bits of precision.
    pub fn rand_unit(&mut self) -> f64 {
        (self.rand_u64() >> 11) as f64 * (1.0 / 9007199254740991.0)
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`, with 53 bits of precision.
    pub fn rand_unit_exclusive(&mut self) -> f64 {
        (self.rand_u64() >> 11) as f64 * (1.0 / 9007199254740992.0)
    }
}
