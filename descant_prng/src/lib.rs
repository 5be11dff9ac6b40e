// Deterministic, portable pseudo-random number generator for voice generation.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Hand-rolled with zero external dependencies so the generated counterpoint
// line is identical across platforms for a given seed.
//
// Consumers: `descant_counterpoint::engine` (interval draws, motion coin
// flips) and `descant_counterpoint::model::MockModel` (per-call seeded
// probabilities). Each owner holds its own `VoiceRng`.
//
// **Critical constraint: determinism.** The integer core must produce the
// same stream for the same seed. Floating-point only appears when converting
// the final bits into a unit-interval value.

/// Xoshiro256++ PRNG used for every random decision in descant.
#[derive(Clone, Debug)]
pub struct VoiceRng {
    s: [u64; 4],
}

impl VoiceRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f32` in [0, 1), built from the upper 24 bits.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform value in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_f32(&mut self, low: f32, high: f32) -> f32 {
        assert!(low < high, "range_f32: low must be less than high");
        low + self.next_f32() * (high - low)
    }

    /// Fair coin flip.
    pub fn coin_flip(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }

    /// Pick an index with probability proportional to `weights[i]`.
    ///
    /// Weights need not sum to 1: a point is drawn uniformly in
    /// `[0, total)` and walked down the cumulative sums. Non-positive and
    /// non-finite weights are never chosen. Returns `None` when no weight is
    /// positive.
    pub fn weighted_index(&mut self, weights: &[f32]) -> Option<usize> {
        let usable = |w: f32| w.is_finite() && w > 0.0;
        let total: f32 = weights.iter().copied().filter(|&w| usable(w)).sum();
        if total <= 0.0 {
            return None;
        }

        let mut r = self.next_f32() * total;
        let mut last = None;
        for (i, &w) in weights.iter().enumerate() {
            if !usable(w) {
                continue;
            }
            if r < w {
                return Some(i);
            }
            r -= w;
            last = Some(i);
        }
        // Rounding can leave `r` a hair above the final bucket.
        last
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
