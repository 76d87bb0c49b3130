use crate::token_hash::TokenHash;

/// Xorshift generator over a single 64-bit signed register.
///
/// Shifts happen on `i64`: bits pushed off the left are dropped and the right shift is
/// arithmetic. Two generators built from the same seed and driven by the same calls produce
/// the same values.
#[derive(Debug, Clone)]
pub struct Rng {
  state: i64,
}

/// Maps a register value onto one of `0.000, 0.001, .., 0.999`.
fn fraction_of(x: i64) -> f64 {
  (x.unsigned_abs() % 1000) as f64 / 1000.0
}

impl Default for Rng {
  fn default() -> Self {
    Self::new()
  }
}

impl Rng {
  /// Seeds from a freshly generated random hash.
  pub fn new() -> Self {
    Self::new_from_token_hash(&TokenHash::random(&mut rand::thread_rng()))
  }

  pub fn new_from_seed(seed: i64) -> Self {
    tracing::debug!(seed, "rng.seeded");
    Self { state: seed }
  }

  pub fn new_from_token_hash(hash: &TokenHash) -> Self {
    Self::new_from_seed(hash.seed())
  }

  pub fn state(&self) -> i64 {
    self.state
  }

  /// Advances the register by one xorshift step and returns the new value.
  /// A zero register stays zero.
  pub fn generate(&mut self) -> i64 {
    let mut x = self.state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    self.state = x;
    x
  }

  /// A value in `[0, 1)` with three decimal places of resolution.
  pub fn next_fraction(&mut self) -> f64 {
    fraction_of(self.generate())
  }

  pub fn between(&mut self, low: f64, high: f64) -> f64 {
    low + (high - low) * self.next_fraction()
  }

  /// Inclusive integer range. Expects `low <= high`.
  pub fn int_between(&mut self, low: i64, high: i64) -> i64 {
    let value = self.between(low as f64, high as f64 + 1.0).floor() as i64;
    // Bounds past 2^53 lose precision as f64 and can land outside the range.
    if low <= high {
      value.clamp(low, high)
    } else {
      value
    }
  }

  /// Picks an element of `items`, or `None` without advancing when `items` is empty.
  pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
      return None;
    }
    let index = self.between(0.0, items.len() as f64 * 0.99).floor() as usize;
    items.get(index.min(items.len() - 1))
  }

  pub fn chance(&mut self, probability: f64) -> bool {
    self.next_fraction() < probability
  }
}
