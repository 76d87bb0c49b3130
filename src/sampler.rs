use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

use crate::{rng::Rng, token_hash::TokenHash};

/// One generator call, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase", tag = "kind")]
#[ts(export)]
pub enum SampleCall {
  NextFraction,
  Between { low: f64, high: f64 },
  IntBetween { low: i64, high: i64 },
  Choose { items: Vec<String> },
  Chance { probability: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase", tag = "kind")]
#[ts(export)]
pub enum SampleValue {
  Fraction { value: f64 },
  Float { value: f64 },
  Int { value: i64 },
  Choice { value: String },
  Bool { value: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SampleTrace {
  pub seed:   i64,
  pub values: Vec<SampleValue>,
}

#[derive(Debug)]
pub struct Sampler {
  pub seed: i64,
  pub rng:  Rng,
}

impl Sampler {
  pub fn new(hash: &TokenHash) -> Self {
    Self {
      seed: hash.seed(),
      rng:  Rng::new_from_token_hash(hash),
    }
  }

  /// Validates and runs a single call. A rejected call leaves the generator untouched.
  pub fn process_call(&mut self, call: &SampleCall) -> Result<SampleValue, Error> {
    // Validate the call.
    match call {
      SampleCall::Between { low, high } => {
        if !low.is_finite() || !high.is_finite() {
          bail!("Range bounds must be finite");
        }
        if low > high {
          bail!("Range low {} is above high {}", low, high);
        }
        if !(high - low).is_finite() {
          bail!("Range width from {} to {} overflows", low, high);
        }
      }
      SampleCall::IntBetween { low, high } => {
        if low > high {
          bail!("Range low {} is above high {}", low, high);
        }
      }
      SampleCall::Choose { items } => {
        if items.is_empty() {
          bail!("Cannot choose from an empty list");
        }
      }
      SampleCall::Chance { probability } => {
        if !probability.is_finite() {
          bail!("Probability must be finite");
        }
      }
      SampleCall::NextFraction => {}
    }

    // Run the call.
    Ok(match call {
      SampleCall::NextFraction => SampleValue::Fraction {
        value: self.rng.next_fraction(),
      },
      SampleCall::Between { low, high } => SampleValue::Float {
        value: self.rng.between(*low, *high),
      },
      SampleCall::IntBetween { low, high } => SampleValue::Int {
        value: self.rng.int_between(*low, *high),
      },
      SampleCall::Choose { items } => match self.rng.choose(items) {
        Some(item) => SampleValue::Choice { value: item.clone() },
        None => bail!("Cannot choose from an empty list"),
      },
      SampleCall::Chance { probability } => SampleValue::Bool {
        value: self.rng.chance(*probability),
      },
    })
  }
}

/// Replays `calls` against a fresh generator seeded from `hash`.
pub fn sample_sequence(
  hash: &TokenHash,
  calls: &[SampleCall],
  max_calls: usize,
) -> Result<SampleTrace, Error> {
  if calls.len() > max_calls {
    bail!("Too many calls: {} (limit {})", calls.len(), max_calls);
  }
  let mut sampler = Sampler::new(hash);
  let values = calls
    .iter()
    .enumerate()
    .map(|(i, call)| {
      sampler
        .process_call(call)
        .map_err(|e| e.context(format!("Call {} failed", i)))
    })
    .collect::<Result<Vec<_>, Error>>()?;
  tracing::debug!(seed = sampler.seed, calls = calls.len(), "sampler.finished");
  Ok(SampleTrace {
    seed: sampler.seed,
    values,
  })
}
