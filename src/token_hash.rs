use std::fmt;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Number of leading hex digits that feed the seed.
pub const SEED_DIGITS: usize = 16;

/// Number of hex digits in a freshly minted hash.
pub const HASH_DIGITS: usize = 64;

/// Token ids pack the project id above the mint number.
pub const PROJECT_MULTIPLIER: u64 = 1_000_000;

const HEX_ALPHABET: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidHashFormat {
  TooShort { digits: usize },
  BadCharacter { position: usize, character: char },
}

impl fmt::Display for InvalidHashFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InvalidHashFormat::TooShort { digits } => write!(
        f,
        "token hash has {} hex digits, at least {} are required",
        digits, SEED_DIGITS
      ),
      InvalidHashFormat::BadCharacter { position, character } => {
        write!(f, "token hash has non-hex character {:?} at position {}", character, position)
      }
    }
  }
}

impl std::error::Error for InvalidHashFormat {}

/// A validated token hash. The seed is derived once, when the hash is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenHash {
  text: String,
  seed: i64,
}

fn strip_prefix(text: &str) -> &str {
  text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text)
}

impl TokenHash {
  pub fn parse(text: &str) -> Result<Self, Error> {
    let digits = strip_prefix(text);
    let offset = text.len() - digits.len();
    let bad_character = digits.char_indices().find(|(_, c)| !c.is_ascii_hexdigit());
    if let Some((position, character)) = bad_character {
      return Err(InvalidHashFormat::BadCharacter {
        position: offset + position,
        character,
      }
      .into());
    }
    if digits.len() < SEED_DIGITS {
      return Err(InvalidHashFormat::TooShort { digits: digits.len() }.into());
    }
    // Wider than i64::MAX wraps into the negatives.
    let seed = u64::from_str_radix(&digits[..SEED_DIGITS], 16)? as i64;
    Ok(Self {
      text: text.to_string(),
      seed,
    })
  }

  /// Makes a `0x`-prefixed hash of 64 random lowercase hex digits, for previews before minting.
  pub fn random<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
    let mut text = String::with_capacity(2 + HASH_DIGITS);
    text.push_str("0x");
    let mut seed = 0u64;
    for i in 0..HASH_DIGITS {
      let nibble = rng.gen_range(0..16usize);
      if i < SEED_DIGITS {
        seed = (seed << 4) | nibble as u64;
      }
      text.push(HEX_ALPHABET[nibble] as char);
    }
    Self {
      text,
      seed: seed as i64,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  /// The hex digits with any `0x` prefix removed.
  pub fn digits(&self) -> &str {
    strip_prefix(&self.text)
  }

  pub fn seed(&self) -> i64 {
    self.seed
  }
}

impl fmt::Display for TokenHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.text)
  }
}

impl std::str::FromStr for TokenHash {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for TokenHash {
  type Error = Error;

  fn try_from(text: String) -> Result<Self, Self::Error> {
    Self::parse(&text)
  }
}

impl From<TokenHash> for String {
  fn from(hash: TokenHash) -> Self {
    hash.text
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TokenData {
  #[ts(type = "string")]
  pub hash:     TokenHash,
  pub token_id: u64,
}

impl TokenData {
  /// Fails when the project id is too large to pack into a token id.
  pub fn random<R: rand::Rng + ?Sized>(project_id: u64, rng: &mut R) -> Result<Self, Error> {
    let token_id = project_id
      .checked_mul(PROJECT_MULTIPLIER)
      .and_then(|base| base.checked_add(rng.gen_range(0..1000)))
      .ok_or_else(|| anyhow!("Project id {} is too large for a token id", project_id))?;
    Ok(Self {
      hash: TokenHash::random(rng),
      token_id,
    })
  }

  pub fn project_id(&self) -> u64 {
    self.token_id / PROJECT_MULTIPLIER
  }

  pub fn mint_number(&self) -> u64 {
    self.token_id % PROJECT_MULTIPLIER
  }
}
