use std::{env, net::IpAddr, str::FromStr};

use anyhow::{Context, Error};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12001;
pub const DEFAULT_MAX_CALLS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
  pub host:      IpAddr,
  pub port:      u16,
  /// Longest call sequence a single sample request may run.
  pub max_calls: usize,
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, Error>
where
  F: Fn(&str) -> Option<String>,
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match lookup(name) {
    Some(raw) => raw
      .trim()
      .parse()
      .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
    None => Ok(default),
  }
}

impl ServerConfig {
  /// Reads `TOKENSEED_*` variables, loading `.env` first if one exists.
  pub fn from_env() -> Result<Self, Error> {
    dotenv::dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
    Ok(Self {
      host:      parse_var(&lookup, "TOKENSEED_HOST", DEFAULT_HOST.parse()?)?,
      port:      parse_var(&lookup, "TOKENSEED_PORT", DEFAULT_PORT)?,
      max_calls: parse_var(&lookup, "TOKENSEED_MAX_CALLS", DEFAULT_MAX_CALLS)?,
    })
  }
}
