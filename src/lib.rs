pub mod config;
pub mod rng;
pub mod sampler;
pub mod token_hash;
