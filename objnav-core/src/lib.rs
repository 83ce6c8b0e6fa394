pub mod actions;
pub mod config;
pub mod controller;
pub mod env;
pub mod episode;
pub mod error;
pub mod rng;
pub mod rollout;
pub mod vocabulary;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
