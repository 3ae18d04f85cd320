//! Bounded-concurrency batch runner.

mod runner;

pub use runner::{BatchConfig, BatchRunner};
