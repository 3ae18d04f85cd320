//! easel-core
//!
//! Task-scheduling core for prompt-to-artifact generation.
//!
//! A caller submits "generate an artifact from this prompt" requests; this
//! crate processes them without overwhelming the provider and without
//! wasting spend once the caller's credits run out.
//!
//! # Modules
//! - **domain**: task model, lifecycle state machine, prompt resolution,
//!   error taxonomy, change events
//! - **ports**: abstraction seams ([`ports::TaskRepository`],
//!   [`ports::GenerationClient`])
//! - **queue**: the single-flight [`queue::QueueProcessor`] with retry
//!   backoff and pause control, plus the [`queue::QueueStats`] projection
//! - **batch**: the bounded-concurrency [`batch::BatchRunner`] with a shared
//!   cancellation flag and credit circuit breaker
//! - **impls**: in-memory implementations for development and tests

pub mod batch;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
