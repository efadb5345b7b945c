//! # Executor contract
//!
//! The executor is the opaque, possibly slow and possibly fallible compute call
//! behind the runner. It receives one [`Batch`] at a time and either returns one
//! output per task, in batch order, or fails the whole batch.

mod batch;
mod core_trait;

pub use batch::Batch;
pub use core_trait::Executor;
