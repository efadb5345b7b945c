//! # Tandoor
//!
//! Deadline-aware request batching in front of a single, exclusive compute
//! pipeline such as a diffusion model on one GPU.
//!
//! ## Overview
//!
//! Generation calls are expensive and get much cheaper per request when run in
//! batches, but callers arrive independently and cannot be asked to wait for
//! each other. This library sits between those callers and the pipeline:
//!
//! - Requests are validated against the inputs the configured task declares and
//!   queued in arrival order.
//! - A batch is formed as soon as the queue reaches capacity, or once the oldest
//!   queued request has waited `max_wait`, whichever comes first.
//! - Exactly one batch runs at a time. Its results, or its failure, are handed
//!   back to each original caller, who never learns batching happened.
//!
//! ## Architecture
//!
//! ### Admission
//!
//! [`BatchService`] implements the [`Batcher`] trait. `submit` returns a
//! [`Ticket`], a future resolving to the caller's own output; `generate`
//! submits and awaits in one step.
//!
//! ### Runner
//!
//! A single background task waits on the batch trigger, drains a prefix of the
//! queue, arranges it column-wise into a [`Batch`] and hands it to the
//! [`Executor`] on Tokio's blocking pool. Every drained task is settled before
//! the next batch is considered.
//!
//! ### Executor
//!
//! The [`Executor`] trait is the only seam to the model. It is synchronous and
//! all-or-nothing: one output per task in batch order, or one error for the
//! whole batch.
//!
//! ## Failure handling
//!
//! - Missing inputs are rejected before anything is queued.
//! - An executor error or panic is delivered to every task of its batch and the
//!   runner moves on to the next batch.
//! - An executor returning the wrong number of outputs fails its batch with an
//!   internal error.
//! - Stopping the service resolves every queued task with [`BatchError::Stopped`].
//!

mod communication;
mod batching;

pub mod config;
pub mod error;
pub mod executor;
pub mod input;
pub mod service;

pub use communication::{TaskId, Ticket};
pub use config::{BatchConfig, ExecutorSettings, Precision, ServiceConfig, TaskKind};
pub use error::{BatchError, ConfigError, ExecutorError};
pub use executor::{Batch, Executor};
pub use input::{InputField, InputValue, Inputs};
pub use service::{BatchService, Batcher};
