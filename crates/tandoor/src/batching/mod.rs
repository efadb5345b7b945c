//! # Batching
//!
//! The pieces that turn independently arriving tasks into serialized batches.
//!
//! * [`trigger`] - The policy deciding when queued tasks form a batch: capacity
//!   reached, or the oldest task has waited `max_wait`, whichever comes first.
//!
//! * [`queue`] - The FIFO shared by every caller and the runner. Every mutation
//!   re-evaluates the trigger inside the same critical section.
//!
//! * [`batch`] - The runner loop. It alone drains the queue and calls the
//!   executor, one batch at a time.
//!
//! * [`worker`] - Owns the spawned runner and stops it on shutdown or drop.
//!
pub(crate) mod batch;
pub(crate) mod queue;
pub(crate) mod trigger;
pub(crate) mod worker;
