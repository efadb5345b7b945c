mod batcher;
mod core_trait;

pub use batcher::BatchService;
pub use core_trait::Batcher;
