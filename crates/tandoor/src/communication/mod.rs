mod pending_task;
mod ticket;

pub use pending_task::TaskId;
pub(crate) use pending_task::{Completion, PendingTask};
pub use ticket::Ticket;
