//! Queue worker: the hosting runtime for the update pipeline.
//!
//! Polls the update queue, runs each message through the
//! [`UpdateService`](crate::update::UpdateService) and settles it:
//! - handled (`Ok`): deleted
//! - faulted (`Err`): left on the queue for redelivery
//! - delivered more than `max_dequeue_count` times: copied to the poison
//!   queue and deleted without processing

mod runner;
mod types;

pub use runner::QueueWorker;
pub use types::{MessageDisposition, WorkerError, WorkerSettings, WorkerStatus};
