//! Roll request worker.
//!
//! Claims pending rows from the shared `roll_requests` table, sends an animated
//! roll to each request's chat and records the outcome in the same transaction.

pub mod cycle;
pub mod lifecycle;
pub mod processor;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
