//! Write coordination
//!
//! The coordinator is responsible for:
//! - Conflict resolution (last writer wins by logical timestamp)
//! - Turning reads and single-row conditional mutations into a safe update
//! - Bounded retry of lost update races

pub mod retry;
pub mod writer;

pub use retry::RetryPolicy;
pub use writer::{PutOutcome, WriteCoordinator};
