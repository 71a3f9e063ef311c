//! Meridian chain state machine.
//!
//! The core of the node: accepts candidate blocks and transactions,
//! decides the canonical chain under competing forks, applies state
//! transitions deterministically, and guarantees that any failure leaves
//! state byte-identical to before the attempt. Built from:
//!
//! - [`fork_db`] — DAG of not-yet-irreversible candidate blocks
//! - [`schedule`] — deterministic witness scheduling
//! - [`authority`] — weighted-authority signature verification
//! - [`evaluator`] — the fixed operation-evaluator table
//! - [`chain`] — block/transaction processors and the pending pool
//! - [`maintenance`] — periodic settlement and feed refresh
//! - [`events`] — synchronous applied-block/operation signals

pub mod authority;
pub mod chain;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod flags;
pub mod fork_db;
pub mod genesis;
pub mod maintenance;
pub mod processed;
pub mod schedule;

pub use chain::Chain;
pub use error::{AuthorityError, ChainError};
pub use events::{ChainEvent, EventBus};
pub use flags::SkipFlags;
pub use fork_db::{ForkDatabase, ForkItem, ScheduleSnapshot};
pub use processed::{AppliedOperation, OperationResult, ProcessedTransaction};
