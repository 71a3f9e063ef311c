//! Versioned object store for the Meridian chain.
//!
//! The [`ObjectStore`] is the snapshot/rollback primitive every higher
//! layer builds on: a keyed map of state objects with a stack of undo
//! layers recording before-images, so that any failed block or transaction
//! application reverts to byte-identical prior state. The block-storage
//! boundary owned by the embedding node is expressed as the [`BlockStore`]
//! trait; the rest of the codebase depends only on the trait.

pub mod block_store;
pub mod error;
pub mod object;
pub mod store;

pub use block_store::{BlockStore, MemoryBlockStore};
pub use error::StoreError;
pub use object::{
    AccountObject, BlockSummaryObject, ConvertRequestObject, DynamicPropertyObject,
    GlobalPropertyObject, ObjectId, ObjectType, StateObject, TransactionDedupObject,
    WitnessObject, WitnessScheduleObject,
};
pub use store::{ObjectStore, UndoSession};
