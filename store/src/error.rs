use crate::object::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0:?}")]
    NotFound(ObjectId),

    #[error("object already exists: {0:?}")]
    AlreadyExists(ObjectId),

    #[error("object {0:?} has unexpected type")]
    TypeMismatch(ObjectId),

    #[error("undo capacity exceeded ({capacity} layers)")]
    UndoCapacityExceeded { capacity: usize },

    #[error("no undoable revision")]
    NothingToUndo,

    #[error("storage error: {0}")]
    Backend(String),
}
