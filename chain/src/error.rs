use meridian_store::StoreError;
use meridian_types::{AccountName, BlockId, PublicKey, TransactionId};
use thiserror::Error;

/// Failures of transaction authority verification.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("missing required authority of account {account}")]
    Insufficient { account: AccountName },

    #[error("irrelevant signature by key {key:?}")]
    IrrelevantSignature { key: PublicKey },

    #[error("authority recursion depth exceeded")]
    DepthExceeded,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("structural validation failed: {0}")]
    StructuralValidation(#[from] meridian_protocol::ProtocolError),

    #[error("unlinkable block {id}: unknown previous {previous}")]
    UnlinkableBlock { id: BlockId, previous: BlockId },

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error("transaction expiration invalid: {reason}")]
    Expiration { reason: String },

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),

    #[error("TaPoS mismatch: transaction references a stale or unknown block")]
    TaposMismatch,

    #[error("transaction merkle root mismatch")]
    MerkleMismatch,

    #[error("schedule violation: {reason}")]
    ScheduleViolation { reason: String },

    #[error("evaluator failure in {op}: {reason}")]
    Evaluator { op: &'static str, reason: String },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("block size {size} exceeds maximum {max}")]
    BlockTooLarge { size: u64, max: u32 },

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(String),
}
