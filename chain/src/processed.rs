//! Records produced by applying transactions and blocks.

use meridian_protocol::{Operation, SignedTransaction};
use meridian_store::ObjectId;
use meridian_types::TransactionId;

/// Per-operation evaluator outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Void,
    /// The evaluator created a state object (account, convert request, …).
    Object(ObjectId),
}

/// A transaction together with one result per operation.
#[derive(Clone, Debug)]
pub struct ProcessedTransaction {
    pub trx: SignedTransaction,
    pub results: Vec<OperationResult>,
}

/// One operation-history record, including synthetic ("virtual") entries
/// generated as side effects of block application.
#[derive(Clone, Debug)]
pub struct AppliedOperation {
    /// Id of the containing transaction; zero for virtual operations.
    pub trx_id: TransactionId,
    pub block_num: u32,
    /// Index of the transaction within its block; for virtual operations,
    /// one past the last transaction.
    pub trx_in_block: u32,
    pub op_in_trx: u32,
    /// Zero for submitted operations; a per-block counter for virtual ones.
    pub virtual_op: u32,
    pub op: Operation,
    pub result: OperationResult,
}

impl AppliedOperation {
    pub fn is_virtual(&self) -> bool {
        self.virtual_op > 0
    }
}
