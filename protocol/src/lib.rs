//! Wire model for the Meridian chain.
//!
//! Defines the closed operation set, signed transactions with TaPoS
//! references, block headers carrying the secret hash chain, and the
//! weighted-authority structures that gate them. Everything here is inert
//! data plus structural validation; state-dependent checks live in
//! `meridian-chain`.

pub mod authority;
pub mod block;
pub mod error;
pub mod operation;
pub mod transaction;

pub use authority::Authority;
pub use block::{derive_production_secret, secret_hash, BlockHeader, SignedBlock};
pub use error::ProtocolError;
pub use operation::{
    AccountCreateOperation, AccountUpdateOperation, ConvertOperation, CustomOperation,
    FeedPublishOperation, FillConvertOperation, Operation, ProducerRewardOperation,
    TransferOperation, WitnessUpdateOperation,
};
pub use transaction::{SignedTransaction, Transaction, TransactionSignature};
