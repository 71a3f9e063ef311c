//! Fundamental types for the Meridian chain.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: account names, asset amounts, block/transaction identifiers,
//! key material, timestamps, and chain parameters.

pub mod amount;
pub mod id;
pub mod keys;
pub mod name;
pub mod params;
pub mod time;

pub use amount::{Amount, Asset, Price};
pub use id::{BlockId, Digest, ParseDigestError, TransactionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use name::{AccountName, GENESIS_ACCOUNT_NAME, TEMP_ACCOUNT_NAME};
pub use params::{ChainParams, SchedulerPolicy};
pub use time::Timestamp;
