//! State object definitions.
//!
//! Every piece of consensus state lives in exactly one [`StateObject`]
//! variant, keyed by an [`ObjectId`] (type tag + instance counter), so the
//! undo machinery can record a uniform before-image for anything the
//! evaluators touch. Singleton objects use instance zero.

use meridian_protocol::Authority;
use meridian_types::{
    AccountName, Amount, Asset, BlockId, ChainParams, Digest, Price, PublicKey, Timestamp,
    TransactionId,
};
use serde::{Deserialize, Serialize};

/// Closed set of object kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Account,
    Witness,
    GlobalProperties,
    DynamicProperties,
    WitnessSchedule,
    BlockSummary,
    TransactionDedup,
    ConvertRequest,
}

/// Identity of a state object: kind plus per-kind instance counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub ty: ObjectType,
    pub instance: u64,
}

impl ObjectId {
    pub fn new(ty: ObjectType, instance: u64) -> Self {
        Self { ty, instance }
    }

    /// Singletons live at instance zero.
    pub fn singleton(ty: ObjectType) -> Self {
        Self { ty, instance: 0 }
    }
}

/// An account: authorities plus one balance per asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountObject {
    pub name: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub memo_key: PublicKey,
    pub core_balance: u64,
    pub stable_balance: u64,
}

impl AccountObject {
    pub fn balance(&self, asset: Asset) -> Amount {
        match asset {
            Asset::Core => Amount::core(self.core_balance),
            Asset::Stable => Amount::stable(self.stable_balance),
        }
    }

    pub fn set_balance(&mut self, amount: Amount) {
        match amount.asset {
            Asset::Core => self.core_balance = amount.amount,
            Asset::Stable => self.stable_balance = amount.amount,
        }
    }
}

/// A registered block producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessObject {
    pub owner: AccountName,
    pub url: String,
    pub signing_key: PublicKey,
    /// Commitment the witness's next block must reveal the preimage of.
    pub next_secret_hash: Digest,
    /// Height of this witness's most recent block; production secrets are
    /// derived from it.
    pub last_produced_block: u32,
    pub total_produced: u64,
    pub total_missed: u64,
    pub last_feed: Option<Price>,
    pub last_feed_time: Timestamp,
}

/// Singleton: consensus parameters and the active witness set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalPropertyObject {
    pub params: ChainParams,
    pub active_witnesses: Vec<AccountName>,
    /// Median of current witness feeds, refreshed at maintenance.
    pub median_feed: Option<Price>,
}

/// Singleton: state that changes with every block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicPropertyObject {
    pub head_block_num: u32,
    pub head_block_id: BlockId,
    pub head_block_time: Timestamp,
    pub current_producer: AccountName,
    /// Absolute slot count since genesis, including missed slots.
    pub current_absolute_slot: u64,
    /// Accumulator of revealed production secrets.
    pub random_seed: Digest,
    pub last_irreversible_block_num: u32,
    pub next_maintenance_time: Timestamp,
}

/// Singleton: the materialized witness schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessScheduleObject {
    /// Shuffle policy: the current round's rotation.
    pub rotation: Vec<AccountName>,
    /// Explicit policy: absolute slot the near window starts at.
    pub near_window_base_slot: u64,
    /// Explicit policy: one producer per slot for the near window.
    pub near_window: Vec<AccountName>,
}

/// Ring entry of a recent block id, for TaPoS references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummaryObject {
    pub block_id: BlockId,
}

/// A recently applied transaction id, kept until its expiration passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDedupObject {
    pub trx_id: TransactionId,
    pub expiration: Timestamp,
}

/// A pending conversion, settled at the first maintenance after `due`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequestObject {
    pub owner: AccountName,
    pub amount: Amount,
    pub due: Timestamp,
}

/// The closed sum of all state objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateObject {
    Account(AccountObject),
    Witness(WitnessObject),
    GlobalProperties(GlobalPropertyObject),
    DynamicProperties(DynamicPropertyObject),
    WitnessSchedule(WitnessScheduleObject),
    BlockSummary(BlockSummaryObject),
    TransactionDedup(TransactionDedupObject),
    ConvertRequest(ConvertRequestObject),
}

impl StateObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Account(_) => ObjectType::Account,
            Self::Witness(_) => ObjectType::Witness,
            Self::GlobalProperties(_) => ObjectType::GlobalProperties,
            Self::DynamicProperties(_) => ObjectType::DynamicProperties,
            Self::WitnessSchedule(_) => ObjectType::WitnessSchedule,
            Self::BlockSummary(_) => ObjectType::BlockSummary,
            Self::TransactionDedup(_) => ObjectType::TransactionDedup,
            Self::ConvertRequest(_) => ObjectType::ConvertRequest,
        }
    }
}

impl From<AccountObject> for StateObject {
    fn from(o: AccountObject) -> Self {
        Self::Account(o)
    }
}

impl From<WitnessObject> for StateObject {
    fn from(o: WitnessObject) -> Self {
        Self::Witness(o)
    }
}

impl From<GlobalPropertyObject> for StateObject {
    fn from(o: GlobalPropertyObject) -> Self {
        Self::GlobalProperties(o)
    }
}

impl From<DynamicPropertyObject> for StateObject {
    fn from(o: DynamicPropertyObject) -> Self {
        Self::DynamicProperties(o)
    }
}

impl From<WitnessScheduleObject> for StateObject {
    fn from(o: WitnessScheduleObject) -> Self {
        Self::WitnessSchedule(o)
    }
}

impl From<BlockSummaryObject> for StateObject {
    fn from(o: BlockSummaryObject) -> Self {
        Self::BlockSummary(o)
    }
}

impl From<TransactionDedupObject> for StateObject {
    fn from(o: TransactionDedupObject) -> Self {
        Self::TransactionDedup(o)
    }
}

impl From<ConvertRequestObject> for StateObject {
    fn from(o: ConvertRequestObject) -> Self {
        Self::ConvertRequest(o)
    }
}
