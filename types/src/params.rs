//! Chain parameters — consensus constants every node must agree on.

use crate::amount::AMOUNT_UNIT;
use crate::id::Digest;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Which witness scheduling policy is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerPolicy {
    /// Round robin over a rotation reshuffled once per round from the
    /// chain's random seed.
    Shuffle,
    /// An explicit precomputed schedule covering the next `window` slots,
    /// with a deterministic far-future generator beyond it.
    Explicit { window: u64 },
}

/// Consensus parameters stored by every node.
///
/// These are fixed at genesis for a given network; test networks override
/// individual fields before constructing the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Domain separator mixed into every signing digest.
    pub chain_id: Digest,

    /// Timestamp of the genesis state; the first block occupies the first
    /// slot at or after this time.
    pub genesis_time: Timestamp,

    /// Seconds per production slot.
    pub block_interval_secs: u64,

    /// Maximum serialized block size in bytes. Transactions that would
    /// overflow the budget during production are postponed, not rejected.
    pub max_block_size: u32,

    /// Maximum distance a transaction expiration may lie in the future.
    /// This also bounds the duplicate-detection window.
    pub max_trx_expiration_secs: u64,

    /// Maximum recursion depth when resolving account authorities.
    pub max_authority_depth: u32,

    /// Seconds between periodic maintenance runs.
    pub maintenance_interval_secs: u64,

    /// Delay between a convert request and its settlement.
    pub convert_delay_secs: u64,

    /// Blocks behind head at which a block becomes irreversible.
    pub irreversibility_depth: u32,

    /// Maximum depth of the undo stack (how far back state can roll back).
    pub undo_capacity: usize,

    /// Maximum number of witnesses in the active set.
    pub max_witnesses: usize,

    /// Block height at which secret-hash-chain enforcement begins.
    pub secret_chain_activation_num: u32,

    /// Core-asset supply credited to the genesis account at initialization.
    pub initial_supply: u64,

    /// Core-asset reward credited to the producer of each block.
    pub producer_reward: u64,

    /// Core-asset fee burned when creating an account.
    pub account_creation_fee: u64,

    /// Active scheduling policy.
    pub scheduler: SchedulerPolicy,
}

/// The production network's chain id.
pub const MAINNET_CHAIN_ID: Digest = Digest::new([
    0x6d, 0x65, 0x72, 0x69, 0x64, 0x69, 0x61, 0x6e, 0x2d, 0x6d, 0x61, 0x69, 0x6e, 0x6e, 0x65,
    0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x01,
]);

impl ChainParams {
    /// Production defaults.
    pub fn meridian_defaults() -> Self {
        Self {
            chain_id: MAINNET_CHAIN_ID,
            genesis_time: Timestamp::new(1_700_000_000),
            block_interval_secs: 3,
            max_block_size: 65_536,
            max_trx_expiration_secs: 3_600,
            max_authority_depth: 2,
            maintenance_interval_secs: 24 * 3_600,
            convert_delay_secs: 3 * 24 * 3_600 + 12 * 3_600, // 3.5 days
            irreversibility_depth: 15,
            undo_capacity: 64,
            max_witnesses: 21,
            secret_chain_activation_num: 1,
            initial_supply: 1_000_000 * AMOUNT_UNIT,
            producer_reward: AMOUNT_UNIT,
            account_creation_fee: AMOUNT_UNIT,
            scheduler: SchedulerPolicy::Shuffle,
        }
    }
}

/// Default is the production configuration.
impl Default for ChainParams {
    fn default() -> Self {
        Self::meridian_defaults()
    }
}
