//! Genesis state initialization.

use crate::error::ChainError;
use meridian_protocol::{block::secret_hash, Authority};
use meridian_store::{
    AccountObject, DynamicPropertyObject, GlobalPropertyObject, ObjectStore, WitnessObject,
    WitnessScheduleObject,
};
use meridian_types::{
    AccountName, BlockId, ChainParams, Digest, PublicKey, SchedulerPolicy, Timestamp,
    GENESIS_ACCOUNT_NAME, TEMP_ACCOUNT_NAME,
};

/// Populate an empty object store with the genesis state: the bootstrap
/// producer, the reserved temporary account, and the three singletons.
pub fn initialize(
    store: &mut ObjectStore,
    params: &ChainParams,
    genesis_key: PublicKey,
) -> Result<(), ChainError> {
    if params.undo_capacity <= params.irreversibility_depth as usize {
        return Err(ChainError::Configuration(format!(
            "undo capacity {} must exceed irreversibility depth {}",
            params.undo_capacity, params.irreversibility_depth
        )));
    }
    if params.block_interval_secs == 0 {
        return Err(ChainError::Configuration(
            "block interval must be non-zero".into(),
        ));
    }

    let genesis_name = AccountName::new(GENESIS_ACCOUNT_NAME);
    store.create(AccountObject {
        name: genesis_name.clone(),
        owner: Authority::single_key(genesis_key),
        active: Authority::single_key(genesis_key),
        memo_key: genesis_key,
        core_balance: params.initial_supply,
        stable_balance: 0,
    })?;

    // The reserved temporary account: open authority, permanently empty at
    // transaction boundaries.
    store.create(AccountObject {
        name: AccountName::new(TEMP_ACCOUNT_NAME),
        owner: Authority::open(),
        active: Authority::open(),
        memo_key: genesis_key,
        core_balance: 0,
        stable_balance: 0,
    })?;

    store.create(WitnessObject {
        owner: genesis_name.clone(),
        url: String::new(),
        signing_key: genesis_key,
        next_secret_hash: secret_hash(&Digest::ZERO),
        last_produced_block: 0,
        total_produced: 0,
        total_missed: 0,
        last_feed: None,
        last_feed_time: Timestamp::EPOCH,
    })?;

    let active_witnesses = vec![genesis_name.clone()];
    store.create(GlobalPropertyObject {
        params: params.clone(),
        active_witnesses: active_witnesses.clone(),
        median_feed: None,
    })?;

    store.create(DynamicPropertyObject {
        head_block_num: 0,
        head_block_id: BlockId::ZERO,
        head_block_time: params.genesis_time,
        current_producer: genesis_name.clone(),
        current_absolute_slot: 0,
        random_seed: Digest::ZERO,
        last_irreversible_block_num: 0,
        next_maintenance_time: params
            .genesis_time
            .saturating_add_secs(params.maintenance_interval_secs),
    })?;

    let near_window = match params.scheduler {
        SchedulerPolicy::Shuffle => Vec::new(),
        SchedulerPolicy::Explicit { window } => (0..window)
            .map(|slot| active_witnesses[(slot % active_witnesses.len() as u64) as usize].clone())
            .collect(),
    };
    store.create(WitnessScheduleObject {
        rotation: active_witnesses,
        near_window_base_slot: 0,
        near_window,
    })?;

    Ok(())
}
