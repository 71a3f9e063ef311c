//! Witness scheduling: slot arithmetic and producer selection.
//!
//! Two policies are supported. *Shuffle* rotates through a per-round
//! permutation of the active set, reseeded from the chain's secret-chain
//! accumulator. *Explicit* materializes a near window of upcoming slots
//! and falls back to a deterministic far-future generator for slots beyond
//! it, so producer selection stays defined across arbitrarily long chain
//! halts. Both are pure functions of state — repeated queries under
//! identical state give identical answers.

use crate::error::ChainError;
use crate::flags::SkipFlags;
use crate::fork_db::ForkItem;
use meridian_crypto::blake2b_256_multi;
use meridian_protocol::SignedBlock;
use meridian_store::WitnessScheduleObject;
use meridian_types::{AccountName, Digest, PublicKey, SchedulerPolicy, Timestamp};

/// Fixed seed for the far-future fallback generator.
pub const FAR_FUTURE_SCHEDULE_SEED: u64 = 0x4d45_5249_4449_414e;

/// Wall-clock time of a production slot relative to the current head.
///
/// Slot zero denotes the head block itself and maps to the epoch sentinel;
/// the first producible slot is one. Before any block exists, slots count
/// from the genesis time.
pub fn slot_time(
    head_num: u32,
    head_time: Timestamp,
    genesis_time: Timestamp,
    interval: u64,
    slot: u64,
) -> Timestamp {
    if slot == 0 {
        return Timestamp::EPOCH;
    }
    if head_num == 0 {
        return genesis_time.saturating_add_secs(slot * interval);
    }
    head_time
        .align_down(interval)
        .saturating_add_secs(slot * interval)
}

/// Inverse of [`slot_time`]: the slot containing `when`, zero if `when`
/// precedes the first producible slot.
pub fn slot_at_time(
    head_num: u32,
    head_time: Timestamp,
    genesis_time: Timestamp,
    interval: u64,
    when: Timestamp,
) -> u64 {
    let first = slot_time(head_num, head_time, genesis_time, interval, 1);
    if when < first {
        return 0;
    }
    when.secs_since(first) / interval + 1
}

/// Deterministic per-round permutation of the active set.
pub fn shuffle_rotation(seed: &Digest, names: &[AccountName]) -> Vec<AccountName> {
    let mut out = names.to_vec();
    let len = out.len();
    for i in 0..len {
        let h = blake2b_256_multi(&[seed.as_bytes(), &(i as u64).to_le_bytes()]);
        let draw = u64::from_le_bytes(h[0..8].try_into().expect("8 bytes"));
        let j = i + (draw as usize) % (len - i);
        out.swap(i, j);
    }
    out
}

/// Deterministic producer for a slot beyond the precomputed window.
pub fn far_future_witness(active: &[AccountName], aslot: u64) -> Option<&AccountName> {
    if active.is_empty() {
        return None;
    }
    let h = blake2b_256_multi(&[
        &FAR_FUTURE_SCHEDULE_SEED.to_le_bytes(),
        &aslot.to_le_bytes(),
    ]);
    let draw = u64::from_le_bytes(h[0..8].try_into().expect("8 bytes"));
    active.get((draw as usize) % active.len())
}

/// The witness authorized for an absolute slot under the active policy.
pub fn witness_for_absolute_slot(
    policy: SchedulerPolicy,
    schedule: &WitnessScheduleObject,
    active: &[AccountName],
    aslot: u64,
) -> Result<AccountName, ChainError> {
    match policy {
        SchedulerPolicy::Shuffle => {
            if schedule.rotation.is_empty() {
                return Err(ChainError::ScheduleViolation {
                    reason: "empty witness rotation".into(),
                });
            }
            let idx = (aslot % schedule.rotation.len() as u64) as usize;
            Ok(schedule.rotation[idx].clone())
        }
        SchedulerPolicy::Explicit { .. } => {
            let base = schedule.near_window_base_slot;
            let end = base + schedule.near_window.len() as u64;
            if aslot >= base && aslot < end {
                return Ok(schedule.near_window[(aslot - base) as usize].clone());
            }
            far_future_witness(active, aslot)
                .cloned()
                .ok_or(ChainError::ScheduleViolation {
                    reason: "empty active witness set".into(),
                })
        }
    }
}

/// Verify that a block was produced by the witness its branch schedules
/// for its timestamp, and that the header signature matches.
///
/// Expectations come from the fork item's branch snapshot — the state at
/// the point this branch diverged — never from the current head. Returns
/// the slot delta from the branch base, used for missed-slot accounting.
pub fn verify_signer(
    chain_id: &Digest,
    block: &SignedBlock,
    item: &ForkItem,
    signing_key: &PublicKey,
    genesis_time: Timestamp,
    interval: u64,
    skip: SkipFlags,
) -> Result<u64, ChainError> {
    let snap = &item.schedule;
    let base_num = item.num.saturating_sub(1);
    let delta = slot_at_time(
        base_num,
        snap.base_time,
        genesis_time,
        interval,
        block.header.timestamp,
    );
    if delta == 0 {
        return Err(ChainError::ScheduleViolation {
            reason: "block timestamp not after its branch base".into(),
        });
    }
    if !skip.contains(SkipFlags::WITNESS_SCHEDULE) {
        let expected = snap.witness_for(snap.base_aslot + delta)?;
        if expected != block.header.witness {
            return Err(ChainError::ScheduleViolation {
                reason: format!(
                    "slot belongs to {expected}, block signed by {}",
                    block.header.witness
                ),
            });
        }
    }
    if !skip.contains(SkipFlags::SIGNATURE) && !block.verify_signer(chain_id, signing_key) {
        return Err(ChainError::ScheduleViolation {
            reason: format!("invalid witness signature for {}", block.header.witness),
        });
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<AccountName> {
        (0..n).map(|i| AccountName::new(format!("wit-{i:02}"))).collect()
    }

    #[test]
    fn slot_zero_is_sentinel() {
        assert_eq!(
            slot_time(5, Timestamp::new(100), Timestamp::new(0), 3, 0),
            Timestamp::EPOCH
        );
    }

    #[test]
    fn genesis_slots_count_from_genesis_time() {
        let genesis = Timestamp::new(900);
        assert_eq!(slot_time(0, genesis, genesis, 3, 1), Timestamp::new(903));
        assert_eq!(slot_time(0, genesis, genesis, 3, 4), Timestamp::new(912));
    }

    #[test]
    fn slots_align_to_interval_boundaries() {
        // Head time 103 aligns down to 102 with a 3s interval.
        let t = slot_time(7, Timestamp::new(103), Timestamp::new(0), 3, 1);
        assert_eq!(t, Timestamp::new(105));
        assert_eq!(slot_time(7, Timestamp::new(103), Timestamp::new(0), 3, 2), Timestamp::new(108));
    }

    #[test]
    fn slot_at_time_inverts_slot_time() {
        let head_time = Timestamp::new(120);
        let genesis = Timestamp::new(0);
        for slot in 1..10 {
            let t = slot_time(4, head_time, genesis, 3, slot);
            assert_eq!(slot_at_time(4, head_time, genesis, 3, t), slot);
        }
        // Before the first slot: zero.
        assert_eq!(slot_at_time(4, head_time, genesis, 3, Timestamp::new(121)), 0);
    }

    #[test]
    fn shuffle_is_deterministic() {
        let seed = Digest::new([7u8; 32]);
        let set = names(8);
        assert_eq!(shuffle_rotation(&seed, &set), shuffle_rotation(&seed, &set));
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let seed = Digest::new([9u8; 32]);
        let set = names(8);
        let mut shuffled = shuffle_rotation(&seed, &set);
        shuffled.sort();
        let mut sorted = set.clone();
        sorted.sort();
        assert_eq!(shuffled, sorted);
    }

    #[test]
    fn different_seeds_usually_differ() {
        let set = names(8);
        let a = shuffle_rotation(&Digest::new([1u8; 32]), &set);
        let b = shuffle_rotation(&Digest::new([2u8; 32]), &set);
        assert_ne!(a, b);
    }

    #[test]
    fn far_future_is_deterministic_and_in_range() {
        let set = names(5);
        for aslot in [1u64, 1_000, u64::MAX / 2] {
            let a = far_future_witness(&set, aslot).unwrap();
            let b = far_future_witness(&set, aslot).unwrap();
            assert_eq!(a, b);
            assert!(set.contains(a));
        }
        assert!(far_future_witness(&[], 5).is_none());
    }

    #[test]
    fn explicit_policy_uses_near_window_then_fallback() {
        let set = names(4);
        let schedule = WitnessScheduleObject {
            rotation: Vec::new(),
            near_window_base_slot: 10,
            near_window: set.clone(),
        };
        let policy = SchedulerPolicy::Explicit { window: 4 };

        // Inside the window: direct lookup.
        let w = witness_for_absolute_slot(policy, &schedule, &set, 12).unwrap();
        assert_eq!(w, set[2]);

        // Beyond the window: deterministic far-future fallback.
        let far1 = witness_for_absolute_slot(policy, &schedule, &set, 10_000).unwrap();
        let far2 = witness_for_absolute_slot(policy, &schedule, &set, 10_000).unwrap();
        assert_eq!(far1, far2);
        assert!(set.contains(&far1));
    }

    #[test]
    fn shuffle_policy_indexes_by_absolute_slot() {
        let set = names(3);
        let schedule = WitnessScheduleObject {
            rotation: set.clone(),
            near_window_base_slot: 0,
            near_window: Vec::new(),
        };
        let w = witness_for_absolute_slot(SchedulerPolicy::Shuffle, &schedule, &set, 7).unwrap();
        assert_eq!(w, set[1]);
    }
}
