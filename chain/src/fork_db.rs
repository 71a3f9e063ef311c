//! Fork database — the DAG of not-yet-irreversible candidate blocks.
//!
//! Blocks are held in an arena keyed by id with explicit child lists, so
//! branches are traversed by index lookup rather than owning pointers.
//! Each item carries a schedule snapshot captured where its branch
//! diverged from the applied chain — never read from the current head —
//! so speculative branches validate self-consistently. Items behind the
//! irreversible boundary are pruned away.

use crate::error::ChainError;
use crate::schedule::{shuffle_rotation, witness_for_absolute_slot};
use meridian_crypto::blake2b_256_multi;
use meridian_protocol::SignedBlock;
use meridian_store::WitnessScheduleObject;
use meridian_types::{AccountName, BlockId, Digest, SchedulerPolicy, Timestamp};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Scheduling view captured where a branch diverged from the applied chain.
///
/// The witness set is frozen at the divergence point; slot base, random
/// seed and round reshuffles advance block-by-block along the branch via
/// [`ScheduleSnapshot::advance`], so every node derives the same view from
/// the same branch regardless of arrival order.
#[derive(Clone, Debug)]
pub struct ScheduleSnapshot {
    /// Head block time at the branch base.
    pub base_time: Timestamp,
    /// Absolute slot number at the branch base.
    pub base_aslot: u64,
    /// Secret-chain accumulator at the branch base.
    pub seed: Digest,
    pub policy: SchedulerPolicy,
    /// The materialized schedule at the branch base.
    pub schedule: WitnessScheduleObject,
    /// The active witness set at the divergence point.
    pub active: Vec<AccountName>,
}

impl ScheduleSnapshot {
    /// Producer this branch expects at an absolute slot.
    pub fn witness_for(&self, aslot: u64) -> Result<AccountName, ChainError> {
        witness_for_absolute_slot(self.policy, &self.schedule, &self.active, aslot)
    }

    /// The snapshot for a child of `block`, which consumed `delta` slots.
    ///
    /// Mirrors the end-of-block schedule housekeeping: absorb the revealed
    /// secret into the seed and reshuffle at round boundaries.
    pub fn advance(&self, block: &SignedBlock, delta: u64) -> ScheduleSnapshot {
        let mut next = self.clone();
        next.base_time = block.header.timestamp;
        next.base_aslot += delta;
        next.seed = Digest::new(blake2b_256_multi(&[
            self.seed.as_bytes(),
            block.header.previous_secret.as_bytes(),
        ]));
        let round = self.active.len().max(1) as u32;
        if block.num() % round == 0 && !next.active.is_empty() {
            match self.policy {
                SchedulerPolicy::Shuffle => {
                    next.schedule.rotation = shuffle_rotation(&next.seed, &next.active);
                }
                SchedulerPolicy::Explicit { window } => {
                    let len = next.active.len() as u64;
                    next.schedule.near_window_base_slot = next.base_aslot;
                    next.schedule.near_window = (0..window)
                        .map(|i| next.active[((next.base_aslot + i) % len) as usize].clone())
                        .collect();
                }
            }
        }
        next
    }
}

/// A candidate block tracked by the fork database.
#[derive(Clone, Debug)]
pub struct ForkItem {
    pub block: SignedBlock,
    pub id: BlockId,
    pub num: u32,
    pub schedule: ScheduleSnapshot,
}

impl ForkItem {
    pub fn new(block: SignedBlock, schedule: ScheduleSnapshot) -> Self {
        let id = block.id();
        let num = block.num();
        Self {
            block,
            id,
            num,
            schedule,
        }
    }

    pub fn previous(&self) -> BlockId {
        self.block.header.previous
    }
}

/// Arena of candidate blocks with branch traversal.
pub struct ForkDatabase {
    index: HashMap<BlockId, Arc<ForkItem>>,
    by_num: BTreeMap<u32, Vec<BlockId>>,
    children: HashMap<BlockId, Vec<BlockId>>,
    head: Option<Arc<ForkItem>>,
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            by_num: BTreeMap::new(),
            children: HashMap::new(),
            head: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&Arc<ForkItem>> {
        self.index.get(id)
    }

    pub fn head(&self) -> Option<&Arc<ForkItem>> {
        self.head.as_ref()
    }

    /// Link a new candidate under its previous block.
    ///
    /// The first block seeds the arena. The head moves only for a strictly
    /// greater height, so an equal-height sibling is stored but ignored
    /// for canonical-head purposes. Returns the head after insertion.
    pub fn push_block(&mut self, item: ForkItem) -> Result<Arc<ForkItem>, ChainError> {
        if self.index.contains_key(&item.id) {
            return Ok(self.head.clone().expect("non-empty fork db has a head"));
        }
        if !self.index.is_empty() && !self.index.contains_key(&item.previous()) {
            return Err(ChainError::UnlinkableBlock {
                id: item.id,
                previous: item.previous(),
            });
        }
        let arc = Arc::new(item);
        self.index.insert(arc.id, arc.clone());
        self.by_num.entry(arc.num).or_default().push(arc.id);
        self.children.entry(arc.previous()).or_default().push(arc.id);
        match &self.head {
            Some(head) if arc.num <= head.num => {}
            _ => self.head = Some(arc.clone()),
        }
        Ok(self.head.clone().expect("just inserted"))
    }

    /// Point the head at an applied item.
    pub fn set_head(&mut self, item: Arc<ForkItem>) {
        self.head = Some(item);
    }

    /// Move the head back to its parent, returning the popped item.
    ///
    /// The head becomes `None` when the parent is unknown (pruned or the
    /// arena root), matching a rewind to the last state-applied block.
    pub fn pop_block(&mut self) -> Option<Arc<ForkItem>> {
        let popped = self.head.take()?;
        self.head = self.index.get(&popped.previous()).cloned();
        Some(popped)
    }

    /// Remove an item and all of its descendants.
    pub fn remove(&mut self, id: &BlockId) {
        let mut queue = vec![*id];
        while let Some(current) = queue.pop() {
            if let Some(kids) = self.children.remove(&current) {
                queue.extend(kids);
            }
            if let Some(item) = self.index.remove(&current) {
                if let Some(ids) = self.by_num.get_mut(&item.num) {
                    ids.retain(|b| b != &current);
                    if ids.is_empty() {
                        self.by_num.remove(&item.num);
                    }
                }
                if let Some(parent_kids) = self.children.get_mut(&item.previous()) {
                    parent_kids.retain(|b| b != &current);
                }
            }
        }
        if let Some(head) = &self.head {
            if !self.index.contains_key(&head.id) {
                // Head was removed; fall back to the highest remaining item.
                self.head = self
                    .by_num
                    .iter()
                    .next_back()
                    .and_then(|(_, ids)| ids.first())
                    .and_then(|id| self.index.get(id))
                    .cloned();
            }
        }
    }

    /// Walk two tips back to their common ancestor.
    ///
    /// Returns the two branches ordered tip-first, each ending with the
    /// child of the common ancestor. One side is empty when one tip is an
    /// ancestor of the other.
    pub fn fetch_branch_from(
        &self,
        tip_a: BlockId,
        tip_b: BlockId,
    ) -> Result<(Vec<Arc<ForkItem>>, Vec<Arc<ForkItem>>), ChainError> {
        let mut first = self.require(&tip_a)?.clone();
        let mut second = self.require(&tip_b)?.clone();
        let mut branch_a = Vec::new();
        let mut branch_b = Vec::new();

        while first.num > second.num {
            branch_a.push(first.clone());
            first = self.require(&first.previous())?.clone();
        }
        while second.num > first.num {
            branch_b.push(second.clone());
            second = self.require(&second.previous())?.clone();
        }
        while first.id != second.id {
            branch_a.push(first.clone());
            branch_b.push(second.clone());
            first = self.require(&first.previous())?.clone();
            second = self.require(&second.previous())?.clone();
        }
        Ok((branch_a, branch_b))
    }

    /// Drop every item at or below the irreversible height.
    pub fn prune(&mut self, irreversible_num: u32) {
        let stale: Vec<BlockId> = self
            .by_num
            .range(..=irreversible_num)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in stale {
            if let Some(item) = self.index.remove(&id) {
                self.children.remove(&id);
                if let Some(parent_kids) = self.children.get_mut(&item.previous()) {
                    parent_kids.retain(|b| b != &id);
                }
            }
        }
        let cutoff = irreversible_num.saturating_add(1);
        self.by_num = self.by_num.split_off(&cutoff);
    }

    fn require(&self, id: &BlockId) -> Result<&Arc<ForkItem>, ChainError> {
        self.index.get(id).ok_or(ChainError::InvalidBlock {
            reason: format!("fork database branch disconnected at {id}"),
        })
    }
}

impl Default for ForkDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::BlockHeader;
    use meridian_types::{Digest, Signature};

    fn snapshot() -> ScheduleSnapshot {
        let genesis = AccountName::new("genesis");
        ScheduleSnapshot {
            base_time: Timestamp::new(0),
            base_aslot: 0,
            seed: Digest::ZERO,
            policy: SchedulerPolicy::Shuffle,
            schedule: WitnessScheduleObject {
                rotation: vec![genesis.clone()],
                near_window_base_slot: 0,
                near_window: Vec::new(),
            },
            active: vec![genesis],
        }
    }

    /// Build a block chained under `previous`; `salt` distinguishes
    /// otherwise-identical siblings.
    fn make_item(previous: BlockId, salt: u8) -> ForkItem {
        let block = SignedBlock {
            header: BlockHeader {
                previous,
                timestamp: Timestamp::new(1_000 + u64::from(salt)),
                witness: AccountName::new("genesis"),
                transaction_merkle_root: Digest::new([salt; 32]),
                previous_secret: Digest::ZERO,
                next_secret_hash: Digest::ZERO,
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };
        ForkItem::new(block, snapshot())
    }

    #[test]
    fn first_block_seeds_the_arena() {
        let mut db = ForkDatabase::new();
        let item = make_item(BlockId::ZERO, 1);
        let id = item.id;
        let head = db.push_block(item).unwrap();
        assert_eq!(head.id, id);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn unknown_previous_is_unlinkable() {
        let mut db = ForkDatabase::new();
        db.push_block(make_item(BlockId::ZERO, 1)).unwrap();
        let orphan = make_item(BlockId::from_digest(Digest::new([0xFF; 32]), 9), 2);
        assert!(matches!(
            db.push_block(orphan).unwrap_err(),
            ChainError::UnlinkableBlock { .. }
        ));
    }

    #[test]
    fn equal_height_sibling_does_not_move_head() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();

        let a = make_item(root_id, 2);
        let a_id = a.id;
        db.push_block(a).unwrap();
        assert_eq!(db.head().unwrap().id, a_id);

        // Same height, different id: stored, head unchanged.
        let b = make_item(root_id, 3);
        let b_id = b.id;
        let head = db.push_block(b).unwrap();
        assert_eq!(head.id, a_id);
        assert!(db.contains(&b_id));
    }

    #[test]
    fn strictly_higher_branch_takes_head() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();

        let a = make_item(root_id, 2);
        let a_id = a.id;
        db.push_block(a).unwrap();

        let b = make_item(root_id, 3);
        let b_id = b.id;
        db.push_block(b).unwrap();
        let b2 = make_item(b_id, 4);
        let b2_id = b2.id;
        let head = db.push_block(b2).unwrap();

        assert_eq!(head.id, b2_id);
        assert_ne!(head.id, a_id);
    }

    #[test]
    fn fetch_branch_from_finds_common_ancestor() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();

        // Branch A: root -> a1; Branch B: root -> b1 -> b2.
        let a1 = make_item(root_id, 2);
        let a1_id = a1.id;
        db.push_block(a1).unwrap();
        let b1 = make_item(root_id, 3);
        let b1_id = b1.id;
        db.push_block(b1).unwrap();
        let b2 = make_item(b1_id, 4);
        let b2_id = b2.id;
        db.push_block(b2).unwrap();

        let (branch_b, branch_a) = db.fetch_branch_from(b2_id, a1_id).unwrap();
        assert_eq!(
            branch_b.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![b2_id, b1_id]
        );
        assert_eq!(
            branch_a.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![a1_id]
        );
        // Both branches end with children of the common ancestor.
        assert_eq!(branch_b.last().unwrap().previous(), root_id);
        assert_eq!(branch_a.last().unwrap().previous(), root_id);
    }

    #[test]
    fn fetch_branch_from_same_tip_is_empty() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();
        let (a, b) = db.fetch_branch_from(root_id, root_id).unwrap();
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn pop_block_walks_toward_root() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();
        let child = make_item(root_id, 2);
        let child_id = child.id;
        db.push_block(child).unwrap();

        let popped = db.pop_block().unwrap();
        assert_eq!(popped.id, child_id);
        assert_eq!(db.head().unwrap().id, root_id);

        let popped = db.pop_block().unwrap();
        assert_eq!(popped.id, root_id);
        assert!(db.head().is_none());
    }

    #[test]
    fn remove_prunes_descendants() {
        let mut db = ForkDatabase::new();
        let root = make_item(BlockId::ZERO, 1);
        let root_id = root.id;
        db.push_block(root).unwrap();
        let mid = make_item(root_id, 2);
        let mid_id = mid.id;
        db.push_block(mid).unwrap();
        let tip = make_item(mid_id, 3);
        let tip_id = tip.id;
        db.push_block(tip).unwrap();

        db.remove(&mid_id);
        assert!(!db.contains(&mid_id));
        assert!(!db.contains(&tip_id));
        assert!(db.contains(&root_id));
        // Head fell back to the highest survivor.
        assert_eq!(db.head().unwrap().id, root_id);
    }

    #[test]
    fn prune_drops_irreversible_items() {
        let mut db = ForkDatabase::new();
        let b1 = make_item(BlockId::ZERO, 1);
        let b1_id = b1.id;
        db.push_block(b1).unwrap();
        let b2 = make_item(b1_id, 2);
        let b2_id = b2.id;
        db.push_block(b2).unwrap();
        let b3 = make_item(b2_id, 3);
        let b3_id = b3.id;
        db.push_block(b3).unwrap();

        db.prune(2);
        assert!(!db.contains(&b1_id));
        assert!(!db.contains(&b2_id));
        assert!(db.contains(&b3_id));
        assert_eq!(db.head().unwrap().id, b3_id);
    }
}
