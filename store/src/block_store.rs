//! Block storage boundary.
//!
//! Persistent block storage is owned by the embedding node; the chain core
//! only needs lookup by id, by number, and by previous id. Every backend
//! implements this trait — the in-memory implementation below is the
//! reference used by tests and light deployments.

use crate::error::StoreError;
use meridian_protocol::SignedBlock;
use meridian_types::BlockId;
use std::collections::{BTreeMap, HashMap};

/// Trait for append-mostly block storage.
pub trait BlockStore {
    /// Store a block, indexed by id, number, and previous id.
    fn put_block(&mut self, block: &SignedBlock) -> Result<(), StoreError>;

    /// Retrieve a block by id.
    fn get_block(&self, id: &BlockId) -> Result<Option<SignedBlock>, StoreError>;

    /// Retrieve a block by height.
    fn get_block_by_number(&self, num: u32) -> Result<Option<SignedBlock>, StoreError>;

    /// All stored blocks whose `previous` equals `id`.
    fn get_by_previous(&self, id: &BlockId) -> Result<Vec<SignedBlock>, StoreError>;

    /// Whether a block id is present.
    fn contains(&self, id: &BlockId) -> Result<bool, StoreError>;

    /// Total number of stored blocks.
    fn block_count(&self) -> Result<u64, StoreError>;
}

/// In-memory block store.
#[derive(Default)]
pub struct MemoryBlockStore {
    by_id: HashMap<BlockId, SignedBlock>,
    by_num: BTreeMap<u32, BlockId>,
    by_prev: HashMap<BlockId, Vec<BlockId>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put_block(&mut self, block: &SignedBlock) -> Result<(), StoreError> {
        let id = block.id();
        if self.by_id.insert(id, block.clone()).is_none() {
            self.by_num.insert(block.num(), id);
            self.by_prev.entry(block.header.previous).or_default().push(id);
        }
        Ok(())
    }

    fn get_block(&self, id: &BlockId) -> Result<Option<SignedBlock>, StoreError> {
        Ok(self.by_id.get(id).cloned())
    }

    fn get_block_by_number(&self, num: u32) -> Result<Option<SignedBlock>, StoreError> {
        Ok(self
            .by_num
            .get(&num)
            .and_then(|id| self.by_id.get(id))
            .cloned())
    }

    fn get_by_previous(&self, id: &BlockId) -> Result<Vec<SignedBlock>, StoreError> {
        Ok(self
            .by_prev
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.by_id.get(child))
            .cloned()
            .collect())
    }

    fn contains(&self, id: &BlockId) -> Result<bool, StoreError> {
        Ok(self.by_id.contains_key(id))
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.by_id.len() as u64)
    }
}
