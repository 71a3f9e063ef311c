//! The chain state machine.
//!
//! Accepts candidate blocks and transactions, decides the canonical chain
//! under competing forks, applies state transitions deterministically, and
//! guarantees that any failure leaves state byte-identical to before the
//! attempt. Single writer: every mutation takes `&mut self`, and a call
//! either fully commits or fully reverts before returning.

use crate::authority::verify_authority;
use crate::error::ChainError;
use crate::evaluator::{apply_operation, credit, OpContext};
use crate::events::{ChainEvent, EventBus};
use crate::flags::SkipFlags;
use crate::fork_db::{ForkDatabase, ForkItem, ScheduleSnapshot};
use crate::genesis;
use crate::maintenance;
use crate::processed::{AppliedOperation, OperationResult, ProcessedTransaction};
use crate::schedule;
use meridian_crypto::{blake2b_256_multi, public_from_private};
use meridian_protocol::{
    derive_production_secret, secret_hash, BlockHeader, Operation, ProducerRewardOperation,
    SignedBlock, SignedTransaction,
};
use meridian_store::{
    BlockStore, BlockSummaryObject, ObjectId, ObjectStore, ObjectType, StateObject,
    TransactionDedupObject, UndoSession,
};
use meridian_types::{
    AccountName, Amount, BlockId, ChainParams, Digest, PrivateKey, Signature, Timestamp,
    TransactionId, TEMP_ACCOUNT_NAME,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// The chain state machine.
pub struct Chain {
    state: ObjectStore,
    fork_db: ForkDatabase,
    blocks: Box<dyn BlockStore + Send + Sync>,
    bus: EventBus,
    chain_id: Digest,
    /// Applied-but-unconfirmed transactions, in application order.
    pending: Vec<SignedTransaction>,
    /// The single open session holding the pending pool's cumulative effect.
    pending_session: Option<UndoSession>,
    /// Transactions popped off abandoned blocks, awaiting re-application.
    popped: VecDeque<SignedTransaction>,
}

impl Chain {
    /// Initialize a chain at genesis.
    pub fn new(
        params: ChainParams,
        genesis_key: meridian_types::PublicKey,
        blocks: Box<dyn BlockStore + Send + Sync>,
    ) -> Result<Self, ChainError> {
        let mut state = ObjectStore::new(params.undo_capacity);
        genesis::initialize(&mut state, &params, genesis_key)?;
        Ok(Self {
            state,
            fork_db: ForkDatabase::new(),
            blocks,
            bus: EventBus::new(),
            chain_id: params.chain_id,
            pending: Vec::new(),
            pending_session: None,
            popped: VecDeque::new(),
        })
    }

    /// Subscribe to chain events. Listeners run synchronously after commit.
    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.bus.subscribe(listener);
    }

    /// Read-only access to chain state for query layers.
    pub fn state(&self) -> &ObjectStore {
        &self.state
    }

    pub fn pending_transactions(&self) -> &[SignedTransaction] {
        &self.pending
    }

    pub fn head_block_num(&self) -> Result<u32, ChainError> {
        Ok(self.state.dynamics()?.head_block_num)
    }

    pub fn head_block_id(&self) -> Result<BlockId, ChainError> {
        Ok(self.state.dynamics()?.head_block_id)
    }

    pub fn head_block_time(&self) -> Result<Timestamp, ChainError> {
        Ok(self.state.dynamics()?.head_block_time)
    }

    pub fn last_irreversible_block_num(&self) -> Result<u32, ChainError> {
        Ok(self.state.dynamics()?.last_irreversible_block_num)
    }

    fn params(&self) -> Result<ChainParams, ChainError> {
        Ok(self.state.globals()?.params.clone())
    }

    /// Fetch an applied block by id from the block store.
    pub fn fetch_block(&self, id: &BlockId) -> Result<Option<SignedBlock>, ChainError> {
        Ok(self.blocks.get_block(id)?)
    }

    /// Fetch the canonical block at a height from the block store.
    pub fn fetch_block_by_number(&self, num: u32) -> Result<Option<SignedBlock>, ChainError> {
        Ok(self.blocks.get_block_by_number(num)?)
    }

    // ── Scheduling queries ──────────────────────────────────────────────

    /// Wall-clock time of a future production slot (slot 1 is the next).
    pub fn slot_time(&self, slot: u64) -> Result<Timestamp, ChainError> {
        let params = self.params()?;
        let dgp = self.state.dynamics()?;
        Ok(schedule::slot_time(
            dgp.head_block_num,
            dgp.head_block_time,
            params.genesis_time,
            params.block_interval_secs,
            slot,
        ))
    }

    /// The slot containing `when`, zero if it is not after the head.
    pub fn slot_at_time(&self, when: Timestamp) -> Result<u64, ChainError> {
        let params = self.params()?;
        let dgp = self.state.dynamics()?;
        Ok(schedule::slot_at_time(
            dgp.head_block_num,
            dgp.head_block_time,
            params.genesis_time,
            params.block_interval_secs,
            when,
        ))
    }

    /// The witness authorized to produce at `slot`.
    ///
    /// A pure function of state: repeated calls under identical state give
    /// identical answers.
    pub fn scheduled_witness(&self, slot: u64) -> Result<AccountName, ChainError> {
        let globals = self.state.globals()?;
        let dgp = self.state.dynamics()?;
        let sched = self.state.schedule()?;
        schedule::witness_for_absolute_slot(
            globals.params.scheduler,
            sched,
            &globals.active_witnesses,
            dgp.current_absolute_slot + slot,
        )
    }

    fn live_snapshot(&self) -> Result<ScheduleSnapshot, ChainError> {
        let globals = self.state.globals()?;
        let dgp = self.state.dynamics()?;
        let sched = self.state.schedule()?;
        Ok(ScheduleSnapshot {
            base_time: dgp.head_block_time,
            base_aslot: dgp.current_absolute_slot,
            seed: dgp.random_seed,
            policy: globals.params.scheduler,
            schedule: sched.clone(),
            active: globals.active_witnesses.clone(),
        })
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Apply a transaction into the pending pool.
    pub fn push_transaction(
        &mut self,
        trx: SignedTransaction,
        skip: SkipFlags,
    ) -> Result<ProcessedTransaction, ChainError> {
        if self.pending_session.is_none() {
            // The pool session is internal bookkeeping; it must never fail
            // on undo depth, so it opens forced.
            self.pending_session = Some(self.state.start_undo_session(true)?);
        }
        let block_num = self.head_block_num()? + 1;
        let trx_in_block = self.pending.len() as u32;

        let child = self.state.start_undo_session(true)?;
        match self.apply_transaction_at(&trx, skip, block_num, trx_in_block) {
            Ok((processed, _)) => {
                self.state.squash(child);
                self.pending.push(trx.clone());
                self.bus.emit(&ChainEvent::PendingTransaction { trx });
                Ok(processed)
            }
            Err(e) => {
                self.state.undo(child);
                Err(e)
            }
        }
    }

    /// Run the full transaction pipeline with no persisted effect.
    pub fn validate_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, ChainError> {
        let block_num = self.head_block_num()? + 1;
        let session = self.state.start_undo_session(true)?;
        let result = self.apply_transaction_at(trx, SkipFlags::NONE, block_num, 0);
        self.state.undo(session);
        result.map(|(processed, _)| processed)
    }

    /// The transaction pipeline. Callers provide the enclosing session.
    fn apply_transaction_at(
        &mut self,
        trx: &SignedTransaction,
        skip: SkipFlags,
        block_num: u32,
        trx_in_block: u32,
    ) -> Result<(ProcessedTransaction, Vec<AppliedOperation>), ChainError> {
        // 1. Structural self-validation.
        trx.validate()?;
        let id = trx.id();

        // 2. Duplicate check against the recent-transaction index.
        if !skip.contains(SkipFlags::DUPLICATE) && self.state.find_dedup(&id).is_some() {
            return Err(ChainError::DuplicateTransaction(id));
        }

        let params = self.params()?;

        // 3. Authority verification, bounded by the recursion depth.
        if !skip.contains(SkipFlags::AUTHORITY) {
            verify_authority(&self.state, trx, &self.chain_id, params.max_authority_depth)?;
        }

        let dgp = self.state.dynamics()?.clone();

        // 4. TaPoS: the transaction must reference a recent block. Nothing
        //    exists to reference at genesis.
        if !skip.contains(SkipFlags::TAPOS) && dgp.head_block_num > 0 {
            match self.state.block_summary(trx.trx.ref_block_num) {
                Some(summary)
                    if summary.block_id.tapos_prefix() == trx.trx.ref_block_prefix => {}
                _ => return Err(ChainError::TaposMismatch),
            }
        }

        // 5. Expiration window.
        let now = dgp.head_block_time;
        if trx.trx.expiration <= now {
            return Err(ChainError::Expiration {
                reason: format!("expired at {}, head time {now}", trx.trx.expiration),
            });
        }
        if trx.trx.expiration.secs_since(now) > params.max_trx_expiration_secs {
            return Err(ChainError::Expiration {
                reason: format!(
                    "expiration {} exceeds maximum window of {}s",
                    trx.trx.expiration, params.max_trx_expiration_secs
                ),
            });
        }

        // 6. Record the id for duplicate detection until it expires.
        if self.state.find_dedup(&id).is_none() {
            self.state.create(TransactionDedupObject {
                trx_id: id,
                expiration: trx.trx.expiration,
            })?;
        }

        // 7. Apply each operation through the evaluator table.
        let ctx = OpContext {
            now,
            params: params.clone(),
        };
        let mut results = Vec::with_capacity(trx.trx.operations.len());
        let mut applied = Vec::with_capacity(trx.trx.operations.len());
        for (op_in_trx, op) in trx.trx.operations.iter().enumerate() {
            let result = apply_operation(&mut self.state, &ctx, op)?;
            applied.push(AppliedOperation {
                trx_id: id,
                block_num,
                trx_in_block,
                op_in_trx: op_in_trx as u32,
                virtual_op: 0,
                op: op.clone(),
                result: result.clone(),
            });
            results.push(result);
        }

        // 8. The reserved temporary account must end every transaction empty.
        self.temp_account_invariant()?;

        Ok((
            ProcessedTransaction {
                trx: trx.clone(),
                results,
            },
            applied,
        ))
    }

    fn temp_account_invariant(&self) -> Result<(), ChainError> {
        if let Some((_, temp)) = self.state.find_account(&AccountName::new(TEMP_ACCOUNT_NAME)) {
            if temp.core_balance != 0 || temp.stable_balance != 0 {
                return Err(ChainError::InvariantViolation {
                    reason: format!(
                        "temporary account holds {} core / {} stable past transaction end",
                        temp.core_balance, temp.stable_balance
                    ),
                });
            }
        }
        Ok(())
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Submit a candidate block. Returns whether a fork switch occurred.
    pub fn push_block(&mut self, block: SignedBlock, skip: SkipFlags) -> Result<bool, ChainError> {
        // The pool is snapshotted and cleared for the duration, then
        // rebuilt against the new head.
        let snapshot = self.clear_pending();
        let result = self.push_block_inner(block, skip);
        self.restore_pending(snapshot);
        result
    }

    fn push_block_inner(
        &mut self,
        block: SignedBlock,
        skip: SkipFlags,
    ) -> Result<bool, ChainError> {
        let id = block.id();
        if self.fork_db.contains(&id) {
            return Ok(false);
        }
        let item = self.make_fork_item(block)?;
        self.fork_db.push_block(item)?;
        let item = self
            .fork_db
            .get(&id)
            .cloned()
            .expect("block was just inserted");
        let new_head = self
            .fork_db
            .head()
            .cloned()
            .expect("non-empty fork db has a head");

        let applied_head = self.head_block_id()?;
        if item.previous() == applied_head {
            match self.apply_block_in_session(&item, skip) {
                Ok(()) => {
                    self.fork_db.set_head(item);
                    Ok(false)
                }
                Err(e) => {
                    self.fork_db.remove(&id);
                    if let Some(prior) = self.fork_db.get(&applied_head).cloned() {
                        self.fork_db.set_head(prior);
                    }
                    Err(e)
                }
            }
        } else if new_head.num > self.head_block_num()? {
            self.switch_forks(new_head, skip)
        } else {
            tracing::debug!(block = %id, num = item.num, "stored fork block; head unchanged");
            Ok(false)
        }
    }

    fn make_fork_item(&self, block: SignedBlock) -> Result<ForkItem, ChainError> {
        let prev = block.header.previous;
        let head_id = self.head_block_id()?;
        let snapshot = if prev == head_id {
            self.live_snapshot()?
        } else if let Some(parent) = self.fork_db.get(&prev) {
            let params = self.params()?;
            let delta = schedule::slot_at_time(
                parent.num - 1,
                parent.schedule.base_time,
                params.genesis_time,
                params.block_interval_secs,
                parent.block.header.timestamp,
            );
            parent.schedule.advance(&parent.block, delta)
        } else {
            return Err(ChainError::UnlinkableBlock {
                id: block.id(),
                previous: prev,
            });
        };
        Ok(ForkItem::new(block, snapshot))
    }

    /// Replace the canonical chain with the branch ending at `new_head`.
    fn switch_forks(
        &mut self,
        new_head: Arc<ForkItem>,
        skip: SkipFlags,
    ) -> Result<bool, ChainError> {
        let old_head = self.head_block_id()?;
        tracing::info!(from = %old_head, to = %new_head.id, "switching forks");

        let (new_branch, old_branch) = self.fork_db.fetch_branch_from(new_head.id, old_head)?;
        let common_prev = match new_branch.last() {
            Some(item) => item.previous(),
            None => {
                return Err(ChainError::InvalidBlock {
                    reason: "fork switch target is not on a divergent branch".into(),
                })
            }
        };

        while self.head_block_id()? != common_prev {
            self.pop_block()?;
        }

        for item in new_branch.iter().rev() {
            match self.apply_block_in_session(item, skip) {
                Ok(()) => self.fork_db.set_head(item.clone()),
                Err(original) => {
                    tracing::warn!(
                        block = %item.id,
                        error = %original,
                        "fork switch failed; restoring previous branch"
                    );
                    // Drop the failing block and everything built on it.
                    self.fork_db.remove(&item.id);
                    // Rewind whatever part of the new branch was applied,
                    // then re-apply the original blocks. A failure here is
                    // unrecoverable corruption, not a normal error.
                    loop {
                        match self.head_block_id() {
                            Ok(head) if head == common_prev => break,
                            Ok(_) => self.pop_block().unwrap_or_else(|e| {
                                panic!("fork restoration failed while rewinding: {e}")
                            }),
                            Err(e) => panic!("fork restoration failed while rewinding: {e}"),
                        }
                    }
                    for prior in old_branch.iter().rev() {
                        self.apply_block_in_session(prior, SkipFlags::replay())
                            .unwrap_or_else(|e| {
                                panic!("fork restoration failed re-applying {}: {e}", prior.id)
                            });
                        self.fork_db.set_head(prior.clone());
                    }
                    return Err(original);
                }
            }
        }
        Ok(true)
    }

    /// Rewind the head block, returning its transactions to the popped
    /// queue for later re-application.
    fn pop_block(&mut self) -> Result<(), ChainError> {
        let head_id = self.head_block_id()?;
        let item = self
            .fork_db
            .get(&head_id)
            .cloned()
            .ok_or_else(|| ChainError::InvalidBlock {
                reason: format!("cannot pop {head_id}: block not in fork database"),
            })?;
        self.state.undo_last()?;
        let mut queue: VecDeque<SignedTransaction> =
            item.block.transactions.iter().cloned().collect();
        queue.extend(self.popped.drain(..));
        self.popped = queue;
        Ok(())
    }

    /// Apply one block inside its own session; commit and notify on
    /// success, revert on failure.
    fn apply_block_in_session(
        &mut self,
        item: &Arc<ForkItem>,
        skip: SkipFlags,
    ) -> Result<(), ChainError> {
        let session = self
            .state
            .start_undo_session(skip.contains(SkipFlags::UNDO_CAPACITY))?;
        match self.apply_block(item, skip) {
            Ok(applied_ops) => {
                if let Err(e) = self.blocks.put_block(&item.block) {
                    self.state.undo(session);
                    return Err(e.into());
                }
                self.state.commit(session);
                self.advance_irreversibility()?;
                self.bus.emit(&ChainEvent::BlockApplied {
                    block: item.block.clone(),
                });
                for op in applied_ops {
                    self.bus.emit(&ChainEvent::OperationApplied { op });
                }
                Ok(())
            }
            Err(e) => {
                self.state.undo(session);
                Err(e)
            }
        }
    }

    /// Validate a block header and apply its transactions and housekeeping.
    /// Runs inside the session opened by [`Chain::apply_block_in_session`].
    fn apply_block(
        &mut self,
        item: &Arc<ForkItem>,
        skip: SkipFlags,
    ) -> Result<Vec<AppliedOperation>, ChainError> {
        let block = &item.block;
        let num = block.num();
        let params = self.params()?;
        let dgp = self.state.dynamics()?.clone();

        // Header continuity.
        if block.header.previous != dgp.head_block_id {
            return Err(ChainError::InvalidBlock {
                reason: format!(
                    "previous {} does not match head {}",
                    block.header.previous, dgp.head_block_id
                ),
            });
        }
        if dgp.head_block_num > 0 && block.header.timestamp <= dgp.head_block_time {
            return Err(ChainError::InvalidBlock {
                reason: "timestamp does not advance past head".into(),
            });
        }

        // Witness lookup; scheduler and signature check against the
        // branch's cached metadata.
        let (signing_key, secret_commitment) = self
            .state
            .find_witness(&block.header.witness)
            .map(|(_, w)| (w.signing_key, w.next_secret_hash))
            .ok_or_else(|| ChainError::ScheduleViolation {
                reason: format!("unknown witness {}", block.header.witness),
            })?;
        let delta = schedule::verify_signer(
            &self.chain_id,
            block,
            item,
            &signing_key,
            params.genesis_time,
            params.block_interval_secs,
            skip,
        )?;

        // Timestamps must land exactly on slot boundaries.
        let expected_time = schedule::slot_time(
            item.num - 1,
            item.schedule.base_time,
            params.genesis_time,
            params.block_interval_secs,
            delta,
        );
        if expected_time != block.header.timestamp {
            return Err(ChainError::InvalidBlock {
                reason: format!(
                    "timestamp {} is not on a slot boundary (expected {expected_time})",
                    block.header.timestamp
                ),
            });
        }

        // Secret hash chain: the block must reveal the preimage of the
        // witness's standing commitment.
        if num >= params.secret_chain_activation_num && !skip.contains(SkipFlags::SECRET_CHAIN) {
            if secret_hash(&block.header.previous_secret) != secret_commitment {
                return Err(ChainError::InvalidBlock {
                    reason: format!(
                        "secret hash chain broken for witness {}",
                        block.header.witness
                    ),
                });
            }
        }

        if !skip.contains(SkipFlags::MERKLE)
            && block.compute_merkle_root() != block.header.transaction_merkle_root
        {
            return Err(ChainError::MerkleMismatch);
        }

        if !skip.contains(SkipFlags::BLOCK_SIZE) {
            let size = block.serialized_size();
            if size > u64::from(params.max_block_size) {
                return Err(ChainError::BlockTooLarge {
                    size,
                    max: params.max_block_size,
                });
            }
        }

        // Apply every transaction in order, advancing the
        // (block, transaction, operation, virtual) coordinates.
        let mut applied_ops = Vec::new();
        for (trx_in_block, trx) in block.transactions.iter().enumerate() {
            let (_, ops) = self.apply_transaction_at(trx, skip, num, trx_in_block as u32)?;
            applied_ops.extend(ops);
        }

        let virtual_ops = self.end_of_block(item, delta)?;
        let base_index = block.transactions.len() as u32;
        for (i, op) in virtual_ops.into_iter().enumerate() {
            applied_ops.push(AppliedOperation {
                trx_id: TransactionId::ZERO,
                block_num: num,
                trx_in_block: base_index,
                op_in_trx: 0,
                virtual_op: i as u32 + 1,
                op,
                result: OperationResult::Void,
            });
        }
        Ok(applied_ops)
    }

    /// Fixed end-of-block housekeeping. Returns the virtual operations
    /// generated as side effects, in order.
    fn end_of_block(
        &mut self,
        item: &Arc<ForkItem>,
        delta: u64,
    ) -> Result<Vec<Operation>, ChainError> {
        let block = &item.block;
        let num = block.num();
        let params = self.params()?;
        let mut virtual_ops = Vec::new();

        // Producing witness: advance its secret commitment and counters.
        let witness_id = self
            .state
            .find_witness(&block.header.witness)
            .map(|(id, _)| id)
            .ok_or_else(|| ChainError::ScheduleViolation {
                reason: format!("unknown witness {}", block.header.witness),
            })?;
        let next_commitment = block.header.next_secret_hash;
        self.state.modify_witness(witness_id, move |w| {
            w.next_secret_hash = next_commitment;
            w.last_produced_block = num;
            w.total_produced += 1;
        })?;

        // Witnesses scheduled for the skipped slots missed their blocks.
        for missed_slot in 1..delta {
            let name = item.schedule.witness_for(item.schedule.base_aslot + missed_slot)?;
            if let Some(id) = self.state.find_witness(&name).map(|(id, _)| id) {
                self.state.modify_witness(id, |w| w.total_missed += 1)?;
            }
        }

        // Dynamic global properties.
        let old_seed = self.state.dynamics()?.random_seed;
        let new_seed = Digest::new(blake2b_256_multi(&[
            old_seed.as_bytes(),
            block.header.previous_secret.as_bytes(),
        ]));
        let head_id = item.id;
        let head_time = block.header.timestamp;
        let producer = block.header.witness.clone();
        let depth = params.irreversibility_depth;
        self.state.modify_dynamics(move |d| {
            d.head_block_num = num;
            d.head_block_id = head_id;
            d.head_block_time = head_time;
            d.current_producer = producer;
            d.current_absolute_slot += delta;
            d.random_seed = new_seed;
            let lib = num.saturating_sub(depth);
            if lib > d.last_irreversible_block_num {
                d.last_irreversible_block_num = lib;
            }
        })?;

        // Producer reward.
        let reward = Amount::core(params.producer_reward);
        credit(
            &mut self.state,
            "producer_reward",
            &block.header.witness,
            reward,
        )?;
        virtual_ops.push(Operation::ProducerReward(ProducerRewardOperation {
            producer: block.header.witness.clone(),
            reward,
        }));

        // Witness schedule refresh at round boundaries.
        self.update_witness_schedule()?;

        // Conditional periodic maintenance.
        if head_time >= self.state.dynamics()?.next_maintenance_time {
            virtual_ops.extend(maintenance::run_maintenance(&mut self.state, head_time)?);
            let interval = params.maintenance_interval_secs;
            self.state.modify_dynamics(move |d| {
                while d.next_maintenance_time <= head_time {
                    d.next_maintenance_time =
                        d.next_maintenance_time.saturating_add_secs(interval);
                }
            })?;
        }

        // Record this block for future TaPoS references.
        self.record_block_summary(num, head_id)?;

        // Sweep dedup entries whose expiration has passed.
        for id in self.state.expired_dedups(head_time) {
            self.state.remove(id)?;
        }

        Ok(virtual_ops)
    }

    fn record_block_summary(&mut self, num: u32, id: BlockId) -> Result<(), ChainError> {
        let slot = u64::from((num & 0xFFFF) as u16);
        let oid = ObjectId::new(ObjectType::BlockSummary, slot);
        if self.state.contains(oid) {
            self.state.modify(oid, |obj| {
                if let StateObject::BlockSummary(s) = obj {
                    s.block_id = id;
                }
            })?;
        } else {
            self.state.create_at(oid, BlockSummaryObject { block_id: id })?;
        }
        Ok(())
    }

    /// Flatten undo history and prune the fork database up to the
    /// irreversible boundary. Runs after commit: irreversibility is, by
    /// definition, not undoable.
    fn advance_irreversibility(&mut self) -> Result<(), ChainError> {
        let dgp = self.state.dynamics()?;
        let lib = dgp.last_irreversible_block_num;
        let reversible = (dgp.head_block_num - lib) as usize;
        self.fork_db.prune(lib);
        let closed = self.state.revisions();
        if closed > reversible {
            self.state.flatten_oldest(closed - reversible);
        }
        Ok(())
    }

    /// Refresh the active set and materialized schedule at round
    /// boundaries.
    fn update_witness_schedule(&mut self) -> Result<(), ChainError> {
        let globals = self.state.globals()?;
        let params = globals.params.clone();
        let round = globals.active_witnesses.len().max(1) as u32;
        let dgp = self.state.dynamics()?.clone();
        if dgp.head_block_num % round != 0 {
            return Ok(());
        }

        let mut active: Vec<AccountName> = self
            .state
            .witnesses()
            .map(|(_, w)| w.owner.clone())
            .take(params.max_witnesses)
            .collect();
        if active.is_empty() {
            active = self.state.globals()?.active_witnesses.clone();
        }
        let active_for_globals = active.clone();
        self.state
            .modify_globals(move |g| g.active_witnesses = active_for_globals)?;

        match params.scheduler {
            meridian_types::SchedulerPolicy::Shuffle => {
                let rotation = schedule::shuffle_rotation(&dgp.random_seed, &active);
                self.state.modify_schedule(move |s| s.rotation = rotation)?;
            }
            meridian_types::SchedulerPolicy::Explicit { window } => {
                let base = dgp.current_absolute_slot;
                let len = active.len() as u64;
                let near: Vec<AccountName> = (0..window)
                    .map(|i| active[((base + i) % len) as usize].clone())
                    .collect();
                self.state.modify_schedule(move |s| {
                    s.near_window_base_slot = base;
                    s.near_window = near;
                })?;
            }
        }
        Ok(())
    }

    // ── Pending pool ────────────────────────────────────────────────────

    fn clear_pending(&mut self) -> Vec<SignedTransaction> {
        if let Some(session) = self.pending_session.take() {
            self.state.undo(session);
        }
        self.pending.drain(..).collect()
    }

    /// Re-apply previously pending (and popped) transactions against the
    /// new head, silently dropping any that no longer apply.
    fn restore_pending(&mut self, snapshot: Vec<SignedTransaction>) {
        let mut queue: Vec<SignedTransaction> = self.popped.drain(..).collect();
        queue.extend(snapshot);
        for trx in queue {
            let id = trx.id();
            if self.state.find_dedup(&id).is_some() {
                // Confirmed by a block in the meantime.
                continue;
            }
            if let Err(e) = self.push_transaction(trx, SkipFlags::NONE) {
                tracing::debug!(trx = %id, error = %e, "dropping pending transaction");
            }
        }
    }

    // ── Block production ────────────────────────────────────────────────

    /// Produce, sign and push a block at `when` as `witness`.
    ///
    /// Pending transactions are packed until the byte budget is reached;
    /// transactions that would overflow it stay pending.
    pub fn generate_block(
        &mut self,
        when: Timestamp,
        witness: AccountName,
        key: &PrivateKey,
        skip: SkipFlags,
    ) -> Result<SignedBlock, ChainError> {
        let params = self.params()?;
        let slot = self.slot_at_time(when)?;
        if slot == 0 {
            return Err(ChainError::ScheduleViolation {
                reason: format!("generation time {when} is not after the head block"),
            });
        }
        if !skip.contains(SkipFlags::WITNESS_SCHEDULE) {
            let scheduled = self.scheduled_witness(slot)?;
            if scheduled != witness {
                return Err(ChainError::ScheduleViolation {
                    reason: format!("slot belongs to {scheduled}, not {witness}"),
                });
            }
        }
        let (signing_key, last_produced) = self
            .state
            .find_witness(&witness)
            .map(|(_, w)| (w.signing_key, w.last_produced_block))
            .ok_or_else(|| ChainError::ScheduleViolation {
                reason: format!("{witness} is not a registered witness"),
            })?;
        if !skip.contains(SkipFlags::SIGNATURE) && public_from_private(key) != signing_key {
            return Err(ChainError::ScheduleViolation {
                reason: format!("provided key does not match {witness}'s signing key"),
            });
        }

        let num = self.head_block_num()? + 1;
        let mut block = SignedBlock {
            header: BlockHeader {
                previous: self.head_block_id()?,
                timestamp: when,
                witness: witness.clone(),
                transaction_merkle_root: Digest::ZERO,
                previous_secret: derive_production_secret(key, last_produced),
                next_secret_hash: secret_hash(&derive_production_secret(key, num)),
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };

        // Trial-apply pending transactions in a throwaway session, packing
        // until the byte budget runs out.
        let snapshot = self.clear_pending();
        let mut budget_used = block.serialized_size();
        let session = self.state.start_undo_session(true)?;
        let mut included = Vec::new();
        for trx in &snapshot {
            if trx.trx.expiration <= when {
                continue;
            }
            let size = trx.serialized_size();
            if !skip.contains(SkipFlags::BLOCK_SIZE)
                && budget_used + size > u64::from(params.max_block_size)
            {
                // Postponed, not rejected: it stays in the pool.
                continue;
            }
            match self.apply_transaction_at(trx, skip, num, included.len() as u32) {
                Ok(_) => {
                    budget_used += size;
                    included.push(trx.clone());
                }
                Err(e) => {
                    tracing::debug!(trx = %trx.id(), error = %e, "excluding transaction from block");
                }
            }
        }
        self.state.undo(session);
        // Everything snapshotted flows back through the pending-rebuild
        // path after the block applies.
        self.popped.extend(snapshot);

        block.transactions = included;
        block.header.transaction_merkle_root = block.compute_merkle_root();
        block.sign(&self.chain_id, key);

        self.push_block(block.clone(), skip)?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_crypto::keypair_from_seed;
    use meridian_protocol::{
        AccountCreateOperation, Authority, ConvertOperation, FeedPublishOperation, Transaction,
        TransferOperation, WitnessUpdateOperation,
    };
    use meridian_store::MemoryBlockStore;
    use meridian_types::{Asset, KeyPair, Price, SchedulerPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed_for(name: &str) -> [u8; 32] {
        match name {
            "genesis" => [1u8; 32],
            "alice" => [11u8; 32],
            "bob" => [12u8; 32],
            other => panic!("no key material for {other}"),
        }
    }

    fn key_for(name: &str) -> KeyPair {
        keypair_from_seed(&seed_for(name))
    }

    fn test_params() -> ChainParams {
        let mut params = ChainParams::meridian_defaults();
        params.chain_id = Digest::new([0xCD; 32]);
        params.genesis_time = Timestamp::new(1_000_002);
        params.undo_capacity = 32;
        params.irreversibility_depth = 8;
        params.maintenance_interval_secs = 600;
        params.convert_delay_secs = 30;
        params.account_creation_fee = 1_000;
        params.producer_reward = 100;
        params
    }

    fn new_chain_with(params: ChainParams) -> Chain {
        Chain::new(
            params,
            key_for("genesis").public,
            Box::new(MemoryBlockStore::new()),
        )
        .unwrap()
    }

    fn new_chain() -> Chain {
        new_chain_with(test_params())
    }

    fn produce_at_slot(chain: &mut Chain, slot: u64) -> SignedBlock {
        let when = chain.slot_time(slot).unwrap();
        let witness = chain.scheduled_witness(slot).unwrap();
        let key = key_for(witness.as_str());
        chain
            .generate_block(when, witness, &key.private, SkipFlags::NONE)
            .unwrap()
    }

    fn produce(chain: &mut Chain) -> SignedBlock {
        produce_at_slot(chain, 1)
    }

    fn build_trx(chain: &Chain, operations: Vec<Operation>, signers: &[&str]) -> SignedTransaction {
        let head_id = chain.head_block_id().unwrap();
        let head_num = chain.head_block_num().unwrap();
        let mut trx = SignedTransaction {
            trx: Transaction {
                ref_block_num: (head_num & 0xFFFF) as u16,
                ref_block_prefix: head_id.tapos_prefix(),
                expiration: chain.head_block_time().unwrap().saturating_add_secs(300),
                operations,
            },
            signatures: Vec::new(),
        };
        for signer in signers {
            trx.sign(&test_params().chain_id, &key_for(signer).private);
        }
        trx
    }

    fn transfer(from: &str, to: &str, amount: Amount) -> Operation {
        Operation::Transfer(TransferOperation {
            from: AccountName::new(from),
            to: AccountName::new(to),
            amount,
            memo: String::new(),
        })
    }

    fn create_account_op(name: &str) -> Operation {
        let kp = key_for(name);
        Operation::AccountCreate(AccountCreateOperation {
            creator: AccountName::new("genesis"),
            new_account_name: AccountName::new(name),
            fee: Amount::core(1_000),
            owner: Authority::single_key(kp.public),
            active: Authority::single_key(kp.public),
            memo_key: kp.public,
        })
    }

    fn register_witness_op(name: &str) -> Operation {
        Operation::WitnessUpdate(WitnessUpdateOperation {
            owner: AccountName::new(name),
            url: format!("https://{name}.example"),
            block_signing_key: key_for(name).public,
        })
    }

    fn balance_of(chain: &Chain, name: &str, asset: Asset) -> Amount {
        chain
            .state()
            .find_account(&AccountName::new(name))
            .unwrap()
            .1
            .balance(asset)
    }

    /// Create the `alice` account in one block.
    fn settle_alice(chain: &mut Chain) {
        let trx = build_trx(chain, vec![create_account_op("alice")], &["genesis"]);
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        produce(chain);
    }

    // ── Block application basics ────────────────────────────────────────

    #[test]
    fn first_block_extends_genesis() {
        let mut chain = new_chain();
        let block = produce(&mut chain);
        assert_eq!(chain.head_block_num().unwrap(), 1);
        assert_eq!(chain.head_block_id().unwrap(), block.id());
        assert_eq!(chain.head_block_time().unwrap(), block.header.timestamp);
        assert_eq!(
            balance_of(&chain, "genesis", Asset::Core),
            Amount::core(test_params().initial_supply + 100)
        );
    }

    #[test]
    fn duplicate_block_push_is_noop() {
        let mut chain = new_chain();
        let block = produce(&mut chain);
        assert!(!chain.push_block(block.clone(), SkipFlags::NONE).unwrap());
        assert_eq!(chain.head_block_num().unwrap(), 1);
        assert_eq!(chain.head_block_id().unwrap(), block.id());
    }

    #[test]
    fn unknown_previous_is_unlinkable() {
        let mut chain = new_chain();
        produce(&mut chain);
        let mut block = produce(&mut chain);
        block.header.previous = BlockId::from_digest(Digest::new([0x77; 32]), 9);
        assert!(matches!(
            chain.push_block(block, SkipFlags::NONE).unwrap_err(),
            ChainError::UnlinkableBlock { .. }
        ));
    }

    #[test]
    fn pending_transaction_lands_in_next_block() {
        let mut chain = new_chain();
        produce(&mut chain);
        let trx = build_trx(&chain, vec![create_account_op("alice")], &["genesis"]);
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        assert_eq!(chain.pending_transactions().len(), 1);
        // Visible through the pool session before confirmation.
        assert!(chain
            .state()
            .find_account(&AccountName::new("alice"))
            .is_some());

        let block = produce(&mut chain);
        assert_eq!(block.transactions.len(), 1);
        assert!(chain.pending_transactions().is_empty());
        assert!(chain
            .state()
            .find_account(&AccountName::new("alice"))
            .is_some());
    }

    // ── Transaction pipeline ────────────────────────────────────────────

    #[test]
    fn failed_transaction_leaves_state_untouched() {
        let mut chain = new_chain();
        produce(&mut chain);
        settle_alice(&mut chain);
        let trx = build_trx(
            &chain,
            vec![transfer("genesis", "alice", Amount::core(500))],
            &["genesis"],
        );
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        produce(&mut chain);

        let genesis_before = balance_of(&chain, "genesis", Asset::Core);
        // First operation is fine; the second overdraws. Nothing persists.
        let trx = build_trx(
            &chain,
            vec![
                transfer("alice", "genesis", Amount::core(100)),
                transfer("alice", "genesis", Amount::core(10_000)),
            ],
            &["alice"],
        );
        assert!(matches!(
            chain.push_transaction(trx, SkipFlags::NONE).unwrap_err(),
            ChainError::Evaluator { op: "transfer", .. }
        ));
        assert_eq!(balance_of(&chain, "alice", Asset::Core), Amount::core(500));
        assert_eq!(balance_of(&chain, "genesis", Asset::Core), genesis_before);
        assert!(chain.pending_transactions().is_empty());
    }

    #[test]
    fn duplicate_transaction_rejected_within_window() {
        let mut chain = new_chain();
        produce(&mut chain);
        let trx = build_trx(&chain, vec![create_account_op("alice")], &["genesis"]);
        chain.push_transaction(trx.clone(), SkipFlags::NONE).unwrap();

        // Still pending: the id is already indexed.
        assert!(matches!(
            chain
                .push_transaction(trx.clone(), SkipFlags::NONE)
                .unwrap_err(),
            ChainError::DuplicateTransaction(_)
        ));

        // Confirmed in a block: same rejection.
        produce(&mut chain);
        assert!(matches!(
            chain.push_transaction(trx, SkipFlags::NONE).unwrap_err(),
            ChainError::DuplicateTransaction(_)
        ));
    }

    #[test]
    fn tapos_mismatch_then_fresh_reference_succeeds() {
        let mut chain = new_chain();
        produce(&mut chain);
        produce(&mut chain);

        let mut stale = build_trx(&chain, vec![create_account_op("alice")], &[]);
        stale.trx.ref_block_prefix ^= 0xFFFF_FFFF;
        stale.sign(&test_params().chain_id, &key_for("genesis").private);
        assert!(matches!(
            chain.push_transaction(stale, SkipFlags::NONE).unwrap_err(),
            ChainError::TaposMismatch
        ));

        let fresh = build_trx(&chain, vec![create_account_op("alice")], &["genesis"]);
        chain.push_transaction(fresh, SkipFlags::NONE).unwrap();
    }

    #[test]
    fn expiration_window_enforced() {
        let mut chain = new_chain();
        produce(&mut chain);

        let mut expired = build_trx(&chain, vec![create_account_op("alice")], &[]);
        expired.trx.expiration = chain.head_block_time().unwrap();
        expired.sign(&test_params().chain_id, &key_for("genesis").private);
        assert!(matches!(
            chain.push_transaction(expired, SkipFlags::NONE).unwrap_err(),
            ChainError::Expiration { .. }
        ));

        let mut too_far = build_trx(&chain, vec![create_account_op("alice")], &[]);
        too_far.trx.expiration = chain
            .head_block_time()
            .unwrap()
            .saturating_add_secs(test_params().max_trx_expiration_secs + 1);
        too_far.sign(&test_params().chain_id, &key_for("genesis").private);
        assert!(matches!(
            chain.push_transaction(too_far, SkipFlags::NONE).unwrap_err(),
            ChainError::Expiration { .. }
        ));
    }

    #[test]
    fn temp_account_must_end_empty() {
        let mut chain = new_chain();
        produce(&mut chain);

        let deposit_only = build_trx(
            &chain,
            vec![transfer("genesis", "temp", Amount::core(50))],
            &["genesis"],
        );
        assert!(matches!(
            chain
                .push_transaction(deposit_only, SkipFlags::NONE)
                .unwrap_err(),
            ChainError::InvariantViolation { .. }
        ));

        // Withdrawing within the same transaction satisfies the invariant;
        // the temporary account itself requires no signature.
        let round_trip = build_trx(
            &chain,
            vec![
                transfer("genesis", "temp", Amount::core(50)),
                transfer("temp", "genesis", Amount::core(50)),
            ],
            &["genesis"],
        );
        chain.push_transaction(round_trip, SkipFlags::NONE).unwrap();
        assert_eq!(balance_of(&chain, "temp", Asset::Core), Amount::core(0));
    }

    #[test]
    fn validate_transaction_is_pure() {
        let mut chain = new_chain();
        produce(&mut chain);
        let trx = build_trx(&chain, vec![create_account_op("alice")], &["genesis"]);

        let processed = chain.validate_transaction(&trx).unwrap();
        assert_eq!(processed.results.len(), 1);
        assert!(chain
            .state()
            .find_account(&AccountName::new("alice"))
            .is_none());
        assert!(chain.pending_transactions().is_empty());

        // Dry runs leave the transaction pushable.
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
    }

    // ── Scheduler ───────────────────────────────────────────────────────

    #[test]
    fn scheduled_witness_is_pure() {
        let mut chain = new_chain();
        produce(&mut chain);
        for slot in 1..6 {
            assert_eq!(
                chain.scheduled_witness(slot).unwrap(),
                chain.scheduled_witness(slot).unwrap()
            );
            assert_eq!(
                chain.slot_time(slot).unwrap(),
                chain.slot_time(slot).unwrap()
            );
        }
    }

    #[test]
    fn wrongly_signed_slot_fails_schedule_check() {
        let mut chain = new_chain();
        produce(&mut chain);
        settle_alice(&mut chain);
        let trx = build_trx(&chain, vec![register_witness_op("alice")], &["alice"]);
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        produce(&mut chain);
        assert_eq!(
            chain.state().globals().unwrap().active_witnesses.len(),
            2,
            "alice joins the active set at the round boundary"
        );

        let scheduled = chain.scheduled_witness(1).unwrap();
        let wrong = if scheduled == AccountName::new("alice") {
            "genesis"
        } else {
            "alice"
        };
        let mut block = SignedBlock {
            header: BlockHeader {
                previous: chain.head_block_id().unwrap(),
                timestamp: chain.slot_time(1).unwrap(),
                witness: AccountName::new(wrong),
                transaction_merkle_root: Digest::ZERO,
                previous_secret: Digest::ZERO,
                next_secret_hash: Digest::ZERO,
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };
        block.sign(&test_params().chain_id, &key_for(wrong).private);

        let head_before = chain.head_block_id().unwrap();
        let err = chain.push_block(block.clone(), SkipFlags::NONE).unwrap_err();
        assert!(matches!(err, ChainError::ScheduleViolation { .. }));
        assert_eq!(chain.head_block_id().unwrap(), head_before);

        // Idempotent rejection: the same block fails the same way.
        let err = chain.push_block(block, SkipFlags::NONE).unwrap_err();
        assert!(matches!(err, ChainError::ScheduleViolation { .. }));
        assert_eq!(chain.head_block_id().unwrap(), head_before);
    }

    #[test]
    fn generate_requires_scheduled_witness_and_key() {
        let mut chain = new_chain();
        produce(&mut chain);
        let when = chain.slot_time(1).unwrap();

        assert!(matches!(
            chain
                .generate_block(
                    when,
                    AccountName::new("alice"),
                    &key_for("alice").private,
                    SkipFlags::NONE,
                )
                .unwrap_err(),
            ChainError::ScheduleViolation { .. }
        ));
        assert!(matches!(
            chain
                .generate_block(
                    when,
                    AccountName::new("genesis"),
                    &key_for("alice").private,
                    SkipFlags::NONE,
                )
                .unwrap_err(),
            ChainError::ScheduleViolation { .. }
        ));
    }

    #[test]
    fn skipped_slots_count_as_missed() {
        let mut chain = new_chain();
        produce(&mut chain);
        produce_at_slot(&mut chain, 3);
        let (_, witness) = chain
            .state()
            .find_witness(&AccountName::new("genesis"))
            .unwrap();
        assert_eq!(witness.total_missed, 2);
        assert_eq!(witness.total_produced, 2);
    }

    #[test]
    fn explicit_scheduler_policy_produces_blocks() {
        let mut params = test_params();
        params.scheduler = SchedulerPolicy::Explicit { window: 16 };
        let mut chain = new_chain_with(params);
        produce(&mut chain);
        produce(&mut chain);
        // Far beyond the near window: the fallback generator takes over.
        produce_at_slot(&mut chain, 40);
        assert_eq!(chain.head_block_num().unwrap(), 3);
    }

    #[test]
    fn secret_chain_links_blocks() {
        let mut chain = new_chain();
        produce(&mut chain);
        let b2 = produce(&mut chain);
        let (_, witness) = chain
            .state()
            .find_witness(&AccountName::new("genesis"))
            .unwrap();
        assert_eq!(witness.next_secret_hash, b2.header.next_secret_hash);
        assert_ne!(chain.state().dynamics().unwrap().random_seed, Digest::ZERO);

        // A block revealing the wrong secret is rejected.
        let mut bad = SignedBlock {
            header: BlockHeader {
                previous: chain.head_block_id().unwrap(),
                timestamp: chain.slot_time(1).unwrap(),
                witness: AccountName::new("genesis"),
                transaction_merkle_root: Digest::ZERO,
                previous_secret: Digest::new([9u8; 32]),
                next_secret_hash: Digest::ZERO,
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };
        bad.sign(&test_params().chain_id, &key_for("genesis").private);
        assert!(matches!(
            chain.push_block(bad, SkipFlags::NONE).unwrap_err(),
            ChainError::InvalidBlock { .. }
        ));
    }

    // ── Forks ───────────────────────────────────────────────────────────

    #[test]
    fn equal_height_keeps_head_then_longer_branch_switches() {
        let mut a = new_chain();
        let mut b = new_chain();
        let s1 = produce(&mut a);
        assert!(!b.push_block(s1, SkipFlags::NONE).unwrap());

        let a2 = produce(&mut a);
        let b2 = produce_at_slot(&mut b, 2);
        assert_ne!(a2.id(), b2.id());

        // Equal height: stored but ignored for canonical-head purposes.
        assert!(!a.push_block(b2.clone(), SkipFlags::NONE).unwrap());
        assert_eq!(a.head_block_id().unwrap(), a2.id());

        // A strictly higher branch triggers the switch.
        let b3 = produce(&mut b);
        assert!(a.push_block(b3.clone(), SkipFlags::NONE).unwrap());
        assert_eq!(a.head_block_id().unwrap(), b3.id());
        assert_eq!(a.head_block_num().unwrap(), 3);

        // The abandoned chain is exactly a2: the canonical second block is
        // now b2, and both nodes agree on state.
        assert_eq!(
            a.fetch_block_by_number(2).unwrap().unwrap().id(),
            b2.id()
        );
        assert_eq!(
            balance_of(&a, "genesis", Asset::Core),
            balance_of(&b, "genesis", Asset::Core)
        );
    }

    #[test]
    fn failed_fork_switch_restores_previous_branch() {
        let mut a = new_chain();
        let mut b = new_chain();
        let s1 = produce(&mut a);
        b.push_block(s1, SkipFlags::NONE).unwrap();

        let a2 = produce(&mut a);
        let b2 = produce_at_slot(&mut b, 2);
        assert!(!a.push_block(b2.clone(), SkipFlags::NONE).unwrap());

        // A third block on the b-branch revealing a broken secret chain.
        let mut bad = SignedBlock {
            header: BlockHeader {
                previous: b2.id(),
                timestamp: b.slot_time(1).unwrap(),
                witness: AccountName::new("genesis"),
                transaction_merkle_root: Digest::ZERO,
                previous_secret: Digest::new([9u8; 32]),
                next_secret_hash: Digest::ZERO,
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        };
        bad.sign(&test_params().chain_id, &key_for("genesis").private);

        let genesis_before = balance_of(&a, "genesis", Asset::Core);
        let err = a.push_block(bad, SkipFlags::NONE).unwrap_err();
        assert!(matches!(err, ChainError::InvalidBlock { .. }));

        // The original branch is back, byte for byte.
        assert_eq!(a.head_block_id().unwrap(), a2.id());
        assert_eq!(a.head_block_num().unwrap(), 2);
        assert_eq!(balance_of(&a, "genesis", Asset::Core), genesis_before);

        // A valid extension of the b-branch still switches afterwards.
        let b3 = produce(&mut b);
        assert!(a.push_block(b3.clone(), SkipFlags::NONE).unwrap());
        assert_eq!(a.head_block_id().unwrap(), b3.id());
    }

    #[test]
    fn pending_pool_rebuilt_on_new_head() {
        let mut a = new_chain();
        let mut b = new_chain();
        let s1 = produce(&mut a);
        b.push_block(s1, SkipFlags::NONE).unwrap();

        let trx = build_trx(&a, vec![create_account_op("alice")], &["genesis"]);
        a.push_transaction(trx, SkipFlags::NONE).unwrap();

        // A block from elsewhere, not containing the transaction.
        let b2 = produce(&mut b);
        a.push_block(b2, SkipFlags::NONE).unwrap();
        assert_eq!(a.head_block_num().unwrap(), 2);

        // The pool was rebuilt on the new head.
        assert_eq!(a.pending_transactions().len(), 1);
        assert!(a
            .state()
            .find_account(&AccountName::new("alice"))
            .is_some());

        let a3 = produce(&mut a);
        assert_eq!(a3.transactions.len(), 1);
    }

    #[test]
    fn irreversibility_advances_and_prunes() {
        let mut params = test_params();
        params.irreversibility_depth = 2;
        let mut chain = new_chain_with(params);
        for _ in 0..5 {
            produce(&mut chain);
        }
        assert_eq!(chain.last_irreversible_block_num().unwrap(), 3);
    }

    // ── Production ──────────────────────────────────────────────────────

    #[test]
    fn oversized_transactions_are_postponed() {
        let mut params = test_params();
        params.max_block_size = 2_200;
        let mut chain = new_chain_with(params);
        produce(&mut chain);
        settle_alice(&mut chain);
        let funding = build_trx(
            &chain,
            vec![transfer("genesis", "alice", Amount::core(10_000))],
            &["genesis"],
        );
        chain.push_transaction(funding, SkipFlags::NONE).unwrap();
        produce(&mut chain);

        for amount in [1, 2] {
            let op = Operation::Transfer(TransferOperation {
                from: AccountName::new("genesis"),
                to: AccountName::new("alice"),
                amount: Amount::core(amount),
                memo: "x".repeat(1_500),
            });
            let trx = build_trx(&chain, vec![op], &["genesis"]);
            chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        }
        assert_eq!(chain.pending_transactions().len(), 2);

        // Only one bulky transaction fits the byte budget; the other is
        // postponed, not rejected.
        let block = produce(&mut chain);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(chain.pending_transactions().len(), 1);

        let block = produce(&mut chain);
        assert_eq!(block.transactions.len(), 1);
        assert!(chain.pending_transactions().is_empty());
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    #[test]
    fn maintenance_settles_converts_at_median() {
        let mut chain = new_chain();
        produce(&mut chain);

        // 1 CORE = 2 STBL; convert 600 core.
        let ops = vec![
            Operation::FeedPublish(FeedPublishOperation {
                publisher: AccountName::new("genesis"),
                exchange_rate: Price::new(Amount::core(1_000), Amount::stable(2_000)),
            }),
            Operation::Convert(ConvertOperation {
                owner: AccountName::new("genesis"),
                amount: Amount::core(600),
            }),
        ];
        let trx = build_trx(&chain, ops, &["genesis"]);
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        produce(&mut chain);
        assert_eq!(
            balance_of(&chain, "genesis", Asset::Stable),
            Amount::stable(0)
        );

        // Jump far enough to pass both the settlement delay and the
        // maintenance boundary.
        produce_at_slot(&mut chain, 300);
        assert_eq!(
            balance_of(&chain, "genesis", Asset::Stable),
            Amount::stable(1_200)
        );
        assert!(chain
            .state()
            .due_converts(Timestamp::new(u64::MAX / 2))
            .is_empty());
    }

    // ── Events ──────────────────────────────────────────────────────────

    #[test]
    fn events_fire_after_commit() {
        let mut chain = new_chain();
        let blocks = Arc::new(AtomicUsize::new(0));
        let virtual_ops = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(AtomicUsize::new(0));

        let b = Arc::clone(&blocks);
        let v = Arc::clone(&virtual_ops);
        let p = Arc::clone(&pending);
        chain.subscribe(Box::new(move |event| match event {
            ChainEvent::BlockApplied { .. } => {
                b.fetch_add(1, Ordering::SeqCst);
            }
            ChainEvent::OperationApplied { op } if op.is_virtual() => {
                v.fetch_add(1, Ordering::SeqCst);
            }
            ChainEvent::OperationApplied { .. } => {}
            ChainEvent::PendingTransaction { .. } => {
                p.fetch_add(1, Ordering::SeqCst);
            }
        }));

        produce(&mut chain);
        let trx = build_trx(&chain, vec![create_account_op("alice")], &["genesis"]);
        chain.push_transaction(trx, SkipFlags::NONE).unwrap();
        produce(&mut chain);

        assert_eq!(blocks.load(Ordering::SeqCst), 2);
        // Every block credits its producer via a virtual operation.
        assert_eq!(virtual_ops.load(Ordering::SeqCst), 2);
        assert_eq!(pending.load(Ordering::SeqCst), 1);
    }
}
