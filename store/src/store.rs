//! The versioned object store and its undo stack.
//!
//! State mutations go through `create`/`modify`/`remove`, which record
//! before-images into the top undo layer. Sessions nest LIFO: committing
//! the outermost session leaves its layer on the stack as a closed
//! *revision* that a later `undo_last` (fork switch) can still revert;
//! only [`ObjectStore::flatten_oldest`] makes layers irreversible.
//! Squashing merges a child layer into its parent: a child's effects
//! become externally visible only once merged.

use crate::error::StoreError;
use crate::object::{
    AccountObject, BlockSummaryObject, ConvertRequestObject, DynamicPropertyObject,
    GlobalPropertyObject, ObjectId, ObjectType, StateObject, TransactionDedupObject,
    WitnessObject, WitnessScheduleObject,
};
use meridian_types::{AccountName, Timestamp, TransactionId};
use std::collections::{BTreeMap, BTreeSet};

/// Handle for an open undo session.
///
/// Deliberately neither `Clone` nor `Copy`: `commit`, `squash` and `undo`
/// consume the handle, and the store asserts LIFO close order.
#[derive(Debug)]
pub struct UndoSession {
    serial: u64,
}

/// One diff layer: everything touched since its session opened.
#[derive(Debug, Default)]
struct UndoLayer {
    serial: u64,
    open: bool,
    created: BTreeSet<ObjectId>,
    /// Before-images of modified objects; first touch wins.
    modified: BTreeMap<ObjectId, StateObject>,
    /// Before-images of removed objects.
    removed: BTreeMap<ObjectId, StateObject>,
    /// Id-counter values before this layer first bumped them.
    prior_next_instance: BTreeMap<ObjectType, u64>,
}

/// Secondary-index key derived from an object's content.
#[derive(Clone, Debug, PartialEq, Eq)]
enum IndexKey {
    AccountName(AccountName),
    WitnessOwner(AccountName),
    TrxId(TransactionId),
    ConvertDue(Timestamp),
}

fn index_key(obj: &StateObject) -> Option<IndexKey> {
    match obj {
        StateObject::Account(a) => Some(IndexKey::AccountName(a.name.clone())),
        StateObject::Witness(w) => Some(IndexKey::WitnessOwner(w.owner.clone())),
        StateObject::TransactionDedup(d) => Some(IndexKey::TrxId(d.trx_id)),
        StateObject::ConvertRequest(c) => Some(IndexKey::ConvertDue(c.due)),
        _ => None,
    }
}

/// The versioned object store.
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, StateObject>,
    next_instance: BTreeMap<ObjectType, u64>,

    account_by_name: BTreeMap<AccountName, ObjectId>,
    witness_by_owner: BTreeMap<AccountName, ObjectId>,
    dedup_by_trx: BTreeMap<TransactionId, ObjectId>,
    converts_by_due: BTreeMap<(Timestamp, u64), ObjectId>,

    layers: Vec<UndoLayer>,
    open_sessions: usize,
    capacity: usize,
    next_serial: u64,
}

impl ObjectStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_instance: BTreeMap::new(),
            account_by_name: BTreeMap::new(),
            witness_by_owner: BTreeMap::new(),
            dedup_by_trx: BTreeMap::new(),
            converts_by_due: BTreeMap::new(),
            layers: Vec::new(),
            open_sessions: 0,
            capacity,
            next_serial: 1,
        }
    }

    /// Bound how far back rollback is possible.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Open a new undo session.
    ///
    /// `force` permits opening beyond the configured capacity (large
    /// batched work that must not fail on depth).
    pub fn start_undo_session(&mut self, force: bool) -> Result<UndoSession, StoreError> {
        if !force && self.layers.len() >= self.capacity {
            return Err(StoreError::UndoCapacityExceeded {
                capacity: self.capacity,
            });
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.layers.push(UndoLayer {
            serial,
            open: true,
            ..UndoLayer::default()
        });
        self.open_sessions += 1;
        Ok(UndoSession { serial })
    }

    /// Close the session, keeping its layer as a revertible revision.
    pub fn commit(&mut self, session: UndoSession) {
        let top = self.top_open_layer(&session);
        top.open = false;
        self.open_sessions -= 1;
    }

    /// Merge the session's layer into the layer beneath it.
    ///
    /// With no layer beneath, the session simply closes as a revision.
    pub fn squash(&mut self, session: UndoSession) {
        self.top_open_layer(&session);
        self.open_sessions -= 1;
        let mut child = self.layers.pop().expect("open session implies undo layer");
        match self.layers.last_mut() {
            Some(parent) => squash_into(parent, child),
            None => {
                child.open = false;
                self.layers.push(child);
            }
        }
    }

    /// Revert everything the session touched.
    pub fn undo(&mut self, session: UndoSession) {
        self.top_open_layer(&session);
        self.open_sessions -= 1;
        let layer = self.layers.pop().expect("open session implies undo layer");
        self.revert_layer(layer);
    }

    /// Revert the most recent committed revision (the pop-block path).
    ///
    /// Only valid while no session is open.
    pub fn undo_last(&mut self) -> Result<(), StoreError> {
        assert_eq!(self.open_sessions, 0, "undo_last with open sessions");
        let layer = self.layers.pop().ok_or(StoreError::NothingToUndo)?;
        self.revert_layer(layer);
        Ok(())
    }

    /// Drop the oldest `count` revisions, making them irreversible.
    pub fn flatten_oldest(&mut self, count: usize) {
        let closed = self.layers.len() - self.open_sessions;
        let n = count.min(closed);
        self.layers.drain(0..n);
    }

    /// Number of closed, still-revertible revisions.
    pub fn revisions(&self) -> usize {
        self.layers.len() - self.open_sessions
    }

    pub fn open_session_count(&self) -> usize {
        self.open_sessions
    }

    fn top_open_layer(&mut self, session: &UndoSession) -> &mut UndoLayer {
        assert!(self.open_sessions > 0, "no open undo session");
        let top = self
            .layers
            .last_mut()
            .expect("open session implies undo layer");
        assert!(top.open, "top layer already closed");
        assert_eq!(
            top.serial, session.serial,
            "undo sessions must close in LIFO order"
        );
        top
    }

    // ── Object CRUD ─────────────────────────────────────────────────────

    /// Create an object, assigning the next instance id for its type.
    pub fn create(&mut self, obj: impl Into<StateObject>) -> Result<ObjectId, StoreError> {
        let obj = obj.into();
        let ty = obj.object_type();
        let prior = *self.next_instance.entry(ty).or_insert(0);
        let id = ObjectId::new(ty, prior);
        self.check_index_collision(&obj, id)?;
        self.next_instance.insert(ty, prior + 1);
        self.insert_untracked(id, obj);
        self.on_create(id, Some((ty, prior)));
        Ok(id)
    }

    /// Create an object at a caller-chosen id (the block-summary ring).
    pub fn create_at(&mut self, id: ObjectId, obj: impl Into<StateObject>) -> Result<(), StoreError> {
        let obj = obj.into();
        if obj.object_type() != id.ty {
            return Err(StoreError::TypeMismatch(id));
        }
        if self.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        self.check_index_collision(&obj, id)?;
        self.insert_untracked(id, obj);
        self.on_create(id, None);
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Result<&StateObject, StoreError> {
        self.objects.get(&id).ok_or(StoreError::NotFound(id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Modify an object in place, recording its before-image.
    pub fn modify(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut StateObject),
    ) -> Result<(), StoreError> {
        let (before, old_key, new_key) = match self.objects.get_mut(&id) {
            Some(obj) => {
                let before = obj.clone();
                f(obj);
                let old_key = index_key(&before);
                let new_key = index_key(obj);
                (before, old_key, new_key)
            }
            None => return Err(StoreError::NotFound(id)),
        };
        if old_key != new_key {
            if let Some(key) = &old_key {
                self.index_remove(key, id);
            }
            if let Some(key) = new_key {
                self.index_insert(&key, id);
            }
        }
        self.on_modify(id, before);
        Ok(())
    }

    /// Remove an object, recording its before-image.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), StoreError> {
        let obj = self
            .remove_untracked(id)
            .ok_or(StoreError::NotFound(id))?;
        self.on_remove(id, obj);
        Ok(())
    }

    // ── Typed accessors ─────────────────────────────────────────────────

    pub fn account(&self, id: ObjectId) -> Result<&AccountObject, StoreError> {
        match self.get(id)? {
            StateObject::Account(a) => Ok(a),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    pub fn find_account(&self, name: &AccountName) -> Option<(ObjectId, &AccountObject)> {
        let id = *self.account_by_name.get(name)?;
        match self.objects.get(&id) {
            Some(StateObject::Account(a)) => Some((id, a)),
            _ => None,
        }
    }

    pub fn modify_account(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut AccountObject),
    ) -> Result<(), StoreError> {
        self.account(id)?;
        self.modify(id, |obj| {
            if let StateObject::Account(a) = obj {
                f(a)
            }
        })
    }

    pub fn witness(&self, id: ObjectId) -> Result<&WitnessObject, StoreError> {
        match self.get(id)? {
            StateObject::Witness(w) => Ok(w),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    pub fn find_witness(&self, owner: &AccountName) -> Option<(ObjectId, &WitnessObject)> {
        let id = *self.witness_by_owner.get(owner)?;
        match self.objects.get(&id) {
            Some(StateObject::Witness(w)) => Some((id, w)),
            _ => None,
        }
    }

    pub fn modify_witness(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut WitnessObject),
    ) -> Result<(), StoreError> {
        self.witness(id)?;
        self.modify(id, |obj| {
            if let StateObject::Witness(w) = obj {
                f(w)
            }
        })
    }

    /// All witnesses, ordered by owner name.
    pub fn witnesses(&self) -> impl Iterator<Item = (ObjectId, &WitnessObject)> {
        self.witness_by_owner.values().filter_map(|id| {
            match self.objects.get(id) {
                Some(StateObject::Witness(w)) => Some((*id, w)),
                _ => None,
            }
        })
    }

    pub fn globals(&self) -> Result<&GlobalPropertyObject, StoreError> {
        let id = ObjectId::singleton(ObjectType::GlobalProperties);
        match self.get(id)? {
            StateObject::GlobalProperties(g) => Ok(g),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    pub fn modify_globals(
        &mut self,
        f: impl FnOnce(&mut GlobalPropertyObject),
    ) -> Result<(), StoreError> {
        let id = ObjectId::singleton(ObjectType::GlobalProperties);
        self.globals()?;
        self.modify(id, |obj| {
            if let StateObject::GlobalProperties(g) = obj {
                f(g)
            }
        })
    }

    pub fn dynamics(&self) -> Result<&DynamicPropertyObject, StoreError> {
        let id = ObjectId::singleton(ObjectType::DynamicProperties);
        match self.get(id)? {
            StateObject::DynamicProperties(d) => Ok(d),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    pub fn modify_dynamics(
        &mut self,
        f: impl FnOnce(&mut DynamicPropertyObject),
    ) -> Result<(), StoreError> {
        let id = ObjectId::singleton(ObjectType::DynamicProperties);
        self.dynamics()?;
        self.modify(id, |obj| {
            if let StateObject::DynamicProperties(d) = obj {
                f(d)
            }
        })
    }

    pub fn schedule(&self) -> Result<&WitnessScheduleObject, StoreError> {
        let id = ObjectId::singleton(ObjectType::WitnessSchedule);
        match self.get(id)? {
            StateObject::WitnessSchedule(s) => Ok(s),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    pub fn modify_schedule(
        &mut self,
        f: impl FnOnce(&mut WitnessScheduleObject),
    ) -> Result<(), StoreError> {
        let id = ObjectId::singleton(ObjectType::WitnessSchedule);
        self.schedule()?;
        self.modify(id, |obj| {
            if let StateObject::WitnessSchedule(s) = obj {
                f(s)
            }
        })
    }

    /// TaPoS ring entry for `slot = block_num & 0xFFFF`, if recorded.
    pub fn block_summary(&self, slot: u16) -> Option<&BlockSummaryObject> {
        let id = ObjectId::new(ObjectType::BlockSummary, u64::from(slot));
        match self.objects.get(&id) {
            Some(StateObject::BlockSummary(s)) => Some(s),
            _ => None,
        }
    }

    pub fn find_dedup(&self, trx_id: &TransactionId) -> Option<ObjectId> {
        self.dedup_by_trx.get(trx_id).copied()
    }

    /// Dedup entries whose expiration has passed.
    pub fn expired_dedups(&self, now: Timestamp) -> Vec<ObjectId> {
        self.dedup_by_trx
            .values()
            .filter(|id| match self.objects.get(id) {
                Some(StateObject::TransactionDedup(d)) => d.expiration <= now,
                _ => false,
            })
            .copied()
            .collect()
    }

    pub fn convert_request(&self, id: ObjectId) -> Result<&ConvertRequestObject, StoreError> {
        match self.get(id)? {
            StateObject::ConvertRequest(c) => Ok(c),
            _ => Err(StoreError::TypeMismatch(id)),
        }
    }

    /// Convert requests due at or before `now`, oldest first.
    pub fn due_converts(&self, now: Timestamp) -> Vec<ObjectId> {
        self.converts_by_due
            .range(..=(now, u64::MAX))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ── Index maintenance ───────────────────────────────────────────────

    fn check_index_collision(&self, obj: &StateObject, id: ObjectId) -> Result<(), StoreError> {
        let occupied = match index_key(obj) {
            Some(IndexKey::AccountName(name)) => self.account_by_name.contains_key(&name),
            Some(IndexKey::WitnessOwner(owner)) => self.witness_by_owner.contains_key(&owner),
            Some(IndexKey::TrxId(trx)) => self.dedup_by_trx.contains_key(&trx),
            Some(IndexKey::ConvertDue(_)) | None => false,
        };
        if occupied {
            return Err(StoreError::AlreadyExists(id));
        }
        Ok(())
    }

    fn index_insert(&mut self, key: &IndexKey, id: ObjectId) {
        match key {
            IndexKey::AccountName(name) => {
                self.account_by_name.insert(name.clone(), id);
            }
            IndexKey::WitnessOwner(owner) => {
                self.witness_by_owner.insert(owner.clone(), id);
            }
            IndexKey::TrxId(trx) => {
                self.dedup_by_trx.insert(*trx, id);
            }
            IndexKey::ConvertDue(due) => {
                self.converts_by_due.insert((*due, id.instance), id);
            }
        }
    }

    fn index_remove(&mut self, key: &IndexKey, id: ObjectId) {
        match key {
            IndexKey::AccountName(name) => {
                self.account_by_name.remove(name);
            }
            IndexKey::WitnessOwner(owner) => {
                self.witness_by_owner.remove(owner);
            }
            IndexKey::TrxId(trx) => {
                self.dedup_by_trx.remove(trx);
            }
            IndexKey::ConvertDue(due) => {
                self.converts_by_due.remove(&(*due, id.instance));
            }
        }
    }

    fn insert_untracked(&mut self, id: ObjectId, obj: StateObject) {
        if let Some(key) = index_key(&obj) {
            self.index_insert(&key, id);
        }
        self.objects.insert(id, obj);
    }

    fn remove_untracked(&mut self, id: ObjectId) -> Option<StateObject> {
        let obj = self.objects.remove(&id)?;
        if let Some(key) = index_key(&obj) {
            self.index_remove(&key, id);
        }
        Some(obj)
    }

    // ── Undo recording ──────────────────────────────────────────────────

    fn on_create(&mut self, id: ObjectId, counter: Option<(ObjectType, u64)>) {
        let Some(top) = self.layers.last_mut() else {
            return;
        };
        if let Some((ty, prior)) = counter {
            top.prior_next_instance.entry(ty).or_insert(prior);
        }
        // Re-creating an id this layer removed nets out to a modify.
        if let Some(before) = top.removed.remove(&id) {
            top.modified.insert(id, before);
            return;
        }
        top.created.insert(id);
    }

    fn on_modify(&mut self, id: ObjectId, before: StateObject) {
        let Some(top) = self.layers.last_mut() else {
            return;
        };
        if top.created.contains(&id) {
            return;
        }
        top.modified.entry(id).or_insert(before);
    }

    fn on_remove(&mut self, id: ObjectId, before: StateObject) {
        let Some(top) = self.layers.last_mut() else {
            return;
        };
        if top.created.remove(&id) {
            return;
        }
        if let Some(original) = top.modified.remove(&id) {
            top.removed.insert(id, original);
            return;
        }
        top.removed.insert(id, before);
    }

    fn revert_layer(&mut self, layer: UndoLayer) {
        for (id, before) in layer.modified {
            self.remove_untracked(id);
            self.insert_untracked(id, before);
        }
        for id in layer.created {
            self.remove_untracked(id);
        }
        for (id, before) in layer.removed {
            self.insert_untracked(id, before);
        }
        for (ty, prior) in layer.prior_next_instance {
            self.next_instance.insert(ty, prior);
        }
    }
}

/// Merge `child` into `parent` (the classic diff-layer squash algebra).
fn squash_into(parent: &mut UndoLayer, child: UndoLayer) {
    for (id, before) in child.modified {
        if parent.created.contains(&id) || parent.modified.contains_key(&id) {
            continue;
        }
        parent.modified.insert(id, before);
    }
    for id in child.created {
        if let Some(before) = parent.removed.remove(&id) {
            parent.modified.insert(id, before);
            continue;
        }
        parent.created.insert(id);
    }
    for (id, before) in child.removed {
        if parent.created.remove(&id) {
            continue;
        }
        if let Some(original) = parent.modified.remove(&id) {
            parent.removed.insert(id, original);
            continue;
        }
        parent.removed.insert(id, before);
    }
    for (ty, prior) in child.prior_next_instance {
        parent.prior_next_instance.entry(ty).or_insert(prior);
    }
}
