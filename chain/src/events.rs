//! Events emitted by the chain for subscribers.
//!
//! External collaborators (network layer, bridge plugins, the read API)
//! observe the chain exclusively through these signals, fired after the
//! corresponding state has committed.

use crate::processed::AppliedOperation;
use meridian_protocol::{SignedBlock, SignedTransaction};

/// Chain-level events observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block was applied and committed.
    BlockApplied { block: SignedBlock },
    /// A transaction entered the pending pool.
    PendingTransaction { trx: SignedTransaction },
    /// One operation (submitted or virtual) took effect.
    OperationApplied { op: AppliedOperation },
}

/// Synchronous fan-out event bus.
///
/// Listeners are invoked inline on the emitting thread; keep handlers fast
/// to avoid stalling block processing.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&ChainEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &ChainEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::{BlockHeader, SignedBlock};
    use meridian_types::{AccountName, BlockId, Digest, Signature, Timestamp};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dummy_block() -> SignedBlock {
        SignedBlock {
            header: BlockHeader {
                previous: BlockId::ZERO,
                timestamp: Timestamp::new(0),
                witness: AccountName::new("genesis"),
                transaction_merkle_root: Digest::ZERO,
                previous_secret: Digest::ZERO,
                next_secret_hash: Digest::ZERO,
            },
            witness_signature: Signature([0u8; 64]),
            transactions: Vec::new(),
        }
    }

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&ChainEvent::BlockApplied {
            block: dummy_block(),
        });
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(&ChainEvent::BlockApplied {
            block: dummy_block(),
        });
    }
}
