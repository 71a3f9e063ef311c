//! Node shell around the Meridian chain core.
//!
//! Owns the ambient concerns the consensus core deliberately does not:
//! TOML configuration, tracing initialization, and wiring the chain to
//! its collaborators. External callers reach the state machine through
//! the [`Node`] facade.

pub mod config;
pub mod logging;

use meridian_chain::{Chain, ChainError, ChainEvent, ProcessedTransaction, SkipFlags};
use meridian_crypto::generate_keypair;
use meridian_protocol::{SignedBlock, SignedTransaction};
use meridian_store::MemoryBlockStore;
use meridian_types::{AccountName, PrivateKey, PublicKey, Timestamp};
use thiserror::Error;

pub use config::NodeConfig;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid key in config: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// A running node: the chain state machine plus its wiring.
pub struct Node {
    chain: Chain,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish_non_exhaustive()
    }
}

impl Node {
    /// Build a node from configuration.
    ///
    /// Without a configured genesis key the node boots a throwaway dev
    /// network with a freshly generated producer identity.
    pub fn new(config: &NodeConfig) -> Result<Self, NodeError> {
        let genesis_key = match &config.genesis_public_key {
            Some(hex_key) => parse_public_key(hex_key)?,
            None => generate_keypair().public,
        };
        let params = config.chain_params();
        let chain = Chain::new(params, genesis_key, Box::new(MemoryBlockStore::new()))?;
        tracing::info!(
            genesis_time = %chain.head_block_time()?,
            "node initialized at genesis"
        );
        Ok(Self { chain })
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    /// Subscribe to applied-block / pending-transaction / operation signals.
    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.chain.subscribe(listener);
    }

    pub fn push_block(&mut self, block: SignedBlock, skip: SkipFlags) -> Result<bool, NodeError> {
        Ok(self.chain.push_block(block, skip)?)
    }

    pub fn push_transaction(
        &mut self,
        trx: SignedTransaction,
        skip: SkipFlags,
    ) -> Result<ProcessedTransaction, NodeError> {
        Ok(self.chain.push_transaction(trx, skip)?)
    }

    pub fn validate_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, NodeError> {
        Ok(self.chain.validate_transaction(trx)?)
    }

    pub fn generate_block(
        &mut self,
        when: Timestamp,
        witness: AccountName,
        key: &PrivateKey,
        skip: SkipFlags,
    ) -> Result<SignedBlock, NodeError> {
        Ok(self.chain.generate_block(when, witness, key, skip)?)
    }
}

fn parse_public_key(hex_key: &str) -> Result<PublicKey, NodeError> {
    let bytes = hex::decode(hex_key).map_err(|e| NodeError::InvalidKey(e.to_string()))?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| NodeError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(PublicKey(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_crypto::keypair_from_seed;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dev_config() -> NodeConfig {
        let kp = keypair_from_seed(&[1u8; 32]);
        let mut config = NodeConfig::default();
        config.genesis_public_key = Some(hex::encode(kp.public.0));
        config.chain.genesis_time_secs = Some(1_000_002);
        config
    }

    #[test]
    fn node_boots_at_genesis() {
        let node = Node::new(&dev_config()).unwrap();
        assert_eq!(node.chain().head_block_num().unwrap(), 0);
    }

    #[test]
    fn node_produces_blocks_through_facade() {
        let mut node = Node::new(&dev_config()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        node.subscribe(Box::new(move |event| {
            if matches!(event, ChainEvent::BlockApplied { .. }) {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let key = keypair_from_seed(&[1u8; 32]);
        let when = node.chain().slot_time(1).unwrap();
        let witness = node.chain().scheduled_witness(1).unwrap();
        node.generate_block(when, witness, &key.private, SkipFlags::NONE)
            .unwrap();

        assert_eq!(node.chain().head_block_num().unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_genesis_key_rejected() {
        let mut config = NodeConfig::default();
        config.genesis_public_key = Some("zz".into());
        assert!(matches!(
            Node::new(&config).unwrap_err(),
            NodeError::InvalidKey(_)
        ));
    }
}
