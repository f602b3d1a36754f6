use crate::config::NodeConfig;
use crate::dag::{DrainReport, LedgerGraph};
use crate::global_merkle::{GlobalCommitmentTree, SharedGlobalTree};
use crate::merkle::LocalCommitmentTree;
use crate::storage::InMemoryStore;
use crate::threshold::ThresholdKeyManager;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use weave_common::{weave_bail, LedgerError, Transaction, WeaveResult};

/// Per-ledger figures reported by `LedgerNode::stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub collection: String,
    pub transactions: usize,
    pub pending: usize,
    pub dead_letters: usize,
    pub local_root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub ledgers: Vec<LedgerStats>,
    pub local_roots: usize,
    pub global_root: Option<String>,
}

/// A node hosting one ledger graph per collection.
///
/// All local trees publish into the same global tree. Each ledger owns its
/// own in-memory store.
pub struct LedgerNode {
    config: NodeConfig,
    global: SharedGlobalTree,
    ledgers: IndexMap<String, LedgerGraph>,
    key_manager: ThresholdKeyManager,
}

impl LedgerNode {
    pub fn from_config(config: NodeConfig) -> WeaveResult<Self> {
        config.validate()?;

        let global = GlobalCommitmentTree::new().into_shared();
        let mut ledgers = IndexMap::new();
        for collection in &config.ledger.collections {
            let tree = LocalCommitmentTree::new(global.clone()).into_shared();
            let consensus = config.consensus.build(&tree);
            debug!(collection = %collection, policy = consensus.name(), "creating ledger");
            let ledger = LedgerGraph::new(
                Arc::new(InMemoryStore::new(collection.as_str())),
                consensus,
                tree,
                config.mempool.clone(),
            );
            ledgers.insert(collection.clone(), ledger);
        }

        let key_manager = ThresholdKeyManager::new(config.threshold.threshold, config.modulus()?);
        info!(
            ledgers = ledgers.len(),
            threshold = key_manager.threshold(),
            "ledger node initialized"
        );

        Ok(Self {
            config,
            global,
            ledgers,
            key_manager,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn global_tree(&self) -> &SharedGlobalTree {
        &self.global
    }

    pub fn ledger_names(&self) -> impl Iterator<Item = &str> {
        self.ledgers.keys().map(String::as_str)
    }

    pub fn ledger(&self, collection: &str) -> WeaveResult<&LedgerGraph> {
        match self.ledgers.get(collection) {
            Some(ledger) => Ok(ledger),
            None => weave_bail!(LedgerError::UnknownLedger(collection.to_string()), "ledger"),
        }
    }

    pub fn ledger_mut(&mut self, collection: &str) -> WeaveResult<&mut LedgerGraph> {
        match self.ledgers.get_mut(collection) {
            Some(ledger) => Ok(ledger),
            None => weave_bail!(LedgerError::UnknownLedger(collection.to_string()), "ledger_mut"),
        }
    }

    /// First configured collection
    pub fn default_ledger_name(&self) -> Option<&str> {
        self.ledgers.keys().next().map(String::as_str)
    }

    pub fn key_manager(&self) -> &ThresholdKeyManager {
        &self.key_manager
    }

    pub fn key_manager_mut(&mut self) -> &mut ThresholdKeyManager {
        &mut self.key_manager
    }

    /// Queue transactions on a ledger and drain its mempool
    pub async fn ingest(&mut self, collection: &str, transactions: Vec<Transaction>) -> WeaveResult<DrainReport> {
        let ledger = self.ledger_mut(collection)?;
        for transaction in transactions {
            ledger.add_to_mempool(transaction)?;
        }
        Ok(ledger.process_mempool().await)
    }

    /// Whether the ledger's current local root is committed in the global tree
    pub fn verify_ledger_root(&self, collection: &str) -> WeaveResult<bool> {
        let ledger = self.ledger(collection)?;
        let tree = ledger.commitment_tree().read();
        Ok(tree
            .root_hash()
            .map(|root| self.global.read().verify_local_root_in_global_tree(root))
            .unwrap_or(false))
    }

    pub fn global_root_hash(&self) -> Option<String> {
        self.global.read().root_hash().map(str::to_string)
    }

    pub fn stats(&self) -> NodeStats {
        let ledgers = self
            .ledgers
            .iter()
            .map(|(collection, ledger)| LedgerStats {
                collection: collection.clone(),
                transactions: ledger.transaction_count(),
                pending: ledger.mempool().len(),
                dead_letters: ledger.dead_letters().len(),
                local_root: ledger.commitment_tree().read().root_hash().map(str::to_string),
            })
            .collect();
        let global = self.global.read();
        NodeStats {
            ledgers,
            local_roots: global.local_root_count(),
            global_root: global.root_hash().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use weave_common::{LedgerError, WeaveError};

    fn node(collections: &[&str]) -> LedgerNode {
        let mut config = NodeConfig::default();
        config.apply_overrides(ConfigOverrides {
            collections: Some(collections.iter().map(|c| c.to_string()).collect()),
            ..Default::default()
        });
        LedgerNode::from_config(config).unwrap()
    }

    #[test]
    fn test_one_ledger_per_collection() {
        let node = node(&["payments", "audit"]);
        assert_eq!(node.ledger_names().collect::<Vec<_>>(), vec!["payments", "audit"]);
        assert_eq!(node.default_ledger_name(), Some("payments"));
        assert_eq!(node.ledger("audit").unwrap().collection_name(), "audit");
        assert_eq!(node.key_manager().threshold(), 3);
    }

    #[test]
    fn test_unknown_ledger() {
        let node = node(&["payments"]);
        let err = node.ledger("missing").err().unwrap();
        assert!(matches!(err, WeaveError::Ledger(LedgerError::UnknownLedger(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = NodeConfig::default();
        config.ledger.collections.clear();
        assert!(LedgerNode::from_config(config).is_err());
    }

    #[tokio::test]
    async fn test_ledgers_share_global_tree() {
        let mut node = node(&["payments", "audit"]);
        node.ingest("payments", vec![Transaction::new("alice", "bob", 5, "sig")])
            .await
            .unwrap();
        node.ingest("audit", vec![Transaction::new("carol", "dave", 7, "sig")])
            .await
            .unwrap();

        assert!(node.verify_ledger_root("payments").unwrap());
        assert!(node.verify_ledger_root("audit").unwrap());

        let stats = node.stats();
        assert_eq!(stats.local_roots, 2);
        assert_eq!(stats.ledgers.iter().map(|l| l.transactions).sum::<usize>(), 2);
        assert!(stats.global_root.is_some());
    }
}
