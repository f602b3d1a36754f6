#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use weave_common::{ConsensusError, Transaction, WeaveResult};
use weave_node::{
    ConsensusPolicy, GlobalCommitmentTree, InMemoryStore, LedgerGraph, LocalCommitmentTree, MempoolConfig,
    MerkleInclusion, SharedGlobalTree, SharedLocalTree,
};

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .init();
    });
}

/// A ledger wired the way the node wires one: local tree publishing into a
/// global tree, with merkle-inclusion consensus reading the local tree.
pub struct Fixture {
    pub dag: LedgerGraph,
    pub store: InMemoryStore,
    pub local: SharedLocalTree,
    pub global: SharedGlobalTree,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_mempool(MempoolConfig::default())
    }

    pub fn with_mempool(mempool: MempoolConfig) -> Self {
        let global = GlobalCommitmentTree::new().into_shared();
        let local = LocalCommitmentTree::new(global.clone()).into_shared();
        let store = InMemoryStore::new("dagTest");
        let dag = LedgerGraph::new(
            Arc::new(store.clone()),
            Arc::new(MerkleInclusion::new(local.clone())),
            local.clone(),
            mempool,
        );
        Self { dag, store, local, global }
    }

    pub fn with_policy(policy: Arc<dyn ConsensusPolicy>, mempool: MempoolConfig) -> Self {
        let global = GlobalCommitmentTree::new().into_shared();
        let local = LocalCommitmentTree::new(global.clone()).into_shared();
        let store = InMemoryStore::new("dagTest");
        let dag = LedgerGraph::new(Arc::new(store.clone()), policy, local.clone(), mempool);
        Self { dag, store, local, global }
    }

    pub fn local_root(&self) -> Option<String> {
        self.local.read().root_hash().map(str::to_string)
    }

    pub fn global_root(&self) -> Option<String> {
        self.global.read().root_hash().map(str::to_string)
    }
}

/// The four sample transactions used across ledger tests
pub fn sample_transactions() -> [Transaction; 4] {
    [
        Transaction::new("from1", "to1", 100, "signature1"),
        Transaction::new("from2", "to2", 200, "signature2"),
        Transaction::new("from3", "to3", 300, "signature3"),
        Transaction::new("from4", "to4", 400, "signature4"),
    ]
}

/// Fails the first `failures` validations, then accepts everything
pub struct FlakyPolicy {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyPolicy {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConsensusPolicy for FlakyPolicy {
    async fn validate_transaction(&self, _transaction: &Transaction) -> WeaveResult<bool> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ConsensusError::Timeout.into());
        }
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}
