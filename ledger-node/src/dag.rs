use crate::consensus::ConsensusPolicy;
use crate::mempool::{DeadLetter, Mempool, MempoolConfig, RetryDecision};
use crate::merkle::{MerkleProof, SharedLocalTree};
use crate::storage::PersistenceGateway;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use weave_common::{weave_bail, LedgerError, Transaction, WeaveError, WeaveResult};

/// A vertex reference, identified by transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagNode {
    pub hash: String,
}

impl DagNode {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }
}

impl From<&Transaction> for DagNode {
    fn from(tx: &Transaction) -> Self {
        Self::new(tx.hash())
    }
}

/// A directed edge between two vertices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: DagNode,
    pub to: DagNode,
}

/// What one `process_mempool` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub admitted: Vec<String>,
    pub rejected: Vec<String>,
    pub dead_lettered: Vec<String>,
    /// Dropped because admission failed with a permanent error
    pub dropped: Vec<String>,
    pub failed_attempts: usize,
}

/// Why `admit` failed. Policy errors follow the retry policy; admission
/// errors are retried only when the error itself is retryable.
enum AdmitFailure {
    Validation(WeaveError),
    Admission(WeaveError),
}

/// Work item for the iterative cycle search
enum Visit {
    Enter(String),
    Exit(String),
}

/// Transaction DAG.
///
/// Adjacency is stored keyed by child id and holds that child's parent ids.
/// Every admitted transaction gets an entry, so a transaction is "genesis"
/// only while it has never been admitted or linked.
///
/// Mutating methods take `&mut self`, which keeps a single mempool drain
/// active per ledger. Share a ledger across tasks behind a mutex.
pub struct LedgerGraph {
    store: Arc<dyn PersistenceGateway>,
    consensus: Arc<dyn ConsensusPolicy>,
    commitment: SharedLocalTree,
    transactions: IndexMap<String, Transaction>,
    ids_by_hash: HashMap<String, String>,
    parent_child_map: IndexMap<String, IndexSet<String>>,
    mempool: Mempool,
}

impl LedgerGraph {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        consensus: Arc<dyn ConsensusPolicy>,
        commitment: SharedLocalTree,
        mempool_config: MempoolConfig,
    ) -> Self {
        Self {
            store,
            consensus,
            commitment,
            transactions: IndexMap::new(),
            ids_by_hash: HashMap::new(),
            parent_child_map: IndexMap::new(),
            mempool: Mempool::new(mempool_config),
        }
    }

    pub fn collection_name(&self) -> &str {
        self.store.collection_name()
    }

    pub fn commitment_tree(&self) -> &SharedLocalTree {
        &self.commitment
    }

    pub fn consensus(&self) -> &Arc<dyn ConsensusPolicy> {
        &self.consensus
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// Persist, register and commit a transaction.
    ///
    /// Fails with `DuplicateTransaction` if the id is already registered;
    /// nothing is changed in that case.
    pub async fn add_transaction(&mut self, transaction: Transaction) -> WeaveResult<()> {
        let id = transaction.id().to_string();
        if self.transactions.contains_key(&id) {
            weave_bail!(LedgerError::DuplicateTransaction(id.clone()), "add_transaction", transaction = &id);
        }

        self.store.put(&id, &transaction).await?;
        self.register(transaction);
        info!(collection = self.collection_name(), id = %id, "transaction admitted");
        Ok(())
    }

    fn register(&mut self, transaction: Transaction) {
        let id = transaction.id().to_string();
        let hash = transaction.hash();
        self.parent_child_map.insert(id.clone(), IndexSet::new());
        self.ids_by_hash.insert(hash.clone(), id.clone());
        self.transactions.insert(id, transaction);
        self.commitment.write().add_transaction_hash(&hash);
    }

    /// Record `parent_id` as a parent of `child_id`. Idempotent; cycles are
    /// only detected by `is_valid`.
    pub fn add_parent_child(&mut self, parent_id: &str, child_id: &str) {
        match self.parent_child_map.get_mut(child_id) {
            Some(parents) => {
                if parents.insert(parent_id.to_string()) {
                    debug!(parent = parent_id, child = child_id, "added parent");
                } else {
                    debug!(parent = parent_id, child = child_id, "parent already recorded");
                }
            }
            None => {
                let mut parents = IndexSet::new();
                parents.insert(parent_id.to_string());
                self.parent_child_map.insert(child_id.to_string(), parents);
                debug!(parent = parent_id, child = child_id, "created parent set");
            }
        }
    }

    fn parent_ids(&self, id: &str) -> impl Iterator<Item = &String> {
        self.parent_child_map.get(id).into_iter().flatten()
    }

    fn child_ids<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.parent_child_map
            .iter()
            .filter(move |(_, parents)| parents.contains(id))
            .map(|(child, _)| child)
    }

    /// Persisted parents of `transaction`; records missing from the store are skipped
    pub async fn get_parents(&self, transaction: &Transaction) -> WeaveResult<Vec<Transaction>> {
        let ids: Vec<String> = self.parent_ids(transaction.id()).cloned().collect();
        self.load_records(ids).await
    }

    /// Persisted children of `transaction`; records missing from the store are skipped
    pub async fn get_children(&self, transaction: &Transaction) -> WeaveResult<Vec<Transaction>> {
        let ids: Vec<String> = self.child_ids(transaction.id()).cloned().collect();
        self.load_records(ids).await
    }

    async fn load_records(&self, ids: Vec<String>) -> WeaveResult<Vec<Transaction>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(&id).await? {
                Some(record) => records.push(record),
                None => debug!(id = %id, "linked transaction not persisted"),
            }
        }
        Ok(records)
    }

    pub fn has_node(&self, node: &DagNode) -> bool {
        self.ids_by_hash.contains_key(&node.hash)
    }

    /// True when both endpoints are registered. The link itself is not checked.
    pub fn has_edge(&self, edge: &DagEdge) -> bool {
        self.has_node(&edge.from) && self.has_node(&edge.to)
    }

    pub fn is_genesis_transaction(&self, id: &str) -> bool {
        !self.parent_child_map.contains_key(id)
    }

    /// No duplicate ids, no orphans, no cycles.
    pub fn is_valid(&self) -> bool {
        let unique: IndexSet<&str> = self.transactions.values().map(Transaction::id).collect();
        if unique.len() != self.transactions.len() {
            warn!("duplicate transaction ids registered");
            return false;
        }

        let linked_as_parent: HashSet<&str> = self
            .parent_child_map
            .values()
            .flat_map(|parents| parents.iter().map(String::as_str))
            .collect();

        for id in self.transactions.keys() {
            let has_parents = self.parent_ids(id).next().is_some();
            let has_children = linked_as_parent.contains(id.as_str());
            if !has_parents && !has_children && !self.is_genesis_transaction(id) {
                warn!(id = %id, "orphan transaction detected");
                return false;
            }
        }

        if self.has_cyclic_dependency() {
            warn!("cyclic dependency detected");
            return false;
        }
        true
    }

    /// Depth-first search from every transaction, following each recorded
    /// parent set as the outgoing edges. A neighbour still on the current
    /// path is a back edge.
    pub fn has_cyclic_dependency(&self) -> bool {
        let mut visited: IndexSet<String> = IndexSet::new();
        let mut on_stack: IndexSet<String> = IndexSet::new();

        for start in self.transactions.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut work = vec![Visit::Enter(start.clone())];
            while let Some(item) = work.pop() {
                match item {
                    Visit::Enter(id) => {
                        if visited.contains(&id) {
                            continue;
                        }
                        visited.insert(id.clone());
                        on_stack.insert(id.clone());
                        debug!(visiting = %id, depth = on_stack.len(), "cycle search");

                        work.push(Visit::Exit(id.clone()));
                        let next: Vec<&String> = self.parent_ids(&id).collect();
                        for neighbour in next.into_iter().rev() {
                            if on_stack.contains(neighbour) {
                                return true;
                            }
                            if !visited.contains(neighbour) {
                                work.push(Visit::Enter(neighbour.clone()));
                            }
                        }
                    }
                    Visit::Exit(id) => {
                        on_stack.shift_remove(&id);
                    }
                }
            }
        }
        false
    }

    /// Check the committed hash of transaction `id` against the local tree
    pub fn verify_transaction(&self, id: &str) -> bool {
        match self.transactions.get(id) {
            Some(tx) => self.commitment.read().verify_proof(&tx.hash()),
            None => false,
        }
    }

    /// Inclusion proof for the committed hash of transaction `id`
    pub fn get_proof(&self, id: &str) -> WeaveResult<MerkleProof> {
        match self.transactions.get(id) {
            Some(tx) => Ok(self.commitment.read().get_proof(&tx.hash())),
            None => weave_bail!(LedgerError::TransactionNotFound(id.to_string()), "get_proof", transaction = id),
        }
    }

    pub fn add_to_mempool(&mut self, transaction: Transaction) -> WeaveResult<()> {
        debug!(id = transaction.id(), "queued transaction");
        self.mempool.push(transaction)
    }

    pub fn remove_from_mempool(&mut self, id: &str) -> Option<Transaction> {
        self.mempool.remove(id)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        self.mempool.dead_letters()
    }

    /// Drain the mempool head first.
    ///
    /// Genesis transactions are admitted directly; the rest go through the
    /// consensus policy. A rejection drops the transaction. A policy error
    /// leaves it at the head and the retry policy decides what happens next,
    /// so under `RetryPolicy::Unbounded` a policy that always fails never lets
    /// this return. An admission error that is not retryable, such as a
    /// duplicate id, drops the transaction.
    pub async fn process_mempool(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        info!(collection = self.collection_name(), pending = self.mempool.len(), "processing mempool");

        while let Some(transaction) = self.mempool.front().cloned() {
            let id = transaction.id().to_string();
            match self.admit(transaction).await {
                Ok(true) => {
                    self.mempool.remove(&id);
                    report.admitted.push(id);
                }
                Ok(false) => {
                    warn!(id = %id, "invalid transaction rejected");
                    self.mempool.remove(&id);
                    report.rejected.push(id);
                }
                Err(AdmitFailure::Admission(e)) if !e.is_retryable() => {
                    error!(id = %id, error = %e, severity = ?e.severity(), "transaction cannot be admitted, dropping");
                    self.mempool.remove(&id);
                    report.dropped.push(id);
                }
                Err(AdmitFailure::Validation(e)) | Err(AdmitFailure::Admission(e)) => {
                    report.failed_attempts += 1;
                    error!(id = %id, error = %e, severity = ?e.severity(), "error processing transaction");
                    match self.mempool.record_failure(&e.to_string()) {
                        Some(RetryDecision::Retry { backoff: Some(delay), .. }) => tokio::time::sleep(delay).await,
                        Some(RetryDecision::Retry { backoff: None, .. }) => tokio::task::yield_now().await,
                        Some(RetryDecision::DeadLettered { attempts }) => {
                            error!(id = %id, attempts, "transaction moved to dead letters");
                            report.dead_lettered.push(id);
                        }
                        None => {}
                    }
                }
            }
        }
        report
    }

    async fn admit(&mut self, transaction: Transaction) -> Result<bool, AdmitFailure> {
        if self.is_genesis_transaction(transaction.id()) {
            debug!(id = transaction.id(), "genesis transaction, skipping consensus");
            self.add_transaction(transaction).await.map_err(AdmitFailure::Admission)?;
            return Ok(true);
        }

        let valid = self
            .consensus
            .validate_transaction(&transaction)
            .await
            .map_err(AdmitFailure::Validation)?;
        debug!(id = transaction.id(), policy = self.consensus.name(), valid, "consensus result");
        if valid {
            self.add_transaction(transaction).await.map_err(AdmitFailure::Admission)?;
        }
        Ok(valid)
    }

    /// Register every persisted transaction that is not yet known. Loaded
    /// transactions start with no recorded parents.
    pub async fn load_from_store(&mut self) -> WeaveResult<usize> {
        let mut loaded = 0;
        for transaction in self.store.list().await? {
            if self.transactions.contains_key(transaction.id()) {
                continue;
            }
            self.register(transaction);
            loaded += 1;
        }
        info!(collection = self.collection_name(), loaded, "loaded transactions from store");
        Ok(loaded)
    }

    pub async fn save_to_store(&self) -> WeaveResult<()> {
        for (id, transaction) in &self.transactions {
            self.store.put(id, transaction).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProofOfWork;
    use crate::merkle::LocalCommitmentTree;
    use crate::storage::InMemoryStore;

    fn ledger() -> LedgerGraph {
        LedgerGraph::new(
            Arc::new(InMemoryStore::new("dagTest")),
            Arc::new(ProofOfWork::new(4)),
            LocalCommitmentTree::detached().into_shared(),
            MempoolConfig::default(),
        )
    }

    fn tx(id: &str) -> Transaction {
        Transaction::with_id(id, format!("from-{}", id), format!("to-{}", id), 100, "sig")
    }

    #[tokio::test]
    async fn test_duplicate_leaves_state_unchanged() {
        let mut dag = ledger();
        dag.add_transaction(tx("a")).await.unwrap();
        let root = dag.commitment_tree().read().root_hash().map(str::to_string);

        let err = dag.add_transaction(tx("a")).await.unwrap_err();
        assert!(matches!(err, weave_common::WeaveError::Ledger(LedgerError::DuplicateTransaction(_))));
        assert_eq!(dag.transaction_count(), 1);
        assert_eq!(dag.commitment_tree().read().root_hash().map(str::to_string), root);
    }

    #[tokio::test]
    async fn test_add_parent_child_is_idempotent() {
        let mut dag = ledger();
        dag.add_transaction(tx("a")).await.unwrap();
        dag.add_transaction(tx("b")).await.unwrap();
        dag.add_parent_child("a", "b");
        dag.add_parent_child("a", "b");
        assert_eq!(dag.get_parents(&tx("b")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_link_before_admission_creates_entry() {
        let mut dag = ledger();
        dag.add_parent_child("a", "b");
        assert!(!dag.is_genesis_transaction("b"));
        assert!(dag.is_genesis_transaction("a"));
    }

    #[tokio::test]
    async fn test_has_node_and_edge() {
        let mut dag = ledger();
        let a = tx("a");
        let b = tx("b");
        dag.add_transaction(a.clone()).await.unwrap();

        let edge = DagEdge { from: DagNode::from(&a), to: DagNode::from(&b) };
        assert!(dag.has_node(&DagNode::from(&a)));
        assert!(!dag.has_edge(&edge));

        dag.add_transaction(b.clone()).await.unwrap();
        // Both endpoints exist, no link recorded.
        assert!(dag.has_edge(&edge));
    }

    #[tokio::test]
    async fn test_self_loop_is_cycle() {
        let mut dag = ledger();
        dag.add_transaction(tx("a")).await.unwrap();
        dag.add_parent_child("a", "a");
        assert!(!dag.is_valid());
    }

    #[tokio::test]
    async fn test_diamond_is_acyclic() {
        let mut dag = ledger();
        for id in ["a", "b", "c", "d"] {
            dag.add_transaction(tx(id)).await.unwrap();
        }
        dag.add_parent_child("a", "b");
        dag.add_parent_child("a", "c");
        dag.add_parent_child("b", "d");
        dag.add_parent_child("c", "d");
        assert!(dag.is_valid());
    }

    #[tokio::test]
    async fn test_long_chain_does_not_overflow() {
        let mut dag = ledger();
        let ids: Vec<String> = (0..2_000).map(|i| format!("tx-{}", i)).collect();
        for id in &ids {
            dag.add_transaction(tx(id)).await.unwrap();
        }
        for pair in ids.windows(2) {
            dag.add_parent_child(&pair[0], &pair[1]);
        }
        assert!(dag.is_valid());

        dag.add_parent_child(&ids[ids.len() - 1], &ids[0]);
        assert!(!dag.is_valid());
    }

    #[tokio::test]
    async fn test_orphan_check_sees_links_to_unadmitted_parents() {
        let mut dag = ledger();
        dag.add_transaction(tx("a")).await.unwrap();
        dag.add_transaction(tx("b")).await.unwrap();
        dag.add_parent_child("a", "b");
        dag.add_parent_child("ghost", "a");
        assert!(dag.is_valid());

        dag.add_transaction(tx("c")).await.unwrap();
        assert!(!dag.is_valid());
    }

    #[tokio::test]
    async fn test_verify_unknown_transaction() {
        let dag = ledger();
        assert!(!dag.verify_transaction("missing"));
    }
}
