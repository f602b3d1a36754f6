use crate::merkle::SharedLocalTree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use weave_common::{Transaction, WeaveResult};

/// Admission policy for the ledger graph.
///
/// Implementations are evaluated locally and must not mutate ledger state.
/// `Ok(false)` rejects a transaction; `Err` means the policy could not
/// decide and the mempool will retry it.
#[async_trait]
pub trait ConsensusPolicy: Send + Sync {
    async fn validate_transaction(&self, transaction: &Transaction) -> WeaveResult<bool>;

    /// Extension point for tip selection. No policy selects tips yet.
    async fn select_tip_transactions(&self) -> WeaveResult<Vec<Transaction>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str;
}

/// Accepts a transaction whose hash starts with `difficulty` zero hex digits
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn meets_difficulty(&self, hash: &str) -> bool {
        hash.len() >= self.difficulty && hash.bytes().take(self.difficulty).all(|b| b == b'0')
    }
}

#[async_trait]
impl ConsensusPolicy for ProofOfWork {
    async fn validate_transaction(&self, transaction: &Transaction) -> WeaveResult<bool> {
        let hash = transaction.hash();
        let accepted = self.meets_difficulty(&hash);
        debug!(id = transaction.id(), %hash, difficulty = self.difficulty, accepted, "proof-of-work check");
        Ok(accepted)
    }

    fn name(&self) -> &'static str {
        "proof_of_work"
    }
}

/// Accepts a transaction whose hash is already a verifiable leaf of the
/// supplied tree. Meant for replay and inclusion checks.
#[derive(Debug, Clone)]
pub struct MerkleInclusion {
    tree: SharedLocalTree,
}

impl MerkleInclusion {
    pub fn new(tree: SharedLocalTree) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl ConsensusPolicy for MerkleInclusion {
    async fn validate_transaction(&self, transaction: &Transaction) -> WeaveResult<bool> {
        let hash = transaction.hash();
        let accepted = self.tree.read().verify_proof(&hash);
        debug!(id = transaction.id(), %hash, accepted, "merkle inclusion check");
        Ok(accepted)
    }

    fn name(&self) -> &'static str {
        "merkle_inclusion"
    }
}

/// Policy selection as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsensusConfig {
    ProofOfWork { difficulty: usize },
    MerkleInclusion,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig::ProofOfWork { difficulty: 4 }
    }
}

impl ConsensusConfig {
    /// Build the configured policy. Merkle inclusion reads `tree`.
    pub fn build(&self, tree: &SharedLocalTree) -> Arc<dyn ConsensusPolicy> {
        match self {
            ConsensusConfig::ProofOfWork { difficulty } => Arc::new(ProofOfWork::new(*difficulty)),
            ConsensusConfig::MerkleInclusion => Arc::new(MerkleInclusion::new(tree.clone())),
        }
    }
}
