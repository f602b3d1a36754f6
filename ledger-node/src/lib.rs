//! Weave ledger node
//!
//! A directed acyclic graph of transactions admitted through a FIFO mempool
//! and a pluggable consensus policy. Every admitted transaction hash is
//! committed to a per-ledger Merkle tree, whose roots are aggregated in a
//! node-wide global tree. Shamir threshold sharing over a prime field is
//! provided for key distribution, and `PeerWallet` simulates per-peer
//! balances over the same transaction type.

pub mod config;
pub mod consensus;
pub mod dag;
pub mod global_merkle;
pub mod mempool;
pub mod merkle;
pub mod node;
pub mod storage;
pub mod threshold;
pub mod wallet;

pub use config::{ConfigOverrides, NodeConfig};
pub use consensus::{ConsensusConfig, ConsensusPolicy, MerkleInclusion, ProofOfWork};
pub use dag::{DagEdge, DagNode, DrainReport, LedgerGraph};
pub use global_merkle::{GlobalCommitmentTree, SharedGlobalTree};
pub use mempool::{DeadLetter, Mempool, MempoolConfig, RetryPolicy};
pub use merkle::{CommitmentNode, LocalCommitmentTree, MerkleProof, ProofStep, SharedLocalTree};
pub use node::{LedgerNode, LedgerStats, NodeStats};
pub use storage::{InMemoryStore, PersistenceGateway};
pub use threshold::{key_const, key_dist, secp256k1_order, ThresholdKeyManager};
pub use wallet::PeerWallet;
