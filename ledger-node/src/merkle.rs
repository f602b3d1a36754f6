use crate::global_merkle::SharedGlobalTree;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use weave_common::hash_pair;

/// Position of a node inside a [`CommitmentArena`]
pub type NodeIndex = usize;

/// Local tree shared between a ledger and the policies that read it
pub type SharedLocalTree = Arc<RwLock<LocalCommitmentTree>>;

/// A node of a commitment tree.
///
/// Links are arena indices. `parent` is a back-reference only; ownership
/// of every node stays with the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentNode {
    pub hash: String,
    pub left: Option<NodeIndex>,
    pub right: Option<NodeIndex>,
    pub parent: Option<NodeIndex>,
}

impl CommitmentNode {
    fn leaf(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            left: None,
            right: None,
            parent: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Node pool for one generation of a tree. Rebuilt from scratch on every
/// mutation; old generations are dropped whole.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitmentArena {
    nodes: Vec<CommitmentNode>,
    leaves: Vec<NodeIndex>,
    root: Option<NodeIndex>,
}

impl CommitmentArena {
    /// Pair adjacent nodes level by level. An odd trailing node is promoted
    /// unchanged to the next level.
    pub(crate) fn build<'a>(hashes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut nodes: Vec<CommitmentNode> = hashes.into_iter().map(CommitmentNode::leaf).collect();
        let leaves: Vec<NodeIndex> = (0..nodes.len()).collect();
        if leaves.is_empty() {
            return Self::default();
        }

        let mut level = leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                match *pair {
                    [left, right] => {
                        let parent = nodes.len();
                        let hash = hash_pair(&nodes[left].hash, &nodes[right].hash);
                        nodes.push(CommitmentNode {
                            hash,
                            left: Some(left),
                            right: Some(right),
                            parent: None,
                        });
                        nodes[left].parent = Some(parent);
                        nodes[right].parent = Some(parent);
                        next.push(parent);
                    }
                    [odd] => next.push(odd),
                    _ => {}
                }
            }
            level = next;
        }

        Self {
            nodes,
            leaves,
            root: level.first().copied(),
        }
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &CommitmentNode {
        &self.nodes[index]
    }

    pub(crate) fn leaf(&self, position: usize) -> Option<NodeIndex> {
        self.leaves.get(position).copied()
    }

    pub(crate) fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    /// Recompute a node's hash from its current children and compare it to
    /// the stored one. Leaves are accepted as they are.
    pub(crate) fn is_consistent(&self, index: NodeIndex) -> bool {
        let node = &self.nodes[index];
        if node.is_leaf() {
            return true;
        }
        let left = node.left.map(|i| self.nodes[i].hash.as_str()).unwrap_or("");
        let right = node.right.map(|i| self.nodes[i].hash.as_str()).unwrap_or("");
        node.hash == hash_pair(left, right)
    }

    /// Check every ancestor of `index` and require the walk to end at the root
    pub(crate) fn verify_path(&self, index: NodeIndex) -> bool {
        let mut current = index;
        if !self.is_consistent(current) {
            return false;
        }
        while let Some(parent) = self.nodes[current].parent {
            if !self.is_consistent(parent) {
                return false;
            }
            current = parent;
        }
        self.root == Some(current)
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, index: NodeIndex, hash: &str) {
        self.nodes[index].hash = hash.to_string();
    }
}

/// Side of its parent a node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStep {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

/// Leaf-to-root inclusion path: one step and one sibling hash per level.
/// A sibling is the empty string where the node had none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub path: Vec<ProofStep>,
    pub path_hashes: Vec<String>,
}

impl MerkleProof {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }
}

/// Binary Merkle tree over one ledger's transaction hashes.
///
/// Every insertion rebuilds the whole tree and, when attached to a global
/// tree, publishes the new root there.
#[derive(Debug)]
pub struct LocalCommitmentTree {
    leaf_hashes: Vec<String>,
    arena: CommitmentArena,
    global: Option<SharedGlobalTree>,
}

impl LocalCommitmentTree {
    /// Tree that publishes every new root into `global`
    pub fn new(global: SharedGlobalTree) -> Self {
        Self {
            leaf_hashes: Vec::new(),
            arena: CommitmentArena::default(),
            global: Some(global),
        }
    }

    /// Tree that is not attached to any global tree
    pub fn detached() -> Self {
        Self {
            leaf_hashes: Vec::new(),
            arena: CommitmentArena::default(),
            global: None,
        }
    }

    pub fn into_shared(self) -> SharedLocalTree {
        Arc::new(RwLock::new(self))
    }

    pub fn add_transaction_hash(&mut self, hash: &str) {
        self.leaf_hashes.push(hash.to_string());
        self.recalculate();
        self.publish_root();
    }

    fn recalculate(&mut self) {
        self.arena = CommitmentArena::build(self.leaf_hashes.iter().map(String::as_str));
        debug!(
            leaves = self.leaf_hashes.len(),
            root = ?self.root_hash(),
            "recalculated local commitment tree"
        );
    }

    fn publish_root(&self) {
        if let (Some(global), Some(root)) = (&self.global, self.root_hash()) {
            global.write().add_local_root(root);
        }
    }

    fn leaf_index(&self, hash: &str) -> Option<NodeIndex> {
        let position = self.leaf_hashes.iter().position(|h| h == hash)?;
        self.arena.leaf(position)
    }

    pub fn root(&self) -> Option<&CommitmentNode> {
        self.arena.root().map(|i| self.arena.node(i))
    }

    pub fn root_hash(&self) -> Option<&str> {
        self.root().map(|node| node.hash.as_str())
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_hashes.len()
    }

    pub fn leaf_hashes(&self) -> &[String] {
        &self.leaf_hashes
    }

    /// Number of levels between the root and the deepest leaf
    pub fn depth(&self) -> usize {
        // The first leaf is never promoted, so it sits at the deepest level.
        self.get_proof_at(0).len()
    }

    /// True when `hash` is a leaf whose node is intact
    pub fn verify_transaction_hash(&self, hash: &str) -> bool {
        self.leaf_index(hash)
            .map(|index| self.arena.is_consistent(index))
            .unwrap_or(false)
    }

    /// Inclusion path for `hash`; empty if it is not a leaf
    pub fn get_proof(&self, hash: &str) -> MerkleProof {
        match self.leaf_hashes.iter().position(|h| h == hash) {
            Some(position) => self.get_proof_at(position),
            None => MerkleProof::default(),
        }
    }

    fn get_proof_at(&self, position: usize) -> MerkleProof {
        let mut proof = MerkleProof::default();
        let Some(mut current) = self.arena.leaf(position) else {
            return proof;
        };

        while let Some(parent_index) = self.arena.node(current).parent {
            let parent = self.arena.node(parent_index);
            let sibling = if parent.left == Some(current) {
                proof.path.push(ProofStep::Left);
                parent.right
            } else {
                proof.path.push(ProofStep::Right);
                parent.left
            };
            proof
                .path_hashes
                .push(sibling.map(|i| self.arena.node(i).hash.clone()).unwrap_or_default());
            current = parent_index;
        }
        proof
    }

    /// Walk from the leaf for `hash` to the root, recomputing every
    /// ancestor from its children.
    pub fn verify_proof(&self, hash: &str) -> bool {
        match self.leaf_index(hash) {
            Some(index) => self.arena.verify_path(index),
            None => false,
        }
    }

    /// This tree's leaves followed by `other`'s, as a new detached tree
    pub fn merge(&self, other: &LocalCommitmentTree) -> LocalCommitmentTree {
        let mut merged = self.clone();
        merged.leaf_hashes.extend(other.leaf_hashes.iter().cloned());
        merged.recalculate();
        merged
    }

    #[cfg(test)]
    pub(crate) fn arena_mut(&mut self) -> &mut CommitmentArena {
        &mut self.arena
    }
}

/// Rebuilds an equivalent tree from the same leaf sequence. The copy is
/// detached so it never publishes into the source tree's global tree.
impl Clone for LocalCommitmentTree {
    fn clone(&self) -> Self {
        let mut copy = LocalCommitmentTree::detached();
        copy.leaf_hashes = self.leaf_hashes.clone();
        copy.recalculate();
        copy
    }
}
