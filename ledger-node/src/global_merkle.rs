use crate::merkle::{CommitmentArena, CommitmentNode};
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Global tree shared by every local tree of a node
pub type SharedGlobalTree = Arc<RwLock<GlobalCommitmentTree>>;

/// Merkle tree whose leaves are local tree roots.
///
/// Roots are kept in first-insertion order. Adding a root that is already
/// present keeps its position but still rebuilds the tree.
#[derive(Debug, Default)]
pub struct GlobalCommitmentTree {
    local_roots: IndexSet<String>,
    arena: CommitmentArena,
}

impl GlobalCommitmentTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedGlobalTree {
        Arc::new(RwLock::new(self))
    }

    pub fn add_local_root(&mut self, local_root_hash: &str) {
        let inserted = self.local_roots.insert(local_root_hash.to_string());
        self.recalculate_tree();
        debug!(
            local_root = local_root_hash,
            inserted,
            roots = self.local_roots.len(),
            global_root = ?self.root_hash(),
            "recalculated global commitment tree"
        );
    }

    pub fn recalculate_tree(&mut self) {
        self.arena = CommitmentArena::build(self.local_roots.iter().map(String::as_str));
    }

    /// Walk from the leaf for `local_root_hash` to the top, recomputing every
    /// ancestor. True only if the walk ends at the current root.
    pub fn verify_local_root_in_global_tree(&self, local_root_hash: &str) -> bool {
        self.local_roots
            .get_index_of(local_root_hash)
            .and_then(|position| self.arena.leaf(position))
            .map(|index| self.arena.verify_path(index))
            .unwrap_or(false)
    }

    pub fn root(&self) -> Option<&CommitmentNode> {
        self.arena.root().map(|i| self.arena.node(i))
    }

    pub fn root_hash(&self) -> Option<&str> {
        self.root().map(|node| node.hash.as_str())
    }

    pub fn local_root_count(&self) -> usize {
        self.local_roots.len()
    }

    pub fn local_roots(&self) -> impl Iterator<Item = &str> {
        self.local_roots.iter().map(String::as_str)
    }
}
