use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use weave_common::{Transaction, WeaveResult};

/// Key-value persistence for one named collection of transactions.
///
/// The ledger only relies on get-after-put within a single process.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get(&self, id: &str) -> WeaveResult<Option<Transaction>>;
    async fn put(&self, id: &str, record: &Transaction) -> WeaveResult<()>;
    async fn del(&self, id: &str) -> WeaveResult<()>;
    async fn list(&self) -> WeaveResult<Vec<Transaction>>;

    /// Name of the collection this gateway serves
    fn collection_name(&self) -> &str;

    /// Collection-prefixed random identifier
    fn new_id(&self) -> String {
        let prefix: String = self
            .collection_name()
            .to_lowercase()
            .chars()
            .take(5)
            .collect();
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }
}

/// In-memory collection.
///
/// Cloning yields another handle onto the same records, so a caller can
/// hand one store to several ledgers or keep a handle for inspection.
#[derive(Clone)]
pub struct InMemoryStore {
    collection: String,
    records: Arc<RwLock<IndexMap<String, Transaction>>>,
}

impl InMemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn get(&self, id: &str) -> WeaveResult<Option<Transaction>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn put(&self, id: &str, record: &Transaction) -> WeaveResult<()> {
        debug!(collection = %self.collection, id, "put record");
        self.records.write().insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn del(&self, id: &str) -> WeaveResult<()> {
        self.records.write().shift_remove(id);
        Ok(())
    }

    async fn list(&self) -> WeaveResult<Vec<Transaction>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }
}
