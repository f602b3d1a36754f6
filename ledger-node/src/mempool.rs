use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use weave_common::{LedgerError, Transaction, WeaveResult};

/// What the drain does with a head transaction whose validation failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetryPolicy {
    #[default]
    /// Keep the head in place and retry it until validation stops failing.
    /// A head that always fails blocks the queue.
    Unbounded,
    /// Retry up to `max_attempts` times, sleeping `backoff_ms` between
    /// attempts, then move the head to the dead-letter list.
    DeadLetter { max_attempts: u32, backoff_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    pub max_transactions: usize,
    pub retry: RetryPolicy,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 100_000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub received_at: DateTime<Utc>,
    pub attempts: u32,
}

/// A transaction given up on after repeated validation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub tx: Transaction,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Outcome of a failed attempt on the head transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, backoff: Option<Duration> },
    DeadLettered { attempts: u32 },
}

/// FIFO queue of transactions awaiting admission
#[derive(Debug, Default)]
pub struct Mempool {
    config: MempoolConfig,
    queue: VecDeque<MempoolEntry>,
    dead_letters: Vec<DeadLetter>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            dead_letters: Vec::new(),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn push(&mut self, tx: Transaction) -> WeaveResult<()> {
        if self.queue.len() >= self.config.max_transactions {
            return Err(LedgerError::MempoolFull {
                capacity: self.config.max_transactions,
            }
            .into());
        }
        self.queue.push_back(MempoolEntry {
            tx,
            received_at: Utc::now(),
            attempts: 0,
        });
        Ok(())
    }

    /// Head of the queue, the next transaction to process
    pub fn front(&self) -> Option<&Transaction> {
        self.queue.front().map(|entry| &entry.tx)
    }

    /// Remove the first queued transaction with this id
    pub fn remove(&mut self, id: &str) -> Option<Transaction> {
        let index = self.queue.iter().position(|entry| entry.tx.id() == id)?;
        self.queue.remove(index).map(|entry| entry.tx)
    }

    /// Count a failed attempt on the head and apply the retry policy
    pub fn record_failure(&mut self, error: &str) -> Option<RetryDecision> {
        let entry = self.queue.front_mut()?;
        entry.attempts = entry.attempts.saturating_add(1);
        let attempt = entry.attempts;

        match self.config.retry {
            RetryPolicy::Unbounded => Some(RetryDecision::Retry { attempt, backoff: None }),
            RetryPolicy::DeadLetter { max_attempts, backoff_ms } => {
                if attempt >= max_attempts {
                    let entry = self.queue.pop_front()?;
                    self.dead_letters.push(DeadLetter {
                        tx: entry.tx,
                        attempts: entry.attempts,
                        last_error: error.to_string(),
                        dead_lettered_at: Utc::now(),
                    });
                    Some(RetryDecision::DeadLettered { attempts: attempt })
                } else {
                    let backoff = (backoff_ms > 0).then(|| Duration::from_millis(backoff_ms));
                    Some(RetryDecision::Retry { attempt, backoff })
                }
            }
        }
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter().map(|entry| &entry.tx)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queue.iter().any(|entry| entry.tx.id() == id)
    }

    pub fn dead_letters(&self) -> &[DeadLetter] {
        &self.dead_letters
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str) -> Transaction {
        Transaction::with_id(id, "alice", "bob", 1, "sig")
    }

    #[test]
    fn test_fifo_order() {
        let mut pool = Mempool::new(MempoolConfig::default());
        pool.push(tx("a")).unwrap();
        pool.push(tx("b")).unwrap();
        assert_eq!(pool.front().unwrap().id(), "a");

        pool.remove("a");
        assert_eq!(pool.front().unwrap().id(), "b");
    }

    #[test]
    fn test_remove_from_middle() {
        let mut pool = Mempool::new(MempoolConfig::default());
        for id in ["a", "b", "c"] {
            pool.push(tx(id)).unwrap();
        }
        assert_eq!(pool.remove("b").unwrap().id(), "b");
        assert!(pool.remove("b").is_none());
        let ids: Vec<&str> = pool.transactions().map(Transaction::id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut pool = Mempool::new(MempoolConfig {
            max_transactions: 1,
            retry: RetryPolicy::Unbounded,
        });
        pool.push(tx("a")).unwrap();
        assert!(pool.push(tx("b")).is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_unbounded_keeps_head() {
        let mut pool = Mempool::new(MempoolConfig::default());
        pool.push(tx("a")).unwrap();
        for attempt in 1..=10 {
            assert_eq!(
                pool.record_failure("boom"),
                Some(RetryDecision::Retry { attempt, backoff: None })
            );
        }
        assert!(pool.contains("a"));
        assert!(pool.dead_letters().is_empty());
    }

    #[test]
    fn test_dead_letter_after_max_attempts() {
        let mut pool = Mempool::new(MempoolConfig {
            max_transactions: 10,
            retry: RetryPolicy::DeadLetter { max_attempts: 2, backoff_ms: 5 },
        });
        pool.push(tx("a")).unwrap();
        pool.push(tx("b")).unwrap();

        assert_eq!(
            pool.record_failure("boom"),
            Some(RetryDecision::Retry { attempt: 1, backoff: Some(Duration::from_millis(5)) })
        );
        assert_eq!(pool.record_failure("boom"), Some(RetryDecision::DeadLettered { attempts: 2 }));

        assert_eq!(pool.front().unwrap().id(), "b");
        assert_eq!(pool.dead_letters().len(), 1);
        assert_eq!(pool.dead_letters()[0].tx.id(), "a");
        assert_eq!(pool.dead_letters()[0].last_error, "boom");
    }

    #[test]
    fn test_record_failure_on_empty_pool() {
        let mut pool = Mempool::new(MempoolConfig::default());
        assert_eq!(pool.record_failure("boom"), None);
    }
}
