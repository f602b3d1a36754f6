use serde::{Deserialize, Serialize};
use tracing::debug;
use weave_common::Transaction;

/// Local balance book for one named peer.
///
/// Balances are simulated: nothing here touches a ledger. A peer applies
/// outgoing transfers it can cover and incoming transfers addressed to it,
/// keeping both in its history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerWallet {
    name: String,
    balance: u64,
    transactions: Vec<Transaction>,
}

impl PeerWallet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_balance(name, 0)
    }

    pub fn with_balance(name: impl Into<String>, balance: u64) -> Self {
        Self {
            name: name.into(),
            balance,
            transactions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Debit `transaction.amount()` if the balance covers it. The sender
    /// field is not checked against this peer.
    pub fn send_transaction(&mut self, transaction: &Transaction) -> bool {
        match self.balance.checked_sub(transaction.amount()) {
            Some(remaining) => {
                self.balance = remaining;
                self.transactions.push(transaction.clone());
                debug!(peer = %self.name, id = transaction.id(), remaining, "sent transfer");
                true
            }
            None => {
                debug!(peer = %self.name, id = transaction.id(), balance = self.balance, "insufficient balance");
                false
            }
        }
    }

    /// Credit a transfer addressed to this peer; anything else is ignored
    pub fn receive_transaction(&mut self, transaction: &Transaction) {
        if transaction.to() == self.name {
            self.balance = self.balance.saturating_add(transaction.amount());
            self.transactions.push(transaction.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: &str, to: &str, amount: u64) -> Transaction {
        Transaction::new(from, to, amount, "sig")
    }

    #[test]
    fn test_broadcast_only_credits_recipient() {
        let mut peers: Vec<PeerWallet> = (0..5)
            .map(|i| PeerWallet::with_balance(format!("peer-{}", i), 1000))
            .collect();
        let tx = transfer("peer-0", "peer-1", 100);

        assert!(peers[0].send_transaction(&tx));
        for peer in peers.iter_mut().skip(1) {
            peer.receive_transaction(&tx);
        }

        assert_eq!(peers[0].balance(), 900);
        assert_eq!(peers[1].balance(), 1100);
        assert!(peers[2..].iter().all(|p| p.balance() == 1000 && p.transactions().is_empty()));
        assert_eq!(peers[1].transactions(), &[tx.clone()]);
        assert_eq!(peers[0].transactions(), &[tx]);
    }

    #[test]
    fn test_insufficient_balance_is_refused() {
        let mut peer = PeerWallet::new("peer-0");
        assert!(!peer.send_transaction(&transfer("peer-0", "peer-1", 1)));
        assert_eq!(peer.balance(), 0);
        assert!(peer.transactions().is_empty());

        let mut peer = PeerWallet::with_balance("peer-0", 50);
        assert!(peer.send_transaction(&transfer("peer-0", "peer-1", 50)));
        assert_eq!(peer.balance(), 0);
    }
}
