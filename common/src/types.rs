use crate::crypto::{sha256_hex, verify_signature, SigningKeyPair};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A value transfer recorded in the ledger graph.
///
/// Fields are private: a transaction is immutable once built, and any
/// change means constructing a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: String,
    from: String,
    to: String,
    amount: u64,
    signature: String,
}

/// Hash input: every field except the signature, in this exact order.
#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    id: &'a str,
    from: &'a str,
    to: &'a str,
    amount: u64,
}

impl Transaction {
    /// Create a transaction with a freshly generated id
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64, signature: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), from, to, amount, signature)
    }

    /// Create a transaction with a caller supplied id
    pub fn with_id(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: u64,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            amount,
            signature: signature.into(),
        }
    }

    /// Create a transaction signed by `keypair` over its canonical form
    pub fn signed(from: impl Into<String>, to: impl Into<String>, amount: u64, keypair: &SigningKeyPair) -> Self {
        let mut transaction = Self::new(from, to, amount, String::new());
        transaction.signature = keypair.sign(transaction.serialize().as_bytes());
        transaction
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Canonical JSON text: `{"id":..,"from":..,"to":..,"amount":..}`
    pub fn serialize(&self) -> String {
        let canonical = CanonicalTransaction {
            id: &self.id,
            from: &self.from,
            to: &self.to,
            amount: self.amount,
        };
        // A struct of strings and an integer always serializes.
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// Hex SHA-256 of the canonical serialization
    pub fn hash(&self) -> String {
        sha256_hex(self.serialize().as_bytes())
    }

    /// Verify the signature against a hex encoded Ed25519 public key.
    ///
    /// Fails closed: empty fields, a zero amount, undecodable input and
    /// mismatching signatures all return `false`.
    pub fn validate(&self, public_key: &str) -> bool {
        if self.from.is_empty() || self.to.is_empty() || self.amount == 0 || self.signature.is_empty() {
            return false;
        }
        verify_signature(public_key, self.serialize().as_bytes(), &self.signature).unwrap_or(false)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction({} {} -> {}: {})", self.id, self.from, self.to, self.amount)
    }
}

/// A point `(index, value)` on a secret sharing polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub index: u32,
    pub value: BigUint,
}

impl Share {
    pub fn new(index: u32, value: BigUint) -> Self {
        Self { index, value }
    }
}

/// A key holder registered with a threshold key manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: u32,
    pub public_key: String,
    pub private_key_share: Share,
}
