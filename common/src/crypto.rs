use crate::error::{CryptoError, WeaveResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of two node hashes, concatenated as hex text.
///
/// A missing child contributes the empty string, so a node with a single
/// child hashes to `SHA-256(child)`.
pub fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ed25519 key pair for transaction signatures
#[derive(Debug, Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new Ed25519 key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Create from existing secret key bytes
    pub fn from_bytes(secret_bytes: &[u8]) -> WeaveResult<Self> {
        let secret: [u8; 32] = secret_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Hex encoded public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign data, returning the base64 encoded signature
    pub fn sign(&self, data: &[u8]) -> String {
        BASE64.encode(self.signing_key.sign(data).to_bytes())
    }
}

/// Verify a base64 signature over `data` with a hex encoded public key.
///
/// Malformed keys or signatures are errors; a well-formed signature that
/// does not match yields `Ok(false)`.
pub fn verify_signature(public_key_hex: &str, data: &[u8], signature_b64: &str) -> WeaveResult<bool> {
    let key_bytes = hex::decode(public_key_hex).map_err(|_| CryptoError::InvalidPublicKey)?;
    let key_bytes: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let public_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig_bytes = BASE64
        .decode(signature_b64)
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;

    Ok(public_key.verify(data, &signature).is_ok())
}
