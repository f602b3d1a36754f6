use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_traits::{One, Zero};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use weave_common::{weave_bail, Participant, Share, ThresholdError, WeaveError, WeaveResult};

/// Order of the secp256k1 group, big-endian
const SECP256K1_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

pub fn secp256k1_order() -> BigUint {
    BigUint::from_bytes_be(&SECP256K1_ORDER)
}

/// Parse a hex modulus such as the one carried in configuration
pub fn parse_modulus(hex: &str) -> WeaveResult<BigUint> {
    let digits = hex.trim().trim_start_matches("0x");
    let modulus = BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| WeaveError::Config(format!("invalid modulus: {}", hex)))?;
    if modulus.is_zero() {
        return Err(ThresholdError::ZeroModulus.into());
    }
    Ok(modulus)
}

/// Shamir secret sharing over the prime field `[0, modulus)`.
///
/// A secret is the constant term of a random polynomial of degree
/// `threshold - 1`; share `i` is that polynomial evaluated at `x = i`.
#[derive(Debug, Clone)]
pub struct ThresholdKeyManager {
    threshold: usize,
    modulus: BigUint,
    participants: BTreeMap<u32, Participant>,
}

impl ThresholdKeyManager {
    pub fn new(threshold: usize, modulus: BigUint) -> Self {
        Self {
            threshold,
            modulus,
            participants: BTreeMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    fn checked_modulus(&self) -> WeaveResult<&BigUint> {
        if self.modulus.is_zero() {
            return Err(ThresholdError::ZeroModulus.into());
        }
        Ok(&self.modulus)
    }

    /// Reduce a signed value into `[0, modulus)`
    fn normalize(&self, value: &BigInt) -> BigUint {
        let modulus = BigInt::from_biguint(Sign::Plus, self.modulus.clone());
        let mut reduced = value % &modulus;
        if reduced.sign() == Sign::Minus {
            reduced += &modulus;
        }
        reduced.magnitude().clone()
    }

    /// `degree` coefficients drawn uniformly from the field
    pub fn generate_random_coefficients(&self, degree: usize) -> WeaveResult<Vec<BigUint>> {
        let modulus = self.checked_modulus()?;
        let mut rng = rand::thread_rng();
        Ok((0..degree).map(|_| rng.gen_biguint_below(modulus)).collect())
    }

    /// Evaluate a polynomial given highest-degree coefficient first.
    /// `[76, 10, 123]` is `76x^2 + 10x + 123`.
    pub fn evaluate_polynomial(&self, coefficients: &[BigUint], x: &BigUint) -> WeaveResult<BigUint> {
        let modulus = self.checked_modulus()?;
        let x = x % modulus;
        let mut result = BigUint::zero();

        for (index, coefficient) in coefficients.iter().enumerate() {
            let exponent = BigUint::from(coefficients.len() - index - 1);
            let term = (coefficient * x.modpow(&exponent, modulus)) % modulus;
            result = (result + term) % modulus;
        }
        Ok(result)
    }

    /// Split `secret` into `n` shares at `x = 1..=n`
    pub fn distribute_key(&self, secret: &BigUint, n: u32) -> WeaveResult<Vec<Share>> {
        if self.threshold == 0 {
            return Err(ThresholdError::InvalidThreshold("threshold must be at least 1".into()).into());
        }
        if (n as usize) < self.threshold {
            warn!(n, threshold = self.threshold, "fewer shares than threshold, secret will not be recoverable");
        }

        let mut coefficients = self.generate_random_coefficients(self.threshold - 1)?;
        coefficients.push(secret.clone());

        let shares = (1..=n)
            .map(|index| {
                let value = self.evaluate_polynomial(&coefficients, &BigUint::from(index))?;
                Ok(Share::new(index, value))
            })
            .collect::<WeaveResult<Vec<_>>>()?;
        info!(shares = shares.len(), threshold = self.threshold, "distributed key");
        Ok(shares)
    }

    /// Lagrange interpolation at `x = 0` over every supplied share.
    ///
    /// Share count and consistency are not checked: fewer than `threshold`
    /// genuine shares produce a wrong value, not an error.
    pub fn reconstruct_key(&self, shares: &[Share]) -> WeaveResult<BigUint> {
        self.lagrange_interpolation(shares)
    }

    fn lagrange_interpolation(&self, shares: &[Share]) -> WeaveResult<BigUint> {
        let modulus = self.checked_modulus()?;
        if shares.is_empty() {
            return Err(ThresholdError::InvalidShare("no shares supplied".into()).into());
        }
        if shares.len() < self.threshold {
            debug!(supplied = shares.len(), threshold = self.threshold, "interpolating below threshold");
        }

        let mut secret = BigUint::zero();
        for (i, share_i) in shares.iter().enumerate() {
            let xi = BigInt::from(share_i.index);
            let mut numerator = BigInt::one();
            let mut denominator = BigInt::one();

            for (j, share_j) in shares.iter().enumerate() {
                if i != j {
                    let xj = BigInt::from(share_j.index);
                    numerator = BigInt::from(self.normalize(&(numerator * -&xj)));
                    denominator = BigInt::from(self.normalize(&(denominator * (&xi - &xj))));
                }
            }

            let numerator = self.normalize(&numerator);
            let denominator = self.normalize(&denominator);
            let inverse = denominator.modinv(modulus).ok_or_else(|| {
                ThresholdError::NotInvertible(format!("denominator for share {}", share_i.index))
            })?;

            let basis = (numerator * inverse) % modulus;
            let term = (&share_i.value * basis) % modulus;
            secret = (secret + term) % modulus;
        }
        Ok(secret)
    }

    pub fn add_participant(&mut self, participant: Participant) -> WeaveResult<()> {
        let id = participant.id;
        if id == 0 {
            weave_bail!(
                ThresholdError::InvalidShare("participant id must be at least 1".into()),
                "add_participant",
                participant = id
            );
        }
        if self.participants.contains_key(&id) {
            weave_bail!(ThresholdError::DuplicateParticipant(id), "add_participant", participant = id);
        }
        self.participants.insert(id, participant);
        Ok(())
    }

    /// Split `secret` across one new participant per public key, ids
    /// starting at 1, and register them.
    pub fn enroll(&mut self, secret: &BigUint, public_keys: Vec<String>) -> WeaveResult<Vec<Participant>> {
        let shares = self.distribute_key(secret, public_keys.len() as u32)?;
        let mut enrolled = Vec::with_capacity(shares.len());
        for (share, public_key) in shares.into_iter().zip(public_keys) {
            let participant = Participant {
                id: share.index,
                public_key,
                private_key_share: share,
            };
            self.add_participant(participant.clone())?;
            enrolled.push(participant);
        }
        Ok(enrolled)
    }

    pub fn participant(&self, id: u32) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }
}

/// Split `key` into `total` shares with the given threshold
pub fn key_dist(total: u32, threshold: usize, key: &BigUint, modulus: &BigUint) -> WeaveResult<Vec<Share>> {
    ThresholdKeyManager::new(threshold, modulus.clone()).distribute_key(key, total)
}

/// Reconstruct a key from shares
pub fn key_const(shares: &[Share], modulus: &BigUint) -> WeaveResult<BigUint> {
    ThresholdKeyManager::new(shares.len(), modulus.clone()).reconstruct_key(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ThresholdKeyManager {
        ThresholdKeyManager::new(3, secp256k1_order())
    }

    fn big(values: &[u64]) -> Vec<BigUint> {
        values.iter().map(|v| BigUint::from(*v)).collect()
    }

    #[test]
    fn test_secp256k1_order_matches_hex() {
        let parsed =
            parse_modulus("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141").unwrap();
        assert_eq!(parsed, secp256k1_order());
    }

    #[test]
    fn test_correctly_evaluates_polynomial() {
        let result = manager()
            .evaluate_polynomial(&big(&[76, 10, 123]), &BigUint::from(1u32))
            .unwrap();
        assert_eq!(result, BigUint::from(209u32));
    }

    #[test]
    fn test_evaluation_reduces_modulo() {
        let small = ThresholdKeyManager::new(3, BigUint::from(7u32));
        // 76*4 + 10*2 + 123 = 447 = 63*7 + 6
        let result = small.evaluate_polynomial(&big(&[76, 10, 123]), &BigUint::from(2u32)).unwrap();
        assert_eq!(result, BigUint::from(6u32));
    }

    #[test]
    fn test_interpolates_known_points() {
        let shares = vec![
            Share::new(1, BigUint::from(209u32)),
            Share::new(2, BigUint::from(447u32)),
            Share::new(3, BigUint::from(837u32)),
        ];
        assert_eq!(manager().reconstruct_key(&shares).unwrap(), BigUint::from(123u32));
    }

    #[test]
    fn test_any_three_of_five_reconstruct() {
        let manager = manager();
        let secret = BigUint::from(123u32);
        let shares = manager.distribute_key(&secret, 5).unwrap();
        assert_eq!(shares.len(), 5);
        assert!(shares.iter().all(|s| s.value < *manager.modulus()));

        for a in 0..5 {
            for b in (a + 1)..5 {
                for c in (b + 1)..5 {
                    let subset = vec![shares[a].clone(), shares[b].clone(), shares[c].clone()];
                    assert_eq!(manager.reconstruct_key(&subset).unwrap(), secret);
                }
            }
        }
        assert_eq!(manager.reconstruct_key(&shares).unwrap(), secret);
    }

    #[test]
    fn test_large_secret_roundtrip() {
        let manager = manager();
        let secret = secp256k1_order() - BigUint::from(12345u32);
        let shares = manager.distribute_key(&secret, 4).unwrap();
        assert_eq!(manager.reconstruct_key(&shares[1..]).unwrap(), secret);
    }

    #[test]
    fn test_below_threshold_is_silently_wrong() {
        let manager = manager();
        let secret = BigUint::from(123u32);
        let shares = manager.distribute_key(&secret, 5).unwrap();
        let result = manager.reconstruct_key(&shares[..2]).unwrap();
        assert_ne!(result, secret);
    }

    #[test]
    fn test_zero_modulus_is_rejected() {
        let manager = ThresholdKeyManager::new(3, BigUint::zero());
        let err = manager
            .evaluate_polynomial(&big(&[1, 2, 3]), &BigUint::from(1u32))
            .unwrap_err();
        assert!(matches!(err, WeaveError::Threshold(ThresholdError::ZeroModulus)));
        assert!(manager.distribute_key(&BigUint::from(1u32), 3).is_err());
        assert!(parse_modulus("0").is_err());
    }

    #[test]
    fn test_repeated_index_is_not_invertible() {
        let shares = vec![
            Share::new(1, BigUint::from(209u32)),
            Share::new(1, BigUint::from(209u32)),
        ];
        let err = manager().reconstruct_key(&shares).unwrap_err();
        assert!(matches!(err, WeaveError::Threshold(ThresholdError::NotInvertible(_))));
    }

    #[test]
    fn test_duplicate_participant() {
        let mut manager = manager();
        let participant = Participant {
            id: 1,
            public_key: "pk".into(),
            private_key_share: Share::new(1, BigUint::from(5u32)),
        };
        manager.add_participant(participant.clone()).unwrap();
        let err = manager.add_participant(participant).unwrap_err();
        assert!(matches!(err, WeaveError::Threshold(ThresholdError::DuplicateParticipant(1))));
        assert_eq!(manager.participants().count(), 1);
    }

    #[test]
    fn test_enroll_registers_participants() {
        let mut manager = manager();
        let secret = BigUint::from(987654321u64);
        let keys = vec!["pk-a".to_string(), "pk-b".to_string(), "pk-c".to_string()];
        let enrolled = manager.enroll(&secret, keys).unwrap();

        assert_eq!(enrolled.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(manager.participant(2).unwrap().public_key, "pk-b");

        let shares: Vec<Share> = manager.participants().map(|p| p.private_key_share.clone()).collect();
        assert_eq!(manager.reconstruct_key(&shares).unwrap(), secret);
    }

    #[test]
    fn test_functional_api() {
        let modulus = secp256k1_order();
        let key = BigUint::from(42u32);
        let shares = key_dist(5, 2, &key, &modulus).unwrap();
        assert_eq!(key_const(&shares[3..], &modulus).unwrap(), key);
    }
}
