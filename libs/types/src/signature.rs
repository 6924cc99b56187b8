//! ECDSA order signatures
//!
//! Makers sign the order hash as an Ethereum personal message, i.e. the
//! keccak-256 digest of `"\x19Ethereum Signed Message:\n32" ++ hash`. This is
//! what the exchange contract checks on-chain, so the relay verifies the same
//! digest.

use alloy_primitives::{eip191_hash_message, Address, PrimitiveSignature, B256, U256};
use serde::{Deserialize, Serialize};

/// Detachable `(v, r, s)` signature attached to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcSignature {
    /// Recovery id, either 27/28 or 0/1
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl EcSignature {
    pub fn new(v: u8, r: B256, s: B256) -> Self {
        Self { v, r, s }
    }

    fn y_parity(&self) -> Option<bool> {
        match self.v {
            0 | 27 => Some(false),
            1 | 28 => Some(true),
            _ => None,
        }
    }

    /// Recover the address that signed `hash` as a personal message.
    ///
    /// Returns `None` for any malformed signature instead of erroring.
    pub fn recover_signer(&self, hash: &B256) -> Option<Address> {
        let parity = self.y_parity()?;
        let signature = PrimitiveSignature::new(
            U256::from_be_slice(self.r.as_slice()),
            U256::from_be_slice(self.s.as_slice()),
            parity,
        );
        signature
            .recover_address_from_prehash(&signing_digest(hash))
            .ok()
    }
}

/// Digest a maker actually signs for an order hash.
pub fn signing_digest(hash: &B256) -> B256 {
    eip191_hash_message(hash.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn sign(key: &SigningKey, hash: &B256) -> EcSignature {
        let digest = signing_digest(hash);
        let (signature, recovery_id) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
        let bytes = signature.to_bytes();
        EcSignature::new(
            27 + recovery_id.to_byte(),
            B256::from_slice(&bytes[..32]),
            B256::from_slice(&bytes[32..]),
        )
    }

    #[test]
    fn test_recover_signer() {
        let key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let hash = B256::repeat_byte(0xab);
        let signature = sign(&key, &hash);
        assert_eq!(
            signature.recover_signer(&hash),
            Some(Address::from_private_key(&key))
        );
    }

    #[test]
    fn test_recover_with_zero_based_v() {
        let key = SigningKey::from_slice(&[0x22; 32]).unwrap();
        let hash = B256::repeat_byte(0x01);
        let mut signature = sign(&key, &hash);
        signature.v -= 27;
        assert_eq!(
            signature.recover_signer(&hash),
            Some(Address::from_private_key(&key))
        );
    }

    #[test]
    fn test_bad_recovery_id() {
        let key = SigningKey::from_slice(&[0x33; 32]).unwrap();
        let hash = B256::repeat_byte(0x02);
        let mut signature = sign(&key, &hash);
        signature.v = 5;
        assert_eq!(signature.recover_signer(&hash), None);
    }

    #[test]
    fn test_zeroed_signature_does_not_recover() {
        let signature = EcSignature::new(27, B256::ZERO, B256::ZERO);
        assert_eq!(signature.recover_signer(&B256::repeat_byte(0x03)), None);
    }

    #[test]
    fn test_other_hash_recovers_other_address() {
        let key = SigningKey::from_slice(&[0x44; 32]).unwrap();
        let signature = sign(&key, &B256::repeat_byte(0x04));
        assert_ne!(
            signature.recover_signer(&B256::repeat_byte(0x05)),
            Some(Address::from_private_key(&key))
        );
    }
}
