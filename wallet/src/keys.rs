use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    address::PaymentAddress, backend::ShieldedBackend, error::WalletError, serde_hex,
};

pub const KEY_SIZE: usize = 32;
pub const DIVERSIFIER_SIZE: usize = 11;

/// Root spending secret for one shielded address.
/// Zeroized on drop to prevent key material from persisting in memory.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SpendingKey(#[serde(with = "serde_hex")] [u8; KEY_SIZE]);

impl SpendingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, WalletError> {
        serde_hex::decode_array(text)
            .map(Self)
            .map_err(WalletError::Serialization)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpendingKey(..)")
    }
}

/// `ask`, `nsk` and `ovk` expanded from a spending key.
/// Derived on demand and never persisted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ExpandedSpendingKey {
    pub ask: [u8; KEY_SIZE],
    pub nsk: [u8; KEY_SIZE],
    pub ovk: [u8; KEY_SIZE],
}

impl fmt::Debug for ExpandedSpendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExpandedSpendingKey(..)")
    }
}

/// Spend-authorizing scalar held back from the node when signing happens
/// on the caller's side.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SpendAuthorizingKey([u8; KEY_SIZE]);

impl SpendAuthorizingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SpendAuthorizingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpendAuthorizingKey(..)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FullViewingKey {
    #[serde(with = "serde_hex")]
    pub ak: [u8; KEY_SIZE],
    #[serde(with = "serde_hex")]
    pub nk: [u8; KEY_SIZE],
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingViewingKey(#[serde(with = "serde_hex")] [u8; KEY_SIZE]);

impl IncomingViewingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, WalletError> {
        serde_hex::decode_array(text)
            .map(Self)
            .map_err(WalletError::Serialization)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingViewingKey(#[serde(with = "serde_hex")] [u8; KEY_SIZE]);

impl OutgoingViewingKey {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, WalletError> {
        serde_hex::decode_array(text)
            .map(Self)
            .map_err(WalletError::Serialization)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Diversifier(#[serde(with = "serde_hex")] [u8; DIVERSIFIER_SIZE]);

impl Diversifier {
    pub fn from_bytes(bytes: [u8; DIVERSIFIER_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(text: &str) -> Result<Self, WalletError> {
        serde_hex::decode_array(text)
            .map(Self)
            .map_err(WalletError::Serialization)
    }

    pub fn as_bytes(&self) -> &[u8; DIVERSIFIER_SIZE] {
        &self.0
    }
}

/// Everything needed to receive at, scan for, and spend from one shielded
/// address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub sk: SpendingKey,
    pub d: Diversifier,
    pub ivk: IncomingViewingKey,
    pub ovk: OutgoingViewingKey,
    #[serde(with = "serde_hex")]
    pub pk_d: [u8; KEY_SIZE],
}

impl AddressRecord {
    pub fn payment_address(&self) -> PaymentAddress {
        PaymentAddress {
            d: self.d,
            pk_d: self.pk_d,
        }
    }

    pub fn encoded_address(&self) -> Result<String, WalletError> {
        self.payment_address().encode()
    }

    /// Post-condition applied before a derived record is handed out.
    pub fn validate_check(&self) -> Result<(), WalletError> {
        if is_zero(self.sk.as_bytes()) {
            return Err(WalletError::Validation("spending key is zero"));
        }
        if is_zero(self.ivk.as_bytes()) {
            return Err(WalletError::Validation("incoming viewing key is zero"));
        }
        // ivk is a Jubjub scalar truncated to 251 bits
        if self.ivk.as_bytes()[KEY_SIZE - 1] & 0xf8 != 0 {
            return Err(WalletError::Validation(
                "incoming viewing key exceeds 251 bits",
            ));
        }
        if is_zero(self.ovk.as_bytes()) {
            return Err(WalletError::Validation("outgoing viewing key is zero"));
        }
        if is_zero(&self.pk_d) {
            return Err(WalletError::Validation("transmission key is zero"));
        }
        Ok(())
    }
}

/// Sequences the node's key primitives from a spending key down to a
/// payment address. Any absent intermediate aborts the whole chain.
pub struct KeyDerivation<'a> {
    backend: &'a dyn ShieldedBackend,
}

impl<'a> KeyDerivation<'a> {
    pub fn new(backend: &'a dyn ShieldedBackend) -> Self {
        Self { backend }
    }

    pub fn expand(&self, sk: &SpendingKey) -> Result<ExpandedSpendingKey, WalletError> {
        self.backend
            .expand_spending_key(sk)?
            .ok_or(WalletError::RemoteAbsent("expanded spending key"))
    }

    pub fn ak_from_ask(&self, ask: &[u8; KEY_SIZE]) -> Result<[u8; KEY_SIZE], WalletError> {
        self.backend
            .ak_from_ask(ask)?
            .ok_or(WalletError::RemoteAbsent("ak"))
    }

    pub fn full_viewing_key(&self, sk: &SpendingKey) -> Result<FullViewingKey, WalletError> {
        let expanded = self.expand(sk)?;
        self.viewing_key_from_expanded(&expanded)
    }

    fn viewing_key_from_expanded(
        &self,
        expanded: &ExpandedSpendingKey,
    ) -> Result<FullViewingKey, WalletError> {
        let ak = self.ak_from_ask(&expanded.ask)?;
        let nk = self
            .backend
            .nk_from_nsk(&expanded.nsk)?
            .ok_or(WalletError::RemoteAbsent("nk"))?;
        Ok(FullViewingKey { ak, nk })
    }

    /// Re-derives the address record for a known spending key and diversifier.
    pub fn derive_address(
        &self,
        sk: SpendingKey,
        d: Diversifier,
    ) -> Result<AddressRecord, WalletError> {
        let expanded = self.expand(&sk)?;
        let fvk = self.viewing_key_from_expanded(&expanded)?;
        let ivk = self
            .backend
            .incoming_viewing_key(&fvk)?
            .ok_or(WalletError::RemoteAbsent("incoming viewing key"))?;
        let pk_d = self
            .backend
            .payment_address(&d, &ivk)?
            .ok_or(WalletError::RemoteAbsent("payment address"))?;
        let record = AddressRecord {
            sk,
            d,
            ivk,
            ovk: OutgoingViewingKey::from_bytes(expanded.ovk),
            pk_d,
        };
        record.validate_check()?;
        debug!(diversifier = %hex::encode(d.as_bytes()), "derived shielded address");
        Ok(record)
    }

    /// Draws a fresh spending key and diversifier from the node, then derives.
    pub fn generate_address(&self) -> Result<AddressRecord, WalletError> {
        let sk = self
            .backend
            .spending_key()?
            .ok_or(WalletError::RemoteAbsent("spending key"))?;
        let d = self
            .backend
            .diversifier()?
            .ok_or(WalletError::RemoteAbsent("diversifier"))?;
        self.derive_address(sk, d)
    }
}

fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|byte| *byte == 0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::backend::testing::MockBackend;

    #[test]
    fn generated_address_validates_and_encodes() {
        let backend = MockBackend::new();
        let record = KeyDerivation::new(&backend).generate_address().unwrap();
        record.validate_check().unwrap();
        let encoded = record.encoded_address().unwrap();
        assert_eq!(
            PaymentAddress::decode(&encoded).unwrap(),
            record.payment_address()
        );
        assert_eq!(
            backend.calls(),
            vec![
                "spending_key",
                "diversifier",
                "expand_spending_key",
                "ak_from_ask",
                "nk_from_nsk",
                "incoming_viewing_key",
                "payment_address",
            ]
        );
    }

    #[test]
    fn absent_primitive_aborts_pipeline() {
        let backend = MockBackend::new();
        backend.mark_absent("nk_from_nsk");
        let err = KeyDerivation::new(&backend)
            .derive_address(
                SpendingKey::from_bytes([5u8; KEY_SIZE]),
                Diversifier::from_bytes([1u8; DIVERSIFIER_SIZE]),
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::RemoteAbsent("nk")));
        assert!(!backend.calls().contains(&"incoming_viewing_key"));
    }

    #[test]
    fn zero_transmission_key_fails_validation() {
        let backend = MockBackend::new();
        backend.set_zero_pk_d(true);
        let err = KeyDerivation::new(&backend)
            .generate_address()
            .unwrap_err();
        assert!(matches!(err, WalletError::Validation(_)));
    }

    #[test]
    fn oversized_ivk_fails_validation() {
        let backend = MockBackend::new();
        let mut record = KeyDerivation::new(&backend).generate_address().unwrap();
        let mut ivk = *record.ivk.as_bytes();
        ivk[KEY_SIZE - 1] = 0xff;
        record.ivk = IncomingViewingKey::from_bytes(ivk);
        assert!(matches!(
            record.validate_check(),
            Err(WalletError::Validation(_))
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let sk = SpendingKey::from_bytes([0xab; KEY_SIZE]);
        assert!(!format!("{sk:?}").contains("ab"));
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(
            sk in prop::array::uniform32(1u8..=255u8),
            d in prop::array::uniform11(any::<u8>()),
        ) {
            let backend = MockBackend::new();
            let derivation = KeyDerivation::new(&backend);
            let first = derivation
                .derive_address(SpendingKey::from_bytes(sk), Diversifier::from_bytes(d))
                .unwrap();
            let second = derivation
                .derive_address(SpendingKey::from_bytes(sk), Diversifier::from_bytes(d))
                .unwrap();
            prop_assert_eq!(first.payment_address(), second.payment_address());
            prop_assert_eq!(first, second);
        }
    }
}
