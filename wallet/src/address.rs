use std::fmt;

use bech32::{self, FromBase32, ToBase32, Variant};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{
    error::WalletError,
    keys::{Diversifier, DIVERSIFIER_SIZE, KEY_SIZE},
};

const PAYMENT_ADDRESS_HRP: &str = "ztron";
const PAYMENT_ADDRESS_LEN: usize = DIVERSIFIER_SIZE + KEY_SIZE;

pub const TRANSPARENT_ADDRESS_LEN: usize = 21;
const TRANSPARENT_ADDRESS_PREFIX: u8 = 0x41;
const CHECKSUM_LEN: usize = 4;

/// Shielded receiving address: diversifier plus diversified transmission key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentAddress {
    pub d: Diversifier,
    pub pk_d: [u8; KEY_SIZE],
}

impl PaymentAddress {
    pub fn encode(&self) -> Result<String, WalletError> {
        bech32::encode(PAYMENT_ADDRESS_HRP, self.to_bytes().to_base32(), Variant::Bech32)
            .map_err(|err| WalletError::AddressDecode(err.to_string()))
    }

    pub fn decode(address: &str) -> Result<Self, WalletError> {
        let (hrp, data, variant) =
            bech32::decode(address).map_err(|err| WalletError::AddressDecode(err.to_string()))?;
        if hrp != PAYMENT_ADDRESS_HRP {
            return Err(WalletError::AddressDecode(format!(
                "invalid HRP: expected {PAYMENT_ADDRESS_HRP}, got {hrp}"
            )));
        }
        if variant != Variant::Bech32 {
            return Err(WalletError::AddressDecode("unsupported variant".into()));
        }
        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|err| WalletError::AddressDecode(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYMENT_ADDRESS_LEN);
        out.extend_from_slice(self.d.as_bytes());
        out.extend_from_slice(&self.pk_d);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != PAYMENT_ADDRESS_LEN {
            return Err(WalletError::AddressDecode(
                "invalid payment address length".into(),
            ));
        }
        let mut d = [0u8; DIVERSIFIER_SIZE];
        d.copy_from_slice(&bytes[..DIVERSIFIER_SIZE]);
        let mut pk_d = [0u8; KEY_SIZE];
        pk_d.copy_from_slice(&bytes[DIVERSIFIER_SIZE..]);
        Ok(Self {
            d: Diversifier::from_bytes(d),
            pk_d,
        })
    }
}

/// Account address on the transparent side of the ledger.
///
/// Text form is base58 with a 4-byte double SHA-256 checksum; the payload is
/// 21 bytes starting with the network prefix `0x41`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransparentAddress([u8; TRANSPARENT_ADDRESS_LEN]);

impl TransparentAddress {
    pub fn from_bytes(bytes: [u8; TRANSPARENT_ADDRESS_LEN]) -> Result<Self, WalletError> {
        if bytes[0] != TRANSPARENT_ADDRESS_PREFIX {
            return Err(WalletError::AddressDecode(format!(
                "invalid address prefix {:#04x}",
                bytes[0]
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TRANSPARENT_ADDRESS_LEN] {
        &self.0
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(TRANSPARENT_ADDRESS_LEN + CHECKSUM_LEN);
        payload.extend_from_slice(&self.0);
        payload.extend_from_slice(&checksum(&self.0));
        bs58::encode(payload).into_string()
    }

    pub fn decode(address: &str) -> Result<Self, WalletError> {
        let raw = bs58::decode(address)
            .into_vec()
            .map_err(|err| WalletError::AddressDecode(err.to_string()))?;
        if raw.len() <= CHECKSUM_LEN {
            return Err(WalletError::AddressDecode("address too short".into()));
        }
        let (payload, check) = raw.split_at(raw.len() - CHECKSUM_LEN);
        if checksum(payload).as_slice() != check {
            return Err(WalletError::AddressDecode("checksum mismatch".into()));
        }
        let bytes = <[u8; TRANSPARENT_ADDRESS_LEN]>::try_from(payload).map_err(|_| {
            WalletError::AddressDecode(format!("invalid address length {}", payload.len()))
        })?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for TransparentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for TransparentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransparentAddress")
            .field(&self.encode())
            .finish()
    }
}

impl Serialize for TransparentAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for TransparentAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&second[..CHECKSUM_LEN]);
    out
}
