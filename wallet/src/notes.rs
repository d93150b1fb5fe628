//! Shielded note records as they travel between the wallet and the node.
//!
//! The wallet never decrypts or commits to notes itself; it only carries the
//! plaintext fields the node hands back from scanning and forwards them into
//! spend and receive descriptions.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::WalletError, serde_hex};

pub const MEMO_SIZE: usize = 512;
pub const RCM_SIZE: usize = 32;

/// Fixed-width memo field. Shorter payloads are zero padded on construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Memo(Vec<u8>);

impl Memo {
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self, WalletError> {
        let mut data = data.into();
        if data.len() > MEMO_SIZE {
            return Err(WalletError::InvalidArgument("memo exceeds 512 bytes"));
        }
        data.resize(MEMO_SIZE, 0);
        Ok(Self(data))
    }

    pub fn from_text(text: &str) -> Result<Self, WalletError> {
        Self::new(text.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Memo contents with the zero padding stripped, rendered as lossy UTF-8.
    pub fn to_text(&self) -> String {
        let end = self
            .0
            .iter()
            .rposition(|byte| *byte != 0)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self(vec![0u8; MEMO_SIZE])
    }
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Memo").field(&self.to_text()).finish()
    }
}

impl Serialize for Memo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_hex::vec::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Memo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = serde_hex::vec::deserialize(deserializer)?;
        Memo::new(bytes).map_err(serde::de::Error::custom)
    }
}

/// Plaintext view of a shielded note.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub payment_address: String,
    pub value: u64,
    #[serde(with = "serde_hex")]
    pub rcm: [u8; RCM_SIZE],
    #[serde(default)]
    pub memo: Memo,
}

/// Location of a note commitment: the transaction that created it and the
/// output position inside that transaction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OutputPoint {
    #[serde(with = "serde_hex")]
    pub hash: [u8; 32],
    pub index: u32,
}

/// A note the wallet believes it can spend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedNote {
    pub note: Note,
    #[serde(with = "serde_hex")]
    pub source_tx_id: [u8; 32],
    pub output_index: u32,
}

impl TrackedNote {
    pub fn outpoint(&self) -> OutputPoint {
        OutputPoint {
            hash: self.source_tx_id,
            index: self.output_index,
        }
    }
}

/// A note the node decrypted for a viewing key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedNote {
    #[serde(with = "serde_hex")]
    pub tx_id: [u8; 32],
    pub index: u32,
    pub note: Note,
}

impl DecryptedNote {
    pub fn into_tracked(self) -> TrackedNote {
        TrackedNote {
            note: self.note,
            source_tx_id: self.tx_id,
            output_index: self.index,
        }
    }
}

/// A decrypted note together with the node's verdict on whether its
/// nullifier has already been published.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkedNote {
    #[serde(flatten)]
    pub decrypted: DecryptedNote,
    pub is_spent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_is_padded_and_rendered_without_padding() {
        let memo = Memo::from_text("hello").unwrap();
        assert_eq!(memo.as_bytes().len(), MEMO_SIZE);
        assert_eq!(memo.to_text(), "hello");
        assert_eq!(Memo::default().to_text(), "");
    }

    #[test]
    fn oversized_memo_rejected() {
        assert!(Memo::new(vec![1u8; MEMO_SIZE + 1]).is_err());
    }

    #[test]
    fn short_wire_memo_is_padded_on_decode() {
        let json = r#"{"paymentAddress":"ztron1x","value":7,"rcm":"0101010101010101010101010101010101010101010101010101010101010101","memo":"6869"}"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert_eq!(note.memo.as_bytes().len(), MEMO_SIZE);
        assert_eq!(note.memo.to_text(), "hi");
        assert_eq!(note.rcm, [1u8; 32]);
    }
}
