//! Interface to the node that owns the proving system and the curve
//! arithmetic.
//!
//! Every call is a blocking round trip. `Ok(None)` means the node answered but
//! produced no value; `Err` is reserved for transport and decoding failures.

use serde::{Deserialize, Serialize};

use crate::{
    error::WalletError,
    keys::{
        Diversifier, ExpandedSpendingKey, FullViewingKey, IncomingViewingKey, OutgoingViewingKey,
        SpendAuthorizingKey, SpendingKey, KEY_SIZE,
    },
    notes::{DecryptedNote, MarkedNote, Note, OutputPoint},
    scanner::BlockRange,
    serde_hex,
    tx_builder::TransferRequest,
};

/// Incremental merkle witness for one note commitment, opaque to the wallet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleVoucher(#[serde(with = "serde_hex::vec")] pub Vec<u8>);

/// Authentication path matching a [`MerkleVoucher`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerklePath(#[serde(with = "serde_hex::vec")] pub Vec<u8>);

/// Node answer to a batched voucher lookup, positionally aligned with the
/// requested output points.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoucherBatch {
    #[serde(default)]
    pub vouchers: Vec<MerkleVoucher>,
    #[serde(default)]
    pub paths: Vec<MerklePath>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NullifierParams {
    pub note: Note,
    pub voucher: MerkleVoucher,
    #[serde(with = "serde_hex")]
    pub ak: [u8; KEY_SIZE],
    #[serde(with = "serde_hex")]
    pub nk: [u8; KEY_SIZE],
}

/// Result of handing a transfer to the node for signing and broadcast.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

pub trait ShieldedBackend {
    fn spending_key(&self) -> Result<Option<SpendingKey>, WalletError>;

    fn diversifier(&self) -> Result<Option<Diversifier>, WalletError>;

    fn expand_spending_key(
        &self,
        sk: &SpendingKey,
    ) -> Result<Option<ExpandedSpendingKey>, WalletError>;

    fn ak_from_ask(&self, ask: &[u8; KEY_SIZE]) -> Result<Option<[u8; KEY_SIZE]>, WalletError>;

    fn nk_from_nsk(&self, nsk: &[u8; KEY_SIZE]) -> Result<Option<[u8; KEY_SIZE]>, WalletError>;

    fn incoming_viewing_key(
        &self,
        fvk: &FullViewingKey,
    ) -> Result<Option<IncomingViewingKey>, WalletError>;

    /// Returns the diversified transmission key `pkD`.
    fn payment_address(
        &self,
        d: &Diversifier,
        ivk: &IncomingViewingKey,
    ) -> Result<Option<[u8; KEY_SIZE]>, WalletError>;

    /// Fresh random scalar, used for note commitment randomness and for
    /// spend re-randomization.
    fn rcm(&self) -> Result<Option<[u8; KEY_SIZE]>, WalletError>;

    fn merkle_vouchers(&self, points: &[OutputPoint]) -> Result<Option<VoucherBatch>, WalletError>;

    fn scan_notes_by_ivk(
        &self,
        ivk: &IncomingViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<DecryptedNote>>, WalletError>;

    fn scan_and_mark_notes(
        &self,
        ivk: &IncomingViewingKey,
        fvk: &FullViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<MarkedNote>>, WalletError>;

    fn scan_notes_by_ovk(
        &self,
        ovk: &OutgoingViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<DecryptedNote>>, WalletError>;

    fn create_nullifier(
        &self,
        params: &NullifierParams,
    ) -> Result<Option<[u8; KEY_SIZE]>, WalletError>;

    /// Node builds, signs and broadcasts; `request` carries the raw `ask`.
    fn submit(&self, request: &TransferRequest) -> Result<SubmitOutcome, WalletError>;

    /// Node builds without spend authorization; spends are signed with `ask`
    /// on the signer side before broadcast.
    fn submit_without_ask(
        &self,
        request: &TransferRequest,
        ask: Option<&SpendAuthorizingKey>,
    ) -> Result<SubmitOutcome, WalletError>;
}
