use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::{
    address::TransparentAddress,
    backend::{MerklePath, MerkleVoucher, ShieldedBackend, SubmitOutcome},
    error::WalletError,
    keys::{KeyDerivation, OutgoingViewingKey, SpendAuthorizingKey, KEY_SIZE},
    notes::{Note, TrackedNote},
    serde_hex,
    store::ShieldedNoteStore,
    voucher::VoucherBatchFetcher,
};

/// Outgoing viewing key used when a transfer has no shielded inputs, so no
/// owning address exists to source one from. Publicly known: anyone holding
/// it can decrypt the outputs of such transfers, which lets auditors follow
/// value entering the shielded pool.
pub const FALLBACK_OVK_V1: OutgoingViewingKey = OutgoingViewingKey::from_bytes([
    0x03, 0x0c, 0x8c, 0x2b, 0xc5, 0x9f, 0xb3, 0xeb, //
    0x8a, 0xfb, 0x04, 0x7a, 0x8e, 0xa4, 0xb0, 0x28, //
    0x74, 0x3d, 0x23, 0xe7, 0xd3, 0x8c, 0x6f, 0xa3, //
    0x09, 0x08, 0x35, 0x84, 0x31, 0xe2, 0x31, 0x4d,
]);

pub const FALLBACK_OVK: OutgoingViewingKey = FALLBACK_OVK_V1;

/// Where the spend-authorizing scalar goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendAuthority {
    /// `ask` travels inside the request and the node signs.
    Included,
    /// The request carries `ak`; `ask` is handed back for signing elsewhere.
    Withheld,
}

/// Caller-facing description of a transfer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferParams {
    pub transparent_from: Option<String>,
    pub from_amount: u64,
    pub transparent_to: Option<String>,
    pub to_amount: u64,
    pub shielded_inputs: Vec<u64>,
    pub shielded_outputs: Vec<Note>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpendDescription {
    pub note: Note,
    #[serde(with = "serde_hex")]
    pub alpha: [u8; KEY_SIZE],
    pub voucher: MerkleVoucher,
    pub path: MerklePath,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiveDescription {
    pub note: Note,
}

/// Parameter bundle handed to the node for proving, signing and broadcast.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_from: Option<TransparentAddress>,
    pub from_amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_to: Option<TransparentAddress>,
    pub to_amount: u64,
    #[serde(
        default,
        with = "serde_hex::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ask: Option<[u8; KEY_SIZE]>,
    #[serde(
        default,
        with = "serde_hex::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ak: Option<[u8; KEY_SIZE]>,
    #[serde(
        default,
        with = "serde_hex::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nsk: Option<[u8; KEY_SIZE]>,
    pub ovk: OutgoingViewingKey,
    pub spends: Vec<SpendDescription>,
    pub receives: Vec<ReceiveDescription>,
}

impl Drop for TransferRequest {
    fn drop(&mut self) {
        self.ask.zeroize();
        self.nsk.zeroize();
    }
}

/// An assembled request plus, for the withheld variant, the scalar needed
/// to sign its spends.
#[derive(Debug)]
pub struct AssembledTransfer {
    pub request: TransferRequest,
    pub withheld_ask: Option<SpendAuthorizingKey>,
}

pub struct TransactionAssembler<'a> {
    store: &'a ShieldedNoteStore,
    backend: &'a dyn ShieldedBackend,
}

impl<'a> TransactionAssembler<'a> {
    pub fn new(store: &'a ShieldedNoteStore, backend: &'a dyn ShieldedBackend) -> Self {
        Self { store, backend }
    }

    /// Builds the transfer without touching the store. Any failure aborts
    /// before a partial request is returned.
    pub fn assemble(
        &self,
        params: &TransferParams,
        authority: SpendAuthority,
    ) -> Result<AssembledTransfer, WalletError> {
        let transparent_from = decode_transparent(params.transparent_from.as_deref())?;
        let transparent_to = decode_transparent(params.transparent_to.as_deref())?;

        let mut request = TransferRequest {
            from_amount: if transparent_from.is_some() {
                params.from_amount
            } else {
                0
            },
            transparent_from,
            to_amount: if transparent_to.is_some() {
                params.to_amount
            } else {
                0
            },
            transparent_to,
            ask: None,
            ak: None,
            nsk: None,
            ovk: FALLBACK_OVK,
            spends: Vec::with_capacity(params.shielded_inputs.len()),
            receives: Vec::with_capacity(params.shielded_outputs.len()),
        };
        let mut withheld_ask = None;

        if !params.shielded_inputs.is_empty() {
            let inputs = self.lookup_inputs(&params.shielded_inputs)?;
            let witnesses = VoucherBatchFetcher::new(self.backend).fetch(&inputs)?;

            let owner_address = inputs[0].note.payment_address.clone();
            let owner = self.store.address(&owner_address)?;
            let derivation = KeyDerivation::new(self.backend);
            let expanded = derivation.expand(&owner.sk)?;
            match authority {
                SpendAuthority::Included => request.ask = Some(expanded.ask),
                SpendAuthority::Withheld => {
                    request.ak = Some(derivation.ak_from_ask(&expanded.ask)?);
                    withheld_ask = Some(SpendAuthorizingKey::from_bytes(expanded.ask));
                }
            }
            request.nsk = Some(expanded.nsk);
            request.ovk = OutgoingViewingKey::from_bytes(expanded.ovk);

            for (input, witness) in inputs.into_iter().zip(witnesses) {
                if input.note.payment_address != owner_address {
                    debug!(
                        owner = %owner_address,
                        input = %input.note.payment_address,
                        "spend input belongs to a different address than the first input"
                    );
                }
                let alpha = self
                    .backend
                    .rcm()?
                    .ok_or(WalletError::RemoteAbsent("spend randomizer"))?;
                debug!(
                    tx_id = %hex::encode(input.source_tx_id),
                    index = input.output_index,
                    value = input.note.value,
                    "adding shielded spend"
                );
                request.spends.push(SpendDescription {
                    note: input.note,
                    alpha,
                    voucher: witness.voucher,
                    path: witness.path,
                });
            }
        }

        request.receives.extend(
            params
                .shielded_outputs
                .iter()
                .cloned()
                .map(|note| ReceiveDescription { note }),
        );

        Ok(AssembledTransfer {
            request,
            withheld_ask,
        })
    }

    /// Assembles and submits, returning the node's verdict unchanged.
    pub fn send(
        &self,
        params: &TransferParams,
        authority: SpendAuthority,
    ) -> Result<SubmitOutcome, WalletError> {
        let assembled = self.assemble(params, authority)?;
        let outcome = match authority {
            SpendAuthority::Included => self.backend.submit(&assembled.request)?,
            SpendAuthority::Withheld => self
                .backend
                .submit_without_ask(&assembled.request, assembled.withheld_ask.as_ref())?,
        };
        info!(
            accepted = outcome.accepted,
            tx_id = outcome.tx_id.as_deref().unwrap_or("-"),
            spends = assembled.request.spends.len(),
            receives = assembled.request.receives.len(),
            "shielded transfer submitted"
        );
        Ok(outcome)
    }

    fn lookup_inputs(&self, indices: &[u64]) -> Result<Vec<TrackedNote>, WalletError> {
        let mut seen = HashSet::with_capacity(indices.len());
        let mut inputs = Vec::with_capacity(indices.len());
        for index in indices {
            if !seen.insert(*index) {
                return Err(WalletError::InvalidArgument("duplicate shielded input"));
            }
            inputs.push(self.store.note(*index)?);
        }
        Ok(inputs)
    }
}

fn decode_transparent(address: Option<&str>) -> Result<Option<TransparentAddress>, WalletError> {
    match address {
        None | Some("") => Ok(None),
        Some(text) => TransparentAddress::decode(text).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::TRANSPARENT_ADDRESS_LEN;
    use crate::backend::testing::MockBackend;
    use crate::keys::AddressRecord;
    use crate::notes::Memo;

    fn setup(backend: &MockBackend, notes: usize) -> (ShieldedNoteStore, AddressRecord, Vec<u64>) {
        let store = ShieldedNoteStore::new();
        let record = KeyDerivation::new(backend).generate_address().unwrap();
        let encoded = store.import_address(record.clone()).unwrap();
        let indices = (0..notes)
            .map(|i| {
                store
                    .insert_note(TrackedNote {
                        note: Note {
                            payment_address: encoded.clone(),
                            value: 10 + i as u64,
                            rcm: [i as u8; 32],
                            memo: Memo::default(),
                        },
                        source_tx_id: [(i % 251) as u8; 32],
                        output_index: i as u32,
                    })
                    .unwrap()
            })
            .collect();
        backend.clear_calls();
        (store, record, indices)
    }

    fn transparent(fill: u8) -> String {
        let mut bytes = [fill; TRANSPARENT_ADDRESS_LEN];
        bytes[0] = 0x41;
        TransparentAddress::from_bytes(bytes).unwrap().encode()
    }

    fn output_note() -> Note {
        Note {
            payment_address: "ztron1recipient".into(),
            value: 3,
            rcm: [8u8; 32],
            memo: Memo::from_text("thanks").unwrap(),
        }
    }

    #[test]
    fn zero_inputs_use_fallback_ovk() {
        let backend = MockBackend::new();
        let store = ShieldedNoteStore::new();
        let assembler = TransactionAssembler::new(&store, &backend);
        for amount in [0u64, 1, 1_000_000] {
            let params = TransferParams {
                transparent_from: Some(transparent(1)),
                from_amount: amount,
                shielded_outputs: vec![output_note()],
                ..TransferParams::default()
            };
            for authority in [SpendAuthority::Included, SpendAuthority::Withheld] {
                let assembled = assembler.assemble(&params, authority).unwrap();
                assert_eq!(assembled.request.ovk, FALLBACK_OVK);
                assert_eq!(assembled.request.from_amount, amount);
                assert!(assembled.request.ask.is_none());
                assert!(assembled.request.ak.is_none());
                assert!(assembled.withheld_ask.is_none());
                assert_eq!(assembled.request.receives.len(), 1);
                assert_eq!(assembled.request.receives[0].note, output_note());
            }
        }
        assert!(backend.voucher_requests().is_empty());
    }

    #[test]
    fn fallback_ovk_matches_published_value() {
        assert_eq!(
            hex::encode(FALLBACK_OVK.as_bytes()),
            "030c8c2bc59fb3eb8afb047a8ea4b028743d23e7d38c6fa30908358431e2314d"
        );
    }

    #[test]
    fn invalid_transparent_address_is_a_decode_error() {
        let backend = MockBackend::new();
        let store = ShieldedNoteStore::new();
        let params = TransferParams {
            transparent_from: Some("invalid".into()),
            from_amount: 5,
            ..TransferParams::default()
        };
        let err = TransactionAssembler::new(&store, &backend)
            .assemble(&params, SpendAuthority::Included)
            .unwrap_err();
        assert!(matches!(err, WalletError::AddressDecode(_)));

        let params = TransferParams {
            transparent_to: Some("invalid".into()),
            ..TransferParams::default()
        };
        assert!(matches!(
            TransactionAssembler::new(&store, &backend).send(&params, SpendAuthority::Withheld),
            Err(WalletError::AddressDecode(_))
        ));
        assert!(backend.submissions().is_empty());
    }

    #[test]
    fn empty_transparent_address_counts_as_absent() {
        let backend = MockBackend::new();
        let store = ShieldedNoteStore::new();
        let params = TransferParams {
            transparent_from: Some(String::new()),
            from_amount: 9,
            ..TransferParams::default()
        };
        let assembled = TransactionAssembler::new(&store, &backend)
            .assemble(&params, SpendAuthority::Included)
            .unwrap();
        assert!(assembled.request.transparent_from.is_none());
        assert_eq!(assembled.request.from_amount, 0);
    }

    #[test]
    fn alphas_are_distinct_across_a_large_batch() {
        let backend = MockBackend::new();
        let (store, _, indices) = setup(&backend, 256);
        let params = TransferParams {
            shielded_inputs: indices,
            ..TransferParams::default()
        };
        let assembled = TransactionAssembler::new(&store, &backend)
            .assemble(&params, SpendAuthority::Included)
            .unwrap();
        let alphas: HashSet<[u8; KEY_SIZE]> =
            assembled.request.spends.iter().map(|spend| spend.alpha).collect();
        assert_eq!(assembled.request.spends.len(), 256);
        assert_eq!(alphas.len(), 256);
        assert_eq!(backend.voucher_requests().len(), 1);
    }

    #[test]
    fn included_authority_embeds_ask() {
        let backend = MockBackend::new();
        let (store, record, indices) = setup(&backend, 2);
        let params = TransferParams {
            shielded_inputs: indices,
            shielded_outputs: vec![output_note()],
            ..TransferParams::default()
        };
        let assembled = TransactionAssembler::new(&store, &backend)
            .assemble(&params, SpendAuthority::Included)
            .unwrap();
        let expanded = MockBackend::expanded(&record.sk);
        assert_eq!(assembled.request.ask, Some(expanded.ask));
        assert_eq!(assembled.request.nsk, Some(expanded.nsk));
        assert!(assembled.request.ak.is_none());
        assert_eq!(assembled.request.ovk, record.ovk);
        assert!(assembled.withheld_ask.is_none());
    }

    #[test]
    fn withheld_authority_keeps_ask_out_of_request() {
        let backend = MockBackend::new();
        let (store, record, indices) = setup(&backend, 3);
        let params = TransferParams {
            shielded_inputs: indices,
            ..TransferParams::default()
        };
        let assembled = TransactionAssembler::new(&store, &backend)
            .assemble(&params, SpendAuthority::Withheld)
            .unwrap();
        let expanded = MockBackend::expanded(&record.sk);

        assert!(assembled.request.ask.is_none());
        assert_eq!(assembled.request.ak, Some(MockBackend::ak_for(&expanded.ask)));
        assert_eq!(
            assembled.withheld_ask.as_ref().map(|ask| *ask.as_bytes()),
            Some(expanded.ask)
        );
        let wire = serde_json::to_string(&assembled.request).unwrap();
        assert!(!wire.contains(&hex::encode(expanded.ask)));
        assert!(!wire.contains("\"ask\""));
    }

    #[test]
    fn voucher_shortfall_aborts_and_leaves_store_unchanged() {
        let backend = MockBackend::new();
        let (store, _, indices) = setup(&backend, 3);
        let before = store.notes().unwrap();
        backend.set_voucher_shortfall(1);
        let params = TransferParams {
            shielded_inputs: indices,
            ..TransferParams::default()
        };
        let err = TransactionAssembler::new(&store, &backend)
            .send(&params, SpendAuthority::Included)
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::VoucherCountMismatch {
                requested: 3,
                returned: 2
            }
        ));
        assert_eq!(store.notes().unwrap(), before);
        assert!(!backend.calls().contains(&"rcm"));
        assert!(backend.submissions().is_empty());
    }

    #[test]
    fn unknown_input_index_is_fatal() {
        let backend = MockBackend::new();
        let (store, _, _) = setup(&backend, 1);
        let params = TransferParams {
            shielded_inputs: vec![0, 42],
            ..TransferParams::default()
        };
        assert!(matches!(
            TransactionAssembler::new(&store, &backend).assemble(&params, SpendAuthority::Included),
            Err(WalletError::UnknownNote(42))
        ));
        assert!(backend.voucher_requests().is_empty());
    }

    #[test]
    fn duplicate_input_index_is_rejected() {
        let backend = MockBackend::new();
        let (store, _, _) = setup(&backend, 1);
        let params = TransferParams {
            shielded_inputs: vec![0, 0],
            ..TransferParams::default()
        };
        assert!(matches!(
            TransactionAssembler::new(&store, &backend).assemble(&params, SpendAuthority::Included),
            Err(WalletError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_owner_record_is_a_lookup_error() {
        let backend = MockBackend::new();
        let store = ShieldedNoteStore::new();
        let index = store
            .insert_note(TrackedNote {
                note: output_note(),
                source_tx_id: [1u8; 32],
                output_index: 0,
            })
            .unwrap();
        let params = TransferParams {
            shielded_inputs: vec![index],
            ..TransferParams::default()
        };
        assert!(matches!(
            TransactionAssembler::new(&store, &backend).assemble(&params, SpendAuthority::Included),
            Err(WalletError::UnknownAddress(_))
        ));
    }

    #[test]
    fn send_routes_to_variant_endpoint() {
        let backend = MockBackend::new();
        let (store, record, indices) = setup(&backend, 1);
        let assembler = TransactionAssembler::new(&store, &backend);
        let params = TransferParams {
            shielded_inputs: indices,
            transparent_to: Some(transparent(2)),
            to_amount: 4,
            ..TransferParams::default()
        };

        let included = assembler.send(&params, SpendAuthority::Included).unwrap();
        let withheld = assembler.send(&params, SpendAuthority::Withheld).unwrap();
        assert!(included.accepted && withheld.accepted);
        assert_ne!(included.tx_id, withheld.tx_id);

        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions[0].0.ask.is_some());
        assert_eq!(submissions[0].1, None);
        assert!(submissions[1].0.ask.is_none());
        assert_eq!(
            submissions[1].1,
            Some(MockBackend::expanded(&record.sk).ask)
        );
        assert_eq!(submissions[1].0.to_amount, 4);
    }
}
