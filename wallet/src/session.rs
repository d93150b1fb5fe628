//! Login lifecycle and the session-gated wallet operations.
//!
//! A [`WalletSession`] owns the backend handle and the note store. Every
//! shielded operation checks for an active session first and fails with
//! [`WalletError::NoSession`] otherwise.

use tracing::{info, warn};

use crate::{
    address::TransparentAddress,
    backend::{ShieldedBackend, SubmitOutcome},
    error::WalletError,
    keys::{
        AddressRecord, Diversifier, IncomingViewingKey, KeyDerivation, OutgoingViewingKey,
        SpendingKey, KEY_SIZE,
    },
    notes::{DecryptedNote, MarkedNote, TrackedNote},
    nullifier::NullifierComputer,
    scanner::{NoteScanner, ScanOutcome},
    store::ShieldedNoteStore,
    tx_builder::{SpendAuthority, TransactionAssembler, TransferParams},
};

pub struct WalletSession<B: ShieldedBackend> {
    backend: B,
    store: ShieldedNoteStore,
    owner: Option<TransparentAddress>,
}

impl<B: ShieldedBackend> WalletSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            store: ShieldedNoteStore::new(),
            owner: None,
        }
    }

    /// Starts a session for `owner`, replacing any active one.
    pub fn login(&mut self, owner: &str) -> Result<TransparentAddress, WalletError> {
        self.logout();
        let address = TransparentAddress::decode(owner)?;
        self.owner = Some(address);
        info!(owner = %address, "session started");
        Ok(address)
    }

    pub fn logout(&mut self) {
        if let Some(owner) = self.owner.take() {
            info!(owner = %owner, "session closed");
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<&TransparentAddress> {
        self.owner.as_ref()
    }

    pub fn store(&self) -> &ShieldedNoteStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn require_session(&self) -> Result<(), WalletError> {
        if self.owner.is_none() {
            return Err(WalletError::NoSession);
        }
        Ok(())
    }

    /// Generates a fresh shielded address and registers it.
    pub fn new_shielded_address(&self) -> Result<(String, AddressRecord), WalletError> {
        self.require_session()?;
        let record = KeyDerivation::new(&self.backend).generate_address()?;
        let encoded = self.store.import_address(record.clone())?;
        Ok((encoded, record))
    }

    /// Re-derives and registers the address for a known key and diversifier.
    pub fn import_shielded_address(
        &self,
        sk: SpendingKey,
        d: Diversifier,
    ) -> Result<(String, AddressRecord), WalletError> {
        self.require_session()?;
        let record = KeyDerivation::new(&self.backend).derive_address(sk, d)?;
        let encoded = self.store.import_address(record.clone())?;
        Ok((encoded, record))
    }

    pub fn shielded_addresses(&self) -> Result<Vec<String>, WalletError> {
        self.require_session()?;
        self.store.addresses()
    }

    pub fn insert_note(&self, note: TrackedNote) -> Result<u64, WalletError> {
        self.require_session()?;
        self.store.insert_note(note)
    }

    pub fn notes(&self) -> Result<Vec<(u64, TrackedNote)>, WalletError> {
        self.require_session()?;
        self.store.notes()
    }

    pub fn reset_notes(&self) -> Result<(), WalletError> {
        self.require_session()?;
        self.store.request_reset();
        Ok(())
    }

    /// Scans by incoming viewing key. Notes addressed to a locally known
    /// address are added to the store, after any pending reset is applied.
    pub fn scan_by_incoming_key(
        &self,
        ivk: &IncomingViewingKey,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<DecryptedNote>, WalletError> {
        self.require_session()?;
        let outcome = NoteScanner::new(&self.backend).scan_by_incoming_key(ivk, start, end)?;
        self.store.apply_pending_reset()?;
        for found in outcome.notes() {
            self.track_if_owned(found.clone())?;
        }
        Ok(outcome)
    }

    pub fn scan_by_outgoing_key(
        &self,
        ovk: &OutgoingViewingKey,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<DecryptedNote>, WalletError> {
        self.require_session()?;
        NoteScanner::new(&self.backend).scan_by_outgoing_key(ovk, start, end)
    }

    /// Scans for notes to a registered address. Unspent notes are tracked,
    /// spent ones are dropped from the store.
    pub fn scan_and_mark(
        &self,
        address: &str,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<MarkedNote>, WalletError> {
        self.require_session()?;
        let record = self.store.address(address)?;
        let outcome = NoteScanner::new(&self.backend).scan_and_mark(&record, start, end)?;
        self.store.apply_pending_reset()?;
        for marked in outcome.notes() {
            let tracked = marked.decrypted.clone().into_tracked();
            if marked.is_spent {
                if let Some(index) = self.store.remove_by_outpoint(&tracked.outpoint())? {
                    info!(index, "dropped spent note");
                }
            } else {
                self.store.record_discovered(tracked)?;
            }
        }
        Ok(outcome)
    }

    pub fn send_shielded(
        &self,
        params: &TransferParams,
        authority: SpendAuthority,
    ) -> Result<SubmitOutcome, WalletError> {
        self.require_session()?;
        TransactionAssembler::new(&self.store, &self.backend).send(params, authority)
    }

    pub fn nullifier(&self, index: u64) -> Result<[u8; KEY_SIZE], WalletError> {
        self.require_session()?;
        NullifierComputer::new(&self.store, &self.backend).nullifier_for(index)
    }

    pub fn rcm(&self) -> Result<[u8; KEY_SIZE], WalletError> {
        self.require_session()?;
        self.backend
            .rcm()?
            .ok_or(WalletError::RemoteAbsent("rcm"))
    }

    fn track_if_owned(&self, found: DecryptedNote) -> Result<(), WalletError> {
        let address = found.note.payment_address.clone();
        if self.store.has_address(&address)? {
            self.store.record_discovered(found.into_tracked())?;
        } else {
            warn!(address = %address, "scanned note for an address this wallet does not hold");
        }
        Ok(())
    }
}
