use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::{
    error::WalletError,
    keys::AddressRecord,
    notes::{OutputPoint, TrackedNote},
};

/// Shared "drop notes and rescan" flag.
///
/// Raising it never blocks. The next scan that records results takes the
/// flag through [`ShieldedNoteStore::apply_pending_reset`] and starts from an
/// empty note set.
#[derive(Clone, Debug, Default)]
pub struct ResetSignal(Arc<AtomicBool>);

impl ResetSignal {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether the flag was set, clearing it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    notes: BTreeMap<u64, TrackedNote>,
    addresses: HashMap<String, AddressRecord>,
    next_index: u64,
}

/// Registry of spendable notes and known shielded addresses.
///
/// One instance is created per session and handed by reference to the
/// assembler, scanner and nullifier computer. Writers take the lock for the
/// duration of a single mutation.
#[derive(Debug, Default)]
pub struct ShieldedNoteStore {
    state: Mutex<StoreState>,
    reset: ResetSignal,
}

impl ShieldedNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a note and returns its local index. Indices only ever grow.
    pub fn insert_note(&self, note: TrackedNote) -> Result<u64, WalletError> {
        self.with_mut(|state| {
            let index = state.next_index;
            state.next_index += 1;
            state.notes.insert(index, note);
            Ok(index)
        })
    }

    /// Inserts a scanned note unless one with the same output point is
    /// already tracked. Returns the index of the stored note either way.
    pub fn record_discovered(&self, note: TrackedNote) -> Result<u64, WalletError> {
        let point = note.outpoint();
        self.with_mut(|state| {
            if let Some((index, _)) = state
                .notes
                .iter()
                .find(|(_, tracked)| tracked.outpoint() == point)
            {
                return Ok(*index);
            }
            let index = state.next_index;
            state.next_index += 1;
            debug!(
                index,
                tx_id = %hex::encode(point.hash),
                output = point.index,
                value = note.note.value,
                "tracking discovered note"
            );
            state.notes.insert(index, note);
            Ok(index)
        })
    }

    pub fn note(&self, index: u64) -> Result<TrackedNote, WalletError> {
        self.with_state(|state| {
            state
                .notes
                .get(&index)
                .cloned()
                .ok_or(WalletError::UnknownNote(index))
        })
    }

    pub fn notes(&self) -> Result<Vec<(u64, TrackedNote)>, WalletError> {
        self.with_state(|state| {
            Ok(state
                .notes
                .iter()
                .map(|(index, note)| (*index, note.clone()))
                .collect())
        })
    }

    pub fn note_count(&self) -> Result<usize, WalletError> {
        self.with_state(|state| Ok(state.notes.len()))
    }

    pub fn remove_note(&self, index: u64) -> Result<TrackedNote, WalletError> {
        self.with_mut(|state| {
            state
                .notes
                .remove(&index)
                .ok_or(WalletError::UnknownNote(index))
        })
    }

    /// Drops the note at `point` if tracked, returning its former index.
    pub fn remove_by_outpoint(&self, point: &OutputPoint) -> Result<Option<u64>, WalletError> {
        self.with_mut(|state| {
            let index = state
                .notes
                .iter()
                .find(|(_, tracked)| tracked.outpoint() == *point)
                .map(|(index, _)| *index);
            if let Some(index) = index {
                state.notes.remove(&index);
            }
            Ok(index)
        })
    }

    /// Forgets every tracked note. Index assignment continues from where it
    /// left off.
    pub fn clear_notes(&self) -> Result<usize, WalletError> {
        self.with_mut(|state| {
            let dropped = state.notes.len();
            state.notes.clear();
            Ok(dropped)
        })
    }

    /// Registers an address record under its encoded payment address.
    pub fn import_address(&self, record: AddressRecord) -> Result<String, WalletError> {
        record.validate_check()?;
        let encoded = record.encoded_address()?;
        self.with_mut(|state| {
            state.addresses.insert(encoded.clone(), record);
            Ok(())
        })?;
        info!(address = %encoded, "registered shielded address");
        Ok(encoded)
    }

    pub fn address(&self, encoded: &str) -> Result<AddressRecord, WalletError> {
        self.with_state(|state| {
            state
                .addresses
                .get(encoded)
                .cloned()
                .ok_or_else(|| WalletError::UnknownAddress(encoded.to_string()))
        })
    }

    pub fn has_address(&self, encoded: &str) -> Result<bool, WalletError> {
        self.with_state(|state| Ok(state.addresses.contains_key(encoded)))
    }

    pub fn addresses(&self) -> Result<Vec<String>, WalletError> {
        self.with_state(|state| {
            let mut list: Vec<String> = state.addresses.keys().cloned().collect();
            list.sort();
            Ok(list)
        })
    }

    /// Asks for the note set to be rebuilt by the next scan. Returns
    /// immediately.
    pub fn request_reset(&self) {
        self.reset.raise();
        info!("note reset requested");
    }

    /// Clears the tracked notes if a reset was requested since the last call.
    pub fn apply_pending_reset(&self) -> Result<bool, WalletError> {
        if !self.reset.take() {
            return Ok(false);
        }
        let dropped = self.clear_notes()?;
        info!(dropped, "note reset applied");
        Ok(true)
    }

    pub fn reset_signal(&self) -> ResetSignal {
        self.reset.clone()
    }

    fn with_state<F, T>(&self, func: F) -> Result<T, WalletError>
    where
        F: FnOnce(&StoreState) -> Result<T, WalletError>,
    {
        let state = self
            .state
            .lock()
            .map_err(|_| WalletError::InvalidState("note store poisoned"))?;
        func(&state)
    }

    fn with_mut<F, T>(&self, func: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut StoreState) -> Result<T, WalletError>,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WalletError::InvalidState("note store poisoned"))?;
        func(&mut state)
    }
}
