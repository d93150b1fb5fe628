use serde::Serialize;
use tracing::{info, warn};

use crate::{
    backend::ShieldedBackend,
    error::WalletError,
    keys::{AddressRecord, IncomingViewingKey, KeyDerivation, OutgoingViewingKey},
    notes::{DecryptedNote, MarkedNote},
};

/// Inclusive-start block height window handed to the node's scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    pub fn new(start: i64, end: i64) -> Result<Self, WalletError> {
        if start < 0 || end < 0 || start > end {
            return Err(WalletError::InvalidRange { start, end });
        }
        Ok(Self {
            start: start as u64,
            end: end as u64,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }
}

/// Result of a scan. A node that answered with nothing, or failed, does not
/// abort the caller; the reason is kept so it can still be reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ScanOutcome<T> {
    Found { notes: Vec<T> },
    Skipped { reason: String },
}

impl<T> ScanOutcome<T> {
    pub fn notes(&self) -> &[T] {
        match self {
            ScanOutcome::Found { notes } => notes,
            ScanOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ScanOutcome::Skipped { .. })
    }

    fn from_remote(what: &'static str, result: Result<Option<Vec<T>>, WalletError>) -> Self {
        match result {
            Ok(Some(notes)) => {
                info!(scan = what, count = notes.len(), "scan finished");
                ScanOutcome::Found { notes }
            }
            Ok(None) => {
                warn!(scan = what, "node returned no scan result");
                ScanOutcome::Skipped {
                    reason: WalletError::RemoteAbsent(what).to_string(),
                }
            }
            Err(err) => {
                warn!(scan = what, error = %err, "scan failed");
                ScanOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Thin wrapper over the node's trial decryption.
///
/// Only the block range is checked locally; a bad range is the one error
/// that is returned rather than folded into [`ScanOutcome::Skipped`].
pub struct NoteScanner<'a> {
    backend: &'a dyn ShieldedBackend,
}

impl<'a> NoteScanner<'a> {
    pub fn new(backend: &'a dyn ShieldedBackend) -> Self {
        Self { backend }
    }

    pub fn scan_by_incoming_key(
        &self,
        ivk: &IncomingViewingKey,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<DecryptedNote>, WalletError> {
        let range = BlockRange::new(start, end)?;
        Ok(ScanOutcome::from_remote(
            "incoming viewing key scan",
            self.backend.scan_notes_by_ivk(ivk, range),
        ))
    }

    /// Scans for notes to `record` and has the node flag the ones whose
    /// nullifiers are already on chain.
    pub fn scan_and_mark(
        &self,
        record: &AddressRecord,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<MarkedNote>, WalletError> {
        let range = BlockRange::new(start, end)?;
        let fvk = match KeyDerivation::new(self.backend).full_viewing_key(&record.sk) {
            Ok(fvk) => fvk,
            Err(err) => {
                warn!(error = %err, "could not derive viewing key for marked scan");
                return Ok(ScanOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
        };
        Ok(ScanOutcome::from_remote(
            "address scan",
            self.backend.scan_and_mark_notes(&record.ivk, &fvk, range),
        ))
    }

    pub fn scan_by_outgoing_key(
        &self,
        ovk: &OutgoingViewingKey,
        start: i64,
        end: i64,
    ) -> Result<ScanOutcome<DecryptedNote>, WalletError> {
        let range = BlockRange::new(start, end)?;
        Ok(ScanOutcome::from_remote(
            "outgoing viewing key scan",
            self.backend.scan_notes_by_ovk(ovk, range),
        ))
    }
}
