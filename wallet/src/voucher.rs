use tracing::{debug, warn};

use crate::{
    backend::{MerklePath, MerkleVoucher, ShieldedBackend},
    error::WalletError,
    notes::{OutputPoint, TrackedNote},
};

/// Witness material for spending one note, fetched fresh per spend attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendWitness {
    pub voucher: MerkleVoucher,
    pub path: MerklePath,
}

/// Batched merkle witness lookup. A batch is accepted only when the node
/// returns exactly one voucher and one path per requested note.
pub struct VoucherBatchFetcher<'a> {
    backend: &'a dyn ShieldedBackend,
}

impl<'a> VoucherBatchFetcher<'a> {
    pub fn new(backend: &'a dyn ShieldedBackend) -> Self {
        Self { backend }
    }

    /// Returns witnesses in the same order as `notes`.
    pub fn fetch(&self, notes: &[TrackedNote]) -> Result<Vec<SpendWitness>, WalletError> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }
        let points: Vec<OutputPoint> = notes.iter().map(TrackedNote::outpoint).collect();
        let batch = self
            .backend
            .merkle_vouchers(&points)?
            .ok_or(WalletError::RemoteAbsent("merkle voucher batch"))?;

        let requested = points.len();
        for returned in [batch.vouchers.len(), batch.paths.len()] {
            if returned != requested {
                warn!(requested, returned, "voucher batch rejected");
                return Err(WalletError::VoucherCountMismatch {
                    requested,
                    returned,
                });
            }
        }
        debug!(count = requested, "fetched merkle vouchers");

        Ok(batch
            .vouchers
            .into_iter()
            .zip(batch.paths)
            .map(|(voucher, path)| SpendWitness { voucher, path })
            .collect())
    }
}
