use tracing::debug;

use crate::{
    backend::{NullifierParams, ShieldedBackend},
    error::WalletError,
    keys::{KeyDerivation, KEY_SIZE},
    store::ShieldedNoteStore,
    voucher::VoucherBatchFetcher,
};

pub struct NullifierComputer<'a> {
    store: &'a ShieldedNoteStore,
    backend: &'a dyn ShieldedBackend,
}

impl<'a> NullifierComputer<'a> {
    pub fn new(store: &'a ShieldedNoteStore, backend: &'a dyn ShieldedBackend) -> Self {
        Self { store, backend }
    }

    /// Nullifier the tracked note at `index` will publish when spent.
    pub fn nullifier_for(&self, index: u64) -> Result<[u8; KEY_SIZE], WalletError> {
        let tracked = self.store.note(index)?;
        let owner = self.store.address(&tracked.note.payment_address)?;
        let fvk = KeyDerivation::new(self.backend).full_viewing_key(&owner.sk)?;

        let witness = VoucherBatchFetcher::new(self.backend)
            .fetch(std::slice::from_ref(&tracked))?
            .into_iter()
            .next()
            .ok_or(WalletError::RemoteAbsent("merkle voucher"))?;

        let params = NullifierParams {
            note: tracked.note,
            voucher: witness.voucher,
            ak: fvk.ak,
            nk: fvk.nk,
        };
        let nullifier = self
            .backend
            .create_nullifier(&params)?
            .ok_or(WalletError::RemoteAbsent("nullifier"))?;
        debug!(index, nullifier = %hex::encode(nullifier), "computed nullifier");
        Ok(nullifier)
    }
}
