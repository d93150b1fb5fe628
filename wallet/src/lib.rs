pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod keys;
pub mod notes;
pub mod nullifier;
pub mod rpc;
pub mod scanner;
mod serde_hex;
pub mod session;
pub mod store;
pub mod tx_builder;
pub mod voucher;

pub use address::{PaymentAddress, TransparentAddress};
pub use backend::{ShieldedBackend, SubmitOutcome};
pub use config::WalletConfig;
pub use error::WalletError;
pub use keys::{AddressRecord, Diversifier, KeyDerivation, SpendingKey};
pub use notes::{Memo, Note, TrackedNote};
pub use rpc::HttpBackend;
pub use scanner::{BlockRange, ScanOutcome};
pub use session::WalletSession;
pub use store::{ResetSignal, ShieldedNoteStore};
pub use tx_builder::{SpendAuthority, TransactionAssembler, TransferParams, FALLBACK_OVK};
