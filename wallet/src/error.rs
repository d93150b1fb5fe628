use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no active session, login first")]
    NoSession,

    #[error("invalid address encoding: {0}")]
    AddressDecode(String),

    #[error("unknown shielded note index {0}")]
    UnknownNote(u64),

    #[error("shielded address not found locally: {0}")]
    UnknownAddress(String),

    #[error("remote service returned no result for {0}")]
    RemoteAbsent(&'static str),

    #[error("merkle voucher batch incomplete (requested {requested}, returned {returned})")]
    VoucherCountMismatch { requested: usize, returned: usize },

    #[error("address record failed validation: {0}")]
    Validation(&'static str),

    #[error("invalid block range: start {start}, end {end}")]
    InvalidRange { start: i64, end: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid wallet state: {0}")]
    InvalidState(&'static str),
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Serialization(err.to_string())
    }
}
