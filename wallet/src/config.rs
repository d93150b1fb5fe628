use std::time::Duration;

use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8090";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the node backing the wallet.
#[derive(Clone, Debug)]
pub struct WalletConfig {
    pub endpoint: Url,
    /// Service that signs spends when spend authority is withheld from the
    /// node. Defaults to `endpoint`.
    pub signer_endpoint: Option<Url>,
    pub auth_token: String,
    pub timeout: Duration,
}

impl WalletConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            signer_endpoint: None,
            auth_token: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_signer_endpoint(mut self, signer: Url) -> Self {
        self.signer_endpoint = Some(signer);
        self
    }

    pub fn signer(&self) -> &Url {
        self.signer_endpoint.as_ref().unwrap_or(&self.endpoint)
    }
}
