use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    backend::{NullifierParams, ShieldedBackend, SubmitOutcome, VoucherBatch},
    config::WalletConfig,
    error::WalletError,
    keys::{
        Diversifier, ExpandedSpendingKey, FullViewingKey, IncomingViewingKey, OutgoingViewingKey,
        SpendAuthorizingKey, SpendingKey, DIVERSIFIER_SIZE, KEY_SIZE,
    },
    notes::{DecryptedNote, MarkedNote, OutputPoint},
    scanner::BlockRange,
    serde_hex,
    tx_builder::TransferRequest,
};

const AUTH_HEADER: &str = "x-auth-token";

/// [`ShieldedBackend`] speaking JSON over HTTP to a full node.
///
/// An empty or field-less response body is reported as an absent value;
/// non-success statuses and transport failures are errors.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    signer: Url,
    token: String,
}

impl HttpBackend {
    pub fn new(config: &WalletConfig) -> Result<Self, WalletError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| WalletError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base: as_directory(config.endpoint.clone()),
            signer: as_directory(config.signer().clone()),
            token: config.auth_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn post_json<B, T>(&self, base: &Url, path: &str, body: &B) -> Result<T, WalletError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = request_url(base, path)?;
        debug!(%url, "node request");
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(body)
            .send()?;
        if !response.status().is_success() {
            return Err(WalletError::Http(format!(
                "request to {path} failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn call<B, T>(&self, path: &str, body: &B) -> Result<T, WalletError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post_json(&self.base, path, body)
    }

    fn headers(&self) -> Result<HeaderMap, WalletError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTH_HEADER,
            HeaderValue::from_str(&self.token).map_err(|err| WalletError::Http(err.to_string()))?,
        );
        Ok(headers)
    }

    fn broadcast(
        &self,
        built: BuiltTransaction,
        spend_auth_sigs: Vec<Vec<u8>>,
    ) -> Result<SubmitOutcome, WalletError> {
        let Some(raw) = built.raw else {
            warn!("node did not build a transaction");
            return Ok(SubmitOutcome {
                accepted: false,
                tx_id: None,
            });
        };
        let reply: BroadcastReply = self.call(
            "wallet/broadcastshieldedtransaction",
            &BroadcastBody {
                raw,
                spend_auth_sigs,
            },
        )?;
        if !reply.result {
            warn!(
                tx_id = built.tx_id.as_deref().unwrap_or("-"),
                message = reply.message.as_deref().unwrap_or(""),
                "broadcast rejected"
            );
        }
        Ok(SubmitOutcome {
            accepted: reply.result,
            tx_id: built.tx_id,
        })
    }
}

/// Request paths are relative, so an endpoint such as `http://node/api`
/// must end in `/` for `api` to survive the join.
fn as_directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn request_url(base: &Url, path: &str) -> Result<Url, WalletError> {
    base.join(path)
        .map_err(|err| WalletError::Http(err.to_string()))
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize, Deserialize)]
struct BytesMessage {
    #[serde(default, with = "serde_hex::option")]
    value: Option<[u8; KEY_SIZE]>,
}

impl BytesMessage {
    fn of(value: &[u8; KEY_SIZE]) -> Self {
        Self {
            value: Some(*value),
        }
    }
}

#[derive(Deserialize)]
struct DiversifierReply {
    #[serde(default, with = "serde_hex::option")]
    d: Option<[u8; DIVERSIFIER_SIZE]>,
}

#[derive(Deserialize)]
struct ExpandedReply {
    #[serde(default, with = "serde_hex::option")]
    ask: Option<[u8; KEY_SIZE]>,
    #[serde(default, with = "serde_hex::option")]
    nsk: Option<[u8; KEY_SIZE]>,
    #[serde(default, with = "serde_hex::option")]
    ovk: Option<[u8; KEY_SIZE]>,
}

#[derive(Deserialize)]
struct IvkReply {
    #[serde(default, with = "serde_hex::option")]
    ivk: Option<[u8; KEY_SIZE]>,
}

#[derive(Serialize)]
struct PaymentAddressBody<'a> {
    d: &'a Diversifier,
    ivk: &'a IncomingViewingKey,
}

#[derive(Deserialize)]
struct PaymentAddressReply {
    #[serde(default, rename = "pkD", with = "serde_hex::option")]
    pk_d: Option<[u8; KEY_SIZE]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputPointsBody<'a> {
    out_points: &'a [OutputPoint],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IvkScanBody<'a> {
    ivk: &'a IncomingViewingKey,
    start_block_index: u64,
    end_block_index: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkScanBody<'a> {
    ivk: &'a IncomingViewingKey,
    #[serde(with = "serde_hex")]
    ak: [u8; KEY_SIZE],
    #[serde(with = "serde_hex")]
    nk: [u8; KEY_SIZE],
    start_block_index: u64,
    end_block_index: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OvkScanBody<'a> {
    ovk: &'a OutgoingViewingKey,
    start_block_index: u64,
    end_block_index: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteTxsReply<T> {
    note_txs: Option<Vec<T>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuiltTransaction {
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    raw: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendAuthSigBody<'a> {
    #[serde(with = "serde_hex")]
    ask: [u8; KEY_SIZE],
    tx_hash: &'a str,
    #[serde(with = "serde_hex")]
    alpha: [u8; KEY_SIZE],
}

#[derive(Deserialize)]
struct SignatureReply {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastBody {
    raw: String,
    #[serde(with = "hex_list")]
    spend_auth_sigs: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
struct BroadcastReply {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    message: Option<String>,
}

mod hex_list {
    use serde::{ser::SerializeSeq, Serializer};

    pub fn serialize<S>(value: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(value.len()))?;
        for item in value {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }
}

impl ShieldedBackend for HttpBackend {
    fn spending_key(&self) -> Result<Option<SpendingKey>, WalletError> {
        let reply: BytesMessage = self.call("wallet/getspendingkey", &Empty {})?;
        Ok(reply.value.map(SpendingKey::from_bytes))
    }

    fn diversifier(&self) -> Result<Option<Diversifier>, WalletError> {
        let reply: DiversifierReply = self.call("wallet/getdiversifier", &Empty {})?;
        Ok(reply.d.map(Diversifier::from_bytes))
    }

    fn expand_spending_key(
        &self,
        sk: &SpendingKey,
    ) -> Result<Option<ExpandedSpendingKey>, WalletError> {
        let reply: ExpandedReply = self.call(
            "wallet/getexpandedspendingkey",
            &BytesMessage::of(sk.as_bytes()),
        )?;
        Ok(match (reply.ask, reply.nsk, reply.ovk) {
            (Some(ask), Some(nsk), Some(ovk)) => Some(ExpandedSpendingKey { ask, nsk, ovk }),
            _ => None,
        })
    }

    fn ak_from_ask(&self, ask: &[u8; KEY_SIZE]) -> Result<Option<[u8; KEY_SIZE]>, WalletError> {
        let reply: BytesMessage = self.call("wallet/getakfromask", &BytesMessage::of(ask))?;
        Ok(reply.value)
    }

    fn nk_from_nsk(&self, nsk: &[u8; KEY_SIZE]) -> Result<Option<[u8; KEY_SIZE]>, WalletError> {
        let reply: BytesMessage = self.call("wallet/getnkfromnsk", &BytesMessage::of(nsk))?;
        Ok(reply.value)
    }

    fn incoming_viewing_key(
        &self,
        fvk: &FullViewingKey,
    ) -> Result<Option<IncomingViewingKey>, WalletError> {
        let reply: IvkReply = self.call("wallet/getincomingviewingkey", fvk)?;
        Ok(reply.ivk.map(IncomingViewingKey::from_bytes))
    }

    fn payment_address(
        &self,
        d: &Diversifier,
        ivk: &IncomingViewingKey,
    ) -> Result<Option<[u8; KEY_SIZE]>, WalletError> {
        let reply: PaymentAddressReply =
            self.call("wallet/getzenpaymentaddress", &PaymentAddressBody { d, ivk })?;
        Ok(reply.pk_d)
    }

    fn rcm(&self) -> Result<Option<[u8; KEY_SIZE]>, WalletError> {
        let reply: BytesMessage = self.call("wallet/getrcm", &Empty {})?;
        Ok(reply.value)
    }

    fn merkle_vouchers(&self, points: &[OutputPoint]) -> Result<Option<VoucherBatch>, WalletError> {
        let value: serde_json::Value = self.call(
            "wallet/getmerkletreevoucherinfo",
            &OutputPointsBody { out_points: points },
        )?;
        if value.as_object().map_or(true, |object| object.is_empty()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    fn scan_notes_by_ivk(
        &self,
        ivk: &IncomingViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<DecryptedNote>>, WalletError> {
        let reply: NoteTxsReply<DecryptedNote> = self.call(
            "wallet/scannotebyivk",
            &IvkScanBody {
                ivk,
                start_block_index: range.start(),
                end_block_index: range.end(),
            },
        )?;
        Ok(reply.note_txs)
    }

    fn scan_and_mark_notes(
        &self,
        ivk: &IncomingViewingKey,
        fvk: &FullViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<MarkedNote>>, WalletError> {
        let reply: NoteTxsReply<MarkedNote> = self.call(
            "wallet/scanandmarknotebyivk",
            &MarkScanBody {
                ivk,
                ak: fvk.ak,
                nk: fvk.nk,
                start_block_index: range.start(),
                end_block_index: range.end(),
            },
        )?;
        Ok(reply.note_txs)
    }

    fn scan_notes_by_ovk(
        &self,
        ovk: &OutgoingViewingKey,
        range: BlockRange,
    ) -> Result<Option<Vec<DecryptedNote>>, WalletError> {
        let reply: NoteTxsReply<DecryptedNote> = self.call(
            "wallet/scannotebyovk",
            &OvkScanBody {
                ovk,
                start_block_index: range.start(),
                end_block_index: range.end(),
            },
        )?;
        Ok(reply.note_txs)
    }

    fn create_nullifier(
        &self,
        params: &NullifierParams,
    ) -> Result<Option<[u8; KEY_SIZE]>, WalletError> {
        let reply: BytesMessage = self.call("wallet/createshieldednullifier", params)?;
        Ok(reply.value)
    }

    fn submit(&self, request: &TransferRequest) -> Result<SubmitOutcome, WalletError> {
        let built: BuiltTransaction = self.call("wallet/createshieldedtransaction", request)?;
        self.broadcast(built, Vec::new())
    }

    fn submit_without_ask(
        &self,
        request: &TransferRequest,
        ask: Option<&SpendAuthorizingKey>,
    ) -> Result<SubmitOutcome, WalletError> {
        let built: BuiltTransaction = self.call(
            "wallet/createshieldedtransactionwithoutspendauthsig",
            request,
        )?;
        if request.spends.is_empty() {
            return self.broadcast(built, Vec::new());
        }
        let ask = ask.ok_or(WalletError::InvalidArgument(
            "spend authority required to sign shielded spends",
        ))?;
        let Some(tx_hash) = built.tx_id.as_deref() else {
            return Err(WalletError::RemoteAbsent("transaction hash"));
        };

        let mut signatures = Vec::with_capacity(request.spends.len());
        for spend in &request.spends {
            let reply: SignatureReply = self.post_json(
                &self.signer,
                "wallet/createspendauthsig",
                &SpendAuthSigBody {
                    ask: *ask.as_bytes(),
                    tx_hash,
                    alpha: spend.alpha,
                },
            )?;
            let signature = reply
                .value
                .ok_or(WalletError::RemoteAbsent("spend authorization signature"))?;
            signatures.push(hex::decode(signature.trim_start_matches("0x"))?);
        }
        debug!(count = signatures.len(), "collected spend authorization signatures");
        self.broadcast(built, signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_path_prefix_is_kept() {
        let config = WalletConfig::new(Url::parse("http://node:8090/api").unwrap())
            .with_signer_endpoint(Url::parse("http://signer:9000/v1/").unwrap());
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.endpoint().as_str(), "http://node:8090/api/");
        assert_eq!(
            request_url(&backend.base, "wallet/getrcm").unwrap().as_str(),
            "http://node:8090/api/wallet/getrcm"
        );
        assert_eq!(
            request_url(&backend.signer, "wallet/createspendauthsig")
                .unwrap()
                .as_str(),
            "http://signer:9000/v1/wallet/createspendauthsig"
        );
    }

    #[test]
    fn bare_origin_endpoint_resolves_from_root() {
        let base = as_directory(Url::parse("http://127.0.0.1:8090").unwrap());
        assert_eq!(
            request_url(&base, "wallet/scannotebyivk").unwrap().as_str(),
            "http://127.0.0.1:8090/wallet/scannotebyivk"
        );
    }

    #[test]
    fn missing_note_list_reads_as_absent() {
        let reply: NoteTxsReply<DecryptedNote> = serde_json::from_str("{}").unwrap();
        assert!(reply.note_txs.is_none());
        let reply: NoteTxsReply<MarkedNote> =
            serde_json::from_str(r#"{"noteTxs": []}"#).unwrap();
        assert_eq!(reply.note_txs.map(|notes| notes.len()), Some(0));
    }
}
