use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shielded_wallet::{
    config::DEFAULT_ENDPOINT,
    keys::{IncomingViewingKey, OutgoingViewingKey},
    tx_builder::{SpendAuthority, TransferParams},
    AddressRecord, Diversifier, HttpBackend, SpendingKey, TrackedNote, WalletConfig,
    WalletSession,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "shielded-walletd",
    about = "Line-oriented JSON daemon for shielded note management and transfers"
)]
struct Cli {
    #[arg(long, env = "SHIELDED_WALLET_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: Url,
    /// Spend authorization signer used when `withholdAsk` is set.
    #[arg(long, env = "SHIELDED_WALLET_SIGNER")]
    signer: Option<Url>,
    #[arg(long, env = "SHIELDED_WALLET_TOKEN", default_value = "")]
    token: String,
    #[arg(long, env = "SHIELDED_WALLET_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

type Session = WalletSession<HttpBackend>;

#[derive(Deserialize)]
struct RequestEnvelope {
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct ResponseEnvelope {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct LoginParams {
    owner: String,
}

#[derive(Deserialize)]
struct ImportParams {
    sk: String,
    d: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    address: String,
    #[serde(flatten)]
    record: AddressRecord,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteEntry {
    index: u64,
    payment_address: String,
    value: u64,
    tx_id: String,
    output_index: u32,
    memo: String,
}

#[derive(Deserialize)]
struct IvkScanParams {
    ivk: String,
    start: i64,
    end: i64,
}

#[derive(Deserialize)]
struct OvkScanParams {
    ovk: String,
    start: i64,
    end: i64,
}

#[derive(Deserialize)]
struct AddressScanParams {
    address: String,
    start: i64,
    end: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendParams {
    #[serde(flatten)]
    transfer: TransferParams,
    #[serde(default)]
    withhold_ask: bool,
}

#[derive(Deserialize)]
struct IndexParams {
    index: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = WalletConfig::new(cli.endpoint)
        .with_auth_token(cli.token)
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(signer) = cli.signer {
        config = config.with_signer_endpoint(signer);
    }
    let backend = HttpBackend::new(&config).context("failed to build node client")?;
    info!(endpoint = %backend.endpoint(), "shielded wallet daemon ready");
    let mut session = WalletSession::new(backend);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RequestEnvelope>(&line) {
            Ok(request) => handle_request(&mut session, request),
            Err(err) => ResponseEnvelope {
                id: Value::Null,
                ok: false,
                result: None,
                error: Some(format!("invalid request: {err}")),
            },
        };

        let payload = serde_json::to_string(&response)?;
        writeln!(stdout, "{payload}")?;
        stdout.flush()?;
    }

    Ok(())
}

fn handle_request(session: &mut Session, request: RequestEnvelope) -> ResponseEnvelope {
    let result = dispatch(session, &request.method, request.params);
    match result {
        Ok(value) => ResponseEnvelope {
            id: request.id,
            ok: true,
            result: Some(value),
            error: None,
        },
        Err(err) => {
            warn!(method = %request.method, error = %err, "request failed");
            ResponseEnvelope {
                id: request.id,
                ok: false,
                result: None,
                error: Some(err.to_string()),
            }
        }
    }
}

fn dispatch(session: &mut Session, method: &str, params: Value) -> Result<Value> {
    match method {
        "session.login" => {
            let params: LoginParams = parse_params(params)?;
            let owner = session.login(&params.owner)?;
            to_value(owner)
        }
        "session.logout" => {
            session.logout();
            Ok(Value::Bool(true))
        }
        "address.new" => {
            let (address, record) = session.new_shielded_address()?;
            to_value(AddressResponse { address, record })
        }
        "address.import" => {
            let params: ImportParams = parse_params(params)?;
            let sk = SpendingKey::from_hex(&params.sk)?;
            let d = Diversifier::from_hex(&params.d)?;
            let (address, record) = session.import_shielded_address(sk, d)?;
            to_value(AddressResponse { address, record })
        }
        "address.list" => to_value(session.shielded_addresses()?),
        "note.insert" => {
            let note: TrackedNote = parse_params(params)?;
            to_value(session.insert_note(note)?)
        }
        "note.list" => {
            let entries: Vec<NoteEntry> = session
                .notes()?
                .into_iter()
                .map(|(index, tracked)| NoteEntry {
                    index,
                    tx_id: hex::encode(tracked.source_tx_id),
                    output_index: tracked.output_index,
                    memo: tracked.note.memo.to_text(),
                    payment_address: tracked.note.payment_address,
                    value: tracked.note.value,
                })
                .collect();
            to_value(entries)
        }
        "note.reset" => {
            session.reset_notes()?;
            Ok(Value::Bool(true))
        }
        "scan.ivk" => {
            let params: IvkScanParams = parse_params(params)?;
            let ivk = IncomingViewingKey::from_hex(&params.ivk)?;
            to_value(session.scan_by_incoming_key(&ivk, params.start, params.end)?)
        }
        "scan.ovk" => {
            let params: OvkScanParams = parse_params(params)?;
            let ovk = OutgoingViewingKey::from_hex(&params.ovk)?;
            to_value(session.scan_by_outgoing_key(&ovk, params.start, params.end)?)
        }
        "scan.address" => {
            let params: AddressScanParams = parse_params(params)?;
            to_value(session.scan_and_mark(&params.address, params.start, params.end)?)
        }
        "tx.send" => {
            let params: SendParams = parse_params(params)?;
            let authority = if params.withhold_ask {
                SpendAuthority::Withheld
            } else {
                SpendAuthority::Included
            };
            to_value(session.send_shielded(&params.transfer, authority)?)
        }
        "nullifier.get" => {
            let params: IndexParams = parse_params(params)?;
            to_value(hex::encode(session.nullifier(params.index)?))
        }
        "rcm.get" => to_value(hex::encode(session.rcm()?)),
        _ => Err(anyhow!("unknown method {method}")),
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|err| anyhow!("invalid params: {err}"))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(anyhow::Error::from)
}
