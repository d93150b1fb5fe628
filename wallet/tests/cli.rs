use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{json, Value};
use shielded_wallet::{address::TRANSPARENT_ADDRESS_LEN, TransparentAddress};

// Points at a port nothing listens on; every request below is answered
// without reaching the node.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn owner() -> String {
    let mut bytes = [0x33u8; TRANSPARENT_ADDRESS_LEN];
    bytes[0] = 0x41;
    TransparentAddress::from_bytes(bytes).unwrap().encode()
}

fn run(requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|request| format!("{request}\n"))
        .collect();
    let output = cargo_bin_cmd!("shielded-walletd")
        .args(["--endpoint", UNREACHABLE, "--timeout-secs", "1"])
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json response"))
        .collect()
}

#[test]
fn shielded_operations_require_login() {
    let responses = run(&[
        json!({"id": 1, "method": "address.new"}),
        json!({"id": 2, "method": "note.reset"}),
        json!({"id": 3, "method": "nullifier.get", "params": {"index": 0}}),
    ]);
    assert_eq!(responses.len(), 3);
    for response in &responses {
        assert_eq!(response["ok"], json!(false));
        assert!(response["error"]
            .as_str()
            .unwrap()
            .contains("no active session"));
    }
}

#[test]
fn login_then_local_operations() {
    let responses = run(&[
        json!({"id": "a", "method": "session.login", "params": {"owner": owner()}}),
        json!({"id": "b", "method": "note.reset"}),
        json!({"id": "c", "method": "note.list"}),
        json!({"id": "d", "method": "address.list"}),
        json!({"id": "e", "method": "session.logout"}),
        json!({"id": "f", "method": "note.list"}),
    ]);
    assert_eq!(responses[0]["ok"], json!(true));
    assert_eq!(responses[0]["result"], json!(owner()));
    assert_eq!(responses[1]["result"], json!(true));
    assert_eq!(responses[2]["result"], json!([]));
    assert_eq!(responses[3]["result"], json!([]));
    assert_eq!(responses[4]["ok"], json!(true));
    assert_eq!(responses[5]["ok"], json!(false));
}

#[test]
fn inserted_notes_are_listed_with_rendered_memo() {
    let responses = run(&[
        json!({"id": 1, "method": "session.login", "params": {"owner": owner()}}),
        json!({"id": 2, "method": "note.insert", "params": {
            "note": {
                "paymentAddress": "ztron1example",
                "value": 12,
                "rcm": hex::encode([1u8; 32]),
                "memo": hex::encode(b"rent"),
            },
            "sourceTxId": hex::encode([2u8; 32]),
            "outputIndex": 1,
        }}),
        json!({"id": 3, "method": "note.list"}),
    ]);
    assert_eq!(responses[1]["result"], json!(0));
    let notes = responses[2]["result"].as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["memo"], json!("rent"));
    assert_eq!(notes[0]["value"], json!(12));
    assert_eq!(notes[0]["outputIndex"], json!(1));
}

#[test]
fn invalid_transparent_source_is_rejected() {
    let responses = run(&[
        json!({"id": 1, "method": "session.login", "params": {"owner": owner()}}),
        json!({"id": 2, "method": "tx.send", "params": {
            "transparentFrom": "invalid",
            "fromAmount": 10,
            "withholdAsk": true,
        }}),
    ]);
    assert_eq!(responses[1]["ok"], json!(false));
    assert!(responses[1]["error"]
        .as_str()
        .unwrap()
        .contains("invalid address encoding"));
}

#[test]
fn reversed_scan_range_is_rejected() {
    let responses = run(&[
        json!({"id": 1, "method": "session.login", "params": {"owner": owner()}}),
        json!({"id": 2, "method": "scan.ivk", "params": {
            "ivk": hex::encode([1u8; 32]),
            "start": 100,
            "end": 50,
        }}),
    ]);
    assert_eq!(responses[1]["ok"], json!(false));
    assert!(responses[1]["error"]
        .as_str()
        .unwrap()
        .contains("invalid block range"));
}

#[test]
fn malformed_lines_and_unknown_methods_get_error_envelopes() {
    cargo_bin_cmd!("shielded-walletd")
        .args(["--endpoint", UNREACHABLE])
        .write_stdin("not json\n{\"id\":9,\"method\":\"wallet.explode\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("invalid request"))
        .stdout(predicate::str::contains("unknown method wallet.explode"));
}
