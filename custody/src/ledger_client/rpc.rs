//! EVM JSON-RPC ledger client.
//!
//! Anchors commitments in a deployed custody contract and reads them back.
//! The contract exposes:
//!
//! ```solidity
//! function addEvidence(bytes32 hash, address collector) external returns (uint256);
//! function getOriginalHash(uint256 evidenceId)
//!     external view returns (bytes32 hash, address collector, uint256 timestamp, bool exists);
//! function getEvidenceCount() external view returns (uint256);
//! function isJudge(address account) external view returns (bool);
//! function isLawyer(address account) external view returns (bool);
//!
//! event EvidenceAdded(uint256 indexed evidenceId, bytes32 hash, address collector, uint256 timestamp);
//! ```
//!
//! Anchoring uses `eth_sendTransaction`: signing is delegated to the node,
//! which must manage (or have unlocked) the configured `from` account. This
//! client holds no private keys.
//!
//! After submission the client polls `eth_getTransactionReceipt` until the
//! transaction is mined or the confirmation timeout elapses. The evidence id
//! is taken from the `EvidenceAdded` log; if no such log is found, the
//! current `getEvidenceCount()` is used instead.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::pipeline::ledger::{Ledger, LedgerError, RoleDirectory};
use crate::types::{
    AnchorReceipt, Commitment, Digest256, EvidenceId, Identity, LedgerRecord, Role,
};

use super::abi::{self, AbiError, Word};

const ADD_EVIDENCE: &str = "addEvidence(bytes32,address)";
const GET_ORIGINAL_HASH: &str = "getOriginalHash(uint256)";
const GET_EVIDENCE_COUNT: &str = "getEvidenceCount()";
const IS_JUDGE: &str = "isJudge(address)";
const IS_LAWYER: &str = "isLawyer(address)";
const EVIDENCE_ADDED: &str = "EvidenceAdded(uint256,bytes32,address,uint256)";

impl From<AbiError> for LedgerError {
    fn from(e: AbiError) -> Self {
        LedgerError::Protocol(e.to_string())
    }
}

/// Configuration for [`EvmLedger`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerRpcConfig {
    /// JSON-RPC endpoint, e.g. `"http://localhost:8545"`.
    pub rpc_url: String,
    /// Address of the deployed custody contract (0x + 40 hex).
    pub contract_address: String,
    /// Account the node signs anchor transactions with. Only needed for
    /// anchoring; verification is read-only.
    pub from_address: String,
    /// Per-request timeout.
    #[serde(with = "crate::config::duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// How long to wait for an anchor transaction to be mined.
    #[serde(
        with = "crate::config::duration_ms",
        rename = "confirmation_timeout_ms"
    )]
    pub confirmation_timeout: Duration,
    /// Delay between receipt polls.
    #[serde(with = "crate::config::duration_ms", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Explicit gas limit; the node estimates one when unset.
    pub gas: Option<u64>,
}

impl Default for LedgerRpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            contract_address: String::new(),
            from_address: String::new(),
            timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
            gas: None,
        }
    }
}

/// Subset of a transaction receipt used by the client.
#[derive(Debug, Deserialize)]
struct TxReceipt {
    status: Option<String>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

/// Finds the id announced by an `EvidenceAdded` log emitted by `contract`.
///
/// The id is read from the first indexed topic when present, otherwise from
/// the first data word.
fn evidence_id_from_logs(logs: &[LogEntry], contract: &str) -> Result<Option<EvidenceId>, AbiError> {
    let topic = abi::event_topic(EVIDENCE_ADDED);

    for log in logs {
        if !log.address.eq_ignore_ascii_case(contract) {
            continue;
        }
        let Some(first) = log.topics.first() else {
            continue;
        };
        if abi::decode_word(first)? != topic {
            continue;
        }

        let id_word = match log.topics.get(1) {
            Some(indexed) => abi::decode_word(indexed)?,
            None => {
                let words = abi::decode_words(&log.data)?;
                abi::expect_words(&words, 1)?;
                words[0]
            }
        };
        return Ok(Some(EvidenceId(abi::word_to_u64(&id_word)?)));
    }
    Ok(None)
}

/// Decodes the return data of `getOriginalHash(uint256)`.
fn decode_ledger_record(record_id: EvidenceId, data: &str) -> Result<LedgerRecord, AbiError> {
    let words = abi::decode_words(data)?;
    abi::expect_words(&words, 4)?;
    Ok(LedgerRecord {
        record_id,
        commitment: Commitment(Digest256(words[0])),
        submitter: abi::word_to_address(&words[1]),
        timestamp: abi::word_to_u64(&words[2])?,
        exists: abi::word_to_bool(&words[3]),
    })
}

/// EVM JSON-RPC ledger and role directory.
///
/// Thread-safe (`Send + Sync`); wrap in an `Arc` to use one instance as
/// both the coordinator's ledger and its role directory.
pub struct EvmLedger {
    config: LedgerRpcConfig,
    client: Client,
}

impl EvmLedger {
    /// Builds a client for the contract described by `config`.
    pub fn new(config: LedgerRpcConfig) -> Result<Self, LedgerError> {
        if !abi::is_valid_address(&config.contract_address) {
            return Err(LedgerError::Rejected(format!(
                "invalid contract address {:?}",
                config.contract_address
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LedgerRpcConfig {
        &self.config
    }

    /// Sends a JSON-RPC request and returns its `result` field.
    fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Unavailable(format!("{method}: request timed out"))
                } else {
                    LedgerError::Unavailable(format!("{method}: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Unavailable(format!(
                "{method}: HTTP status {status}"
            )));
        }

        let mut json: Value = resp
            .json()
            .map_err(|e| LedgerError::Protocol(format!("{method}: invalid JSON response: {e}")))?;

        if let Some(error) = json.get("error") {
            let msg = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(LedgerError::Rejected(format!("{method}: {msg}")));
        }

        match json.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(LedgerError::Protocol(format!(
                "{method}: response missing 'result' field"
            ))),
        }
    }

    /// Read-only contract call; returns the hex return data.
    fn eth_call(&self, signature: &str, args: &[Word]) -> Result<String, LedgerError> {
        let call = json!({
            "to": self.config.contract_address,
            "data": abi::encode_call(signature, args),
        });
        let result = self.rpc_call("eth_call", json!([call, "latest"]))?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Protocol("eth_call returned non-string result".into()))
    }

    fn send_anchor_tx(&self, commitment: &Commitment, collector: Word) -> Result<String, LedgerError> {
        if !abi::is_valid_address(&self.config.from_address) {
            return Err(LedgerError::Rejected(format!(
                "invalid or missing from address {:?}",
                self.config.from_address
            )));
        }

        let data = abi::encode_call(ADD_EVIDENCE, &[*commitment.as_digest().as_bytes(), collector]);
        let mut tx = json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": data,
        });
        if let Some(gas) = self.config.gas {
            tx["gas"] = json!(format!("0x{gas:x}"));
        }

        let result = self.rpc_call("eth_sendTransaction", json!([tx]))?;
        result.as_str().map(str::to_string).ok_or_else(|| {
            LedgerError::Protocol("eth_sendTransaction returned non-string result".into())
        })
    }

    /// Polls for the receipt of `tx_hash` until mined or timed out.
    fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, LedgerError> {
        let deadline = Instant::now() + self.config.confirmation_timeout;
        loop {
            let receipt = self.rpc_call("eth_getTransactionReceipt", json!([tx_hash]))?;
            if !receipt.is_null() {
                return serde_json::from_value(receipt).map_err(|e| {
                    LedgerError::Protocol(format!("malformed receipt for {tx_hash}: {e}"))
                });
            }
            if Instant::now() >= deadline {
                return Err(LedgerError::Unavailable(format!(
                    "transaction {tx_hash} not mined within {:?}; check it before anchoring again",
                    self.config.confirmation_timeout
                )));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Number of records held by the contract.
    pub fn evidence_count(&self) -> Result<u64, LedgerError> {
        let data = self.eth_call(GET_EVIDENCE_COUNT, &[])?;
        let words = abi::decode_words(&data)?;
        abi::expect_words(&words, 1)?;
        Ok(abi::word_to_u64(&words[0])?)
    }
}

impl Ledger for EvmLedger {
    fn anchor(
        &self,
        commitment: &Commitment,
        submitter: &Identity,
    ) -> Result<AnchorReceipt, LedgerError> {
        let collector = abi::address_word(submitter.as_str()).map_err(|_| {
            LedgerError::Rejected(format!("submitter {submitter} is not a ledger address"))
        })?;

        let tx_hash = self.send_anchor_tx(commitment, collector)?;
        tracing::info!(tx_ref = %tx_hash, commitment = %commitment, "anchor transaction submitted");

        let receipt = self.wait_for_receipt(&tx_hash)?;
        if receipt.status.as_deref().map(abi::parse_quantity).transpose()? == Some(0) {
            return Err(LedgerError::Rejected(format!(
                "transaction {tx_hash} reverted"
            )));
        }

        let record_id = match evidence_id_from_logs(&receipt.logs, &self.config.contract_address)? {
            Some(id) => id,
            None => {
                tracing::debug!(tx_ref = %tx_hash, "no EvidenceAdded log; falling back to evidence count");
                EvidenceId(self.evidence_count()?)
            }
        };

        Ok(AnchorReceipt {
            record_id,
            tx_ref: tx_hash,
        })
    }

    fn fetch(&self, record_id: EvidenceId) -> Result<LedgerRecord, LedgerError> {
        let data = self.eth_call(GET_ORIGINAL_HASH, &[abi::u64_word(record_id.get())])?;
        Ok(decode_ledger_record(record_id, &data)?)
    }
}

impl RoleDirectory for EvmLedger {
    fn has_role(&self, identity: &Identity, role: Role) -> Result<bool, LedgerError> {
        let Ok(account) = abi::address_word(identity.as_str()) else {
            tracing::debug!(identity = %identity, "identity is not a ledger address; no roles");
            return Ok(false);
        };

        let signature = match role {
            Role::Reviewer => IS_JUDGE,
            Role::Auditor => IS_LAWYER,
        };
        let data = self.eth_call(signature, &[account])?;
        let words = abi::decode_words(&data)?;
        abi::expect_words(&words, 1)?;
        Ok(abi::word_to_bool(&words[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    fn topic_hex(word: Word) -> String {
        format!("0x{}", hex::encode(word))
    }

    #[test]
    fn new_rejects_bad_contract_address() {
        let err = EvmLedger::new(LedgerRpcConfig::default()).err().expect("empty address");
        assert!(matches!(err, LedgerError::Rejected(_)));

        let ok = EvmLedger::new(LedgerRpcConfig {
            contract_address: CONTRACT.to_string(),
            ..LedgerRpcConfig::default()
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn evidence_id_from_indexed_topic() {
        let receipt: TxReceipt = serde_json::from_value(json!({
            "status": "0x1",
            "logs": [
                {
                    "address": "0x0000000000000000000000000000000000000001",
                    "topics": [topic_hex(abi::event_topic(EVIDENCE_ADDED)), topic_hex(abi::u64_word(99))],
                    "data": "0x"
                },
                {
                    "address": CONTRACT.to_ascii_uppercase().replace("0X", "0x"),
                    "topics": [topic_hex(abi::event_topic(EVIDENCE_ADDED)), topic_hex(abi::u64_word(12))],
                    "data": "0x"
                }
            ]
        }))
        .expect("receipt should parse");

        let id = evidence_id_from_logs(&receipt.logs, CONTRACT).expect("decode logs");
        assert_eq!(id, Some(EvidenceId(12)));
    }

    #[test]
    fn evidence_id_from_data_when_not_indexed() {
        let data = format!("0x{}{}", hex::encode(abi::u64_word(3)), hex::encode([0u8; 32]));
        let logs = vec![LogEntry {
            address: CONTRACT.to_string(),
            topics: vec![topic_hex(abi::event_topic(EVIDENCE_ADDED))],
            data,
        }];

        assert_eq!(
            evidence_id_from_logs(&logs, CONTRACT).expect("decode logs"),
            Some(EvidenceId(3))
        );
        assert_eq!(evidence_id_from_logs(&[], CONTRACT).expect("no logs"), None);
    }

    #[test]
    fn ledger_record_decoding() {
        let commitment = Commitment::from_hex(
            "a41b2d8006757350bcfb8c709d4a838b6d28a04405b4f811b1e3520951eb9d83",
        )
        .expect("valid commitment");
        let collector = abi::address_word("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")
            .expect("valid address");
        let data = format!(
            "0x{}{}{}{}",
            hex::encode(commitment.as_digest().as_bytes()),
            hex::encode(collector),
            hex::encode(abi::u64_word(1_700_000_000)),
            hex::encode(abi::u64_word(1)),
        );

        let record = decode_ledger_record(EvidenceId(1), &data).expect("decode record");
        assert_eq!(record.commitment, commitment);
        assert_eq!(record.submitter, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(record.timestamp, 1_700_000_000);
        assert!(record.exists);

        let err = decode_ledger_record(EvidenceId(1), "0x").unwrap_err();
        assert_eq!(err, AbiError::TooShort { expected: 4, actual: 0 });
    }

    #[test]
    fn rpc_config_reads_durations_in_millis() {
        let cfg: LedgerRpcConfig = serde_json::from_str(
            r#"{"contract_address":"0x5fbdb2315678afecb367f032d93f642f64180aa3","poll_interval_ms":250}"#,
        )
        .expect("config should parse");
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(cfg.gas, None);
    }
}
