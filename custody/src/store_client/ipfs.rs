//! IPFS content-store client.
//!
//! This implementation of [`ContentStore`] talks to an IPFS node (Kubo)
//! over its HTTP RPC API. All endpoints are `POST` requests:
//!
//! ```text
//! POST /api/v0/add?pin=false        multipart "file"   -> {"Name","Hash","Size"}
//! POST /api/v0/cat?arg=<cid>                           -> raw bytes
//! POST /api/v0/pin/add?arg=<cid>                       -> {"Pins":[...]}
//!
//! Error responses (HTTP 500):
//! {"Message": "...", "Code": 0, "Type": "error"}
//! ```
//!
//! Uploads are not pinned by `add`; the pipeline requests the pin separately
//! once the item is anchored, and a failed pin is only a warning.

use std::time::Duration;

use reqwest::blocking::{Client, Response, multipart};
use serde::{Deserialize, Serialize};

use crate::pipeline::store::{ContentStore, PinOutcome, StoreError, UploadReceipt};
use crate::types::Cid;

/// Configuration for [`IpfsContentStore`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// Root of the node's RPC API, e.g. `"http://127.0.0.1:5001"`.
    pub api_url: String,
    /// Public gateway used to build shareable links.
    pub gateway_url: String,
    /// Per-request timeout.
    #[serde(with = "crate::config::duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            gateway_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Public gateway URL for `cid`: `<gateway>/ipfs/<cid>`.
///
/// A trailing slash on `gateway` is tolerated.
pub fn gateway_url(gateway: &str, cid: &Cid) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid)
}

/// Response of `/api/v0/add`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

/// Response of `/api/v0/pin/add`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    #[serde(default)]
    pins: Vec<String>,
}

impl PinResponse {
    /// Kubo echoes the pinned roots; an empty list means nothing was pinned.
    fn into_outcome(self, cid: &Cid) -> PinOutcome {
        if self.pins.is_empty() {
            PinOutcome::failed(format!("node reported no pins for {cid}"))
        } else {
            PinOutcome::pinned()
        }
    }
}

/// Error body returned by the node with non-2xx statuses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    message: String,
}

/// IPFS-backed content store.
///
/// Thread-safe (`Send + Sync`); one instance can serve concurrent ingests.
pub struct IpfsContentStore {
    api_url: String,
    gateway: String,
    client: Client,
}

impl IpfsContentStore {
    /// Constructs a client for the node described by `cfg`.
    pub fn new(cfg: &IpfsConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url: cfg.api_url.clone(),
            gateway: cfg.gateway_url.clone(),
            client,
        })
    }

    /// Shareable gateway link for `cid`.
    pub fn gateway_url(&self, cid: &Cid) -> String {
        gateway_url(&self.gateway, cid)
    }

    fn endpoint(&self, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/api/v0/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn post(&self, path: &str, query: &[(&str, &str)]) -> Result<Response, StoreError> {
        let url = self.endpoint(path);
        self.client
            .post(&url)
            .query(query)
            .send()
            .map_err(|e| StoreError::Unavailable(format!("HTTP POST {url} failed: {e}")))
    }
}

/// Extracts the node's error message from a failed response.
fn error_message(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => err.message,
        Err(_) if body.trim().is_empty() => format!("HTTP status {status}"),
        Err(_) => format!("HTTP status {status}: {}", body.trim()),
    }
}

/// Maps a failed `cat` onto a store error.
///
/// A malformed CID names no object, so it is `NotFound` rather than a
/// transient outage that a caller would retry.
fn cat_error(cid: &Cid, message: String) -> StoreError {
    if is_missing_object(&message) || is_malformed_cid(&message) {
        StoreError::NotFound(cid.clone())
    } else {
        StoreError::Unavailable(message)
    }
}

fn is_missing_object(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("not found") || message.contains("no link named")
}

fn is_malformed_cid(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["invalid path", "invalid cid", "failed to parse", "selected encoding not supported"]
        .iter()
        .any(|needle| message.contains(needle))
}

impl ContentStore for IpfsContentStore {
    fn upload(&self, bytes: &[u8], file_name: &str) -> Result<UploadReceipt, StoreError> {
        let url = self.endpoint("add");
        let part = multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(&url)
            .query(&[("pin", "false"), ("cid-version", "1")])
            .multipart(form)
            .send()
            .map_err(|e| StoreError::Unavailable(format!("HTTP POST {url} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(StoreError::WriteFailed(error_message(resp)));
        }

        let body = resp
            .json::<AddResponse>()
            .map_err(|e| StoreError::WriteFailed(format!("unexpected add response: {e}")))?;
        if body.hash.is_empty() {
            return Err(StoreError::WriteFailed(
                "node returned an empty CID".to_string(),
            ));
        }

        tracing::debug!(cid = %body.hash, file_name, "uploaded evidence to IPFS");
        // The add response's `Size` is the DAG size; report the bytes sent.
        Ok(UploadReceipt {
            cid: Cid::new(body.hash),
            size: bytes.len() as u64,
        })
    }

    fn retrieve(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        let resp = self.post("cat", &[("arg", cid.as_str())])?;

        if !resp.status().is_success() {
            return Err(cat_error(cid, error_message(resp)));
        }

        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| StoreError::Unavailable(format!("reading {cid} failed: {e}")))
    }

    fn pin(&self, cid: &Cid) -> PinOutcome {
        let resp = match self.post("pin/add", &[("arg", cid.as_str())]) {
            Ok(resp) => resp,
            Err(e) => return PinOutcome::failed(e.to_string()),
        };

        if !resp.status().is_success() {
            return PinOutcome::failed(error_message(resp));
        }

        match resp.json::<PinResponse>() {
            Ok(body) => body.into_outcome(cid),
            Err(e) => PinOutcome::failed(format!("unexpected pin response: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::FailureKind;

    #[test]
    fn gateway_url_tolerates_trailing_slash() {
        let cid = Cid::new("bafkreiabc");
        assert_eq!(
            gateway_url("http://localhost:8080", &cid),
            "http://localhost:8080/ipfs/bafkreiabc"
        );
        assert_eq!(
            gateway_url("https://gw.example.org/", &cid),
            "https://gw.example.org/ipfs/bafkreiabc"
        );
    }

    #[test]
    fn endpoint_avoids_double_slashes() {
        let store = IpfsContentStore::new(&IpfsConfig {
            api_url: "http://127.0.0.1:5001/".to_string(),
            ..IpfsConfig::default()
        })
        .expect("build client");
        assert_eq!(store.endpoint("/pin/add"), "http://127.0.0.1:5001/api/v0/pin/add");
    }

    #[test]
    fn add_response_can_be_deserialized() {
        let json = r#"{"Name":"scene.jpg","Hash":"bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku","Size":"1034"}"#;
        let resp: AddResponse = serde_json::from_str(json).expect("AddResponse should parse");
        assert_eq!(
            resp.hash,
            "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku"
        );
    }

    #[test]
    fn empty_pin_list_is_a_failed_pin() {
        let cid = Cid::new("bafkreiabc");
        let pinned: PinResponse =
            serde_json::from_str(r#"{"Pins":["bafkreiabc"]}"#).expect("PinResponse should parse");
        assert!(pinned.into_outcome(&cid).ok);

        let none: PinResponse = serde_json::from_str(r#"{}"#).expect("PinResponse should parse");
        assert!(!none.into_outcome(&cid).ok);
    }

    #[test]
    fn api_errors_are_classified() {
        let err: ApiError =
            serde_json::from_str(r#"{"Message":"block was not found locally (offline): ipld: could not find bafy","Code":0,"Type":"error"}"#)
                .expect("ApiError should parse");
        assert!(is_missing_object(&err.message));
        assert!(!is_missing_object("context deadline exceeded"));
    }

    #[test]
    fn malformed_cids_are_not_found_rather_than_unavailable() {
        let cid = Cid::new("not-a-cid");
        let err = cat_error(
            &cid,
            r#"invalid path "not-a-cid": invalid cid: selected encoding not supported"#.to_string(),
        );
        assert_eq!(err, StoreError::NotFound(cid.clone()));
        assert_eq!(err.kind(), FailureKind::NotFound);

        let err = cat_error(&cid, "context deadline exceeded".to_string());
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(err.kind(), FailureKind::TransientUnavailable);
    }

    #[test]
    fn ipfs_config_reads_timeout_in_millis() {
        let cfg: IpfsConfig =
            serde_json::from_str(r#"{"api_url":"http://ipfs:5001","timeout_ms":1500}"#)
                .expect("config should parse");
        assert_eq!(cfg.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.gateway_url, "http://localhost:8080");
    }
}
