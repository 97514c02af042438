//! Chain indexing API client
//!
//! Read-only queries against the third-party indexer the promotion engine
//! cross-checks every draft mutation against: contract metadata, multisig
//! signer lists, and address balance-change history.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::address::Address;
use crate::config::OracleConfig;
use crate::error::{Error, Result};

/// Contract metadata as reported by the indexer
#[derive(Debug, Clone, Deserialize)]
pub struct ContractInfo {
    pub address: String,
    #[serde(rename = "type")]
    pub contract_type: String,
    pub author: String,
}

/// A signer slot on a multisig contract, including its pending vote
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigSigner {
    pub address: String,
    /// Destination the signer is currently voting to pay
    pub dest_address: String,
    /// Voted amount; zero once the vote has been drained by a push
    pub amount: f64,
}

/// Multisig-specific contract state
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigContractInfo {
    pub min_votes: usize,
    pub max_votes: usize,
    /// Absent until the first signer joins on-chain
    pub signers: Option<Vec<MultisigSigner>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxReceipt {
    pub success: bool,
    pub method: String,
}

/// One entry of an address's balance-change history for a contract
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub hash: String,
    pub contract_type: String,
    pub balance_change: f64,
    pub tx_receipt: TxReceipt,
}

/// Indexer responses wrap the payload in a `result` field
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

/// Read-only view of on-chain contract state
///
/// The promotion engine talks to this trait so tests can script the
/// oracle instead of standing up an indexer.
#[async_trait]
pub trait ChainOracle: Send + Sync {
    async fn get_contract(&self, address: &Address) -> Result<ContractInfo>;

    async fn get_multisig_contract(&self, address: &Address) -> Result<MultisigContractInfo>;

    /// Balance-change history for `address` against `contract`,
    /// most recent entry first
    async fn get_address_contract_balances(
        &self,
        address: &Address,
        contract: &Address,
        limit: usize,
    ) -> Result<Vec<BalanceChange>>;
}

/// HTTP client for the chain indexing API
pub struct HttpOracle {
    client: Client,
    api_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// GET a path and unwrap the `result` envelope, retrying transient
    /// failures with exponential backoff
    async fn get_result<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);

        let backoff = ExponentialBackoff {
            initial_interval: self.retry_base_delay,
            max_interval: self.retry_base_delay * 4,
            max_elapsed_time: Some(self.timeout * (self.max_retries + 1)),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            match self.get_result_once::<T>(&url).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable oracle error on {}: {}", url, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        Ok(result)
    }

    /// Single attempt: non-success status or a missing result payload is
    /// an upstream failure, never a validation failure
    async fn get_result_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("Oracle GET {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("status {}: {}", status, body)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed payload: {}", e)))?;

        envelope
            .result
            .ok_or_else(|| Error::Upstream("missing result payload".to_string()))
    }
}

#[async_trait]
impl ChainOracle for HttpOracle {
    async fn get_contract(&self, address: &Address) -> Result<ContractInfo> {
        self.get_result(&format!("/Contract/{}", address)).await
    }

    async fn get_multisig_contract(&self, address: &Address) -> Result<MultisigContractInfo> {
        self.get_result(&format!("/MultisigContract/{}", address))
            .await
    }

    async fn get_address_contract_balances(
        &self,
        address: &Address,
        contract: &Address,
        limit: usize,
    ) -> Result<Vec<BalanceChange>> {
        self.get_result(&format!(
            "/Address/{}/Contract/{}/BalanceChanges?limit={}",
            address, contract, limit
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multisig_payload_decoding() {
        let json = r#"{
            "result": {
                "minVotes": 3,
                "maxVotes": 5,
                "signers": [
                    {
                        "address": "0x1111111111111111111111111111111111111111",
                        "destAddress": "0x2222222222222222222222222222222222222222",
                        "amount": 10.0
                    }
                ]
            }
        }"#;
        let envelope: Envelope<MultisigContractInfo> = serde_json::from_str(json).unwrap();
        let info = envelope.result.unwrap();
        assert_eq!(info.min_votes, 3);
        assert_eq!(info.max_votes, 5);
        let signers = info.signers.unwrap();
        assert_eq!(signers.len(), 1);
        assert_eq!(
            signers[0].dest_address,
            "0x2222222222222222222222222222222222222222"
        );
    }

    #[test]
    fn test_fresh_multisig_has_no_signers() {
        let json = r#"{"result": {"minVotes": 3, "maxVotes": 5}}"#;
        let envelope: Envelope<MultisigContractInfo> = serde_json::from_str(json).unwrap();
        assert!(envelope.result.unwrap().signers.is_none());
    }

    #[test]
    fn test_balance_change_decoding() {
        let json = r#"{
            "result": [
                {
                    "hash": "0xdeadbeef",
                    "contractType": "Multisig",
                    "balanceChange": 10.0,
                    "txReceipt": {"success": true, "method": "push"}
                }
            ]
        }"#;
        let envelope: Envelope<Vec<BalanceChange>> = serde_json::from_str(json).unwrap();
        let changes = envelope.result.unwrap();
        assert_eq!(changes[0].hash, "0xdeadbeef");
        assert!(changes[0].tx_receipt.success);
        assert_eq!(changes[0].tx_receipt.method, "push");
    }

    #[test]
    fn test_missing_result_is_none() {
        let json = r#"{"error": {"message": "contract not indexed"}}"#;
        let envelope: Envelope<ContractInfo> = serde_json::from_str(json).unwrap();
        assert!(envelope.result.is_none());
    }
}
