// JSON-RPC client for the Bitcoin-compatible node
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::CoordinatorConfig;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned error: {0}")]
    Node(Value),

    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u32, got: Value },

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// `getblockchaininfo`, reduced to the field the tip monitor watches.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub blocks: u64,
}

/// A BIP22/23 block template, reduced to the fields the block builder uses.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTemplate {
    pub version: i32,
    pub previousblockhash: String,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    pub coinbasevalue: u64,
    pub curtime: u32,
    pub bits: String,
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateTransaction {
    /// Raw transaction, hex-encoded
    pub data: String,
}

/// HTTP Basic auth JSON-RPC client.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    url: String,
    user: String,
    pass: String,
}

impl NodeClient {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.rpc_url.clone(),
            user: config.rpc_user.clone(),
            pass: config.rpc_pass.clone(),
        }
    }

    /// Issue one RPC call. Each request carries a random 32-bit id; a
    /// response with a different id is a protocol violation and is rejected.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id: u32 = rand::random();
        let body = json!({ "id": id, "method": method, "params": params });

        debug!("rpc request: {}", method);
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&body)
            .send()
            .await?;

        let parsed: RpcResponse = response.json().await?;

        if parsed.id.as_u64() != Some(id as u64) {
            return Err(RpcError::IdMismatch {
                expected: id,
                got: parsed.id,
            });
        }
        if !parsed.error.is_null() {
            return Err(RpcError::Node(parsed.error));
        }

        Ok(parsed.result)
    }

    pub async fn get_blockchain_info(&self) -> Result<ChainInfo, RpcError> {
        let result = self.call("getblockchaininfo", json!([])).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_block_template(&self) -> Result<BlockTemplate, RpcError> {
        let result = self
            .call("getblocktemplate", json!([{ "rules": ["segwit"] }]))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Submit a serialized block. A non-null result is the node's rejection
    /// reason.
    pub async fn submit_block(&self, block_hex: &str) -> Result<Value, RpcError> {
        self.call("submitblock", json!([block_hex])).await
    }
}
