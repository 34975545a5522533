use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::trace;

use super::{Block, BlockHeight, ChainError, ChainSource, Config};

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

/// JSON-RPC client for a node exposing `getBlockByNumber(height, includeBody)`.
#[derive(Debug)]
pub struct RpcChain {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, Option<String>)>,
    next_id: AtomicU64,
}

#[derive(Deserialize, Debug)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcChain {
    pub fn new(config: &Config) -> Result<Self, ChainError> {
        let timeout = config.timeout_secs.unwrap_or(DEFAULT_RPC_TIMEOUT_SECS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        let auth = config
            .rpc_user
            .clone()
            .map(|user| (user, config.rpc_pass.clone()));

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            auth,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        trace!(id, method, %params, "rpc request");

        let mut request = self.client.post(&self.url).json(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));

        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, pass.as_ref());
        }

        let response = request.send().await?.error_for_status()?;
        let body: RpcResponse = response.json().await?;

        decode_response(body)
    }
}

fn decode_response<T: DeserializeOwned>(response: RpcResponse) -> Result<T, ChainError> {
    if let Some(error) = response.error {
        return Err(ChainError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    Ok(serde_json::from_value(response.result)?)
}

#[async_trait]
impl ChainSource for RpcChain {
    async fn block_at(
        &self,
        height: BlockHeight,
        include_body: bool,
    ) -> Result<Option<Block>, ChainError> {
        self.call("getBlockByNumber", json!([height, include_body]))
            .await
    }
}
