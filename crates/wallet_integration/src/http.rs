use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::protocol::{RpcRequest, RpcResponse};
use tracing::debug;
use url::Url;

use crate::{RpcTransport, WalletError};

/// JSON-RPC 2.0 over HTTP, for wallets that expose their provider on a local port.
pub struct HttpRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl HttpRpcTransport {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid wallet rpc url: {endpoint}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("wallet rpc url must start with http:// or https://");
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "rpc: sending request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| WalletError::Transport(err.to_string()))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| WalletError::decode(method, err))?;

        if body.id.is_some_and(|echoed| echoed != id) {
            return Err(WalletError::decode(
                method,
                format!("response id {:?} does not match request id {id}", body.id),
            ));
        }

        body.into_result().map_err(WalletError::from)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
