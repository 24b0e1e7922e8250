use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{ChainId, WalletAddress},
    protocol::{methods, SwitchChainParams},
};
use tracing::debug;

use crate::{RpcTransport, SigningIdentity, WalletError, WalletProvider};

/// Wallet provider speaking the standard EIP-1193 request methods.
pub struct Eip1193Wallet {
    transport: Arc<dyn RpcTransport>,
}

impl Eip1193Wallet {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WalletError> {
        let value = self.transport.request(method, params).await?;
        serde_json::from_value(value).map_err(|err| WalletError::decode(method, err))
    }
}

#[async_trait]
impl WalletProvider for Eip1193Wallet {
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        self.call(methods::REQUEST_ACCOUNTS, json!([])).await
    }

    async fn get_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        self.call(methods::ACCOUNTS, json!([])).await
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        let raw: String = self.call(methods::CHAIN_ID, json!([])).await?;
        raw.parse()
            .map_err(|err| WalletError::decode(methods::CHAIN_ID, err))
    }

    async fn switch_chain(&self, target: ChainId) -> Result<(), WalletError> {
        debug!(chain_id = %target, "wallet: requesting chain switch");
        let params = SwitchChainParams { chain_id: target };
        let _: Value = self.call(methods::SWITCH_CHAIN, json!([params])).await?;
        Ok(())
    }

    fn signer(&self) -> SigningIdentity {
        SigningIdentity::new(Arc::clone(&self.transport))
    }
}

#[cfg(test)]
#[path = "tests/eip1193_tests.rs"]
mod tests;
