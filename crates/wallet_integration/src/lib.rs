use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{ChainId, MintNotification, TxHash, WalletAddress},
    error::{ProviderErrorCode, RpcErrorObject},
    protocol::TransactionReceipt,
};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod abi;
pub mod contract;
pub mod eip1193;
pub mod http;

pub use abi::{AbiError, AbiEvent, AbiFunction, ContractAbi};
pub use contract::{RpcContractBinder, RpcMintContract};
pub use eip1193::Eip1193Wallet;
pub use http::HttpRpcTransport;

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("wallet has not authorized this client: {0}")]
    Unauthorized(String),
    #[error("wallet does not recognize the requested chain: {0}")]
    UnrecognizedChain(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response to {method}: {reason}")]
    Decode { method: String, reason: String },
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error("contract interface error: {0}")]
    Abi(#[from] AbiError),
    #[error("rpc transport is unavailable")]
    Unavailable,
}

impl WalletError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected(_))
    }

    pub fn decode(method: &str, reason: impl fmt::Display) -> Self {
        Self::Decode {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<RpcErrorObject> for WalletError {
    fn from(value: RpcErrorObject) -> Self {
        match value.provider_code() {
            ProviderErrorCode::UserRejected => Self::UserRejected(value.message),
            ProviderErrorCode::Unauthorized => Self::Unauthorized(value.message),
            ProviderErrorCode::UnrecognizedChain => Self::UnrecognizedChain(value.message),
            _ => Self::Rpc {
                code: value.code,
                message: value.message,
            },
        }
    }
}

/// Raw EIP-1193 style request surface shared by wallets and contract bindings.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

pub struct MissingRpcTransport;

#[async_trait]
impl RpcTransport for MissingRpcTransport {
    async fn request(&self, _method: &str, _params: Value) -> Result<Value, WalletError> {
        Err(WalletError::Unavailable)
    }
}

/// The signer a contract handle sends transactions through.
#[derive(Clone)]
pub struct SigningIdentity {
    pub account: Option<WalletAddress>,
    pub transport: Arc<dyn RpcTransport>,
}

impl SigningIdentity {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            account: None,
            transport,
        }
    }

    pub fn detached() -> Self {
        Self::new(Arc::new(MissingRpcTransport))
    }

    pub fn with_account(mut self, account: WalletAddress) -> Self {
        self.account = Some(account);
        self
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError>;
    async fn get_accounts(&self) -> Result<Vec<WalletAddress>, WalletError>;
    async fn get_chain_id(&self) -> Result<ChainId, WalletError>;
    async fn switch_chain(&self, target: ChainId) -> Result<(), WalletError>;
    fn signer(&self) -> SigningIdentity;
}

/// Everything needed to reach one deployed contract.
#[derive(Debug, Clone)]
pub struct ContractTarget {
    pub chain_id: ChainId,
    pub address: WalletAddress,
    pub abi: Arc<ContractAbi>,
    pub mint_function: String,
    pub count_function: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[async_trait]
pub trait MintContract: Send + Sync {
    fn address(&self) -> WalletAddress;
    /// Returns once the wallet has accepted the transaction for inclusion.
    async fn submit_mint(&self) -> Result<TxHash, WalletError>;
    async fn wait_until_mined(&self, hash: TxHash) -> Result<TransactionReceipt, WalletError>;
    async fn minted_count(&self) -> Result<u64, WalletError>;
    fn subscribe(
        &self,
        event: &str,
        sink: mpsc::UnboundedSender<MintNotification>,
    ) -> Result<SubscriptionId, WalletError>;
    fn unsubscribe(&self, id: SubscriptionId);
}

pub trait ContractBinder: Send + Sync {
    fn bind(
        &self,
        target: &ContractTarget,
        signer: SigningIdentity,
    ) -> Result<Arc<dyn MintContract>, WalletError>;
}

pub struct MissingContractBinder;

impl ContractBinder for MissingContractBinder {
    fn bind(
        &self,
        _target: &ContractTarget,
        _signer: SigningIdentity,
    ) -> Result<Arc<dyn MintContract>, WalletError> {
        Err(WalletError::Unavailable)
    }
}
