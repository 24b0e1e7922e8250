use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::{Bytes, U256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{MintNotification, TxHash, WalletAddress},
    protocol::{methods, CallRequest, LogFilter, RawLog, TransactionReceipt, TransactionRequest},
};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    abi::{self, AbiEvent, AbiFunction},
    ContractBinder, ContractTarget, MintContract, RpcTransport, SigningIdentity,
    SubscriptionId, WalletError,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

async fn rpc_call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Value,
) -> Result<T, WalletError> {
    let value = transport.request(method, params).await?;
    serde_json::from_value(value).map_err(|err| WalletError::decode(method, err))
}

fn u256_to_u64(value: U256, method: &str) -> Result<u64, WalletError> {
    if value > U256::from(u64::MAX) {
        return Err(WalletError::decode(
            method,
            format!("value {value} does not fit in u64"),
        ));
    }
    Ok(value.as_limbs()[0])
}

/// Contract handle that reaches the chain through the wallet's own RPC surface.
pub struct RpcMintContract {
    target: ContractTarget,
    signer: SigningIdentity,
    mint_calldata: Bytes,
    count_function: AbiFunction,
    count_calldata: Bytes,
    poll_interval: Duration,
    next_subscription: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl RpcMintContract {
    pub fn new(
        target: ContractTarget,
        signer: SigningIdentity,
        poll_interval: Duration,
    ) -> Result<Self, WalletError> {
        let mint_calldata = abi::encode_call(target.abi.function(&target.mint_function)?)?;
        let count_function = target.abi.function(&target.count_function)?.clone();
        let count_calldata = abi::encode_call(&count_function)?;

        Ok(Self {
            target,
            signer,
            mint_calldata,
            count_function,
            count_calldata,
            poll_interval,
            next_subscription: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .map(|subscriptions| subscriptions.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MintContract for RpcMintContract {
    fn address(&self) -> WalletAddress {
        self.target.address
    }

    async fn submit_mint(&self) -> Result<TxHash, WalletError> {
        let tx = TransactionRequest {
            from: self.signer.account,
            to: self.target.address,
            data: self.mint_calldata.clone(),
        };
        let hash: TxHash = rpc_call(
            self.signer.transport.as_ref(),
            methods::SEND_TRANSACTION,
            json!([tx]),
        )
        .await?;
        info!(%hash, function = %self.target.mint_function, "contract: mint accepted");
        Ok(hash)
    }

    async fn wait_until_mined(&self, hash: TxHash) -> Result<TransactionReceipt, WalletError> {
        loop {
            let receipt: Option<TransactionReceipt> = rpc_call(
                self.signer.transport.as_ref(),
                methods::TRANSACTION_RECEIPT,
                json!([hash]),
            )
            .await?;

            match receipt {
                Some(receipt) if receipt.succeeded() => return Ok(receipt),
                Some(_) => return Err(WalletError::Reverted(hash)),
                None => {
                    debug!(%hash, "contract: receipt pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn minted_count(&self) -> Result<u64, WalletError> {
        let call = CallRequest {
            to: self.target.address,
            data: self.count_calldata.clone(),
        };
        let output: Bytes = rpc_call(
            self.signer.transport.as_ref(),
            methods::CALL,
            json!([call, "latest"]),
        )
        .await?;

        let count = abi::decode_uint_output(&self.count_function, &output)
            .map_err(|err| WalletError::decode(methods::CALL, err))?;
        u256_to_u64(count, methods::CALL)
    }

    fn subscribe(
        &self,
        event: &str,
        sink: mpsc::UnboundedSender<MintNotification>,
    ) -> Result<SubscriptionId, WalletError> {
        let event = self.target.abi.event(event)?.clone();
        let runtime = Handle::try_current()
            .map_err(|err| WalletError::Transport(format!("no async runtime: {err}")))?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let task = runtime.spawn(poll_event_logs(
            Arc::clone(&self.signer.transport),
            self.target.address,
            event,
            self.poll_interval,
            sink,
        ));

        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.insert(id, task);
        } else {
            task.abort();
            return Err(WalletError::Transport(
                "subscription registry poisoned".to_string(),
            ));
        }
        debug!(subscription = id.0, "contract: event subscription started");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let task = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|mut subscriptions| subscriptions.remove(&id));
        if let Some(task) = task {
            task.abort();
            debug!(subscription = id.0, "contract: event subscription stopped");
        }
    }
}

impl Drop for RpcMintContract {
    fn drop(&mut self) {
        if let Ok(subscriptions) = self.subscriptions.get_mut() {
            for (_, task) in subscriptions.drain() {
                task.abort();
            }
        }
    }
}

/// Polls `eth_getLogs` for new occurrences of `event`, starting after the
/// head block observed on the first tick.
async fn poll_event_logs(
    transport: Arc<dyn RpcTransport>,
    address: WalletAddress,
    event: AbiEvent,
    poll_interval: Duration,
    sink: mpsc::UnboundedSender<MintNotification>,
) {
    let topic = event.selector();
    let mut next_block: Option<u64> = None;
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        ticker.tick().await;
        if sink.is_closed() {
            return;
        }

        let head = match rpc_call::<U64>(transport.as_ref(), methods::BLOCK_NUMBER, json!([])).await
        {
            Ok(head) => head.to::<u64>(),
            Err(err) => {
                warn!(event = %event.name, "contract: failed to read block number: {err}");
                continue;
            }
        };

        let from_block = match next_block {
            Some(from_block) => from_block,
            None => {
                next_block = Some(head + 1);
                continue;
            }
        };
        if from_block > head {
            continue;
        }

        let filter = LogFilter {
            address,
            topics: vec![topic],
            from_block: U64::from(from_block),
            to_block: U64::from(head),
        };
        let logs: Vec<RawLog> =
            match rpc_call(transport.as_ref(), methods::GET_LOGS, json!([filter])).await {
                Ok(logs) => logs,
                Err(err) => {
                    warn!(event = %event.name, from_block, head, "contract: failed to fetch logs: {err}");
                    continue;
                }
            };

        for log in logs.iter().filter(|log| !log.removed) {
            match abi::decode_mint_notification(&event, log) {
                Ok(notification) => {
                    if sink.send(notification).is_err() {
                        return;
                    }
                }
                Err(err) => warn!(event = %event.name, "contract: skipping undecodable log: {err}"),
            }
        }
        next_block = Some(head + 1);
    }
}

pub struct RpcContractBinder {
    poll_interval: Duration,
}

impl RpcContractBinder {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for RpcContractBinder {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ContractBinder for RpcContractBinder {
    fn bind(
        &self,
        target: &ContractTarget,
        signer: SigningIdentity,
    ) -> Result<Arc<dyn MintContract>, WalletError> {
        info!(
            address = %target.address,
            chain_id = %target.chain_id,
            account = ?signer.account,
            "contract: binding handle"
        );
        let contract = RpcMintContract::new(target.clone(), signer, self.poll_interval)?;
        Ok(Arc::new(contract))
    }
}

#[cfg(test)]
#[path = "tests/contract_tests.rs"]
mod tests;
