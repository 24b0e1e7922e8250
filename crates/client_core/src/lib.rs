use std::sync::{Arc, Weak};

use shared::domain::{TokenId, TxHash, WalletAddress};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use wallet_integration::{
    ContractBinder, ContractTarget, MintContract, SigningIdentity, SubscriptionId, WalletError,
    WalletProvider,
};

pub mod config;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet provider detected")]
    MissingProvider,
    #[error("request rejected in wallet: {0}")]
    UserRejected(String),
    #[error("wallet or contract call failed: {0}")]
    RemoteCall(String),
    #[error("{0}")]
    Precondition(&'static str),
}

impl From<WalletError> for SessionError {
    fn from(value: WalletError) -> Self {
        match value {
            WalletError::UserRejected(message) => Self::UserRejected(message),
            other => Self::RemoteCall(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeLinks {
    pub viewer_base_url: String,
    pub explorer_tx_base_url: String,
}

impl NoticeLinks {
    pub fn token_url(&self, contract: WalletAddress, token_id: TokenId) -> String {
        format!(
            "{}/{contract}/{token_id}",
            self.viewer_base_url.trim_end_matches('/')
        )
    }

    pub fn tx_url(&self, hash: TxHash) -> String {
        format!("{}/{hash}", self.explorer_tx_base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target: ContractTarget,
    pub mint_event: String,
    pub links: NoticeLinks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintNotice {
    pub from: WalletAddress,
    pub token_id: TokenId,
    pub viewer_url: String,
    pub message: String,
}

impl MintNotice {
    fn new(links: &NoticeLinks, contract: WalletAddress, from: WalletAddress, token_id: TokenId) -> Self {
        let viewer_url = links.token_url(contract, token_id);
        let message = format!(
            "Hey there! We've minted your NFT. It may be blank right now. It can take a max of 10 min to show up on OpenSea. Here's the link: <{viewer_url}>"
        );
        Self {
            from,
            token_id,
            viewer_url,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AccountChanged(WalletAddress),
    ContractBound { address: WalletAddress },
    MintedCountChanged(u64),
    MintSubmitted { hash: TxHash },
    MintMined { hash: TxHash, explorer_url: String },
    MintNotice(MintNotice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connected,
    Subscribed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub account: Option<WalletAddress>,
    pub minted_count: u64,
    pub contract_bound: bool,
    pub subscribed: bool,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        match (self.account, self.subscribed) {
            (None, _) => SessionPhase::Disconnected,
            (Some(_), false) => SessionPhase::Connected,
            (Some(_), true) => SessionPhase::Subscribed,
        }
    }
}

#[derive(Default)]
struct SessionState {
    account: Option<WalletAddress>,
    minted_count: u64,
}

/// Releases its event subscription exactly once, when dropped.
struct MintSubscription {
    contract: Arc<dyn MintContract>,
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

impl Drop for MintSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
        self.contract.unsubscribe(self.id);
        debug!(subscription = self.id.0, "session: mint subscription released");
    }
}

struct ContractBinding {
    contract: Arc<dyn MintContract>,
    subscription: Option<MintSubscription>,
}

pub struct WalletSessionController {
    provider: Option<Arc<dyn WalletProvider>>,
    binder: Arc<dyn ContractBinder>,
    target: ContractTarget,
    mint_event: String,
    links: NoticeLinks,
    state: Mutex<SessionState>,
    binding: Mutex<Option<ContractBinding>>,
    events: broadcast::Sender<SessionEvent>,
}

impl WalletSessionController {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        binder: Arc<dyn ContractBinder>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            provider,
            binder,
            target: options.target,
            mint_event: options.mint_event,
            links: options.links,
            state: Mutex::new(SessionState::default()),
            binding: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn contract_address(&self) -> WalletAddress {
        self.target.address
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let (contract_bound, subscribed) = {
            let binding = self.binding.lock().await;
            match binding.as_ref() {
                Some(binding) => (true, binding.subscription.is_some()),
                None => (false, false),
            }
        };
        let state = self.state.lock().await;
        SessionSnapshot {
            account: state.account,
            minted_count: state.minted_count,
            contract_bound,
            subscribed,
        }
    }

    /// Silent account detection and eager contract binding, run concurrently.
    pub async fn mount(self: &Arc<Self>) {
        let bind_eagerly = async {
            let Some(provider) = &self.provider else {
                return;
            };
            match self.bind_contract(provider.signer()) {
                Ok(contract) => self.attach_contract(contract).await,
                Err(err) => warn!("session: eager contract binding failed: {err}"),
            }
        };

        let (detected, ()) = tokio::join!(self.detect_existing_account(), bind_eagerly);
        if let Err(err) = detected {
            warn!("session: account detection failed: {err}");
        }
    }

    pub async fn detect_existing_account(&self) -> Result<Option<WalletAddress>, SessionError> {
        let Some(provider) = &self.provider else {
            info!("session: no wallet provider detected; make sure a wallet is running");
            return Ok(None);
        };

        let accounts = provider.get_accounts().await?;
        let Some(account) = accounts.first().copied() else {
            info!("session: no authorized account found");
            return Ok(None);
        };

        info!(%account, "session: found an authorized account");
        self.set_account(account).await;
        Ok(Some(account))
    }

    pub async fn connect(self: &Arc<Self>) -> Result<WalletAddress, SessionError> {
        let provider = self.provider.as_ref().ok_or(SessionError::MissingProvider)?;

        let chain_id = provider.get_chain_id().await?;
        info!(%chain_id, "session: wallet is on chain");
        if chain_id != self.target.chain_id {
            info!(from = %chain_id, to = %self.target.chain_id, "session: requesting chain switch");
            provider.switch_chain(self.target.chain_id).await?;
        }

        let accounts = provider.request_accounts().await?;
        let account = accounts.first().copied().ok_or_else(|| {
            SessionError::RemoteCall("wallet authorized no accounts".to_string())
        })?;
        info!(%account, "session: connected");
        self.set_account(account).await;

        match self.bind_contract(provider.signer().with_account(account)) {
            Ok(contract) => self.attach_contract(contract).await,
            Err(err) => warn!(%account, "session: failed to rebind contract for account: {err}"),
        }

        Ok(account)
    }

    /// Always a fresh handle; callers must rebind the subscription.
    pub fn bind_contract(&self, signer: SigningIdentity) -> Result<Arc<dyn MintContract>, SessionError> {
        Ok(self.binder.bind(&self.target, signer)?)
    }

    /// Installs `contract` with its own subscription, releasing any previous binding.
    pub async fn attach_contract(self: &Arc<Self>, contract: Arc<dyn MintContract>) {
        let (sink, notifications) = mpsc::unbounded_channel();
        let subscription = match contract.subscribe(&self.mint_event, sink) {
            Ok(id) => Some(MintSubscription {
                contract: Arc::clone(&contract),
                id,
                forwarder: tokio::spawn(forward_notifications(Arc::downgrade(self), notifications)),
            }),
            Err(err) => {
                warn!(event = %self.mint_event, "session: could not subscribe to mint events: {err}");
                None
            }
        };

        let address = contract.address();
        let previous = self.binding.lock().await.replace(ContractBinding {
            contract,
            subscription,
        });
        if previous.is_some() {
            debug!("session: replaced previous contract binding");
        }
        drop(previous);

        info!(%address, "session: contract bound");
        self.emit(SessionEvent::ContractBound { address });

        if let Err(err) = self.refresh_minted_count().await {
            warn!(%address, "session: failed to fetch minted count: {err}");
        }
    }

    async fn current_contract(&self) -> Option<Arc<dyn MintContract>> {
        self.binding
            .lock()
            .await
            .as_ref()
            .map(|binding| Arc::clone(&binding.contract))
    }

    async fn set_account(&self, account: WalletAddress) {
        let changed = {
            let mut state = self.state.lock().await;
            state.account.replace(account) != Some(account)
        };
        if changed {
            self.emit(SessionEvent::AccountChanged(account));
        }
    }

    pub async fn mint(&self) -> Result<TxHash, SessionError> {
        let Some(contract) = self.current_contract().await else {
            warn!("session: mint requested before a contract was bound");
            return Err(SessionError::Precondition("mint requires a bound contract"));
        };

        info!("session: going to pop wallet now to pay gas");
        let hash = contract.submit_mint().await?;
        self.emit(SessionEvent::MintSubmitted { hash });

        info!(%hash, "session: mining, please wait");
        contract.wait_until_mined(hash).await?;

        let explorer_url = self.links.tx_url(hash);
        info!(%hash, %explorer_url, "session: mint mined");
        self.emit(SessionEvent::MintMined { hash, explorer_url });
        Ok(hash)
    }

    pub async fn refresh_minted_count(&self) -> Result<u64, SessionError> {
        let contract = self.current_contract().await.ok_or(SessionError::Precondition(
            "minted count requires a bound contract",
        ))?;

        let minted = contract.minted_count().await?;
        self.state.lock().await.minted_count = minted;
        self.emit(SessionEvent::MintedCountChanged(minted));
        Ok(minted)
    }

    pub async fn on_mint_notification(&self, from: WalletAddress, token_id: TokenId) -> MintNotice {
        info!(%from, %token_id, "session: mint notification");
        if let Err(err) = self.refresh_minted_count().await {
            warn!("session: failed to refresh minted count after notification: {err}");
        }

        let notice = MintNotice::new(&self.links, self.target.address, from, token_id);
        self.emit(SessionEvent::MintNotice(notice.clone()));
        notice
    }

    /// Releases the subscription; displayed state is kept.
    pub async fn teardown(&self) {
        let binding = self.binding.lock().await.take();
        if binding.is_some() {
            info!("session: tearing down contract binding");
        }
        drop(binding);
    }
}

async fn forward_notifications(
    controller: Weak<WalletSessionController>,
    mut notifications: mpsc::UnboundedReceiver<shared::domain::MintNotification>,
) {
    while let Some(notification) = notifications.recv().await {
        let Some(controller) = controller.upgrade() else {
            return;
        };
        controller
            .on_mint_notification(notification.from, notification.token_id)
            .await;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
