use super::*;
use async_trait::async_trait;
use shared::{
    domain::{ChainId, MintNotification},
    protocol::TransactionReceipt,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};
use wallet_integration::{ContractAbi, MissingContractBinder};

const TARGET_CHAIN: ChainId = ChainId(5);

fn addr(byte: &str) -> WalletAddress {
    format!("0x{}", byte.repeat(20)).parse().expect("address")
}

fn tx_hash() -> TxHash {
    format!("0x{}", "11".repeat(32)).parse().expect("hash")
}

fn options() -> SessionOptions {
    SessionOptions {
        target: ContractTarget {
            chain_id: TARGET_CHAIN,
            address: addr("c0"),
            abi: Arc::new(ContractAbi::default()),
            mint_function: "makeAnEpicNFT".to_string(),
            count_function: "getNFTsMinted".to_string(),
        },
        mint_event: "NewEpicNFTMinted".to_string(),
        links: NoticeLinks {
            viewer_base_url: "https://testnets.opensea.io/assets".to_string(),
            explorer_tx_base_url: "https://goerli.etherscan.io/tx".to_string(),
        },
    }
}

struct FakeWallet {
    chain_id: ChainId,
    authorized: Vec<WalletAddress>,
    requested: Result<Vec<WalletAddress>, WalletError>,
    switch_result: Result<(), WalletError>,
    calls: StdMutex<Vec<&'static str>>,
}

impl FakeWallet {
    fn on_chain(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            authorized: Vec::new(),
            requested: Ok(vec![addr("a1"), addr("a2")]),
            switch_result: Ok(()),
            calls: StdMutex::new(Vec::new()),
        }
    }

    fn with_authorized(mut self, accounts: Vec<WalletAddress>) -> Self {
        self.authorized = accounts;
        self
    }

    fn rejecting_switch(mut self) -> Self {
        self.switch_result = Err(WalletError::UserRejected("User rejected the request.".into()));
        self
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls").clone()
    }

    fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| **call == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().expect("calls").push(name);
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        self.record("request_accounts");
        self.requested.clone()
    }

    async fn get_accounts(&self) -> Result<Vec<WalletAddress>, WalletError> {
        self.record("get_accounts");
        Ok(self.authorized.clone())
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        self.record("get_chain_id");
        Ok(self.chain_id)
    }

    async fn switch_chain(&self, _target: ChainId) -> Result<(), WalletError> {
        self.record("switch_chain");
        self.switch_result.clone()
    }

    fn signer(&self) -> SigningIdentity {
        SigningIdentity::detached()
    }
}

#[derive(Default)]
struct ContractCounters {
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    count_queries: AtomicUsize,
    mints: AtomicUsize,
}

struct FakeContract {
    address: WalletAddress,
    minted: Arc<AtomicU64>,
    counters: Arc<ContractCounters>,
    mint_result: Result<TxHash, WalletError>,
    next_id: AtomicU64,
    sinks: StdMutex<HashMap<SubscriptionId, mpsc::UnboundedSender<MintNotification>>>,
}

impl FakeContract {
    fn notify(&self, notification: MintNotification) {
        for sink in self.sinks.lock().expect("sinks").values() {
            let _ = sink.send(notification);
        }
    }
}

#[async_trait]
impl MintContract for FakeContract {
    fn address(&self) -> WalletAddress {
        self.address
    }

    async fn submit_mint(&self) -> Result<TxHash, WalletError> {
        self.counters.mints.fetch_add(1, Ordering::SeqCst);
        self.mint_result.clone()
    }

    async fn wait_until_mined(&self, hash: TxHash) -> Result<TransactionReceipt, WalletError> {
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: None,
            status: None,
        })
    }

    async fn minted_count(&self) -> Result<u64, WalletError> {
        self.counters.count_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.minted.load(Ordering::SeqCst))
    }

    fn subscribe(
        &self,
        _event: &str,
        sink: mpsc::UnboundedSender<MintNotification>,
    ) -> Result<SubscriptionId, WalletError> {
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sinks.lock().expect("sinks").insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().expect("sinks").remove(&id);
    }
}

struct FakeBinder {
    minted: Arc<AtomicU64>,
    counters: Arc<ContractCounters>,
    mint_result: Result<TxHash, WalletError>,
    bound: StdMutex<Vec<(Option<WalletAddress>, Arc<FakeContract>)>>,
}

impl FakeBinder {
    fn new(minted: u64) -> Arc<Self> {
        Self::with_mint_result(minted, Ok(tx_hash()))
    }

    fn rejecting_mints() -> Arc<Self> {
        Self::with_mint_result(
            0,
            Err(WalletError::UserRejected("User denied transaction signature.".into())),
        )
    }

    fn with_mint_result(minted: u64, mint_result: Result<TxHash, WalletError>) -> Arc<Self> {
        Arc::new(Self {
            minted: Arc::new(AtomicU64::new(minted)),
            counters: Arc::new(ContractCounters::default()),
            mint_result,
            bound: StdMutex::new(Vec::new()),
        })
    }

    fn binds(&self) -> usize {
        self.bound.lock().expect("bound").len()
    }

    fn latest(&self) -> Arc<FakeContract> {
        let bound = self.bound.lock().expect("bound");
        Arc::clone(&bound.last().expect("a bound contract").1)
    }

    fn signer_accounts(&self) -> Vec<Option<WalletAddress>> {
        self.bound
            .lock()
            .expect("bound")
            .iter()
            .map(|(account, _)| *account)
            .collect()
    }

    fn subscribes(&self) -> usize {
        self.counters.subscribes.load(Ordering::SeqCst)
    }

    fn unsubscribes(&self) -> usize {
        self.counters.unsubscribes.load(Ordering::SeqCst)
    }
}

impl ContractBinder for FakeBinder {
    fn bind(
        &self,
        target: &ContractTarget,
        signer: SigningIdentity,
    ) -> Result<Arc<dyn MintContract>, WalletError> {
        let contract = Arc::new(FakeContract {
            address: target.address,
            minted: Arc::clone(&self.minted),
            counters: Arc::clone(&self.counters),
            mint_result: self.mint_result.clone(),
            next_id: AtomicU64::new(1),
            sinks: StdMutex::new(HashMap::new()),
        });
        self.bound
            .lock()
            .expect("bound")
            .push((signer.account, Arc::clone(&contract)));
        Ok(contract)
    }
}

fn controller_with(
    wallet: Option<Arc<FakeWallet>>,
    binder: Arc<FakeBinder>,
) -> Arc<WalletSessionController> {
    let provider = wallet.map(|wallet| wallet as Arc<dyn WalletProvider>);
    WalletSessionController::new(provider, binder, options())
}

async fn next_notice(events: &mut broadcast::Receiver<SessionEvent>) -> MintNotice {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::MintNotice(notice)) => return notice,
                Ok(_) => continue,
                Err(err) => panic!("event stream closed: {err}"),
            }
        }
    })
    .await
    .expect("mint notice in time")
}

#[tokio::test]
async fn mount_without_provider_leaves_state_empty() {
    let binder = FakeBinder::new(3);
    let controller = controller_with(None, binder.clone());

    controller.mount().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.account, None);
    assert_eq!(snapshot.minted_count, 0);
    assert!(!snapshot.contract_bound);
    assert_eq!(snapshot.phase(), SessionPhase::Disconnected);
    assert_eq!(binder.binds(), 0);
    assert_eq!(
        controller.detect_existing_account().await.expect("silent"),
        None
    );
}

#[tokio::test]
async fn mount_detects_first_authorized_account_and_binds_eagerly() {
    let wallet = Arc::new(
        FakeWallet::on_chain(TARGET_CHAIN).with_authorized(vec![addr("b1"), addr("b2")]),
    );
    let binder = FakeBinder::new(4);
    let controller = controller_with(Some(wallet.clone()), binder.clone());

    controller.mount().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.account, Some(addr("b1")));
    assert_eq!(snapshot.minted_count, 4);
    assert!(snapshot.contract_bound);
    assert_eq!(snapshot.phase(), SessionPhase::Subscribed);
    assert_eq!(binder.binds(), 1);
    assert_eq!(binder.subscribes(), 1);
    assert_eq!(binder.signer_accounts(), vec![None]);
    assert_eq!(wallet.count("request_accounts"), 0);
}

#[tokio::test]
async fn mount_without_authorized_account_stays_disconnected() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(2);
    let controller = controller_with(Some(wallet), binder);

    controller.mount().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.account, None);
    assert_eq!(snapshot.minted_count, 2);
    assert!(snapshot.contract_bound);
    assert_eq!(snapshot.phase(), SessionPhase::Disconnected);
}

#[tokio::test]
async fn unavailable_binder_leaves_session_unbound() {
    let wallet = Arc::new(
        FakeWallet::on_chain(TARGET_CHAIN).with_authorized(vec![addr("b1")]),
    );
    let controller = WalletSessionController::new(
        Some(wallet as Arc<dyn WalletProvider>),
        Arc::new(MissingContractBinder),
        options(),
    );

    controller.mount().await;
    controller.connect().await.expect("connect still succeeds");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.account, Some(addr("a1")));
    assert!(!snapshot.contract_bound);
    assert_eq!(snapshot.phase(), SessionPhase::Connected);
    assert!(matches!(
        controller.mint().await,
        Err(SessionError::Precondition(_))
    ));
}

#[tokio::test]
async fn connect_on_target_chain_skips_switch() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let controller = controller_with(Some(wallet.clone()), FakeBinder::new(0));

    let account = controller.connect().await.expect("connect");

    assert_eq!(account, addr("a1"));
    assert_eq!(wallet.count("switch_chain"), 0);
    assert_eq!(wallet.calls(), vec!["get_chain_id", "request_accounts"]);
}

#[tokio::test]
async fn connect_on_other_chain_switches_once_before_requesting_accounts() {
    let wallet = Arc::new(FakeWallet::on_chain(ChainId(1)));
    let controller = controller_with(Some(wallet.clone()), FakeBinder::new(0));

    controller.connect().await.expect("connect");

    assert_eq!(
        wallet.calls(),
        vec!["get_chain_id", "switch_chain", "request_accounts"]
    );
    assert_eq!(controller.snapshot().await.account, Some(addr("a1")));
}

#[tokio::test]
async fn rejected_switch_fails_connect_without_state_change() {
    let wallet = Arc::new(FakeWallet::on_chain(ChainId(1)).rejecting_switch());
    let binder = FakeBinder::new(0);
    let controller = controller_with(Some(wallet.clone()), binder.clone());

    let err = controller.connect().await.expect_err("rejected");

    assert!(matches!(err, SessionError::UserRejected(_)));
    assert_eq!(wallet.count("request_accounts"), 0);
    assert_eq!(controller.snapshot().await.account, None);
    assert_eq!(binder.binds(), 0);
}

#[tokio::test]
async fn connect_without_provider_reports_missing_provider() {
    let controller = controller_with(None, FakeBinder::new(0));

    let err = controller.connect().await.expect_err("missing provider");

    assert_eq!(err, SessionError::MissingProvider);
    assert_eq!(controller.snapshot().await.account, None);
}

#[tokio::test]
async fn connect_with_no_returned_accounts_is_a_remote_failure() {
    let mut wallet = FakeWallet::on_chain(TARGET_CHAIN);
    wallet.requested = Ok(Vec::new());
    let controller = controller_with(Some(Arc::new(wallet)), FakeBinder::new(0));

    let err = controller.connect().await.expect_err("no accounts");
    assert!(matches!(err, SessionError::RemoteCall(_)));
}

#[tokio::test]
async fn connect_rebinds_contract_with_account_scoped_signer() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(1);
    let controller = controller_with(Some(wallet), binder.clone());
    let mut events = controller.subscribe_events();

    controller.mount().await;
    controller.connect().await.expect("connect");

    assert_eq!(binder.signer_accounts(), vec![None, Some(addr("a1"))]);
    assert_eq!(binder.subscribes(), 2);
    assert_eq!(binder.unsubscribes(), 1);
    assert_eq!(controller.snapshot().await.phase(), SessionPhase::Subscribed);

    let mut saw_account_change = false;
    while let Ok(event) = events.try_recv() {
        if event == SessionEvent::AccountChanged(addr("a1")) {
            saw_account_change = true;
        }
    }
    assert!(saw_account_change);
}

#[tokio::test]
async fn handle_replacement_pairs_every_subscribe_with_one_unsubscribe() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(0);
    let controller = controller_with(Some(wallet), binder.clone());

    controller.mount().await;
    assert_eq!((binder.subscribes(), binder.unsubscribes()), (1, 0));

    for round in 1..=3 {
        let contract = controller
            .bind_contract(SigningIdentity::detached())
            .expect("bind");
        controller.attach_contract(contract).await;
        assert_eq!(binder.subscribes(), round + 1);
        assert_eq!(binder.unsubscribes(), round);
    }

    controller.teardown().await;
    assert_eq!(binder.binds(), 4);
    assert_eq!(binder.subscribes(), 4);
    assert_eq!(binder.unsubscribes(), 4);

    controller.teardown().await;
    assert_eq!(binder.unsubscribes(), 4);
}

#[tokio::test]
async fn teardown_keeps_displayed_state() {
    let wallet = Arc::new(
        FakeWallet::on_chain(TARGET_CHAIN).with_authorized(vec![addr("b1")]),
    );
    let controller = controller_with(Some(wallet), FakeBinder::new(9));

    controller.mount().await;
    controller.teardown().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.account, Some(addr("b1")));
    assert_eq!(snapshot.minted_count, 9);
    assert!(!snapshot.contract_bound);
    assert_eq!(snapshot.phase(), SessionPhase::Connected);
}

#[tokio::test]
async fn mint_notification_refreshes_count_and_links_token() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(6);
    let controller = controller_with(Some(wallet), binder.clone());
    controller.mount().await;
    let queries_before = binder.counters.count_queries.load(Ordering::SeqCst);

    binder.minted.store(7, Ordering::SeqCst);
    let notice = controller
        .on_mint_notification(addr("ab"), TokenId::from(7))
        .await;

    assert_eq!(
        binder.counters.count_queries.load(Ordering::SeqCst),
        queries_before + 1
    );
    assert_eq!(controller.snapshot().await.minted_count, 7);
    assert!(notice.message.contains('7'));
    assert!(notice
        .message
        .contains(&controller.contract_address().to_string()));
    assert_eq!(
        notice.viewer_url,
        format!(
            "https://testnets.opensea.io/assets/{}/7",
            controller.contract_address()
        )
    );
}

#[tokio::test]
async fn subscribed_event_flows_into_a_mint_notice() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(0);
    let controller = controller_with(Some(wallet), binder.clone());
    controller.mount().await;
    let mut events = controller.subscribe_events();

    binder.minted.store(1, Ordering::SeqCst);
    binder.latest().notify(MintNotification {
        from: addr("ab"),
        token_id: TokenId::from(0),
    });

    let notice = next_notice(&mut events).await;
    assert_eq!(notice.token_id, TokenId::from(0));
    assert_eq!(notice.from, addr("ab"));
    assert_eq!(controller.snapshot().await.minted_count, 1);
}

#[tokio::test]
async fn mint_without_contract_is_a_precondition_failure() {
    let controller = controller_with(None, FakeBinder::new(0));

    let err = controller.mint().await.expect_err("no contract");
    assert!(matches!(err, SessionError::Precondition(_)));

    let err = controller
        .refresh_minted_count()
        .await
        .expect_err("no contract");
    assert!(matches!(err, SessionError::Precondition(_)));
}

#[tokio::test]
async fn mint_submits_and_waits_without_touching_count() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::new(5);
    let controller = controller_with(Some(wallet), binder.clone());
    controller.mount().await;
    let mut events = controller.subscribe_events();

    binder.minted.store(6, Ordering::SeqCst);
    let hash = controller.mint().await.expect("mint");

    assert_eq!(hash, tx_hash());
    assert_eq!(binder.counters.mints.load(Ordering::SeqCst), 1);
    assert_eq!(controller.snapshot().await.minted_count, 5);
    assert_eq!(
        events.try_recv().expect("submitted"),
        SessionEvent::MintSubmitted { hash }
    );
    assert_eq!(
        events.try_recv().expect("mined"),
        SessionEvent::MintMined {
            hash,
            explorer_url: format!("https://goerli.etherscan.io/tx/{hash}"),
        }
    );
}

#[tokio::test]
async fn rejected_mint_surfaces_typed_error() {
    let wallet = Arc::new(FakeWallet::on_chain(TARGET_CHAIN));
    let binder = FakeBinder::rejecting_mints();
    let controller = controller_with(Some(wallet), binder);
    controller.mount().await;

    let err = controller.mint().await.expect_err("rejected");
    assert!(matches!(err, SessionError::UserRejected(_)));
}

#[test]
fn wallet_errors_map_to_session_taxonomy() {
    assert_eq!(
        SessionError::from(WalletError::UserRejected("no".into())),
        SessionError::UserRejected("no".into())
    );
    assert!(matches!(
        SessionError::from(WalletError::Transport("refused".into())),
        SessionError::RemoteCall(message) if message.contains("refused")
    ));
}
