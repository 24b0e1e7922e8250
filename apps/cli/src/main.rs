use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{build_session, load_settings_from, Settings, DEFAULT_SETTINGS_FILE},
    MintNotice, SessionEvent, WalletSessionController,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "minter", about = "Connect a wallet and mint from the NFT collection")]
struct Cli {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Overrides the wallet JSON-RPC endpoint; empty means no wallet.
    #[arg(long)]
    wallet_rpc_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect an already-authorized account and print the collection counter.
    Status,
    /// Ask the wallet for access, switching to the target chain first if needed.
    Connect,
    /// Connect if needed, then mint one token.
    Mint {
        /// Wait for the mint event after the transaction is mined.
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value_t = 600)]
        watch_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings_from(&cli.config);
    if let Some(url) = cli.wallet_rpc_url {
        settings.wallet_rpc_url = url;
    }

    let controller = build_session(&settings)?;
    let result = match cli.command {
        Command::Status => status(&controller, &settings).await,
        Command::Connect => connect(&controller).await,
        Command::Mint {
            watch,
            watch_timeout_secs,
        } => mint(&controller, watch, Duration::from_secs(watch_timeout_secs)).await,
    };
    controller.teardown().await;
    result
}

async fn status(controller: &Arc<WalletSessionController>, settings: &Settings) -> Result<()> {
    controller.mount().await;
    let snapshot = controller.snapshot().await;

    match snapshot.account {
        Some(account) => println!("account:  {account}"),
        None => println!("account:  (not connected)"),
    }
    println!(
        "minted:   {}/{}",
        snapshot.minted_count, settings.total_mint_count
    );
    println!("contract: {}", controller.contract_address());
    println!("phase:    {:?}", snapshot.phase());
    Ok(())
}

async fn connect(controller: &Arc<WalletSessionController>) -> Result<()> {
    let account = controller.connect().await.context("connect failed")?;
    println!("connected {account}");
    Ok(())
}

async fn mint(
    controller: &Arc<WalletSessionController>,
    watch: bool,
    watch_timeout: Duration,
) -> Result<()> {
    let mut events = controller.subscribe_events();
    controller.mount().await;
    if controller.snapshot().await.account.is_none() {
        connect(controller).await?;
    }

    let hash = controller.mint().await.context("mint failed")?;
    println!("mined {hash}");

    if watch {
        let notice = tokio::time::timeout(watch_timeout, next_notice(&mut events))
            .await
            .context("timed out waiting for the mint event")??;
        println!("{}", notice.message);
    }
    Ok(())
}

async fn next_notice(events: &mut broadcast::Receiver<SessionEvent>) -> Result<MintNotice> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::MintNotice(notice)) => return Ok(notice),
            Ok(SessionEvent::MintMined { explorer_url, .. }) => {
                println!("see transaction: {explorer_url}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event stream lagged");
            }
            Err(RecvError::Closed) => bail!("session closed before a mint event arrived"),
        }
    }
}
