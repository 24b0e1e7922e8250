//! View state for the minter window and the transitions driven by `UiEvent`s.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use shared::domain::{TxHash, WalletAddress};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiErrorContext, UiEvent};

const ACTIVITY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    MintNotice { message: String, viewer_url: String },
    MissingWallet,
}

impl Modal {
    pub fn title(&self) -> &'static str {
        match self {
            Self::MintNotice { .. } => "NFT minted",
            Self::MissingWallet => "Get a wallet!",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::MintNotice { message, .. } => message,
            Self::MissingWallet => {
                "No wallet provider was detected. Start a wallet that exposes a JSON-RPC endpoint and relaunch."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Connect,
    Mint,
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub at: DateTime<Local>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MinterViewState {
    pub provider_detected: Option<bool>,
    pub account: Option<WalletAddress>,
    pub contract: Option<WalletAddress>,
    pub minted_count: u64,
    pub total_mint_count: u64,
    pub connect_pending: bool,
    pub mint_pending: bool,
    pub last_explorer_url: Option<String>,
    pub status: String,
    pub modal: Option<Modal>,
    pub activity: VecDeque<ActivityEntry>,
}

impl MinterViewState {
    pub fn new(total_mint_count: u64) -> Self {
        Self {
            provider_detected: None,
            account: None,
            contract: None,
            minted_count: 0,
            total_mint_count,
            connect_pending: false,
            mint_pending: false,
            last_explorer_url: None,
            status: "Starting wallet session...".to_string(),
            modal: None,
            activity: VecDeque::new(),
        }
    }

    pub fn counter_text(&self) -> String {
        format!("{}/{}", self.minted_count, self.total_mint_count)
    }

    pub fn primary_action(&self) -> PrimaryAction {
        if self.account.is_some() {
            PrimaryAction::Mint
        } else {
            PrimaryAction::Connect
        }
    }

    pub fn primary_enabled(&self) -> bool {
        match self.primary_action() {
            PrimaryAction::Connect => !self.connect_pending,
            PrimaryAction::Mint => !self.mint_pending,
        }
    }

    /// Marks a command as queued so the matching button is disabled until it finishes.
    pub fn begin(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Connect => {
                self.connect_pending = true;
                self.status = "Waiting for wallet approval...".to_string();
            }
            BackendCommand::Mint => {
                self.mint_pending = true;
                self.status = "Going to pop wallet now to pay gas...".to_string();
            }
            BackendCommand::Shutdown => {}
        }
    }

    pub fn dismiss_modal(&mut self) {
        self.modal = None;
    }

    pub fn apply(&mut self, event: UiEvent, at: DateTime<Local>) {
        match event {
            UiEvent::Info(message) => {
                self.status = message;
            }
            UiEvent::BackendReady { provider_detected } => {
                self.provider_detected = Some(provider_detected);
                self.status = self.idle_status();
            }
            UiEvent::AccountChanged(account) => {
                self.account = Some(account);
                self.status = self.idle_status();
                self.log(at, format!("account {account}"));
            }
            UiEvent::ContractBound(address) => {
                self.contract = Some(address);
            }
            UiEvent::MintedCountChanged(count) => {
                self.minted_count = count;
            }
            UiEvent::ConnectFinished => {
                self.connect_pending = false;
            }
            UiEvent::MintSubmitted(hash) => {
                self.status = "Mining...please wait.".to_string();
                self.log(at, format!("submitted {hash}"));
            }
            UiEvent::MintMined { hash, explorer_url } => {
                self.status = format!("Mined, see transaction: {explorer_url}");
                self.log(at, format!("mined {hash}"));
                self.last_explorer_url = Some(explorer_url);
            }
            UiEvent::MintFinished => {
                self.mint_pending = false;
            }
            UiEvent::MintNotice(notice) => {
                self.log(at, format!("token #{} minted by {}", notice.token_id, notice.from));
                self.modal = Some(Modal::MintNotice {
                    message: notice.message,
                    viewer_url: notice.viewer_url,
                });
            }
            UiEvent::Error(err) => {
                match err.context() {
                    UiErrorContext::Connect => self.connect_pending = false,
                    UiErrorContext::Mint => self.mint_pending = false,
                    UiErrorContext::BackendStartup | UiErrorContext::General => {}
                }
                // Only a missing wallet on connect is shown to the user.
                tracing::debug!(
                    category = ?err.category(),
                    context = ?err.context(),
                    "ui: session error: {}",
                    err.message()
                );
                if err.is_blocking() {
                    self.modal = Some(Modal::MissingWallet);
                }
                self.status = match err.context() {
                    UiErrorContext::BackendStartup => "Wallet session unavailable".to_string(),
                    _ => self.idle_status(),
                };
            }
        }
    }

    fn idle_status(&self) -> String {
        match (self.account, self.provider_detected) {
            (Some(account), _) => format!("Connected as {account}"),
            (None, Some(false)) => "Make sure you have a wallet running".to_string(),
            (None, _) => "Wallet session ready".to_string(),
        }
    }

    fn log(&mut self, at: DateTime<Local>, text: String) {
        if self.activity.len() == ACTIVITY_LIMIT {
            self.activity.pop_front();
        }
        self.activity.push_back(ActivityEntry { at, text });
    }
}

#[cfg(test)]
#[path = "../tests/reducer_tests.rs"]
mod tests;
