//! UI/backend events and error modeling for desktop GUI controller.

use client_core::{MintNotice, SessionError, SessionEvent};
use shared::domain::{TxHash, WalletAddress};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Info(String),
    Error(UiError),
    BackendReady {
        provider_detected: bool,
    },
    AccountChanged(WalletAddress),
    ContractBound(WalletAddress),
    MintedCountChanged(u64),
    ConnectFinished,
    MintSubmitted(TxHash),
    MintMined {
        hash: TxHash,
        explorer_url: String,
    },
    MintFinished,
    MintNotice(MintNotice),
}

impl From<SessionEvent> for UiEvent {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::AccountChanged(account) => Self::AccountChanged(account),
            SessionEvent::ContractBound { address } => Self::ContractBound(address),
            SessionEvent::MintedCountChanged(count) => Self::MintedCountChanged(count),
            SessionEvent::MintSubmitted { hash } => Self::MintSubmitted(hash),
            SessionEvent::MintMined { hash, explorer_url } => Self::MintMined { hash, explorer_url },
            SessionEvent::MintNotice(notice) => Self::MintNotice(notice),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    MissingWallet,
    Rejected,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Connect,
    Mint,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_session(context: UiErrorContext, err: &SessionError) -> Self {
        let category = match err {
            SessionError::MissingProvider => UiErrorCategory::MissingWallet,
            SessionError::UserRejected(_) => UiErrorCategory::Rejected,
            SessionError::RemoteCall(_) => UiErrorCategory::Transport,
            SessionError::Precondition(_) => UiErrorCategory::Validation,
        };
        Self {
            category,
            context,
            message: err.to_string(),
        }
    }

    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("rejected") || lower.contains("denied") {
            UiErrorCategory::Rejected
        } else if lower.contains("invalid") || lower.contains("missing") {
            UiErrorCategory::Validation
        } else if lower.contains("connection")
            || lower.contains("transport")
            || lower.contains("timed out")
            || lower.contains("disconnected")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Only a missing wallet on connect interrupts the user.
    pub fn is_blocking(&self) -> bool {
        self.category == UiErrorCategory::MissingWallet && self.context == UiErrorContext::Connect
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
