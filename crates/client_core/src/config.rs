use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use alloy_primitives::Address;
use anyhow::Context;
use shared::domain::{ChainId, WalletAddress};
use tracing::warn;
use wallet_integration::{
    ContractAbi, ContractTarget, Eip1193Wallet, HttpRpcTransport, RpcContractBinder,
    WalletProvider,
};

use crate::{NoticeLinks, SessionOptions, WalletSessionController};

pub const DEFAULT_SETTINGS_FILE: &str = "minter.toml";

const BUNDLED_CONTRACT_ABI: &str = include_str!("../contract/EpicNFT.json");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Empty means no wallet provider is available.
    pub wallet_rpc_url: String,
    pub target_chain_id: ChainId,
    /// Zero until configured; there is no deployment to fall back to.
    pub contract_address: WalletAddress,
    pub contract_abi_path: Option<PathBuf>,
    pub mint_function: String,
    pub count_function: String,
    pub mint_event: String,
    pub total_mint_count: u64,
    pub viewer_base_url: String,
    pub explorer_tx_base_url: String,
    pub twitter_handle: String,
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wallet_rpc_url: "http://127.0.0.1:1248".into(),
            target_chain_id: ChainId(5),
            contract_address: WalletAddress(Address::ZERO),
            contract_abi_path: None,
            mint_function: "makeAnEpicNFT".into(),
            count_function: "getNFTsMinted".into(),
            mint_event: "NewEpicNFTMinted".into(),
            total_mint_count: 20,
            viewer_base_url: "https://testnets.opensea.io/assets".into(),
            explorer_tx_base_url: "https://goerli.etherscan.io/tx".into(),
            twitter_handle: "_buildspace".into(),
            poll_interval_ms: 2_000,
        }
    }
}

impl Settings {
    pub fn has_wallet_provider(&self) -> bool {
        !self.wallet_rpc_url.trim().is_empty()
    }

    pub fn has_contract_address(&self) -> bool {
        self.contract_address.0 != Address::ZERO
    }

    pub fn twitter_link(&self) -> String {
        format!("https://twitter.com/{}", self.twitter_handle)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn load_contract_abi(&self) -> anyhow::Result<ContractAbi> {
        let document = match &self.contract_abi_path {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read contract ABI '{}'", path.display()))?,
            None => BUNDLED_CONTRACT_ABI.to_string(),
        };
        ContractAbi::from_json(&document).context("failed to parse contract ABI")
    }

    pub fn contract_target(&self) -> anyhow::Result<ContractTarget> {
        Ok(ContractTarget {
            chain_id: self.target_chain_id,
            address: self.contract_address,
            abi: Arc::new(self.load_contract_abi()?),
            mint_function: self.mint_function.clone(),
            count_function: self.count_function.clone(),
        })
    }

    pub fn session_options(&self) -> anyhow::Result<SessionOptions> {
        Ok(SessionOptions {
            target: self.contract_target()?,
            mint_event: self.mint_event.clone(),
            links: NoticeLinks {
                viewer_base_url: self.viewer_base_url.clone(),
                explorer_tx_base_url: self.explorer_tx_base_url.clone(),
            },
        })
    }

    /// `None` when no wallet RPC URL is configured.
    pub fn wallet_provider(&self) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
        if !self.has_wallet_provider() {
            return Ok(None);
        }
        let transport = HttpRpcTransport::new(self.wallet_rpc_url.trim())?;
        Ok(Some(Arc::new(Eip1193Wallet::new(Arc::new(transport)))))
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        let applied = match key {
            "wallet_rpc_url" => {
                self.wallet_rpc_url = value.to_string();
                true
            }
            "target_chain_id" => assign_parsed(&mut self.target_chain_id, value),
            "contract_address" => assign_parsed(&mut self.contract_address, value),
            "contract_abi_path" => {
                self.contract_abi_path = (!value.is_empty()).then(|| PathBuf::from(value));
                true
            }
            "mint_function" => assign_non_empty(&mut self.mint_function, value),
            "count_function" => assign_non_empty(&mut self.count_function, value),
            "mint_event" => assign_non_empty(&mut self.mint_event, value),
            "total_mint_count" => assign_parsed(&mut self.total_mint_count, value),
            "viewer_base_url" => assign_non_empty(&mut self.viewer_base_url, value),
            "explorer_tx_base_url" => assign_non_empty(&mut self.explorer_tx_base_url, value),
            "twitter_handle" => assign_non_empty(&mut self.twitter_handle, value),
            "poll_interval_ms" => assign_parsed(&mut self.poll_interval_ms, value),
            _ => {
                warn!(key, "config: ignoring unknown setting");
                return;
            }
        };
        if !applied {
            warn!(key, value, "config: ignoring invalid value");
        }
    }
}

const SETTING_KEYS: &[&str] = &[
    "wallet_rpc_url",
    "target_chain_id",
    "contract_address",
    "contract_abi_path",
    "mint_function",
    "count_function",
    "mint_event",
    "total_mint_count",
    "viewer_base_url",
    "explorer_tx_base_url",
    "twitter_handle",
    "poll_interval_ms",
];

fn assign_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

fn assign_non_empty(slot: &mut String, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    *slot = value.to_string();
    true
}

/// Wires the HTTP wallet provider and RPC contract binder into a controller.
pub fn build_session(settings: &Settings) -> anyhow::Result<Arc<WalletSessionController>> {
    if !settings.has_contract_address() {
        warn!(
            "config: contract_address must be configured (set it in {DEFAULT_SETTINGS_FILE} or MINTER_CONTRACT_ADDRESS)"
        );
    }
    let options = settings.session_options()?;
    let provider = settings.wallet_provider()?;
    let binder = Arc::new(RpcContractBinder::new(settings.poll_interval()));
    Ok(WalletSessionController::new(provider, binder, options))
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

/// Defaults, then the TOML file (if readable), then `MINTER_*` and `APP__*`
/// environment variables.
pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match parse_settings_file(&raw) {
            Ok(file_cfg) => {
                for (key, value) in file_cfg {
                    settings.apply(&key, &value);
                }
            }
            Err(err) => warn!(path = %path.display(), "config: failed to parse settings file: {err}"),
        }
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

fn parse_settings_file(raw: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let table = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                toml::Value::String(value) => value,
                toml::Value::Integer(value) => value.to_string(),
                toml::Value::Boolean(value) => value.to_string(),
                _ => {
                    warn!(key = %key, "config: only string, integer and boolean settings are supported");
                    return None;
                }
            };
            Some((key, value))
        })
        .collect())
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in SETTING_KEYS {
        let upper = key.to_ascii_uppercase();
        for name in [format!("MINTER_{upper}"), format!("APP__{upper}")] {
            if let Some(value) = lookup(&name) {
                settings.apply(key, &value);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
