mod backend_bridge;
mod controller;
mod ui;

use std::path::PathBuf;

use clap::Parser;
use client_core::config::{load_settings_from, DEFAULT_SETTINGS_FILE};
use crossbeam_channel::bounded;
use eframe::egui;

use backend_bridge::commands::BackendCommand;
use controller::events::UiEvent;
use ui::{FooterLink, MinterApp};

#[derive(Parser, Debug)]
#[command(name = "desktop_gui", about = "NFT minter desktop window")]
struct Args {
    /// Settings file overlaid on the built-in defaults.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Wallet JSON-RPC endpoint; pass an empty string to run without a wallet.
    #[arg(long)]
    wallet_rpc_url: Option<String>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let mut settings = load_settings_from(&args.config);
    if let Some(url) = args.wallet_rpc_url {
        settings.wallet_rpc_url = url;
    }

    let total_mint_count = settings.total_mint_count;
    let footer = FooterLink {
        handle: settings.twitter_handle.clone(),
        url: settings.twitter_link(),
    };

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(1024);
    backend_bridge::runtime::launch(settings, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("My NFT Collection")
            .with_inner_size([720.0, 560.0])
            .with_min_inner_size([480.0, 420.0]),
        ..Default::default()
    };
    eframe::run_native(
        "My NFT Collection",
        options,
        Box::new(move |_cc| {
            Ok(Box::new(MinterApp::new(
                cmd_tx,
                ui_rx,
                total_mint_count,
                footer,
            )))
        }),
    )
}
