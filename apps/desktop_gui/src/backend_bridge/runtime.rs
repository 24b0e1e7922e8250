//! Runtime bridge between UI command queue and backend event intake.

use std::{sync::Arc, thread};

use client_core::{
    config::{build_session, Settings},
    SessionError, WalletSessionController,
};
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast::error::RecvError;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(run_worker(settings, cmd_rx, ui_tx));
    });
}

async fn run_worker(settings: Settings, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    let controller = match build_session(&settings) {
        Ok(controller) => controller,
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("backend worker startup failure: {err:#}"),
            )));
            tracing::error!("failed to build wallet session: {err:#}");
            return;
        }
    };

    let mut events = controller.subscribe_events();
    let events_tx = ui_tx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let _ = events_tx.try_send(UiEvent::from(event));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ui event forwarder lagged behind session events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    controller.mount().await;
    let _ = ui_tx.try_send(UiEvent::BackendReady {
        provider_detected: settings.has_wallet_provider(),
    });

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            BackendCommand::Connect => {
                tokio::spawn(connect(Arc::clone(&controller), ui_tx.clone()));
            }
            BackendCommand::Mint => {
                tokio::spawn(mint(Arc::clone(&controller), ui_tx.clone()));
            }
            BackendCommand::Shutdown => {
                tracing::info!("backend worker shutting down");
                break;
            }
        }
    }

    controller.teardown().await;
    event_task.abort();
}

async fn connect(controller: Arc<WalletSessionController>, ui_tx: Sender<UiEvent>) {
    if let Err(err) = controller.connect().await {
        if err != SessionError::MissingProvider {
            tracing::warn!("connect failed: {err}");
        }
        let _ = ui_tx.try_send(UiEvent::Error(UiError::from_session(
            UiErrorContext::Connect,
            &err,
        )));
    }
    let _ = ui_tx.try_send(UiEvent::ConnectFinished);
}

async fn mint(controller: Arc<WalletSessionController>, ui_tx: Sender<UiEvent>) {
    if let Err(err) = controller.mint().await {
        tracing::warn!("mint failed: {err}");
        let _ = ui_tx.try_send(UiEvent::Error(UiError::from_session(
            UiErrorContext::Mint,
            &err,
        )));
    }
    let _ = ui_tx.try_send(UiEvent::MintFinished);
}
