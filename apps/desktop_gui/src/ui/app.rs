//! Minter window: header, counter, connect/mint action, notices and footer.

use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::UiEvent,
    orchestration::dispatch_backend_command,
    reducer::{Modal, MinterViewState, PrimaryAction},
};

pub struct FooterLink {
    pub handle: String,
    pub url: String,
}

pub struct MinterApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    state: MinterViewState,
    footer: FooterLink,
    shutdown_sent: bool,
}

impl MinterApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        total_mint_count: u64,
        footer: FooterLink,
    ) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            state: MinterViewState::new(total_mint_count),
            footer,
            shutdown_sent: false,
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.state.apply(event, Local::now());
        }
    }

    fn send(&mut self, cmd: BackendCommand) {
        if dispatch_backend_command(&self.cmd_tx, cmd, &mut self.state.status) {
            self.state.begin(cmd);
        }
    }

    fn shutdown_backend(&mut self) {
        if self.shutdown_sent {
            return;
        }
        self.shutdown_sent = true;
        let mut status = String::new();
        dispatch_backend_command(&self.cmd_tx, BackendCommand::Shutdown, &mut status);
    }

    fn show_header(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.label(
            egui::RichText::new("My NFT Collection")
                .size(40.0)
                .strong()
                .color(egui::Color32::from_rgb(53, 174, 241)),
        );
        ui.label(
            egui::RichText::new("Each unique. Each beautiful. Discover your NFT today.")
                .size(20.0),
        );
        ui.add_space(8.0);
        ui.label(
            egui::RichText::new(format!("NFTs minted: {}", self.state.counter_text()))
                .size(18.0)
                .monospace(),
        );
        if let Some(contract) = self.state.contract {
            ui.weak(format!("contract {contract}"));
        }
        if self.state.provider_detected == Some(false) {
            ui.weak("No wallet RPC endpoint configured");
        }
        ui.add_space(16.0);
    }

    fn show_primary_action(&mut self, ui: &mut egui::Ui) {
        let (label, cmd) = match self.state.primary_action() {
            PrimaryAction::Connect => ("Connect to Wallet", BackendCommand::Connect),
            PrimaryAction::Mint => ("Mint NFT", BackendCommand::Mint),
        };
        let button = egui::Button::new(egui::RichText::new(label).size(18.0).strong())
            .min_size(egui::vec2(220.0, 44.0))
            .corner_radius(8.0);
        if ui.add_enabled(self.state.primary_enabled(), button).clicked() {
            self.send(cmd);
        }

        if let Some(url) = &self.state.last_explorer_url {
            ui.add_space(6.0);
            ui.hyperlink_to("View last transaction", url);
        }
    }

    fn show_activity(&self, ui: &mut egui::Ui) {
        if self.state.activity.is_empty() {
            return;
        }
        ui.add_space(16.0);
        egui::Frame::NONE
            .fill(ui.visuals().faint_bg_color)
            .corner_radius(10.0)
            .inner_margin(egui::Margin::symmetric(12, 8))
            .show(ui, |ui| {
                egui::ScrollArea::vertical()
                    .max_height(140.0)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for entry in &self.state.activity {
                            ui.horizontal(|ui| {
                                ui.weak(entry.at.format("%H:%M:%S").to_string());
                                ui.label(&entry.text);
                            });
                        }
                    });
            });
    }

    fn show_modal(&mut self, ctx: &egui::Context) {
        let Some(modal) = self.state.modal.clone() else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(modal.title())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_max_width(420.0);
                ui.label(modal.body());
                if let Modal::MintNotice { viewer_url, .. } = &modal {
                    ui.hyperlink_to("Open on OpenSea", viewer_url);
                }
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.state.dismiss_modal();
        }
    }
}

impl eframe::App for MinterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        if ctx.input(|input| input.viewport().close_requested()) {
            self.shutdown_backend();
        }

        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(6.0);
                ui.hyperlink_to(format!("built on @{}", self.footer.handle), &self.footer.url);
                ui.weak(&self.state.status);
                ui.add_space(6.0);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                self.show_header(ui);
                self.show_primary_action(ui);
                self.show_activity(ui);
            });
        });

        self.show_modal(ctx);

        if self.state.connect_pending || self.state.mint_pending {
            ctx.request_repaint_after(std::time::Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

impl Drop for MinterApp {
    fn drop(&mut self) {
        self.shutdown_backend();
    }
}
