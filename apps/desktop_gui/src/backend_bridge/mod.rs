//! Bridge between the egui thread and the tokio worker hosting the wallet session.

pub mod commands;
pub mod runtime;
