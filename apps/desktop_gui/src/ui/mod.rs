//! UI layer for the minter desktop window.

pub mod app;

pub use app::{FooterLink, MinterApp};
