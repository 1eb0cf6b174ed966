//! Row models with their queries.

pub mod firmware;
pub mod webhook;

pub use firmware::Firmware;
pub use webhook::{NewWebhook, Webhook};
