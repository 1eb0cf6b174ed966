//! HTTP handlers.

pub mod firmware;
pub mod health;
pub mod webhooks;
