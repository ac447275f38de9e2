pub mod config;
pub mod controller;
pub mod crd;
pub mod server;
pub mod webhook;

#[cfg(test)]
mod testing;

// Re-export for main.rs
pub use crate::controller::{error_policy, reconcile, Context, ReconcileError};
