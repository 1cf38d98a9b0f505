// ABOUTME: Library root for convoy - exposes the orchestrator and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod alert;
pub mod config;
pub mod deploy;
pub mod error;
pub mod health;
pub mod history;
pub mod http;
pub mod output;
pub mod provision;
pub mod registry;
pub mod secrets;
pub mod types;
