//! Backend for the task board desktop app.
//!
//! - [`progress`]: decodes `CLAUDE_MD_PROGRESS:` lines from runner stdout
//! - [`runner`]: runs one helper process end to end
//! - [`generate`]: CLAUDE.md existence checks and generation
//! - [`manager`]: PR-status monitoring for tasks
//! - [`ipc`]: request/notification/event relay between UI and backend
//! - [`preload`]: typed client API over the relay
//! - [`server`]: HTTP/WebSocket transport for the relay

pub mod config;
pub mod errors;
pub mod generate;
pub mod ipc;
pub mod logging;
pub mod manager;
pub mod preload;
pub mod progress;
pub mod runner;
pub mod secrets;
pub mod server;
