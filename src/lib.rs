//! # Codebox
//!
//! A "run this snippet safely" backend built with Rust.
//!
//! Accepts untrusted source code over an HTTP API and executes it inside an
//! ephemeral, resource-bounded Docker container, returning captured output.
//!
//! ## Features
//!
//! - **Ephemeral Isolation:** One container per request, force-removed on
//!   every exit path, including timeouts and client disconnects
//! - **Resource Envelope:** CPU, memory, pid, and file-descriptor caps with
//!   no network access
//! - **Live Output Capture:** Partial output survives timeouts and OOM kills
//! - **Admission Control:** Per-client sliding-window rate limiting

pub mod audit;
pub mod config;
pub mod error;
pub mod language;
pub mod limiter;
pub mod sandbox;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
