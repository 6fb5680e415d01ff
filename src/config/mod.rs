//! Configuration module
//!
//! Split the way the rest of the codebase expects it:
//! - types.rs: configuration types with serde defaults
//! - io.rs: loading (file + environment overrides)

mod io;
mod types;

pub use io::{apply_env_overrides, load_config, load_config_from_path};
pub use types::{AuditConfig, Config, LimiterConfig, SandboxConfig, ServerConfig};
