//! Core configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Sandbox (container) configuration
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Rate limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Sandbox (container) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Host path of the shared read-only library volume
    #[serde(default = "default_library_volume")]
    pub library_volume: PathBuf,
    /// Network mode ("none" disables all network access)
    #[serde(default = "default_network")]
    pub network: String,
    /// Memory limit (and swap cap), e.g. "512m"
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    /// CPU limit (number of logical cores)
    #[serde(default = "default_cpu")]
    pub cpu_limit: f64,
    /// Concurrent task (pid) cap inside the container
    #[serde(default = "default_pids")]
    pub pids_limit: i64,
    /// Process-count ulimit
    #[serde(default = "default_nproc")]
    pub nproc_limit: i64,
    /// Open-file-descriptor ulimit
    #[serde(default = "default_nofile")]
    pub nofile_limit: i64,
    /// Per-stream captured-output cap in bytes
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Pull profile images on first use (disable on airgapped hosts)
    #[serde(default = "default_true")]
    pub pull_images: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            library_volume: default_library_volume(),
            network: default_network(),
            memory_limit: default_memory(),
            cpu_limit: default_cpu(),
            pids_limit: default_pids(),
            nproc_limit: default_nproc(),
            nofile_limit: default_nofile(),
            max_output_bytes: default_max_output(),
            pull_images: default_true(),
        }
    }
}

fn default_library_volume() -> PathBuf {
    PathBuf::from("/opt/libs")
}

fn default_network() -> String {
    "none".to_string()
}

fn default_memory() -> String {
    "512m".to_string()
}

fn default_cpu() -> f64 {
    1.0
}

fn default_pids() -> i64 {
    100
}

fn default_nproc() -> i64 {
    1024
}

fn default_nofile() -> i64 {
    1024
}

fn default_max_output() -> usize {
    1024 * 1024 // 1MB
}

fn default_true() -> bool {
    true
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admissions per key per window
    #[serde(default = "default_rate")]
    pub rate: usize,
    /// Window length
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig {
            rate: default_rate(),
            window: default_window(),
        }
    }
}

fn default_rate() -> usize {
    10
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write the execution log at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Audit log path
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: default_true(),
            path: default_audit_path(),
        }
    }
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("./codebox.log")
}
