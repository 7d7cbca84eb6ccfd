//! Command line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderName;
use clap::{Parser, ValueEnum};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable
    Text,
}

/// Kubeflow secrets gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "kubeflow-secrets", version, about, long_about = None)]
pub struct Config {
    /// Address to listen on; a bare `:port` binds all interfaces
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080", value_parser = parse_listen_addr)]
    pub listen_addr: SocketAddr,

    /// Header carrying the authenticated user, set by the trusted proxy
    #[arg(long, env = "USER_HEADER", default_value = "kubeflow-userid", value_parser = parse_header_name)]
    pub user_header: HeaderName,

    /// Header carrying the user's groups
    #[arg(long, env = "GROUPS_HEADER", default_value = "kubeflow-groups", value_parser = parse_header_name)]
    pub groups_header: HeaderName,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_PAYLOAD_BYTES", default_value_t = 1 << 20)]
    pub max_payload_bytes: usize,

    /// Connect timeout for Kubernetes API calls, in seconds
    #[arg(long, env = "KUBE_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub kube_connect_timeout_secs: u64,

    /// Read timeout for Kubernetes API calls, in seconds
    #[arg(long, env = "KUBE_READ_TIMEOUT_SECS", default_value_t = 30)]
    pub kube_read_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    /// Connect timeout as a `Duration`
    pub fn kube_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.kube_connect_timeout_secs)
    }

    /// Read timeout as a `Duration`
    pub fn kube_read_timeout(&self) -> Duration {
        Duration::from_secs(self.kube_read_timeout_secs)
    }
}

fn parse_listen_addr(value: &str) -> Result<SocketAddr, String> {
    let value = value.trim();
    let full = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };
    full.parse()
        .map_err(|e| format!("invalid listen address {value:?}: {e}"))
}

fn parse_header_name(value: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(value.trim().to_ascii_lowercase().as_bytes())
        .map_err(|e| format!("invalid header name {value:?}: {e}"))
}
