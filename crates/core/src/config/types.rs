use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Working storage configuration.
///
/// Every job gets its own subdirectory under `work_dir`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// How long a finished job's files are kept before being reclaimed.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// Interval between retention sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Reclaim a job's files as soon as its result has been fully downloaded.
    #[serde(default = "default_true")]
    pub remove_after_download: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            retention_secs: default_retention(),
            sweep_interval_secs: default_sweep_interval(),
            remove_after_download: true,
        }
    }
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("pressroom")
}

fn default_retention() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Remote fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Size of the chunks written to disk; one progress report per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Abort the transfer when no bytes arrive for this long.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
    /// Upper bound on the size of a source document.
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,
    /// Reject responses whose Content-Type does not mention pdf.
    #[serde(default = "default_true")]
    pub require_pdf_content_type: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
            stall_timeout_secs: default_stall_timeout(),
            max_size_bytes: default_max_size(),
            require_pdf_content_type: true,
            user_agent: default_user_agent(),
        }
    }
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_stall_timeout() -> u64 {
    30
}

fn default_max_size() -> u64 {
    500 * 1024 * 1024
}

fn default_user_agent() -> String {
    concat!("pressroom/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Job coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Jobs running at the same time; the rest wait in `queued`.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,
    /// Per-job broadcast buffer. Subscribers that fall further behind get a replay.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_event_buffer() -> usize {
    256
}
