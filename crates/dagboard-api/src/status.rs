//! Host status endpoints (admin only).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ApiClient;
use crate::errors::Result;

/// CPU section of the load summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuLoad {
    /// Overall utilization in percent.
    #[serde(default)]
    pub usage: f64,
    /// Physical cores.
    #[serde(default)]
    pub cores: Option<u32>,
    /// Logical cores.
    #[serde(default)]
    pub logical_cores: Option<u32>,
}

/// Memory or disk usage with human-readable sizes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Total size.
    #[serde(default)]
    pub total: String,
    /// Used size.
    #[serde(default)]
    pub used: String,
    /// Available memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<String>,
    /// Free disk space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<String>,
    /// Used share in percent.
    #[serde(default)]
    pub percent: f64,
}

/// `GET /api/status/system_status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemLoad {
    /// CPU.
    #[serde(default)]
    pub cpu: CpuLoad,
    /// Memory.
    #[serde(default)]
    pub memory: Usage,
    /// Root filesystem.
    #[serde(default)]
    pub disk: Usage,
}

/// `GET /api/status/docker`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerStatus {
    /// Engine summary.
    #[serde(default)]
    pub host: Value,
    /// Per-container details.
    #[serde(default)]
    pub containers: Vec<Value>,
    /// Set when the engine could not be queried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiClient {
    /// Full host description (hardware, network, processes).
    pub async fn system_info(&self) -> Result<Value> {
        self.get_json("/api/status/system").await
    }

    /// CPU, memory and disk load.
    pub async fn system_load(&self) -> Result<SystemLoad> {
        self.get_json("/api/status/system_status").await
    }

    /// Docker engine and container state.
    pub async fn docker_status(&self) -> Result<DockerStatus> {
        self.get_json("/api/status/docker").await
    }

    /// Short plain-text host summary.
    pub async fn status_text(&self) -> Result<String> {
        self.get_text("/api/status/plain").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
