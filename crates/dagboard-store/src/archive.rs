//! Server log archive and error reports.
//!
//! The archive is browsed lazily: `/api/logs/tree` lists years, and each
//! deeper call (`/y`, `/y/m`, `/y/m/d`) fills in one more level of the
//! year → month → day → hour-file tree. Hour files are read as lines.

use std::collections::BTreeMap;
use std::sync::Arc;

use dagboard_api::ApiClient;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, StoreError};
use crate::template::value_text;

/// Days of a month: day → hour files (empty until the day is fetched).
pub type Days = BTreeMap<String, Vec<HourFile>>;
/// Months of a year.
pub type Months = BTreeMap<String, Days>;
/// The whole archive tree: year → month → day → hour files.
pub type LogTree = BTreeMap<String, Months>;

/// One hourly log file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourFile {
    /// Hour of the day.
    #[serde(deserialize_with = "as_text")]
    pub hour: String,
    /// File size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Number of lines.
    #[serde(default)]
    pub lines: u64,
}

fn as_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(value_text(&Value::deserialize(deserializer)?))
}

/// Address of one hour file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HourRef {
    /// Year.
    pub year: String,
    /// Month.
    pub month: String,
    /// Day.
    pub day: String,
    /// Hour.
    pub hour: String,
}

/// Lazily loaded log archive.
pub struct LogArchive {
    api: Arc<ApiClient>,
    tree: RwLock<LogTree>,
    lines: RwLock<Vec<String>>,
}

impl LogArchive {
    /// Empty archive view.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            tree: RwLock::new(LogTree::new()),
            lines: RwLock::new(Vec::new()),
        }
    }

    /// Load the children of `level` (`[]`, `[y]`, `[y, m]` or `[y, m, d]`).
    ///
    /// Already loaded subtrees are kept.
    pub async fn fetch_tree(&self, level: &[&str]) -> Result<()> {
        if level.len() > 3 {
            return Err(StoreError::Payload(format!("log tree has 4 levels, got {}", level.len() + 1)));
        }
        let mut path = String::from("/api/logs/tree");
        for part in level {
            path.push('/');
            path.push_str(part);
        }
        let entries: Vec<Value> = self.api.get_json(&path).await.inspect_err(|e| {
            warn!(path = %path, error = %e, "log tree fetch failed");
        })?;

        let mut tree = self.tree.write();
        match level {
            [] => {
                for year in &entries {
                    let _ = tree.entry(value_text(year)).or_default();
                }
            }
            [year] => {
                let months = tree.entry((*year).to_string()).or_default();
                for month in &entries {
                    let _ = months.entry(value_text(month)).or_default();
                }
            }
            [year, month] => {
                let days = tree
                    .entry((*year).to_string())
                    .or_default()
                    .entry((*month).to_string())
                    .or_default();
                for day in &entries {
                    let _ = days.entry(value_text(day)).or_default();
                }
            }
            [year, month, day] => {
                let files = entries
                    .into_iter()
                    .map(HourFile::deserialize)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| StoreError::Payload(e.to_string()))?;
                let _ = tree
                    .entry((*year).to_string())
                    .or_default()
                    .entry((*month).to_string())
                    .or_default()
                    .insert((*day).to_string(), files);
            }
            _ => {}
        }
        debug!(path = %path, "log tree level loaded");
        Ok(())
    }

    /// Snapshot of the loaded tree.
    pub fn tree(&self) -> LogTree {
        self.tree.read().clone()
    }

    /// Read the lines of `hour`, or of the newest file when `None`.
    pub async fn fetch_lines(&self, hour: Option<&HourRef>) -> Result<Vec<String>> {
        let path = match hour {
            Some(h) => format!("/api/logs/get/{}/{}/{}/{}", h.year, h.month, h.day, h.hour),
            None => "/api/logs/last".to_string(),
        };
        let body: Value = self.api.get_json(&path).await.inspect_err(|e| {
            warn!(path = %path, error = %e, "log fetch failed");
        })?;
        let lines = match body {
            Value::Array(items) => items.iter().map(value_text).collect(),
            Value::String(text) => text.split('\n').map(str::to_string).collect(),
            other => return Err(StoreError::Payload(format!("unexpected log body: {other}"))),
        };
        self.lines.write().clone_from(&lines);
        Ok(lines)
    }

    /// Lines of the last fetched file.
    pub fn lines(&self) -> Vec<String> {
        self.lines.read().clone()
    }
}

/// Error report browser.
pub struct ErrorReports {
    api: Arc<ApiClient>,
    groups: RwLock<Vec<Value>>,
}

impl ErrorReports {
    /// Empty browser.
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            groups: RwLock::new(Vec::new()),
        }
    }

    /// Load the report groups.
    pub async fn fetch_groups(&self) -> Result<Vec<Value>> {
        let groups: Vec<Value> = self.api.get_json("/api/errors").await?;
        self.groups.write().clone_from(&groups);
        Ok(groups)
    }

    /// Groups from the last fetch.
    pub fn groups(&self) -> Vec<Value> {
        self.groups.read().clone()
    }

    /// Plain-text content of report `file` in `group`.
    pub async fn fetch_report(&self, group: &str, file: &str) -> Result<String> {
        Ok(self.api.get_text(&format!("/api/errors/{group}/{file}")).await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
