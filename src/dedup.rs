//! Last-delivered-link store.
//!
//! One human-readable JSON object maps each source key to the URL of the
//! last article successfully delivered for it:
//!
//! ```json
//! {
//!   "ajansspor-futbol": "https://ajansspor.com/haber/ornek-123"
//! }
//! ```
//!
//! A missing or unreadable file loads as empty history. That can cause one
//! re-delivery per source but never blocks a run. Writes go through a sibling
//! temp file and a rename, and happen right after each successful delivery.

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl DedupStore {
    /// Load the store at `path`. Never fails: missing and corrupt files both
    /// mean "no history".
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => {
                    info!(sources = entries.len(), "Loaded delivery history");
                    entries
                }
                Err(e) => {
                    warn!(error = %e, "Delivery history is corrupt; starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No delivery history yet; first run");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(error = %e, "Cannot read delivery history; starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn last_delivered(&self, source_key: &str) -> Option<&str> {
        self.entries.get(source_key).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Record `url` as delivered for `source_key` and persist immediately.
    ///
    /// Call only after the channel confirmed the delivery. On a write error the
    /// in-memory entry is rolled back so it keeps matching the file.
    #[instrument(level = "info", skip(self))]
    pub async fn mark_delivered(&mut self, source_key: &str, url: &str) -> Result<()> {
        let previous = self
            .entries
            .insert(source_key.to_string(), url.to_string());
        if let Err(e) = self.persist().await {
            match previous {
                Some(prev) => self.entries.insert(source_key.to_string(), prev),
                None => self.entries.remove(source_key),
            };
            return Err(e);
        }
        debug!("Delivery recorded");
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
