//! Environment-based configuration
//!
//! `IngestConfig::from_env` reads `ARROWSINK_*` variables; anything unset
//! keeps its default. `ComponentFactory` builds the catalog collaborator the
//! same way.

use crate::catalog::{CatalogClient, LocalCatalog};
use crate::ingester::{IngesterConfig, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_QUEUE_DEPTH};
use crate::remote_write::headers::DEFAULT_MAX_REQUEST_BYTES;
use crate::remote_write::{ConvertOptions, DEFAULT_BATCH_SIZE};
use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Process-wide ingestion settings
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub storage_root: PathBuf,
    pub max_buffer_bytes: usize,
    pub max_queue_depth: usize,
    pub flush_every_n_batches: usize,
    pub put_timeout: Duration,
    pub remote_write_batch_size: usize,
    pub max_request_bytes: usize,
    pub include_metadata: bool,
    pub require_catalog: bool,
    /// Account used when a request names none
    pub default_account: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            flush_every_n_batches: 10,
            put_timeout: Duration::from_secs(30),
            remote_write_batch_size: DEFAULT_BATCH_SIZE,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            include_metadata: true,
            require_catalog: false,
            default_account: "default".to_string(),
        }
    }
}

impl IngestConfig {
    /// Load from the process environment
    ///
    /// Environment variables:
    /// - ARROWSINK_STORAGE_ROOT: root directory for Parquet output (default: ./data)
    /// - ARROWSINK_MAX_BUFFER_BYTES: buffer byte cap (default: 128 MiB)
    /// - ARROWSINK_MAX_QUEUE_DEPTH: buffer batch cap (default: 100)
    /// - ARROWSINK_FLUSH_EVERY_N_BATCHES: batches per Parquet file (default: 10)
    /// - ARROWSINK_PUT_TIMEOUT_MS: backpressure timeout (default: 30000)
    /// - ARROWSINK_REMOTE_WRITE_BATCH_SIZE: rows per converted batch (default: 10000)
    /// - ARROWSINK_MAX_REQUEST_BYTES: largest remote-write body (default: 100 MiB)
    /// - ARROWSINK_INCLUDE_METADATA: merge metric metadata into rows (default: true)
    /// - ARROWSINK_REQUIRE_CATALOG: fail ingestion when registration fails (default: false)
    /// - ARROWSINK_DEFAULT_ACCOUNT: account for requests without one (default: default)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            storage_root: lookup("ARROWSINK_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            max_buffer_bytes: parse_var(&lookup, "ARROWSINK_MAX_BUFFER_BYTES")?
                .unwrap_or(defaults.max_buffer_bytes),
            max_queue_depth: parse_var(&lookup, "ARROWSINK_MAX_QUEUE_DEPTH")?
                .unwrap_or(defaults.max_queue_depth),
            flush_every_n_batches: parse_var(&lookup, "ARROWSINK_FLUSH_EVERY_N_BATCHES")?
                .unwrap_or(defaults.flush_every_n_batches),
            put_timeout: parse_var(&lookup, "ARROWSINK_PUT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.put_timeout),
            remote_write_batch_size: parse_var(&lookup, "ARROWSINK_REMOTE_WRITE_BATCH_SIZE")?
                .unwrap_or(defaults.remote_write_batch_size),
            max_request_bytes: parse_var(&lookup, "ARROWSINK_MAX_REQUEST_BYTES")?
                .unwrap_or(defaults.max_request_bytes),
            include_metadata: parse_bool(&lookup, "ARROWSINK_INCLUDE_METADATA")?
                .unwrap_or(defaults.include_metadata),
            require_catalog: parse_bool(&lookup, "ARROWSINK_REQUIRE_CATALOG")?
                .unwrap_or(defaults.require_catalog),
            default_account: lookup("ARROWSINK_DEFAULT_ACCOUNT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_account),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject zero sizes and cadences
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ARROWSINK_MAX_BUFFER_BYTES", self.max_buffer_bytes),
            ("ARROWSINK_MAX_QUEUE_DEPTH", self.max_queue_depth),
            ("ARROWSINK_FLUSH_EVERY_N_BATCHES", self.flush_every_n_batches),
            ("ARROWSINK_REMOTE_WRITE_BATCH_SIZE", self.remote_write_batch_size),
            ("ARROWSINK_MAX_REQUEST_BYTES", self.max_request_bytes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    /// Orchestrator settings
    pub fn ingester_config(&self) -> IngesterConfig {
        IngesterConfig {
            max_buffer_size_bytes: self.max_buffer_bytes,
            max_queue_depth: self.max_queue_depth,
            put_timeout: self.put_timeout,
            flush_every_n_batches: self.flush_every_n_batches,
            require_catalog: self.require_catalog,
        }
    }

    /// Remote-write conversion defaults
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            batch_size: self.remote_write_batch_size,
            include_metadata: self.include_metadata,
        }
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(self.storage_root.clone())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid {}='{}': {}", key, raw, e))),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::Config(format!(
                "Invalid {}='{}': expected true or false",
                key, raw
            ))),
        },
    }
}

/// Resolves where a dataset's Parquet files live:
/// `<root>/accounts/<account>/datasets/<dataset>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one account's dataset. Names must be a single plain
    /// path component.
    pub fn dataset_dir(&self, account_id: &str, dataset_name: &str) -> Result<PathBuf> {
        check_component("account", account_id)?;
        check_component("dataset", dataset_name)?;
        Ok(self
            .root
            .join("accounts")
            .join(account_id)
            .join("datasets")
            .join(dataset_name))
    }
}

fn check_component(kind: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if name.is_empty() || !single_normal || name.contains(&['/', '\\'][..]) {
        return Err(Error::Protocol(format!("Invalid {} name: '{}'", kind, name)));
    }
    Ok(())
}

/// Builds collaborators from the environment
pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the catalog client from environment
    ///
    /// Environment variables:
    /// - ARROWSINK_CATALOG_BACKEND: "local" (default) or "none"
    pub fn create_catalog() -> Result<Option<Arc<dyn CatalogClient>>> {
        let backend =
            std::env::var("ARROWSINK_CATALOG_BACKEND").unwrap_or_else(|_| "local".to_string());

        match backend.as_str() {
            "local" => {
                info!("Using LocalCatalog (in-memory registrations)");
                Ok(Some(Arc::new(LocalCatalog::new())))
            }
            "none" => {
                info!("Catalog registration disabled");
                Ok(None)
            }
            _ => Err(Error::Config(format!(
                "Unknown ARROWSINK_CATALOG_BACKEND: {}. Use 'local' or 'none'",
                backend
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = IngestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("./data"));
        assert_eq!(config.max_queue_depth, 100);
        assert_eq!(config.put_timeout, Duration::from_secs(30));
        assert_eq!(config.remote_write_batch_size, 10_000);
        assert!(config.include_metadata);
        assert!(!config.require_catalog);
    }

    #[test]
    fn test_overrides() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("ARROWSINK_STORAGE_ROOT", "/srv/sink"),
            ("ARROWSINK_FLUSH_EVERY_N_BATCHES", "2"),
            ("ARROWSINK_PUT_TIMEOUT_MS", "250"),
            ("ARROWSINK_INCLUDE_METADATA", "false"),
        ]))
        .unwrap();

        assert_eq!(config.storage_root, PathBuf::from("/srv/sink"));
        assert_eq!(config.ingester_config().flush_every_n_batches, 2);
        assert_eq!(config.put_timeout, Duration::from_millis(250));
        assert!(!config.convert_options().include_metadata);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = IngestConfig::from_lookup(lookup(&[("ARROWSINK_MAX_QUEUE_DEPTH", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("ARROWSINK_MAX_QUEUE_DEPTH")));

        let err = IngestConfig::from_lookup(lookup(&[("ARROWSINK_FLUSH_EVERY_N_BATCHES", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_storage_layout() {
        let layout = StorageLayout::new("/data");
        assert_eq!(
            layout.dataset_dir("acme", "metrics").unwrap(),
            PathBuf::from("/data/accounts/acme/datasets/metrics")
        );
        assert!(layout.dataset_dir("acme", "../etc").is_err());
        assert!(layout.dataset_dir("a/b", "metrics").is_err());
        assert!(layout.dataset_dir("acme", "..").is_err());
        assert!(layout.dataset_dir("", "metrics").is_err());
    }
}
