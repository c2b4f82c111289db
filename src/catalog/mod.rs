//! Catalog collaborator
//!
//! The ingester only needs one thing from a catalog: to be told that a group
//! of Parquet files now backs a dataset. Durability of that record is the
//! catalog's business.

mod local;

pub use local::LocalCatalog;

use crate::Result;
use async_trait::async_trait;

/// Catalog client interface
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Register the files matched by `path_glob` under `dataset_name`
    async fn register_file_group(&self, dataset_name: &str, path_glob: &str) -> Result<()>;
}

/// One recorded registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroupRegistration {
    pub dataset_name: String,
    pub path_glob: String,
}
