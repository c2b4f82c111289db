//! Local in-memory catalog for development and testing

use super::{CatalogClient, FileGroupRegistration};
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Local in-memory catalog
///
/// Records every registration in arrival order and keeps the latest glob per
/// dataset. Suitable for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    registrations: RwLock<Vec<FileGroupRegistration>>,
    datasets: RwLock<BTreeMap<String, String>>,
}

impl LocalCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// All registrations received so far
    pub fn registrations(&self) -> Vec<FileGroupRegistration> {
        self.registrations.read().clone()
    }

    /// Latest glob registered for `dataset_name`
    pub fn dataset_glob(&self, dataset_name: &str) -> Option<String> {
        self.datasets.read().get(dataset_name).cloned()
    }

    /// Names of every dataset with at least one registration
    pub fn datasets(&self) -> Vec<String> {
        self.datasets.read().keys().cloned().collect()
    }
}

#[async_trait]
impl CatalogClient for LocalCatalog {
    async fn register_file_group(&self, dataset_name: &str, path_glob: &str) -> Result<()> {
        self.registrations.write().push(FileGroupRegistration {
            dataset_name: dataset_name.to_string(),
            path_glob: path_glob.to_string(),
        });
        self.datasets
            .write()
            .insert(dataset_name.to_string(), path_glob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let catalog = LocalCatalog::new();
        catalog
            .register_file_group("sales", "/data/sales/*.parquet")
            .await
            .unwrap();
        catalog
            .register_file_group("sales", "/data/sales2/*.parquet")
            .await
            .unwrap();

        assert_eq!(catalog.registrations().len(), 2);
        assert_eq!(
            catalog.dataset_glob("sales").as_deref(),
            Some("/data/sales2/*.parquet")
        );
        assert_eq!(catalog.datasets(), vec!["sales".to_string()]);
        assert!(catalog.dataset_glob("missing").is_none());
    }
}
