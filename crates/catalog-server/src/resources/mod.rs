//! Resource managers for the catalog entity types.
//!
//! One [`ResourceManager`] is built per [`EntitySchema`]; the [`Catalog`]
//! owns all of them together with the URL family each one is mounted under.

pub mod manager;
pub mod search;
pub mod upload;

use std::sync::Arc;

use catalog_core::schema::{CATEGORY, MOLECULE, PACKAGING_SIZE, POPUP, PRODUCT, SLIDER, STRENGTH};
use catalog_core::{EntitySchema, Result};
use catalog_storage::DynStore;

use crate::assets::DynAssetStore;
use crate::cache::ListCache;
use crate::config::AppConfig;

pub use manager::{ListParams, ManagerSettings, ResourceManager};
pub use search::SuggestionItem;
pub use upload::Upload;

/// URL family (`/api/<family>`) of every entity type.
pub const FAMILIES: [(&str, &EntitySchema); 7] = [
    ("categories", &CATEGORY),
    ("molecules", &MOLECULE),
    ("strengths", &STRENGTH),
    ("packagingsize", &PACKAGING_SIZE),
    ("sliders", &SLIDER),
    ("popups", &POPUP),
    ("products", &PRODUCT),
];

/// Every resource manager of the service.
pub struct Catalog {
    managers: Vec<(&'static str, Arc<ResourceManager>)>,
}

impl Catalog {
    /// Builds one manager per entity type and declares their indexes.
    pub async fn build(store: DynStore, assets: DynAssetStore, cfg: &AppConfig) -> Result<Self> {
        let settings = ManagerSettings::from(&cfg.catalog);
        let mut managers = Vec::with_capacity(FAMILIES.len());

        for (family, schema) in FAMILIES {
            let cache = if cfg.cache.enabled {
                ListCache::new(cfg.list_ttl())
            } else {
                ListCache::disabled()
            };
            let manager = ResourceManager::new(
                schema,
                Arc::clone(&store),
                Arc::clone(&assets),
                cache,
                settings,
            );
            manager.init().await?;
            managers.push((family, Arc::new(manager)));
        }

        tracing::info!(
            managers = managers.len(),
            storage = store.backend_name(),
            assets = assets.backend_name(),
            cache_enabled = cfg.cache.enabled,
            "catalog initialized"
        );
        Ok(Self { managers })
    }

    pub fn managers(&self) -> impl Iterator<Item = (&'static str, &Arc<ResourceManager>)> {
        self.managers.iter().map(|(family, m)| (*family, m))
    }

    pub fn get(&self, family: &str) -> Option<&Arc<ResourceManager>> {
        self.managers
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, m)| m)
    }

    /// Drops expired list snapshots from every manager's cache.
    pub fn purge_expired(&self) -> usize {
        self.managers
            .iter()
            .map(|(_, m)| m.cache().purge_expired())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetStore;

    #[tokio::test]
    async fn catalog_mounts_every_family() {
        let catalog = Catalog::build(
            catalog_db_memory::create_store(),
            Arc::new(MemoryAssetStore::new()),
            &AppConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(catalog.managers().count(), 7);
        assert_eq!(
            catalog.get("packagingsize").unwrap().schema().collection,
            "packagingsizes"
        );
        assert!(catalog.get("widgets").is_none());
        assert_eq!(catalog.purge_expired(), 0);
    }

    #[tokio::test]
    async fn disabled_cache_config_is_honored() {
        let mut cfg = AppConfig::default();
        cfg.cache.enabled = false;
        let catalog = Catalog::build(
            catalog_db_memory::create_store(),
            Arc::new(MemoryAssetStore::new()),
            &cfg,
        )
        .await
        .unwrap();
        assert!(catalog.managers().all(|(_, m)| !m.cache().is_enabled()));
    }
}
