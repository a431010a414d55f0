pub mod assets;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod resources;
pub mod routes;
pub mod server;

pub use assets::{AssetRef, AssetStore, DynAssetStore, HttpAssetStore, MemoryAssetStore};
pub use cache::{CacheStats, ListCache};
pub use config::{AppConfig, AssetBackend, AssetsConfig, CacheConfig, CatalogSettings, ServerConfig};
pub use observability::init_tracing;
pub use resources::{Catalog, ListParams, ManagerSettings, ResourceManager, SuggestionItem, Upload};
pub use server::{AppState, CatalogServer, ServerBuilder, build_app, build_router, build_state};
