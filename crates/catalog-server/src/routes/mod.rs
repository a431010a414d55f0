//! HTTP routes.
//!
//! - `resources` - per-family CRUD, search and suggestion endpoints
//! - `form` - multipart/JSON/urlencoded body extraction

pub mod form;
pub mod resources;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

use crate::resources::Catalog;
pub use form::{FileField, FormError, FormInput, SpoolDir};
pub use resources::{ResourceState, resource_routes};

/// Mounts every resource family under `/api/<family>`.
pub fn api_routes(catalog: &Catalog, spool_dir: PathBuf) -> Router {
    let spool = SpoolDir(Arc::new(spool_dir));
    catalog
        .managers()
        .fold(Router::new(), |router, (family, manager)| {
            router.nest(
                &format!("/api/{family}"),
                resource_routes(Arc::clone(manager), spool.clone()),
            )
        })
}
