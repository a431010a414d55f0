//! Generic CRUD manager instantiated once per catalog entity type.

use std::sync::Arc;

use catalog_core::schema::{
    ACTIVE_FIELD, Activation, CREATED_AT_FIELD, PRODUCT_CATEGORY_FIELD, UPDATED_AT_FIELD,
};
use catalog_core::{CoreError, EntitySchema, Result, allocate_id, now_utc};
use catalog_storage::{DynStore, Filter, FindOptions, SortParam, StorageError};
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::search::{SuggestionItem, flatten_suggestions, fuzzy_pattern};
use super::upload::Upload;
use crate::assets::{AssetRef, DynAssetStore};
use crate::cache::{ListCache, ListQuery, full_list_key, paged_key, write_tags};
use crate::config::CatalogSettings;

/// Tuning knobs shared by every manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub id_allocation_retries: u32,
    pub default_page_size: u32,
    pub search_result_cap: usize,
    pub default_suggestions: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&CatalogSettings::default())
    }
}

impl From<&CatalogSettings> for ManagerSettings {
    fn from(cfg: &CatalogSettings) -> Self {
        Self {
            id_allocation_retries: cfg.id_allocation_retries.max(1),
            default_page_size: cfg.default_page_size.max(1),
            search_result_cap: cfg.search_result_cap,
            default_suggestions: cfg.default_suggestions,
        }
    }
}

/// Raw list query parameters as received from the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub active: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Create, read, update, delete and activation for one entity type.
///
/// Every write sweeps the manager's list cache; point reads always go to
/// storage.
pub struct ResourceManager {
    schema: &'static EntitySchema,
    store: DynStore,
    assets: DynAssetStore,
    cache: ListCache,
    settings: ManagerSettings,
}

impl ResourceManager {
    pub fn new(
        schema: &'static EntitySchema,
        store: DynStore,
        assets: DynAssetStore,
        cache: ListCache,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            schema,
            store,
            assets,
            cache,
            settings,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    /// Declares the unique indexes this entity type relies on.
    pub async fn init(&self) -> Result<()> {
        let collection = self.schema.collection;
        self.store
            .ensure_unique_index(collection, self.schema.id_field)
            .await?;
        if self.schema.unique_name {
            self.store
                .ensure_unique_index(collection, self.schema.name_field)
                .await?;
        }
        tracing::debug!(
            entity = self.schema.entity,
            collection,
            backend = self.store.backend_name(),
            "resource manager ready"
        );
        Ok(())
    }

    pub async fn create(&self, input: &Map<String, Value>, upload: Option<&Upload>) -> Result<Value> {
        let mut doc = self.schema.prepare_create(input)?;

        let asset = self.upload_asset(upload, true).await?;
        if let (Some(field), Some(asset)) = (self.schema.asset_field, &asset) {
            doc.insert(field.to_string(), serde_json::to_value(asset)?);
        }

        let result = self.persist_new(doc).await;
        if result.is_err() {
            self.discard_asset(asset.as_ref()).await;
        }
        let saved = result?;

        self.invalidate();
        tracing::info!(
            entity = self.schema.entity,
            id = %record_id(&saved, self.schema.id_field),
            "record created"
        );
        Ok(saved)
    }

    /// Full list for most types, a page of results for paged types.
    ///
    /// Results are served from the list cache when present.
    pub async fn list(&self, params: &ListParams) -> Result<Arc<Value>> {
        let active = params
            .active
            .as_deref()
            .map(|value| value == "true")
            .filter(|_| self.schema.has_active_flag());

        if self.schema.paged {
            self.list_page(params, active).await
        } else {
            self.list_all(active).await
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Value> {
        self.store
            .find_one(self.schema.collection, &self.by_id(id))
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    pub async fn update(
        &self,
        id: &str,
        input: &Map<String, Value>,
        upload: Option<&Upload>,
    ) -> Result<Value> {
        let current = self.get_by_id(id).await?;
        let mut patch = self.schema.prepare_update(input)?;

        let asset = self.upload_asset(upload, false).await?;
        if let (Some(field), Some(asset)) = (self.schema.asset_field, &asset) {
            patch.insert(field.to_string(), serde_json::to_value(asset)?);
        }

        let result = self.persist_update(id, patch).await;
        if result.is_err() {
            self.discard_asset(asset.as_ref()).await;
        }
        let saved = result?;

        if asset.is_some()
            && let Some(previous) = self.asset_public_id(&current)
        {
            self.remove_asset(&previous).await;
        }

        self.invalidate();
        tracing::info!(entity = self.schema.entity, id = %id, "record updated");
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<Value> {
        let removed = self
            .store
            .delete_one(self.schema.collection, &self.by_id(id))
            .await?
            .ok_or_else(|| self.not_found(id))?;

        if let Some(public_id) = self.asset_public_id(&removed) {
            self.remove_asset(&public_id).await;
        }

        self.invalidate();
        tracing::info!(entity = self.schema.entity, id = %id, "record deleted");
        Ok(removed)
    }

    /// Sets the `active` flag. `active` must be a JSON boolean.
    pub async fn set_active_status(&self, id: &str, active: &Value) -> Result<Value> {
        if !self.schema.has_active_flag() {
            return Err(CoreError::validation(format!(
                "{} does not support activation",
                self.schema.entity
            )));
        }
        let Some(active) = active.as_bool() else {
            return Err(CoreError::validation("active must be a boolean value"));
        };

        self.get_by_id(id).await?;
        if active && self.schema.activation == Activation::Exclusive {
            self.deactivate_all().await?;
        }

        let mut changes = Map::new();
        changes.insert(ACTIVE_FIELD.to_string(), Value::Bool(active));
        changes.insert(UPDATED_AT_FIELD.to_string(), timestamp());

        let saved = self
            .store
            .update_one(self.schema.collection, &self.by_id(id), &changes)
            .await?
            .ok_or_else(|| self.not_found(id))?;

        self.invalidate();
        tracing::info!(entity = self.schema.entity, id = %id, active, "activation changed");
        Ok(saved)
    }

    /// Fuzzy match over the searchable fields: `amx` finds "Amoxicillin".
    pub async fn search_fuzzy(&self, query: Option<&str>) -> Result<Vec<SuggestionItem>> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CoreError::validation("Query parameter is required"))?;
        if !self.schema.is_searchable() {
            return Err(CoreError::validation(format!(
                "{} does not support search",
                self.schema.entity
            )));
        }

        let pattern = fuzzy_pattern(query);
        let matcher = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::validation(format!("Invalid search query: {e}")))?;

        let filter = Filter::matches_any(self.schema.search_fields.iter().copied(), pattern);
        let docs = self
            .store
            .find(self.schema.collection, &filter, &newest_first())
            .await?;

        Ok(self.suggestions(&docs, Some(&matcher), self.settings.search_result_cap))
    }

    /// Random sample of `limit` records (default from settings).
    pub async fn random_suggestions(&self, limit: Option<&str>) -> Result<Vec<SuggestionItem>> {
        let limit = parse_positive::<usize>(limit).unwrap_or(self.settings.default_suggestions);
        let docs = self
            .store
            .sample(self.schema.collection, &Filter::All, limit)
            .await?;
        Ok(self.suggestions(&docs, None, limit))
    }

    // -------------------------
    // Internals
    // -------------------------

    async fn list_all(&self, active: Option<bool>) -> Result<Arc<Value>> {
        let key = full_list_key(self.schema, active);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let filter = active.map_or(Filter::All, |a| Filter::eq(ACTIVE_FIELD, a));
        let docs = self
            .store
            .find(self.schema.collection, &filter, &newest_first())
            .await?;

        let snapshot = Arc::new(Value::Array(docs));
        self.cache.set(&key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn list_page(&self, params: &ListParams, active: Option<bool>) -> Result<Arc<Value>> {
        let query = ListQuery {
            page: parse_positive(params.page.as_deref()).unwrap_or(1),
            limit: parse_positive(params.limit.as_deref())
                .unwrap_or(self.settings.default_page_size),
            active,
            category: non_blank(params.category.as_deref()),
            search: non_blank(params.search.as_deref()),
        };
        let key = paged_key(&query);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let mut filters = Vec::new();
        if let Some(active) = query.active {
            filters.push(Filter::eq(ACTIVE_FIELD, active));
        }
        if let Some(category) = &query.category {
            filters.push(Filter::eq(PRODUCT_CATEGORY_FIELD, category.as_str()));
        }
        if let Some(search) = &query.search {
            filters.push(Filter::matches_any(
                self.schema.search_fields.iter().copied(),
                regex::escape(search),
            ));
        }
        let filter = Filter::and(filters);

        let limit = u64::from(query.limit);
        let total = self.store.count(self.schema.collection, &filter).await?;
        let options = newest_first()
            .with_skip(u64::from(query.page - 1) * limit)
            .with_limit(limit);
        let docs = self
            .store
            .find(self.schema.collection, &filter, &options)
            .await?;

        let snapshot = Arc::new(json!({
            "page": query.page,
            "totalPages": total.div_ceil(limit),
            "totalDocuments": total,
            "data": docs,
        }));
        self.cache.set(&key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn persist_new(&self, mut doc: Map<String, Value>) -> Result<Value> {
        let activating = doc.get(ACTIVE_FIELD).and_then(Value::as_bool) == Some(true);
        if activating && self.schema.activation == Activation::Exclusive {
            self.deactivate_all().await?;
        }

        let now = timestamp();
        doc.insert(CREATED_AT_FIELD.to_string(), now.clone());
        doc.insert(UPDATED_AT_FIELD.to_string(), now);
        self.insert_with_fresh_id(doc).await
    }

    /// Allocates the next free id and inserts, retrying when a concurrent
    /// writer took the same id first.
    async fn insert_with_fresh_id(&self, doc: Map<String, Value>) -> Result<Value> {
        let EntitySchema {
            collection,
            id_field,
            id_prefix,
            ..
        } = *self.schema;
        let attempts = self.settings.id_allocation_retries;

        for attempt in 1..=attempts {
            let existing = self.store.field_values(collection, id_field).await?;
            let id = allocate_id(id_prefix, existing.iter().map(String::as_str));

            let mut record = doc.clone();
            record.insert(id_field.to_string(), Value::String(id.clone()));

            match self.store.insert(collection, Value::Object(record)).await {
                Ok(saved) => return Ok(saved),
                Err(err) if err.duplicate_field() == Some(id_field) => {
                    tracing::warn!(
                        entity = self.schema.entity,
                        id = %id,
                        attempt,
                        "identifier already taken, allocating again"
                    );
                }
                Err(err) => return Err(self.write_error(err)),
            }
        }

        Err(CoreError::storage(format!(
            "could not allocate a unique {id_field} after {attempts} attempts"
        )))
    }

    async fn persist_update(&self, id: &str, mut patch: Map<String, Value>) -> Result<Value> {
        let activating = patch.get(ACTIVE_FIELD).and_then(Value::as_bool) == Some(true);
        if activating && self.schema.activation == Activation::Exclusive {
            self.deactivate_all().await?;
        }

        patch.insert(UPDATED_AT_FIELD.to_string(), timestamp());
        match self
            .store
            .update_one(self.schema.collection, &self.by_id(id), &patch)
            .await
        {
            Ok(Some(saved)) => Ok(saved),
            Ok(None) => Err(self.not_found(id)),
            Err(err) => Err(self.write_error(err)),
        }
    }

    async fn deactivate_all(&self) -> Result<()> {
        let mut changes = Map::new();
        changes.insert(ACTIVE_FIELD.to_string(), Value::Bool(false));
        let deactivated = self
            .store
            .update_many(
                self.schema.collection,
                &Filter::eq(ACTIVE_FIELD, true),
                &changes,
            )
            .await?;
        tracing::debug!(entity = self.schema.entity, deactivated, "deactivated active records");
        Ok(())
    }

    async fn upload_asset(&self, upload: Option<&Upload>, required: bool) -> Result<Option<AssetRef>> {
        if self.schema.asset_field.is_none() {
            return Ok(None);
        }
        let Some(upload) = upload else {
            return if required {
                Err(CoreError::validation("No file was uploaded."))
            } else {
                Ok(None)
            };
        };

        match self.assets.upload(upload.path(), upload.mime()).await {
            Ok(asset) if asset.is_usable() => Ok(Some(asset)),
            Ok(_) => {
                tracing::error!(entity = self.schema.entity, "asset store returned an unusable reference");
                Err(CoreError::upstream("File upload failed."))
            }
            Err(err) => {
                tracing::error!(entity = self.schema.entity, error = %err, "asset upload failed");
                Err(CoreError::upstream("File upload failed."))
            }
        }
    }

    async fn discard_asset(&self, asset: Option<&AssetRef>) {
        if let Some(asset) = asset {
            self.remove_asset(&asset.public_id).await;
        }
    }

    async fn remove_asset(&self, public_id: &str) {
        if let Err(err) = self.assets.delete(public_id).await {
            tracing::warn!(
                entity = self.schema.entity,
                public_id = %public_id,
                error = %err,
                "failed to delete asset"
            );
        }
    }

    fn asset_public_id(&self, doc: &Value) -> Option<String> {
        doc.get(self.schema.asset_field?)?
            .get("public_id")?
            .as_str()
            .map(str::to_string)
    }

    fn suggestions(
        &self,
        docs: &[Value],
        matcher: Option<&regex::Regex>,
        cap: usize,
    ) -> Vec<SuggestionItem> {
        flatten_suggestions(
            docs,
            self.schema.id_field,
            self.schema.name_field,
            self.schema.asset_field,
            matcher,
            cap,
        )
    }

    fn write_error(&self, err: StorageError) -> CoreError {
        if self.schema.unique_name && err.duplicate_field() == Some(self.schema.name_field) {
            CoreError::name_taken(self.schema.entity)
        } else {
            err.into()
        }
    }

    fn invalidate(&self) {
        self.cache.invalidate(&write_tags(self.schema));
    }

    fn by_id(&self, id: &str) -> Filter {
        Filter::eq(self.schema.id_field, id)
    }

    fn not_found(&self, id: &str) -> CoreError {
        CoreError::not_found(self.schema.entity, id)
    }
}

fn newest_first() -> FindOptions {
    FindOptions::default().with_sort(SortParam::desc(CREATED_AT_FIELD))
}

fn timestamp() -> Value {
    Value::String(now_utc().to_string())
}

fn record_id<'a>(doc: &'a Value, id_field: &str) -> &'a str {
    doc.get(id_field).and_then(Value::as_str).unwrap_or_default()
}

/// Parses a strictly positive integer; anything else counts as absent.
fn parse_positive<T>(raw: Option<&str>) -> Option<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    raw.and_then(|s| s.trim().parse::<T>().ok())
        .filter(|n| *n > T::default())
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
