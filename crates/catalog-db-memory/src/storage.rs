use std::sync::Arc;

use async_trait::async_trait;
use catalog_storage::{DocumentStore, Filter, FindOptions, StorageError};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::query::{CompiledFilter, compare_values, key_text};

type Document = Map<String, Value>;

/// One named collection: documents in insertion order plus its unique indexes.
#[derive(Debug, Default)]
pub(crate) struct Collection {
    docs: Vec<Document>,
    unique_fields: Vec<String>,
}

impl Collection {
    /// Checks `candidate` against every unique index, ignoring the document
    /// at `skip` (the one being replaced).
    fn check_unique(
        &self,
        name: &str,
        candidate: &Document,
        fields: impl Iterator<Item = impl AsRef<str>>,
        skip: Option<usize>,
    ) -> Result<(), StorageError> {
        for field in fields {
            let field = field.as_ref();
            if !self.unique_fields.iter().any(|f| f == field) {
                continue;
            }
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .docs
                .iter()
                .enumerate()
                .any(|(i, doc)| Some(i) != skip && doc.get(field) == Some(value));
            if clash {
                return Err(StorageError::duplicate_key(name, field, key_text(value)));
            }
        }
        Ok(())
    }

    fn positions(&self, filter: &CompiledFilter) -> Vec<usize> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(i, _)| i)
            .collect()
    }
}

/// In-memory document store.
///
/// Collections live in a `DashMap`; each collection sits behind its own
/// `tokio::sync::RwLock` so a write is atomic per collection, including the
/// unique index check that precedes it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: DashMap<String, Arc<RwLock<Collection>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collection handle, creating it on first use.
    ///
    /// The map guard is released before the caller awaits the lock.
    fn collection(&self, name: &str) -> Arc<RwLock<Collection>> {
        if let Some(existing) = self.collections.get(name) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.collections.entry(name.to_string()).or_default().value())
    }

    /// Number of collections touched so far.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }
}

fn into_object(document: Value) -> Result<Document, StorageError> {
    match document {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::invalid_document(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn merged(doc: &Document, changes: &Document) -> Document {
    let mut updated = doc.clone();
    for (key, value) in changes {
        updated.insert(key.clone(), value.clone());
    }
    updated
}

fn pick_random(docs: Vec<&Document>, size: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    docs.choose_multiple(&mut rng, size)
        .map(|doc| Value::Object((*doc).clone()))
        .collect()
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StorageError> {
        let handle = self.collection(collection);
        let mut guard = handle.write().await;
        if guard.unique_fields.iter().any(|f| f == field) {
            return Ok(());
        }

        let mut seen: Vec<&Value> = Vec::new();
        for doc in &guard.docs {
            if let Some(value) = doc.get(field).filter(|v| !v.is_null()) {
                if seen.contains(&value) {
                    return Err(StorageError::duplicate_key(
                        collection,
                        field,
                        key_text(value),
                    ));
                }
                seen.push(value);
            }
        }

        guard.unique_fields.push(field.to_string());
        Ok(())
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StorageError> {
        let doc = into_object(document)?;
        let handle = self.collection(collection);
        let mut guard = handle.write().await;

        let fields: Vec<String> = guard.unique_fields.clone();
        guard.check_unique(collection, &doc, fields.iter(), None)?;

        guard.docs.push(doc.clone());
        Ok(Value::Object(doc))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let guard = handle.read().await;

        let mut matched: Vec<&Document> =
            guard.docs.iter().filter(|doc| compiled.matches(doc)).collect();

        if let Some(sort) = &options.sort {
            if sort.descending {
                // Ties keep the most recently inserted document first.
                matched.reverse();
                matched.sort_by(|a, b| {
                    compare_values(b.get(&sort.field), a.get(&sort.field))
                });
            } else {
                matched.sort_by(|a, b| {
                    compare_values(a.get(&sort.field), b.get(&sort.field))
                });
            }
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| Value::Object(doc.clone()))
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let guard = handle.read().await;
        Ok(guard
            .docs
            .iter()
            .find(|doc| compiled.matches(doc))
            .map(|doc| Value::Object(doc.clone())))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let guard = handle.read().await;
        Ok(guard.docs.iter().filter(|doc| compiled.matches(doc)).count() as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let mut guard = handle.write().await;

        let Some(index) = guard.docs.iter().position(|doc| compiled.matches(doc)) else {
            return Ok(None);
        };

        let updated = merged(&guard.docs[index], changes);
        guard.check_unique(collection, &updated, changes.keys(), Some(index))?;
        guard.docs[index] = updated.clone();
        Ok(Some(Value::Object(updated)))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> Result<u64, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let mut guard = handle.write().await;

        let positions = guard.positions(&compiled);
        let touches_unique = changes
            .keys()
            .any(|k| guard.unique_fields.iter().any(|f| f == k));
        if touches_unique && positions.len() > 1 {
            let field = changes
                .keys()
                .find(|k| guard.unique_fields.iter().any(|f| f == *k))
                .cloned()
                .unwrap_or_default();
            let value = changes.get(&field).map(key_text).unwrap_or_default();
            return Err(StorageError::duplicate_key(collection, field, value));
        }

        let mut updated = Vec::with_capacity(positions.len());
        for &index in &positions {
            let doc = merged(&guard.docs[index], changes);
            guard.check_unique(collection, &doc, changes.keys(), Some(index))?;
            updated.push((index, doc));
        }
        for (index, doc) in updated {
            guard.docs[index] = doc;
        }
        Ok(positions.len() as u64)
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let mut guard = handle.write().await;

        let Some(index) = guard.docs.iter().position(|doc| compiled.matches(doc)) else {
            return Ok(None);
        };
        Ok(Some(Value::Object(guard.docs.remove(index))))
    }

    async fn sample(
        &self,
        collection: &str,
        filter: &Filter,
        size: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let compiled = CompiledFilter::compile(filter)?;
        let handle = self.collection(collection);
        let guard = handle.read().await;
        let matched: Vec<&Document> =
            guard.docs.iter().filter(|doc| compiled.matches(doc)).collect();
        Ok(pick_random(matched, size))
    }

    async fn field_values(
        &self,
        collection: &str,
        field: &str,
    ) -> Result<Vec<String>, StorageError> {
        let handle = self.collection(collection);
        let guard = handle.read().await;
        Ok(guard
            .docs
            .iter()
            .filter_map(|doc| doc.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_storage::SortParam;
    use serde_json::json;

    fn changes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .ensure_unique_index("categories", "categoryName")
            .await
            .unwrap();
        for (id, name, created) in [
            ("categoryId0001", "Antibiotics", "2024-01-01T00:00:00Z"),
            ("categoryId0002", "Analgesics", "2024-01-02T00:00:00Z"),
            ("categoryId0003", "Antacids", "2024-01-03T00:00:00Z"),
        ] {
            store
                .insert(
                    "categories",
                    json!({"categoryId": id, "categoryName": name, "createdAt": created}),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_and_find_one() {
        let store = seeded().await;
        let found = store
            .find_one("categories", &Filter::eq("categoryId", "categoryId0002"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["categoryName"], "Analgesics");

        let missing = store
            .find_one("categories", &Filter::eq("categoryId", "categoryId0009"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_non_object() {
        let store = InMemoryStore::new();
        let err = store.insert("categories", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_unique_index_on_insert() {
        let store = seeded().await;
        let err = store
            .insert(
                "categories",
                json!({"categoryId": "categoryId0004", "categoryName": "Antibiotics"}),
            )
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(err.duplicate_field(), Some("categoryName"));
        assert_eq!(
            store.count("categories", &Filter::All).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_unique_index_on_update() {
        let store = seeded().await;
        let err = store
            .update_one(
                "categories",
                &Filter::eq("categoryId", "categoryId0002"),
                &changes(json!({"categoryName": "Antacids"})),
            )
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        // Writing a document's own value back is not a clash.
        let updated = store
            .update_one(
                "categories",
                &Filter::eq("categoryId", "categoryId0002"),
                &changes(json!({"categoryName": "Analgesics"})),
            )
            .await
            .unwrap();
        assert!(updated.is_some());
    }

    #[tokio::test]
    async fn test_ensure_unique_index_detects_existing_duplicates() {
        let store = InMemoryStore::new();
        for _ in 0..2 {
            store
                .insert("sliders", json!({"sliderName": "Banner"}))
                .await
                .unwrap();
        }
        let err = store
            .ensure_unique_index("sliders", "sliderName")
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        // Idempotent once declared.
        store.ensure_unique_index("sliders", "sliderId").await.unwrap();
        store.ensure_unique_index("sliders", "sliderId").await.unwrap();
    }

    #[tokio::test]
    async fn test_find_sorted_and_windowed() {
        let store = seeded().await;
        let options = FindOptions::new()
            .with_sort(SortParam::desc("createdAt"))
            .with_skip(1)
            .with_limit(1);
        let docs = store
            .find("categories", &Filter::All, &options)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["categoryId"], "categoryId0002");

        let docs = store
            .find(
                "categories",
                &Filter::All,
                &FindOptions::new().with_sort(SortParam::asc("categoryName")),
            )
            .await
            .unwrap();
        let names: Vec<&str> = docs
            .iter()
            .filter_map(|d| d["categoryName"].as_str())
            .collect();
        assert_eq!(names, vec!["Analgesics", "Antacids", "Antibiotics"]);
    }

    #[tokio::test]
    async fn test_descending_ties_prefer_latest_insert() {
        let store = InMemoryStore::new();
        for name in ["first", "second"] {
            store
                .insert(
                    "popups",
                    json!({"popupName": name, "createdAt": "2024-01-01T00:00:00Z"}),
                )
                .await
                .unwrap();
        }
        let docs = store
            .find(
                "popups",
                &Filter::All,
                &FindOptions::new().with_sort(SortParam::desc("createdAt")),
            )
            .await
            .unwrap();
        assert_eq!(docs[0]["popupName"], "second");
    }

    #[tokio::test]
    async fn test_update_many_and_delete_one() {
        let store = InMemoryStore::new();
        for (id, active) in [("popupId0001", true), ("popupId0002", true), ("popupId0003", false)] {
            store
                .insert("popups", json!({"popupId": id, "active": active}))
                .await
                .unwrap();
        }

        let touched = store
            .update_many(
                "popups",
                &Filter::eq("active", true),
                &changes(json!({"active": false})),
            )
            .await
            .unwrap();
        assert_eq!(touched, 2);
        assert_eq!(
            store.count("popups", &Filter::eq("active", true)).await.unwrap(),
            0
        );

        let removed = store
            .delete_one("popups", &Filter::eq("popupId", "popupId0002"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed["popupId"], "popupId0002");
        assert_eq!(store.count("popups", &Filter::All).await.unwrap(), 2);
        assert!(
            store
                .delete_one("popups", &Filter::eq("popupId", "popupId0002"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sample_and_field_values() {
        let store = seeded().await;
        let sample = store.sample("categories", &Filter::All, 2).await.unwrap();
        assert_eq!(sample.len(), 2);
        assert_ne!(sample[0]["categoryId"], sample[1]["categoryId"]);

        let sample = store.sample("categories", &Filter::All, 10).await.unwrap();
        assert_eq!(sample.len(), 3);

        let mut ids = store.field_values("categories", "categoryId").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["categoryId0001", "categoryId0002", "categoryId0003"]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_respect_unique_index() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_unique_index("strengths", "strengthId").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert("strengths", json!({"strengthId": "strengthId0001"}))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.collection_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_name() {
        let store = InMemoryStore::new();
        let dyn_store: &dyn DocumentStore = &store;
        assert_eq!(dyn_store.backend_name(), "in-memory");
    }
}
