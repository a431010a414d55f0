//! Image asset storage.
//!
//! Records embed an [`AssetRef`] returned by the store. The HTTP backend
//! performs signed uploads to a Cloudinary-compatible image host; the memory
//! backend keeps references in process for development and tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{AssetBackend, AssetsConfig};

/// Reference to an uploaded asset, stored verbatim on the owning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub secure_url: String,
    pub public_id: String,
}

impl AssetRef {
    /// An upload is only usable when both the URL and the id are present.
    pub fn is_usable(&self) -> bool {
        !self.secure_url.is_empty() && !self.public_id.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("asset host rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected asset host response: {0}")]
    InvalidResponse(String),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset store misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Uploads the file at `path` and returns its reference.
    async fn upload(&self, path: &Path, mime: Option<&str>) -> Result<AssetRef, AssetError>;

    /// Removes a previously uploaded asset.
    async fn delete(&self, public_id: &str) -> Result<(), AssetError>;

    fn backend_name(&self) -> &'static str;
}

pub type DynAssetStore = Arc<dyn AssetStore>;

/// Builds the configured asset store.
pub fn build_asset_store(cfg: &AssetsConfig, timeout: Duration) -> Result<DynAssetStore, AssetError> {
    match cfg.backend {
        AssetBackend::Memory => Ok(Arc::new(MemoryAssetStore::new())),
        AssetBackend::Http => {
            let required = |name: &str, value: &Option<String>| {
                value
                    .clone()
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| AssetError::Configuration(format!("assets.{name} is required")))
            };
            let store = HttpAssetStore::new(
                &cfg.base_url,
                required("cloud_name", &cfg.cloud_name)?,
                required("api_key", &cfg.api_key)?,
                required("api_secret", &cfg.api_secret)?,
                cfg.folder.clone(),
                timeout,
            )?;
            Ok(Arc::new(store))
        }
    }
}

// -------------------------
// HTTP backend
// -------------------------

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    #[serde(default)]
    result: String,
}

/// Signed-upload client for a Cloudinary-compatible image host.
pub struct HttpAssetStore {
    http_client: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: Option<String>,
}

impl HttpAssetStore {
    pub fn new(
        base_url: &str,
        cloud_name: String,
        api_key: String,
        api_secret: String,
        folder: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AssetError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_name,
            api_key,
            api_secret,
            folder,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{action}", self.base_url, self.cloud_name)
    }

    /// Signs request parameters: `k1=v1&k2=v2` sorted by key, followed by the
    /// API secret, hashed with SHA-256 and hex encoded.
    fn sign(&self, params: &[(&str, String)]) -> String {
        sign_params(params, &self.api_secret)
    }

    fn timestamp() -> String {
        time::OffsetDateTime::now_utc().unix_timestamp().to_string()
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AssetError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AssetError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

pub(crate) fn sign_params(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn upload(&self, path: &Path, mime: Option<&str>) -> Result<AssetRef, AssetError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let mut signed = vec![("timestamp", Self::timestamp())];
        if let Some(folder) = &self.folder {
            signed.push(("folder", folder.clone()));
        }
        let signature = self.sign(&signed);

        let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        if let Some(mime) = mime {
            part = part.mime_str(mime)?;
        }
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in signed {
            form = form.text(key, value);
        }

        let response = self
            .http_client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        let body: UploadResponse = Self::check(response).await?.json().await?;

        let asset = AssetRef {
            secure_url: body.secure_url.unwrap_or_default(),
            public_id: body.public_id.unwrap_or_default(),
        };
        if !asset.is_usable() {
            return Err(AssetError::InvalidResponse(
                "upload response lacks secure_url or public_id".into(),
            ));
        }
        tracing::debug!(public_id = %asset.public_id, "asset uploaded");
        Ok(asset)
    }

    async fn delete(&self, public_id: &str) -> Result<(), AssetError> {
        let signed = vec![
            ("public_id", public_id.to_string()),
            ("timestamp", Self::timestamp()),
        ];
        let signature = self.sign(&signed);

        let mut form: Vec<(&str, String)> = signed;
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));

        let response = self
            .http_client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;
        let body: DestroyResponse = Self::check(response).await?.json().await?;

        match body.result.as_str() {
            "ok" => {
                tracing::debug!(public_id = %public_id, "asset deleted");
                Ok(())
            }
            "not found" => Err(AssetError::NotFound(public_id.to_string())),
            other => Err(AssetError::InvalidResponse(format!(
                "destroy returned '{other}'"
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

// -------------------------
// Memory backend
// -------------------------

/// Keeps asset references in process. Uploaded bytes are not retained.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: DashMap<String, AssetRef>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.assets.contains_key(public_id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(&self, path: &Path, _mime: Option<&str>) -> Result<AssetRef, AssetError> {
        // Reading the spool confirms the upload actually reached disk.
        tokio::fs::metadata(path).await?;
        let public_id = format!("catalog/{}", uuid::Uuid::new_v4());
        let asset = AssetRef {
            secure_url: format!("memory://{public_id}"),
            public_id: public_id.clone(),
        };
        self.assets.insert(public_id, asset.clone());
        Ok(asset)
    }

    async fn delete(&self, public_id: &str) -> Result<(), AssetError> {
        self.assets
            .remove(public_id)
            .map(|_| ())
            .ok_or_else(|| AssetError::NotFound(public_id.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spool(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    fn http_store(base_url: &str) -> HttpAssetStore {
        HttpAssetStore::new(
            base_url,
            "demo".into(),
            "key123".into(),
            "secret456".into(),
            Some("catalog".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_signature_sorts_parameters() {
        let a = sign_params(
            &[("timestamp", "1700000000".into()), ("folder", "catalog".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "catalog".into()), ("timestamp", "1700000000".into())],
            "secret",
        );
        assert_eq!(a, b);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=catalog&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_asset_ref_usable() {
        let asset = AssetRef {
            secure_url: "https://img/x.png".into(),
            public_id: "x".into(),
        };
        assert!(asset.is_usable());
        assert!(
            !AssetRef {
                secure_url: String::new(),
                public_id: "x".into()
            }
            .is_usable()
        );
    }

    #[tokio::test]
    async fn test_http_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .and(body_string_contains("signature"))
            .and(body_string_contains("key123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://img.example/catalog/abc.png",
                "public_id": "catalog/abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = spool(b"png-bytes");
        let store = http_store(&server.uri());
        let asset = store.upload(file.path(), Some("image/png")).await.unwrap();
        assert_eq!(asset.public_id, "catalog/abc");
        assert_eq!(asset.secure_url, "https://img.example/catalog/abc.png");
    }

    #[tokio::test]
    async fn test_http_upload_without_reference_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"secure_url": ""})),
            )
            .mount(&server)
            .await;

        let file = spool(b"png-bytes");
        let err = http_store(&server.uri())
            .upload(file.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_http_upload_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
            .mount(&server)
            .await;

        let file = spool(b"png-bytes");
        let err = http_store(&server.uri())
            .upload(file.path(), None)
            .await
            .unwrap_err();
        match err {
            AssetError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad signature");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/destroy"))
            .and(body_string_contains("public_id=catalog%2Fabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/demo/image/destroy"))
            .and(body_string_contains("public_id=catalog%2Fgone"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "not found"})),
            )
            .mount(&server)
            .await;

        let store = http_store(&server.uri());
        store.delete("catalog/abc").await.unwrap();
        let err = store.delete("catalog/gone").await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryAssetStore::new();
        let file = spool(b"bytes");
        let asset = store.upload(file.path(), Some("image/jpeg")).await.unwrap();
        assert!(asset.is_usable());
        assert!(store.contains(&asset.public_id));

        store.delete(&asset.public_id).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.delete(&asset.public_id).await,
            Err(AssetError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_missing_file() {
        let store = MemoryAssetStore::new();
        let err = store
            .upload(Path::new("/nonexistent/upload.bin"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Io(_)));
    }

    #[test]
    fn test_build_http_store_requires_credentials() {
        let cfg = AssetsConfig {
            backend: AssetBackend::Http,
            ..Default::default()
        };
        let err = build_asset_store(&cfg, Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, AssetError::Configuration(_)));

        let store = build_asset_store(&AssetsConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }
}
