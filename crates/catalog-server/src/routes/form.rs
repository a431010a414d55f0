//! Request body extraction for create and update endpoints.
//!
//! Bodies arrive as `multipart/form-data` (text fields plus one image file),
//! `application/json` or `application/x-www-form-urlencoded`. All three are
//! normalized into a field map. The multipart file part named after the
//! entity's asset field is spooled to disk; other file parts are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Form, FromRef, FromRequest, Json, Multipart, Request};
use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use catalog_api::ApiError;
use serde_json::{Map, Value};

use crate::resources::Upload;

/// Directory uploads are spooled into.
#[derive(Debug, Clone)]
pub struct SpoolDir(pub Arc<PathBuf>);

/// Name of the multipart file part carrying the entity's asset, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileField(pub Option<&'static str>);

/// Normalized create/update input.
#[derive(Debug, Default)]
pub struct FormInput {
    pub fields: Map<String, Value>,
    pub upload: Option<Upload>,
}

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Multipart form error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Multipart form error: {0}")]
    MultipartRejection(#[from] MultipartRejection),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("Invalid form body: {0}")]
    Form(#[from] FormRejection),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        match &err {
            FormError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::payload_too_large(err.to_string())
            }
            FormError::Io(_) => {
                tracing::error!(error = %err, "failed to spool upload");
                ApiError::internal("File upload failed.")
            }
            _ => ApiError::bad_request(err.to_string()),
        }
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl<S> FromRequest<S> for FormInput
where
    S: Send + Sync,
    SpoolDir: FromRef<S>,
    FileField: FromRef<S>,
{
    type Rejection = FormError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let SpoolDir(dir) = SpoolDir::from_ref(state);
            let FileField(file_field) = FileField::from_ref(state);
            let multipart = Multipart::from_request(req, state).await?;
            read_multipart(multipart, &dir, file_field).await
        } else if content_type.starts_with("application/json") {
            let Json(value) = Json::<Value>::from_request(req, state).await?;
            match value {
                Value::Object(fields) => Ok(Self {
                    fields,
                    upload: None,
                }),
                _ => Err(FormError::NotAnObject),
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state).await?;
            let fields = pairs
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            Ok(Self {
                fields,
                upload: None,
            })
        } else if content_type.is_empty() {
            Ok(Self::default())
        } else {
            Err(FormError::UnsupportedMediaType(content_type))
        }
    }
}

async fn read_multipart(
    mut multipart: Multipart,
    dir: &Path,
    file_field: Option<&str>,
) -> Result<FormInput, FormError> {
    let mut input = FormInput::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if field.file_name().is_some() {
            if file_field != Some(name.as_str()) {
                tracing::debug!(field = %name, "skipping unexpected file part");
                continue;
            }
            let mime = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            // Browsers send an empty part when no file was chosen.
            if input.upload.is_none() && !bytes.is_empty() {
                tracing::debug!(field = %name, size = bytes.len(), "spooling upload");
                input.upload = Some(Upload::spool(dir.to_path_buf(), bytes, mime).await?);
            }
        } else {
            let text = field.text().await?;
            input.fields.insert(name, Value::String(text));
        }
    }

    Ok(input)
}
