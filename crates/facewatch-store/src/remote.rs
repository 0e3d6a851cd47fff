//! Remote REST backend.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | call | request | success |
//! |---|---|---|
//! | store | `POST v1/images/upload` (multipart `file`) | 200 + JSON `id` |
//! | load_all | `GET v1/images/get` | 200 + `[{id, base64}]` |
//! | ping | `GET v1/images/ping` | 200 |
//! | info | `GET v1/images/info/{id}` | 200 + JSON |
//! | delete | `DELETE v1/images/{id}` | 2xx |

use crate::{convert, encode_jpeg, ColorConversion, FaceStore, StoreError, StoredFace};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbImage;
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const UPLOAD_FILE_NAME: &str = "face.jpg";

/// One entry of the list endpoint.
#[derive(Debug, Deserialize)]
struct ListedImage {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    base64: Option<String>,
}

/// Blocking client for the remote image API.
pub struct RemoteStore {
    base_url: Url,
    http: Client,
}

impl RemoteStore {
    /// Create a client for `base_url` authenticating with `token`.
    ///
    /// `accept_invalid_certs` turns off TLS certificate and hostname checks.
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid API URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!("API URL {base_url} cannot be a base")));
        }
        // Join relative to the last path segment, not replace it.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| StoreError::Unavailable("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StoreError::Unavailable(format!("API URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn try_store(&self, crop: &RgbImage) -> Result<String, StoreError> {
        let bytes = encode_jpeg(crop)?;
        let part = multipart::Part::bytes(bytes)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("file", part);

        let url = self.endpoint(&["v1", "images", "upload"])?;
        let response = self.http.post(url).multipart(form).send()?;
        if response.status() != StatusCode::OK {
            return Err(rejected(response));
        }

        let body: serde_json::Value = response.json()?;
        extract_id(&body)
    }

    fn try_load_all(
        &self,
        conversion: Option<ColorConversion>,
    ) -> Result<Vec<StoredFace>, StoreError> {
        let url = self.endpoint(&["v1", "images", "get"])?;
        let response = self.http.get(url).send()?;

        // Some servers answer an empty collection with 404.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if response.status() != StatusCode::OK {
            return Err(rejected(response));
        }

        let listed: Vec<ListedImage> = response.json()?;
        let mut faces = Vec::with_capacity(listed.len());
        for entry in listed {
            let Some(id) = entry.id.as_ref().and_then(id_string) else {
                tracing::warn!("skipping listed image without id");
                continue;
            };
            let Some(payload) = entry.base64.as_deref().filter(|s| !s.is_empty()) else {
                tracing::debug!(id = %id, "skipping listed image without payload");
                continue;
            };
            let bytes = match BASE64.decode(payload.trim()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping image with invalid base64");
                    continue;
                }
            };
            match image::load_from_memory(&bytes) {
                Ok(img) => faces.push(StoredFace {
                    id,
                    image: convert(img, conversion),
                }),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping undecodable image"),
            }
        }
        Ok(faces)
    }
}

impl FaceStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn store(&self, crop: &RgbImage) -> Result<String, StoreError> {
        match self.try_store(crop) {
            Ok(id) => {
                tracing::debug!(id = %id, "face uploaded");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "face upload failed");
                Err(e)
            }
        }
    }

    fn load_all(&self, conversion: Option<ColorConversion>) -> Vec<StoredFace> {
        match self.try_load_all(conversion) {
            Ok(faces) => {
                tracing::info!(count = faces.len(), "loaded stored faces from remote");
                faces
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch stored faces; starting empty");
                Vec::new()
            }
        }
    }

    fn ping(&self) -> bool {
        let result = self
            .endpoint(&["v1", "images", "ping"])
            .and_then(|url| Ok(self.http.get(url).send()?));

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                tracing::info!(url = %self.base_url, "remote image store reachable");
                true
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "remote image store ping rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote image store unreachable");
                false
            }
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&["v1", "images", id])?;
        let response = self.http.delete(url).send()?;
        match response.status() {
            s if s.is_success() => {
                tracing::info!(id, "remote image deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            _ => Err(rejected(response)),
        }
    }

    fn info(&self, id: &str) -> Result<serde_json::Value, StoreError> {
        let url = self.endpoint(&["v1", "images", "info", id])?;
        let response = self.http.get(url).send()?;
        match response.status() {
            StatusCode::OK => Ok(response.json()?),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            _ => Err(rejected(response)),
        }
    }
}

fn rejected(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    StoreError::Rejected { status, body }
}

/// Pull the image identifier out of an upload response (`id` or `fileId`).
fn extract_id(body: &serde_json::Value) -> Result<String, StoreError> {
    body.get("id")
        .or_else(|| body.get("fileId"))
        .and_then(id_string)
        .ok_or_else(|| StoreError::Malformed(format!("upload response has no id: {body}")))
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_id_variants() {
        assert_eq!(extract_id(&json!({"id": "abc"})).unwrap(), "abc");
        assert_eq!(extract_id(&json!({"fileId": "f-1", "fileName": "face.jpg"})).unwrap(), "f-1");
        assert_eq!(extract_id(&json!({"id": 42})).unwrap(), "42");
        assert!(matches!(extract_id(&json!({"id": ""})), Err(StoreError::Malformed(_))));
        assert!(matches!(extract_id(&json!({"name": "x"})), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let timeout = Duration::from_secs(1);
        let store = RemoteStore::new("https://faces.example/api", "tok", timeout, false).unwrap();
        let url = store.endpoint(&["v1", "images", "ping"]).unwrap();
        assert_eq!(url.as_str(), "https://faces.example/api/v1/images/ping");

        let store = RemoteStore::new("https://faces.example/", "tok", timeout, false).unwrap();
        let url = store.endpoint(&["v1", "images", "info", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "https://faces.example/v1/images/info/a%20b%2Fc");
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = RemoteStore::new("not a url", "tok", Duration::from_secs(1), false);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
