//! HTTP adapter for the receipt blob store

use async_trait::async_trait;

use super::BlobStore;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url};

/// Blob store client over a simple PUT/DELETE object API.
///
/// Objects are addressed as `{base}/{key}`; the upload URL doubles as the
/// public URL, so `delete_by_url` can validate that a URL belongs to this
/// store before issuing the delete.
#[derive(Clone)]
pub struct HttpBlobStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBlobStore {
    /// Create a client for the given storage base URL
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "storage base URL must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/{key}", self.base_url);
        let response = self
            .authorize(self.client.put(&url))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "upload failed: {} ({})",
                compact_text(&body),
                status.as_u16()
            )));
        }
        Ok(url)
    }

    async fn delete_by_url(&self, url: &str) -> Result<()> {
        if !url.starts_with(&self.base_url) {
            return Err(Error::Storage(format!(
                "URL does not belong to this blob store: {url}"
            )));
        }

        let response = self.authorize(self.client.delete(url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Storage(format!(
                "delete failed: HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_returns_object_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/receipts/u1/r1.jpg"))
            .and(header("Content-Type", "image/jpeg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpBlobStore::new(server.uri(), None).unwrap();
        let url = store
            .upload("receipts/u1/r1.jpg", vec![0xFF, 0xD8], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(url, format!("{}/receipts/u1/r1.jpg", server.uri()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_rejects_foreign_url() {
        let store = HttpBlobStore::new("https://blobs.example.com", None).unwrap();
        let error = store
            .delete_by_url("https://elsewhere.example.com/receipts/u1/r1.jpg")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Storage(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_tolerates_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/receipts/u1/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpBlobStore::new(server.uri(), None).unwrap();
        store
            .delete_by_url(&format!("{}/receipts/u1/gone.jpg", server.uri()))
            .await
            .unwrap();
    }
}
