//! HTTP adapter for the remote document store

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{ChangeKind, Document, DocumentChange, RemoteStore};
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Document store client over a REST API laid out as
/// `{base}/users/{userId}/{collection}[/{id}]`.
///
/// The API has no push channel, so [`subscribe`](RemoteStore::subscribe) is
/// implemented as a polling loop that diffs consecutive collection snapshots
/// into added/modified/removed events.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl HttpRemoteStore {
    /// Create a client for the given API base URL
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key,
            client: reqwest::Client::builder().build()?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the subscription polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn collection_url(&self, user_id: &str, collection: &str) -> String {
        format!("{}/users/{user_id}/{collection}", self.base_url)
    }

    fn document_url(&self, user_id: &str, collection: &str, id: &str) -> String {
        format!("{}/users/{user_id}/{collection}/{id}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put_document(
        &self,
        user_id: &str,
        collection: &str,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<()> {
        let url = self.document_url(user_id, collection, id);
        let response = self
            .authorize(self.client.put(&url))
            .json(&fields)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_document(&self, user_id: &str, collection: &str, id: &str) -> Result<()> {
        let url = self.document_url(user_id, collection, id);
        let response = self.authorize(self.client.delete(&url)).send().await?;

        // A document already gone upstream still counts as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_collection(&self, user_id: &str, collection: &str) -> Result<Vec<Document>> {
        let url = self.collection_url(user_id, collection);
        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;

        let payload = response.json::<Vec<serde_json::Value>>().await?;
        payload
            .into_iter()
            .map(|fields| {
                let id = fields
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
                    .ok_or_else(|| {
                        Error::Remote("document payload is missing an id".to_string())
                    })?;
                Ok(Document { id, fields })
            })
            .collect()
    }

    async fn subscribe(
        &self,
        user_id: &str,
        collection: &str,
    ) -> Result<mpsc::Receiver<Vec<DocumentChange>>> {
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let store = self.clone();
        let user_id = user_id.to_string();
        let collection = collection.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.poll_interval);
            let mut known: Option<HashMap<String, serde_json::Value>> = None;

            loop {
                interval.tick().await;

                let snapshot = match store.fetch_collection(&user_id, &collection).await {
                    Ok(docs) => docs,
                    Err(error) => {
                        tracing::warn!(%collection, "Change poll failed, will retry: {error}");
                        continue;
                    }
                };

                let current: HashMap<String, serde_json::Value> = snapshot
                    .into_iter()
                    .map(|doc| (doc.id, doc.fields))
                    .collect();
                let batch = diff_snapshots(known.as_ref(), &current);
                known = Some(current);

                if batch.is_empty() {
                    continue;
                }
                if tx.send(batch).await.is_err() {
                    // Subscriber went away; stop polling
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// Diff two collection snapshots into a change batch.
///
/// With no previous snapshot, everything is reported as `Added` (the initial
/// snapshot a push-based listener would deliver).
fn diff_snapshots(
    previous: Option<&HashMap<String, serde_json::Value>>,
    current: &HashMap<String, serde_json::Value>,
) -> Vec<DocumentChange> {
    let mut batch = Vec::new();

    for (id, fields) in current {
        let kind = match previous.and_then(|prev| prev.get(id)) {
            None => ChangeKind::Added,
            Some(old) if old != fields => ChangeKind::Modified,
            Some(_) => continue,
        };
        batch.push(DocumentChange {
            kind,
            doc: Document {
                id: id.clone(),
                fields: fields.clone(),
            },
        });
    }

    if let Some(previous) = previous {
        for (id, fields) in previous {
            if !current.contains_key(id) {
                batch.push(DocumentChange {
                    kind: ChangeKind::Removed,
                    doc: Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    },
                });
            }
        }
    }

    batch
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map a non-2xx response to [`Error::Remote`] with a compact message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(&body) {
        if let Some(message) = payload.message.or(payload.error) {
            return Err(Error::Remote(format!(
                "{} ({})",
                message.trim(),
                status.as_u16()
            )));
        }
    }

    let trimmed = compact_text(&body);
    if trimmed.is_empty() {
        Err(Error::Remote(format!("HTTP {}", status.as_u16())))
    } else {
        Err(Error::Remote(format!("{trimmed} ({})", status.as_u16())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_new_rejects_bad_base_url() {
        assert!(HttpRemoteStore::new("api.example.com", None).is_err());
        assert!(HttpRemoteStore::new("https://api.example.com/", None).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_document_hits_document_path() {
        let server = MockServer::start().await;
        let fields = json!({"id": "t1", "userId": "u1", "title": "Buy milk"});

        Mock::given(method("PUT"))
            .and(path("/users/u1/tasks/t1"))
            .and(body_json(&fields))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri(), None).unwrap();
        store
            .put_document("u1", "tasks", "t1", fields)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_collection_parses_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "n1", "title": "First"},
                {"id": "n2", "title": "Second"}
            ])))
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri(), None).unwrap();
        let docs = store.fetch_collection("u1", "notes").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "n1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_treats_not_found_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/users/u1/tasks/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri(), None).unwrap();
        store.delete_document("u1", "tasks", "gone").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1/tasks"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"error": "permission denied"})),
            )
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri(), None).unwrap();
        let error = store.fetch_collection("u1", "tasks").await.unwrap_err();
        assert!(error.to_string().contains("permission denied"));
        assert!(error.to_string().contains("403"));
    }

    #[test]
    fn test_diff_snapshots_initial_is_all_added() {
        let current = HashMap::from([("a".to_string(), json!({"id": "a"}))]);
        let batch = diff_snapshots(None, &current);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeKind::Added);
    }

    #[test]
    fn test_diff_snapshots_modified_and_removed() {
        let previous = HashMap::from([
            ("a".to_string(), json!({"id": "a", "v": 1})),
            ("b".to_string(), json!({"id": "b"})),
        ]);
        let current = HashMap::from([("a".to_string(), json!({"id": "a", "v": 2}))]);

        let batch = diff_snapshots(Some(&previous), &current);
        assert_eq!(batch.len(), 2);
        assert!(batch
            .iter()
            .any(|c| c.kind == ChangeKind::Modified && c.doc.id == "a"));
        assert!(batch
            .iter()
            .any(|c| c.kind == ChangeKind::Removed && c.doc.id == "b"));
    }
}
