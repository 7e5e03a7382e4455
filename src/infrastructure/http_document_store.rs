use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{RemoteDocument, RemoteDocumentStore, Subscription};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpDocumentStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

/// REST document collection client. Realtime updates are produced by polling
/// the collection and emitting a snapshot whenever its contents change.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, serde::Deserialize)]
struct DocumentsPageResponse {
    documents: Option<Vec<RemoteDocument>>,
}

impl HttpDocumentStore {
    pub fn new(config: HttpDocumentStoreConfig) -> Result<Self, InfraError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid remote base url '{}': {error}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "remote base url cannot be a base: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config
                .api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            poll_interval: config.poll_interval.max(Duration::from_millis(10)),
        })
    }

    fn collection_endpoint(&self, collection: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("remote base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("collections");
            segments.push(collection);
            segments.push("documents");
        }
        Ok(url)
    }

    fn document_endpoint(&self, collection: &str, document_id: &str) -> Result<Url, InfraError> {
        let mut url = self.collection_endpoint(collection)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("collection url cannot be a base".to_string())
            })?;
            segments.push(document_id);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key.as_deref() {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    fn http_error(status: StatusCode, body: &str) -> String {
        if body.trim().is_empty() {
            format!("document store error: http {}", status.as_u16())
        } else {
            format!("document store error: http {}; body={body}", status.as_u16())
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| InfraError::RemoteHttp(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::RemoteHttp(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::RemoteHttp(Self::http_error(status, &body)));
        }
        Ok(body)
    }

    pub async fn list_documents(&self, collection: &str) -> Result<Vec<RemoteDocument>, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let body = self
            .send(self.client.get(endpoint), "listing documents")
            .await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: DocumentsPageResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::RemoteHttp(format!("invalid documents payload: {error}; body={body}"))
        })?;
        Ok(parsed.documents.unwrap_or_default())
    }

    async fn poll_collection(
        self,
        collection: String,
        mut last: Vec<RemoteDocument>,
        sender: mpsc::UnboundedSender<Vec<RemoteDocument>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(collection = %collection, "document subscription cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if sender.is_closed() {
                        break;
                    }
                    match self.list_documents(&collection).await {
                        Ok(documents) if documents != last => {
                            if sender.send(documents.clone()).is_err() {
                                break;
                            }
                            last = documents;
                        }
                        Ok(_) => {}
                        Err(error) => {
                            warn!(collection = %collection, %error, "document poll failed");
                        }
                    }
                }
            }
        }
    }
}

fn operation_failed(operation: &str, error: InfraError) -> InfraError {
    match error {
        InfraError::RemoteHttp(message) => {
            InfraError::RemoteOperationFailed(format!("{operation}: {message}"))
        }
        other => other,
    }
}

#[async_trait]
impl RemoteDocumentStore for HttpDocumentStore {
    async fn connect(&self) -> Result<(), InfraError> {
        let endpoint = self.collection_endpoint("_probe")?;
        self.send(self.client.get(endpoint), "probing document store")
            .await
            .map(|_| ())
            .map_err(|error| InfraError::BackendUnavailable(error.to_string()))
    }

    async fn add_document(
        &self,
        collection: &str,
        document_id: &str,
        data: serde_json::Value,
    ) -> Result<(), InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let request = self
            .client
            .post(endpoint)
            .query(&[("documentId", document_id)])
            .json(&data);
        self.send(request, "adding document")
            .await
            .map(|_| ())
            .map_err(|error| operation_failed("add_document", error))
    }

    async fn update_document(
        &self,
        collection: &str,
        document_id: &str,
        patch: serde_json::Value,
    ) -> Result<(), InfraError> {
        let endpoint = self.document_endpoint(collection, document_id)?;
        self.send(self.client.patch(endpoint).json(&patch), "updating document")
            .await
            .map(|_| ())
            .map_err(|error| operation_failed("update_document", error))
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<(), InfraError> {
        let endpoint = self.document_endpoint(collection, document_id)?;
        self.send(self.client.delete(endpoint), "deleting document")
            .await
            .map(|_| ())
            .map_err(|error| operation_failed("delete_document", error))
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, InfraError> {
        let initial = self
            .list_documents(collection)
            .await
            .map_err(|error| InfraError::BackendUnavailable(error.to_string()))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(initial.clone());

        let cancel = CancellationToken::new();
        tokio::spawn(self.clone().poll_collection(
            collection.to_string(),
            initial,
            sender,
            cancel.clone(),
        ));
        Ok(Subscription::new(receiver, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, api_key: Option<&str>) -> HttpDocumentStore {
        HttpDocumentStore::new(HttpDocumentStoreConfig {
            base_url: server.uri(),
            api_key: api_key.map(ToOwned::to_owned),
            request_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(20),
        })
        .expect("store config")
    }

    #[test]
    fn endpoints_are_built_under_base_path() {
        let store = HttpDocumentStore::new(HttpDocumentStoreConfig {
            base_url: "https://docs.example.com/v1/".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
        })
        .expect("store config");

        let collection = store.collection_endpoint("containers").expect("collection url");
        assert_eq!(
            collection.as_str(),
            "https://docs.example.com/v1/collections/containers/documents"
        );
        let document = store
            .document_endpoint("containers", "ctr 1")
            .expect("document url");
        assert_eq!(
            document.as_str(),
            "https://docs.example.com/v1/collections/containers/documents/ctr%201"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = HttpDocumentStore::new(HttpDocumentStoreConfig {
            base_url: "not a url".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn connect_reports_unavailable_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        assert!(matches!(
            store.connect().await,
            Err(InfraError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn add_document_posts_data_with_document_id_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/containers/documents"))
            .and(query_param("documentId", "ctr-1"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({ "title": "Standup" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, Some("secret"));
        store
            .add_document("containers", "ctr-1", json!({ "title": "Standup" }))
            .await
            .expect("add document");
    }

    #[tokio::test]
    async fn failed_write_maps_to_remote_operation_failed() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/collections/containers/documents/ctr-1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let result = store
            .update_document("containers", "ctr-1", json!({ "progress": 0 }))
            .await;
        match result {
            Err(InfraError::RemoteOperationFailed(message)) => {
                assert!(message.contains("http 500"));
                assert!(message.contains("boom"));
            }
            other => panic!("expected remote operation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_document_targets_document_path() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/collections/containers/documents/ctr-9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        store
            .delete_document("containers", "ctr-9")
            .await
            .expect("delete document");
    }

    #[tokio::test]
    async fn subscription_emits_initial_and_changed_snapshots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/containers/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{ "id": "a", "data": { "title": "First" } }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/containers/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [
                    { "id": "a", "data": { "title": "First" } },
                    { "id": "b", "data": { "title": "Second" } }
                ]
            })))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let mut subscription = store.subscribe("containers").await.expect("subscribe");

        let initial = subscription.next_snapshot().await.expect("initial snapshot");
        assert_eq!(initial.len(), 1);

        let changed = tokio::time::timeout(Duration::from_secs(2), subscription.next_snapshot())
            .await
            .expect("changed snapshot in time")
            .expect("feed open");
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[1].id, "b");

        subscription.unsubscribe();
        assert!(subscription.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn empty_list_body_reads_as_empty_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/containers/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let documents = store.list_documents("containers").await.expect("list");
        assert!(documents.is_empty());
    }
}
