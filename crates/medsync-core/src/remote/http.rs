//! HTTP document store client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::SyncSettings;
use crate::models::{OwnerId, Record, RecordId, RecordKind};
use crate::store::{
    collection_path, document_path, RemoteError, RemoteResult, RemoteStore, RemoteWrite,
};
use crate::sync::ReachabilityProbe;
use crate::util::{compact_text, is_http_url};

/// Remote store backed by the document HTTP API.
///
/// Every request is bounded by the client timeout; a request that runs over
/// surfaces as [`RemoteError::Timeout`].
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl AsRef<str>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(RemoteError::Unavailable(format!(
                "remote URL must include http:// or https://, got '{base_url}'"
            )));
        }

        Ok(Self {
            base_url,
            auth_token,
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn from_settings(settings: &SyncSettings) -> RemoteResult<Self> {
        Self::new(
            &settings.remote_url,
            settings.auth_token.clone(),
            settings.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a store path onto the base URL, percent-encoding each segment.
    fn url(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{encoded}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(
        &self,
        kind: RecordKind,
        owner_id: &OwnerId,
        record: &Record,
    ) -> RemoteResult<()> {
        let document = record
            .to_document()
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        let url = self.url(&document_path(kind, owner_id, &record.id));
        self.send(self.client.put(url).json(&document)).await?;
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, owner_id: &OwnerId, id: &RecordId) -> RemoteResult<()> {
        let url = self.url(&document_path(kind, owner_id, id));
        match self.send(self.client.delete(url)).await {
            Ok(_) | Err(RemoteError::Rejected { status: 404, .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> RemoteResult<Vec<Record>> {
        let url = self.url(&collection_path(kind, owner_id));
        let response = self.send(self.client.get(url)).await?;
        let payload = response
            .json::<DocumentsResponse>()
            .await
            .map_err(|error| RemoteError::Decode(error.to_string()))?;

        let mut records = Vec::with_capacity(payload.documents.len());
        for document in payload.documents {
            match Record::from_document(kind, document) {
                Ok(record) => records.push(record),
                Err(error) => {
                    tracing::warn!(kind = %kind, owner = %owner_id, "Skipping undecodable remote document: {error}");
                }
            }
        }
        Ok(records)
    }

    async fn commit(&self, kind: RecordKind, writes: &[RemoteWrite]) -> Vec<RemoteResult<()>> {
        let mut outcomes: Vec<Option<RemoteResult<()>>> = Vec::with_capacity(writes.len());
        let mut operations = Vec::with_capacity(writes.len());
        let mut deletes = Vec::with_capacity(writes.len());
        for write in writes {
            match CommitOperation::for_write(kind, write) {
                Ok(operation) => {
                    deletes.push(matches!(operation, CommitOperation::Delete { .. }));
                    operations.push(operation);
                    outcomes.push(None);
                }
                Err(error) => outcomes.push(Some(Err(error))),
            }
        }
        if operations.is_empty() {
            return outcomes.into_iter().flatten().collect();
        }

        let request = self
            .client
            .post(self.url("commit"))
            .json(&CommitRequest { writes: operations });
        let results = match self.send(request).await {
            Ok(response) => response
                .json::<CommitResponse>()
                .await
                .map(|payload| payload.results)
                .map_err(|error| RemoteError::Decode(error.to_string())),
            Err(error) => Err(error),
        };

        match results {
            Ok(results) => {
                let mut results = results.into_iter();
                let pending = outcomes.iter_mut().filter(|outcome| outcome.is_none());
                for (outcome, is_delete) in pending.zip(deletes) {
                    *outcome = Some(match results.next() {
                        Some(result) => result.into_outcome(is_delete),
                        None => Err(RemoteError::Decode(
                            "commit response is missing a result".to_string(),
                        )),
                    });
                }
            }
            Err(error) => {
                tracing::warn!(kind = %kind, "Remote commit failed: {error}");
                for outcome in outcomes.iter_mut().filter(|outcome| outcome.is_none()) {
                    *outcome = Some(Err(replicate_error(&error)));
                }
            }
        }

        outcomes.into_iter().flatten().collect()
    }
}

#[async_trait]
impl ReachabilityProbe for HttpRemoteStore {
    async fn is_reachable(&self) -> bool {
        match self.send(self.client.get(self.url("health"))).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!("Health check failed: {error}");
                false
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct CommitRequest {
    writes: Vec<CommitOperation>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum CommitOperation {
    Upsert {
        path: String,
        document: serde_json::Value,
    },
    Delete {
        path: String,
    },
}

impl CommitOperation {
    fn for_write(kind: RecordKind, write: &RemoteWrite) -> RemoteResult<Self> {
        match write {
            RemoteWrite::Upsert(record) => Ok(Self::Upsert {
                path: document_path(kind, &record.owner_id, &record.id),
                document: record
                    .to_document()
                    .map_err(|error| RemoteError::Decode(error.to_string()))?,
            }),
            RemoteWrite::Delete { owner_id, id } => Ok(Self::Delete {
                path: document_path(kind, owner_id, id),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<CommitResult>,
}

#[derive(Debug, Deserialize)]
struct CommitResult {
    ok: bool,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

impl CommitResult {
    /// A delete of a missing document counts as done, as it does for [`RemoteStore::delete`].
    fn into_outcome(self, is_delete: bool) -> RemoteResult<()> {
        let status = self.status.unwrap_or(StatusCode::CONFLICT.as_u16());
        if self.ok || (is_delete && status == StatusCode::NOT_FOUND.as_u16()) {
            return Ok(());
        }
        Err(RemoteError::Rejected {
            status,
            message: self
                .error
                .unwrap_or_else(|| "write rejected".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else if error.is_connect() {
        RemoteError::Unavailable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

/// One failed commit request fails every write it carried.
fn replicate_error(error: &RemoteError) -> RemoteError {
    match error {
        RemoteError::Timeout => RemoteError::Timeout,
        RemoteError::Unavailable(message) => RemoteError::Unavailable(message.clone()),
        RemoteError::Rejected { status, message } => RemoteError::Rejected {
            status: *status,
            message: message.clone(),
        },
        RemoteError::Decode(message) => RemoteError::Decode(message.clone()),
        RemoteError::Http(error) => RemoteError::Unavailable(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::models::{Medication, RecordBody};

    /// Accept one connection, capture the raw request, answer with `body`.
    async fn spawn_one_shot_server(
        status_line: &str,
        body: &str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (captured_tx, captured_rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = captured_tx.send(request);
            }
        });

        (format!("http://{address}"), captured_rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let Ok(read) = socket.read(&mut chunk).await else {
                break;
            };
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn store(base_url: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(
            base_url,
            Some("token-123".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    fn medication() -> Record {
        Record::new(
            owner(),
            RecordBody::Medication(Medication {
                name: "Metformin".to_string(),
                dosage: "500mg".to_string(),
                ..Medication::default()
            }),
        )
    }

    #[test]
    fn new_rejects_non_http_url() {
        let error = HttpRemoteStore::new("sync.example.com", None, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(error, RemoteError::Unavailable(_)));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, r#"{"message":" owner mismatch "}"#),
            "owner mismatch"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[tokio::test]
    async fn upsert_puts_document_with_bearer_token() {
        let (base_url, captured) = spawn_one_shot_server("200 OK", "{}").await;
        let record = medication();

        store(&base_url)
            .upsert(RecordKind::Medication, &owner(), &record)
            .await
            .unwrap();

        let request = captured.await.unwrap();
        assert!(request.starts_with(&format!("PUT /owners/u1/medications/{} ", record.id)));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer token-123"));
        assert!(request.contains(r#""name":"Metformin""#));
        assert!(request.contains(r#""ownerId":"u1""#));
    }

    #[tokio::test]
    async fn delete_treats_not_found_as_success() {
        let (base_url, _captured) =
            spawn_one_shot_server("404 Not Found", r#"{"error":"missing"}"#).await;

        store(&base_url)
            .delete(RecordKind::Doctor, &owner(), &RecordId::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_rejections() {
        let (base_url, _captured) =
            spawn_one_shot_server("500 Internal Server Error", r#"{"message":"boom"}"#).await;

        let error = store(&base_url)
            .upsert(RecordKind::Medication, &owner(), &medication())
            .await
            .unwrap_err();
        match error {
            RemoteError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_all_skips_undecodable_documents() {
        let record = medication();
        let body = serde_json::json!({
            "documents": [
                record.to_document().unwrap(),
                { "id": "not-a-uuid", "ownerId": "u1", "updatedAt": 3 }
            ]
        })
        .to_string();
        let (base_url, captured) = spawn_one_shot_server("200 OK", &body).await;

        let records = store(&base_url)
            .fetch_all(RecordKind::Medication, &owner())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
        assert!(!records[0].dirty);
        assert!(captured
            .await
            .unwrap()
            .starts_with("GET /owners/u1/medications "));
    }

    #[tokio::test]
    async fn commit_maps_results_in_order() {
        let (base_url, captured) = spawn_one_shot_server(
            "200 OK",
            r#"{"results":[{"ok":true},{"ok":false,"error":"stale"}]}"#,
        )
        .await;
        let upsert = medication();
        let mut deleted = medication();
        deleted.tombstone();
        let writes = vec![
            RemoteWrite::for_record(&upsert),
            RemoteWrite::for_record(&deleted),
        ];

        let outcomes = store(&base_url)
            .commit(RecordKind::Medication, &writes)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_ok());
        assert!(matches!(
            &outcomes[1],
            Err(RemoteError::Rejected { message, .. }) if message == "stale"
        ));

        let request = captured.await.unwrap();
        assert!(request.starts_with("POST /commit "));
        assert!(request.contains(r#""op":"upsert""#));
        assert!(request.contains(r#""op":"delete""#));
        assert!(request.contains(&format!(r#""path":"owners/u1/medications/{}""#, deleted.id)));
    }

    #[tokio::test]
    async fn owner_segment_is_percent_encoded() {
        let (base_url, captured) = spawn_one_shot_server("200 OK", "{}").await;
        let owner = OwnerId::new("alice#1").unwrap();
        let mut record = medication();
        record.owner_id = owner.clone();

        store(&base_url)
            .upsert(RecordKind::Medication, &owner, &record)
            .await
            .unwrap();

        let request = captured.await.unwrap();
        assert!(request.starts_with(&format!(
            "PUT /owners/alice%231/medications/{} HTTP/1.1",
            record.id
        )));
    }

    #[tokio::test]
    async fn commit_treats_missing_document_on_delete_as_success() {
        let (base_url, _captured) = spawn_one_shot_server(
            "200 OK",
            r#"{"results":[{"ok":false,"status":404,"error":"missing"},{"ok":false,"status":404,"error":"missing"},{"ok":false,"error":"stale"}]}"#,
        )
        .await;
        let mut deleted = medication();
        deleted.tombstone();
        let writes = vec![
            RemoteWrite::for_record(&deleted),
            RemoteWrite::for_record(&medication()),
            RemoteWrite::for_record(&medication()),
        ];

        let outcomes = store(&base_url)
            .commit(RecordKind::Medication, &writes)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(matches!(
            &outcomes[1],
            Err(RemoteError::Rejected { status: 404, message }) if message == "missing"
        ));
        assert!(matches!(
            &outcomes[2],
            Err(RemoteError::Rejected { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn failed_commit_fails_every_write() {
        let (base_url, _captured) = spawn_one_shot_server("503 Service Unavailable", "").await;
        let writes = vec![
            RemoteWrite::for_record(&medication()),
            RemoteWrite::for_record(&medication()),
        ];

        let outcomes = store(&base_url)
            .commit(RecordKind::Medication, &writes)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, Err(RemoteError::Rejected { status: 503, .. }))));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            }
        });

        let store = HttpRemoteStore::new(
            format!("http://{address}"),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let error = store
            .fetch_all(RecordKind::Doctor, &owner())
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Timeout));
        assert!(error.is_connectivity());
    }

    #[tokio::test]
    async fn health_check_reports_reachability() {
        let (base_url, captured) = spawn_one_shot_server("200 OK", "{}").await;
        assert!(store(&base_url).is_reachable().await);
        assert!(captured.await.unwrap().starts_with("GET /health "));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        assert!(!store(&closed).is_reachable().await);
    }
}
