//! Tests of the OpenAI-compatible docs provider against an in-process mock.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;

use spica_mcp::config::DocsConfig;
use spica_mcp::docs::{DocsProvider, OpenAiProvider};

/// Path, query and bearer of each request the mock saw.
type Log = Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>;

struct MockProvider {
    base_url: String,
    log: Log,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockProvider {
    async fn spawn() -> Self {
        let log: Log = Arc::default();
        let app = Router::new().fallback(respond).with_state(log.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{addr}/"),
            log,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn provider(&self) -> OpenAiProvider {
        OpenAiProvider::new(&DocsConfig {
            openai_api_key: Some("sk-test".to_string()),
            vector_store_id: Some("vs_1".to_string()),
            openai_base_url: self.base_url.clone(),
            ..DocsConfig::default()
        })
        .unwrap()
    }
}

async fn respond(State(log): State<Log>, uri: Uri, headers: HeaderMap) -> Response {
    let query = uri.query().map(|q| q.to_string());
    log.lock().unwrap().push((
        uri.path().to_string(),
        query.clone(),
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    ));

    let after = query.as_deref().unwrap_or("").contains("after=file-2");
    let page = if after {
        json!({"data": [{"id": "file-3"}], "has_more": false, "last_id": "file-3"})
    } else {
        json!({
            "data": [{"id": "file-1"}, {"id": "file-2", "filename": "buckets.md"}],
            "has_more": true,
            "last_id": "file-2"
        })
    };
    axum::Json(page).into_response()
}

#[tokio::test]
async fn file_listing_follows_the_cursor() {
    let mock = MockProvider::spawn().await;
    let files = mock.provider().list_files().await.unwrap();

    let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["file-1", "file-2", "file-3"]);
    assert_eq!(files[1].filename.as_deref(), Some("buckets.md"));

    let sent = mock.log.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "/vector_stores/vs_1/files");
    assert_eq!(sent[0].1.as_deref(), Some("limit=100"));
    assert_eq!(sent[1].1.as_deref(), Some("limit=100&after=file-2"));
    assert_eq!(sent[0].2.as_deref(), Some("Bearer sk-test"));
}
