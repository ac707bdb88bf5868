//! Test doubles for the Spica transport and the docs provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::client::{ApiRequest, Transport};
use crate::docs::{DocsProvider, Document, FileEntry, SearchHit};
use crate::error::RequestError;
use crate::session::McpSession;

/// Records every request and replays scripted responses in order.
///
/// Once the script runs out every request succeeds with `{}`.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<ApiRequest>>,
    responses: Mutex<VecDeque<Result<JsonValue, RequestError>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, value: JsonValue) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, err: RequestError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> Result<JsonValue, RequestError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

pub fn session_with(transport: Arc<RecordingTransport>) -> Arc<McpSession> {
    Arc::new(McpSession::with_parts(transport, None))
}

#[derive(Default)]
struct DocsState {
    hits: Vec<SearchHit>,
    search_error: Option<String>,
    files: Vec<FileEntry>,
    document: Option<Document>,
    completion: String,
    search_calls: usize,
    prompts: Vec<String>,
}

/// Docs provider with canned answers; clones share state.
#[derive(Clone, Default)]
pub struct ScriptedDocs {
    state: Arc<Mutex<DocsState>>,
}

impl ScriptedDocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hits(&self, hits: Vec<SearchHit>) {
        self.state.lock().unwrap().hits = hits;
    }

    pub fn fail_search(&self, message: &str) {
        self.state.lock().unwrap().search_error = Some(message.to_string());
    }

    pub fn set_files(&self, files: Vec<FileEntry>) {
        self.state.lock().unwrap().files = files;
    }

    pub fn set_document(&self, document: Document) {
        self.state.lock().unwrap().document = Some(document);
    }

    pub fn set_completion(&self, text: &str) {
        self.state.lock().unwrap().completion = text.to_string();
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.state.lock().unwrap().prompts.last().cloned()
    }
}

#[async_trait]
impl DocsProvider for ScriptedDocs {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, RequestError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        match &state.search_error {
            Some(message) => Err(RequestError::Transport(message.clone())),
            None => Ok(state.hits.clone()),
        }
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>, RequestError> {
        Ok(self.state.lock().unwrap().files.clone())
    }

    async fn fetch(&self, id: &str) -> Result<Document, RequestError> {
        self.state
            .lock()
            .unwrap()
            .document
            .clone()
            .filter(|d| d.id == id)
            .ok_or_else(|| RequestError::Remote {
                status: 404,
                message: format!("No such File object: {id}"),
            })
    }

    async fn complete(&self, prompt: &str) -> Result<String, RequestError> {
        let mut state = self.state.lock().unwrap();
        state.prompts.push(prompt.to_string());
        Ok(state.completion.clone())
    }
}
