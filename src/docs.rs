//! Documentation lookup backed by a vector store and one chat completion.
//!
//! [`DocsProvider`] is the seam to the external service; [`OpenAiProvider`]
//! speaks the OpenAI-compatible REST surface (vector store search, file
//! listing, file content, chat completions). [`DocsService`] holds the logic
//! the tools need on top of it: fallback listing, per-file score aggregation
//! and the answer prompt.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::client::read_response;
use crate::convert::encode_segment;
use crate::config::{DocsConfig, ENV_OPENAI_API_KEY, ENV_VECTOR_STORE_ID};
use crate::error::{failed, McpError, RequestError, Result};

const MAX_SEARCH_RESULTS: u32 = 10;
const SNIPPET_CHARS: usize = 300;
const FILES_PAGE_SIZE: u32 = 100;

const ANSWER_INSTRUCTIONS: &str = "You are an assistant that answers questions about the \
Spica backend platform. Use only the documentation below. If the documentation does not \
contain the answer, say that you could not find it.";

/// One chunked hit from a vector store search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    /// File the chunks belong to
    pub file_id: String,
    /// File name as stored
    #[serde(default)]
    pub filename: String,
    /// Relevance score of this hit
    #[serde(default)]
    pub score: f64,
    /// Free-form attributes attached to the file
    #[serde(default)]
    pub attributes: Option<Map<String, JsonValue>>,
    /// Text chunks
    #[serde(default)]
    pub content: Vec<ContentChunk>,
}

/// A text chunk returned by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentChunk {
    /// Chunk type, normally `text`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Chunk text
    #[serde(default)]
    pub text: String,
}

/// A file listed in the vector store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileEntry {
    /// Provider file id
    pub id: String,
    /// File name when the listing carries one
    #[serde(default)]
    pub filename: Option<String>,
}

/// A single document as returned by `fetch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Provider file id
    pub id: String,
    /// Display title
    pub title: String,
    /// Full text
    pub text: String,
    /// Link to the source
    pub url: String,
    /// Attributes stored with the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, JsonValue>>,
}

/// A search result as exposed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocResult {
    /// Provider file id
    pub id: String,
    /// Display title
    pub title: String,
    /// Snippet of the matched text
    pub text: String,
    /// Link to the source
    pub url: String,
    /// Relevance score, absent for fallback listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A synthesized answer with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Model output
    pub text: String,
    /// File the answer was built from
    pub source_id: String,
    /// Title of that file
    pub source_title: String,
    /// Link to that file
    pub source_url: String,
}

/// External documentation service.
#[async_trait]
pub trait DocsProvider: Send + Sync {
    /// Semantic search over the store.
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, RequestError>;

    /// List every file in the store across all pages.
    async fn list_files(&self) -> std::result::Result<Vec<FileEntry>, RequestError>;

    /// Retrieve one document by id.
    async fn fetch(&self, id: &str) -> std::result::Result<Document, RequestError>;

    /// Run one chat completion and return the reply text.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, RequestError>;
}

/// OpenAI-compatible REST implementation of [`DocsProvider`].
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    vector_store_id: String,
    model: String,
}

impl OpenAiProvider {
    /// Build a provider; both the key and store id are required.
    pub fn new(config: &DocsConfig) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        let vector_store_id = config.vector_store_id.clone()?;
        Some(Self {
            http: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            vector_store_id,
            model: config.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> std::result::Result<JsonValue, RequestError> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "docs provider request");

        let mut builder = self
            .http
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }
        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;
        read_response(response).await
    }
}

#[derive(Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// One page of a cursor-paginated file listing.
#[derive(Deserialize)]
struct FilePage {
    #[serde(default = "Vec::new")]
    data: Vec<FileEntry>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Deserialize)]
struct FileContent {
    #[serde(default)]
    attributes: Option<Map<String, JsonValue>>,
    #[serde(default)]
    content: Vec<ContentChunk>,
    #[serde(default)]
    data: Vec<ContentChunk>,
}

fn decode<T: serde::de::DeserializeOwned>(
    value: JsonValue,
) -> std::result::Result<T, RequestError> {
    serde_json::from_value(value)
        .map_err(|e| RequestError::Transport(format!("unexpected provider response: {e}")))
}

#[async_trait]
impl DocsProvider for OpenAiProvider {
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, RequestError> {
        let path = format!(
            "/vector_stores/{}/search",
            encode_segment(&self.vector_store_id)
        );
        let body = serde_json::json!({
            "query": query,
            "max_num_results": MAX_SEARCH_RESULTS,
        });
        let value = self.call(reqwest::Method::POST, &path, Some(body)).await?;
        Ok(decode::<DataList<SearchHit>>(value)?.data)
    }

    async fn list_files(&self) -> std::result::Result<Vec<FileEntry>, RequestError> {
        let base = format!(
            "/vector_stores/{}/files?limit={FILES_PAGE_SIZE}",
            encode_segment(&self.vector_store_id)
        );
        let mut files = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let path = match &after {
                Some(cursor) => format!("{base}&after={}", urlencoding::encode(cursor)),
                None => base.clone(),
            };
            let page: FilePage = decode(self.call(reqwest::Method::GET, &path, None).await?)?;
            let cursor = page
                .last_id
                .or_else(|| page.data.last().map(|f| f.id.clone()));
            files.extend(page.data);
            match cursor {
                Some(next) if page.has_more && after.as_ref() != Some(&next) => {
                    after = Some(next)
                }
                _ => break,
            }
        }
        debug!(count = files.len(), "listed vector store files");
        Ok(files)
    }

    async fn fetch(&self, id: &str) -> std::result::Result<Document, RequestError> {
        let file: FileObject = decode(
            self.call(
                reqwest::Method::GET,
                &format!("/files/{}", encode_segment(id)),
                None,
            )
            .await?,
        )?;
        let content_path = format!(
            "/vector_stores/{}/files/{}/content",
            encode_segment(&self.vector_store_id),
            encode_segment(id)
        );
        let content: FileContent =
            decode(self.call(reqwest::Method::GET, &content_path, None).await?)?;

        let chunks = if content.content.is_empty() {
            content.data
        } else {
            content.content
        };
        Ok(Document {
            title: file.filename.clone().unwrap_or_else(|| file.id.clone()),
            text: join_chunks(chunks.iter().map(|c| c.text.as_str())),
            url: document_url(&file.id, content.attributes.as_ref()),
            id: file.id,
            metadata: content.attributes,
        })
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, RequestError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let value = self
            .call(reqwest::Method::POST, "/chat/completions", Some(body))
            .await?;
        value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RequestError::Transport("chat completion returned no content".into()))
    }
}

/// Documentation operations used by the `search`, `fetch` and
/// `answer_question` tools.
#[derive(Clone, Default)]
pub struct DocsService {
    provider: Option<Arc<dyn DocsProvider>>,
}

impl DocsService {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn DocsProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A service whose every call reports the missing configuration.
    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    /// Build from configuration; unconfigured when the key or store id is absent.
    pub fn from_config(config: &DocsConfig) -> Self {
        match OpenAiProvider::new(config) {
            Some(provider) => Self::new(Arc::new(provider)),
            None => Self::unconfigured(),
        }
    }

    fn provider(&self) -> Result<&Arc<dyn DocsProvider>> {
        self.provider.as_ref().ok_or_else(|| {
            McpError::Docs(format!(
                "Documentation search is not configured: set {ENV_OPENAI_API_KEY} and {ENV_VECTOR_STORE_ID}"
            ))
        })
    }

    /// Semantic search, falling back to a full file listing when search fails.
    pub async fn search(&self, query: &str) -> Result<Vec<DocResult>> {
        let query = non_blank(query, "query")?;
        let provider = self.provider()?;

        match provider.search(query).await {
            Ok(hits) => Ok(hits.iter().map(hit_to_result).collect()),
            Err(e) => {
                warn!(error = %e, "vector store search failed, listing files instead");
                let files = provider
                    .list_files()
                    .await
                    .map_err(failed("search documentation"))?;
                Ok(files
                    .into_iter()
                    .map(|f| DocResult {
                        title: f.filename.unwrap_or_else(|| f.id.clone()),
                        text: String::new(),
                        url: document_url(&f.id, None),
                        id: f.id,
                        score: None,
                    })
                    .collect())
            }
        }
    }

    /// Retrieve one document.
    pub async fn fetch(&self, id: &str) -> Result<Document> {
        let id = non_blank(id, "id")?;
        if matches!(id, "." | "..") {
            return Err(McpError::InvalidArg {
                name: "id".to_string(),
                reason: "must not be a dot segment".to_string(),
            });
        }
        let provider = self.provider()?;
        provider
            .fetch(id)
            .await
            .map_err(failed("fetch document"))
    }

    /// Answer from the single most relevant document.
    ///
    /// Returns `Ok(None)` when the search finds nothing.
    pub async fn answer_question(&self, query: &str) -> Result<Option<Answer>> {
        let query = non_blank(query, "query")?;
        let provider = self.provider()?;

        let hits = provider
            .search(query)
            .await
            .map_err(failed("search documentation"))?;
        let Some(best) = best_document(&hits) else {
            return Ok(None);
        };
        debug!(file_id = %best.file_id, score = best.score, "answering from document");

        let prompt = build_prompt(&best.text, query);
        let text = provider
            .complete(&prompt)
            .await
            .map_err(failed("generate answer"))?;

        Ok(Some(Answer {
            text,
            source_id: best.file_id,
            source_title: best.title,
            source_url: best.url,
        }))
    }
}

/// Chunks of one file gathered across search hits.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    /// Provider file id
    pub file_id: String,
    /// Display title
    pub title: String,
    /// Link to the source
    pub url: String,
    /// Sum of the hit scores for this file
    pub score: f64,
    /// Concatenated chunk text in provider order
    pub text: String,
}

/// Pick the file with the highest summed score.
///
/// Ties go to the file seen first in provider order.
pub fn best_document(hits: &[SearchHit]) -> Option<RankedDocument> {
    let mut ranked: Vec<(RankedDocument, Vec<&str>)> = Vec::new();

    for hit in hits {
        let chunks = hit.content.iter().map(|c| c.text.as_str());
        match ranked.iter_mut().find(|(doc, _)| doc.file_id == hit.file_id) {
            Some((doc, texts)) => {
                doc.score += hit.score;
                texts.extend(chunks);
            }
            None => ranked.push((
                RankedDocument {
                    file_id: hit.file_id.clone(),
                    title: title_of(hit),
                    url: document_url(&hit.file_id, hit.attributes.as_ref()),
                    score: hit.score,
                    text: String::new(),
                },
                chunks.collect(),
            )),
        }
    }

    let mut best: Option<(RankedDocument, Vec<&str>)> = None;
    for entry in ranked {
        let better = match &best {
            Some((current, _)) => entry.0.score > current.score,
            None => true,
        };
        if better {
            best = Some(entry);
        }
    }

    best.map(|(mut doc, texts)| {
        doc.text = join_chunks(texts);
        doc
    })
}

/// Fill the answer template. Inserted text is never rescanned.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!("{ANSWER_INSTRUCTIONS}\n\nDocumentation:\n{context}\n\nQuestion: {query}\n\nAnswer:")
}

fn non_blank<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(trimmed)
}

fn hit_to_result(hit: &SearchHit) -> DocResult {
    let text = join_chunks(hit.content.iter().map(|c| c.text.as_str()));
    DocResult {
        id: hit.file_id.clone(),
        title: title_of(hit),
        text: snippet(&text),
        url: document_url(&hit.file_id, hit.attributes.as_ref()),
        score: Some(hit.score),
    }
}

fn title_of(hit: &SearchHit) -> String {
    hit.attributes
        .as_ref()
        .and_then(|a| a.get("title"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| (!hit.filename.is_empty()).then(|| hit.filename.clone()))
        .unwrap_or_else(|| hit.file_id.clone())
}

fn document_url(id: &str, attributes: Option<&Map<String, JsonValue>>) -> String {
    attributes
        .and_then(|a| a.get("url"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("https://platform.openai.com/storage/files/{id}"))
}

fn join_chunks<'a>(chunks: impl IntoIterator<Item = &'a str>) -> String {
    chunks.into_iter().collect::<Vec<_>>().join("\n\n")
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{cut}...")
}
