//! HTTP request adapter for the Spica REST API.
//!
//! [`SpicaClient`] is what tool handlers talk to. It turns a verb, a path and an
//! optional JSON body into an [`ApiRequest`] and hands it to a [`Transport`].
//! [`HttpTransport`] is the real implementation on top of `reqwest`; tests plug
//! in a recording transport instead.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::config::Config;
use crate::convert::merge_shallow;
use crate::error::RequestError;

/// Fixed prefix between the instance URL and every resource path.
pub const API_PREFIX: &str = "/api";

/// HTTP verbs the Spica API is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(RequestError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Which `Authorization` header a request carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    /// The configured credential, sent raw
    Credential,
    /// No `Authorization` header (the identify endpoint)
    Anonymous,
    /// A caller-supplied token, sent raw
    Token(String),
}

/// One outbound call, built per tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Resource path below [`API_PREFIX`], starting with `/`
    pub path: String,
    /// Query parameters in order; keys may repeat
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<JsonValue>,
    /// Header policy
    pub auth: Auth,
}

impl ApiRequest {
    /// Build a request with the default credential and no query.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: Auth::Credential,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach query parameters.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Override the `Authorization` header policy.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }
}

/// Sends an [`ApiRequest`] and returns the decoded response body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one attempt.
    async fn send(&self, request: ApiRequest) -> Result<JsonValue, RequestError>;
}

/// `reqwest`-backed transport for a Spica instance.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from the startup configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
        }
    }

    /// Full URL for a resource path.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn check_config(&self, auth: &Auth) -> Result<(), RequestError> {
        if self.base_url.is_empty() {
            return Err(RequestError::Config(format!(
                "Spica base URL is not set (use {} or spica-config.json)",
                crate::config::ENV_BASE_URL
            )));
        }
        if *auth == Auth::Credential && self.api_key.is_empty() {
            return Err(RequestError::Config(format!(
                "Spica API key is not set (use {} or spica-config.json)",
                crate::config::ENV_API_KEY
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<JsonValue, RequestError> {
        self.check_config(&request.auth)?;

        let url = self.url_for(&request.path);
        debug!(method = %request.method, url = %url, "spica request");

        let mut builder = self
            .http
            .request(request.method.into(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        match &request.auth {
            Auth::Credential => {
                builder = builder.header(reqwest::header::AUTHORIZATION, &self.api_key);
            }
            Auth::Token(token) => {
                builder = builder.header(reqwest::header::AUTHORIZATION, token);
            }
            Auth::Anonymous => {}
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;
        read_response(response).await
    }
}

/// Decode a response, normalizing non-2xx statuses into [`RequestError::Remote`].
pub(crate) async fn read_response(response: reqwest::Response) -> Result<JsonValue, RequestError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RequestError::Transport(e.to_string()))?;

    if status.is_success() {
        return Ok(parse_response_body(&bytes));
    }

    debug!(status = status.as_u16(), "remote returned error status");
    let message = if bytes.is_empty() {
        status.to_string()
    } else {
        normalize_error_body(&bytes)
    };
    Err(RequestError::Remote {
        status: status.as_u16(),
        message,
    })
}

/// Join an instance URL, the API prefix and a resource path.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{API_PREFIX}{path}")
    } else {
        format!("{base}{API_PREFIX}/{path}")
    }
}

/// Decode a success body: empty → `null`, JSON → value, anything else → string.
pub fn parse_response_body(bytes: &[u8]) -> JsonValue {
    if bytes.is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(bytes).to_string()))
}

/// Render an error body: pretty JSON when it parses, raw text otherwise.
pub fn normalize_error_body(bytes: &[u8]) -> String {
    match serde_json::from_slice::<JsonValue>(bytes) {
        Ok(value) => crate::convert::to_pretty_json(&value),
        Err(_) => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Client used by tool handlers.
#[derive(Clone)]
pub struct SpicaClient {
    transport: Arc<dyn Transport>,
}

impl SpicaClient {
    /// Wrap a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Build a client talking HTTP to the configured instance.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(HttpTransport::new(config)))
    }

    /// Issue a request with the verb given by name (case-insensitive).
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, RequestError> {
        let method: HttpMethod = method.parse()?;
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.send(request).await
    }

    /// Issue a prepared request.
    pub async fn send(&self, request: ApiRequest) -> Result<JsonValue, RequestError> {
        self.transport.send(request).await
    }

    /// `GET path`.
    pub async fn get(&self, path: &str) -> Result<JsonValue, RequestError> {
        self.send(ApiRequest::new(HttpMethod::Get, path)).await
    }

    /// `GET path?query`.
    pub async fn get_with_query(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<JsonValue, RequestError> {
        self.send(ApiRequest::new(HttpMethod::Get, path).with_query(query))
            .await
    }

    /// `POST path` with a JSON body.
    pub async fn post(&self, path: &str, body: JsonValue) -> Result<JsonValue, RequestError> {
        self.send(ApiRequest::new(HttpMethod::Post, path).with_body(body))
            .await
    }

    /// `PUT path` with an optional JSON body.
    pub async fn put(
        &self,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, RequestError> {
        let mut request = ApiRequest::new(HttpMethod::Put, path);
        request.body = body;
        self.send(request).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch(&self, path: &str, body: JsonValue) -> Result<JsonValue, RequestError> {
        self.send(ApiRequest::new(HttpMethod::Patch, path).with_body(body))
            .await
    }

    /// `DELETE path`.
    pub async fn delete(&self, path: &str) -> Result<JsonValue, RequestError> {
        self.send(ApiRequest::new(HttpMethod::Delete, path)).await
    }

    /// Read-merge-write update.
    ///
    /// Fetches the full document at `path`, overwrites its top-level keys with
    /// `partial`, sets `id_field` to `id` and `PUT`s the result back. There is no
    /// version check: a write landing between the GET and the PUT is lost.
    pub async fn update_merged(
        &self,
        path: &str,
        id_field: &str,
        id: &str,
        partial: Map<String, JsonValue>,
    ) -> Result<JsonValue, RequestError> {
        let current = self.get(path).await?;
        let mut merged = match current {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        merge_shallow(&mut merged, partial);
        merged.insert(id_field.to_string(), JsonValue::String(id.to_string()));
        self.put(path, Some(JsonValue::Object(merged))).await
    }
}
