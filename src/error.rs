//! Error types for spica-mcp.

use thiserror::Error;

/// Result type alias for spica-mcp operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors raised by the tool layer and the JSON-RPC server.
#[derive(Error, Debug)]
pub enum McpError {
    /// A required tool argument is absent.
    #[error("missing required argument '{0}'")]
    MissingArg(String),

    /// A tool argument does not match the declared schema.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// No tool is registered under this name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    /// A remote call made on behalf of a tool failed.
    #[error("Failed to {action}: {source}")]
    Failed {
        /// What the tool was doing, e.g. "delete bucket"
        action: String,
        /// The normalized request error
        #[source]
        source: RequestError,
    },

    /// The documentation provider is not configured or rejected the input.
    #[error("{0}")]
    Docs(String),

    /// Stdio failure in the server loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Name of the offending argument for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            McpError::MissingArg(name) | McpError::InvalidArg { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether this error is a schema rejection raised before a handler ran.
    pub fn is_validation(&self) -> bool {
        matches!(self, McpError::MissingArg(_) | McpError::InvalidArg { .. })
    }
}

/// Errors from a single HTTP exchange with the Spica API or the docs provider.
///
/// `Transport` and `Remote` carry the already-normalized message: the remote
/// body pretty-printed as JSON when one was returned, otherwise the client
/// error text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Base URL or credential missing; no network call was attempted.
    #[error("configuration error: {0}")]
    Config(String),

    /// Verb outside GET/POST/PUT/PATCH/DELETE.
    #[error("unsupported HTTP method '{0}'")]
    UnsupportedMethod(String),

    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Normalized response body
        message: String,
    },
}

/// Build a closure that tags a [`RequestError`] with the action that failed.
pub fn failed(action: &str) -> impl FnOnce(RequestError) -> McpError + '_ {
    move |source| McpError::Failed {
        action: action.to_string(),
        source,
    }
}
