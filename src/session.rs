//! MCP session state.
//!
//! Bundles the collaborators tool handlers need. Built once at startup from the
//! immutable [`Config`] and shared read-only across invocations.

use std::sync::Arc;

use crate::client::{SpicaClient, Transport};
use crate::config::Config;
use crate::docs::{DocsProvider, DocsService};

/// Handles shared by every tool invocation.
#[derive(Clone)]
pub struct McpSession {
    client: SpicaClient,
    docs: DocsService,
}

impl McpSession {
    /// Create a session talking to the configured Spica instance and docs provider.
    pub fn new(config: &Config) -> Self {
        Self {
            client: SpicaClient::from_config(config),
            docs: DocsService::from_config(&config.docs),
        }
    }

    /// Create a session over explicit collaborators.
    pub fn with_parts(transport: Arc<dyn Transport>, docs: Option<Arc<dyn DocsProvider>>) -> Self {
        Self {
            client: SpicaClient::new(transport),
            docs: docs.map(DocsService::new).unwrap_or_default(),
        }
    }

    /// Spica REST client.
    pub fn client(&self) -> &SpicaClient {
        &self.client
    }

    /// Documentation service.
    pub fn docs(&self) -> &DocsService {
        &self.docs
    }
}
