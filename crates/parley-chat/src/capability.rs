//! The closed capability set.
//!
//! Every agent kind implements the same shape: `(query, context)` into
//! search hits, `(prompt)` into a summary. The dispatcher drives that
//! shape and is never modified when a kind is added.

use std::sync::Arc;

use async_trait::async_trait;

use parley_core::types::{AgentKind, SearchHit};

use crate::upstream::{CompletionClient, SearchClient};

/// A pluggable search-and-summarize agent kind.
///
/// `None` from either method means the upstream is unavailable; the
/// dispatcher degrades it to a fixed failure string.
#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Persona handed to the reasoning upstream.
    fn system_role(&self) -> &str;

    /// Run the capability's search with its engine hint.
    async fn search(&self, query: &str, context: &str) -> Option<Vec<SearchHit>>;

    /// Single-turn reasoning call under the capability's persona.
    async fn summarize(&self, prompt: &str) -> Option<String>;
}

/// Build the default registry backed by the shared upstream clients.
pub fn default_capabilities(
    search: Arc<SearchClient>,
    llm: Arc<CompletionClient>,
) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(GeneralSearch::new(Arc::clone(&search), Arc::clone(&llm))),
        Arc::new(AcademicSearch::new(Arc::clone(&search), Arc::clone(&llm))),
        Arc::new(VideoSearch::new(search, llm)),
    ]
}

// =============================================================================
// GeneralSearch
// =============================================================================

/// General-purpose web search.
pub struct GeneralSearch {
    search: Arc<SearchClient>,
    llm: Arc<CompletionClient>,
}

impl GeneralSearch {
    pub fn new(search: Arc<SearchClient>, llm: Arc<CompletionClient>) -> Self {
        Self { search, llm }
    }
}

#[async_trait]
impl Capability for GeneralSearch {
    fn kind(&self) -> AgentKind {
        AgentKind::General
    }

    fn system_role(&self) -> &str {
        "You are a helpful research assistant."
    }

    async fn search(&self, query: &str, _context: &str) -> Option<Vec<SearchHit>> {
        self.search.search(query, "google").await
    }

    async fn summarize(&self, prompt: &str) -> Option<String> {
        self.llm.complete(prompt, self.system_role()).await
    }
}

// =============================================================================
// AcademicSearch
// =============================================================================

/// Scholarly search over an academic engine.
pub struct AcademicSearch {
    search: Arc<SearchClient>,
    llm: Arc<CompletionClient>,
}

impl AcademicSearch {
    pub fn new(search: Arc<SearchClient>, llm: Arc<CompletionClient>) -> Self {
        Self { search, llm }
    }
}

#[async_trait]
impl Capability for AcademicSearch {
    fn kind(&self) -> AgentKind {
        AgentKind::Academic
    }

    fn system_role(&self) -> &str {
        "You are an academic assistant."
    }

    async fn search(&self, query: &str, _context: &str) -> Option<Vec<SearchHit>> {
        self.search.search(query, "google scholar").await
    }

    async fn summarize(&self, prompt: &str) -> Option<String> {
        self.llm.complete(prompt, self.system_role()).await
    }
}

// =============================================================================
// VideoSearch
// =============================================================================

/// Video search over a media engine.
pub struct VideoSearch {
    search: Arc<SearchClient>,
    llm: Arc<CompletionClient>,
}

impl VideoSearch {
    pub fn new(search: Arc<SearchClient>, llm: Arc<CompletionClient>) -> Self {
        Self { search, llm }
    }
}

#[async_trait]
impl Capability for VideoSearch {
    fn kind(&self) -> AgentKind {
        AgentKind::Video
    }

    fn system_role(&self) -> &str {
        "You are a media research assistant."
    }

    async fn search(&self, query: &str, _context: &str) -> Option<Vec<SearchHit>> {
        self.search.search(query, "youtube").await
    }

    async fn summarize(&self, prompt: &str) -> Option<String> {
        self.llm.complete(prompt, self.system_role()).await
    }
}
