//! Agent dispatch: history, context, search, summarize.
//!
//! The dispatcher never fails the session. Every upstream or storage
//! failure degrades to a fixed diagnostic string and is logged with
//! enough context (user, chat, operation) to diagnose without retries.

use std::sync::Arc;

use tracing::warn;

use parley_core::types::{AgentKind, SearchHit};
use parley_storage::StoreFactory;

use crate::capability::Capability;
use crate::context::ContextAssembler;

/// Returned when the search upstream fails or finds nothing.
pub const SEARCH_UNAVAILABLE: &str = "search unavailable";

/// Returned when the reasoning upstream fails.
pub const ASSISTANT_UNAVAILABLE: &str = "assistant unavailable";

/// Routes a user message plus assembled context to a capability and
/// captures the reply.
pub struct AgentDispatcher {
    factory: StoreFactory,
    assembler: ContextAssembler,
    capabilities: Vec<Arc<dyn Capability>>,
    max_results: usize,
}

impl AgentDispatcher {
    pub fn new(
        factory: StoreFactory,
        assembler: ContextAssembler,
        capabilities: Vec<Arc<dyn Capability>>,
        max_results: usize,
    ) -> Self {
        Self {
            factory,
            assembler,
            capabilities,
            max_results,
        }
    }

    /// Look up a registered capability by kind.
    pub fn capability(&self, kind: AgentKind) -> Option<&Arc<dyn Capability>> {
        self.capabilities.iter().find(|c| c.kind() == kind)
    }

    /// Run one agent turn and return the reply text.
    ///
    /// With no explicit `message`, a query is synthesized by asking the
    /// capability's reasoning service to infer intent from the context.
    pub async fn dispatch(
        &self,
        kind: AgentKind,
        user_id: &str,
        chat_id: &str,
        message: Option<&str>,
    ) -> String {
        let Some(capability) = self.capability(kind) else {
            warn!(agent = %kind, user = %user_id, chat = %chat_id, "No capability registered");
            return ASSISTANT_UNAVAILABLE.to_string();
        };

        // History failures degrade to an empty context rather than aborting
        // the turn.
        let history = match self
            .factory
            .open(user_id)
            .and_then(|store| store.history(chat_id))
        {
            Ok(history) => history,
            Err(e) => {
                warn!(user = %user_id, chat = %chat_id, error = %e,
                      "History fetch failed; dispatching without context");
                Vec::new()
            }
        };
        let context = self.assembler.summarize(&history);

        let query = match message {
            Some(m) => m.to_string(),
            None => {
                let prompt = infer_query_prompt(&context);
                match capability.summarize(&prompt).await {
                    Some(q) => q,
                    None => {
                        warn!(agent = %kind, user = %user_id, chat = %chat_id,
                              "Query synthesis failed");
                        return ASSISTANT_UNAVAILABLE.to_string();
                    }
                }
            }
        };

        let hits = match capability.search(&query, &context).await {
            Some(hits) if !hits.is_empty() => hits,
            _ => {
                warn!(agent = %kind, user = %user_id, chat = %chat_id,
                      "Search yielded no results");
                return SEARCH_UNAVAILABLE.to_string();
            }
        };

        let listing = format_results(&hits, self.max_results);
        let prompt = summarize_prompt(user_id, &query, &listing);
        match capability.summarize(&prompt).await {
            Some(summary) => summary,
            None => {
                warn!(agent = %kind, user = %user_id, chat = %chat_id,
                      "Result summarization failed");
                ASSISTANT_UNAVAILABLE.to_string()
            }
        }
    }
}

fn format_results(hits: &[SearchHit], max_results: usize) -> String {
    hits.iter()
        .take(max_results)
        .map(|hit| format!("- {}: {}", hit.title, hit.url))
        .collect::<Vec<_>>()
        .join("\n")
}

fn infer_query_prompt(context: &str) -> String {
    format!(
        "Based on the chat history:\n{}\nWhat should I search for?",
        context
    )
}

fn summarize_prompt(user_id: &str, query: &str, listing: &str) -> String {
    format!(
        "I ran a search for user '{}' with the query '{}'. \
         Here are the top results:\n{}\n\n\
         Please summarize these resources or provide recommendations.",
        user_id, query, listing
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use parley_core::types::Role;

    /// Scripted capability that records what the dispatcher asks of it.
    struct StubCapability {
        kind: AgentKind,
        search_result: Option<Vec<SearchHit>>,
        summary: Option<String>,
        seen_queries: Mutex<Vec<(String, String)>>,
        seen_prompts: Mutex<Vec<String>>,
    }

    impl StubCapability {
        fn new(search_result: Option<Vec<SearchHit>>, summary: Option<String>) -> Self {
            Self {
                kind: AgentKind::Academic,
                search_result,
                summary,
                seen_queries: Mutex::new(Vec::new()),
                seen_prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Capability for StubCapability {
        fn kind(&self) -> AgentKind {
            self.kind
        }

        fn system_role(&self) -> &str {
            "stub"
        }

        async fn search(&self, query: &str, context: &str) -> Option<Vec<SearchHit>> {
            self.seen_queries
                .lock()
                .unwrap()
                .push((query.to_string(), context.to_string()));
            self.search_result.clone()
        }

        async fn summarize(&self, prompt: &str) -> Option<String> {
            self.seen_prompts.lock().unwrap().push(prompt.to_string());
            self.summary.clone()
        }
    }

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit {
                title: "Surface codes".to_string(),
                url: "https://example.org/surface".to_string(),
            },
            SearchHit {
                title: "LDPC codes".to_string(),
                url: "https://example.org/ldpc".to_string(),
            },
        ]
    }

    fn dispatcher_with(
        dir: &tempfile::TempDir,
        stub: Arc<StubCapability>,
    ) -> (AgentDispatcher, StoreFactory) {
        let factory = StoreFactory::new(dir.path());
        let dispatcher = AgentDispatcher::new(
            factory.clone(),
            ContextAssembler::default(),
            vec![stub as Arc<dyn Capability>],
            5,
        );
        (dispatcher, factory)
    }

    // ---- Failure degradation ----

    #[tokio::test]
    async fn test_empty_search_results_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(Some(vec![]), Some("unused".into())));
        let (dispatcher, _) = dispatcher_with(&dir, Arc::clone(&stub));

        let reply = dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("find papers"))
            .await;
        assert_eq!(reply, SEARCH_UNAVAILABLE);
        // The reasoning service is never consulted for results it does not have.
        assert!(stub.seen_prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_unavailable_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(None, Some("unused".into())));
        let (dispatcher, _) = dispatcher_with(&dir, stub);

        let reply = dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("find papers"))
            .await;
        assert_eq!(reply, SEARCH_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_summarize_unavailable_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(Some(hits()), None));
        let (dispatcher, _) = dispatcher_with(&dir, stub);

        let reply = dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("find papers"))
            .await;
        assert_eq!(reply, ASSISTANT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unregistered_capability_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let factory = StoreFactory::new(dir.path());
        let dispatcher =
            AgentDispatcher::new(factory, ContextAssembler::default(), vec![], 5);

        let reply = dispatcher
            .dispatch(AgentKind::Video, "alice", "c1", Some("anything"))
            .await;
        assert_eq!(reply, ASSISTANT_UNAVAILABLE);
    }

    // ---- Happy path ----

    #[tokio::test]
    async fn test_happy_path_returns_summary() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(
            Some(hits()),
            Some("Read the surface code paper first.".into()),
        ));
        let (dispatcher, _) = dispatcher_with(&dir, Arc::clone(&stub));

        let reply = dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("quantum error correction"))
            .await;
        assert_eq!(reply, "Read the surface code paper first.");

        // The explicit message is used as the query verbatim.
        let queries = stub.seen_queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].0, "quantum error correction");

        // The summarization prompt carries the formatted results.
        let prompts = stub.seen_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Surface codes: https://example.org/surface"));
        assert!(prompts[0].contains("user 'alice'"));
    }

    #[tokio::test]
    async fn test_no_history_yields_sentinel_context() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(Some(hits()), Some("ok".into())));
        let (dispatcher, _) = dispatcher_with(&dir, Arc::clone(&stub));

        dispatcher
            .dispatch(AgentKind::Academic, "alice", "fresh_chat", Some("q"))
            .await;

        let queries = stub.seen_queries.lock().unwrap();
        assert_eq!(queries[0].1, crate::context::NO_PRIOR_CONTEXT);
    }

    #[tokio::test]
    async fn test_context_carries_recent_history() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(Some(hits()), Some("ok".into())));
        let (dispatcher, factory) = dispatcher_with(&dir, Arc::clone(&stub));

        let store = factory.open("alice").unwrap();
        store
            .append("c1", "m1", "earlier question", Role::User, None)
            .unwrap();
        store
            .append("c1", "m2", "earlier answer", Role::Assistant, None)
            .unwrap();

        dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("follow-up"))
            .await;

        let queries = stub.seen_queries.lock().unwrap();
        assert_eq!(
            queries[0].1,
            "User: earlier question\nAssistant: earlier answer"
        );
    }

    // ---- Query synthesis ----

    #[tokio::test]
    async fn test_missing_message_synthesizes_query() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(
            Some(hits()),
            Some("synthesized intent".into()),
        ));
        let (dispatcher, _) = dispatcher_with(&dir, Arc::clone(&stub));

        dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", None)
            .await;

        // First reasoning call infers the query; the search then runs with it.
        let prompts = stub.seen_prompts.lock().unwrap();
        assert!(prompts[0].contains("What should I search for?"));
        let queries = stub.seen_queries.lock().unwrap();
        assert_eq!(queries[0].0, "synthesized intent");
    }

    #[tokio::test]
    async fn test_synthesis_failure_degrades_without_searching() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubCapability::new(Some(hits()), None));
        let (dispatcher, _) = dispatcher_with(&dir, Arc::clone(&stub));

        let reply = dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", None)
            .await;
        assert_eq!(reply, ASSISTANT_UNAVAILABLE);
        assert!(stub.seen_queries.lock().unwrap().is_empty());
    }

    // ---- Result formatting ----

    #[tokio::test]
    async fn test_listing_capped_at_max_results() {
        let dir = tempfile::tempdir().unwrap();
        let many: Vec<SearchHit> = (0..10)
            .map(|i| SearchHit {
                title: format!("hit {}", i),
                url: format!("https://example.org/{}", i),
            })
            .collect();
        let stub = Arc::new(StubCapability::new(Some(many), Some("ok".into())));
        let factory = StoreFactory::new(dir.path());
        let dispatcher = AgentDispatcher::new(
            factory,
            ContextAssembler::default(),
            vec![Arc::clone(&stub) as Arc<dyn Capability>],
            3,
        );

        dispatcher
            .dispatch(AgentKind::Academic, "alice", "c1", Some("q"))
            .await;

        let prompts = stub.seen_prompts.lock().unwrap();
        assert!(prompts[0].contains("hit 2"));
        assert!(!prompts[0].contains("hit 3"));
    }

    #[test]
    fn test_format_results() {
        let listing = format_results(&hits(), 5);
        assert_eq!(
            listing,
            "- Surface codes: https://example.org/surface\n- LDPC codes: https://example.org/ldpc"
        );
    }
}
