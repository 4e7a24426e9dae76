//! Context assembly over stored message history.
//!
//! Derives the bounded textual context that primes an agent call: the
//! trailing window of a chat's messages rendered one per line.

use parley_core::types::{Role, StoredMessage};

/// Fixed sentinel returned when a chat has no prior messages.
pub const NO_PRIOR_CONTEXT: &str = "No prior context available.";

/// Default number of trailing messages in a context window.
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Condenses a chat's history into a bounded context string.
///
/// Pure and deterministic: the same message sequence always yields the
/// same context. Windowing is by message count, oldest dropped first.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    window: usize,
}

impl ContextAssembler {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Render the last `window` messages as `"Role: content"` lines in
    /// chronological order.
    ///
    /// An empty history yields [`NO_PRIOR_CONTEXT`].
    pub fn summarize(&self, messages: &[StoredMessage]) -> String {
        if messages.is_empty() {
            return NO_PRIOR_CONTEXT.to_string();
        }

        let start = messages.len().saturating_sub(self.window);
        messages[start..]
            .iter()
            .map(|msg| format!("{}: {}", heading(msg.role), msg.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

fn heading(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}
