//! Conversational shell for Parley.
//!
//! Provides context assembly over stored history, the pluggable
//! search-and-summarize capability set, the agent dispatcher, and the
//! console-driven session state machine.

pub mod capability;
pub mod context;
pub mod dispatcher;
pub mod session;
pub mod upstream;

pub use capability::{
    default_capabilities, AcademicSearch, Capability, GeneralSearch, VideoSearch,
};
pub use context::{ContextAssembler, NO_PRIOR_CONTEXT};
pub use dispatcher::{AgentDispatcher, ASSISTANT_UNAVAILABLE, SEARCH_UNAVAILABLE};
pub use session::{Console, SessionController, SessionState};
pub use upstream::{CompletionClient, SearchClient};
