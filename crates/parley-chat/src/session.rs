//! Console-driven session state machine.
//!
//! The console is the only I/O boundary; transitions are driven by one
//! line of input at a time so the machine is testable with scripted
//! command sequences. No failure inside the loop is fatal: persistence
//! and dispatch errors are printed and the loop continues.

use chrono::Local;
use tracing::warn;

use parley_core::types::{AgentKind, Role};
use parley_storage::UserStore;

use crate::context::ContextAssembler;
use crate::dispatcher::AgentDispatcher;

/// The I/O boundary between the state machine and the operator.
pub trait Console {
    /// Show `prompt` and read one line; `None` when input is closed.
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    /// Write one line of output.
    fn print(&mut self, text: &str);
}

/// Session states. `Exiting` is terminal for the inner chat loop; the
/// outer loop may re-enter `AwaitingChatSelection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingChatSelection,
    AwaitingAgentSelection,
    AwaitingMessage,
    Exiting,
}

/// Drives one user's interactive session.
pub struct SessionController<C: Console> {
    console: C,
    dispatcher: AgentDispatcher,
    store: UserStore,
    assembler: ContextAssembler,
    state: SessionState,
    chat_id: Option<String>,
    agent: Option<AgentKind>,
    /// Monotonic turn counter; disambiguates generated message ids when
    /// several turns land within the same clock second.
    turn: u64,
}

impl<C: Console> SessionController<C> {
    pub fn new(
        console: C,
        dispatcher: AgentDispatcher,
        store: UserStore,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            console,
            dispatcher,
            store,
            assembler,
            state: SessionState::AwaitingChatSelection,
            chat_id: None,
            agent: None,
            turn: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn agent(&self) -> Option<AgentKind> {
        self.agent
    }

    /// Run until the operator declines another session or input closes.
    pub async fn run(&mut self) {
        loop {
            while self.state != SessionState::Exiting {
                if !self.step().await {
                    return;
                }
            }

            let Some(answer) = self
                .console
                .read_line("\nDo you want to start another chat? (yes/no): ")
            else {
                return;
            };
            if answer.trim().eq_ignore_ascii_case("yes") {
                self.reset();
            } else {
                self.console.print("Goodbye!");
                return;
            }
        }
    }

    /// Process one line of input in the current state.
    ///
    /// Returns false when the console has closed.
    pub async fn step(&mut self) -> bool {
        match self.state {
            SessionState::AwaitingChatSelection => self.select_chat(),
            SessionState::AwaitingAgentSelection => self.select_agent(),
            SessionState::AwaitingMessage => self.handle_message().await,
            SessionState::Exiting => false,
        }
    }

    // -- State handlers --

    fn select_chat(&mut self) -> bool {
        self.console.print("\nOptions:");
        self.console.print("  <chat id>   resume an existing chat");
        self.console.print("  new         start a new chat");
        self.console.print("  history     view all chat histories");
        let Some(input) = self
            .console
            .read_line("Enter chat ID (or type 'new' for a new chat): ")
        else {
            return false;
        };
        let input = input.trim().to_string();
        if input.is_empty() {
            return true;
        }

        if input.eq_ignore_ascii_case("history") || input.eq_ignore_ascii_case("view history") {
            self.print_all_histories();
            return true;
        }

        if input.eq_ignore_ascii_case("new") {
            // Id is materialized once the agent is bound, so generated ids
            // carry the agent family prefix.
            self.chat_id = None;
        } else {
            self.console
                .print(&format!("Using existing chat session with ID: {}", input));
            self.chat_id = Some(input);
        }
        self.state = SessionState::AwaitingAgentSelection;
        true
    }

    fn select_agent(&mut self) -> bool {
        self.console.print("\nOptions:");
        self.console.print("1. Academic Search");
        self.console.print("2. Video Search");
        self.console.print("3. Quit Chat");
        let Some(choice) = self.console.read_line("Choose an option (1/2/3): ") else {
            return false;
        };

        let kind = match choice.trim().to_lowercase().as_str() {
            "3" | "quit" => {
                let label = self.chat_id.as_deref().unwrap_or("(unstarted)");
                self.console
                    .print(&format!("Exiting chat session {}.", label));
                self.state = SessionState::Exiting;
                return true;
            }
            "1" | "academic" => AgentKind::Academic,
            "2" | "video" => AgentKind::Video,
            "general" => AgentKind::General,
            _ => {
                self.console.print("Invalid choice. Please try again.");
                return true;
            }
        };
        self.bind_agent(kind);
        true
    }

    async fn handle_message(&mut self) -> bool {
        let Some(input) = self.console.read_line("\nYou: ") else {
            return false;
        };
        let message = input.trim().to_string();

        if message == "@help" {
            return self.help_menu();
        }

        if message.is_empty() {
            self.console
                .print("Message cannot be empty. Please try again.");
            return true;
        }

        let (Some(chat_id), Some(kind)) = (self.chat_id.clone(), self.agent) else {
            // Unreachable through normal transitions; recover by reselecting.
            self.state = SessionState::AwaitingChatSelection;
            return true;
        };
        let user_id = self.store.user_id().to_string();
        self.turn += 1;

        let message_id = format!(
            "{}_msg_{}_{}",
            chat_id,
            Local::now().format("%Y%m%d%H%M%S"),
            self.turn
        );
        if let Err(e) = self
            .store
            .append(&chat_id, &message_id, &message, Role::User, None)
        {
            warn!(user = %user_id, chat = %chat_id, error = %e, "Failed to save user message");
            self.console.print(&format!("Error saving message: {}", e));
            return true;
        }

        let reply = self
            .dispatcher
            .dispatch(kind, &user_id, &chat_id, Some(&message))
            .await;
        self.console.print(&format!("Agent: {}", reply));

        let response_id = format!(
            "{}_response_{}_{}",
            chat_id,
            Local::now().format("%Y%m%d%H%M%S"),
            self.turn
        );
        let metadata = serde_json::json!({ "agent": kind.to_string() });
        if let Err(e) = self.store.append(
            &chat_id,
            &response_id,
            &reply,
            Role::Assistant,
            Some(&metadata),
        ) {
            warn!(user = %user_id, chat = %chat_id, error = %e, "Failed to save agent response");
            self.console
                .print(&format!("Error saving response: {}", e));
        }
        true
    }

    // -- Helpers --

    fn bind_agent(&mut self, kind: AgentKind) {
        self.agent = Some(kind);

        let chat_id = match self.chat_id.clone() {
            Some(id) => id,
            None => {
                let id = format!("{}_chat_{}", kind, Local::now().format("%Y%m%d%H%M"));
                self.console
                    .print(&format!("Starting a new chat session with ID: {}", id));
                self.chat_id = Some(id.clone());
                id
            }
        };

        if let Err(e) = self.store.ensure_chat(&chat_id, &chat_id, &kind.to_string()) {
            warn!(user = %self.store.user_id(), chat = %chat_id, error = %e,
                  "Failed to record chat");
            self.console.print(&format!("Error recording chat: {}", e));
        }
        self.state = SessionState::AwaitingMessage;
    }

    /// `@help` submenu; never consumes a conversational turn.
    fn help_menu(&mut self) -> bool {
        self.console.print("\nOptions:");
        self.console.print("1. Continue chatting");
        self.console.print("2. View chat history");
        self.console.print("3. Change agent");
        let Some(option) = self.console.read_line("Choose an option (1/2/3): ") else {
            return false;
        };

        match option.trim() {
            "1" => {}
            "2" => self.print_chat_context(),
            "3" => {
                self.agent = None;
                self.state = SessionState::AwaitingAgentSelection;
            }
            _ => self.console.print("Invalid choice. Please try again."),
        }
        true
    }

    fn print_chat_context(&mut self) {
        let Some(chat_id) = self.chat_id.clone() else {
            return;
        };
        match self.store.history(&chat_id) {
            Ok(history) => {
                let context = self.assembler.summarize(&history);
                self.console
                    .print(&format!("\nChat Context:\n{}", context));
            }
            Err(e) => {
                warn!(user = %self.store.user_id(), chat = %chat_id, error = %e,
                      "Failed to load chat history");
                self.console
                    .print(&format!("Error fetching history: {}", e));
            }
        }
    }

    fn print_all_histories(&mut self) {
        self.console.print("\nAll Chat Histories:");
        let ids = match self.store.all_chat_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(user = %self.store.user_id(), error = %e, "Failed to list chats");
                self.console.print(&format!("Error fetching chats: {}", e));
                return;
            }
        };
        if ids.is_empty() {
            self.console.print("No chats found for this user.");
            return;
        }
        for chat_id in ids {
            let context = match self.store.history(&chat_id) {
                Ok(history) => self.assembler.summarize(&history),
                Err(e) => format!("Error fetching history: {}", e),
            };
            self.console
                .print(&format!("Chat ID: {}\n{}\n", chat_id, context));
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::AwaitingChatSelection;
        self.chat_id = None;
        self.agent = None;
    }
}

// =============================================================================
// Tests
// =============================================================================
