//! Parley application binary - composition root.
//!
//! Ties together the Parley crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Authenticate the operator against the credential store
//! 3. Provision the user's storage namespace
//! 4. Build the upstream clients, capabilities, and dispatcher
//! 5. Run the console session loop

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parley_chat::{
    default_capabilities, AgentDispatcher, CompletionClient, Console, ContextAssembler,
    SearchClient, SessionController,
};
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_storage::{CredentialStore, StoreFactory};

/// Console backed by stdin/stdout.
struct StdioConsole;

impl Console for StdioConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        std::io::stdout().flush().ok()?;

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => None, // EOF
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
            Err(_) => None,
        }
    }

    fn print(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Drive the login loop: verify an existing account or create a new one.
///
/// Returns the authenticated user id. Passwords are read with echo
/// suppressed and never logged.
fn authenticate(
    credentials: &CredentialStore,
    factory: &StoreFactory,
    console: &mut StdioConsole,
) -> Result<Option<String>, ParleyError> {
    loop {
        console.print("\nWelcome! Please log in or create a new account.");
        let Some(username) = console.read_line("Enter your username: ") else {
            return Ok(None);
        };
        let username = username.trim().to_string();
        if username.is_empty() {
            console.print("Username cannot be empty. Please try again.");
            continue;
        }

        if credentials.contains(&username)? {
            console.print(&format!("Username '{}' found. Please log in.", username));
            let password = rpassword::prompt_password("Enter your password: ")
                .map_err(|e| ParleyError::Credentials(e.to_string()))?;
            if credentials.verify(&username, &password)? {
                console.print(&format!("Welcome back, {}!", username));
                return Ok(Some(username));
            }
            console.print("Incorrect password. Please try again.");
        } else {
            console.print(&format!(
                "Username '{}' not found. Creating a new account...",
                username
            ));
            let password = rpassword::prompt_password("Enter your password: ")
                .map_err(|e| ParleyError::Credentials(e.to_string()))?;
            if password.trim().is_empty() {
                console.print("Password cannot be empty. Please try again.");
                continue;
            }
            credentials.register(&username, &password)?;
            factory.open(&username)?;
            console.print(&format!("Account created for {}. Please proceed.", username));
            return Ok(Some(username));
        }
    }
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (PARLEY_CONFIG env, or ~/.parley/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("PARLEY_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = config_path();
    let config = ParleyConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let factory = StoreFactory::new(data_dir.join("users"));
    let credentials = CredentialStore::new(data_dir.join("credentials.json"));

    let mut console = StdioConsole;
    console.print("Welcome to the Chat System!");

    // Authenticate and provision the user namespace.
    let Some(user_id) = authenticate(&credentials, &factory, &mut console)? else {
        return Ok(());
    };
    let store = factory.open(&user_id)?;
    tracing::info!(user = %user_id, "User namespace ready");

    // Upstream clients and the capability registry.
    let search = Arc::new(SearchClient::new(&config.search));
    let llm = Arc::new(CompletionClient::new(&config.llm));
    let capabilities = default_capabilities(search, llm);

    let assembler = ContextAssembler::new(config.chat.context_window);
    let dispatcher = AgentDispatcher::new(
        factory.clone(),
        assembler.clone(),
        capabilities,
        config.search.max_results,
    );

    // Session loop.
    let mut session = SessionController::new(console, dispatcher, store, assembler);
    session.run().await;

    Ok(())
}
