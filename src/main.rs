mod chat;
mod cli;
mod config;
mod credentials;
mod feedback;
mod history;
mod llm;
mod store;
mod types;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use chat::ChatController;
use cli::ChatCli;
use config::AppConfig;
use credentials::FileCredentialStore;
use feedback::TerminalFeedback;
use history::session_channel;
use llm::router::ClientRegistry;
use store::FileMessageStore;

#[derive(Parser)]
#[command(name = "routerchat", version, about = "Chat with several AI backends from one prompt")]
struct Args {
    /// Backend to start with: anthropic_completion, anthropic_messages, openrouter
    #[arg(long)]
    backend: Option<String>,
    /// Model to start with; "vendor/model" ids are served by OpenRouter
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    // Auto-generate config file on first run
    let config_path = AppConfig::config_path()?;
    if !config_path.exists() {
        let path = AppConfig::save_default()?;
        println!("[Config] Created default config: {}", path.display());
    }

    let mut config = AppConfig::load()?;
    if let Some(backend) = args.backend {
        config.chat.backend = backend;
    }
    if let Some(model) = args.model {
        config.chat.model = model;
    }

    let backend = config.default_backend()?;
    let model = config.default_model(backend);
    println!("[Config] Backend: {}, Model: {}", backend.label(), model);

    let credentials = FileCredentialStore::new(FileCredentialStore::default_path()?);
    let clients = ClientRegistry::from_credentials(&credentials);
    if clients.is_empty() {
        println!("[Keys] No API keys stored yet. Add one with: /key <backend> <api-key>");
    }

    let store = FileMessageStore::new(FileMessageStore::default_path()?);
    let (history_tx, history_rx) = session_channel();

    let mut controller = ChatController::new(
        clients,
        Box::new(store),
        Box::new(TerminalFeedback),
        history_tx,
        backend,
        model,
    );
    if let Err(e) = controller.restore_transcript() {
        warn!("Could not restore the saved transcript: {e:#}");
    }

    ChatCli::new(controller, history_rx, Box::new(credentials))
        .run()
        .await
}
