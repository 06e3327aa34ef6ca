//! Line-oriented terminal front end.
//!
//! Reads turns from stdin, renders the streamed reply as it accumulates,
//! and exposes the rest of the app (history, model selection, API keys)
//! as slash commands.

use std::io::Write as _;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::ChatController;
use crate::credentials::CredentialStore;
use crate::history::{ChatHistory, SessionReceiver};
use crate::llm::router::ClientRegistry;
use crate::types::{model_display_name, Backend, ChatMessage, Role};

pub struct ChatCli {
    controller: ChatController,
    history: ChatHistory,
    history_rx: SessionReceiver,
    credentials: Box<dyn CredentialStore>,
}

/// Pick the backend a freshly typed model id belongs to: namespaced ids go
/// to OpenRouter, catalog ids to their owner, anything else stays on the
/// current selection.
fn backend_for_model(current: Backend, model: &str) -> Backend {
    if model.contains('/') {
        return Backend::OpenRouter;
    }
    Backend::all()
        .into_iter()
        .find(|b| b.models().contains(&model))
        .unwrap_or(current)
}

impl ChatCli {
    pub fn new(
        controller: ChatController,
        history_rx: SessionReceiver,
        credentials: Box<dyn CredentialStore>,
    ) -> Self {
        Self {
            controller,
            history: ChatHistory::new(),
            history_rx,
            credentials,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("Type a message. /help lists commands, quit leaves.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.prompt();
        while let Some(line) = lines.next_line().await? {
            let input = line.trim().to_string();
            if input.is_empty() {
                self.prompt();
                continue;
            }
            match input.to_lowercase().as_str() {
                "quit" | "exit" | "/quit" | "/exit" => {
                    println!("Goodbye!");
                    break;
                }
                _ => {}
            }
            if let Some(command) = input.strip_prefix('/') {
                self.handle_command(command);
            } else {
                self.send(&input).await;
            }
            self.drain_history();
            self.prompt();
        }
        Ok(())
    }

    fn prompt(&self) {
        print!("{} > ", model_display_name(self.controller.selected_model()));
        let _ = std::io::stdout().flush();
    }

    /// Run one turn, rendering cumulative snapshots as they land.
    async fn send(&mut self, input: &str) {
        let mut rx = self.controller.subscribe_stream();
        let mut printed = 0usize;
        print!("\nAssistant > ");
        let _ = std::io::stdout().flush();

        {
            let send = self.controller.send_message(input);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    _ = &mut send => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            continue;
                        }
                        let text = rx.borrow_and_update().clone();
                        if text.len() < printed {
                            // The turn settled; the channel reset to empty.
                            printed = 0;
                            continue;
                        }
                        if text.len() > printed {
                            print!("{}", &text[printed..]);
                            let _ = std::io::stdout().flush();
                            printed = text.len();
                        }
                    }
                }
            }
        }

        if let Some(err) = self.controller.error_message() {
            println!("\n[Error: {}]", err);
            return;
        }

        // The final text can outrun the last snapshot we saw; print the rest.
        let final_text = self
            .controller
            .transcript()
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if final_text.len() > printed {
            print!("{}", &final_text[printed..]);
        }
        println!("\n");
    }

    fn handle_command(&mut self, command: &str) {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        match name {
            "help" => self.print_help(),
            "new" => {
                self.controller.start_new_chat();
                println!("[New chat]");
            }
            "clear" => {
                self.controller.clear_messages();
                println!("[Cleared]");
            }
            "history" => self.print_history(),
            "open" => match rest.first().and_then(|s| s.parse::<usize>().ok()) {
                Some(index) => self.open_session(index),
                None => println!("Usage: /open <number>"),
            },
            "delete" => match rest.first().and_then(|s| s.parse::<usize>().ok()) {
                Some(index) => {
                    if let Some(session) = self.history.delete(index) {
                        println!("[Deleted '{}']", session.title);
                    } else {
                        println!("No session #{}", index);
                    }
                }
                None => println!("Usage: /delete <number>"),
            },
            "models" => self.print_models(),
            "model" => match rest.first() {
                Some(model) => {
                    let backend = backend_for_model(self.controller.selected_backend(), model);
                    self.controller.select_model(backend, *model);
                    println!("[Model: {} via {}]", model, backend.label());
                }
                None => println!("Usage: /model <id>"),
            },
            "backend" => match rest.first().map(|s| s.parse::<Backend>()) {
                Some(Ok(backend)) => {
                    self.controller.select_backend(backend);
                    println!(
                        "[Backend: {}, model: {}]",
                        backend.label(),
                        self.controller.selected_model()
                    );
                }
                Some(Err(e)) => println!("{}", e),
                None => println!("Usage: /backend <name>"),
            },
            "keys" => self.print_keys(),
            "key" => match (rest.first(), rest.get(1)) {
                (Some(name), Some(secret)) => self.store_key(name, secret),
                _ => println!("Usage: /key <backend> <api-key>"),
            },
            "nokey" => match rest.first() {
                Some(name) => self.delete_key(name),
                None => println!("Usage: /nokey <backend>"),
            },
            other => println!("Unknown command: /{} (try /help)", other),
        }
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  /new               archive this chat and start fresh");
        println!("  /clear             drop this chat without archiving");
        println!("  /history           list archived chats");
        println!("  /open <n>          reopen an archived chat");
        println!("  /delete <n>        delete an archived chat");
        println!("  /models            list known models per backend");
        println!("  /model <id>        pick a model ('vendor/model' ids use OpenRouter)");
        println!("  /backend <name>    pick a backend and its default model");
        println!("  /keys              show which backends have an API key");
        println!("  /key <b> <secret>  store an API key for a backend");
        println!("  /nokey <b>         delete a backend's API key");
        println!("  quit               leave");
    }

    fn print_history(&self) {
        if self.history.is_empty() {
            println!("No archived chats yet.");
            return;
        }
        for (index, session) in self.history.sessions().iter().enumerate() {
            println!(
                "  {}: {} | {} ({})",
                index,
                session.title,
                session.preview,
                session.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    fn open_session(&mut self, index: usize) {
        let Some(session) = self.history.get(index) else {
            println!("No session #{}", index);
            return;
        };
        let session = session.clone();
        self.controller.open_session(&session);
        println!("[Opened '{}']", session.title);
        for message in self.controller.transcript() {
            print_message(message);
        }
    }

    fn print_models(&self) {
        for backend in Backend::all() {
            println!("{}:", backend.label());
            for model in backend.models() {
                let marker = if *model == self.controller.selected_model() {
                    "*"
                } else {
                    " "
                };
                println!("  {} {}", marker, model);
            }
        }
    }

    fn print_keys(&self) {
        for backend in Backend::all() {
            let state = if self.credentials.exists(backend) {
                "configured"
            } else {
                "not set"
            };
            println!("  {}: {}", backend.label(), state);
        }
    }

    fn store_key(&mut self, name: &str, secret: &str) {
        match name.parse::<Backend>() {
            Ok(backend) => {
                if let Err(e) = self.credentials.put(backend, secret) {
                    println!("[Error: {:#}]", e);
                    return;
                }
                self.rebuild_clients();
                println!("[Stored key for {}]", backend.label());
            }
            Err(e) => println!("{}", e),
        }
    }

    fn delete_key(&mut self, name: &str) {
        match name.parse::<Backend>() {
            Ok(backend) => {
                if let Err(e) = self.credentials.delete(backend) {
                    println!("[Error: {:#}]", e);
                    return;
                }
                self.rebuild_clients();
                println!("[Deleted key for {}]", backend.label());
            }
            Err(e) => println!("{}", e),
        }
    }

    fn rebuild_clients(&mut self) {
        self.controller
            .set_clients(ClientRegistry::from_credentials(self.credentials.as_ref()));
    }

    fn drain_history(&mut self) {
        while let Ok(session) = self.history_rx.try_recv() {
            self.history.upsert(session);
        }
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };
    println!("{} > {}", who, message.content);
}
