//! Terminal chat
//!
//! A minimal consumer: stdin is read on its own thread, and the main
//! thread plays the UI, draining the client's event queue on a fixed tick.
//!
//! ```text
//! STREAMCHAT_HOST=localhost STREAMCHAT_PORT=8000 cargo run --example terminal_chat
//! ```
//!
//! Commands: `/clear`, `/history`, `/ping`, `/config`, `/connect`,
//! `/disconnect`, `/endpoint <host> <port>`, `/quit`. Anything else is sent
//! as a chat message.

use std::io::{BufRead, Write};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use streamchat::core::ObservabilityConfig;
use streamchat::{ClientBuilder, ClientEvent, ConfigProvider, ConnectionEndpoint, StaticConfig};

const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    streamchat::core::init_observability(
        ObservabilityConfig::local("terminal-chat").with_log_level("warn"),
    )?;

    let config = StaticConfig::from_env()?;
    tracing::info!(endpoint = ?config.endpoint(), "Starting terminal chat");
    let (client, mut events) = ClientBuilder::new(Arc::new(config)).build()?;
    client.connect();

    let (lines_tx, lines_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    'ui: loop {
        for event in events.drain() {
            render(&event);
        }

        loop {
            let line = match lines_rx.try_recv() {
                Ok(line) => line,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break 'ui,
            };
            let line = line.trim();
            let mut words = line.split_whitespace();
            match words.next() {
                None => {}
                Some("/quit") => break 'ui,
                Some("/clear") => {
                    client.clear_session();
                }
                Some("/history") => {
                    client.get_history();
                }
                Some("/ping") => {
                    client.ping();
                }
                Some("/config") => {
                    client.get_config();
                }
                Some("/connect") => client.connect(),
                Some("/disconnect") => client.disconnect(),
                Some("/endpoint") => {
                    let host = words.next().unwrap_or("localhost");
                    match words.next().map(str::parse::<u16>) {
                        Some(Ok(port)) => {
                            client.update_endpoint(ConnectionEndpoint::new(host, port, false))
                        }
                        _ => eprintln!("usage: /endpoint <host> <port>"),
                    }
                }
                Some(_) => {
                    client.send_message(line);
                }
            }
        }

        std::thread::sleep(TICK);
    }

    client.shutdown();
    streamchat::core::shutdown_observability();
    Ok(())
}

fn render(event: &ClientEvent) {
    match event {
        ClientEvent::ConnectivityChanged(true) => println!("[connected]"),
        ClientEvent::ConnectivityChanged(false) => println!("[disconnected]"),
        ClientEvent::MessageStarted { .. } => print!("assistant> "),
        ClientEvent::ChunkReceived { text, .. } => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        ClientEvent::MessageCompleted { .. } => println!(),
        ClientEvent::ErrorOccurred(error) => eprintln!("[error:{}] {}", error.class().as_str(), error),
        ClientEvent::ProviderDetected(info) => {
            println!("[provider] {} {} ({})", info.provider, info.model, info.orchestrator)
        }
        ClientEvent::SessionCleared { new_id, .. } => println!("[new conversation {}]", new_id),
        ClientEvent::HistoryLoaded(history) => {
            for message in history {
                println!("{}> {}", message.role, message.content);
            }
        }
    }
}
