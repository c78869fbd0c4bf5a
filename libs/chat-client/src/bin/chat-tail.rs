//! Follow one chat in the terminal. Lines typed on stdin are sent.

use std::collections::HashSet;
use std::sync::Arc;

use chat_client::{ChatClient, ChatSubscription, ClientConfig, ClientEvent, Draft, HttpChatApi};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    let Ok(chat_id) = std::env::var("CHAT_ID") else {
        eprintln!("CHAT_ID is required");
        std::process::exit(2);
    };
    if config.token.is_empty() {
        eprintln!("CHAT_TOKEN is required");
        std::process::exit(2);
    }

    let api = HttpChatApi::new(config.base_url.clone(), config.token.clone())
        .expect("failed to build HTTP client");
    let client = ChatClient::new(Arc::new(api), config);
    let mut events = client.events();

    let subscription = match client.subscribe(&chat_id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            eprintln!("cannot subscribe to {chat_id}: {err}");
            std::process::exit(1);
        }
    };

    let mut printed = HashSet::new();
    print_new(&subscription, &mut printed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::MessagesChanged { .. }) => print_new(&subscription, &mut printed),
                Ok(ClientEvent::ConnectionState { state, .. }) => eprintln!("-- {state:?}"),
                Ok(ClientEvent::NotificationCount { count }) => eprintln!("-- {count} unread notifications"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bus lagged");
                    print_new(&subscription, &mut printed);
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(err) = subscription.send(Draft::text(line)).await {
                        eprintln!("-- send failed: {err}");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            },
        }
    }

    subscription.close();
}

fn print_new(subscription: &ChatSubscription, printed: &mut HashSet<String>) {
    for local in subscription.messages() {
        if local.is_optimistic() || !printed.insert(local.message.id.clone()) {
            continue;
        }
        let m = &local.message;
        println!(
            "[{}] {}: {}",
            m.created_at.format("%H:%M:%S"),
            m.sender.name,
            m.content
        );
    }
}
