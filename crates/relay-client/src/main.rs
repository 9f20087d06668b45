//! # relay-client
//!
//! Interactive client: joins a relay, sends each stdin line to `--to`, and
//! prints everything the relay delivers.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use relay_client::{compose, join, render};
use relay_core::Identity;
use relay_core::logging::{LogFormat, init_subscriber};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

/// Interactive relay client.
#[derive(Parser, Debug)]
#[command(name = "relay-client", about = "Chat through a relay from the terminal")]
struct Cli {
    /// Relay WebSocket endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:9000/connect")]
    url: String,

    /// Identity to connect as (random when omitted).
    #[arg(long)]
    id: Option<Identity>,

    /// Display name.
    #[arg(long)]
    name: String,

    /// Recipient identity for typed lines.
    #[arg(long)]
    to: Identity,

    /// Log filter directive.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level, LogFormat::Compact);

    let id = cli.id.unwrap_or_else(Identity::generate);
    let (ws, welcomed) = join(&cli.url, id, &cli.name)
        .await
        .with_context(|| format!("Failed to join {}", cli.url))?;
    println!("WELCOME {welcomed} (id {id})");

    let (mut sink, mut stream) = ws.split();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => println!("{}", render(text.as_str())),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "connection error");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let Some(message) = compose(id, cli.to, &line) else {
                    continue;
                };
                let payload = serde_json::to_string(&message)?;
                sink.send(Message::text(payload))
                    .await
                    .context("Failed to send message")?;
            }
            _ = &mut reader => {
                println!("connection closed by relay");
                return Ok(());
            }
        }
    }

    let _ = sink.close().await;
    reader.abort();
    Ok(())
}
