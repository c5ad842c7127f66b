//! Interactive relay client: every line typed is sent to the relay,
//! every broadcast received is printed.
//!
//! ```text
//! cargo run -p relay-server --example ws_client -- --url ws://127.0.0.1:6672/ws
//! ```

use std::error::Error;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use relay_protocol::{decode_status, StatusMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[clap(name = "ws-client")]
#[clap(about = "Line-oriented client for the fan-out relay")]
struct Cli {
    /// Relay WebSocket URL
    #[clap(short, long, default_value = "ws://127.0.0.1:6672/ws")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    println!("Connecting to {}...", cli.url);
    let (ws, _resp) = connect_async(cli.url.as_str()).await?;
    println!("Connected. Type a line to broadcast it; 'quit' or 'exit' to leave.\n");

    let (mut ws_tx, mut ws_rx) = ws.split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let msg = relay_core::Message::text(text.as_str());
                    match decode_status(&msg) {
                        Ok(StatusMessage::NetworkInfo(info)) => println!(
                            "<< [network] {:?}, {} connection(s)",
                            info.network_status, info.connections
                        ),
                        Err(_) => println!("<< {}", text.as_str()),
                    }
                }
                Ok(Message::Binary(data)) => println!("<< ({} bytes binary)", data.len()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Read error: {:?}", e);
                    break;
                }
            }
        }
        println!("Connection closed by relay.");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        ws_tx.send(Message::Text(trimmed.to_string().into())).await?;
    }

    let _ = ws_tx.close().await;
    printer.abort();
    println!("Exiting client.");

    Ok(())
}
