//! Minimal interactive chat client.
//!
//! Connects, logs in, prints group broadcasts, and sends each stdin line as
//! a broadcast:
//!
//! ```text
//! cargo run --example chat -- ws://127.0.0.1:8888 helloworld alice lobby
//! ```

use groupcast_client::{EventKind, SessionEvent, WsSessionClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupcast_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let endpoint = args.next().unwrap_or_else(|| "ws://127.0.0.1:8888".into());
    let token = args.next().unwrap_or_else(|| "helloworld".into());
    let nick = args.next().unwrap_or_else(|| "alice".into());
    let group = args.next();

    let client = WsSessionClient::websocket(endpoint, token);

    client.on(EventKind::Login, |event: &SessionEvent| {
        if let SessionEvent::Login(payload) = event {
            println!("logged in: {payload}");
        }
    });
    client.on(EventKind::Broadcast, |event: &SessionEvent| {
        if let SessionEvent::Broadcast(payload) = event {
            println!("<< {payload}");
        }
    });
    client.on(EventKind::RequestError, |event: &SessionEvent| {
        if let SessionEvent::RequestError(payload) = event {
            eprintln!("rejected by server: {payload}");
        }
    });
    client.on(EventKind::Close, |_: &SessionEvent| {
        eprintln!("connection closed");
        std::process::exit(0);
    });
    client.on(EventKind::Error, |event: &SessionEvent| {
        if let SessionEvent::Error(error) = event {
            eprintln!("transport error: {error}");
        }
    });

    client.connect(Some(&nick), group.as_deref())?;

    // Broadcast stdin lines until EOF.
    let sender = client.clone();
    tokio::task::spawn_blocking(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line.is_empty() {
                continue;
            }
            if !sender.broadcast(line) {
                eprintln!("not logged in yet, message dropped");
            }
        }
    })
    .await?;

    client.close();
    Ok(())
}
