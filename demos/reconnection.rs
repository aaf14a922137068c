use std::time::Duration;
use storm_realtime::{ChannelClient, ClientEvent};

/// Watch the reconnection policy against a real server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing to see logs
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let url = std::env::var("STORM_WS_URL").expect("STORM_WS_URL must be set in .env");

    println!("Connecting to: {}\n", url);

    let client = ChannelClient::builder(&url)
        .reconnect_delay(Duration::from_millis(500))
        .max_retry_attempts(8)
        .build()?;

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Close { code, reason, requested } => {
                    println!("closed (code {:?}, requested: {}): {}", code, requested, reason)
                }
                ClientEvent::ReconnectScheduled { attempt, delay } => {
                    println!("reconnect attempt {} in {:?}", attempt, delay)
                }
                ClientEvent::ReconnectFailed { attempts } => {
                    println!("gave up after {} attempts", attempts)
                }
                _ => {}
            }
        }
    });

    // Step 1: connect
    client.connect().await?;
    println!("Connected\n");

    // Step 2: a requested close must not reconnect
    client.close().await;
    println!("Closed manually, waiting 5 seconds...");
    tokio::time::sleep(Duration::from_secs(5)).await;
    if client.is_connected() {
        return Err("should NOT reconnect after close()".into());
    }
    println!("Stayed disconnected\n");

    // Step 3: reconnect, then interrupt the network or restart the server
    client.connect().await?;
    println!("Connected again. Interrupt the server to watch the backoff.\n");

    for i in 1..=30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!("Second {}/30 - state: {}", i, client.state());
    }

    client.close().await;
    Ok(())
}
