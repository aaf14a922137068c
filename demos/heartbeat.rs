use std::time::Duration;
use storm_realtime::{ChannelClient, ClientEvent, ErrorKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    // Initialize tracing to see heartbeat logs
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let url = std::env::var("STORM_WS_URL").expect("STORM_WS_URL must be set in .env");

    let client = ChannelClient::builder(&url)
        .heartbeat_interval(Duration::from_secs(3))
        .heartbeat_timeout(Duration::from_secs(2))
        .debug(true)
        .build()?;

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.error_kind() == Some(ErrorKind::HeartbeatTimeout) {
                println!("heartbeat timed out, reconnecting");
            }
        }
    });

    println!("Connecting to {} with heartbeat enabled...", url);
    client.connect().await?;

    println!("Waiting 15 seconds to observe heartbeats...");
    println!("   (Watch for 'Sent heartbeat with id' in logs)\n");
    tokio::time::sleep(Duration::from_secs(15)).await;

    println!("Closing (should stop heartbeat task)...");
    client.close().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("No more heartbeats after close");

    Ok(())
}
