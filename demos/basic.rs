use storm_realtime::{ChannelClient, ChannelClientOptions, ClientEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::var("STORM_WS_URL")
        .unwrap_or_else(|_| "ws://localhost:8000/ws/pipeline".to_string());

    // Create client
    let client = ChannelClient::builder(&url)
        .options(ChannelClientOptions::from_env()?)
        .build()?;

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::StateChanged(state) => println!("state: {}", state),
                ClientEvent::Error { kind, message } => println!("error [{}]: {}", kind, message),
                _ => {}
            }
        }
    });

    let _progress = client.subscribe("article_progress", |frame| {
        println!("progress: {:?}", frame.data);
    });
    let _done = client.subscribe("pipeline_complete", |frame| {
        println!("pipeline complete: {:?}", frame.data);
    });

    // Connect
    println!("Connecting to {}...", url);
    client.connect().await?;
    println!("Connected!");

    client
        .send(
            "start_pipeline",
            &serde_json::json!({ "topic": "Large language models" }),
        )
        .await?;

    // Keep connection alive
    tokio::signal::ctrl_c().await?;

    // Disconnect
    println!("Disconnecting...");
    client.close().await;
    println!("Disconnected!");

    Ok(())
}
