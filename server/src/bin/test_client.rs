use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use server::utils::get_timestamp;
use shared::{codec, methods, rpc, subscription_method, Channel, RequestCounter, Tier};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Probe client: subscribes to the stats channels, runs the simulation for a
/// while and prints everything the server sends.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Seconds to keep the simulation running
    #[clap(short, long, default_value_t = 5)]
    seconds: u64,
    /// Acceleration factor requested after starting
    #[clap(short, long, default_value_t = 3600.0)]
    acceleration: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let url = format!("ws://{}:{}", args.host, args.port);

    println!("Connecting to {}", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut ids = RequestCounter::new();

    let requests = vec![
        rpc::request(
            &subscription_method(true, Channel::SimStats, Tier::S1),
            vec![],
            ids.next_id(),
        ),
        rpc::request(
            &subscription_method(true, Channel::PerfStats, Tier::S1),
            vec![],
            ids.next_id(),
        ),
        rpc::request(methods::START_SIMULATION, vec![], ids.next_id()),
        rpc::request(
            methods::ACCELERATE_SIMULATION,
            vec![Value::from(args.acceleration)],
            ids.next_id(),
        ),
    ];
    for request in &requests {
        let text = codec::to_text(request);
        println!("-> {}", text);
        ws_tx.send(Message::text(text)).await?;
    }

    // Print frames until the run time is over
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, ws_rx.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => println!("[{}] <- {}", get_timestamp(), text.as_str()),
            Ok(Some(Ok(Message::Close(frame)))) => {
                println!("Server closed the connection: {:?}", frame);
                return Ok(());
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Ok(()),
            Err(_) => break,
        }
    }

    let stop = rpc::request(methods::STOP_SIMULATION, vec![], ids.next_id());
    println!("-> {}", codec::to_text(&stop));
    ws_tx.send(Message::text(codec::to_text(&stop))).await?;
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_secs(1), ws_rx.next()).await {
        println!("[{}] <- {}", get_timestamp(), text.as_str());
    }

    sleep(Duration::from_millis(100)).await;
    ws_tx.close().await?;
    Ok(())
}
