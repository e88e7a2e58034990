use clap::Parser;
use log::info;
use std::time::Duration;

use client::network::Network;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server endpoint to connect to
    #[arg(short, long, default_value = "ws://127.0.0.1:2567")]
    server: String,

    /// Display name for this player
    #[arg(short, long, default_value = "guest")]
    name: String,
}

/// Headless demo client: joins the public office, names itself, and
/// walks a small patrol loop while logging everything it observes.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut network = Network::new(&args.server, events_tx);

    network.join_lobby().await?;
    let session_id = network.join_or_create_public().await?;
    info!("Synchronized as session {}", session_id);

    network.update_player_name(&args.name).await;
    network.ready_to_connect().await;
    network
        .add_chat_message(&format!("{} wandered in", args.name))
        .await;

    let waypoints = [
        (705.0, 500.0, "adam_idle_down"),
        (760.0, 500.0, "adam_run_right"),
        (760.0, 560.0, "adam_run_down"),
        (705.0, 560.0, "adam_run_left"),
        (705.0, 500.0, "adam_run_up"),
    ];
    let mut ticker = tokio::time::interval(Duration::from_millis(750));
    let mut step = 0usize;

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Some(event) => info!("event: {:?}", event),
                    None => break,
                }
            }
            _ = ticker.tick() => {
                let (x, y, anim) = waypoints[step % waypoints.len()];
                network.move_player(x, y, anim).await;
                step += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving the office");
                network.leave().await;
                break;
            }
        }
    }

    Ok(())
}
