// Keyboard teleop: W/S drive, A/D quarter turn, U u-turn, Space stop, Q quit
//
// Each key press publishes one command byte; the base holds the last
// command until another one arrives.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use diffbot_runtime::config::TOPIC_CMD_BYTE;
use diffbot_runtime::messages::Direction;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BYTE).await?;

    info!("Controls: W/S=forward/backward, A/D=turn 90, U=u-turn, Space=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Never leave the base moving
    publisher.put(vec![Direction::Stop.command_byte()]).await?;
    result
}

fn key_to_direction(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::Char('w') => Some(Direction::Forward),
        KeyCode::Char('s') => Some(Direction::Backward),
        KeyCode::Char('a') => Some(Direction::Left),
        KeyCode::Char('d') => Some(Direction::Right),
        KeyCode::Char('u') => Some(Direction::UTurn),
        KeyCode::Char(' ') => Some(Direction::Stop),
        _ => None,
    }
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        // Auto-repeat would re-trigger turns
        if kind != KeyEventKind::Press {
            continue;
        }

        if matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
            break;
        }
        if let Some(direction) = key_to_direction(code) {
            info!("{:?}", direction);
            publisher.put(vec![direction.command_byte()]).await?;
        }
    }

    Ok(())
}
