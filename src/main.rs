use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voice_snake::command::ControlAction;
use voice_snake::config::AppConfig;
use voice_snake::game::{Direction, Game, Snapshot};
use voice_snake::runner::{GameLoop, LoopCommand};
use voice_snake::utils::device;
use voice_snake::{build_setup, NativeAudio, SessionEvent, SessionManager, WsTransport};

#[derive(Parser)]
#[command(version, about = "Snake, steered by voice through the Gemini Live API")]
struct Cli {
    /// Milliseconds per game tick
    #[arg(long, default_value_t = 150)]
    tick_ms: u64,

    /// Microphone to capture from (default device if omitted)
    #[arg(long)]
    input_device: Option<String>,

    /// Speaker to play replies on (default device if omitted)
    #[arg(long)]
    output_device: Option<String>,

    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Play with the keyboard only; no microphone, no network
    #[arg(long)]
    keyboard_only: bool,
}

/// One line typed on stdin.
#[derive(Debug, PartialEq)]
enum Input {
    Action(ControlAction),
    Connect,
    Disconnect,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim().to_ascii_lowercase();
    let input = match line.as_str() {
        "w" => Input::Action(ControlAction::Move(Direction::Up)),
        "s" => Input::Action(ControlAction::Move(Direction::Down)),
        "a" => Input::Action(ControlAction::Move(Direction::Left)),
        "d" => Input::Action(ControlAction::Move(Direction::Right)),
        "connect" => Input::Connect,
        "disconnect" => Input::Disconnect,
        "q" | "quit" | "exit" => Input::Quit,
        other => Input::Action(other.parse().ok()?),
    };
    Some(input)
}

/// What the game loop has to do about a session event. Every fresh
/// session starts from the idle board.
fn loop_command(event: &SessionEvent) -> Option<LoopCommand> {
    match event {
        SessionEvent::Control(action) => Some(LoopCommand::Control(*action)),
        SessionEvent::Status(true) => Some(LoopCommand::Reset),
        SessionEvent::Status(false) | SessionEvent::Error(_) | SessionEvent::Volume(_) => None,
    }
}

const HELP: &str = "keys: w/a/s/d or up/down/left/right, start, stop, pause, restart, \
connect, disconnect, q to quit (each followed by Enter)";

fn render(snapshot: &Snapshot, connected: bool, volume: f32) {
    let meter = "#".repeat((volume * 20.0).round() as usize);
    // Clear the terminal and home the cursor before each frame.
    print!("\x1b[2J\x1b[H");
    println!("{}", snapshot);
    println!(
        "voice: {}  mic [{:<20}]",
        if connected { "on" } else { "off" },
        meter
    );
    println!("{}", HELP);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        println!("Input devices:\n{}", device::get_available_inputs()?);
        println!("Output devices:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    let config = AppConfig::from_env(!cli.keyboard_only).context("Failed to load configuration")?;

    // Logs go to stderr so the board on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter)?)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let (actions_tx, actions_rx) = mpsc::unbounded_channel::<LoopCommand>();
    let (snapshots_tx, mut snapshots_rx) = watch::channel(Snapshot::default());
    let game_loop =
        GameLoop::new(Game::new()).with_period(Duration::from_millis(cli.tick_ms.max(1)));
    let game_task = tokio::spawn(game_loop.run(actions_rx, snapshots_tx));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let session = match config.session_config() {
        Some(session_config) if !cli.keyboard_only => {
            let setup = build_setup(&session_config);
            let devices = NativeAudio::new(cli.input_device.clone(), cli.output_device.clone());
            Some(SessionManager::new(
                WsTransport::new(session_config),
                devices,
                setup,
                events_tx,
            ))
        }
        _ => {
            tracing::info!("voice control disabled, keyboard only");
            None
        }
    };

    if let Some(session) = &session {
        // Failures arrive as session events; the game stays playable.
        let _ = session.connect().await;
    }

    let mut connected = false;
    let mut volume = 0.0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Some(Input::Quit) => break,
                    Some(Input::Action(action)) => {
                        if actions_tx.send(action.into()).is_err() {
                            break;
                        }
                    }
                    Some(Input::Connect) => match &session {
                        Some(session) => {
                            let _ = session.connect().await;
                        }
                        None => println!("voice control is disabled"),
                    },
                    Some(Input::Disconnect) => {
                        if let Some(session) = &session {
                            session.stop().await;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("unknown command: {}", line.trim()),
                }
            }
            Some(event) = events_rx.recv() => {
                if let Some(command) = loop_command(&event) {
                    if actions_tx.send(command).is_err() {
                        break;
                    }
                }
                match event {
                    SessionEvent::Status(status) => {
                        tracing::info!(connected = status, "voice session status");
                        connected = status;
                    }
                    SessionEvent::Error(message) => tracing::error!("voice session error: {}", message),
                    SessionEvent::Volume(level) => volume = level,
                    SessionEvent::Control(_) => {}
                }
            }
            changed = snapshots_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&snapshots_rx.borrow_and_update(), connected, volume);
            }
        }
    }

    if let Some(session) = &session {
        session.stop().await;
    }
    drop(actions_tx);
    let game = game_task.await.context("Game loop task failed")?;
    tracing::info!(best = game.best_score(), "bye");
    Ok(())
}
