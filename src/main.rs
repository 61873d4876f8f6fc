use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use voice_coach::api::ApiServerBuilder;
use voice_coach::session::{HttpBackend, preview_transcript};
use voice_coach::voice::{CaptureMode, DEFAULT_BAR_COUNT, Microphone, Speaker};
use voice_coach::{
    Config, ConversationMessage, Mode, SessionCoordinator, SessionState, TurnOutcome,
};

/// Voice Coach - practice speaking with an AI coach
#[derive(Parser)]
#[command(name = "coach", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Talk with the coach from this terminal
    Talk {
        /// Use the built-in script instead of the microphone
        #[arg(long)]
        demo: bool,
        /// Learning goal (language, pronunciation, presentation, conversation)
        #[arg(short, long)]
        goal: Option<String>,
        /// Coach server URL (overrides configuration)
        #[arg(long)]
        server: Option<String>,
    },
    /// Print an example conversation
    Preview,
    /// Show live microphone level meters
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Number of meter bars
        #[arg(short, long, default_value_t = DEFAULT_BAR_COUNT)]
        bars: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_coach=info",
        1 => "info,voice_coach=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { port } => serve(port).await,
        Command::Talk { demo, goal, server } => talk(demo, goal, server).await,
        Command::Preview => {
            preview();
            Ok(())
        }
        Command::TestMic { duration, bars } => test_mic(duration, bars).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(port = config.server.port, "starting voice coach server");

    ApiServerBuilder::from_config(&config).build().run().await?;
    Ok(())
}

fn print_message(message: &ConversationMessage) {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    println!("[{time}] {}: {}\n", message.role.speaker(), message.content);
}

fn preview() {
    for message in preview_transcript(Utc::now()) {
        print_message(&message);
    }
}

fn prompt(state: SessionState) {
    let hint = match state {
        SessionState::Idle => "Enter: speak | p: preview | c: clear | q: quit",
        SessionState::Listening => "recording... Enter: stop",
        SessionState::Processing => "thinking...",
        SessionState::Speaking => "speaking... s: stop | q: quit",
    };
    print!("({hint}) > ");
    let _ = std::io::stdout().flush();
}

#[allow(clippy::future_not_send)]
async fn talk(demo: bool, goal: Option<String>, server: Option<String>) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let server_url = server.unwrap_or(config.client.server_url);
    let goal = goal.unwrap_or(config.client.goal);
    let mode = if demo { Mode::Demo } else { Mode::Live };

    let speaker = Speaker::new().context("no audio output available")?;
    let backend = HttpBackend::new(server_url.clone(), config.client.session);

    let mut coach = SessionCoordinator::new(backend, Microphone::new(), speaker, mode, goal)
        .with_error_callback(|e| eprintln!("\n! {e}"));

    tracing::info!(server = %server_url, ?mode, goal = %coach.goal(), "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    loop {
        let messages = coach.history().messages();
        for message in messages.iter().skip(shown) {
            print_message(message);
        }
        shown = messages.len();
        prompt(coach.state());

        let speaking = coach.state() == SessionState::Speaking;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = coach.wait_for_playback(), if speaking => {
                println!();
                continue;
            }
        };

        let Some(line) = line else { break };

        match line.trim() {
            "" => match coach.state() {
                SessionState::Idle => {
                    // Failure is already reported through the error callback
                    let _ = coach.start_listening();
                }
                SessionState::Listening => match coach.stop_listening().await {
                    TurnOutcome::Completed { spoke: false } => {
                        tracing::debug!("reply has no audio");
                    }
                    TurnOutcome::Completed { spoke: true } | TurnOutcome::Ignored => {}
                    TurnOutcome::Aborted(reason) => tracing::debug!(%reason, "turn aborted"),
                },
                SessionState::Processing | SessionState::Speaking => {
                    println!("wait for the coach to finish, or press s");
                }
            },
            "s" => {
                coach.stop_speaking();
            }
            "c" => {
                coach.clear_conversation();
                shown = 0;
            }
            "p" => {
                coach.run_demo_conversation();
                shown = 0;
            }
            "q" => break,
            other => println!("unknown command: {other}"),
        }
    }

    coach.stop_speaking();
    Ok(())
}

/// Render levels as a row of block characters
fn render_levels(levels: &[f32]) -> String {
    const BLOCKS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    levels
        .iter()
        .map(|level| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = (level.clamp(0.0, 1.0) * 8.0).round() as usize;
            BLOCKS[index.min(8)]
        })
        .collect()
}

#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, bars: usize) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = Microphone::new().acquire_with(CaptureMode::Metering)?;
    let mut levels = Box::pin(capture.levels(bars));

    let deadline = tokio::time::sleep(Duration::from_secs(duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            frame = levels.next() => match frame {
                Some(frame) => {
                    print!("\r[{}]", render_levels(&frame));
                    let _ = std::io::stdout().flush();
                }
                None => break,
            },
        }
    }

    capture.release();

    println!("\n\n---");
    println!("If the bars moved while you spoke, your mic is working!");
    println!("If they stayed flat, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}
