use anyhow::{Context, Result};
use confab_bridge::replay::{LogTransport, RecordedMessage, parse_line};
use confab_bridge::terminal::{self, TerminalRenderer};
use confab_bridge::transcript::Transcript;
use confab_bridge::util;
use confab_core::{ChannelSink, ConsoleAction, ConsoleEngine, LineBudget, RelayConfig};
use confab_hive::HiveEvent;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::main]
async fn main() -> Result<()> {
    util::install_panic_hook();
    util::init_tracing();

    let recording = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_config()?;

    // 1. Presentation side: line budget + render thread
    let budget = match terminal::terminal_budget() {
        Some(lines) => LineBudget::new(lines),
        None => LineBudget::unbounded(),
    };
    let (sink, mut items) = ChannelSink::new(budget.clone());
    let color = terminal::use_color();
    let render = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let mut renderer = TerminalRenderer::new(stdout.lock(), color);
        let mut transcript = Transcript::new(color);
        terminal::render_until_closed(&mut items, &mut transcript, &mut renderer)
    });

    // 2. Engine
    let mut engine = ConsoleEngine::start(&config, sink, Arc::new(LogTransport))?;
    engine.router.announce()?;

    // 3. Replay
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &recording {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open recording {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    replay(&mut engine, reader, &budget).await?;

    // 4. Drain and wait for the last piece to hit the screen
    engine.router.depart(true)?;
    drop(engine.drain().await?);
    render
        .await
        .context("Render thread panicked")?
        .context("Failed to write to the terminal")?;

    Ok(())
}

fn load_config() -> Result<RelayConfig> {
    let Some(path) = util::config_path() else {
        tracing::warn!("no config directory on this platform; using defaults");
        return Ok(RelayConfig::default());
    };
    let config = RelayConfig::load_or_default(&path)?;
    tracing::info!(path = %path.display(), user = %config.user_name, "config loaded");
    Ok(config)
}

async fn replay(
    engine: &mut ConsoleEngine<ChannelSink>,
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    budget: &LineBudget,
) -> Result<()> {
    let mut lines = reader.lines();
    let mut line_no = 0;

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
            line = lines.next_line() => line.context("Failed to read recording")?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        line_no += 1;

        let recorded: Option<RecordedMessage> = match parse_line(line_no, &line) {
            Ok(recorded) => recorded,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "skipping line");
                continue;
            }
        };
        let Some(recorded) = recorded else {
            continue;
        };

        // Follow terminal resizes between messages.
        if let Some(lines) = terminal::terminal_budget() {
            budget.set(lines);
        }

        engine.route(&recorded.message, recorded.from_here);
        log_hive_events(engine);
        if handle_actions(engine) {
            return Ok(());
        }
    }
}

/// True when the console should stop replaying.
fn handle_actions(engine: &mut ConsoleEngine<ChannelSink>) -> bool {
    let mut stop = false;
    while let Ok(action) = engine.actions.try_recv() {
        match action {
            ConsoleAction::Exit { keep_kernel } => {
                tracing::info!(keep_kernel, "kernel asked the console to exit");
                stop = true;
            }
            ConsoleAction::SetNextInput { text, replace } => {
                tracing::info!(%text, replace, "next input suggested");
            }
            ConsoleAction::KernelShutdown { restart } => {
                tracing::info!(restart, "kernel shut down by another client");
                stop |= !restart;
            }
        }
    }
    stop
}

fn log_hive_events(engine: &mut ConsoleEngine<ChannelSink>) {
    loop {
        match engine.hive_events.try_recv() {
            Ok(HiveEvent::UserJoined { name, new_user, .. }) if new_user => {
                tracing::info!(%name, "joined the session")
            }
            Ok(HiveEvent::UserLeft { name, last_client, .. }) if last_client => {
                tracing::info!(%name, "left the session")
            }
            Ok(HiveEvent::RoundTableStarted { moderator, restriction }) => {
                tracing::info!(%moderator, ?restriction, "round table started")
            }
            Ok(HiveEvent::RoundTableStopped { moderator }) => {
                tracing::info!(%moderator, "round table stopped")
            }
            Ok(event) => tracing::debug!(?event, "hive event"),
            Err(TryRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "hive events dropped")
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
