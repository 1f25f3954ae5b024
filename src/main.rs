use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

mod app;
mod backend;
mod commands;
mod config;
mod echo;
mod engine;
mod error;
mod formatting;
mod identity;
mod inbound;
mod ordering;
mod outbound;
mod render;
mod store;
mod utils;
mod widgets;

use app::App;
use backend::{AuthMode, Backend, BackendEvent, LoopbackBackend};
use config::Config;
use echo::UuidTokens;
use engine::{ChatEngine, EngineSettings};
use render::FrameClock;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to file
    let log_dir = Config::default_app_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = Config::log_path(&log_dir);
    utils::init_logging(&log_file.to_string_lossy())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    crate::info_log!("=== Jiffy Client Starting ===");

    let mut config = Config::load()?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let backend = LoopbackBackend::new(events_tx.clone(), config.settings.loopback_latency());

    // Authenticate BEFORE entering TUI mode so failures print normally
    let mode = config.auth_mode();
    let user = backend.authenticate(mode, config.credentials()).await?;
    crate::info_log!(
        "authenticated as {} (account {}, id {:?})",
        user.display_name,
        user.username,
        user.user_id
    );
    if mode == AuthMode::Register {
        // the account exists now; later starts log in
        config.register = false;
        if let Err(e) = config.save() {
            crate::warn_log!("could not clear register flag: {}", e);
        }
    }

    let engine = ChatEngine::new(
        &user.display_name,
        EngineSettings::from(&config.settings),
        Box::new(FrameClock::new(config.settings.frame_interval())),
        Box::new(UuidTokens),
    );
    let frame_interval = config.settings.frame_interval();
    let mut app = App::new(config, engine, Arc::new(backend), events_tx);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, events_rx, frame_interval).await;

    // Save settings before exiting (even if there was an error)
    if let Err(e) = app.save_state() {
        crate::warn_log!("save_state failed: {}", e);
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &res {
        crate::error_log!("run_app: {:#}", e);
    }
    res
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut events_rx: mpsc::UnboundedReceiver<BackendEvent>,
    frame_interval: Duration,
) -> Result<()> {
    loop {
        // Apply everything the backend delivered since the last turn, in order
        loop {
            match events_rx.try_recv() {
                Ok(event) => app.engine.apply(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    app.engine
                        .apply(BackendEvent::Disconnected("event channel closed".to_string()));
                    return Ok(());
                }
            }
        }

        let now = Instant::now();
        app.engine.expire_pending(now);

        let size = terminal.size()?;
        app.sync_viewport(Rect::new(0, 0, size.width, size.height));

        // Only redraw when a frame is due
        if let Some(frame) = app.engine.poll_frame(now) {
            app.last_frame = Some(frame);
            terminal.draw(|f| app.draw(f))?;
        }

        if event::poll(frame_interval)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key, Instant::now())?;
                }
                Event::Resize(_, _) => app.engine.schedule_render(),
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
