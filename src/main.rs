mod cli;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use omnichat::app::{AppConfig, AppState};
use omnichat::platform::{AppPaths, SecureStorageManager, API_KEY_ENV_VARS};
use tui::{App, EventHandler};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.config {
        Some(path) => AppPaths::with_config_file(path)?,
        None => AppPaths::new()?,
    };
    paths
        .ensure_dirs_exist()
        .context("Failed to create application directories")?;

    // The TUI owns the terminal, so logs go to a file
    let _log_guard = init_logging(&paths, cli.debug);
    info!("Starting OmniChat v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&paths)
        .await
        .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;
    let mut state = AppState::new(config, paths, SecureStorageManager::new());

    match cli.command() {
        Commands::Chat { model } => {
            if let Some(model) = model {
                state.get_config_mut().gemini.model = model;
            }
            run_chat(&state, cli.api_key.as_deref()).await
        }
        Commands::ApiKey {
            provider,
            set,
            remove,
            status,
        } => run_api_key(&state, &provider, set, remove, status).await,
        Commands::Check { message } => run_check(&state, cli.api_key.as_deref(), &message).await,
        Commands::Config => {
            println!("# {}", state.paths().config_file().display());
            print!("{}", state.get_config().to_toml()?);
            Ok(())
        }
    }
}

fn init_logging(paths: &AppPaths, debug: bool) -> WorkerGuard {
    let default_directive = if debug { "omnichat=debug" } else { "omnichat=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let appender = tracing_appender::rolling::daily(paths.logs_dir(), "omnichat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    guard
}

async fn run_chat(state: &AppState, api_key: Option<&str>) -> Result<()> {
    // Resolve everything fallible before taking over the terminal
    let api_key = state.resolve_api_key(api_key).await?;
    let service = Arc::new(state.build_chat_service(api_key)?);
    let tick_rate = Duration::from_millis(state.get_config().ui.tick_rate_ms);

    let mut terminal = setup_terminal()?;
    let result = run_event_loop(&mut terminal, state.get_config(), service, tick_rate).await;
    restore_terminal(&mut terminal)?;

    if let Err(e) = &result {
        error!("Chat session ended with error: {:#}", e);
    }
    info!("Chat session closed");
    result
}

async fn run_event_loop(
    terminal: &mut Tui,
    config: &AppConfig,
    service: Arc<omnichat::chat::ChatService>,
    tick_rate: Duration,
) -> Result<()> {
    let mut events = EventHandler::new(tick_rate);
    let mut app = App::new(config, service, events.sender());

    loop {
        terminal.draw(|frame| app.render(frame))?;

        if let Some(event) = events.next().await? {
            app.handle_event(event);
        }

        if app.should_quit() {
            return Ok(());
        }
    }
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_api_key(
    state: &AppState,
    provider: &str,
    set: Option<String>,
    remove: bool,
    status: bool,
) -> Result<()> {
    let storage = state.secure_storage();

    if let Some(key) = set {
        storage.store_api_key(provider, &key).await?;
        println!("API key for {} saved to the system keyring.", provider);
        return Ok(());
    }

    if remove {
        storage.delete_api_key(provider).await?;
        println!("API key for {} removed from the system keyring.", provider);
        return Ok(());
    }

    if !status {
        println!("No action given, showing status. Use --set <KEY> or --remove to change it.");
    }
    for name in API_KEY_ENV_VARS {
        if std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false) {
            println!("{}: set in environment (takes precedence over the keyring)", name);
        }
    }
    match storage.retrieve_api_key(provider).await? {
        Some(_) => println!("{}: API key stored in the system keyring", provider),
        None => println!("{}: no API key in the system keyring", provider),
    }
    Ok(())
}

async fn run_check(state: &AppState, api_key: Option<&str>, message: &str) -> Result<()> {
    let api_key = state.resolve_api_key(api_key).await?;
    let service = state.build_chat_service(api_key)?;

    let response = service
        .send_message(message)
        .await
        .context("Gemini request failed")?;

    println!("{}", response.content.trim_end());
    if let Some(usage) = response.usage {
        println!(
            "-- {} ({} in / {} out tokens)",
            response.model, usage.input_tokens, usage.output_tokens
        );
    }
    Ok(())
}
