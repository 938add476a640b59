use std::fs::File;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;

mod api;
mod app;
mod config;
mod handler;
mod model;
mod playback;
mod session;
mod stream;
mod tui;
mod ui;

use api::ApiClient;
use app::App;
use config::Config;
use session::JsonFileStore;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "TUI chat client for the companion memory assistant backend")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Chat model to use (chatgpt / deepseek, overrides the config file)
    #[arg(short, long)]
    model: Option<String>,

    /// Log more verbosely
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::new()
    });
    if let Some(url) = cli.backend_url {
        config.backend_url = Some(url);
    }
    if let Some(model) = cli.model {
        config.default_model = Some(model);
    }

    let api = ApiClient::new(&config.backend_url());
    let store = JsonFileStore::new(Config::session_cache_path()?);

    let mut events = EventHandler::new();
    let mut app = App::new(&config, api, Box::new(store), events.sender())?;

    // Populate pickers and the header health indicator before first draw;
    // an unreachable backend just leaves the cached lists in place.
    app.refresh_entity_lists().await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut events, &mut app).await;

    app.save_session();
    tui::restore()?;

    result
}

async fn run(
    terminal: &mut tui::Tui,
    events: &mut EventHandler,
    app: &mut App,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        } else {
            break;
        }
    }
    Ok(())
}

/// Log to a file; stderr belongs to the TUI.
fn init_logging(verbose: bool) -> Result<()> {
    let path = Config::log_file_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}
