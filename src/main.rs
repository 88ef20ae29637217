//! wgadm binary entry point.
//!
//! Parses arguments, sets up file logging, loads the configuration,
//! then runs the TUI with the terminal in raw mode and restores it on exit.
//!
use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wgadm::api::AdminApi;
use wgadm::api::memory::MemoryApi;
use wgadm::app::config::{self, ConsoleConfig};
use wgadm::app::keymap::Keymap;
use wgadm::app::{AppState, Theme};
use wgadm::error::{Context, Result};

#[derive(Debug, Parser)]
#[command(name = "wgadm", version, about = "Administer users, groups, locations and WireGuard devices")]
struct Args {
    /// JSON document backing the admin API; created with demo data if missing.
    #[arg(long, env = "WGADM_DATA")]
    data: Option<PathBuf>,

    /// Directory holding console.conf, theme.conf and keybinds.conf.
    #[arg(long, env = "WGADM_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Where to write logs. The terminal is owned by the UI, so logging is off without it.
    #[arg(long, env = "WGADM_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `wgadm::form=debug`.
    #[arg(long, env = "WGADM_LOG", default_value = "info")]
    log_level: String,
}

fn init_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_ctx(|| format!("open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level)?)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()?;
    Ok(())
}

/// Initialize a Crossterm-backed `ratatui` terminal in raw mode.
fn init_terminal() -> Result<Terminal<CrosstermBackend<std::io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Program entry point: run the TUI and report any top-level error to stderr.
fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let dir = config::resolve_config_dir(args.config_dir.as_deref());
    std::fs::create_dir_all(&dir).with_ctx(|| format!("create config dir {}", dir.display()))?;
    let console = ConsoleConfig::load_or_init(&dir.join(config::CONSOLE_FILE))?;
    let theme = Theme::load_or_init(&dir.join(config::THEME_FILE));
    let keymap = Keymap::load_or_init(&dir.join(config::KEYBINDS_FILE));
    let api: Arc<dyn AdminApi> = match &args.data {
        Some(path) => Arc::new(MemoryApi::open(path)?),
        None => Arc::new(MemoryApi::default()),
    };
    info!(config_dir = %dir.display(), data = ?args.data, "starting");

    let mut app = AppState::new(api, console, theme, keymap);
    let mut terminal = init_terminal().map_err(|e| format!("init terminal: {}", e))?;

    let res = wgadm::app::run(&mut terminal, &mut app);

    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .ok();
    terminal.show_cursor().ok();

    if let Err(err) = res {
        eprintln!("application error: {err}");
    }
    Ok(())
}
