use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use cwicr::pipeline::SortKey;
use cwicr::{
    logging, run_report, App, AppConfig, AppEvent, Args, CacheManager, ConfigManager,
    FileKvStore, QueryRequest, RowStore, APP_NAME,
};
use ratatui::DefaultTerminal;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

fn run(
    mut terminal: DefaultTerminal,
    config: &AppConfig,
    config_manager: &ConfigManager,
    region: &str,
    args: &Args,
) -> Result<()> {
    let (tx, rx) = channel::<AppEvent>();
    let kv = Arc::new(FileKvStore::from_config(config_manager));
    let mut app = App::new(tx.clone(), config, kv, region)?;
    if args.debug {
        app.enable_debug();
    }
    render(&mut terminal, &mut app)?;
    tx.send(AppEvent::LoadRegion(region.to_string()))?;

    let poll_interval = Duration::from_millis(config.display.event_poll_interval_ms);
    loop {
        if crossterm::event::poll(poll_interval)? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        return Err(eyre!(msg));
                    }
                    event => {
                        if let Some(event) = app.event(event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    Ok(())
}

fn handle_early_exit_flags(args: &Args, config_manager: &ConfigManager) -> Result<Option<()>> {
    if args.clear_cache {
        match CacheManager::new(APP_NAME) {
            Ok(cache) => {
                let removed = cache.clear_all()?;
                println!("Cache cleared ({} files removed)", removed);
            }
            Err(_e) => println!("No cache to clear"),
        }
        return Ok(Some(()));
    }

    if args.write_default_config {
        let path = config_manager.write_default_config(args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(Some(()));
    }

    if args.list_regions {
        let config = AppConfig::load_from(config_manager)?;
        for (key, region) in &config.regions {
            println!(
                "{:<16} {:<4} {:<6} {}",
                key,
                region.currency,
                region.locale,
                config.region_path(region).display()
            );
        }
        return Ok(Some(()));
    }

    Ok(None)
}

/// Region from the command line, else the configured default, else the first configured.
fn initial_region(args: &Args, config: &AppConfig) -> Result<String> {
    args.region
        .clone()
        .or_else(|| config.display.default_region.clone())
        .or_else(|| config.regions.keys().next().cloned())
        .ok_or_else(|| eyre!("No regions configured. Add a [regions.<KEY>] section to config.toml"))
}

fn run_json(args: &Args, config: &AppConfig, region: &str) -> Result<()> {
    let sort = match &args.sort {
        Some(text) => vec![SortKey::parse(text).ok_or_else(|| eyre!("Invalid sort: {}", text))?],
        None => Vec::new(),
    };
    let request = QueryRequest {
        search: args.search.clone().unwrap_or_default(),
        query: args.query.clone().unwrap_or_default(),
        conditions: Vec::new(),
        sort,
        limit: args.limit,
    };
    let mut store = RowStore::from_config(config);
    let report = run_report(&mut store, region, &request)?;
    if !report.unrecognized.is_empty() {
        tracing::warn!(unrecognized = ?report.unrecognized, "query segments not understood");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_manager = match &args.config_dir {
        Some(dir) => ConfigManager::with_dir(dir.clone()),
        None => ConfigManager::new(APP_NAME)?,
    };

    if let Some(()) = handle_early_exit_flags(&args, &config_manager)? {
        return Ok(());
    }

    let config = AppConfig::load_from(&config_manager)?;
    let debug = args.debug || config.debug.enabled;
    let cache = CacheManager::new(APP_NAME)?;
    if let Err(e) = logging::init_logging(&cache, debug, &config.debug.log_level) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let region = initial_region(&args, &config)?;
    if args.json {
        return run_json(&args, &config, &region);
    }

    let terminal = ratatui::init();
    let result = run(terminal, &config, &config_manager, &region, &args);
    ratatui::restore();
    if let Err(e) = result {
        tracing::error!("exiting with error: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
