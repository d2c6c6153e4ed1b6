pub mod commands;
pub mod config;
pub mod error;
pub mod kiosk;

use crate::commands::Outcome;
use crate::config::KioskConfig;
use crate::error::SyncError;
use crate::kiosk::{
    ControllerEngine, DisplayEngine, JsonFileStore, KeyValueStore, MemoryStore, SyncContext,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

/// Environment variable naming the directory of the file-backed store
pub const STATE_DIR_ENV: &str = "KIOSK_STATE_DIR";

/// How this process was launched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub config_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    /// Bootstrap queries (`?id=tv2`), one per display to run
    pub displays: Vec<String>,
}

impl LaunchOptions {
    pub fn from_env_and_args() -> Self {
        Self::parse(
            std::env::var(STATE_DIR_ENV).ok(),
            std::env::args().skip(1),
        )
    }

    /// Environment first, then command-line args.
    pub fn parse<I>(state_dir_env: Option<String>, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = LaunchOptions {
            state_dir: state_dir_env
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            ..Default::default()
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "--state-dir" | "--display" => {
                    let Some(value) = args.next() else {
                        warn!("{} needs a value", arg);
                        continue;
                    };
                    match arg.as_str() {
                        "--config" => options.config_path = Some(PathBuf::from(value)),
                        "--state-dir" => {
                            if options.state_dir.is_none() {
                                options.state_dir = Some(PathBuf::from(value));
                            }
                        }
                        _ => options.displays.push(value),
                    }
                }
                other => warn!("Ignoring unknown argument {}", other),
            }
        }
        options
    }

    /// Queries to activate; every configured display when none were given.
    pub fn display_queries(&self, config: &KioskConfig) -> Vec<String> {
        if self.displays.is_empty() {
            config.display_ids().map(|id| format!("?id={}", id)).collect()
        } else {
            self.displays.clone()
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}

fn open_backend(state_dir: Option<&PathBuf>) -> Box<dyn KeyValueStore> {
    match state_dir {
        Some(dir) => match JsonFileStore::open(dir) {
            Ok(store) => Box::new(store),
            Err(e) => {
                warn!("State dir {} unusable ({}), keeping state in memory", dir.display(), e);
                Box::new(MemoryStore::new())
            }
        },
        None => Box::new(MemoryStore::new()),
    }
}

/// Run a controller and the selected displays in this process, driven by
/// operator commands on stdin.
pub async fn run() -> Result<(), SyncError> {
    init_tracing();

    let options = LaunchOptions::from_env_and_args();
    let config = KioskConfig::resolve(options.config_path.as_deref())?;
    let ctx = SyncContext::new(config, open_backend(options.state_dir.as_ref()));

    let mut controller = ControllerEngine::activate(&ctx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut displays = Vec::new();
    for query in options.display_queries(ctx.config()) {
        match DisplayEngine::activate_from_query(&ctx, &query) {
            Ok(display) => displays.push(tokio::spawn(display.run(shutdown_rx.clone()))),
            Err(e) => eprintln!("Display '{}' not started: {}", query, e),
        }
    }
    info!("{} displays running", displays.len());

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match commands::parse_line(&line) {
                    Ok(Some(command)) => match commands::execute(&mut controller, command) {
                        Outcome::Continue(message) => println!("{}", message),
                        Outcome::Quit => break,
                    },
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            inbound = controller.next_inbound() => match inbound {
                Some(inbound) => controller.handle(inbound),
                None => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in displays {
        match handle.await {
            Ok(state) => info!("{} stopped in {} mode", state.display_id, state.mode),
            Err(e) => warn!("Display task failed: {}", e),
        }
    }
    controller.deactivate();
    Ok(())
}
