mod child;
mod client;
mod connection;
mod demo;
mod error;
mod process;
mod render;
mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kickoff_core::config::{ConfigError, LaunchMode, LauncherConfig};
use kickoff_core::i18n::{LanguageData, Languages};
use kickoff_core::model::Viewport;
use kickoff_core::orchestrator::Container;

use client::ClientSettings;
use error::AppError;
use process::ChildSpec;

const LOG_FILE: &str = "kickoff.log";
const DEFAULT_FILTER: &str = "kickoff=info,kickoff_core=info";

#[derive(Parser)]
#[command(name = "kickoff")]
#[command(about = "Launch clients and show their initialization screens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the clients (default)
    Run {
        #[arg(short, long)]
        clients: Option<usize>,
        #[arg(short, long)]
        mode: Option<LaunchModeArg>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Run one headless client (started by `run --mode process`)
    #[command(hide = true)]
    Child {
        #[arg(long)]
        index: usize,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Validate the config and print the resolved settings
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LaunchModeArg {
    InProcess,
    Process,
}

impl From<LaunchModeArg> for LaunchMode {
    fn from(mode: LaunchModeArg) -> Self {
        match mode {
            LaunchModeArg::InProcess => LaunchMode::InProcess,
            LaunchModeArg::Process => LaunchMode::Process,
        }
    }
}

#[derive(Clone, Copy)]
enum LogTarget {
    Stderr,
    /// Plain lines, relayed by the supervisor
    ChildStderr,
    File,
}

fn init_tracing(target: LogTarget) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::ChildStderr => builder
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .without_time()
            .try_init(),
        LogTarget::File => match File::create(LOG_FILE) {
            Ok(file) => builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init(),
            // no log file, no logs: stderr would draw over the panes
            Err(_) => return,
        },
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// Explicit path, else discovery, else built-in defaults
fn load_config(path: Option<&Path>) -> Result<(Option<PathBuf>, LauncherConfig), ConfigError> {
    if let Some(path) = path {
        return Ok((Some(path.to_path_buf()), LauncherConfig::load(path)?));
    }

    let cwd = std::env::current_dir()?;
    match LauncherConfig::discover(&cwd) {
        Ok((path, config)) => Ok((Some(path), config)),
        Err(ConfigError::NotFound { .. }) => Ok((None, LauncherConfig::default())),
        Err(e) => Err(e),
    }
}

/// `--lang`, then the config, then the locale
fn load_texts(lang: Option<&str>, config: &LauncherConfig) -> Result<LanguageData, AppError> {
    let mut languages = Languages::builtin()?;

    match lang.or(config.language.as_deref()) {
        Some(lang) => languages.set_language(lang)?,
        None => {
            let locale = std::env::var("LC_ALL")
                .or_else(|_| std::env::var("LANG"))
                .ok();
            languages.resolve(locale.as_deref());
        }
    }

    Ok(languages.current()?.clone())
}

async fn run_parent(
    clients: Option<usize>,
    mode: Option<LaunchMode>,
    config_path: Option<PathBuf>,
    lang: Option<String>,
) -> Result<(), AppError> {
    let (config_path, mut config) = load_config(config_path.as_deref())?;
    if let Some(count) = clients {
        config.clients.count = count;
    }
    if let Some(mode) = mode {
        config.clients.mode = mode;
    }
    config.validate()?;

    // the terminal panes own stderr in-process
    init_tracing(match config.clients.mode {
        LaunchMode::InProcess => LogTarget::File,
        LaunchMode::Process => LogTarget::Stderr,
    });

    tracing::info!(
        clients = config.clients.count,
        mode = %config.clients.mode,
        config = ?config_path,
        "launching"
    );

    match config.clients.mode {
        LaunchMode::InProcess => {
            let texts = load_texts(lang.as_deref(), &config)?;
            let settings = ClientSettings::from_config(&config, texts);
            ui::run(settings, config.clients.count).await
        }
        LaunchMode::Process => {
            // fail fast on a bad language before spawning anything
            load_texts(lang.as_deref(), &config)?;

            let program = match &config.clients.program {
                Some(program) => program.clone(),
                None => std::env::current_exe()?,
            };
            let specs = (0..config.clients.count)
                .map(|index| ChildSpec {
                    index,
                    client_id: uuid::Uuid::new_v4().to_string(),
                    program: program.clone(),
                    config: config_path.clone(),
                    language: lang.clone(),
                })
                .collect();
            process::run(specs).await
        }
    }
}

async fn run_child(
    index: usize,
    client_id: String,
    config_path: Option<PathBuf>,
    lang: Option<String>,
) -> Result<i32, AppError> {
    let (_, config) = load_config(config_path.as_deref())?;
    let texts = load_texts(lang.as_deref(), &config)?;
    let settings = ClientSettings::from_config(&config, texts);

    let container = Container {
        index,
        client_id,
        viewport: Viewport::new(80, 24),
    };
    child::run(container, settings, config.clients.restart_on_error).await
}

fn run_check(config_path: Option<PathBuf>, json: bool) -> Result<(), AppError> {
    let (path, config) = load_config(config_path.as_deref())?;
    config.validate()?;
    load_texts(None, &config)?;

    match &path {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: built-in defaults"),
    }
    let resolved = if json {
        serde_json::to_string_pretty(&config).map_err(std::io::Error::other)?
    } else {
        serde_yaml::to_string(&config).map_err(ConfigError::Yaml)?
    };
    println!("{}", resolved);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Check { config, json }) => {
            init_tracing(LogTarget::Stderr);
            run_check(config, json)
        }
        Some(Commands::Child {
            index,
            client_id,
            config,
            lang,
        }) => {
            init_tracing(LogTarget::ChildStderr);
            match run_child(index, client_id, config, lang).await {
                Ok(code) => std::process::exit(code),
                Err(e) => Err(e),
            }
        }
        Some(Commands::Run {
            clients,
            mode,
            config,
            lang,
        }) => run_parent(clients, mode.map(LaunchMode::from), config, lang).await,
        None => run_parent(None, None, None, None).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
