use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Register the slash commands before connecting to the gateway
    #[arg(long, env = "CTFHELPER_SYNC_COMMANDS")]
    pub sync_commands: bool,

    /// Remove every registered slash command and exit
    #[arg(long)]
    pub clean_commands: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub sync_commands: bool,
    #[serde(default)]
    pub clean_commands: bool,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub bot_settings: BotSettings,
    pub ctftime_settings: CtfTimeSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
        self.sync_commands |= cli_settings.sync_commands;
        self.clean_commands |= cli_settings.clean_commands;
        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                self.bot_settings.token = Some(token);
            }
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub write_max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 8,
            write_max_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 10000,
            foreign_keys: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotSettings {
    /// Bot token, the DISCORD_TOKEN environment variable takes precedence
    pub token: Option<String>,
    /// Guilds that get the slash commands immediately on sync; empty registers them globally
    #[serde(default)]
    pub dev_guilds: Vec<u64>,
    /// Use the in-memory chat platform instead of the gateway (debug builds only)
    #[serde(default)]
    pub mock_enabled: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        BotSettings {
            token: None,
            dev_guilds: vec![],
            mock_enabled: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CtfTimeSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Maximum size of a downloaded event logo
    pub max_logo_bytes: usize,
    #[serde(default)]
    pub mock_enabled: bool,
}

impl Default for CtfTimeSettings {
    fn default() -> Self {
        CtfTimeSettings {
            base_url: String::from("https://ctftime.org/api/v1/"),
            request_timeout_secs: 15,
            max_logo_bytes: 5 * 1024 * 1024,
            mock_enabled: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9980"),
        }
    }
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub sync_commands: bool,
    pub clean_commands: bool,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
            sync_commands: cli.sync_commands,
            clean_commands: cli.clean_commands,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

fn read_settings_file<T: ConfigurableSettings>(path: &PathBuf) -> Result<T, anyhow::Error> {
    let mut content = String::new();
    File::open(path)
        .map_err(|e| anyhow!("Failed to find file {}: {}", path.display(), e))?
        .read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to read config: {}", e))?;
    toml::from_str(&content).map_err(|e| anyhow!("Failed to map config to settings: {}", e))
}

fn write_default_settings<T: ConfigurableSettings>(path: &PathBuf) -> Result<T, anyhow::Error> {
    let default_settings = T::default();

    fs::create_dir_all(T::config_directory())
        .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

    let toml_content = toml::to_string(&default_settings)
        .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

    fs::File::create(path)
        .and_then(|mut file| file.write_all(toml_content.as_bytes()))
        .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

    Ok(default_settings)
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings: T = match cli_settings.config.clone() {
        Some(config_path) => {
            let path = PathBuf::from(config_path);
            let absolute_path = if path.is_absolute() {
                path
            } else {
                env::current_dir()?.join(path)
            };
            read_settings_file(&absolute_path)?
        }
        None => {
            let default_path = T::default_config_path();
            if default_path.exists() {
                read_settings_file(&default_path)?
            } else {
                write_default_settings(&default_path)?
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// Targets that flood the output at info level.
pub fn noisy_log_targets() -> Vec<String> {
    ["hyper", "serenity", "tungstenite", "h2", "rustls", "reqwest"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level.unwrap_or_else(|| env::var("RUST_LOG").unwrap_or_default());
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}
