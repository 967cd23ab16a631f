use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub jokes: JokesConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`). Required, may come from `SLACK_BOT_TOKEN`.
    pub bot_token: Option<String>,
    /// Channel ID to post into. Required, may come from `SLACK_CHANNEL_ID`.
    pub channel: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    /// `:emoji:` or an image URL.
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_caption")]
    pub caption: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_slack_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: None,
            username: default_username(),
            icon: default_icon(),
            caption: default_caption(),
            api_base: default_slack_api_base(),
            timeout_secs: default_slack_timeout_secs(),
        }
    }
}

fn default_username() -> String {
    "Joke Bot".to_string()
}

fn default_icon() -> String {
    ":laughing:".to_string()
}

fn default_caption() -> String {
    "Your scheduled dose of dad jokes".to_string()
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct JokesConfig {
    #[serde(default = "default_jokes_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_jokes_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for JokesConfig {
    fn default() -> Self {
        Self {
            url: default_jokes_url(),
            user_agent: default_user_agent(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_jokes_timeout_secs(),
            backoff_step_ms: default_backoff_step_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_jokes_url() -> String {
    "https://icanhazdadjoke.com/".to_string()
}

fn default_user_agent() -> String {
    format!("jokebot/{} (Slack joke bot)", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jokes_timeout_secs() -> u64 {
    5
}

fn default_backoff_step_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_path() -> PathBuf {
    base_dir().join("history.json")
}

fn default_history_capacity() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

fn default_cron() -> String {
    "0 9 * * *".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    Some(base_dir().join("jokebot.log"))
}

pub fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jokebot")
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)?;
    config.history.path = expand_tilde_path(&config.history.path);
    config.log.file = config.log.file.as_deref().map(expand_tilde_path);
    Ok(config)
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = base_dir();
    tokio::fs::create_dir_all(&base).await?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[slack]
# bot_token = "xoxb-YOUR_BOT_TOKEN"   # or SLACK_BOT_TOKEN
# channel = "C0123456789"            # or SLACK_CHANNEL_ID
username = "Joke Bot"
icon = ":laughing:"                  # emoji or image URL
caption = "Your scheduled dose of dad jokes"

[jokes]
url = "https://icanhazdadjoke.com/"
max_attempts = 3

[history]
# path = "~/.jokebot/history.json"
capacity = 20

[schedule]
cron = "0 9 * * *"

[log]
# file = "~/.jokebot/jokebot.log"
"#,
        )
        .await?;
    }

    Ok(config_path)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn expand_tilde_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_tilde(s),
        None => path.to_path_buf(),
    }
}
