use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use txmail_core::fields::{Field, LabelTable};
use txmail_core::mailbox::{MessageFilter, DEFAULT_KEYWORDS};

use crate::retention::MAX_RETENTION_DAYS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_sender_filter")]
    pub sender_filter: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            sender_filter: default_sender_filter(),
            keywords: default_keywords(),
            max_results: default_max_results(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
            api_base: default_api_base(),
            token_url: default_token_url(),
        }
    }
}

impl MailboxConfig {
    pub fn filter(&self) -> MessageFilter {
        MessageFilter::new(self.sender_filter.clone(), self.keywords.iter().cloned())
    }
}

fn default_user_id() -> String {
    "me".to_string()
}
fn default_sender_filter() -> String {
    "no-reply@cake.vn".to_string()
}
fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}
fn default_max_results() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_api_base() -> String {
    "https://gmail.googleapis.com".to_string()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, the server pings its own `/health` on this interval.
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            keep_alive_secs: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Extra label synonyms, keyed by logical field key (`maGiaoDich`, ...).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub labels: BTreeMap<String, Vec<String>>,
}

impl ExtractionConfig {
    /// Built-in label table extended with the configured synonyms.
    pub fn label_table(&self) -> Result<LabelTable> {
        let mut table = LabelTable::default();
        for (key, synonyms) in &self.labels {
            let field = Field::from_key(key).with_context(|| {
                format!("Unknown field key in [extraction.labels]: '{}'", key)
            })?;
            table.add_synonyms(field, synonyms.iter().cloned());
        }
        Ok(table)
    }
}

/// OAuth client credentials for the mailbox, read from the environment.
#[derive(Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for GmailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl GmailCredentials {
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} environment variable not set", name))
        };
        Ok(Self {
            client_id: var("GMAIL_CLIENT_ID")?,
            client_secret: var("GMAIL_CLIENT_SECRET")?,
            refresh_token: var("GMAIL_REFRESH_TOKEN")?,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate mailbox
    if config.mailbox.sender_filter.trim().is_empty() {
        anyhow::bail!("mailbox.sender_filter must not be empty");
    }
    if config.mailbox.keywords.iter().all(|k| k.trim().is_empty()) {
        anyhow::bail!("mailbox.keywords must contain at least one keyword");
    }
    if !(1..=500).contains(&config.mailbox.max_results) {
        anyhow::bail!("mailbox.max_results must be in [1, 500]");
    }
    if config.mailbox.max_pages == 0 {
        anyhow::bail!("mailbox.max_pages must be > 0");
    }
    if config.mailbox.timeout_secs == 0 {
        anyhow::bail!("mailbox.timeout_secs must be > 0");
    }

    // Validate schedule and retention
    if config.schedule.interval_secs == 0 {
        anyhow::bail!("schedule.interval_secs must be > 0");
    }
    if !(1..=MAX_RETENTION_DAYS).contains(&config.retention.days) {
        anyhow::bail!("retention.days must be in [1, {}]", MAX_RETENTION_DAYS);
    }
    if config.server.keep_alive_secs == Some(0) {
        anyhow::bail!("server.keep_alive_secs must be > 0 when set");
    }

    config.extraction.label_table()?;

    Ok(config)
}
