use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top level configuration for the `astra` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Persona name used in prompts and canned replies.
    #[serde(default = "default_name")]
    pub name: String,
    /// File the interaction log is persisted to.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Silence longer than this earns a chat a nudge during the sweep.
    #[serde(default = "default_idle_after")]
    pub idle_after_secs: u64,
    #[serde(default)]
    pub telegram: TelegramConfig,
    pub notion: NotionConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token. Falls back to `TELEGRAM_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_telegram_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_telegram_base(),
            poll_timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    /// Integration token. Falls back to `NOTION_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    pub database_id: String,
    #[serde(default = "default_notion_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_notion_version")]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Names of the task fields the bot reads and writes, and the status
/// values that mean "new" and "finished".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub title_property: String,
    pub status_property: String,
    pub due_property: String,
    pub initial_status: String,
    pub done_status: String,
    /// Person-list field used to narrow `/listtasks` to one assignee.
    pub assignee_property: Option<String>,
    pub assignee_id: Option<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            title_property: "Task name".into(),
            status_property: "Status".into(),
            due_property: "Due Date".into(),
            initial_status: "Not started".into(),
            done_status: "Done".into(),
            assignee_property: None,
            assignee_id: None,
        }
    }
}

fn default_name() -> String {
    "Astra".into()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("interaction_log.json")
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_idle_after() -> u64 {
    3600
}

fn default_timeout() -> u64 {
    30
}

fn default_telegram_base() -> String {
    "https://api.telegram.org".into()
}

fn default_notion_base() -> String {
    "https://api.notion.com/v1".into()
}

fn default_notion_version() -> String {
    "2022-06-28".into()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "tinyllama".into()
}

impl Config {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        anyhow::ensure!(
            cfg.sweep_interval_secs > 0,
            "sweep_interval_secs must be at least 1"
        );
        Ok(cfg)
    }

    /// Telegram bot token from the file or the environment.
    pub fn telegram_token(&self) -> anyhow::Result<String> {
        secret(self.telegram.token.as_deref(), "TELEGRAM_TOKEN")
    }

    /// Notion integration token from the file or the environment.
    pub fn notion_token(&self) -> anyhow::Result<String> {
        secret(self.notion.token.as_deref(), "NOTION_TOKEN")
    }
}

fn secret(configured: Option<&str>, env: &str) -> anyhow::Result<String> {
    match configured {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => std::env::var(env)
            .map_err(|_| anyhow::anyhow!("no token configured and {env} is not set")),
    }
}

/// Load a [`Config`] from a TOML file.
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// let cfg = astra::config::load("astra.toml").await?;
/// println!("{}", cfg.ollama.model);
/// # Ok(())
/// # }
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Config::from_toml(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let cfg = Config::from_toml(
            r#"
            [notion]
            token = "n"
            database_id = "db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "Astra");
        assert_eq!(cfg.ollama.model, "tinyllama");
        assert_eq!(cfg.ollama.timeout_secs, 30);
        assert_eq!(cfg.tasks.due_property, "Due Date");
        assert_eq!(cfg.sweep_interval_secs, 3600);
        assert_eq!(cfg.notion_token().unwrap(), "n");
    }

    #[test]
    fn overrides_task_fields() {
        let cfg = Config::from_toml(
            r#"
            name = "Vega"
            [notion]
            database_id = "db"
            [tasks]
            status_property = "State"
            assignee_property = "Owner"
            assignee_id = "u1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.name, "Vega");
        assert_eq!(cfg.tasks.status_property, "State");
        assert_eq!(cfg.tasks.title_property, "Task name");
        assert_eq!(cfg.tasks.assignee_id.as_deref(), Some("u1"));
    }

    #[test]
    fn zero_sweep_interval_is_an_error() {
        let err = Config::from_toml("sweep_interval_secs = 0\n[notion]\ndatabase_id = \"db\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn missing_database_is_an_error() {
        assert!(Config::from_toml("[notion]\ntoken = \"x\"\n").is_err());
    }
}
