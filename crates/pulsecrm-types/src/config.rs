//! Daemon configuration, loaded from `~/.pulsecrm/config.toml`.
//!
//! Secrets never live in the file itself. Every credential is referenced by
//! the name of the environment variable that holds it (`*_env` fields) and
//! resolved with [`resolve_env`] at the point of use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root of PulseCRM state: `$PULSECRM_HOME` or `~/.pulsecrm`.
pub fn pulsecrm_home() -> PathBuf {
    if let Ok(home) = std::env::var("PULSECRM_HOME") {
        if !home.trim().is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".pulsecrm")
}

/// Read a secret from the named environment variable.
///
/// Blank names and blank values both resolve to `None`.
pub fn resolve_env(var: &str) -> Option<String> {
    if var.trim().is_empty() {
        return None;
    }
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// The LLM used by default for all AI-assisted services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultModelConfig {
    /// `openai`, `anthropic`, `gemini`, `groq`, `openrouter` or `ollama`.
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl Default for DefaultModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        }
    }
}

/// Lead score thresholds (inclusive lower bounds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub hot_threshold: u8,
    pub warm_threshold: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hot_threshold: 80,
            warm_threshold: 50,
        }
    }
}

/// Background job intervals, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub enabled: bool,
    pub follow_up_secs: u64,
    pub nurturing_secs: u64,
    pub cart_recovery_secs: u64,
    pub payment_reminder_secs: u64,
    pub alerts_secs: u64,
    pub dedup_secs: u64,
    pub dispatch_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            follow_up_secs: 3600,
            nurturing_secs: 86_400,
            cart_recovery_secs: 3600,
            payment_reminder_secs: 86_400,
            alerts_secs: 3600,
            dedup_secs: 86_400,
            dispatch_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_message_length: usize,
    pub max_conversation_history: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4096,
            max_conversation_history: 50,
        }
    }
}

/// Agent rosters used for round-robin assignment of routed messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub sales_agents: Vec<String>,
    pub retention_specialists: Vec<String>,
    pub support_agents: Vec<String>,
}

/// Business facts the chatbot is allowed to quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyConfig {
    pub name: String,
    pub policies: Vec<String>,
    /// Case value above which an escalation is treated as high value.
    pub high_value_threshold: f64,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: "PulseCRM".to_string(),
            policies: vec![
                "Free shipping on orders over $50.".to_string(),
                "Returns accepted within 30 days of delivery.".to_string(),
                "We accept credit cards, bank transfers and ACH.".to_string(),
            ],
            high_value_threshold: 5000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Calling code (digits only) assumed for numbers without a `+` prefix.
    pub default_calling_code: String,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            default_calling_code: "507".to_string(),
        }
    }
}

/// WhatsApp Business Cloud API credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub phone_number_id: String,
    pub access_token_env: String,
    /// Numbers allowed to receive messages (empty = all).
    pub allowed_users: Vec<String>,
    pub api_base_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            phone_number_id: String::new(),
            access_token_env: "META_ACCESS_TOKEN".to_string(),
            allowed_users: Vec::new(),
            api_base_url: "https://graph.facebook.com/v21.0".to_string(),
        }
    }
}

/// SMTP settings for email delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password_env: String,
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password_env: "SMTP_PASSWORD".to_string(),
            subject: "A message from our team".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<WhatsAppConfig>,
    pub email: Option<EmailConfig>,
}

/// Meta Graph API settings (Instagram, Facebook page, Messenger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub access_token_env: String,
    pub app_secret_env: String,
    pub verify_token_env: String,
    pub instagram_business_account_id: String,
    pub facebook_page_id: String,
    pub graph_base_url: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            access_token_env: "META_ACCESS_TOKEN".to_string(),
            app_secret_env: "META_APP_SECRET".to_string(),
            verify_token_env: "WEBHOOK_VERIFY_TOKEN".to_string(),
            instagram_business_account_id: String::new(),
            facebook_page_id: String::new(),
            graph_base_url: "https://graph.facebook.com/v18.0".to_string(),
        }
    }
}

/// Outbound automation webhook (n8n).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct N8nConfig {
    pub webhook_url: Option<String>,
}

impl Default for N8nConfig {
    fn default() -> Self {
        Self {
            webhook_url: Some("http://localhost:5678/webhook".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub clearbit_api_key_env: String,
    pub clearbit_base_url: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            clearbit_api_key_env: "CLEARBIT_API_KEY".to_string(),
            clearbit_base_url: "https://person.clearbit.com/v2/combined/find".to_string(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub home_dir: PathBuf,
    pub data_dir: PathBuf,
    pub api_listen: String,
    pub log_level: String,
    /// `json` or `pretty`.
    pub log_format: String,
    pub default_model: DefaultModelConfig,
    pub fallback_models: Vec<DefaultModelConfig>,
    pub scoring: ScoringConfig,
    pub jobs: JobsConfig,
    pub limits: LimitsConfig,
    pub routing: RoutingConfig,
    pub company: CompanyConfig,
    pub cleaning: CleaningConfig,
    pub channels: ChannelsConfig,
    pub meta: MetaConfig,
    pub n8n: N8nConfig,
    pub enrichment: EnrichmentConfig,
}

impl Default for CrmConfig {
    fn default() -> Self {
        let home_dir = pulsecrm_home();
        Self {
            data_dir: home_dir.join("data"),
            home_dir,
            api_listen: "127.0.0.1:8000".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            default_model: DefaultModelConfig::default(),
            fallback_models: Vec::new(),
            scoring: ScoringConfig::default(),
            jobs: JobsConfig::default(),
            limits: LimitsConfig::default(),
            routing: RoutingConfig::default(),
            company: CompanyConfig::default(),
            cleaning: CleaningConfig::default(),
            channels: ChannelsConfig::default(),
            meta: MetaConfig::default(),
            n8n: N8nConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl CrmConfig {
    /// Load configuration from `path`, or from `<home>/config.toml` when
    /// `path` is `None`. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (pulsecrm_home().join("config.toml"), false),
        };

        if !path.exists() && !required {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.warm_threshold >= self.scoring.hot_threshold {
            return Err(ConfigError::Invalid(format!(
                "scoring.warm_threshold ({}) must be below scoring.hot_threshold ({})",
                self.scoring.warm_threshold, self.scoring.hot_threshold
            )));
        }
        if self.scoring.hot_threshold > 100 {
            return Err(ConfigError::Invalid(
                "scoring.hot_threshold must be at most 100".to_string(),
            ));
        }
        if self.limits.max_message_length == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_message_length must be positive".to_string(),
            ));
        }
        if !self
            .cleaning
            .default_calling_code
            .chars()
            .all(|c| c.is_ascii_digit())
            || self.cleaning.default_calling_code.is_empty()
        {
            return Err(ConfigError::Invalid(
                "cleaning.default_calling_code must contain digits only".to_string(),
            ));
        }
        Ok(())
    }

    /// Location of the SQLite database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("pulsecrm.db")
    }

    /// Verify token expected on Meta webhook subscription handshakes.
    pub fn webhook_verify_token(&self) -> Option<String> {
        resolve_env(&self.meta.verify_token_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_business_rules() {
        let cfg = CrmConfig::default();
        assert_eq!(cfg.scoring.hot_threshold, 80);
        assert_eq!(cfg.scoring.warm_threshold, 50);
        assert_eq!(cfg.limits.max_message_length, 4096);
        assert_eq!(cfg.limits.max_conversation_history, 50);
        assert_eq!(cfg.jobs.follow_up_secs, 3600);
        assert_eq!(cfg.jobs.payment_reminder_secs, 86_400);
        assert_eq!(cfg.log_format, "json");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
api_listen = "0.0.0.0:9000"

[default_model]
provider = "anthropic"
model = "claude-3-5-haiku-latest"
api_key_env = "ANTHROPIC_API_KEY"

[scoring]
hot_threshold = 85

[routing]
sales_agents = ["ana", "luis"]
"#,
        )
        .unwrap();

        let cfg = CrmConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.api_listen, "0.0.0.0:9000");
        assert_eq!(cfg.default_model.provider, "anthropic");
        assert_eq!(cfg.scoring.hot_threshold, 85);
        assert_eq!(cfg.scoring.warm_threshold, 50);
        assert_eq!(cfg.routing.sales_agents, vec!["ana", "luis"]);
        assert_eq!(cfg.limits.max_message_length, 4096);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scoring]\nhot_threshold = 40\nwarm_threshold = 60\n").unwrap();
        assert!(matches!(
            CrmConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            CrmConfig::load(Some(&path)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn blank_env_names_resolve_to_none() {
        assert_eq!(resolve_env(""), None);
        assert_eq!(resolve_env("   "), None);
    }
}
