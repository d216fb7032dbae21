use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Credentials pulled from the environment (optionally via a .env file).
///
/// Every secret is optional at load time; each component enforces its own
/// requirement at construction, so a run without SMTP credentials still
/// fails where it should (at the send step) and a run without a Gemini key
/// degrades the optional stages before failing at summarization.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub smtp_username: String,
    pub smtp_password: String,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::try_load_dotenv();

        Self {
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
        }
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/research-radar/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("research-radar").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}

/// Pipeline settings from a TOML file. Every field has a default so a
/// minimal config can stay minimal; a missing file is a fatal error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub search: SearchSettings,
    pub summarization: SummarizationSettings,
    pub email: EmailSettings,
    pub smtp: SmtpSettings,
    pub state: StateSettings,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Configuration file {} not found", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// Lookback window: papers published within the last N days.
    pub search_window_days: i64,
    pub max_results_per_source: usize,
    pub use_llm_query_generation: bool,
    pub research_focus: String,
    pub num_queries: usize,
    pub exclude_topics: Vec<String>,
    pub fallback_queries: Vec<String>,
    pub use_relevance_filtering: bool,
    pub business_context: String,
    pub highly_relevant_threshold: f64,
    pub also_relevant_threshold: f64,
    pub min_total_papers: usize,
    pub query_model: String,
    pub relevance_model: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            search_window_days: 7,
            max_results_per_source: 12,
            use_llm_query_generation: false,
            research_focus: String::new(),
            num_queries: 7,
            exclude_topics: Vec::new(),
            fallback_queries: Vec::new(),
            use_relevance_filtering: false,
            business_context: String::new(),
            highly_relevant_threshold: 7.0,
            also_relevant_threshold: 5.0,
            min_total_papers: 5,
            query_model: "gemini-2.0-flash-exp".to_string(),
            relevance_model: "gemini-2.0-flash-exp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummarizationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_summaries: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".to_string(),
            temperature: 0.2,
            max_summaries: 12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailSettings {
    pub recipients: Vec<String>,
    pub from_email: String,
    pub from_name: String,
    pub subject_prefix: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            from_email: "research@example.com".to_string(),
            from_name: "Research Radar".to_string(),
            subject_prefix: "[Research Digest]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            use_ssl: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateSettings {
    pub file: String,
    pub retention_days: i64,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            file: "state/seen_ids.json".to_string(),
            retention_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_gets_all_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.search.search_window_days, 7);
        assert_eq!(settings.search.highly_relevant_threshold, 7.0);
        assert_eq!(settings.search.also_relevant_threshold, 5.0);
        assert_eq!(settings.search.min_total_papers, 5);
        assert_eq!(settings.summarization.max_summaries, 12);
        assert_eq!(settings.smtp.port, 465);
        assert!(settings.smtp.use_ssl);
        assert_eq!(settings.state.retention_days, 30);
        assert_eq!(settings.state.file, "state/seen_ids.json");
    }

    #[test]
    fn test_partial_section_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [search]
            search_window_days = 14
            use_relevance_filtering = true
            fallback_queries = ['"digital twin" AND consumer']

            [email]
            recipients = ["team@example.com"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.search.search_window_days, 14);
        assert!(settings.search.use_relevance_filtering);
        assert_eq!(settings.search.fallback_queries.len(), 1);
        assert_eq!(settings.email.recipients, vec!["team@example.com"]);
        // Untouched sections keep their defaults
        assert_eq!(settings.summarization.temperature, 0.2);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<Settings, _> = toml::from_str("[search]\nwindw_days = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file_is_fatal() {
        assert!(Settings::load("definitely/not/here.toml").is_err());
    }
}
