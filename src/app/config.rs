use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::chat::service::{ChatServiceConfig, DEFAULT_ERROR_REPLY};
use crate::error::{Error, Result};
use crate::models::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::platform::AppPaths;

pub const THEMES: &[&str] = &["dark", "light", "matrix"];

const ENV_PREFIX: &str = "OMNICHAT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub persona: PersonaConfig,
    pub ui: UIConfig,
    pub dictation: DictationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub api_endpoint: String,
    pub timeout_seconds: u64,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub tagline: String,
    pub greeting: String,
    pub placeholder: String,
    pub footer: String,
    pub system_instruction: String,
    pub error_reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    pub theme: String,
    pub tick_rate_ms: u64,
}

/// External speech-to-text command; each line it prints is one transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 60,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Razor Ava".to_string(),
            tagline: "SHARP • EDGY • PRECISE".to_string(),
            greeting: "Don't waste my cycles. What do you need?".to_string(),
            placeholder: "Type or use your voice. Make it quick.".to_string(),
            footer: "Ava is processing. Accuracy not guaranteed for mere mortals.".to_string(),
            system_instruction: "You are Razor Ava, a sharp-witted, edgy, and high-performance AI \
                assistant. Your tone is direct, slightly snarky but highly intelligent. You don't do \
                fluff. You are precise, fast, and always have a razor-sharp edge to your logic. Think \
                cyberpunk, high-tech, and incredibly capable. Be helpful, but keep the attitude of \
                someone who knows they're the smartest in the room."
                .to_string(),
            error_reply: DEFAULT_ERROR_REPLY.to_string(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            tick_rate_ms: 250,
        }
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    pub async fn load(paths: &AppPaths) -> Result<Self> {
        Self::load_from(&paths.config_file()).await
    }

    /// Loads `config_file`, creating it with defaults when missing.
    ///
    /// `OMNICHAT_<SECTION>__<KEY>` environment variables override file values.
    pub async fn load_from(config_file: &Path) -> Result<Self> {
        Self::load_layered(config_file, env_overrides()).await
    }

    async fn load_layered(config_file: &Path, env: Environment) -> Result<Self> {
        if !config_file.exists() {
            info!("Config file not found, creating default configuration");
            Self::default().save_to(config_file).await?;
        }

        info!("Loading configuration from: {:?}", config_file);

        let config: AppConfig = Config::builder()
            .add_source(File::from(config_file).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub async fn save_to(&self, config_file: &Path) -> Result<()> {
        info!("Saving configuration to: {:?}", config_file);

        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(config_file, self.to_toml()?).await?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config_message(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini.model.trim().is_empty() {
            return Err(Error::validation("gemini.model must not be empty"));
        }

        let endpoint = url::Url::parse(&self.gemini.api_endpoint).map_err(|e| {
            Error::validation(format!("gemini.api_endpoint is not a valid URL: {}", e))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::validation("gemini.api_endpoint must use http or https"));
        }

        if self.gemini.timeout_seconds == 0 {
            return Err(Error::validation("gemini.timeout_seconds must be positive"));
        }

        if let Some(temperature) = self.gemini.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::validation("gemini.temperature must be between 0 and 2"));
            }
        }

        if self.persona.name.trim().is_empty() {
            return Err(Error::validation("persona.name must not be empty"));
        }

        if !THEMES.contains(&self.ui.theme.as_str()) {
            return Err(Error::validation(format!(
                "Unknown theme '{}', expected one of: {}",
                self.ui.theme,
                THEMES.join(", ")
            )));
        }

        if !(16..=1000).contains(&self.ui.tick_rate_ms) {
            return Err(Error::validation("ui.tick_rate_ms must be between 16 and 1000"));
        }

        Ok(())
    }

    pub fn to_chat_service_config(&self) -> ChatServiceConfig {
        let instruction = self.persona.system_instruction.trim();

        ChatServiceConfig {
            model: self.gemini.model.clone(),
            system_instruction: (!instruction.is_empty()).then(|| instruction.to_string()),
            temperature: self.gemini.temperature,
            max_output_tokens: self.gemini.max_output_tokens,
            timeout: Duration::from_secs(self.gemini.timeout_seconds),
            error_reply: self.persona.error_reply.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gemini.model, "gemini-3-flash-preview");
        assert_eq!(config.persona.name, "Razor Ava");
        assert_eq!(config.ui.theme, "dark");
        assert!(config.dictation.command.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.gemini.model = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gemini.api_endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gemini.api_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gemini.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gemini.temperature = Some(2.5);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.persona.name = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ui.theme = "neon".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ui.tick_rate_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chat_service_conversion() {
        let mut config = AppConfig::default();
        config.gemini.temperature = Some(0.7);

        let service_config = config.to_chat_service_config();
        assert_eq!(service_config.model, config.gemini.model);
        assert_eq!(service_config.temperature, Some(0.7));
        assert!(service_config
            .system_instruction
            .as_deref()
            .unwrap()
            .starts_with("You are Razor Ava"));

        config.persona.system_instruction = "  ".to_string();
        assert!(config.to_chat_service_config().system_instruction.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[gemini]\nmodel = \"gemini-2.5-pro\"\n\n[dictation]\ncommand = \"whisper-stream\"\nargs = [\"--lang\", \"en\"]\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(config.gemini.model, "gemini-2.5-pro");
        assert_eq!(config.gemini.api_endpoint, DEFAULT_BASE_URL);
        assert_eq!(config.persona, PersonaConfig::default());
        assert_eq!(config.dictation.command.as_deref(), Some("whisper-stream"));
        assert_eq!(config.dictation.args, vec!["--lang", "en"]);
    }

    #[tokio::test]
    async fn test_env_override_wins_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gemini]\nmodel = \"file-model\"\ntimeout_seconds = 30\n").unwrap();

        // Injected variables keep the process environment untouched for parallel tests.
        let vars = config::Map::from([
            ("OMNICHAT_GEMINI__MODEL".to_string(), "env-model".to_string()),
            ("OMNICHAT_GEMINI__TIMEOUT_SECONDS".to_string(), "90".to_string()),
            ("OTHERAPP_GEMINI__MODEL".to_string(), "ignored".to_string()),
        ]);
        let config = AppConfig::load_layered(&path, env_overrides().source(Some(vars)))
            .await
            .unwrap();

        assert_eq!(config.gemini.model, "env-model");
        assert_eq!(config.gemini.timeout_seconds, 90);
        assert_eq!(config.gemini.api_endpoint, DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ui]\ntheme = \"neon\"\n").unwrap();

        assert!(AppConfig::load_from(&path).await.is_err());
    }
}
