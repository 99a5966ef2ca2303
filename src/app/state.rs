use std::sync::Arc;
use tracing::info;

use crate::app::config::AppConfig;
use crate::chat::ChatService;
use crate::error::Result;
use crate::models::{GeminiProvider, ModelProvider};
use crate::platform::{AppPaths, SecureStorageManager};

pub const PROVIDER_NAME: &str = "gemini";

/// Process-wide state shared by the CLI commands and the TUI.
pub struct AppState {
    config: AppConfig,
    paths: AppPaths,
    secure_storage: SecureStorageManager,
}

impl AppState {
    pub fn new(config: AppConfig, paths: AppPaths, secure_storage: SecureStorageManager) -> Self {
        Self {
            config,
            paths,
            secure_storage,
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn secure_storage(&self) -> &SecureStorageManager {
        &self.secure_storage
    }

    /// Looks up the API key: `explicit`, then the environment, then the keyring.
    pub async fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String> {
        self.secure_storage
            .resolve_api_key(PROVIDER_NAME, explicit, |name| std::env::var(name).ok())
            .await
    }

    pub fn build_provider(&self, api_key: String) -> Result<Arc<dyn ModelProvider>> {
        let provider = GeminiProvider::with_base_url(api_key, self.config.gemini.api_endpoint.clone())?;
        Ok(Arc::new(provider))
    }

    pub fn build_chat_service(&self, api_key: String) -> Result<ChatService> {
        let provider = self.build_provider(api_key)?;
        info!("Chat service ready for persona '{}'", self.config.persona.name);
        Ok(ChatService::new(provider, self.config.to_chat_service_config()))
    }
}
