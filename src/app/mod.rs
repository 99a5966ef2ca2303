pub mod config;
pub mod state;

pub use config::{AppConfig, DictationConfig, GeminiConfig, PersonaConfig, UIConfig};
pub use state::AppState;
