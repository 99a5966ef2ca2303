pub mod dictation;
pub mod paths;
pub mod secure_storage;

pub use dictation::{append_transcript, Dictation, DictationEvent};
pub use paths::AppPaths;
pub use secure_storage::{SecureStorage, SecureStorageManager, API_KEY_ENV_VARS};
