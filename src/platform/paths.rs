use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("ai", "omnichat", "OmniChat")
            .ok_or_else(|| Error::platform("Failed to determine application directories"))?;

        Ok(Self {
            config_file: project_dirs.config_dir().join("config.toml"),
            data_dir: project_dirs.data_dir().to_path_buf(),
        })
    }

    /// Standard data directory, but the config file given by `--config`.
    pub fn with_config_file(config_file: impl Into<PathBuf>) -> Result<Self> {
        let mut paths = Self::new()?;
        paths.config_file = config_file.into();
        Ok(paths)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_file.clone()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    pub fn ensure_dirs_exist(&self) -> Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
