use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_ASSISTANT_ID: &str = "assistant_001";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub backend_url: Option<String>,
    pub default_model: Option<String>,
    pub default_limit: Option<u32>,
    pub assistant_id: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            backend_url: None,
            default_model: None,
            default_limit: None,
            assistant_id: None,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    pub fn backend_url(&self) -> String {
        self.backend_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    pub fn assistant_id(&self) -> String {
        self.assistant_id
            .clone()
            .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string())
    }

    pub fn limit(&self) -> u32 {
        self.default_limit.unwrap_or(5)
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn session_cache_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("session.json"))
    }

    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("companion.log"))
    }

    fn app_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("companion-chat"))
    }
}
