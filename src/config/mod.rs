use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const AUDIENCE_EVERYONE: &str = "0";
pub const AUDIENCE_MATURE: &str = "1";

/// Preferencias del usuario. El archivo se reescribe completo en cada guardado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token: String,
    pub title: String,
    pub game: String,
    pub audience_type: String,
    pub suppress_donation_reminder: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            title: String::new(),
            game: String::new(),
            audience_type: AUDIENCE_EVERYONE.to_string(),
            suppress_donation_reminder: false,
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no config file, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config file is not valid json, using defaults");
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| anyhow!("No se pudo determinar el directorio de configuración"))?;

        Ok(config_dir.join("streamkey").join("config.json"))
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub fn is_mature(&self) -> bool {
        self.audience_type == AUDIENCE_MATURE
    }

    pub fn set_mature(&mut self, mature: bool) {
        self.audience_type = if mature { AUDIENCE_MATURE } else { AUDIENCE_EVERYONE }.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).await;

        assert_eq!(config, Config::default());
        assert_eq!(config.audience_type, "0");
        assert!(config.title.is_empty());
        assert!(config.game.is_empty());
        assert!(!config.has_token());
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"title":"hola","audience_type":"1"}"#).unwrap();

        let config = Config::load(&path).await;
        assert_eq!(config.title, "hola");
        assert!(config.is_mature());
        assert!(config.token.is_empty());
        assert!(!config.suppress_donation_reminder);
    }

    #[tokio::test]
    async fn save_overwrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"title":"old","extra":"dropped"}"#).unwrap();

        let mut config = Config::default();
        config.token = "abc".into();
        config.set_mature(true);
        config.save(&path).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["token"], "abc");
        assert_eq!(raw["title"], "");
        assert_eq!(raw["audience_type"], "1");
        assert!(raw.get("extra").is_none());
    }
}
