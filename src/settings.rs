use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::auth::AuthFlow;

pub const DEFAULT_API_BASE: &str = "https://streamlabs.com";

/// Ajustes de la aplicación: valores por defecto + variables `STREAMKEY_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_base: String,
    pub chrome_binary: Option<PathBuf>,
    pub cookies_file: PathBuf,
    pub config_file: Option<PathBuf>,
    pub auth_flow: AuthFlow,
    pub login_timeout_secs: u64,
    pub exchange_delay_secs: u64,
    pub check_updates: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::builder()?
            .add_source(config::Environment::with_prefix("STREAMKEY"))
            .build()
            .context("Error al leer las variables STREAMKEY_*")?
            .try_deserialize()
            .context("Configuración inválida")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("api_base", DEFAULT_API_BASE)?
            .set_default("cookies_file", "cookies.json")?
            .set_default("auth_flow", "mobile")?
            .set_default("login_timeout_secs", 600)?
            .set_default("exchange_delay_secs", 3)?
            .set_default("check_updates", true)?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chrome_binary: None,
            cookies_file: PathBuf::from("cookies.json"),
            config_file: None,
            auth_flow: AuthFlow::Mobile,
            login_timeout_secs: 600,
            exchange_delay_secs: 3,
            check_updates: true,
        }
    }
}
