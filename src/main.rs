use anyhow::{Context, Result};
use colored::Colorize;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use streamkey::config::Config;
use streamkey::session::{ChannelObserver, SessionController, SessionState};
use streamkey::settings::Settings;
use streamkey::ui::App;
use streamkey::updater;

/// La TUI ocupa la terminal, así que los logs van a un archivo.
fn init_logging() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("streamkey");
    fs::create_dir_all(&dir).with_context(|| format!("No se pudo crear {}", dir.display()))?;

    let path = dir.join("streamkey.log");
    let file = File::create(&path).with_context(|| format!("No se pudo crear {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", "📡 StreamKey - Clave de transmisión para TikTok LIVE 📡".bright_green().bold());

    let log_path = init_logging()?;
    let settings = Settings::load()?;

    let config_path = match settings.config_file.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path).await;
    tracing::info!(config = %config_path.display(), "starting");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut controller = SessionController::new(
        settings.clone(),
        config,
        config_path,
        Arc::new(ChannelObserver::new(tx)),
    );

    if controller.state() == SessionState::TokenLoaded {
        println!("{}", "🔐 Cargando información de la cuenta...".yellow());
        if let Err(e) = controller.refresh_account().await {
            println!("{} {}", "⚠️  No se pudo cargar la cuenta:".yellow(), e);
        }
    }

    let update = if settings.check_updates {
        updater::check_update().await
    } else {
        None
    };

    let mut app = App::new(controller, rx, update);
    let result = app.run().await;

    if app.controller().state() == SessionState::Live {
        println!(
            "{}",
            "⚠️  La transmisión sigue activa en TikTok. Vuelve a abrir la app o termínala desde Live Monitor.".yellow()
        );
    }

    if let Err(ref e) = result {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        eprintln!("   Log: {}", log_path.display());
    }

    result
}
