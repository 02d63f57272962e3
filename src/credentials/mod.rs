//! Recupera un token de Streamlabs ya emitido leyendo el almacenamiento local
//! (leveldb) de Streamlabs Desktop.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const TOKEN_PATTERN: &str = r#"(?i)"apiToken":"([a-f0-9]+)""#;
const STORAGE_SUBDIR: [&str; 3] = ["slobs-client", "Local Storage", "leveldb"];

#[derive(Debug, Default)]
pub struct ScanReport {
    pub token: Option<String>,
    pub scanned: usize,
    pub unreadable: Vec<(PathBuf, String)>,
}

pub struct CredentialLocator {
    dir: PathBuf,
    pattern: Regex,
}

impl CredentialLocator {
    pub fn for_current_platform() -> Result<Self> {
        Self::for_platform(std::env::consts::OS)
    }

    /// Solo Windows (`%APPDATA%`) y macOS (`~/Library/Application Support`).
    pub fn for_platform(os: &str) -> Result<Self> {
        let base = match os {
            "windows" => std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .or_else(dirs::config_dir),
            "macos" => dirs::home_dir().map(|home| home.join("Library").join("Application Support")),
            other => return Err(Error::UnsupportedPlatform(other.to_string())),
        };

        let base = base.ok_or_else(|| Error::NotFound("directorio de datos de la aplicación".into()))?;
        Self::with_dir(STORAGE_SUBDIR.iter().fold(base, |path, part| path.join(part)))
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let pattern = Regex::new(TOKEN_PATTERN).map_err(|e| Error::InvalidState(e.to_string()))?;
        Ok(Self {
            dir: dir.into(),
            pattern,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn find_token(&self) -> Result<String> {
        let report = self.scan()?;
        self.token_from(report)
    }

    fn token_from(&self, report: ScanReport) -> Result<String> {
        match report.token {
            Some(token) => Ok(token),
            None => Err(Error::NotFound(format!(
                "no se encontró ningún apiToken en {} ({} archivos revisados, {} ilegibles). \
                 Asegúrate de tener Streamlabs instalado y la sesión iniciada con TikTok",
                self.dir.display(),
                report.scanned,
                report.unreadable.len(),
            ))),
        }
    }

    pub fn scan(&self) -> Result<ScanReport> {
        let files = self.log_files_newest_first()?;
        debug!(dir = %self.dir.display(), files = files.len(), "scanning local storage");
        Ok(self.scan_files(&files))
    }

    /// Devuelve el último token del primer archivo (en el orden dado) que tenga alguno.
    pub fn scan_files(&self, files: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport::default();

        for file in files {
            report.scanned += 1;
            let bytes = match fs::read(file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "could not read storage file");
                    report.unreadable.push((file.clone(), e.to_string()));
                    continue;
                }
            };

            let content = String::from_utf8_lossy(&bytes);
            if let Some(token) = self.last_token_in(&content) {
                info!(file = %file.display(), "found api token in local storage");
                report.token = Some(token);
                break;
            }
        }

        report
    }

    pub fn last_token_in(&self, content: &str) -> Option<String> {
        self.pattern
            .captures_iter(content)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn log_files_newest_first(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "log"))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        files.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }
}
