use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const RELEASES_URL: &str =
    "https://api.github.com/repos/Loukious/StreamlabsTikTokStreamKeyGenerator/releases/latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub current: String,
    pub latest: String,
    pub url: String,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
}

pub async fn check_update() -> Option<UpdateInfo> {
    check_update_at(RELEASES_URL, env!("CARGO_PKG_VERSION")).await
}

/// Cualquier error (red, JSON, versión rara) cuenta como "sin actualización".
pub async fn check_update_at(url: &str, current: &str) -> Option<UpdateInfo> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .ok()?;

    let release: Release = match client.get(url).send().await {
        Ok(resp) => resp.json().await.ok()?,
        Err(e) => {
            debug!(error = %e, "update check failed");
            return None;
        }
    };

    let latest = release.tag_name.trim_start_matches('v').to_string();
    if !is_newer(&latest, current) {
        return None;
    }

    Some(UpdateInfo {
        current: current.to_string(),
        latest,
        url: release.html_url,
        notes: release.body.unwrap_or_default(),
    })
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim_start_matches('v')
        .split(|c: char| c == '-' || c == '+')
        .next()?
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}

pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(mut latest), Some(mut current)) => {
            let len = latest.len().max(current.len());
            latest.resize(len, 0);
            current.resize(len, 0);
            latest > current
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_numerically() {
        assert!(is_newer("1.10.0", "1.9.3"));
        assert!(is_newer("v2.0", "1.99.99"));
        assert!(is_newer("1.0.1", "1.0"));
        assert!(!is_newer("1.0", "1.0.0"));
        assert!(!is_newer("0.9", "1.0.0"));
        assert!(!is_newer("1.2.0-beta", "1.2.0"));
    }

    #[test]
    fn garbage_is_never_newer() {
        assert!(!is_newer("latest", "1.0.0"));
        assert!(!is_newer("1.0.0", "dev"));
    }
}
