//! Login interactivo con TikTok a través de Streamlabs.
//!
//! Se abre un Chrome controlado, el usuario inicia sesión, se intercepta la
//! redirección con el código de autorización y se canjea (junto con el
//! `code_verifier` PKCE) por el token de Streamlabs.

pub mod browser;
pub mod pkce;

pub use browser::{BrowserCookie, BrowserSession, ChromeSession, RedirectCapture, RedirectMatcher};
pub use pkce::Pkce;

use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::settings::Settings;

/// La primera carga establece el contexto de TikTok antes de poner cookies.
pub const BASELINE_URL: &str = "https://www.tiktok.com";
pub const TIKTOK_AUTH_RESPONSE: &str = "https://www.tiktok.com/passport/open/web/auth/v2/";
pub const REDIRECT_URI: &str = "https://streamlabs.com/tiktok/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthFlow {
    /// Login móvil: el código viene en el cuerpo de la respuesta de TikTok
    Mobile,
    /// Login de Streamlabs Desktop: el código viene en la redirección
    Desktop,
}

impl AuthFlow {
    pub fn login_url(&self, code_challenge: &str) -> String {
        match self {
            Self::Mobile => format!(
                "https://streamlabs.com/m/login?force_verify=1&external=mobile&skip_splash=1&tiktok&code_challenge={}",
                code_challenge
            ),
            Self::Desktop => format!(
                "https://streamlabs.com/slobs/login?skip_splash=true&external=electron&tiktok&force_verify&origin=slobs&code_challenge={}",
                code_challenge
            ),
        }
    }

    pub fn exchange_path(&self) -> &'static str {
        match self {
            Self::Mobile => "/api/v5/auth/data",
            Self::Desktop => "/api/v5/slobs/auth/data",
        }
    }

    pub fn matcher(&self) -> RedirectMatcher {
        match self {
            Self::Mobile => RedirectMatcher::ResponseBody {
                url_prefix: TIKTOK_AUTH_RESPONSE.to_string(),
            },
            Self::Desktop => RedirectMatcher::RedirectQuery {
                url_prefix: REDIRECT_URI.to_string(),
                param: "code".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ExchangeData>,
}

#[derive(Debug, Deserialize)]
struct ExchangeData {
    oauth_token: Option<String>,
}

pub struct TokenAcquirer {
    client: Client,
    api_base: String,
    flow: AuthFlow,
    cookies_file: PathBuf,
    chrome_binary: Option<PathBuf>,
    timeout: Duration,
    exchange_delay: Duration,
}

impl TokenAcquirer {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            flow: settings.auth_flow,
            cookies_file: settings.cookies_file.clone(),
            chrome_binary: settings.chrome_binary.clone(),
            timeout: Duration::from_secs(settings.login_timeout_secs),
            exchange_delay: Duration::from_secs(settings.exchange_delay_secs),
        })
    }

    pub async fn acquire(&self) -> Result<String> {
        let browser = ChromeSession::launch(self.chrome_binary.as_deref()).await?;
        self.acquire_with(browser).await
    }

    /// El navegador se cierra siempre antes de devolver, haya código o no.
    pub async fn acquire_with<B: BrowserSession>(&self, mut browser: B) -> Result<String> {
        let pkce = Pkce::generate();

        let captured = self.drive(&mut browser, &pkce).await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "error closing browser");
        }

        let code = self.extract_code(captured?).await?;
        info!("authorization code received");

        tokio::time::sleep(self.exchange_delay).await;
        self.exchange(&code, &pkce.verifier).await
    }

    async fn drive<B: BrowserSession>(&self, browser: &mut B, pkce: &Pkce) -> Result<RedirectCapture> {
        browser.navigate(BASELINE_URL).await?;

        let cookies = browser::load_cookies(&self.cookies_file);
        if !cookies.is_empty() {
            browser.inject_cookies(&cookies).await?;
        }

        browser.navigate(&self.flow.login_url(&pkce.challenge)).await?;
        info!(timeout = self.timeout.as_secs(), "waiting for login in browser");

        let matcher = self.flow.matcher();
        tokio::time::timeout(self.timeout, browser.wait_for_redirect(&matcher, self.timeout))
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))?
    }

    async fn extract_code(&self, captured: RedirectCapture) -> Result<String> {
        let redirect_url = match captured {
            RedirectCapture::Location(url) => url,
            RedirectCapture::ResponseBody(body) => {
                let data: serde_json::Value = serde_json::from_str(&body)?;
                let url = data
                    .get("redirect_url")
                    .or_else(|| data.get("data").and_then(|d| d.get("redirect_url")))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::NotFound("redirect_url en la respuesta de TikTok".into()))?
                    .to_string();
                self.visit(&url).await;
                url
            }
        };

        browser::query_param(&redirect_url, "code")
            .ok_or_else(|| Error::NotFound("código de autorización".into()))
    }

    /// Streamlabs espera que se siga la redirección antes del canje.
    async fn visit(&self, url: &str) {
        match self.client.get(url).send().await {
            Ok(resp) => debug!(status = %resp.status(), "followed redirect"),
            Err(e) => warn!(error = %e, "could not follow redirect"),
        }
    }

    async fn exchange(&self, code: &str, verifier: &str) -> Result<String> {
        let url = format!("{}{}", self.api_base, self.flow.exchange_path());
        let response = self
            .client
            .get(&url)
            .query(&[("code_verifier", verifier), ("code", code)])
            .send()
            .await
            .map_err(|e| Error::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ExchangeFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::ExchangeFailed(format!("HTTP {}", status.as_u16())));
        }

        let parsed: ExchangeResponse = serde_json::from_str(&body)?;
        if !parsed.success {
            return Err(Error::ExchangeFailed("success = false".into()));
        }

        parsed
            .data
            .and_then(|d| d.oauth_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::MalformedResponse("falta data.oauth_token".into()))
    }
}
