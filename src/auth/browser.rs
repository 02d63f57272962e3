use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, RequestId, Response,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};

use crate::error::{Error, Result};

const CHROME_ARGS: [&str; 5] = [
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--ignore-certificate-errors",
    "--disable-web-security",
    "--allow-running-insecure-content",
];

/// Cookie tal como la exporta el navegador (`cookies.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    #[serde(rename = "httpOnly")]
    pub http_only: Option<bool>,
}

pub fn load_cookies(path: &Path) -> Vec<BrowserCookie> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(cookies) => cookies,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid cookies file");
            Vec::new()
        }
    }
}

/// Qué petición del navegador indica que el login terminó.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectMatcher {
    /// Respuesta JSON cuyo cuerpo trae `redirect_url`
    ResponseBody { url_prefix: String },
    /// Redirección (cabecera `Location` o URL pedida) que lleva `param` en la query
    RedirectQuery { url_prefix: String, param: String },
}

impl RedirectMatcher {
    pub fn matches_redirect(&self, url: &str) -> bool {
        match self {
            Self::RedirectQuery { url_prefix, param } => {
                url.starts_with(url_prefix.as_str()) && query_param(url, param).is_some()
            }
            Self::ResponseBody { .. } => false,
        }
    }

    pub fn matches_response(&self, url: &str) -> bool {
        match self {
            Self::ResponseBody { url_prefix } => url.starts_with(url_prefix.as_str()),
            Self::RedirectQuery { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectCapture {
    ResponseBody(String),
    Location(String),
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Lo mínimo que el flujo de login necesita de un navegador.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn inject_cookies(&mut self, cookies: &[BrowserCookie]) -> Result<()>;
    async fn wait_for_redirect(
        &mut self,
        matcher: &RedirectMatcher,
        timeout: Duration,
    ) -> Result<RedirectCapture>;
    async fn close(&mut self) -> Result<()>;
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    responses: EventStream<EventResponseReceived>,
    finished: EventStream<EventLoadingFinished>,
    requests: EventStream<EventRequestWillBeSent>,
}

impl ChromeSession {
    pub async fn launch(binary: Option<&Path>) -> Result<Self> {
        let mut builder = BrowserConfig::builder().with_head().viewport(None).args(CHROME_ARGS);
        if let Some(binary) = binary {
            builder = builder.chrome_executable(binary);
        }
        let config = builder.build().map_err(Error::BrowserLaunchFailed)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::BrowserLaunchFailed(e.to_string()))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        match Self::open_page(&browser).await {
            Ok((page, responses, finished, requests)) => {
                info!("browser launched");
                Ok(Self {
                    browser,
                    handler,
                    page,
                    responses,
                    finished,
                    requests,
                })
            }
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                Err(e)
            }
        }
    }

    async fn open_page(
        browser: &Browser,
    ) -> Result<(
        Page,
        EventStream<EventResponseReceived>,
        EventStream<EventLoadingFinished>,
        EventStream<EventRequestWillBeSent>,
    )> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::BrowserLaunchFailed(e.to_string()))?;

        // Escuchar antes de navegar para no perder la redirección
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| Error::BrowserLaunchFailed(e.to_string()))?;
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| Error::BrowserLaunchFailed(e.to_string()))?;
        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| Error::BrowserLaunchFailed(e.to_string()))?;

        Ok((page, responses, finished, requests))
    }
}

fn location_header(response: &Response) -> Option<String> {
    response
        .headers
        .inner()
        .as_object()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("location"))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string)
}

async fn response_body(page: &Page, request_id: &str) -> Result<String> {
    let body = page
        .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
        .await
        .map_err(|e| Error::MalformedResponse(e.to_string()))?
        .result;

    if body.base64_encoded {
        let bytes = Base64
            .decode(body.body.as_bytes())
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(body.body)
    }
}

fn browser_failure(action: &str, e: impl std::fmt::Display) -> Error {
    Error::Browser(format!("{}: {}", action, e))
}

impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| browser_failure("navegación fallida", e))?;
        Ok(())
    }

    async fn inject_cookies(&mut self, cookies: &[BrowserCookie]) -> Result<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                builder = builder.domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            if let Some(secure) = cookie.secure {
                builder = builder.secure(secure);
            }
            if let Some(http_only) = cookie.http_only {
                builder = builder.http_only(http_only);
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!(cookie = %cookie.name, error = %e, "skipping cookie"),
            }
        }

        debug!(count = params.len(), "injecting cookies");
        self.page
            .set_cookies(params)
            .await
            .map_err(|e| browser_failure("no se pudieron cargar las cookies", e))?;
        Ok(())
    }

    async fn wait_for_redirect(
        &mut self,
        matcher: &RedirectMatcher,
        timeout: Duration,
    ) -> Result<RedirectCapture> {
        let Self {
            page,
            responses,
            finished,
            requests,
            ..
        } = self;

        let wait = async {
            let mut pending: HashSet<String> = HashSet::new();
            loop {
                tokio::select! {
                    Some(event) = responses.next() => {
                        if matcher.matches_response(&event.response.url) {
                            debug!(url = %event.response.url, "auth response seen");
                            pending.insert(event.request_id.inner().clone());
                        }
                    }
                    Some(event) = finished.next() => {
                        let id = event.request_id.inner();
                        if pending.remove(id) {
                            return response_body(page, id).await.map(RedirectCapture::ResponseBody);
                        }
                    }
                    Some(event) = requests.next() => {
                        if let Some(location) = event.redirect_response.as_ref().and_then(location_header) {
                            if matcher.matches_redirect(&location) {
                                return Ok(RedirectCapture::Location(location));
                            }
                        }
                        if matcher.matches_redirect(&event.request.url) {
                            return Ok(RedirectCapture::Location(event.request.url.clone()));
                        }
                    }
                    else => {
                        return Err(Error::NotFound("el navegador se cerró antes de completar el login".into()));
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))?
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map_err(|e| Error::InvalidState(format!("error al cerrar el navegador: {}", e)))?;
        info!("browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_matcher_needs_prefix_and_param() {
        let matcher = RedirectMatcher::RedirectQuery {
            url_prefix: "https://streamlabs.com/tiktok/auth".into(),
            param: "code".into(),
        };
        assert!(matcher.matches_redirect("https://streamlabs.com/tiktok/auth?code=abc&state="));
        assert!(!matcher.matches_redirect("https://streamlabs.com/tiktok/auth?state=x"));
        assert!(!matcher.matches_redirect("https://streamlabs.com/tiktok/auth?code="));
        assert!(!matcher.matches_redirect("https://example.com/tiktok/auth?code=abc"));
        assert!(!matcher.matches_response("https://streamlabs.com/tiktok/auth?code=abc"));
    }

    #[test]
    fn code_challenge_is_not_a_code() {
        let url = "https://streamlabs.com/m/login?tiktok&code_challenge=xyz";
        assert_eq!(query_param(url, "code"), None);
        assert_eq!(query_param(url, "code_challenge").as_deref(), Some("xyz"));
    }

    #[test]
    fn cookies_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cookies(&dir.path().join("cookies.json")).is_empty());

        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[{"name":"sid","value":"1","domain":".tiktok.com","httpOnly":true,"expiry":1}]"#,
        )
        .unwrap();
        let cookies = load_cookies(&path);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].http_only, Some(true));
        assert_eq!(cookies[0].path, None);
    }

    #[test]
    fn page_failures_are_browser_errors() {
        let err = browser_failure("navegación fallida", "net::ERR_NAME_NOT_RESOLVED");
        assert!(matches!(&err, Error::Browser(msg) if msg.contains("ERR_NAME_NOT_RESOLVED")));
        assert!(!err.is_unauthorized());
    }
}
