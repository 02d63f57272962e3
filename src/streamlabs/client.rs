use super::models::{AccountInfo, Category, EndResponse, InfoResponse, StartResponse, StreamSession};
use crate::error::{Error, Result};
use crate::settings::DEFAULT_API_BASE;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::Form;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Con más de 25 caracteres la API responde 500.
pub const MAX_QUERY_CHARS: usize = 25;
pub const DEVICE_PLATFORM: &str = "win32";
const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) StreamlabsDesktop/1.17.0 Chrome/122.0.6261.156 Electron/29.3.1 Safari/537.36";

#[derive(Clone)]
pub struct StreamlabsClient {
    client: Client,
    base_url: String,
}

impl StreamlabsClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| Error::InvalidState("El token contiene caracteres inválidos".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DESKTOP_USER_AGENT));
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: format!("{}/api/v5/slobs/tiktok", base_url.trim_end_matches('/')),
        })
    }

    /// Recorta la búsqueda a los primeros 25 caracteres (no bytes).
    pub fn clip_query(query: &str) -> &str {
        match query.char_indices().nth(MAX_QUERY_CHARS) {
            Some((idx, _)) => &query[..idx],
            None => query,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Category>> {
        if query.trim().is_empty() {
            return Ok(vec![Category::other()]);
        }

        let query = Self::clip_query(query);
        let response = self
            .client
            .get(&format!("{}/info?category={}", self.base_url, urlencoding::encode(query)))
            .send()
            .await?;

        let info: InfoResponse = read_json(response).await?;
        let mut categories = info.categories;
        debug!(query, results = categories.len(), "category search");
        categories.push(Category::other());
        Ok(categories)
    }

    pub async fn start(
        &self,
        title: &str,
        category_mask_id: &str,
        audience_type: &str,
    ) -> Result<StreamSession> {
        let form = Form::new()
            .text("title", title.to_string())
            .text("device_platform", DEVICE_PLATFORM)
            .text("category", category_mask_id.to_string())
            .text("audience_type", audience_type.to_string());

        let response = self
            .client
            .post(&format!("{}/stream/start", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let started: StartResponse = read_json(response).await?;
        let id = match started.id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        match (id, started.rtmp, started.key) {
            (Some(id), Some(rtmp_url), Some(stream_key)) => {
                info!(session = %id, "stream started");
                Ok(StreamSession {
                    id,
                    rtmp_url,
                    stream_key,
                    started_at: chrono::Utc::now(),
                })
            }
            _ => {
                warn!("start response is missing id/rtmp/key");
                Err(Error::MalformedResponse(
                    "la respuesta de inicio no trae id, rtmp y key".into(),
                ))
            }
        }
    }

    pub async fn end(&self, session: &StreamSession) -> Result<()> {
        let response = self
            .client
            .post(&format!("{}/stream/{}/end", self.base_url, session.id))
            .send()
            .await?;

        let ended: EndResponse = read_json(response).await?;
        if ended.success {
            info!(session = %session.id, "stream ended");
            Ok(())
        } else {
            Err(Error::remote(None, "no se pudo terminar la transmisión"))
        }
    }

    pub async fn get_info(&self) -> Result<AccountInfo> {
        let response = self
            .client
            .get(&format!("{}/info", self.base_url))
            .send()
            .await?;

        let info: InfoResponse = read_json(response).await?;
        Ok(info.into())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message: String = body.chars().take(200).collect();
        return Err(Error::remote(Some(status.as_u16()), message));
    }

    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_queries() {
        assert_eq!(StreamlabsClient::clip_query("Minecraft"), "Minecraft");
        let exact = "a".repeat(MAX_QUERY_CHARS);
        assert_eq!(StreamlabsClient::clip_query(&exact), exact);
    }

    #[test]
    fn clip_counts_chars_not_bytes() {
        let long = "ñ".repeat(30);
        let clipped = StreamlabsClient::clip_query(&long);
        assert_eq!(clipped.chars().count(), MAX_QUERY_CHARS);
    }

    #[tokio::test]
    async fn blank_query_skips_the_network() {
        // Puerto cerrado: cualquier petición fallaría
        let client = StreamlabsClient::with_base_url("t", "http://127.0.0.1:9").unwrap();
        for query in ["", "   "] {
            assert_eq!(client.search(query).await.unwrap(), vec![Category::other()]);
        }
    }

    #[test]
    fn rejects_tokens_that_cannot_be_headers() {
        assert!(StreamlabsClient::with_base_url("bad\ntoken", "http://localhost").is_err());
    }
}
