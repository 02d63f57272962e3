//! Orquesta token → cuenta → transmisión y guarda las preferencias.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::{BrowserSession, TokenAcquirer};
use crate::config::Config;
use crate::credentials::CredentialLocator;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::streamlabs::{AccountInfo, Category, StreamSession, StreamlabsClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoToken,
    TokenLoaded,
    AccountReady { can_go_live: bool },
    Live,
}

/// Identifica una búsqueda; solo la más reciente es válida.
pub type SearchTicket = u64;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    TokenReady,
    AccountInfo(AccountInfo),
    SessionStarted(StreamSession),
    SessionEnded,
    Suggestions {
        ticket: SearchTicket,
        result: std::result::Result<Vec<Category>, String>,
    },
}

pub trait SessionObserver: Send + Sync {
    fn on_token_ready(&self) {}
    fn on_account_info(&self, _info: &AccountInfo) {}
    fn on_session_started(&self, _session: &StreamSession) {}
    fn on_session_ended(&self) {}
    fn on_suggestions(
        &self,
        _ticket: SearchTicket,
        _result: std::result::Result<Vec<Category>, String>,
    ) {
    }
}

/// Reenvía cada notificación como `SessionEvent` por un canal.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: SessionEvent) {
        // el receptor ya no existe al cerrar la UI
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_token_ready(&self) {
        self.send(SessionEvent::TokenReady);
    }

    fn on_account_info(&self, info: &AccountInfo) {
        self.send(SessionEvent::AccountInfo(info.clone()));
    }

    fn on_session_started(&self, session: &StreamSession) {
        self.send(SessionEvent::SessionStarted(session.clone()));
    }

    fn on_session_ended(&self) {
        self.send(SessionEvent::SessionEnded);
    }

    fn on_suggestions(
        &self,
        ticket: SearchTicket,
        result: std::result::Result<Vec<Category>, String>,
    ) {
        self.send(SessionEvent::Suggestions { ticket, result });
    }
}

pub struct SessionController {
    settings: Settings,
    config: Config,
    config_path: PathBuf,
    state: SessionState,
    client: Option<StreamlabsClient>,
    account: Option<AccountInfo>,
    session: Option<StreamSession>,
    game_mask_id: String,
    search_seq: Arc<AtomicU64>,
    observer: Arc<dyn SessionObserver>,
}

impl SessionController {
    pub fn new(
        settings: Settings,
        config: Config,
        config_path: PathBuf,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let mut controller = Self {
            settings,
            config,
            config_path,
            state: SessionState::NoToken,
            client: None,
            account: None,
            session: None,
            game_mask_id: String::new(),
            search_seq: Arc::new(AtomicU64::new(0)),
            observer,
        };

        if controller.config.has_token() {
            let token = controller.config.token.clone();
            match controller.client_for(&token) {
                Ok(client) => {
                    controller.client = Some(client);
                    controller.state = SessionState::TokenLoaded;
                }
                Err(e) => warn!(error = %e, "saved token is unusable"),
            }
        }

        controller
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn account(&self) -> Option<&AccountInfo> {
        self.account.as_ref()
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn game_mask_id(&self) -> &str {
        &self.game_mask_id
    }

    fn client_for(&self, token: &str) -> Result<StreamlabsClient> {
        StreamlabsClient::with_base_url(token, &self.settings.api_base)
    }

    fn client(&self) -> Result<&StreamlabsClient> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::InvalidState("Primero carga un token".into()))
    }

    fn ensure_not_live(&self) -> Result<()> {
        if self.state == SessionState::Live {
            return Err(Error::InvalidState(
                "Termina la transmisión antes de cambiar el token".into(),
            ));
        }
        Ok(())
    }

    /// Token pegado a mano o recuperado; uno vacío vuelve a `NoToken`.
    pub fn set_token(&mut self, token: &str) -> Result<()> {
        self.ensure_not_live()?;
        let token = token.trim();

        if token.is_empty() {
            self.config.token.clear();
            self.client = None;
            self.account = None;
            self.state = SessionState::NoToken;
            return Ok(());
        }

        let client = self.client_for(token)?;
        self.config.token = token.to_string();
        self.client = Some(client);
        self.account = None;
        self.state = SessionState::TokenLoaded;
        self.observer.on_token_ready();
        Ok(())
    }

    pub async fn load_local_token(&mut self) -> Result<AccountInfo> {
        self.ensure_not_live()?;
        let token = tokio::task::spawn_blocking(|| {
            CredentialLocator::for_current_platform()?.find_token()
        })
        .await
        .map_err(|e| Error::InvalidState(e.to_string()))??;

        info!("token loaded from local storage");
        self.set_token(&token)?;
        self.refresh_account().await
    }

    pub async fn fetch_online_token(&mut self) -> Result<AccountInfo> {
        self.ensure_not_live()?;
        let token = TokenAcquirer::new(&self.settings)?.acquire().await?;
        self.accept_online_token(&token).await
    }

    pub async fn fetch_online_token_with<B: BrowserSession>(&mut self, browser: B) -> Result<AccountInfo> {
        self.ensure_not_live()?;
        let token = TokenAcquirer::new(&self.settings)?.acquire_with(browser).await?;
        self.accept_online_token(&token).await
    }

    async fn accept_online_token(&mut self, token: &str) -> Result<AccountInfo> {
        info!("token obtained through browser login");
        self.set_token(token)?;
        self.refresh_account().await
    }

    pub async fn refresh_account(&mut self) -> Result<AccountInfo> {
        let info = self.client()?.get_info().await?;

        if self.state != SessionState::Live {
            self.state = SessionState::AccountReady {
                can_go_live: info.can_be_live,
            };
        }
        self.account = Some(info.clone());
        self.observer.on_account_info(&info);

        if let Err(e) = self.resolve_game_mask().await {
            warn!(error = %e, "could not resolve game category");
        }
        if let Err(e) = self.save_config().await {
            warn!(error = %e, "could not save config");
        }

        Ok(info)
    }

    /// Busca el juego guardado y toma el id solo si el nombre coincide exacto.
    pub async fn resolve_game_mask(&mut self) -> Result<()> {
        let game = self.config.game.clone();
        if game.trim().is_empty() {
            self.game_mask_id.clear();
            return Ok(());
        }

        let categories = self.client()?.search(&game).await?;
        self.game_mask_id = categories
            .into_iter()
            .find(|c| c.full_name == game)
            .map(|c| c.game_mask_id)
            .unwrap_or_default();
        Ok(())
    }

    pub fn set_title(&mut self, title: &str) {
        self.config.title = title.to_string();
    }

    /// Texto libre: hasta elegir una categoría no hay id.
    pub fn set_game(&mut self, game: &str) {
        self.config.game = game.to_string();
        self.game_mask_id.clear();
    }

    pub fn select_category(&mut self, category: &Category) {
        self.config.game = category.full_name.clone();
        self.game_mask_id = category.game_mask_id.clone();
    }

    pub fn set_mature(&mut self, mature: bool) {
        self.config.set_mature(mature);
    }

    pub fn set_suppress_donation_reminder(&mut self, suppress: bool) {
        self.config.suppress_donation_reminder = suppress;
    }

    /// Busca en segundo plano; el resultado llega por `on_suggestions`.
    pub fn spawn_search(&self, query: &str) -> Result<SearchTicket> {
        let client = self.client()?.clone();
        let ticket = self.search_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let observer = Arc::clone(&self.observer);
        let query = query.to_string();

        tokio::spawn(async move {
            let result = client.search(&query).await.map_err(|e| e.to_string());
            observer.on_suggestions(ticket, result);
        });

        Ok(ticket)
    }

    /// Invalida la búsqueda en curso sin lanzar otra.
    pub fn cancel_search(&self) {
        self.search_seq.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        self.search_seq.load(Ordering::SeqCst) == ticket
    }

    pub async fn start_stream(&mut self) -> Result<StreamSession> {
        match self.state {
            SessionState::AccountReady { can_go_live: true } => {}
            SessionState::Live => {
                return Err(Error::InvalidState("Ya hay una transmisión en vivo".into()))
            }
            SessionState::AccountReady { can_go_live: false } => {
                return Err(Error::InvalidState(
                    "La cuenta todavía no puede transmitir en vivo".into(),
                ))
            }
            SessionState::NoToken | SessionState::TokenLoaded => {
                return Err(Error::InvalidState(
                    "Carga la información de la cuenta antes de transmitir".into(),
                ))
            }
        }

        let session = self
            .client()?
            .start(&self.config.title, &self.game_mask_id, &self.config.audience_type)
            .await?;

        self.session = Some(session.clone());
        self.state = SessionState::Live;
        self.observer.on_session_started(&session);
        Ok(session)
    }

    pub async fn end_stream(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        self.client()?.end(session).await?;

        self.session = None;
        self.state = SessionState::AccountReady {
            can_go_live: self.account.as_ref().map_or(true, |a| a.can_be_live),
        };
        self.observer.on_session_ended();
        Ok(())
    }

    pub async fn save_config(&self) -> Result<()> {
        self.config
            .save(&self.config_path)
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}
