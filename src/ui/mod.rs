use crate::error::Error;
use crate::session::{SessionController, SessionEvent, SessionState, SearchTicket};
use crate::streamlabs::{Category, MAX_QUERY_CHARS};
use crate::updater::UpdateInfo;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

const LIVE_MONITOR_URL: &str = "https://livecenter.tiktok.com/live_monitor?lang=en-US";
const DONATE_URL: &str = "https://buymeacoffee.com/loukious";

#[derive(Debug, PartialEq)]
enum InputMode {
    Normal,
    Token,
    Title,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Popup {
    None,
    Help,
    Donation,
    Update,
}

pub struct App {
    controller: SessionController,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    input_mode: InputMode,
    popup: Popup,
    input: String,
    suggestions: Vec<Category>,
    suggestions_state: ListState,
    pending_search: Option<SearchTicket>,
    show_key: bool,
    update: Option<UpdateInfo>,
    error_message: Option<String>,
    success_message: Option<String>,
    started: Instant,
    should_quit: bool,
}

impl App {
    pub fn new(
        controller: SessionController,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        update: Option<UpdateInfo>,
    ) -> Self {
        let popup = if update.is_some() {
            Popup::Update
        } else if !controller.config().suppress_donation_reminder {
            Popup::Donation
        } else {
            Popup::None
        };

        Self {
            controller,
            events,
            input_mode: InputMode::Normal,
            popup,
            input: String::new(),
            suggestions: Vec::new(),
            suggestions_state: ListState::default(),
            pending_search: None,
            show_key: false,
            update,
            error_message: None,
            success_message: None,
            started: Instant::now(),
            should_quit: false,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(250);
        let mut last_tick = Instant::now();

        loop {
            self.drain_events();
            terminal.draw(|f| self.ui(f))?;

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if crossterm::event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if self.operation_starts(&key) {
                            // pinta el aviso antes de bloquear (el login puede tardar minutos)
                            terminal.draw(|f| self.ui(f))?;
                        }
                        self.handle_key_event(key).await?;
                    }
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Suggestions { ticket, result } => {
                    if self.pending_search != Some(ticket)
                        || !self.controller.is_current(ticket)
                        || self.input_mode != InputMode::Game
                    {
                        continue;
                    }
                    self.pending_search = None;
                    match result {
                        Ok(categories) => {
                            self.suggestions = categories;
                            self.suggestions_state.select(Some(0));
                        }
                        Err(e) => self.error_message = Some(format!("Error al buscar juegos: {}", e)),
                    }
                }
                SessionEvent::TokenReady => {
                    self.success_message = Some("Token cargado".to_string());
                }
                SessionEvent::AccountInfo(info) => {
                    self.success_message = Some(format!("Cuenta: {} ({})", info.username, info.application_status));
                }
                SessionEvent::SessionStarted(_) => {
                    self.success_message = Some("¡Transmisión iniciada!".to_string());
                }
                SessionEvent::SessionEnded => {
                    self.success_message = Some("Transmisión terminada".to_string());
                }
            }
        }
    }

    fn operation_starts(&mut self, key: &KeyEvent) -> bool {
        if self.input_mode != InputMode::Normal || self.popup != Popup::None {
            return false;
        }
        let message = match key.code {
            KeyCode::Char('w') => "🌐 Inicia sesión en la ventana de Chrome (máx. 10 minutos)...",
            KeyCode::Char('l') => "🔍 Buscando token en Streamlabs Desktop...",
            KeyCode::Char('r') => "🔄 Actualizando cuenta...",
            _ => return false,
        };
        self.error_message = None;
        self.success_message = Some(message.to_string());
        true
    }

    fn report(&mut self, context: &str, error: Error) {
        let hint = if error.is_unauthorized() {
            " (el token parece vencido: vuelve a cargarlo)"
        } else {
            ""
        };
        self.success_message = None;
        self.error_message = Some(format!("{}: {}{}", context, error, hint));
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return Ok(());
        }

        if self.popup != Popup::None {
            self.handle_popup_key_event(key).await;
            return Ok(());
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key_event(key).await,
            InputMode::Token | InputMode::Title => self.handle_text_key_event(key).await,
            InputMode::Game => self.handle_game_key_event(key).await,
        }
        Ok(())
    }

    async fn handle_popup_key_event(&mut self, key: KeyEvent) {
        match (self.popup, key.code) {
            (Popup::Donation, KeyCode::Char('d')) => {
                self.open_url(DONATE_URL);
                self.popup = Popup::None;
            }
            (Popup::Donation, KeyCode::Char('n')) => {
                self.controller.set_suppress_donation_reminder(true);
                if let Err(e) = self.controller.save_config().await {
                    self.report("Error al guardar", e);
                }
                self.popup = Popup::None;
            }
            (Popup::Update, KeyCode::Char('y')) => {
                if let Some(url) = self.update.as_ref().map(|u| u.url.clone()) {
                    self.open_url(&url);
                }
                self.popup = self.after_update_popup();
            }
            (Popup::Update, _) => self.popup = self.after_update_popup(),
            _ => self.popup = Popup::None,
        }
    }

    fn after_update_popup(&self) -> Popup {
        if self.controller.config().suppress_donation_reminder {
            Popup::None
        } else {
            Popup::Donation
        }
    }

    async fn handle_normal_key_event(&mut self, key: KeyEvent) {
        // Limpiar mensajes después de presionar una tecla
        if !matches!(key.code, KeyCode::Char('w' | 'l' | 'r')) {
            self.success_message = None;
            self.error_message = None;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,

            // Token
            KeyCode::Char('t') => {
                self.input_mode = InputMode::Token;
                self.input = self.controller.config().token.clone();
            }
            KeyCode::Char('l') => {
                if let Err(e) = self.controller.load_local_token().await {
                    self.report("No se encontró un token local", e);
                }
            }
            KeyCode::Char('w') => {
                if let Err(e) = self.controller.fetch_online_token().await {
                    self.report("No se pudo obtener el token en línea", e);
                }
            }
            KeyCode::Char('r') => {
                if let Err(e) = self.controller.refresh_account().await {
                    self.report("Error al cargar la cuenta", e);
                }
            }

            // Detalles de la transmisión
            KeyCode::Char('e') => {
                self.input_mode = InputMode::Title;
                self.input = self.controller.config().title.clone();
            }
            KeyCode::Char('g') => {
                self.input_mode = InputMode::Game;
                self.input = self.controller.config().game.clone();
                self.suggestions.clear();
                self.search();
            }
            KeyCode::Char('m') => {
                let mature = !self.controller.config().is_mature();
                self.controller.set_mature(mature);
            }

            // Control
            KeyCode::Enter => self.start_stream().await,
            KeyCode::Char('x') => self.end_stream().await,
            KeyCode::Char('k') => self.show_key = !self.show_key,
            KeyCode::Char('s') => match self.controller.save_config().await {
                Ok(()) => self.success_message = Some("Configuración guardada".to_string()),
                Err(e) => self.report("Error al guardar", e),
            },
            KeyCode::Char('o') => self.open_url(LIVE_MONITOR_URL),
            KeyCode::Char('d') => self.open_url(DONATE_URL),
            KeyCode::Char('h') | KeyCode::Char('?') => self.popup = Popup::Help,
            _ => {}
        }
    }

    async fn handle_text_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.input);
                if self.input_mode == InputMode::Token {
                    match self.controller.set_token(&input) {
                        Ok(()) if self.controller.state() == SessionState::TokenLoaded => {
                            self.input_mode = InputMode::Normal;
                            if let Err(e) = self.controller.refresh_account().await {
                                self.report("Error al cargar la cuenta", e);
                            }
                            return;
                        }
                        Ok(()) => {}
                        Err(e) => self.report("Token inválido", e),
                    }
                } else {
                    self.controller.set_title(&input);
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            _ => {}
        }
    }

    async fn handle_game_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let selected = self
                    .suggestions_state
                    .selected()
                    .and_then(|i| self.suggestions.get(i))
                    .cloned();
                match selected {
                    Some(category) => self.controller.select_category(&category),
                    None => self.controller.set_game(&self.input),
                }
                self.close_game_input();
            }
            KeyCode::Esc => self.close_game_input(),
            KeyCode::Up => self.previous_suggestion(),
            KeyCode::Down => self.next_suggestion(),
            KeyCode::Char(c) => {
                self.input.push(c);
                self.search();
            }
            KeyCode::Backspace => {
                self.input.pop();
                self.search();
            }
            _ => {}
        }
    }

    fn close_game_input(&mut self) {
        self.input.clear();
        self.suggestions.clear();
        self.suggestions_state.select(None);
        self.pending_search = None;
        self.input_mode = InputMode::Normal;
    }

    /// Las sugerencias anteriores ya no corresponden al texto escrito.
    fn search(&mut self) {
        self.suggestions.clear();
        self.suggestions_state.select(None);
        if self.input.trim().is_empty() {
            self.controller.cancel_search();
            self.pending_search = None;
            return;
        }
        match self.controller.spawn_search(&self.input) {
            Ok(ticket) => self.pending_search = Some(ticket),
            Err(e) => self.report("Error al buscar juegos", e),
        }
    }

    fn previous_suggestion(&mut self) {
        if !self.suggestions.is_empty() {
            let i = match self.suggestions_state.selected() {
                Some(0) | None => self.suggestions.len() - 1,
                Some(i) => i - 1,
            };
            self.suggestions_state.select(Some(i));
        }
    }

    fn next_suggestion(&mut self) {
        if !self.suggestions.is_empty() {
            let i = match self.suggestions_state.selected() {
                Some(i) if i + 1 < self.suggestions.len() => i + 1,
                _ => 0,
            };
            self.suggestions_state.select(Some(i));
        }
    }

    async fn start_stream(&mut self) {
        if let Err(e) = self.controller.start_stream().await {
            self.report("Error al iniciar la transmisión", e);
        }
    }

    async fn end_stream(&mut self) {
        if let Err(e) = self.controller.end_stream().await {
            self.report("Error al terminar la transmisión", e);
        }
    }

    fn open_url(&mut self, url: &str) {
        if webbrowser::open(url).is_err() {
            self.error_message = Some(format!("No se pudo abrir el navegador: {}", url));
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Content
                Constraint::Length(3), // Footer
            ])
            .split(f.size());

        self.render_header(f, chunks[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(7), Constraint::Min(0)])
            .split(columns[0]);

        self.render_account(f, left[0]);
        self.render_stream_details(f, left[1]);
        self.render_control(f, columns[1]);
        self.render_footer(f, chunks[2]);

        match self.popup {
            Popup::Help => self.render_help_popup(f),
            Popup::Donation => self.render_donation_popup(f),
            Popup::Update => self.render_update_popup(f),
            Popup::None => {}
        }
        if self.input_mode == InputMode::Token {
            self.render_token_popup(f);
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let (label, color) = match self.controller.state() {
            SessionState::NoToken => ("Sin token", Color::Red),
            SessionState::TokenLoaded => ("Token cargado", Color::Yellow),
            SessionState::AccountReady { can_go_live: true } => ("Listo para transmitir", Color::Green),
            SessionState::AccountReady { can_go_live: false } => ("Sin acceso a LIVE", Color::Red),
            SessionState::Live => ("🔴 EN VIVO", Color::Magenta),
        };

        let header = Paragraph::new(Line::from(vec![
            Span::styled("📡 StreamKey - TikTok LIVE | ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));

        f.render_widget(header, area);
    }

    fn render_account(&self, f: &mut Frame, area: Rect) {
        let token = if self.controller.config().has_token() { "●●●●●●●●" } else { "(vacío)" };
        let (username, status, can_go_live) = match self.controller.account() {
            Some(info) => (info.username.as_str(), info.application_status.as_str(), info.can_be_live.to_string()),
            None => ("-", "-", "-".to_string()),
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("Token:        ", Style::default().fg(Color::Cyan)),
                Span::raw(token),
            ]),
            Line::from(vec![
                Span::styled("Usuario:      ", Style::default().fg(Color::Cyan)),
                Span::styled(username, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            ]),
            Line::from(vec![
                Span::styled("Estado:       ", Style::default().fg(Color::Cyan)),
                Span::raw(status),
            ]),
            Line::from(vec![
                Span::styled("Puede ir LIVE: ", Style::default().fg(Color::Cyan)),
                Span::raw(can_go_live),
            ]),
        ];

        let account = Paragraph::new(lines)
            .block(Block::default().title("Cuenta").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        f.render_widget(account, area);
    }

    fn render_stream_details(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0)])
            .split(area);

        let config = self.controller.config();
        let editing = |mode: InputMode| self.input_mode == mode;

        let title = if editing(InputMode::Title) { self.input.as_str() } else { config.title.as_str() };
        let game = if editing(InputMode::Game) { self.input.as_str() } else { config.game.as_str() };
        let mask = if self.controller.game_mask_id().is_empty() {
            "sin categoría".to_string()
        } else {
            format!("id {}", self.controller.game_mask_id())
        };
        let highlight = |active: bool| {
            if active {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            }
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("Título: ", Style::default().fg(Color::Cyan)),
                Span::styled(title, highlight(editing(InputMode::Title))),
            ]),
            Line::from(vec![
                Span::styled("Juego:  ", Style::default().fg(Color::Cyan)),
                Span::styled(game, highlight(editing(InputMode::Game))),
                Span::styled(format!(" ({})", mask), Style::default().fg(Color::Gray)),
            ]),
            Line::from(vec![
                Span::styled("Contenido para adultos: ", Style::default().fg(Color::Cyan)),
                Span::raw(if config.is_mature() { "sí" } else { "no" }),
            ]),
        ];

        let details = Paragraph::new(lines)
            .block(Block::default().title("Detalles de la transmisión").borders(Borders::ALL));
        f.render_widget(details, chunks[0]);

        if self.input_mode == InputMode::Game {
            let title = if self.pending_search.is_some() {
                "Buscando...".to_string()
            } else {
                format!("Sugerencias (máx. {} caracteres)", MAX_QUERY_CHARS)
            };
            let items: Vec<ListItem> = self
                .suggestions
                .iter()
                .map(|category| ListItem::new(category.full_name.clone()))
                .collect();
            let list = List::new(items)
                .block(Block::default().title(title).borders(Borders::ALL))
                .highlight_style(Style::default().fg(Color::Black).bg(Color::Green))
                .highlight_symbol("► ");
            f.render_stateful_widget(list, chunks[1], &mut self.suggestions_state);
        }
    }

    fn render_control(&self, f: &mut Frame, area: Rect) {
        let mut lines = Vec::new();
        match self.controller.session() {
            Some(session) => {
                let key = if self.show_key {
                    session.stream_key.clone()
                } else {
                    "●".repeat(session.stream_key.chars().count().min(24))
                };
                let elapsed = chrono::Utc::now() - session.started_at;
                lines.push(Line::from(Span::styled("URL del servidor:", Style::default().fg(Color::Cyan))));
                lines.push(Line::from(session.rtmp_url.clone()));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("Clave de transmisión:", Style::default().fg(Color::Cyan))));
                lines.push(Line::from(key));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!(
                        "En vivo desde hace {}:{:02}",
                        elapsed.num_minutes(),
                        elapsed.num_seconds() % 60
                    ),
                    Style::default().fg(Color::Magenta),
                )));
            }
            None => {
                lines.push(Line::from(Span::styled(
                    "Enter: Ir en vivo",
                    Style::default().fg(Color::Gray),
                )));
            }
        }

        let control = Paragraph::new(lines)
            .block(Block::default().title("Control de la transmisión").borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        f.render_widget(control, area);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let footer_text = if let Some(ref error) = self.error_message {
            Line::from(vec![
                Span::styled("❌ Error: ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled(error, Style::default().fg(Color::Red)),
            ])
        } else if let Some(ref success) = self.success_message {
            Line::from(vec![
                Span::styled("✅ ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::styled(success, Style::default().fg(Color::Green)),
            ])
        } else {
            Line::from(vec![
                Span::styled("h: Ayuda | q: Salir", Style::default().fg(Color::Cyan)),
                Span::styled(" | ", Style::default().fg(Color::Gray)),
                Span::styled(
                    format!("Abierto hace {}s", self.started.elapsed().as_secs()),
                    Style::default().fg(Color::Gray),
                ),
            ])
        };

        let footer = Paragraph::new(footer_text)
            .alignment(Alignment::Left)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(footer, area);
    }

    fn render_help_popup(&self, f: &mut Frame) {
        let area = Self::centered_rect(60, 60, f.size());
        f.render_widget(Clear, area);

        let lines = vec![
            Line::from("1. Solicita acceso a LIVE en Streamlabs"),
            Line::from("2. Instala Streamlabs e inicia sesión con TikTok"),
            Line::from("3. Usa esta app para obtener el token de Streamlabs"),
            Line::from("4. ¡Transmite!"),
            Line::from(""),
            Line::from("t: Pegar token | l: Token del PC | w: Token por web | r: Actualizar cuenta"),
            Line::from("e: Título | g: Juego | m: Contenido adulto | s: Guardar"),
            Line::from("Enter: Ir en vivo | x: Terminar | k: Mostrar clave"),
            Line::from("o: Live Monitor | d: Donar | q: Salir"),
        ];

        let help = Paragraph::new(lines)
            .block(Block::default().title("Ayuda").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        f.render_widget(help, area);
    }

    fn render_donation_popup(&self, f: &mut Frame) {
        let area = Self::centered_rect(50, 25, f.size());
        f.render_widget(Clear, area);

        let lines = vec![
            Line::from("¿Te sirve esta app? ¡Considera apoyar su desarrollo!"),
            Line::from(""),
            Line::from(Span::styled(
                "d: Donar | n: No volver a mostrar | otra tecla: Cerrar",
                Style::default().fg(Color::Cyan),
            )),
        ];
        let popup = Paragraph::new(lines)
            .block(Block::default().title("Apoya el desarrollo").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        f.render_widget(popup, area);
    }

    fn render_update_popup(&self, f: &mut Frame) {
        let Some(update) = &self.update else { return };
        let area = Self::centered_rect(50, 25, f.size());
        f.render_widget(Clear, area);

        let lines = vec![
            Line::from(format!("¡La versión {} está disponible!", update.latest)),
            Line::from(format!("Versión actual: {}", update.current)),
            Line::from(""),
            Line::from(Span::styled(
                "y: Descargar | otra tecla: Cerrar",
                Style::default().fg(Color::Cyan),
            )),
        ];
        let popup = Paragraph::new(lines)
            .block(Block::default().title("Actualización disponible").borders(Borders::ALL))
            .wrap(Wrap { trim: true });
        f.render_widget(popup, area);
    }

    fn render_token_popup(&self, f: &mut Frame) {
        let area = Self::centered_rect(60, 20, f.size());
        f.render_widget(Clear, area);

        let (text, color) = if self.input.is_empty() {
            ("Pega el token aquí...".to_string(), Color::Gray)
        } else {
            ("●".repeat(self.input.chars().count().min(64)), Color::White)
        };

        let input = Paragraph::new(text)
            .style(Style::default().fg(color))
            .block(Block::default().title("Token de Streamlabs").borders(Borders::ALL));
        f.render_widget(input, area);
    }

    fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
        let popup_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ])
            .split(r);

        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ])
            .split(popup_layout[1])[1]
    }
}
