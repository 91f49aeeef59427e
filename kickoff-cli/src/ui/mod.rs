//! In-process mode: every client gets a pane of the terminal
//!
//! A reload requested by any client reloads the whole page: all clients are
//! stopped and a fresh set is launched.

pub mod theme;

pub use theme::styles;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::{
    event::{
        self, DisableFocusChange, EnableFocusChange, Event as CEvent, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use tokio::sync::{Mutex, mpsc, watch};

use kickoff_core::model::Viewport;
use kickoff_core::orchestrator::{
    Bootstrap, BootstrapError, ClientHandle, Container, Orchestrator, OrchestratorOptions,
    StartAllControl,
};
use kickoff_core::qos::{ReloadReason, Visibility};
use kickoff_core::registry::PluginRegistry;
use kickoff_core::view::ScreenView;

use crate::client::{ClientSettings, DemoClient};
use crate::error::AppError;
use crate::render::PaneRenderer;

type ReloadRequest = (usize, ReloadReason);

// ============================================================================
// Terminal setup/teardown
// ============================================================================

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ============================================================================
// Panes
// ============================================================================

struct Pane {
    client: DemoClient,
    view: watch::Receiver<Option<ScreenView>>,
}

/// Starts a [`DemoClient`] per container, painting into a pane
pub struct PaneBootstrap {
    settings: ClientSettings,
    panes: Mutex<Vec<Pane>>,
    reloads: mpsc::UnboundedSender<ReloadRequest>,
}

impl PaneBootstrap {
    fn new(settings: ClientSettings, reloads: mpsc::UnboundedSender<ReloadRequest>) -> Self {
        Self {
            settings,
            panes: Mutex::new(Vec::new()),
            reloads,
        }
    }

    fn into_panes(self) -> Vec<Pane> {
        self.panes.into_inner()
    }
}

#[async_trait]
impl Bootstrap for PaneBootstrap {
    async fn bootstrap(&self, container: Container) -> Result<ClientHandle, BootstrapError> {
        let (renderer, view) =
            PaneRenderer::new(self.settings.app.clone(), self.settings.texts.clone());

        let index = container.index;
        let reloads = self.reloads.clone();
        let reload = move |reason: ReloadReason| {
            let _ = reloads.send((index, reason));
        };

        let client = DemoClient::start(&container, &self.settings, renderer, reload)?;
        let handle = client.handle().clone();
        self.panes.lock().await.push(Pane { client, view });
        Ok(handle)
    }
}

/// One launch of all clients
struct Session {
    orchestrator: Orchestrator,
    panes: Vec<Pane>,
    reloads: mpsc::UnboundedReceiver<ReloadRequest>,
}

impl Session {
    async fn launch(settings: &ClientSettings, count: usize, area: Rect) -> Result<Self, AppError> {
        let mut options = OrchestratorOptions::new(count);
        if let Some(first) = grid(panes_area(area), count).first() {
            options.viewport = pane_viewport(*first);
        }

        let (reload_tx, reloads) = mpsc::unbounded_channel();
        let bootstrap = PaneBootstrap::new(settings.clone(), reload_tx);
        let mut orchestrator = Orchestrator::create(options)?;
        orchestrator.launch(&bootstrap).await?;

        let session = Self {
            orchestrator,
            panes: bootstrap.into_panes(),
            reloads,
        };
        session.resize(area);
        Ok(session)
    }

    fn resize(&self, area: Rect) {
        let cells = grid(panes_area(area), self.panes.len());
        for (pane, cell) in self.panes.iter().zip(cells) {
            pane.client.resize(pane_viewport(cell));
        }
    }

    async fn shutdown(mut self) {
        for pane in self.panes.drain(..) {
            pane.client.stop().await;
        }
        self.orchestrator.dispose();
    }

    /// Enter on a pane: the start-all control when shown, else the pane's own gesture
    fn activate(&self, focus: usize) {
        if self.orchestrator.start_all_state() == StartAllControl::Armed {
            if let Err(err) = self.orchestrator.start_all() {
                tracing::warn!(error = %err, "start-all failed");
            }
            return;
        }

        let Some(pane) = self.panes.get(focus) else {
            return;
        };
        let target = pane
            .view
            .borrow()
            .clone()
            .and_then(|view| view.gesture_target);
        if let Some(target) = target {
            if let Err(err) = pane.client.registry().activate(&target) {
                tracing::warn!(client = pane.client.index(), plugin = %target, error = %err, "gesture not delivered");
            }
        }
    }

    fn hide_all(&self) {
        for pane in &self.panes {
            pane.client.set_visibility(Visibility::Hidden);
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

fn panes_area(area: Rect) -> Rect {
    Rect {
        height: area.height.saturating_sub(1),
        ..area
    }
}

fn footer_area(area: Rect) -> Rect {
    Rect {
        y: area.y + area.height.saturating_sub(1),
        height: area.height.min(1),
        ..area
    }
}

/// Split `area` into a near-square grid of `count` cells, row by row
fn grid(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);

    let row_rects = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, rows as u32); rows])
        .split(area);

    let mut cells = Vec::with_capacity(count);
    for row in row_rects.iter() {
        let col_rects = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, cols as u32); cols])
            .split(*row);
        for col in col_rects.iter() {
            if cells.len() == count {
                break;
            }
            cells.push(*col);
        }
    }
    cells
}

/// Inner size of a bordered pane
fn pane_viewport(cell: Rect) -> Viewport {
    Viewport::new(cell.width.saturating_sub(2), cell.height.saturating_sub(2))
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

// ============================================================================
// Drawing
// ============================================================================

fn pane_lines(view: Option<&ScreenView>, ready: bool, ready_text: &str) -> Vec<Line<'static>> {
    if ready {
        return vec![Line::from(Span::styled(ready_text.to_string(), styles::ready()))];
    }
    let Some(view) = view else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    if !view.title.is_empty() {
        lines.push(Line::from(Span::styled(view.title.clone(), styles::title())));
    }
    if !view.subtitle.is_empty() {
        lines.push(Line::from(Span::styled(view.subtitle.clone(), styles::text_dim())));
    }
    lines.push(Line::default());

    let body = if view.blink {
        styles::blink()
    } else {
        styles::screen(view.kind)
    };
    for text in &view.lines {
        lines.push(Line::from(Span::styled(text.clone(), body)));
    }

    if view.awaiting_gesture {
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled("enter", styles::key_hint()),
            Span::styled(" to continue", styles::text_muted()),
        ]));
    }
    lines
}

fn draw(f: &mut Frame, session: &Session, settings: &ClientSettings, focus: usize) {
    let area = f.area();
    let cells = grid(panes_area(area), session.panes.len());

    for (i, (pane, cell)) in session.panes.iter().zip(cells).enumerate() {
        let view = pane.view.borrow().clone();
        let ready = pane.client.registry().is_ready();

        let icon = view
            .as_ref()
            .map(|v| styles::screen_icon(v.kind))
            .unwrap_or(" ");
        let mut title = format!(" {} client {} ", icon, pane.client.index());
        if pane.client.visibility() == Visibility::Hidden {
            title.push_str("(hidden) ");
        }
        let border = if i == focus {
            styles::border_focused()
        } else {
            styles::border_subtle()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(Span::styled(title, styles::text()));

        let lines = pane_lines(view.as_ref(), ready, &settings.texts.common.ready);
        let paragraph = Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, cell);
    }

    if session.orchestrator.start_all_state() == StartAllControl::Armed {
        let label = settings.texts.common.start_all.clone();
        let rect = centered_rect(area, label.chars().count() as u16 + 8, 3);
        f.render_widget(Clear, rect);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(styles::border_focused())
            .style(styles::overlay());
        f.render_widget(
            Paragraph::new(Line::from(label))
                .block(block)
                .alignment(Alignment::Center)
                .style(styles::overlay()),
            rect,
        );
    }

    let hints = vec![
        Span::styled(" enter", styles::key_hint()),
        Span::styled(" start", styles::text_dim()),
        Span::styled("  tab", styles::key_hint()),
        Span::styled(" focus", styles::text_dim()),
        Span::styled("  h", styles::key_hint()),
        Span::styled(" hide", styles::text_dim()),
        Span::styled("  x", styles::key_hint()),
        Span::styled(" drop connection", styles::text_dim()),
        Span::styled("  e", styles::key_hint()),
        Span::styled(" socket error", styles::text_dim()),
        Span::styled("  q", styles::key_hint()),
        Span::styled(" quit", styles::text_dim()),
    ];
    f.render_widget(Paragraph::new(Line::from(hints)), footer_area(area));
}

// ============================================================================
// Main loop
// ============================================================================

pub async fn run(settings: ClientSettings, count: usize) -> Result<(), AppError> {
    let mut terminal = setup_terminal()?;
    let result = tui_loop(&mut terminal, &settings, count).await;
    restore_terminal(terminal)?;
    result
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    settings: &ClientSettings,
    count: usize,
) -> Result<(), AppError> {
    let size = terminal.size()?;
    let mut area = Rect::new(0, 0, size.width, size.height);
    let mut session = Session::launch(settings, count, area).await?;
    let mut focus = 0usize;

    loop {
        if let Ok((index, reason)) = session.reloads.try_recv() {
            tracing::info!(client = index, reason = %reason, "reloading all clients");
            session.shutdown().await;
            session = Session::launch(settings, count, area).await?;
        }

        terminal.draw(|f| draw(f, &session, settings, focus))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        let (code, modifiers) = match event::read()? {
            CEvent::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => (code, modifiers),
            CEvent::FocusLost => {
                session.hide_all();
                continue;
            }
            CEvent::Resize(width, height) => {
                area = Rect::new(0, 0, width, height);
                session.resize(area);
                continue;
            }
            _ => continue,
        };

        let panes = session.panes.len().max(1);
        match (code, modifiers) {
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => break,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => break,
            (KeyCode::Enter, _) | (KeyCode::Char(' '), _) => session.activate(focus),
            (KeyCode::Tab, _) | (KeyCode::Right, _) | (KeyCode::Down, _) => {
                focus = (focus + 1) % panes;
            }
            (KeyCode::BackTab, _) | (KeyCode::Left, _) | (KeyCode::Up, _) => {
                focus = (focus + panes - 1) % panes;
            }
            (KeyCode::Char('h'), _) => {
                if let Some(pane) = session.panes.get(focus) {
                    pane.client.set_visibility(Visibility::Hidden);
                }
            }
            (KeyCode::Char('x'), _) => {
                if let Some(pane) = session.panes.get(focus) {
                    pane.client.connection().close();
                }
            }
            (KeyCode::Char('e'), _) => {
                if let Some(pane) = session.panes.get(focus) {
                    pane.client.connection().fail("injected from the terminal");
                }
            }
            _ => {}
        }
    }

    session.shutdown().await;
    Ok(())
}
