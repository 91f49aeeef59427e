//! View composition and the renderer contract
//!
//! [`compose`] turns a [`ScreenDescriptor`] into a flat text view model that
//! any front end can paint. The core hands descriptors to a [`Renderer`] and
//! never looks at what it paints.

use serde::{Deserialize, Serialize};

use crate::i18n::LanguageData;
use crate::messages::{self, PlatformProgress};
use crate::model::{PluginId, Viewport};
use crate::plugin::PlatformState;
use crate::selector::{ScreenDescriptor, ScreenKind};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render target is closed")]
    Closed,
    #[error("render failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Paints screens into a container
pub trait Renderer: Send {
    fn render(&mut self, screen: &ScreenDescriptor, viewport: Viewport) -> Result<(), RenderError>;
}

impl<F> Renderer for F
where
    F: FnMut(&ScreenDescriptor, Viewport) -> Result<(), RenderError> + Send,
{
    fn render(&mut self, screen: &ScreenDescriptor, viewport: Viewport) -> Result<(), RenderError> {
        self(screen, viewport)
    }
}

/// Application name and author, shown as screen title and subtitle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
}

/// Text view model of one screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenView {
    pub kind: ScreenKind,
    pub title: String,
    pub subtitle: String,
    pub lines: Vec<String>,
    pub blink: bool,
    pub awaiting_gesture: bool,
    /// Plugin a gesture on this screen is forwarded to
    pub gesture_target: Option<PluginId>,
}

impl ScreenView {
    fn new(kind: ScreenKind, app: &AppInfo) -> Self {
        Self {
            kind,
            title: app.name.clone(),
            subtitle: app.author.clone(),
            lines: Vec::new(),
            blink: false,
            awaiting_gesture: false,
            gesture_target: None,
        }
    }
}

fn format_range((min, max): (f64, f64)) -> String {
    format!("{min}..{max}")
}

pub fn compose(screen: &ScreenDescriptor, app: &AppInfo, texts: &LanguageData) -> ScreenView {
    match screen {
        ScreenDescriptor::Platform { plugin, .. } => {
            let mut view = ScreenView::new(ScreenKind::Platform, app);
            let empty = PlatformState::new();
            let state = plugin.platform_state().unwrap_or(&empty);

            if let Some(PlatformProgress {
                message,
                blink,
                awaiting_gesture,
            }) = messages::platform_progress(state, texts)
            {
                view.lines.push(message);
                view.blink = blink;
                view.awaiting_gesture = awaiting_gesture;
                if awaiting_gesture {
                    view.gesture_target = Some(plugin.id.clone());
                }
            }
            view
        }
        ScreenDescriptor::Position { plugin, viewport } => {
            let mut view = ScreenView::new(ScreenKind::Position, app);
            view.title = texts.position.prompt.clone();
            view.subtitle = app.name.clone();

            let options = plugin.position_options().cloned().unwrap_or_default();
            view.lines.push(format!(
                "x {}  y {}",
                format_range(options.x_range),
                format_range(options.y_range)
            ));
            if let Some(image) = options.background_image {
                view.lines.push(image);
            }
            view.lines.push(format!("{}x{}", viewport.width, viewport.height));
            view.lines.push(format!("[ {} ]", texts.position.send));
            view
        }
        ScreenDescriptor::Default { pending, .. } => {
            let mut view = ScreenView::new(ScreenKind::Default, app);
            view.lines = pending
                .iter()
                .map(|plugin| messages::pending_message(plugin, texts))
                .collect();
            view
        }
        ScreenDescriptor::Errored { plugin, .. } => {
            let mut view = ScreenView::new(ScreenKind::Errored, app);
            let error = messages::error_message(plugin, texts);
            view.lines = vec![error.message, error.description];
            view
        }
    }
}
