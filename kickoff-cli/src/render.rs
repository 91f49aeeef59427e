use tokio::sync::watch;

use kickoff_core::i18n::LanguageData;
use kickoff_core::model::Viewport;
use kickoff_core::selector::ScreenDescriptor;
use kickoff_core::view::{self, AppInfo, RenderError, Renderer, ScreenView};

/// Publishes composed views to a terminal pane
pub struct PaneRenderer {
    app: AppInfo,
    texts: LanguageData,
    view_tx: watch::Sender<Option<ScreenView>>,
}

impl PaneRenderer {
    pub fn new(app: AppInfo, texts: LanguageData) -> (Self, watch::Receiver<Option<ScreenView>>) {
        let (view_tx, view_rx) = watch::channel(None);
        (Self { app, texts, view_tx }, view_rx)
    }
}

impl Renderer for PaneRenderer {
    fn render(&mut self, screen: &ScreenDescriptor, _viewport: Viewport) -> Result<(), RenderError> {
        if self.view_tx.is_closed() {
            return Err(RenderError::Closed);
        }
        let view = view::compose(screen, &self.app, &self.texts);
        self.view_tx.send_replace(Some(view));
        Ok(())
    }
}

/// Writes screen changes to the log, for headless clients
pub struct LogRenderer {
    client: String,
    app: AppInfo,
    texts: LanguageData,
    last: Option<ScreenView>,
}

impl LogRenderer {
    pub fn new(client: impl Into<String>, app: AppInfo, texts: LanguageData) -> Self {
        Self {
            client: client.into(),
            app,
            texts,
            last: None,
        }
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, screen: &ScreenDescriptor, viewport: Viewport) -> Result<(), RenderError> {
        let view = view::compose(screen, &self.app, &self.texts);

        // identical frames are not worth a log line
        if self.last.as_ref() == Some(&view) {
            return Ok(());
        }

        tracing::info!(
            client = %self.client,
            screen = view.kind.label(),
            width = viewport.width,
            height = viewport.height,
            "{}",
            view.lines.join(" | ")
        );
        if view.awaiting_gesture {
            tracing::info!(client = %self.client, "waiting for a user gesture");
        }

        self.last = Some(view);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kickoff_core::i18n::Languages;
    use kickoff_core::model::{PluginKind, PluginStatus};
    use kickoff_core::plugin::PluginInfo;
    use kickoff_core::selector::ScreenKind;

    fn texts() -> LanguageData {
        Languages::builtin().unwrap().current().unwrap().clone()
    }

    #[test]
    fn test_pane_renderer_publishes_view() {
        let (mut renderer, rx) = PaneRenderer::new(AppInfo::default(), texts());
        let mut sync = PluginInfo::new("sync", PluginKind::Sync);
        sync.status = PluginStatus::Started;

        let screen = ScreenDescriptor::Default {
            pending: vec![sync],
            viewport: Viewport::new(40, 12),
        };
        renderer.render(&screen, Viewport::new(40, 12)).unwrap();

        let view = rx.borrow().clone().unwrap();
        assert_eq!(view.kind, ScreenKind::Default);
        assert_eq!(view.lines, vec!["Syncing"]);
    }

    #[test]
    fn test_pane_renderer_closed() {
        let (mut renderer, rx) = PaneRenderer::new(AppInfo::default(), texts());
        drop(rx);
        let screen = ScreenDescriptor::Default {
            pending: vec![],
            viewport: Viewport::default(),
        };
        assert!(matches!(
            renderer.render(&screen, Viewport::default()),
            Err(RenderError::Closed)
        ));
    }
}
