//! UI Theme Module - color palette and style helpers for the client panes
//!
//! - Palette tokens (not hard-coded colors)
//! - StyleKit helpers for screen kinds and plugin states
//! - VS Code-esque dark theme defaults

use ratatui::style::{Color, Modifier, Style};

use kickoff_core::selector::ScreenKind;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (tertiary info, disabled)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    /// Success state (ready)
    pub success: Color,
    /// Warning state (in progress)
    pub warn: Color,
    /// Error state (errored)
    pub error: Color,
    /// Overlay background of the start-all control
    pub overlay_bg: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    /// VS Code-esque dark theme
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),  // Light blue
            success: Color::Rgb(78, 201, 176), // Teal green
            warn: Color::Rgb(220, 180, 100),   // Amber
            error: Color::Rgb(244, 135, 113),  // Coral red
            overlay_bg: Color::Rgb(45, 45, 45),
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

/// Theme configuration
#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    // ========== StyleKit Helper Functions ==========

    /// Style for the body of a screen
    pub fn screen_style(&self, kind: ScreenKind) -> Style {
        let color = match kind {
            ScreenKind::Platform | ScreenKind::Position => self.palette.accent,
            ScreenKind::Default => self.palette.warn,
            ScreenKind::Errored => self.palette.error,
        };
        Style::default().fg(color)
    }

    /// Icon shown in a pane title
    pub fn screen_icon(&self, kind: ScreenKind) -> &'static str {
        match kind {
            ScreenKind::Platform => "◐",
            ScreenKind::Position => "⌖",
            ScreenKind::Default => "…",
            ScreenKind::Errored => "✗",
        }
    }

    pub fn ready_style(&self) -> Style {
        Style::default()
            .fg(self.palette.success)
            .add_modifier(Modifier::BOLD)
    }

    /// Blinking call to action
    pub fn blink_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK)
    }

    pub fn overlay_style(&self) -> Style {
        Style::default()
            .bg(self.palette.overlay_bg)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn subtle_border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    pub fn focused_border_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Convenience re-exports for common use cases
pub mod styles {
    use super::*;

    pub fn screen(kind: ScreenKind) -> Style {
        theme().screen_style(kind)
    }

    pub fn screen_icon(kind: ScreenKind) -> &'static str {
        theme().screen_icon(kind)
    }

    pub fn ready() -> Style {
        theme().ready_style()
    }

    pub fn blink() -> Style {
        theme().blink_style()
    }

    pub fn overlay() -> Style {
        theme().overlay_style()
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border_subtle() -> Style {
        theme().subtle_border_style()
    }

    pub fn border_focused() -> Style {
        theme().focused_border_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn title() -> Style {
        theme().title_style()
    }
}
