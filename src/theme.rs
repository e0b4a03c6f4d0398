//! Chrome styling for the tab bar, hint line, and exit summary.

use anstyle::{AnsiColor, Color, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn from_env() -> Self {
        match std::env::var("MANIFOLD_COLOR").ok().as_deref() {
            Some("always") => OutputMode::Always,
            Some("never") => OutputMode::Never,
            _ => OutputMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub accent: Style,
    pub muted: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan)))
                .bold(),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
            success: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Green)))
                .bold(),
            warning: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow)))
                .bold(),
            error: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Red)))
                .bold(),
        }
    }
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

pub fn styled(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_resolution_honors_no_color_and_tty() {
        // One test body: NO_COLOR is process-global state.
        std::env::remove_var("NO_COLOR");
        assert!(resolve_color_enabled(OutputMode::Auto, true));
        assert!(!resolve_color_enabled(OutputMode::Auto, false));
        assert!(!resolve_color_enabled(OutputMode::Never, true));
        std::env::set_var("NO_COLOR", "1");
        assert!(!resolve_color_enabled(OutputMode::Always, true));
        std::env::remove_var("NO_COLOR");
    }

    #[test]
    fn styled_wraps_text_with_reset() {
        let out = styled(Theme::default().accent, "web");
        assert!(out.contains("web"));
        assert!(out.ends_with("\u{1b}[0m"));
    }
}
