//! Line-oriented terminal rendering
//!
//! The terminal is not redrawn: streamed text only ever grows, so each partial
//! rendering prints just the part not yet on screen. Status lines (the
//! "Thinking for Ns" indicator) are rewritten in place with a carriage return.

use std::io::{self, Write};

use chrono::Local;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};

use mark_core::{DisplaySink, DisplayStyle, NotifyLevel, ResponseMetadata};

/// Cursor glyph appended by the orchestrator to partial renderings
const STREAM_CURSOR: char = '▌';

// ============================================================================
// Themes
// ============================================================================

const fn rgb(hex: u32) -> Color {
    Color::Rgb {
        r: ((hex >> 16) & 0xff) as u8,
        g: ((hex >> 8) & 0xff) as u8,
        b: (hex & 0xff) as u8,
    }
}

/// Colour palette for one theme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    /// Theme name as stored in configuration
    pub name: &'static str,
    /// Banner and prompt
    pub primary: Color,
    /// Success notices
    pub success: Color,
    /// Warnings
    pub warning: Color,
    /// Errors
    pub error: Color,
    /// Informational notices
    pub info: Color,
    /// Status lines and timestamps
    pub muted: Color,
    /// Assistant header
    pub ai: Color,
    /// Kleos pipeline output
    pub kleos: Color,
}

impl Theme {
    /// Look a theme up by name; unknown names give `red`
    #[must_use]
    pub fn named(name: &str) -> Self {
        match name {
            "hl3" => Self::palette("hl3", [0xf8_9b1c, 0xa2_ad91, 0xfd_ec6e, 0x9c_1216, 0xff_ffff, 0x80_8080, 0xfa_7132]),
            "matrix" => Self::palette("matrix", [0x00_ff41, 0xd1_ffd1, 0xf5_9e0b, 0xff_0000, 0x00_ff41, 0x00_8f11, 0x00_8f11]),
            "cyberpunk" => Self::palette("cyberpunk", [0xfc_ee0a, 0x00_ebff, 0xf3_e600, 0xf6_1e44, 0x00_ebff, 0x02_d7f2, 0xff_003c]),
            "synthwave" => Self::palette("synthwave", [0xff_7edb, 0x03_edf9, 0xff_8b39, 0xfe_4450, 0x03_edf9, 0xb8_93ff, 0xb8_93ff]),
            "dracula" => Self::palette("dracula", [0xbd_93f9, 0x50_fa7b, 0xf1_fa8c, 0xff_5555, 0x8b_e9fd, 0x62_72a4, 0xbd_93f9]),
            "nord" => Self::palette("nord", [0x88_c0d0, 0xa3_be8c, 0xeb_cb8b, 0xbf_616a, 0xd8_dee9, 0x4c_566a, 0x88_c0d0]),
            "monokai" => Self::palette("monokai", [0xf9_2672, 0xa6_e22e, 0xe6_db74, 0xf9_2672, 0x66_d9ef, 0x75_715e, 0xf9_2672]),
            _ => Self::palette("red", [0xe1_1d48, 0x22_c55e, 0xf5_9e0b, 0x9f_1239, 0xfb_7185, 0x6b_7280, 0xe1_1d48]),
        }
    }

    /// `[primary, success, warning, error, info, muted, ai]`
    const fn palette(name: &'static str, c: [u32; 7]) -> Self {
        Self {
            name,
            primary: rgb(c[0]),
            success: rgb(c[1]),
            warning: rgb(c[2]),
            error: rgb(c[3]),
            info: rgb(c[4]),
            muted: rgb(c[5]),
            ai: rgb(c[6]),
            kleos: rgb(0xfd_e047),
        }
    }

    fn level(&self, level: NotifyLevel) -> (Color, &'static str) {
        match level {
            NotifyLevel::Info => (self.info, "ℹ"),
            NotifyLevel::Success => (self.success, "✓"),
            NotifyLevel::Warning => (self.warning, "⚠"),
            NotifyLevel::Error => (self.error, "✗"),
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Display sink writing to a terminal (or any writer)
pub struct TerminalSink<W: Write + Send> {
    out: W,
    theme: Theme,
    /// A response is being rendered
    streaming: bool,
    /// Bytes of the current response already printed
    shown: usize,
    /// The last line is a status line to be overwritten
    status_line: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    /// Create a sink
    pub fn new(out: W, theme: Theme) -> Self {
        Self {
            out,
            theme,
            streaming: false,
            shown: 0,
            status_line: false,
        }
    }

    /// Active theme
    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Switch theme
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    /// Clear the screen and home the cursor
    ///
    /// # Errors
    ///
    /// Returns an error when the terminal cannot be written.
    pub fn clear_screen(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        self.out.flush()
    }

    /// Startup banner
    ///
    /// # Errors
    ///
    /// Returns an error when the terminal cannot be written.
    pub fn banner(&mut self, provider: Option<(&str, &str)>) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(self.theme.primary),
            SetAttribute(Attribute::Bold),
            Print("MARK"),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(self.theme.muted),
        )?;
        match provider {
            Some((name, model)) => queue!(self.out, Print(format!("  {name} · {model}\n")))?,
            None => queue!(self.out, Print("  no model selected\n"))?,
        }
        queue!(
            self.out,
            Print("Type /help for commands, Ctrl+C to stop a response.\n\n"),
            ResetColor
        )?;
        self.out.flush()
    }

    /// Print the input prompt
    ///
    /// # Errors
    ///
    /// Returns an error when the terminal cannot be written.
    pub fn prompt(&mut self, text: &str) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(self.theme.primary),
            Print(text),
            ResetColor
        )?;
        self.out.flush()
    }

    fn begin(&mut self, meta: &ResponseMetadata) -> io::Result<()> {
        self.streaming = true;
        self.shown = 0;
        let time = meta.timestamp.format("%H:%M");
        match meta.style {
            DisplayStyle::Pipeline => queue!(
                self.out,
                SetForegroundColor(self.theme.kleos),
                Print(format!("\n◆ {}\n", meta.model)),
                ResetColor
            ),
            _ => queue!(
                self.out,
                Print("\n"),
                SetForegroundColor(self.theme.ai),
                SetAttribute(Attribute::Bold),
                Print("MARK"),
                SetAttribute(Attribute::Reset),
                SetForegroundColor(self.theme.muted),
                Print(format!(" · {} · {time}\n", meta.model)),
                ResetColor
            ),
        }
    }

    fn clear_status(&mut self) -> io::Result<()> {
        if self.status_line {
            queue!(self.out, Print("\r"), Clear(ClearType::CurrentLine))?;
            self.status_line = false;
        }
        Ok(())
    }

    /// Print whatever part of `body` is not on screen yet
    fn print_new(&mut self, body: &str) -> io::Result<()> {
        let fresh = body.get(self.shown..).unwrap_or(body);
        queue!(self.out, Print(fresh))?;
        self.shown = body.len();
        Ok(())
    }

    fn partial(&mut self, text: &str, meta: &ResponseMetadata) -> io::Result<()> {
        if !self.streaming {
            self.begin(meta)?;
        }
        self.clear_status()?;
        self.print_new(text.strip_suffix(STREAM_CURSOR).unwrap_or(text))?;
        self.out.flush()
    }

    fn status(&mut self, status: &str, meta: &ResponseMetadata) -> io::Result<()> {
        if !self.streaming {
            self.begin(meta)?;
        }
        queue!(
            self.out,
            Print("\r"),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(self.theme.muted),
            Print(status),
            ResetColor
        )?;
        self.status_line = true;
        self.out.flush()
    }

    fn finish(&mut self, text: &str, meta: &ResponseMetadata) -> io::Result<()> {
        if !self.streaming {
            self.begin(meta)?;
        }
        self.clear_status()?;
        self.print_new(text)?;
        queue!(self.out, Print("\n"))?;
        self.streaming = false;
        self.shown = 0;
        self.out.flush()
    }

    fn system(&mut self, text: &str, level: NotifyLevel) -> io::Result<()> {
        let (color, icon) = self.theme.level(level);
        queue!(
            self.out,
            SetForegroundColor(color),
            Print(format!("{icon} {text}\n")),
            ResetColor
        )?;
        self.out.flush()
    }

    /// Rendering failures never interrupt the conversation
    fn report(result: io::Result<()>) {
        if let Err(e) = result {
            tracing::debug!(error = %e, "Terminal write failed");
        }
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn show_partial(&mut self, text: &str, meta: &ResponseMetadata) {
        Self::report(self.partial(text, meta));
    }

    fn show_final(&mut self, text: &str, meta: &ResponseMetadata) {
        Self::report(self.finish(text, meta));
    }

    fn show_status(&mut self, status: &str, meta: &ResponseMetadata) {
        Self::report(self.status(status, meta));
    }

    fn show_system(&mut self, text: &str, level: NotifyLevel) {
        Self::report(self.system(text, level));
    }
}

/// Local time shown next to the prompt
#[must_use]
pub fn clock() -> String {
    Local::now().format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(sink: &TerminalSink<Vec<u8>>) -> String {
        String::from_utf8_lossy(&sink.out).into_owned()
    }

    #[test]
    fn test_partials_print_only_new_text() {
        let meta = ResponseMetadata::assistant("mock-model");
        let mut sink = TerminalSink::new(Vec::new(), Theme::named("red"));

        sink.show_partial("Hel▌", &meta);
        sink.show_partial("Hello▌", &meta);
        sink.show_partial("Hello▌", &meta);
        sink.show_final("Hello", &meta);

        let out = rendered(&sink);
        assert_eq!(out.matches("Hel").count(), 1);
        assert_eq!(out.matches("lo").count(), 1);
        assert!(!out.contains(STREAM_CURSOR));
        assert!(out.contains("mock-model"));
        assert!(out.ends_with("Hello\n") || out.ends_with("lo\n"));
    }

    #[test]
    fn test_final_appends_stop_marker() {
        let meta = ResponseMetadata::assistant("m");
        let mut sink = TerminalSink::new(Vec::new(), Theme::named("nord"));

        sink.show_partial("Hel▌", &meta);
        sink.show_final("Hel\n\n*[Response stopped]*", &meta);

        let out = rendered(&sink);
        assert_eq!(out.matches("Hel").count(), 1);
        assert!(out.ends_with("\n\n*[Response stopped]*\n"));
    }

    #[test]
    fn test_next_response_starts_fresh() {
        let meta = ResponseMetadata::assistant("m");
        let mut sink = TerminalSink::new(Vec::new(), Theme::named("red"));

        sink.show_final("first", &meta);
        sink.show_partial("second▌", &meta);
        sink.show_final("second", &meta);

        let out = rendered(&sink);
        assert!(out.contains("first\n"));
        assert!(out.contains("second\n"));
    }

    #[test]
    fn test_status_line_is_replaced_by_answer() {
        let meta = ResponseMetadata::assistant("m");
        let mut sink = TerminalSink::new(Vec::new(), Theme::named("red"));

        sink.show_status("⠋ Thinking for 0s", &meta);
        assert!(sink.status_line);
        sink.show_final("Answer", &meta);

        assert!(!sink.status_line);
        assert!(rendered(&sink).ends_with("Answer\n"));
    }

    #[test]
    fn test_unknown_theme_falls_back_to_red() {
        assert_eq!(Theme::named("neon").name, "red");
        assert_eq!(Theme::named("dracula").name, "dracula");
        for name in mark_core::config::THEMES {
            assert_eq!(Theme::named(name).name, name);
        }
    }

    #[test]
    fn test_system_notice_has_icon() {
        let mut sink = TerminalSink::new(Vec::new(), Theme::named("red"));
        sink.show_system("Session reset.", NotifyLevel::Success);
        assert!(rendered(&sink).contains("✓ Session reset.\n"));
    }
}
