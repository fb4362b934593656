//! crossterm rendering of [`Paint`] operations.

use crate::transcript::{Paint, Style, Transcript};

use confab_core::OutputItem;
use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use std::io::{self, IsTerminal, Write};
use tokio::sync::mpsc;

pub struct TerminalRenderer<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn paint(&mut self, paint: &Paint) -> io::Result<()> {
        match paint {
            Paint::Write { text, style } => self.styled(text, *style),
            Paint::Erase { rows, column } => {
                // Rows below the region's first row belong to it entirely.
                for _ in 0..*rows {
                    queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine), MoveUp(1))?;
                }
                let column = u16::try_from(*column).unwrap_or(u16::MAX);
                queue!(self.out, MoveToColumn(column), Clear(ClearType::UntilNewLine))
            }
            Paint::Page(text) => {
                self.styled("──── page ────\n", Style::Dim)?;
                self.styled(text, Style::Plain)?;
                self.styled("──────────────\n", Style::Dim)
            }
            Paint::Prompt { text, password } => {
                self.styled(text, Style::InPrompt)?;
                let note = if *password {
                    "[password requested]\n"
                } else {
                    "[input requested]\n"
                };
                self.styled(note, Style::Dim)
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&mut self, text: &str, style: Style) -> io::Result<()> {
        if !self.color || style == Style::Plain {
            return queue!(self.out, Print(text));
        }

        match style {
            Style::Error => queue!(self.out, SetForegroundColor(Color::Red))?,
            Style::InPrompt => queue!(self.out, SetForegroundColor(Color::Green))?,
            Style::OutPrompt => queue!(self.out, SetForegroundColor(Color::DarkRed))?,
            Style::Dim => queue!(self.out, SetAttribute(Attribute::Dim))?,
            Style::Plain => {}
        }
        queue!(
            self.out,
            Print(text),
            ResetColor,
            SetAttribute(Attribute::Reset)
        )
    }
}

/// Render pieces until the channel closes. Blocks the calling thread.
pub fn render_until_closed<W: Write>(
    items: &mut mpsc::UnboundedReceiver<OutputItem>,
    transcript: &mut Transcript,
    renderer: &mut TerminalRenderer<W>,
) -> io::Result<()> {
    while let Some(item) = items.blocking_recv() {
        for paint in transcript.apply(item) {
            renderer.paint(&paint)?;
        }
        renderer.flush()?;
    }

    for paint in transcript.finish() {
        renderer.paint(&paint)?;
    }
    renderer.flush()
}

/// Styled output only on a real terminal, and never with `NO_COLOR` set.
pub fn use_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Lines per flush cycle for a terminal `rows` tall; one row stays free for
/// the cursor.
pub fn budget_for_height(rows: u16) -> usize {
    usize::from(rows.saturating_sub(1).max(1))
}

/// `None` when stdout is not a terminal; output then flows unbounded.
pub fn terminal_budget() -> Option<usize> {
    if !io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size()
        .ok()
        .map(|(_, rows)| budget_for_height(rows))
}
