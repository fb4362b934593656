//! Turns emitted output pieces into terminal paint operations.
//!
//! The transcript remembers how far back the most recent clearable stream
//! region reaches, so a clear can erase exactly that region with cursor
//! movement. Any non-clearable output closes the region: once something
//! else is printed below it, it can no longer be erased in place. A region
//! that opens partway through a line only owns that line from its starting
//! column, so text printed before it on the same row survives a clear.

use confab_core::item::{OutputItem, StreamSource, strip_ansi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Error,
    InPrompt,
    OutPrompt,
    Dim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paint {
    Write { text: String, style: Style },
    /// Erase back to `column` on the row `rows` lines above the cursor.
    /// Every row below that one is erased completely.
    Erase { rows: usize, column: usize },
    Page(String),
    Prompt { text: String, password: bool },
}

#[derive(Debug, Default)]
pub struct Transcript {
    color: bool,
    region_open: bool,
    /// Newlines printed since the clearable region began.
    region_rows: usize,
    /// Cursor column when the clearable region began.
    region_column: usize,
    /// Cursor column after everything painted so far.
    column: usize,
    /// Banner links, printed once the banner text is complete.
    pending_links: Vec<(String, String)>,
}

impl Transcript {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    pub fn has_clearable_region(&self) -> bool {
        self.region_open
    }

    pub fn apply(&mut self, item: OutputItem) -> Vec<Paint> {
        let mut out = Vec::new();

        let banner_continues = matches!(item, OutputItem::Banner { continuation: true, .. });
        if !banner_continues {
            self.flush_links(&mut out);
        }

        match item {
            OutputItem::ClearOutput { .. } => {
                if self.region_open {
                    let erase = Paint::Erase {
                        rows: self.region_rows,
                        column: self.region_column,
                    };
                    self.push(&mut out, erase);
                }
                self.close_region();
            }

            OutputItem::Stream {
                text,
                source,
                clearable,
                ansi,
                ..
            } => {
                let text = self.prepare(text, ansi);
                if clearable {
                    if !self.region_open {
                        self.region_open = true;
                        self.region_column = self.column;
                    }
                    self.region_rows += text.matches('\n').count();
                } else {
                    self.close_region();
                }
                let style = match source {
                    StreamSource::Stdout => Style::Plain,
                    StreamSource::Stderr => Style::Error,
                };
                self.push(&mut out, Paint::Write { text, style });
            }

            OutputItem::Input {
                text,
                execution_count,
                continuation,
            } => {
                self.close_region();
                if !continuation {
                    self.push(&mut out, Paint::Write {
                        text: format!("In [{}]: ", execution_count),
                        style: Style::InPrompt,
                    });
                }
                self.push(&mut out, Paint::Write {
                    text: terminated(text),
                    style: Style::Plain,
                });
            }

            OutputItem::Result {
                text,
                execution_count,
                continuation,
            } => {
                self.close_region();
                if !continuation {
                    self.push(&mut out, Paint::Write {
                        text: format!("Out[{}]: ", execution_count),
                        style: Style::OutPrompt,
                    });
                }
                self.push(&mut out, Paint::Write {
                    text: terminated(self.prepare(text, true)),
                    style: Style::Plain,
                });
            }

            OutputItem::Banner {
                text,
                help_links,
                continuation,
            } => {
                self.close_region();
                if !continuation {
                    self.pending_links = help_links;
                }
                self.push(&mut out, Paint::Write {
                    text: self.prepare(text, true),
                    style: Style::Plain,
                });
            }

            OutputItem::PageDoc { text, .. } => {
                self.close_region();
                self.push(&mut out, Paint::Page(terminated(self.prepare(text, true))));
            }

            OutputItem::InputRequest { prompt, password } => {
                self.close_region();
                self.push(&mut out, Paint::Prompt {
                    text: prompt,
                    password,
                });
            }
        }

        out
    }

    /// Paint anything still held back at the end of a session.
    pub fn finish(&mut self) -> Vec<Paint> {
        let mut out = Vec::new();
        self.flush_links(&mut out);
        out
    }

    fn flush_links(&mut self, out: &mut Vec<Paint>) {
        for (label, url) in std::mem::take(&mut self.pending_links) {
            let link = Paint::Write {
                text: format!("{}: {}\n", label, url),
                style: Style::Dim,
            };
            self.push(out, link);
        }
    }

    fn push(&mut self, out: &mut Vec<Paint>, paint: Paint) {
        self.column = match &paint {
            Paint::Write { text, .. } => advance(self.column, text),
            Paint::Erase { column, .. } => *column,
            // Both end on a fresh line.
            Paint::Page(_) | Paint::Prompt { .. } => 0,
        };
        out.push(paint);
    }

    fn prepare(&self, text: String, ansi: bool) -> String {
        if ansi && !self.color {
            strip_ansi(&text)
        } else {
            text
        }
    }

    fn close_region(&mut self) {
        self.region_open = false;
        self.region_rows = 0;
        self.region_column = 0;
    }
}

/// Cursor column after printing `text` starting at `column`.
fn advance(column: usize, text: &str) -> usize {
    let plain = strip_ansi(text);
    let (start, last_row) = match plain.rfind(['\n', '\r']) {
        Some(idx) => (0, &plain[idx + 1..]),
        None => (column, plain.as_str()),
    };
    start + last_row.chars().count()
}

fn terminated(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
