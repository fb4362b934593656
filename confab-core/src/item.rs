//! Output items: the units that flow from the router to the presentation layer.
//!
//! Text-bearing items can be split at line boundaries so the flush loop can
//! hand the UI bounded slices of a large burst. Control-like items are
//! atomic: they are emitted whole or not at all.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static ANSI_REGEX: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    /// Kernel stream names; anything unrecognised is treated as stdout.
    pub fn from_name(name: &str) -> Self {
        match name {
            "stderr" => StreamSource::Stderr,
            _ => StreamSource::Stdout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputItem {
    /// Erase the most recent clearable stream region. With `wait`, the erase
    /// is held back until real content follows.
    ClearOutput { wait: bool },

    Stream {
        text: String,
        source: StreamSource,
        clearable: bool,
        ansi: bool,
        #[serde(default)]
        continuation: bool,
    },

    /// Echoed source code.
    Input {
        text: String,
        execution_count: u64,
        #[serde(default)]
        continuation: bool,
    },

    /// Echoed evaluation result.
    Result {
        text: String,
        execution_count: u64,
        #[serde(default)]
        continuation: bool,
    },

    Banner {
        text: String,
        /// `(label, url)` pairs.
        help_links: Vec<(String, String)>,
        #[serde(default)]
        continuation: bool,
    },

    /// Goes to the pager, not the inline stream.
    PageDoc { text: String, html: Option<String> },

    InputRequest { prompt: String, password: bool },
}

/// Result of [`OutputItem::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub consumed: usize,
    pub head: Option<OutputItem>,
    pub tail: Option<OutputItem>,
}

impl OutputItem {
    // ────────────────────────────────────────────────────────────────
    // Constructors
    // ────────────────────────────────────────────────────────────────

    /// Regular kernel output: clearable, may carry ANSI styling.
    pub fn stream(text: impl Into<String>, source: StreamSource) -> Self {
        OutputItem::Stream {
            text: text.into(),
            source,
            clearable: true,
            ansi: true,
            continuation: false,
        }
    }

    /// Error text that a later clear must never erase.
    pub fn error_text(text: impl Into<String>) -> Self {
        OutputItem::Stream {
            text: text.into(),
            source: StreamSource::Stderr,
            clearable: false,
            ansi: true,
            continuation: false,
        }
    }

    pub fn input(text: impl Into<String>, execution_count: u64) -> Self {
        OutputItem::Input {
            text: text.into(),
            execution_count,
            continuation: false,
        }
    }

    pub fn result(text: impl Into<String>, execution_count: u64) -> Self {
        OutputItem::Result {
            text: text.into(),
            execution_count,
            continuation: false,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Queries
    // ────────────────────────────────────────────────────────────────

    /// Line-bearing text, or `None` for atomic items.
    pub fn text(&self) -> Option<&str> {
        match self {
            OutputItem::Stream { text, .. }
            | OutputItem::Input { text, .. }
            | OutputItem::Result { text, .. }
            | OutputItem::Banner { text, .. } => Some(text),
            OutputItem::ClearOutput { .. }
            | OutputItem::PageDoc { .. }
            | OutputItem::InputRequest { .. } => None,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.text().is_none()
    }

    /// A splittable item with no text left. Atomic items are never empty.
    pub fn is_empty(&self) -> bool {
        self.text().is_some_and(str::is_empty)
    }

    pub fn is_clearable(&self) -> bool {
        matches!(self, OutputItem::Stream { clearable: true, .. })
    }

    pub fn is_continuation(&self) -> bool {
        match self {
            OutputItem::Stream { continuation, .. }
            | OutputItem::Input { continuation, .. }
            | OutputItem::Result { continuation, .. }
            | OutputItem::Banner { continuation, .. } => *continuation,
            _ => false,
        }
    }

    /// Lines this item occupies; atomic items count as one.
    pub fn line_count(&self) -> usize {
        match self.text() {
            Some(text) => count_lines(text),
            None => 1,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Splitting
    // ────────────────────────────────────────────────────────────────

    /// Split off at most `max_lines` lines.
    ///
    /// The head keeps the consumed prefix, the tail the remainder (flagged as
    /// a continuation). Concatenating both texts always reproduces the
    /// original. Metadata is copied onto both halves.
    pub fn split(self, max_lines: usize) -> Split {
        let Some(text) = self.text() else {
            return if max_lines == 0 {
                Split {
                    consumed: 0,
                    head: None,
                    tail: Some(self),
                }
            } else {
                Split {
                    consumed: 1,
                    head: Some(self),
                    tail: None,
                }
            };
        };

        let (consumed, cut) = line_cut(text, max_lines);
        let (head_text, rest) = text.split_at(cut);

        let head = self.with_text(head_text.to_string(), self.is_continuation());
        let tail = if max_lines == 0 || !rest.is_empty() {
            Some(self.with_text(rest.to_string(), true))
        } else {
            None
        };

        Split {
            consumed,
            head: Some(head),
            tail,
        }
    }

    fn with_text(&self, new_text: String, continuation: bool) -> OutputItem {
        match self {
            OutputItem::Stream {
                source,
                clearable,
                ansi,
                ..
            } => OutputItem::Stream {
                text: new_text,
                source: *source,
                clearable: *clearable,
                ansi: *ansi,
                continuation,
            },
            OutputItem::Input { execution_count, .. } => OutputItem::Input {
                text: new_text,
                execution_count: *execution_count,
                continuation,
            },
            OutputItem::Result { execution_count, .. } => OutputItem::Result {
                text: new_text,
                execution_count: *execution_count,
                continuation,
            },
            OutputItem::Banner { help_links, .. } => OutputItem::Banner {
                text: new_text,
                help_links: help_links.clone(),
                continuation,
            },
            atomic => atomic.clone(),
        }
    }
}

/// Byte offset just past the first `max_lines` lines of `text`, and how many
/// lines that covers. An unterminated final line counts as one.
fn line_cut(text: &str, max_lines: usize) -> (usize, usize) {
    if max_lines == 0 {
        return (0, 0);
    }

    let mut lines = 0;
    for (idx, _) in text.match_indices('\n') {
        lines += 1;
        if lines == max_lines {
            return (lines, idx + 1);
        }
    }

    let terminated_end = text.rfind('\n').map_or(0, |idx| idx + 1);
    if terminated_end < text.len() {
        lines += 1;
    }
    (lines, text.len())
}

/// Number of lines in `text`: one per `\n`, plus one for a non-empty
/// unterminated tail.
pub fn count_lines(text: &str) -> usize {
    line_cut(text, usize::MAX).0
}

/// Remove CSI and OSC escape sequences.
pub fn strip_ansi(text: &str) -> String {
    let re = ANSI_REGEX.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)")
            .expect("Invalid ANSI Regex")
    });
    re.replace_all(text, "").into_owned()
}
