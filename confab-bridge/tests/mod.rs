use confab_bridge::replay::{LogTransport, parse_line};
use confab_bridge::terminal::{TerminalRenderer, budget_for_height, render_until_closed};
use confab_bridge::transcript::{Paint, Style, Transcript};
use confab_bridge::util::resolve_config_path;
use confab_core::{KernelTransport, OutboundRequest, OutputItem, StreamSource};

use std::ffi::OsString;
use std::path::PathBuf;
use tokio::sync::mpsc;

fn stdout(text: &str) -> OutputItem {
    OutputItem::stream(text, StreamSource::Stdout)
}

fn plain(text: &str) -> Paint {
    Paint::Write {
        text: text.to_string(),
        style: Style::Plain,
    }
}

fn render(paints: &[Paint], color: bool) -> String {
    let mut renderer = TerminalRenderer::new(Vec::new(), color);
    for paint in paints {
        renderer.paint(paint).unwrap();
    }
    renderer.flush().unwrap();
    String::from_utf8(renderer.into_inner()).unwrap()
}

// ============================================================================
// Transcript Tests
// ============================================================================

#[test]
fn test_clear_erases_clearable_region() {
    let mut t = Transcript::new(false);
    t.apply(stdout("one\n"));
    t.apply(stdout("two\nthree\n"));

    assert_eq!(
        t.apply(OutputItem::ClearOutput { wait: true }),
        vec![Paint::Erase { rows: 3, column: 0 }]
    );
    assert!(!t.has_clearable_region());
}

#[test]
fn test_clear_without_region_paints_nothing() {
    let mut t = Transcript::new(false);
    assert!(t.apply(OutputItem::ClearOutput { wait: false }).is_empty());

    t.apply(stdout("progress 10%\n"));
    t.apply(OutputItem::error_text("Traceback\n"));
    assert!(!t.has_clearable_region());
    assert!(t.apply(OutputItem::ClearOutput { wait: false }).is_empty());
}

#[test]
fn test_clear_after_partial_line() {
    let mut t = Transcript::new(false);
    t.apply(stdout("50%"));
    assert_eq!(
        t.apply(OutputItem::ClearOutput { wait: false }),
        vec![Paint::Erase { rows: 0, column: 0 }]
    );
}

#[test]
fn test_clear_keeps_error_text_on_same_row() {
    let mut t = Transcript::new(false);
    t.apply(OutputItem::error_text("err: "));
    t.apply(stdout("x"));
    assert_eq!(
        t.apply(OutputItem::ClearOutput { wait: false }),
        vec![Paint::Erase { rows: 0, column: 5 }]
    );

    // The cursor is back where the region began.
    t.apply(stdout("y
z"));
    assert_eq!(
        t.apply(OutputItem::ClearOutput { wait: false }),
        vec![Paint::Erase { rows: 1, column: 5 }]
    );
}

#[test]
fn test_region_column_follows_earlier_lines() {
    let mut t = Transcript::new(false);
    t.apply(OutputItem::input("print(1)", 1));
    t.apply(OutputItem::error_text("warn
note: "));
    t.apply(stdout("12%"));
    t.apply(stdout(" 40%"));
    assert_eq!(
        t.apply(OutputItem::ClearOutput { wait: true }),
        vec![Paint::Erase { rows: 0, column: 6 }]
    );
}

#[test]
fn test_stream_styles() {
    let mut t = Transcript::new(false);
    assert_eq!(t.apply(stdout("ok\n")), vec![plain("ok\n")]);
    assert_eq!(
        t.apply(OutputItem::stream("careful\n", StreamSource::Stderr)),
        vec![Paint::Write {
            text: "careful\n".into(),
            style: Style::Error
        }]
    );
}

#[test]
fn test_input_prompt_only_on_first_piece() {
    let mut t = Transcript::new(false);
    let split = OutputItem::input("a = 1\nb = 2", 4).split(1);

    let first = t.apply(split.head.unwrap());
    assert_eq!(
        first,
        vec![
            Paint::Write {
                text: "In [4]: ".into(),
                style: Style::InPrompt
            },
            plain("a = 1\n"),
        ]
    );

    let rest = t.apply(split.tail.unwrap());
    assert_eq!(rest, vec![plain("b = 2\n")]);
}

#[test]
fn test_result_prompt() {
    let mut t = Transcript::new(false);
    assert_eq!(
        t.apply(OutputItem::result("42", 4)),
        vec![
            Paint::Write {
                text: "Out[4]: ".into(),
                style: Style::OutPrompt
            },
            plain("42\n"),
        ]
    );
}

#[test]
fn test_banner_links_follow_complete_banner() {
    let mut t = Transcript::new(false);
    let banner = OutputItem::Banner {
        text: "Python 3.12\nIPython 9\n".into(),
        help_links: vec![("Python".into(), "https://docs.python.org".into())],
        continuation: false,
    };
    let split = banner.split(1);

    assert_eq!(t.apply(split.head.unwrap()), vec![plain("Python 3.12\n")]);
    assert_eq!(t.apply(split.tail.unwrap()), vec![plain("IPython 9\n")]);

    let next = t.apply(stdout("hi\n"));
    assert_eq!(
        next,
        vec![
            Paint::Write {
                text: "Python: https://docs.python.org\n".into(),
                style: Style::Dim
            },
            plain("hi\n"),
        ]
    );
    assert!(t.finish().is_empty());
}

#[test]
fn test_banner_links_flushed_on_finish() {
    let mut t = Transcript::new(false);
    t.apply(OutputItem::Banner {
        text: "Kernel\n".into(),
        help_links: vec![("Docs".into(), "https://example.org".into())],
        continuation: false,
    });
    assert_eq!(t.finish().len(), 1);
}

#[test]
fn test_ansi_stripped_without_color() {
    let mut t = Transcript::new(false);
    assert_eq!(t.apply(stdout("\x1b[32mgreen\x1b[0m\n")), vec![plain("green\n")]);

    let mut t = Transcript::new(true);
    assert_eq!(
        t.apply(stdout("\x1b[32mgreen\x1b[0m\n")),
        vec![plain("\x1b[32mgreen\x1b[0m\n")]
    );
}

#[test]
fn test_page_and_input_request() {
    let mut t = Transcript::new(false);
    assert_eq!(
        t.apply(OutputItem::PageDoc {
            text: "Docstring".into(),
            html: None
        }),
        vec![Paint::Page("Docstring\n".into())]
    );
    assert_eq!(
        t.apply(OutputItem::InputRequest {
            prompt: "name: ".into(),
            password: false
        }),
        vec![Paint::Prompt {
            text: "name: ".into(),
            password: false
        }]
    );
}

// ============================================================================
// TerminalRenderer Tests
// ============================================================================

#[test]
fn test_render_plain_without_color() {
    let out = render(&[plain("hello\n"), Paint::Write {
        text: "oops\n".into(),
        style: Style::Error,
    }], false);
    assert_eq!(out, "hello\noops\n");
}

#[test]
fn test_render_erase_moves_up_per_row() {
    let out = render(&[Paint::Erase { rows: 2, column: 0 }], false);
    assert_eq!(out.matches("\x1b[1A").count(), 2);
    assert_eq!(out.matches("\x1b[2K").count(), 2);
    assert!(out.ends_with("\x1b[1G\x1b[K"));
}

#[test]
fn test_render_erase_from_column_keeps_row_prefix() {
    let out = render(&[Paint::Erase { rows: 0, column: 5 }], false);
    assert_eq!(out, "\x1b[6G\x1b[K");
    assert!(!out.contains("\x1b[2K"));
}

#[test]
fn test_render_until_closed_keeps_error_prefix() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(OutputItem::error_text("err: ")).unwrap();
    tx.send(stdout("x")).unwrap();
    tx.send(OutputItem::ClearOutput { wait: false }).unwrap();
    drop(tx);

    let mut transcript = Transcript::new(false);
    let mut renderer = TerminalRenderer::new(Vec::new(), false);
    render_until_closed(&mut rx, &mut transcript, &mut renderer).unwrap();

    let out = String::from_utf8(renderer.into_inner()).unwrap();
    assert_eq!(out, "err: x\x1b[6G\x1b[K");
}

#[test]
fn test_render_color_wraps_text() {
    let out = render(&[Paint::Write {
        text: "bad\n".into(),
        style: Style::Error,
    }], true);
    assert!(out.starts_with("\x1b["));
    assert!(out.contains("bad\n"));
    assert!(!out.ends_with("bad\n"));
}

#[test]
fn test_render_page_framed() {
    let out = render(&[Paint::Page("doc\n".into())], false);
    assert!(out.contains("page"));
    assert!(out.contains("doc\n"));
}

#[test]
fn test_render_until_closed() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(stdout("loading\n")).unwrap();
    tx.send(OutputItem::ClearOutput { wait: false }).unwrap();
    tx.send(stdout("done\n")).unwrap();
    drop(tx);

    let mut transcript = Transcript::new(false);
    let mut renderer = TerminalRenderer::new(Vec::new(), false);
    render_until_closed(&mut rx, &mut transcript, &mut renderer).unwrap();

    let out = String::from_utf8(renderer.into_inner()).unwrap();
    assert!(out.starts_with("loading\n"));
    assert!(out.ends_with("done\n"));
    assert_eq!(out.matches("\x1b[1A").count(), 1);
}

#[test]
fn test_budget_for_height() {
    assert_eq!(budget_for_height(24), 23);
    assert_eq!(budget_for_height(1), 1);
    assert_eq!(budget_for_height(0), 1);
}

// ============================================================================
// Replay Tests
// ============================================================================

#[test]
fn test_parse_line_defaults_from_here() {
    let line = r#"{"header": {"msg_type": "stream"}, "content": {"name": "stdout", "text": "hi\n"}}"#;
    let recorded = parse_line(1, line).unwrap().unwrap();
    assert!(recorded.from_here);
    assert_eq!(recorded.message.header.msg_type, "stream");
    assert_eq!(recorded.message.str_field("text"), Some("hi\n"));
}

#[test]
fn test_parse_line_other_client() {
    let line = r#"{"from_here": false, "header": {"msg_type": "status"}, "content": {"execution_state": "idle"}}"#;
    let recorded = parse_line(7, line).unwrap().unwrap();
    assert!(!recorded.from_here);
}

#[test]
fn test_parse_line_blank() {
    assert!(parse_line(1, "   ").unwrap().is_none());
}

#[test]
fn test_parse_line_invalid_names_line() {
    let err = parse_line(12, "{not json").unwrap_err();
    assert!(err.to_string().contains("line 12"));
}

#[test]
fn test_log_transport_accepts_everything() {
    let transport = LogTransport;
    assert!(transport
        .send(OutboundRequest::Input { value: "x".into() })
        .is_ok());
    assert!(transport
        .send(OutboundRequest::Execute {
            code: "1".into(),
            silent: false,
            store_history: true
        })
        .is_ok());
}

// ============================================================================
// Config Path Tests
// ============================================================================

#[test]
fn test_config_override_wins() {
    let path = resolve_config_path(
        Some(OsString::from("/tmp/custom.json")),
        Some(PathBuf::from("/home/u/.config/confab")),
    );
    assert_eq!(path, Some(PathBuf::from("/tmp/custom.json")));
}

#[test]
fn test_config_empty_override_ignored() {
    let path = resolve_config_path(
        Some(OsString::new()),
        Some(PathBuf::from("/home/u/.config/confab")),
    );
    assert_eq!(path, Some(PathBuf::from("/home/u/.config/confab/config.json")));
}

#[test]
fn test_config_no_location() {
    assert_eq!(resolve_config_path(None, None), None);
}
