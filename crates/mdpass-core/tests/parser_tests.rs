//! Integration tests for the mdpass parser

use mdpass_core::{Block, Dialect, Error, Event, EventSink, Inline, Options, Parser, Recorder, TextKind};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::ops::ControlFlow;

fn dump_with(input: &str, options: impl Into<Options>) -> String {
    let mut rec = Recorder::new();
    Parser::new(options).parse(input, &mut rec).unwrap();
    rec.dump()
}

fn events(input: &str, options: impl Into<Options>) -> Vec<Event> {
    Parser::new(options).events(input).unwrap()
}

/// Normal text of the whole document, concatenated.
fn normal_text(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Text(TextKind::Normal, s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

/// Replays the stream onto a shadow stack; panics on any mismatch.
fn assert_well_formed(events: &[Event]) {
    #[derive(Debug, PartialEq)]
    enum Open {
        Block(Block<'static>),
        Span(Inline<'static>),
    }
    let mut stack = Vec::new();
    for (i, event) in events.iter().enumerate() {
        match event {
            Event::EnterBlock(b) => stack.push(Open::Block(b.clone())),
            Event::EnterSpan(s) => stack.push(Open::Span(s.clone())),
            Event::LeaveBlock(b) => {
                assert_eq!(stack.pop(), Some(Open::Block(b.clone())), "event {i}")
            }
            Event::LeaveSpan(s) => {
                assert_eq!(stack.pop(), Some(Open::Span(s.clone())), "event {i}")
            }
            Event::Text(..) => assert!(!stack.is_empty(), "text outside the document"),
        }
    }
    assert!(stack.is_empty(), "unclosed: {stack:?}");
    assert_eq!(events.first(), Some(&Event::EnterBlock(Block::Document)));
    assert_eq!(events.last(), Some(&Event::LeaveBlock(Block::Document)));
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_empty_input() {
    assert_eq!(
        events("", Options::empty()),
        vec![
            Event::EnterBlock(Block::Document),
            Event::LeaveBlock(Block::Document)
        ]
    );
}

#[test]
fn test_heading_scenario() {
    insta::assert_snapshot!(dump_with("# Hi\n", Options::empty()), @r###"
    enter Document
      enter Heading(1)
        text Normal "Hi"
      leave Heading(1)
    leave Document
    "###);
}

#[test]
fn test_emphasis_scenario() {
    insta::assert_snapshot!(dump_with("*a* **b**\n", Options::empty()), @r###"
    enter Document
      enter Paragraph
        enter Emphasis
          text Normal "a"
        leave Emphasis
        text Normal " "
        enter Strong
          text Normal "b"
        leave Strong
      leave Paragraph
    leave Document
    "###);
}

#[test]
fn test_link_scenario() {
    insta::assert_snapshot!(dump_with("[x](y)\n", Options::empty()), @r###"
    enter Document
      enter Paragraph
        enter Link("y")
          text Normal "x"
        leave Link("y")
      leave Paragraph
    leave Document
    "###);
}

#[test]
fn test_unterminated_destination_degrades_to_text() {
    let evs = events("[x](\n", Options::empty());
    assert_well_formed(&evs);
    assert!(!evs.iter().any(|e| matches!(e, Event::EnterSpan(_))));
    assert_eq!(normal_text(&evs), "[x](");
}

#[test]
fn test_unterminated_fence_spans_to_end() {
    let evs = events("```\nlet a;\n\n# not a heading", Options::empty());
    assert_well_formed(&evs);
    let code: String = evs
        .iter()
        .filter_map(|e| match e {
            Event::Text(TextKind::Code, s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(code, "let a;\n\n# not a heading\n");
    assert!(!evs
        .iter()
        .any(|e| matches!(e, Event::EnterBlock(Block::Heading { .. }))));
}

// ============================================================================
// Golden event streams
// ============================================================================

#[test]
fn test_list_inside_quote() {
    insta::assert_snapshot!(dump_with("> - a\n>   b\n> - c", Options::empty()), @r###"
    enter Document
      enter Quote
        enter UnorderedList('-', tight)
          enter ListItem
            text Normal "a"
            text SoftBreak "\n"
            text Normal "b"
          leave ListItem
          enter ListItem
            text Normal "c"
          leave ListItem
        leave UnorderedList('-', tight)
      leave Quote
    leave Document
    "###);
}

#[test]
fn test_reference_links_defined_later() {
    insta::assert_snapshot!(
        dump_with("[foo][bar] and [Bar]\n\n[bar]: /url \"T\"", Options::empty()),
        @r###"
    enter Document
      enter Paragraph
        enter Link("/url", title "T")
          text Normal "foo"
        leave Link("/url", title "T")
        text Normal " and "
        enter Link("/url", title "T")
          text Normal "Bar"
        leave Link("/url", title "T")
      leave Paragraph
    leave Document
    "###
    );
}

#[test]
fn test_task_list() {
    insta::assert_snapshot!(dump_with("- [ ] todo\n- [x] done", Dialect::Github), @r###"
    enter Document
      enter UnorderedList('-', tight)
        enter ListItem(task ' ' @3)
          text Normal "todo"
        leave ListItem(task ' ' @3)
        enter ListItem(task 'x' @14)
          text Normal "done"
        leave ListItem(task 'x' @14)
      leave UnorderedList('-', tight)
    leave Document
    "###);
}

#[test]
fn test_setext_and_thematic_break() {
    insta::assert_snapshot!(dump_with("Title\n---\n\n***", Options::empty()), @r###"
    enter Document
      enter Heading(2)
        text Normal "Title"
      leave Heading(2)
      enter ThematicBreak
      leave ThematicBreak
    leave Document
    "###);
}

// ============================================================================
// Block structure
// ============================================================================

#[rstest]
#[case::atx("## a", Block::Heading { level: 2 })]
#[case::setext("a\n===", Block::Heading { level: 1 })]
#[case::quote("> a", Block::Quote)]
#[case::bullets("* a", Block::UnorderedList { tight: true, mark: '*' })]
#[case::ordered("7) a", Block::OrderedList { start: 7, tight: true, delimiter: ')' })]
#[case::loose("+ a\n\n+ b", Block::UnorderedList { tight: false, mark: '+' })]
#[case::html("<!-- c -->", Block::Html)]
#[case::thematic("___", Block::ThematicBreak)]
#[case::paragraph("plain", Block::Paragraph)]
fn test_first_block(#[case] input: &str, #[case] expected: Block<'static>) {
    let evs = events(input, Options::empty());
    assert_well_formed(&evs);
    assert_eq!(evs[1], Event::EnterBlock(expected));
}

#[rstest]
#[case::spaces("    code", "code\n")]
#[case::tab("\tcode", "code\n")]
#[case::extra_indent("      code", "  code\n")]
#[case::fenced("```\n  code\n```", "  code\n")]
#[case::fence_indent_stripped("  ```\n    code\n  ```", "  code\n")]
#[case::tilde_fence_ignores_backticks("~~~\n```\n~~~", "```\n")]
fn test_code_block_content(#[case] input: &str, #[case] expected: &str) {
    let evs = events(input, Options::empty());
    let code: String = evs
        .iter()
        .filter_map(|e| match e {
            Event::Text(TextKind::Code, s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(code, expected);
}

#[test]
fn test_no_indented_code_option() {
    let evs = events("    not code", Options::NO_INDENTED_CODE_BLOCKS);
    assert_eq!(evs[1], Event::EnterBlock(Block::Paragraph));
    assert_eq!(normal_text(&evs), "not code");
}

#[test]
fn test_no_html_options() {
    let evs = events("<div>\n\na <b>", Options::NO_HTML);
    assert!(!evs.iter().any(|e| matches!(e, Event::EnterBlock(Block::Html))));
    assert!(!evs.iter().any(|e| matches!(e, Event::Text(TextKind::Html, _))));
}

#[test]
fn test_deep_nesting() {
    let input = format!("{}deep", "> ".repeat(500));
    let evs = events(&input, Options::empty());
    assert_well_formed(&evs);
    let quotes = evs
        .iter()
        .filter(|e| matches!(e, Event::EnterBlock(Block::Quote)))
        .count();
    assert_eq!(quotes, 500);
}

#[test]
fn test_table_requires_extension() {
    let input = "| a |\n| - |\n| 1 |";
    assert!(!events(input, Options::empty())
        .iter()
        .any(|e| matches!(e, Event::EnterBlock(Block::Table { .. }))));
    assert!(events(input, Dialect::Github).contains(&Event::EnterBlock(Block::Table {
        columns: 1,
        head_rows: 1,
        body_rows: 1
    })));
}

// ============================================================================
// Inline content
// ============================================================================

#[rstest]
#[case::strike("~~a~~", Options::STRIKETHROUGH, Inline::Strikethrough)]
#[case::underline("_a_", Options::UNDERLINE, Inline::Underline)]
#[case::math("$a$", Options::LATEX_MATH_SPANS, Inline::LatexMath)]
#[case::display_math("$$a$$", Options::LATEX_MATH_SPANS, Inline::LatexMathDisplay)]
#[case::code("`a`", Options::empty(), Inline::Code)]
fn test_extension_spans(#[case] input: &str, #[case] options: Options, #[case] expected: Inline<'static>) {
    let evs = events(input, options);
    assert_well_formed(&evs);
    assert!(evs.contains(&Event::EnterSpan(expected)), "{evs:?}");
}

#[test]
fn test_hard_soft_breaks_option() {
    let evs = events("a\nb", Options::HARD_SOFT_BREAKS);
    assert!(evs.contains(&Event::Text(TextKind::HardBreak, "\n".to_string())));
}

#[test]
fn test_entities_and_nulls_are_distinct_runs() {
    let evs = events("a &copy; b\0c", Options::empty());
    assert!(evs.contains(&Event::Text(TextKind::Entity, "&copy;".to_string())));
    assert!(evs.contains(&Event::Text(TextKind::NullChar, "\0".to_string())));
}

#[test]
fn test_permissive_autolinks_in_github_dialect() {
    let evs = events("visit https://example.com/a now", Dialect::Github);
    let link = evs.iter().find_map(|e| match e {
        Event::EnterSpan(Inline::Link { href, autolink, .. }) => Some((href.as_str().to_string(), *autolink)),
        _ => None,
    });
    assert_eq!(link, Some(("https://example.com/a".to_string(), true)));
    assert!(!events("visit https://example.com/a now", Dialect::CommonMark)
        .iter()
        .any(|e| matches!(e, Event::EnterSpan(_))));
}

#[rstest]
#[case::url_in_link_text("[see http://a.com](http://x)\n", false, "http://x")]
#[case::email_as_link_text("[a@b.com](http://x)\n", false, "http://x")]
#[case::www_as_link_text("[www.a.com](http://x)\n", false, "http://x")]
#[case::url_in_image_alt("![x http://a.com](i.png)\n", true, "i.png")]
fn test_bracketed_link_wins_over_autolink(
    #[case] input: &str,
    #[case] image: bool,
    #[case] dest: &str,
) {
    let evs = events(input, Dialect::Github);
    assert_well_formed(&evs);
    let targets: Vec<(bool, String)> = evs
        .iter()
        .filter_map(|e| match e {
            Event::EnterSpan(Inline::Link { href, .. }) => Some((false, href.as_str().to_string())),
            Event::EnterSpan(Inline::Image { src, .. }) => Some((true, src.as_str().to_string())),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![(image, dest.to_string())]);
}

// ============================================================================
// Properties
// ============================================================================

const CORPUS: &[&str] = &[
    "",
    "\n",
    "# h\n\npara *em* **strong** `code`\n",
    "> quote\n> > nested\n\n- a\n- b\n\n  c\n",
    "1. one\n2. two\n   - inner\n\n3) other",
    "```rust\nfn main() {}\n",
    "    indented\n\n\n    more\n",
    "<div>\n*x*\n</div>\n\n<!-- c\n-->\n",
    "[a]: /u\n[b]\n\n[a] [b] [c][a]\n",
    "| a | b |\n|---|:-:|\n| 1 | 2 | 3 |\n| x |\n",
    "- [ ] t\n- [X] u\n",
    "***a*b**c* _a_b_ ~~s~~ ~t~\n",
    "[[wiki|label]] $m$ $$d$$ www.a.com x@y.org\n",
    "a\\\nb  \nc\n\0&amp;&#42;&bogus;\n",
    "* a\n*\n* c\n\n   *   *   *\n",
    "[unclosed *em **strong `code\n",
    "- a\n - b\n  - c\n   - d\n    - e\n",
    ">\t\tcode\n-\tx\n",
];

fn all_options() -> Options {
    Options::all() - Options::NO_HTML - Options::NO_INDENTED_CODE_BLOCKS
}

#[rstest]
fn test_events_are_well_formed(#[values(Options::empty(), Options::from(Dialect::Github), all_options())] options: Options) {
    for input in CORPUS {
        assert_well_formed(&events(input, options));
    }
}

#[test]
fn test_parsing_is_idempotent() {
    let parser = Parser::new(all_options());
    for input in CORPUS {
        assert_eq!(parser.events(input).unwrap(), parser.events(input).unwrap(), "{input:?}");
    }
}

#[rstest]
#[case("plain words here")]
#[case("with &amp; entity and &#35; numeric")]
#[case("null\0byte")]
#[case("unicode ✓ ünïcödé")]
fn test_text_round_trip(#[case] input: &str) {
    let evs = events(input, Options::empty());
    let text: String = evs
        .iter()
        .filter_map(|e| match e {
            Event::Text(_, s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, input);
}

// ============================================================================
// Abort
// ============================================================================

struct StopOnText {
    seen: Vec<String>,
}

impl EventSink for StopOnText {
    fn text(&mut self, _kind: TextKind, text: &str) -> ControlFlow<()> {
        self.seen.push(text.to_string());
        ControlFlow::Break(())
    }
}

#[test]
fn test_abort_stops_immediately() {
    let mut sink = StopOnText { seen: Vec::new() };
    let result = Parser::default().parse("first\n\nsecond", &mut sink);
    assert_eq!(result, Err(Error::Aborted));
    assert_eq!(sink.seen, vec!["first".to_string()]);
}
