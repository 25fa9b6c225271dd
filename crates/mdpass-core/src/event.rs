//! The event contract between the parser and its consumer.
//!
//! The parser never builds a document object. It reports structure by
//! calling an [`EventSink`]: `enter_block`/`leave_block` around containers
//! and leaf blocks, `enter_span`/`leave_span` around inline spans, and
//! `text` for every run of content. Every enter is matched by exactly one
//! later leave carrying the same detail, and leaves arrive innermost-first.
//!
//! ```text
//! enter Document
//!   enter Heading(1)
//!     text Normal "Hi"
//!   leave Heading(1)
//! leave Document
//! ```

use std::borrow::Cow;
use std::fmt;
use std::ops::ControlFlow;

use crate::scanner::{is_ascii_punct, scan_entity};
use crate::span::Span;

/// A block-level event with its kind-specific detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    /// The whole document; always the outermost block.
    Document,
    /// `> quote`
    Quote,
    /// A bullet list.
    UnorderedList {
        /// Whether no blank line separates items or their blocks.
        tight: bool,
        /// `-`, `+` or `*`.
        mark: char,
    },
    /// A numbered list.
    OrderedList {
        /// Number of the first item.
        start: u32,
        /// Whether no blank line separates items or their blocks.
        tight: bool,
        /// `.` or `)`.
        delimiter: char,
    },
    /// A list item; `task` is set for `[ ]`/`[x]` items.
    ListItem { task: Option<TaskMark> },
    /// `***`, `---` or `___`.
    ThematicBreak,
    /// ATX or setext heading.
    Heading { level: u8 },
    /// Indented or fenced code.
    Code {
        /// Full info string (empty for indented code).
        info: Attribute<'a>,
        /// First word of the info string.
        lang: Attribute<'a>,
        /// Fence character, `None` for indented code.
        fence: Option<char>,
    },
    /// Raw HTML block.
    Html,
    /// Paragraph. Not reported directly inside items of tight lists.
    Paragraph,
    /// A table.
    Table {
        columns: usize,
        head_rows: usize,
        body_rows: usize,
    },
    TableHead,
    TableBody,
    TableRow,
    TableHeaderCell { align: Align },
    TableCell { align: Align },
}

impl Block<'_> {
    /// Detach the block from the parser's buffers.
    pub fn into_owned(self) -> Block<'static> {
        match self {
            Block::Document => Block::Document,
            Block::Quote => Block::Quote,
            Block::UnorderedList { tight, mark } => Block::UnorderedList { tight, mark },
            Block::OrderedList {
                start,
                tight,
                delimiter,
            } => Block::OrderedList {
                start,
                tight,
                delimiter,
            },
            Block::ListItem { task } => Block::ListItem { task },
            Block::ThematicBreak => Block::ThematicBreak,
            Block::Heading { level } => Block::Heading { level },
            Block::Code { info, lang, fence } => Block::Code {
                info: info.into_owned(),
                lang: lang.into_owned(),
                fence,
            },
            Block::Html => Block::Html,
            Block::Paragraph => Block::Paragraph,
            Block::Table {
                columns,
                head_rows,
                body_rows,
            } => Block::Table {
                columns,
                head_rows,
                body_rows,
            },
            Block::TableHead => Block::TableHead,
            Block::TableBody => Block::TableBody,
            Block::TableRow => Block::TableRow,
            Block::TableHeaderCell { align } => Block::TableHeaderCell { align },
            Block::TableCell { align } => Block::TableCell { align },
        }
    }
}

/// A task list marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMark {
    /// The character between the brackets: `' '`, `'x'` or `'X'`.
    pub mark: char,
    /// Byte offset of that character in the input.
    pub offset: usize,
}

impl TaskMark {
    /// Whether the task is checked.
    pub fn is_checked(&self) -> bool {
        self.mark != ' '
    }
}

/// Table column alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Default,
    Left,
    Center,
    Right,
}

/// An inline span event with its kind-specific detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline<'a> {
    Emphasis,
    Strong,
    Link {
        href: Attribute<'a>,
        title: Attribute<'a>,
        /// Set for `<...>` and permissive autolinks.
        autolink: bool,
    },
    /// An image; its text events form the alt text.
    Image {
        src: Attribute<'a>,
        title: Attribute<'a>,
    },
    Code,
    Strikethrough,
    LatexMath,
    LatexMathDisplay,
    WikiLink {
        target: Attribute<'a>,
    },
    Underline,
}

impl Inline<'_> {
    /// Detach the span from the parser's buffers.
    pub fn into_owned(self) -> Inline<'static> {
        match self {
            Inline::Emphasis => Inline::Emphasis,
            Inline::Strong => Inline::Strong,
            Inline::Link {
                href,
                title,
                autolink,
            } => Inline::Link {
                href: href.into_owned(),
                title: title.into_owned(),
                autolink,
            },
            Inline::Image { src, title } => Inline::Image {
                src: src.into_owned(),
                title: title.into_owned(),
            },
            Inline::Code => Inline::Code,
            Inline::Strikethrough => Inline::Strikethrough,
            Inline::LatexMath => Inline::LatexMath,
            Inline::LatexMathDisplay => Inline::LatexMathDisplay,
            Inline::WikiLink { target } => Inline::WikiLink {
                target: target.into_owned(),
            },
            Inline::Underline => Inline::Underline,
        }
    }
}

/// The kind of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    /// Ordinary text.
    Normal,
    /// A NUL byte from the input; the payload is `"\0"` and consumers
    /// substitute U+FFFD.
    NullChar,
    /// Hard line break; payload `"\n"`.
    HardBreak,
    /// Soft line break; payload `"\n"`.
    SoftBreak,
    /// An undecoded entity reference such as `&amp;` or `&#x41;`.
    Entity,
    /// Contents of a code span or code block.
    Code,
    /// Raw HTML, inline or block.
    Html,
    /// Contents of a math span.
    LatexMath,
}

/// The kind of an attribute sub-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrText {
    Normal,
    Entity,
    NullChar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttrPart {
    kind: AttrText,
    span: Span,
}

/// Accumulates attribute segments; copies text only when the output
/// differs from the raw input.
struct AttrBuilder {
    copy: bool,
    out: String,
    len: usize,
    parts: Vec<AttrPart>,
}

impl AttrBuilder {
    fn emit(&mut self, kind: AttrText, piece: &str) {
        if piece.is_empty() {
            return;
        }
        if self.copy {
            self.out.push_str(piece);
        }
        let start = self.len;
        self.len += piece.len();
        if kind == AttrText::Normal {
            if let Some(last) = self.parts.last_mut() {
                if last.kind == AttrText::Normal && last.span.end == start {
                    last.span.end = self.len;
                    return;
                }
            }
        }
        self.parts.push(AttrPart {
            kind,
            span: Span::new(start, self.len),
        });
    }
}

/// A link destination, title, wiki-link target or code info string.
///
/// Backslash escapes are already resolved. Entity references and NUL bytes
/// are kept verbatim but split into their own segments so a consumer can
/// decode or substitute them distinctly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute<'a> {
    text: Cow<'a, str>,
    parts: Vec<AttrPart>,
}

impl<'a> Attribute<'a> {
    /// An empty attribute.
    pub fn empty() -> Self {
        Attribute::default()
    }

    /// Build an attribute from raw source text.
    pub fn new(raw: &'a str) -> Self {
        Self::with_prefix("", raw)
    }

    /// Build an attribute from raw source text, prepending a literal prefix
    /// (`mailto:` or `http://` for autolinks).
    pub fn with_prefix(prefix: &str, raw: &'a str) -> Self {
        let bytes = raw.as_bytes();
        let copy = !prefix.is_empty()
            || bytes
                .windows(2)
                .any(|w| w[0] == b'\\' && is_ascii_punct(w[1]));

        let mut builder = AttrBuilder {
            copy,
            out: String::new(),
            len: 0,
            parts: Vec::new(),
        };
        builder.emit(AttrText::Normal, prefix);

        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if i + 1 < bytes.len() && is_ascii_punct(bytes[i + 1]) => {
                    builder.emit(AttrText::Normal, &raw[i + 1..i + 2]);
                    i += 2;
                }
                b'&' => match scan_entity(bytes, i) {
                    Some(end) => {
                        builder.emit(AttrText::Entity, &raw[i..end]);
                        i = end;
                    }
                    None => {
                        builder.emit(AttrText::Normal, "&");
                        i += 1;
                    }
                },
                b'\0' => {
                    builder.emit(AttrText::NullChar, "\0");
                    i += 1;
                }
                _ => {
                    let run = bytes[i + 1..]
                        .iter()
                        .position(|&b| matches!(b, b'\\' | b'&' | b'\0'))
                        .map_or(bytes.len(), |p| i + 1 + p);
                    builder.emit(AttrText::Normal, &raw[i..run]);
                    i = run;
                }
            }
        }

        let text = if copy {
            Cow::Owned(builder.out)
        } else {
            Cow::Borrowed(raw)
        };
        Attribute {
            text,
            parts: builder.parts,
        }
    }

    /// The resolved text, entities and NULs included verbatim.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the attribute is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The text split into normal, entity and NUL segments.
    pub fn segments(&self) -> impl Iterator<Item = (AttrText, &str)> + '_ {
        self.parts
            .iter()
            .map(move |p| (p.kind, &self.text[p.span.start..p.span.end]))
    }

    /// Detach from the parser's buffers.
    pub fn into_owned(self) -> Attribute<'static> {
        Attribute {
            text: Cow::Owned(self.text.into_owned()),
            parts: self.parts,
        }
    }
}

impl fmt::Display for Attribute<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Receiver of parse events.
///
/// Every method returns `ControlFlow`; `Break(())` stops the parse at once
/// and makes [`Parser::parse`](crate::Parser::parse) return
/// [`Error::Aborted`](crate::Error::Aborted). The defaults accept and
/// ignore the event, so a sink implements only what it needs.
pub trait EventSink {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        let _ = block;
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        let _ = block;
        ControlFlow::Continue(())
    }

    fn enter_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        let _ = span;
        ControlFlow::Continue(())
    }

    fn leave_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        let _ = span;
        ControlFlow::Continue(())
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        let _ = (kind, text);
        ControlFlow::Continue(())
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        (**self).enter_block(block)
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        (**self).leave_block(block)
    }

    fn enter_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        (**self).enter_span(span)
    }

    fn leave_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        (**self).leave_span(span)
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        (**self).text(kind, text)
    }
}

/// An owned copy of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    EnterBlock(Block<'static>),
    LeaveBlock(Block<'static>),
    EnterSpan(Inline<'static>),
    LeaveSpan(Inline<'static>),
    Text(TextKind, String),
}

/// A sink that keeps every event, for inspection and golden tests.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One line per event, indented by nesting depth.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut depth = 0usize;
        for event in &self.events {
            if matches!(event, Event::LeaveBlock(_) | Event::LeaveSpan(_)) {
                depth = depth.saturating_sub(1);
            }
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(&event.to_string());
            out.push('\n');
            if matches!(event, Event::EnterBlock(_) | Event::EnterSpan(_)) {
                depth += 1;
            }
        }
        out
    }
}

impl EventSink for Recorder {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        self.events.push(Event::EnterBlock(block.clone().into_owned()));
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        self.events.push(Event::LeaveBlock(block.clone().into_owned()));
        ControlFlow::Continue(())
    }

    fn enter_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        self.events.push(Event::EnterSpan(span.clone().into_owned()));
        ControlFlow::Continue(())
    }

    fn leave_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        self.events.push(Event::LeaveSpan(span.clone().into_owned()));
        ControlFlow::Continue(())
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        self.events.push(Event::Text(kind, text.to_string()));
        ControlFlow::Continue(())
    }
}

impl fmt::Display for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Document => write!(f, "Document"),
            Block::Quote => write!(f, "Quote"),
            Block::UnorderedList { tight, mark } => {
                write!(f, "UnorderedList({mark:?}, {})", tightness(*tight))
            }
            Block::OrderedList {
                start,
                tight,
                delimiter,
            } => write!(
                f,
                "OrderedList({start}, {delimiter:?}, {})",
                tightness(*tight)
            ),
            Block::ListItem { task: None } => write!(f, "ListItem"),
            Block::ListItem { task: Some(task) } => {
                write!(f, "ListItem(task {:?} @{})", task.mark, task.offset)
            }
            Block::ThematicBreak => write!(f, "ThematicBreak"),
            Block::Heading { level } => write!(f, "Heading({level})"),
            Block::Code { info, fence, .. } => match fence {
                Some(c) => write!(f, "Code({c:?}, {:?})", info.as_str()),
                None => write!(f, "Code(indented)"),
            },
            Block::Html => write!(f, "Html"),
            Block::Paragraph => write!(f, "Paragraph"),
            Block::Table {
                columns,
                head_rows,
                body_rows,
            } => write!(f, "Table({columns}x{head_rows}+{body_rows})"),
            Block::TableHead => write!(f, "TableHead"),
            Block::TableBody => write!(f, "TableBody"),
            Block::TableRow => write!(f, "TableRow"),
            Block::TableHeaderCell { align } => write!(f, "TableHeaderCell({align:?})"),
            Block::TableCell { align } => write!(f, "TableCell({align:?})"),
        }
    }
}

fn tightness(tight: bool) -> &'static str {
    if tight {
        "tight"
    } else {
        "loose"
    }
}

impl fmt::Display for Inline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inline::Emphasis => write!(f, "Emphasis"),
            Inline::Strong => write!(f, "Strong"),
            Inline::Link {
                href,
                title,
                autolink,
            } => {
                write!(f, "Link({:?}", href.as_str())?;
                if !title.is_empty() {
                    write!(f, ", title {:?}", title.as_str())?;
                }
                if *autolink {
                    write!(f, ", autolink")?;
                }
                write!(f, ")")
            }
            Inline::Image { src, title } => {
                write!(f, "Image({:?}", src.as_str())?;
                if !title.is_empty() {
                    write!(f, ", title {:?}", title.as_str())?;
                }
                write!(f, ")")
            }
            Inline::Code => write!(f, "Code"),
            Inline::Strikethrough => write!(f, "Strikethrough"),
            Inline::LatexMath => write!(f, "LatexMath"),
            Inline::LatexMathDisplay => write!(f, "LatexMathDisplay"),
            Inline::WikiLink { target } => write!(f, "WikiLink({:?})", target.as_str()),
            Inline::Underline => write!(f, "Underline"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::EnterBlock(b) => write!(f, "enter {b}"),
            Event::LeaveBlock(b) => write!(f, "leave {b}"),
            Event::EnterSpan(s) => write!(f, "enter {s}"),
            Event::LeaveSpan(s) => write!(f, "leave {s}"),
            Event::Text(kind, text) => write!(f, "text {kind:?} {text:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn segments(attr: &Attribute<'_>) -> Vec<(AttrText, String)> {
        attr.segments().map(|(k, s)| (k, s.to_string())).collect()
    }

    #[test]
    fn plain_attribute_borrows() {
        let attr = Attribute::new("/url");
        assert!(matches!(attr.text, Cow::Borrowed(_)));
        assert_eq!(segments(&attr), vec![(AttrText::Normal, "/url".to_string())]);
    }

    #[test]
    fn escapes_are_resolved() {
        let attr = Attribute::new(r"a\*b\\c");
        assert_eq!(attr.as_str(), r"a*b\c");
        assert_eq!(segments(&attr), vec![(AttrText::Normal, r"a*b\c".to_string())]);
    }

    #[test]
    fn entities_and_nuls_are_segmented() {
        let attr = Attribute::new("a&amp;b\0c&#x41;");
        assert_eq!(
            segments(&attr),
            vec![
                (AttrText::Normal, "a".to_string()),
                (AttrText::Entity, "&amp;".to_string()),
                (AttrText::Normal, "b".to_string()),
                (AttrText::NullChar, "\0".to_string()),
                (AttrText::Normal, "c".to_string()),
                (AttrText::Entity, "&#x41;".to_string()),
            ]
        );
    }

    #[test]
    fn escaped_ampersand_is_not_an_entity() {
        let attr = Attribute::new(r"\&amp;x");
        assert_eq!(attr.as_str(), "&amp;x");
        assert_eq!(segments(&attr), vec![(AttrText::Normal, "&amp;x".to_string())]);
    }

    #[test]
    fn prefix_is_prepended() {
        let attr = Attribute::with_prefix("mailto:", "me&amp;you@example.com");
        assert_eq!(attr.as_str(), "mailto:me&amp;you@example.com");
        assert_eq!(
            segments(&attr),
            vec![
                (AttrText::Normal, "mailto:me".to_string()),
                (AttrText::Entity, "&amp;".to_string()),
                (AttrText::Normal, "you@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn recorder_dump_indents() {
        let mut rec = Recorder::new();
        let _ = rec.enter_block(&Block::Document);
        let _ = rec.enter_block(&Block::Heading { level: 1 });
        let _ = rec.text(TextKind::Normal, "Hi");
        let _ = rec.leave_block(&Block::Heading { level: 1 });
        let _ = rec.leave_block(&Block::Document);
        assert_eq!(
            rec.dump(),
            "enter Document\n  enter Heading(1)\n    text Normal \"Hi\"\n  leave Heading(1)\nleave Document\n"
        );
    }
}
