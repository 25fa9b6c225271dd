//! Owned document tree built from the event stream.
//!
//! [`TreeBuilder`] is an ordinary [`EventSink`]: it keeps a stack of the
//! blocks and spans currently open and folds each one into its parent when
//! the matching leave event arrives. Everything in the tree is owned, so a
//! [`Document`] outlives the input it was parsed from.
//!
//! ```rust
//! use mdpass_core::ast::{Inline, Node};
//! use mdpass_core::{parse_document, Options};
//!
//! let doc = parse_document("# Hi *there*", Options::empty()).unwrap();
//! let Node::Heading { level, content } = &doc.children[0] else { panic!() };
//! assert_eq!(*level, 1);
//! assert_eq!(content[1], Inline::Emphasis(vec![Inline::Text("there".into())]));
//! ```

use std::ops::ControlFlow;

use crate::error::Error;
use crate::event::{self, Align, AttrText, Attribute, Block, EventSink, TaskMark, TextKind};
use crate::options::Options;
use crate::parser::Parser;

/// The root of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

/// A block-level node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Quote(Vec<Node>),
    List(List),
    ThematicBreak,
    Heading { level: u8, content: Vec<Inline> },
    Paragraph(Vec<Inline>),
    /// Inline content placed directly in an item of a tight list.
    Plain(Vec<Inline>),
    Code(CodeBlock),
    Html(String),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List {
    pub ordered: bool,
    /// First number of an ordered list; 1 for bullet lists.
    pub start: u32,
    /// Bullet character, or the `.`/`)` delimiter of an ordered list.
    pub marker: char,
    pub tight: bool,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListItem {
    pub task: Option<TaskMark>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub info: AttrValue,
    pub lang: AttrValue,
    /// `None` for indented code.
    pub fence: Option<char>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub columns: usize,
    pub head: Vec<Row>,
    pub body: Vec<Row>,
}

pub type Row = Vec<Cell>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
    pub align: Align,
    pub content: Vec<Inline>,
}

/// An attribute split into normal, entity and NUL segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrValue {
    pub segments: Vec<(AttrText, String)>,
}

impl AttrValue {
    /// The segments joined, entities undecoded.
    pub fn text(&self) -> String {
        self.segments.iter().map(|(_, s)| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl From<&Attribute<'_>> for AttrValue {
    fn from(attr: &Attribute<'_>) -> Self {
        AttrValue {
            segments: attr.segments().map(|(k, s)| (k, s.to_string())).collect(),
        }
    }
}

/// An inline node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    /// Undecoded entity reference.
    Entity(String),
    NullChar,
    SoftBreak,
    HardBreak,
    Html(String),
    Code(String),
    Math(String),
    DisplayMath(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Underline(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link {
        href: AttrValue,
        title: AttrValue,
        autolink: bool,
        children: Vec<Inline>,
    },
    Image {
        src: AttrValue,
        title: AttrValue,
        alt: Vec<Inline>,
    },
    WikiLink {
        target: AttrValue,
        children: Vec<Inline>,
    },
}

impl Inline {
    /// Concatenated text content, with breaks as newlines.
    pub fn plain_text(nodes: &[Inline]) -> String {
        let mut out = String::new();
        collect_text(nodes, &mut out);
        out
    }
}

fn collect_text(nodes: &[Inline], out: &mut String) {
    for node in nodes {
        match node {
            Inline::Text(s)
            | Inline::Entity(s)
            | Inline::Html(s)
            | Inline::Code(s)
            | Inline::Math(s)
            | Inline::DisplayMath(s) => out.push_str(s),
            Inline::NullChar => out.push('\u{FFFD}'),
            Inline::SoftBreak | Inline::HardBreak => out.push('\n'),
            Inline::Emphasis(c)
            | Inline::Strong(c)
            | Inline::Underline(c)
            | Inline::Strikethrough(c)
            | Inline::Link { children: c, .. }
            | Inline::WikiLink { children: c, .. }
            | Inline::Image { alt: c, .. } => collect_text(c, out),
        }
    }
}

/// Parse `input` into an owned tree.
pub fn parse_document(input: &str, options: Options) -> Result<Document, Error> {
    let mut builder = TreeBuilder::new();
    Parser::new(options).parse(input, &mut builder)?;
    builder.finish()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

enum Frame {
    Blocks { block: Block<'static>, nodes: Vec<Node> },
    List { block: Block<'static>, items: Vec<ListItem> },
    Item { task: Option<TaskMark>, nodes: Vec<Node>, inlines: Vec<Inline> },
    Inlines { block: Block<'static>, inlines: Vec<Inline> },
    Verbatim { block: Block<'static>, text: String },
    Table { columns: usize, head: Vec<Row>, body: Vec<Row> },
    Section { head: bool, rows: Vec<Row> },
    Row(Row),
}

/// Sink that assembles a [`Document`].
#[derive(Default)]
pub struct TreeBuilder {
    frames: Vec<Frame>,
    spans: Vec<(event::Inline<'static>, Vec<Inline>)>,
    done: Option<Document>,
    broken: bool,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished document. Fails if the events did not form a complete,
    /// well-nested document.
    pub fn finish(self) -> Result<Document, Error> {
        if self.broken || !self.frames.is_empty() || !self.spans.is_empty() {
            return Err(Error::Internal("event stream not well formed"));
        }
        self.done
            .ok_or(Error::Internal("document was never closed"))
    }

    fn fail(&mut self) -> ControlFlow<()> {
        self.broken = true;
        ControlFlow::Break(())
    }

    fn push_node(&mut self, node: Node) -> ControlFlow<()> {
        match self.frames.last_mut() {
            Some(Frame::Blocks { nodes, .. } | Frame::Item { nodes, .. }) => {
                nodes.push(node);
                ControlFlow::Continue(())
            }
            _ => self.fail(),
        }
    }

    /// Where inline content currently goes.
    fn inline_target(&mut self) -> Option<&mut Vec<Inline>> {
        if let Some((_, children)) = self.spans.last_mut() {
            return Some(children);
        }
        match self.frames.last_mut() {
            Some(Frame::Inlines { inlines, .. } | Frame::Item { inlines, .. }) => Some(inlines),
            _ => None,
        }
    }

    fn push_inline(&mut self, inline: Inline) -> ControlFlow<()> {
        let Some(target) = self.inline_target() else {
            return self.fail();
        };
        match (target.last_mut(), inline) {
            (Some(Inline::Text(prev)), Inline::Text(s)) => prev.push_str(&s),
            (Some(Inline::Html(prev)), Inline::Html(s)) => prev.push_str(&s),
            (_, inline) => target.push(inline),
        }
        ControlFlow::Continue(())
    }

    /// Item content seen so far becomes a `Plain` node before a block
    /// follows it.
    fn flush_item_inlines(&mut self) {
        if let Some(Frame::Item { nodes, inlines, .. }) = self.frames.last_mut() {
            if !inlines.is_empty() {
                nodes.push(Node::Plain(std::mem::take(inlines)));
            }
        }
    }
}

impl EventSink for TreeBuilder {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        self.flush_item_inlines();
        let owned = block.clone().into_owned();
        let frame = match owned {
            Block::Document | Block::Quote => Frame::Blocks {
                block: owned,
                nodes: Vec::new(),
            },
            Block::UnorderedList { .. } | Block::OrderedList { .. } => Frame::List {
                block: owned,
                items: Vec::new(),
            },
            Block::ListItem { task } => Frame::Item {
                task,
                nodes: Vec::new(),
                inlines: Vec::new(),
            },
            Block::Heading { .. }
            | Block::Paragraph
            | Block::TableHeaderCell { .. }
            | Block::TableCell { .. } => Frame::Inlines {
                block: owned,
                inlines: Vec::new(),
            },
            Block::Code { .. } | Block::Html => Frame::Verbatim {
                block: owned,
                text: String::new(),
            },
            Block::ThematicBreak => return self.push_node(Node::ThematicBreak),
            Block::Table { columns, .. } => Frame::Table {
                columns,
                head: Vec::new(),
                body: Vec::new(),
            },
            Block::TableHead => Frame::Section {
                head: true,
                rows: Vec::new(),
            },
            Block::TableBody => Frame::Section {
                head: false,
                rows: Vec::new(),
            },
            Block::TableRow => Frame::Row(Vec::new()),
        };
        self.frames.push(frame);
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        if matches!(block, Block::ThematicBreak) {
            return ControlFlow::Continue(());
        }
        self.flush_item_inlines();
        let Some(frame) = self.frames.pop() else {
            return self.fail();
        };
        match frame {
            Frame::Blocks {
                block: Block::Document,
                nodes,
            } => {
                self.done = Some(Document { children: nodes });
                ControlFlow::Continue(())
            }
            Frame::Blocks { nodes, .. } => self.push_node(Node::Quote(nodes)),
            Frame::List { block, items } => {
                let list = match block {
                    Block::OrderedList {
                        start,
                        tight,
                        delimiter,
                    } => List {
                        ordered: true,
                        start,
                        marker: delimiter,
                        tight,
                        items,
                    },
                    Block::UnorderedList { tight, mark } => List {
                        ordered: false,
                        start: 1,
                        marker: mark,
                        tight,
                        items,
                    },
                    _ => return self.fail(),
                };
                self.push_node(Node::List(list))
            }
            Frame::Item { task, nodes, .. } => match self.frames.last_mut() {
                Some(Frame::List { items, .. }) => {
                    items.push(ListItem {
                        task,
                        children: nodes,
                    });
                    ControlFlow::Continue(())
                }
                _ => self.fail(),
            },
            Frame::Inlines { block, inlines } => match block {
                Block::Heading { level } => self.push_node(Node::Heading {
                    level,
                    content: inlines,
                }),
                Block::Paragraph => self.push_node(Node::Paragraph(inlines)),
                Block::TableHeaderCell { align } | Block::TableCell { align } => {
                    match self.frames.last_mut() {
                        Some(Frame::Row(cells)) => {
                            cells.push(Cell {
                                align,
                                content: inlines,
                            });
                            ControlFlow::Continue(())
                        }
                        _ => self.fail(),
                    }
                }
                _ => self.fail(),
            },
            Frame::Verbatim { block, text } => match block {
                Block::Code { info, lang, fence } => self.push_node(Node::Code(CodeBlock {
                    info: AttrValue::from(&info),
                    lang: AttrValue::from(&lang),
                    fence,
                    text,
                })),
                _ => self.push_node(Node::Html(text)),
            },
            Frame::Table {
                columns,
                head,
                body,
            } => self.push_node(Node::Table(Table {
                columns,
                head,
                body,
            })),
            Frame::Section { head: is_head, rows } => match self.frames.last_mut() {
                Some(Frame::Table { head, body, .. }) => {
                    if is_head {
                        head.extend(rows);
                    } else {
                        body.extend(rows);
                    }
                    ControlFlow::Continue(())
                }
                _ => self.fail(),
            },
            Frame::Row(cells) => match self.frames.last_mut() {
                Some(Frame::Section { rows, .. }) => {
                    rows.push(cells);
                    ControlFlow::Continue(())
                }
                _ => self.fail(),
            },
        }
    }

    fn enter_span(&mut self, span: &event::Inline<'_>) -> ControlFlow<()> {
        if self.inline_target().is_none() {
            return self.fail();
        }
        self.spans.push((span.clone().into_owned(), Vec::new()));
        ControlFlow::Continue(())
    }

    fn leave_span(&mut self, _span: &event::Inline<'_>) -> ControlFlow<()> {
        let Some((span, children)) = self.spans.pop() else {
            return self.fail();
        };
        let node = match span {
            event::Inline::Emphasis => Inline::Emphasis(children),
            event::Inline::Strong => Inline::Strong(children),
            event::Inline::Underline => Inline::Underline(children),
            event::Inline::Strikethrough => Inline::Strikethrough(children),
            event::Inline::Code => Inline::Code(Inline::plain_text(&children)),
            event::Inline::LatexMath => Inline::Math(Inline::plain_text(&children)),
            event::Inline::LatexMathDisplay => Inline::DisplayMath(Inline::plain_text(&children)),
            event::Inline::Link {
                href,
                title,
                autolink,
            } => Inline::Link {
                href: AttrValue::from(&href),
                title: AttrValue::from(&title),
                autolink,
                children,
            },
            event::Inline::Image { src, title } => Inline::Image {
                src: AttrValue::from(&src),
                title: AttrValue::from(&title),
                alt: children,
            },
            event::Inline::WikiLink { target } => Inline::WikiLink {
                target: AttrValue::from(&target),
                children,
            },
        };
        self.push_inline(node)
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        if let Some(Frame::Verbatim { text: buf, .. }) = self.frames.last_mut() {
            match kind {
                TextKind::NullChar => buf.push('\u{FFFD}'),
                _ => buf.push_str(text),
            }
            return ControlFlow::Continue(());
        }
        let node = match kind {
            TextKind::Normal | TextKind::Code | TextKind::LatexMath => Inline::Text(text.to_string()),
            TextKind::Entity => Inline::Entity(text.to_string()),
            TextKind::NullChar => Inline::NullChar,
            TextKind::SoftBreak => Inline::SoftBreak,
            TextKind::HardBreak => Inline::HardBreak,
            TextKind::Html => Inline::Html(text.to_string()),
        };
        self.push_inline(node)
    }
}
