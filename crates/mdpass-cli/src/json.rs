//! JSON view of the document tree.

use mdpass_core::ast::{AttrValue, Cell, Document, Inline, ListItem, Node};
use mdpass_core::{Align, AttrText};
use serde::Serialize;

#[derive(Serialize)]
pub struct JsonDocument<'a> {
    blocks: Vec<JsonBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum JsonBlock<'a> {
    Quote {
        blocks: Vec<JsonBlock<'a>>,
    },
    List {
        ordered: bool,
        start: u32,
        marker: char,
        tight: bool,
        items: Vec<JsonItem<'a>>,
    },
    ThematicBreak,
    Heading {
        level: u8,
        content: Vec<JsonInline<'a>>,
    },
    Paragraph {
        content: Vec<JsonInline<'a>>,
    },
    Plain {
        content: Vec<JsonInline<'a>>,
    },
    CodeBlock {
        info: JsonAttr<'a>,
        lang: JsonAttr<'a>,
        fence: Option<char>,
        content: &'a str,
    },
    Html {
        content: &'a str,
    },
    Table {
        columns: usize,
        head: Vec<Vec<JsonCell<'a>>>,
        body: Vec<Vec<JsonCell<'a>>>,
    },
}

#[derive(Serialize)]
struct JsonItem<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<bool>,
    blocks: Vec<JsonBlock<'a>>,
}

#[derive(Serialize)]
struct JsonCell<'a> {
    align: &'static str,
    content: Vec<JsonInline<'a>>,
}

/// An attribute as its segments.
#[derive(Serialize)]
struct JsonAttr<'a> {
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entities: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum JsonInline<'a> {
    Text { content: &'a str },
    Entity { content: &'a str },
    NullChar,
    SoftBreak,
    HardBreak,
    Html { content: &'a str },
    CodeSpan { content: &'a str },
    Math { display: bool, content: &'a str },
    Emphasis { content: Vec<JsonInline<'a>> },
    Strong { content: Vec<JsonInline<'a>> },
    Underline { content: Vec<JsonInline<'a>> },
    Strikethrough { content: Vec<JsonInline<'a>> },
    Link {
        href: JsonAttr<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<JsonAttr<'a>>,
        autolink: bool,
        content: Vec<JsonInline<'a>>,
    },
    Image {
        src: JsonAttr<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<JsonAttr<'a>>,
        alt: Vec<JsonInline<'a>>,
    },
    WikiLink {
        target: JsonAttr<'a>,
        content: Vec<JsonInline<'a>>,
    },
}

impl<'a> JsonDocument<'a> {
    pub fn new(doc: &'a Document) -> Self {
        JsonDocument {
            blocks: blocks(&doc.children),
        }
    }
}

fn blocks(nodes: &[Node]) -> Vec<JsonBlock<'_>> {
    nodes.iter().map(block).collect()
}

fn block(node: &Node) -> JsonBlock<'_> {
    match node {
        Node::Quote(children) => JsonBlock::Quote {
            blocks: blocks(children),
        },
        Node::List(list) => JsonBlock::List {
            ordered: list.ordered,
            start: list.start,
            marker: list.marker,
            tight: list.tight,
            items: list.items.iter().map(item).collect(),
        },
        Node::ThematicBreak => JsonBlock::ThematicBreak,
        Node::Heading { level, content } => JsonBlock::Heading {
            level: *level,
            content: inlines(content),
        },
        Node::Paragraph(content) => JsonBlock::Paragraph {
            content: inlines(content),
        },
        Node::Plain(content) => JsonBlock::Plain {
            content: inlines(content),
        },
        Node::Code(code) => JsonBlock::CodeBlock {
            info: attr(&code.info),
            lang: attr(&code.lang),
            fence: code.fence,
            content: &code.text,
        },
        Node::Html(text) => JsonBlock::Html { content: text },
        Node::Table(table) => JsonBlock::Table {
            columns: table.columns,
            head: table.head.iter().map(|row| row.iter().map(cell).collect()).collect(),
            body: table.body.iter().map(|row| row.iter().map(cell).collect()).collect(),
        },
    }
}

fn item(item: &ListItem) -> JsonItem<'_> {
    JsonItem {
        task: item.task.map(|t| t.is_checked()),
        blocks: blocks(&item.children),
    }
}

fn cell(cell: &Cell) -> JsonCell<'_> {
    JsonCell {
        align: match cell.align {
            Align::Default => "default",
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        },
        content: inlines(&cell.content),
    }
}

fn attr(value: &AttrValue) -> JsonAttr<'_> {
    JsonAttr {
        text: value.text(),
        entities: value
            .segments
            .iter()
            .filter(|(kind, _)| *kind == AttrText::Entity)
            .map(|(_, s)| s.as_str())
            .collect(),
    }
}

fn optional_attr(value: &AttrValue) -> Option<JsonAttr<'_>> {
    (!value.is_empty()).then(|| attr(value))
}

fn inlines(nodes: &[Inline]) -> Vec<JsonInline<'_>> {
    nodes.iter().map(inline).collect()
}

fn inline(node: &Inline) -> JsonInline<'_> {
    match node {
        Inline::Text(s) => JsonInline::Text { content: s },
        Inline::Entity(s) => JsonInline::Entity { content: s },
        Inline::NullChar => JsonInline::NullChar,
        Inline::SoftBreak => JsonInline::SoftBreak,
        Inline::HardBreak => JsonInline::HardBreak,
        Inline::Html(s) => JsonInline::Html { content: s },
        Inline::Code(s) => JsonInline::CodeSpan { content: s },
        Inline::Math(s) => JsonInline::Math {
            display: false,
            content: s,
        },
        Inline::DisplayMath(s) => JsonInline::Math {
            display: true,
            content: s,
        },
        Inline::Emphasis(c) => JsonInline::Emphasis { content: inlines(c) },
        Inline::Strong(c) => JsonInline::Strong { content: inlines(c) },
        Inline::Underline(c) => JsonInline::Underline { content: inlines(c) },
        Inline::Strikethrough(c) => JsonInline::Strikethrough { content: inlines(c) },
        Inline::Link {
            href,
            title,
            autolink,
            children,
        } => JsonInline::Link {
            href: attr(href),
            title: optional_attr(title),
            autolink: *autolink,
            content: inlines(children),
        },
        Inline::Image { src, title, alt } => JsonInline::Image {
            src: attr(src),
            title: optional_attr(title),
            alt: inlines(alt),
        },
        Inline::WikiLink { target, children } => JsonInline::WikiLink {
            target: attr(target),
            content: inlines(children),
        },
    }
}
