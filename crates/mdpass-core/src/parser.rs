//! Document driver.
//!
//! Parsing happens in two phases over the same input. The block recognizer
//! first runs over every line and records the block structure together
//! with the link reference definitions; the driver then walks the records
//! in order, reporting container and leaf events and running the inline
//! assembler on each leaf's text when the leaf is reached. Links may refer
//! to definitions that appear later in the document, so inline content
//! cannot be reported before the block pass is complete.

use std::borrow::Cow;

use log::{debug, trace};

use crate::block::{split_table_row, BlockParser, Container, Leaf, LeafKind, LeafLine, Record, RefDefs};
use crate::error::{check, Error};
use crate::event::{Align, Attribute, Block, Event, EventSink, Recorder, TextKind};
use crate::inline::parse_inlines;
use crate::options::Options;

const PADDING: &str = "    ";

/// Markdown parser with a fixed set of options.
///
/// A `Parser` holds no state between calls; one instance may parse any
/// number of documents, and independent instances may run on different
/// threads.
///
/// # Example
///
/// ```rust
/// use mdpass_core::{Dialect, Parser, Recorder};
///
/// let parser = Parser::new(Dialect::Github);
/// let mut recorder = Recorder::new();
/// parser.parse("# Hi\n", &mut recorder).unwrap();
/// assert_eq!(recorder.events.len(), 5);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser {
    options: Options,
}

impl Parser {
    /// Create a parser from options or a dialect.
    #[inline]
    pub fn new(options: impl Into<Options>) -> Self {
        Self {
            options: options.into(),
        }
    }

    /// The options in effect.
    #[inline]
    pub fn options(&self) -> Options {
        self.options
    }

    /// Parse `input`, reporting every event to `sink` in document order.
    ///
    /// Returns [`Error::Aborted`] as soon as the sink answers
    /// `ControlFlow::Break`; no event is delivered after that.
    pub fn parse<S: EventSink>(&self, input: &str, sink: &mut S) -> Result<(), Error> {
        let tree = BlockParser::new(input, self.options).parse()?;
        debug!(
            "parsing {} bytes: {} block records, {} reference definitions",
            input.len(),
            tree.records.len(),
            tree.refs.len()
        );
        let mut driver = Driver {
            input,
            opts: self.options,
            refs: &tree.refs,
            sink,
            open: Vec::new(),
            tight: Vec::new(),
        };
        driver.run(&tree.records)
    }

    /// Parse `input` and collect the events.
    pub fn events(&self, input: &str) -> Result<Vec<Event>, Error> {
        let mut recorder = Recorder::new();
        self.parse(input, &mut recorder)?;
        Ok(recorder.events)
    }
}

struct Driver<'i, 'r, S> {
    input: &'i str,
    opts: Options,
    refs: &'r RefDefs,
    sink: &'r mut S,
    /// Open containers, outermost first.
    open: Vec<Block<'static>>,
    /// Tightness of the open lists, innermost last.
    tight: Vec<bool>,
}

impl<'i, 'r, S: EventSink> Driver<'i, 'r, S> {
    fn run(&mut self, records: &[Record]) -> Result<(), Error> {
        check(self.sink.enter_block(&Block::Document))?;
        for record in records {
            match record {
                Record::Open(container) => {
                    let block = container_block(container);
                    if let Container::List { loose, .. } = container {
                        self.tight.push(!loose);
                    }
                    check(self.sink.enter_block(&block))?;
                    self.open.push(block);
                }
                Record::Close => {
                    let block = self
                        .open
                        .pop()
                        .ok_or(Error::Internal("container closed twice"))?;
                    if matches!(block, Block::UnorderedList { .. } | Block::OrderedList { .. }) {
                        self.tight.pop();
                    }
                    check(self.sink.leave_block(&block))?;
                }
                Record::Leaf(leaf) => self.leaf(leaf)?,
            }
        }
        if !self.open.is_empty() {
            return Err(Error::Internal("container left open"));
        }
        check(self.sink.leave_block(&Block::Document))
    }

    fn leaf(&mut self, leaf: &Leaf) -> Result<(), Error> {
        trace!("emit {:?}", leaf.kind);
        match &leaf.kind {
            LeafKind::Paragraph => {
                if self.in_tight_item() {
                    return self.inlines(&leaf.lines);
                }
                self.wrap(Block::Paragraph, |d| d.inlines(&leaf.lines))
            }
            LeafKind::Heading(level) => {
                self.wrap(Block::Heading { level: *level }, |d| d.inlines(&leaf.lines))
            }
            LeafKind::ThematicBreak => self.wrap(Block::ThematicBreak, |_| Ok(())),
            LeafKind::Code { fence, info } => {
                let info = info.slice(self.input);
                let lang_end = info.find([' ', '\t']).unwrap_or(info.len());
                let block = Block::Code {
                    info: Attribute::new(info),
                    lang: Attribute::new(&info[..lang_end]),
                    fence: fence.map(char::from),
                };
                self.wrap(block, |d| d.verbatim(&leaf.lines, TextKind::Code))
            }
            LeafKind::Html => self.wrap(Block::Html, |d| d.verbatim(&leaf.lines, TextKind::Html)),
            LeafKind::Table { aligns } => self.table(aligns, &leaf.lines),
        }
    }

    /// Report `block` around whatever `body` reports.
    fn wrap(
        &mut self,
        block: Block<'_>,
        body: impl FnOnce(&mut Self) -> Result<(), Error>,
    ) -> Result<(), Error> {
        check(self.sink.enter_block(&block))?;
        body(self)?;
        check(self.sink.leave_block(&block))
    }

    fn in_tight_item(&self) -> bool {
        matches!(self.open.last(), Some(Block::ListItem { .. })) && self.tight.last() == Some(&true)
    }

    /// Run the inline assembler over the lines of a paragraph or heading.
    fn inlines(&mut self, lines: &[LeafLine]) -> Result<(), Error> {
        let text = inline_text(self.input, lines);
        self.inline_str(&text)
    }

    fn inline_str(&mut self, text: &str) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        let pieces = parse_inlines(text, self.opts, self.refs);
        pieces.emit(text, self.refs, self.opts, &mut *self.sink)
    }

    /// Code and HTML lines: indentation padding, content, then a newline.
    fn verbatim(&mut self, lines: &[LeafLine], kind: TextKind) -> Result<(), Error> {
        for line in lines {
            if line.indent > 0 {
                check(self.sink.text(kind, &PADDING[..line.indent.min(PADDING.len())]))?;
            }
            let content = line.span.slice(self.input);
            for (i, part) in content.split('\0').enumerate() {
                if i > 0 {
                    check(self.sink.text(TextKind::NullChar, "\0"))?;
                }
                if !part.is_empty() {
                    check(self.sink.text(kind, part))?;
                }
            }
            check(self.sink.text(kind, "\n"))?;
        }
        Ok(())
    }

    fn table(&mut self, aligns: &[Align], lines: &[LeafLine]) -> Result<(), Error> {
        let Some((head, body)) = lines.split_first() else {
            return Err(Error::Internal("table without header row"));
        };
        let table = Block::Table {
            columns: aligns.len(),
            head_rows: 1,
            body_rows: body.len(),
        };
        check(self.sink.enter_block(&table))?;
        self.wrap(Block::TableHead, |d| d.row(head, aligns, true))?;
        if !body.is_empty() {
            self.wrap(Block::TableBody, |d| {
                body.iter().try_for_each(|row| d.row(row, aligns, false))
            })?;
        }
        check(self.sink.leave_block(&table))
    }

    /// One row with exactly one cell per column.
    fn row(&mut self, line: &LeafLine, aligns: &[Align], header: bool) -> Result<(), Error> {
        let text = line.span.slice(self.input);
        let cells = split_table_row(text);
        check(self.sink.enter_block(&Block::TableRow))?;
        for (i, &align) in aligns.iter().enumerate() {
            let cell = if header {
                Block::TableHeaderCell { align }
            } else {
                Block::TableCell { align }
            };
            let content = cells.get(i).map_or("", |span| span.slice(text));
            self.wrap(cell, |d| d.inline_str(content))?;
        }
        check(self.sink.leave_block(&Block::TableRow))
    }
}

fn container_block(container: &Container) -> Block<'static> {
    match *container {
        Container::Quote => Block::Quote,
        Container::List {
            ordered: false,
            mark,
            loose,
            ..
        } => Block::UnorderedList {
            tight: !loose,
            mark: char::from(mark),
        },
        Container::List {
            ordered: true,
            mark,
            start,
            loose,
        } => Block::OrderedList {
            start,
            tight: !loose,
            delimiter: char::from(mark),
        },
        Container::Item { task } => Block::ListItem { task },
    }
}

/// The text handed to the inline assembler: the lines joined by `\n`,
/// without trailing whitespace on the last line.
fn inline_text<'i>(input: &'i str, lines: &[LeafLine]) -> Cow<'i, str> {
    let trim = |s: &'i str| s.trim_end_matches([' ', '\t']);
    match lines {
        [] => Cow::Borrowed(""),
        [only] => Cow::Borrowed(trim(only.span.slice(input))),
        [init @ .., last] => {
            let mut out = String::with_capacity(lines.iter().map(|l| l.span.len() + 1).sum());
            for line in init {
                out.push_str(line.span.slice(input));
                out.push('\n');
            }
            out.push_str(trim(last.span.slice(input)));
            Cow::Owned(out)
        }
    }
}
