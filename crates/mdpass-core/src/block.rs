//! Block recognizer.
//!
//! Consumes the input one physical line at a time and records the block
//! structure as a flat list of [`Record`]s: container opens and closes,
//! and finished leaf blocks with the byte ranges of their lines. Inline
//! content is not looked at here.
//!
//! For each line the recognizer walks the stack of open containers and
//! consumes the prefix each one requires (`>` for a quote, indentation for
//! a list item). Whatever is left may open new containers, continue the
//! open leaf, or start a new leaf. A paragraph survives unmatched
//! containers as a lazy continuation line.
//!
//! Two facts are only known after later lines have been seen: whether a
//! list is loose, and which link reference definitions exist. The records
//! are therefore finished before any event is emitted.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::Error;
use crate::event::{Align, TaskMark};
use crate::html_block::{self, HtmlKind};
use crate::lexer::{Lexer, Line, LineCursor};
use crate::options::Options;
use crate::scanner::{normalize_label, scan_link_ref_def};
use crate::span::Span;

// ---------------------------------------------------------------------------
// Link reference definitions
// ---------------------------------------------------------------------------

/// A link reference definition; escapes are resolved when the link is
/// reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefDef {
    pub dest: String,
    pub title: Option<String>,
}

/// All definitions of a document, keyed by normalized label. The first
/// definition of a label wins.
#[derive(Debug, Default)]
pub(crate) struct RefDefs {
    defs: Vec<RefDef>,
    index: HashMap<String, usize>,
}

impl RefDefs {
    /// Add a definition. Returns `false` if the label was already defined.
    pub fn insert(&mut self, label: &str, dest: &str, title: Option<&str>) -> bool {
        let key = normalize_label(label);
        if key.is_empty() || self.index.contains_key(&key) {
            return false;
        }
        self.defs.push(RefDef {
            dest: dest.to_string(),
            title: title.map(str::to_string),
        });
        self.index.insert(key, self.defs.len() - 1);
        true
    }

    pub fn lookup(&self, label: &str) -> Option<usize> {
        self.index.get(&normalize_label(label)).copied()
    }

    pub fn get(&self, idx: usize) -> &RefDef {
        &self.defs[idx]
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Container {
    Quote,
    List {
        ordered: bool,
        /// Bullet character, or `.`/`)` for ordered lists.
        mark: u8,
        start: u32,
        loose: bool,
    },
    Item {
        task: Option<TaskMark>,
    },
}

/// One line of a leaf block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LeafLine {
    pub span: Span,
    /// Columns of indentation to report before `span` (left over from a
    /// partially consumed tab).
    pub indent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LeafKind {
    Paragraph,
    Heading(u8),
    ThematicBreak,
    Code { fence: Option<u8>, info: Span },
    Html,
    /// Lines are the header row followed by the body rows.
    Table { aligns: Vec<Align> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Leaf {
    pub kind: LeafKind,
    pub lines: Vec<LeafLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Open(Container),
    Close,
    Leaf(Leaf),
}

/// Output of the block pass.
#[derive(Debug)]
pub(crate) struct BlockTree {
    pub records: Vec<Record>,
    pub refs: RefDefs,
}

// ---------------------------------------------------------------------------
// Recognizer state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Document,
    Quote,
    List { ordered: bool, mark: u8 },
    Item { content_indent: usize, blank_start: bool },
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    /// Index of the frame's `Record::Open`.
    record: usize,
}

#[derive(Debug)]
enum OpenKind {
    Paragraph,
    IndentedCode,
    Fenced {
        ch: u8,
        len: usize,
        indent: usize,
        info: Span,
    },
    Html(HtmlKind),
    Table(Vec<Align>),
}

#[derive(Debug)]
struct OpenLeaf {
    kind: OpenKind,
    lines: Vec<LeafLine>,
}

/// What the open leaf is, without borrowing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafMode {
    None,
    Paragraph { lines: usize },
    IndentedCode,
    Fenced { ch: u8, len: usize, indent: usize },
    Html(HtmlKind),
    Table,
}

struct ListMarker<'a> {
    ordered: bool,
    mark: u8,
    start: u32,
    content_indent: usize,
    blank_rest: bool,
    task: Option<TaskMark>,
    /// Cursor positioned at the item content.
    cursor: LineCursor<'a>,
}

pub(crate) struct BlockParser<'a> {
    input: &'a str,
    opts: Options,
    records: Vec<Record>,
    stack: Vec<Frame>,
    leaf: Option<OpenLeaf>,
    refs: RefDefs,
    /// The previous line was blank outside verbatim content.
    prev_blank: bool,
}

impl<'a> BlockParser<'a> {
    pub fn new(input: &'a str, opts: Options) -> Self {
        Self {
            input,
            opts,
            records: Vec::with_capacity(input.len() / 32 + 1),
            stack: vec![Frame {
                kind: FrameKind::Document,
                record: usize::MAX,
            }],
            leaf: None,
            refs: RefDefs::default(),
            prev_blank: false,
        }
    }

    /// Run the block pass over the whole input.
    pub fn parse(mut self) -> Result<BlockTree, Error> {
        for line in Lexer::new(self.input) {
            self.process_line(line)?;
        }
        self.close_frames(1)?;
        self.close_leaf();
        debug!(
            "block pass: {} records, {} reference definitions",
            self.records.len(),
            self.refs.len()
        );
        Ok(BlockTree {
            records: self.records,
            refs: self.refs,
        })
    }

    fn process_line(&mut self, line: Line<'a>) -> Result<(), Error> {
        let mut cur = LineCursor::new(&line);
        let mut was_blank = std::mem::replace(&mut self.prev_blank, false);
        let n = self.stack.len();

        // Continue open containers. A list matches through its item; if the
        // item fails, the list stays a candidate for a sibling item.
        let mut matched = 1;
        let mut list_candidate = None;
        let mut i = 1;
        while i < n {
            match self.stack[i].kind {
                FrameKind::Quote => {
                    let (indent, first) = cur.indent();
                    if indent < 4 && line.text.as_bytes().get(first) == Some(&b'>') {
                        cur.skip_cols(indent);
                        cur.advance(1);
                        cur.skip_one_space();
                        matched = i + 1;
                        i += 1;
                    } else {
                        break;
                    }
                }
                FrameKind::List { .. } => {
                    if i + 1 < n {
                        i += 1;
                        continue;
                    }
                    list_candidate = Some(i);
                    break;
                }
                FrameKind::Item {
                    content_indent,
                    blank_start,
                } => {
                    let fits = if cur.is_blank() {
                        !(blank_start && !self.item_has_content(i))
                    } else {
                        cur.indent().0 >= content_indent
                    };
                    if !fits {
                        list_candidate = Some(i - 1);
                        break;
                    }
                    cur.skip_cols(content_indent);
                    matched = i + 1;
                    i += 1;
                }
                FrameKind::Document => return Err(Error::Internal("nested document frame")),
            }
        }

        // Verbatim leaves take the line as-is when their container matched.
        if matched == n {
            match self.leaf_mode() {
                LeafMode::Fenced { ch, len, indent } => {
                    let (cols, first) = cur.indent();
                    if cols < 4 && is_closing_fence(&line.text[first..], ch, len) {
                        self.close_leaf();
                    } else {
                        cur.skip_cols(indent);
                        self.push_line(verbatim_line(&cur, &line));
                    }
                    return Ok(());
                }
                LeafMode::Html(kind) => {
                    if kind.ends_at_blank() && cur.is_blank() {
                        self.close_leaf();
                    } else {
                        self.push_line(verbatim_line(&cur, &line));
                        if kind.ends_on(cur.rest()) {
                            self.close_leaf();
                        }
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        if cur.is_blank() {
            let keep = if list_candidate == Some(matched) {
                matched + 1
            } else {
                matched
            };
            self.close_frames(keep)?;
            match self.leaf_mode() {
                LeafMode::Paragraph { .. } | LeafMode::Table => self.close_leaf(),
                LeafMode::IndentedCode => {
                    cur.skip_cols(4);
                    self.push_line(verbatim_line(&cur, &line));
                }
                _ => {}
            }
            self.prev_blank = true;
            return Ok(());
        }

        // New containers.
        let mut container_started = false;
        loop {
            let (indent, first) = cur.indent();
            if indent >= 4 {
                break;
            }
            if line.text.as_bytes().get(first) == Some(&b'>') {
                self.begin_block(matched, &mut was_blank)?;
                cur.skip_cols(indent);
                cur.advance(1);
                cur.skip_one_space();
                self.open_container(FrameKind::Quote, Container::Quote);
                matched = self.stack.len();
                list_candidate = None;
                container_started = true;
                continue;
            }

            if is_thematic_break(&line.text[first..]) {
                break;
            }
            let para_here =
                !container_started && matched == self.stack.len() && self.leaf_is_paragraph();
            let Some(marker) = self.scan_list_marker(&cur, indent, para_here) else {
                break;
            };

            let sibling = list_candidate == Some(matched)
                && matches!(
                    self.stack[matched].kind,
                    FrameKind::List { ordered, mark } if ordered == marker.ordered && mark == marker.mark
                );
            if sibling {
                self.close_frames(matched + 1)?;
                self.close_leaf();
                if std::mem::take(&mut was_blank) {
                    self.loosen(matched)?;
                }
            } else {
                self.begin_block(matched, &mut was_blank)?;
                self.open_container(
                    FrameKind::List {
                        ordered: marker.ordered,
                        mark: marker.mark,
                    },
                    Container::List {
                        ordered: marker.ordered,
                        mark: marker.mark,
                        start: marker.start,
                        loose: false,
                    },
                );
            }
            trace!(
                "list item {:?} content indent {}",
                marker.mark as char,
                marker.content_indent
            );
            self.open_container(
                FrameKind::Item {
                    content_indent: marker.content_indent,
                    blank_start: marker.blank_rest,
                },
                Container::Item { task: marker.task },
            );
            cur = marker.cursor;
            matched = self.stack.len();
            list_candidate = None;
            container_started = true;
            if marker.blank_rest {
                break;
            }
        }

        if cur.is_blank() {
            // Only a container marker on this line.
            return Ok(());
        }

        let (indent, first) = cur.indent();
        let mode = self.leaf_mode();
        let mut para_open = !container_started && matches!(mode, LeafMode::Paragraph { .. });
        let para_here = para_open && matched == self.stack.len();
        let content = Span::new(line.span.start + first, line.span.end);

        if indent >= 4 {
            if para_open {
                self.push_line(LeafLine { span: content, indent: 0 });
                return Ok(());
            }
            if !self.opts.contains(Options::NO_INDENTED_CODE_BLOCKS) {
                cur.skip_cols(4);
                let code_line = verbatim_line(&cur, &line);
                if matched == self.stack.len() && mode == LeafMode::IndentedCode {
                    self.push_line(code_line);
                } else {
                    self.begin_block(matched, &mut was_blank)?;
                    self.open_leaf(OpenKind::IndentedCode, Some(code_line));
                }
                return Ok(());
            }
        } else {
            let text = &line.text[first..];

            if para_here {
                if let Some(level) = setext_level(text) {
                    if self.take_paragraph_defs() {
                        self.close_as_heading(level);
                        return Ok(());
                    }
                    para_open = false;
                }
            }

            if is_thematic_break(text) {
                self.begin_block(matched, &mut was_blank)?;
                self.records.push(Record::Leaf(Leaf {
                    kind: LeafKind::ThematicBreak,
                    lines: Vec::new(),
                }));
                return Ok(());
            }

            if let Some((level, heading)) = self.atx_heading(text) {
                self.begin_block(matched, &mut was_blank)?;
                let span = Span::new(content.start + heading.start, content.start + heading.end);
                self.records.push(Record::Leaf(Leaf {
                    kind: LeafKind::Heading(level),
                    lines: vec![LeafLine { span, indent: 0 }],
                }));
                return Ok(());
            }

            if let Some((ch, len, info)) = fence_open(text) {
                self.begin_block(matched, &mut was_blank)?;
                let info = Span::new(content.start + info.start, content.start + info.end);
                self.open_leaf(
                    OpenKind::Fenced {
                        ch,
                        len,
                        indent,
                        info,
                    },
                    None,
                );
                return Ok(());
            }

            if !self.opts.contains(Options::NO_HTML_BLOCKS) {
                if let Some(kind) = html_block::start_kind(text, para_open) {
                    self.begin_block(matched, &mut was_blank)?;
                    self.open_leaf(OpenKind::Html(kind), Some(verbatim_line(&cur, &line)));
                    if kind.ends_on(text) {
                        self.close_leaf();
                    }
                    return Ok(());
                }
            }

            if self.opts.contains(Options::TABLES)
                && para_open
                && para_here
                && mode == (LeafMode::Paragraph { lines: 1 })
                && self.try_start_table(text)
            {
                return Ok(());
            }

            if mode == LeafMode::Table && !container_started && matched == self.stack.len() {
                self.push_line(LeafLine { span: content, indent: 0 });
                return Ok(());
            }
        }

        if para_open {
            // Continuation, possibly lazy.
            self.push_line(LeafLine { span: content, indent: 0 });
            return Ok(());
        }
        self.begin_block(matched, &mut was_blank)?;
        self.open_leaf(OpenKind::Paragraph, Some(LeafLine { span: content, indent: 0 }));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stack and leaf bookkeeping
    // -----------------------------------------------------------------------

    fn leaf_mode(&self) -> LeafMode {
        let Some(leaf) = &self.leaf else {
            return LeafMode::None;
        };
        match &leaf.kind {
            OpenKind::Paragraph => LeafMode::Paragraph {
                lines: leaf.lines.len(),
            },
            OpenKind::IndentedCode => LeafMode::IndentedCode,
            OpenKind::Fenced { ch, len, indent, .. } => LeafMode::Fenced {
                ch: *ch,
                len: *len,
                indent: *indent,
            },
            OpenKind::Html(kind) => LeafMode::Html(*kind),
            OpenKind::Table(_) => LeafMode::Table,
        }
    }

    fn leaf_is_paragraph(&self) -> bool {
        matches!(self.leaf_mode(), LeafMode::Paragraph { .. })
    }

    fn item_has_content(&self, idx: usize) -> bool {
        self.records.len() > self.stack[idx].record + 1
            || (idx + 1 == self.stack.len() && self.leaf.is_some())
    }

    fn open_container(&mut self, kind: FrameKind, record: Container) {
        self.records.push(Record::Open(record));
        self.stack.push(Frame {
            kind,
            record: self.records.len() - 1,
        });
    }

    /// Close the open leaf and every frame from index `keep` upward.
    fn close_frames(&mut self, keep: usize) -> Result<(), Error> {
        if keep >= self.stack.len() {
            return Ok(());
        }
        self.close_leaf();
        while self.stack.len() > keep {
            let frame = self
                .stack
                .pop()
                .ok_or(Error::Internal("container stack underflow"))?;
            if frame.kind == FrameKind::Document {
                return Err(Error::Internal("document frame closed"));
            }
            self.records.push(Record::Close);
        }
        Ok(())
    }

    /// Prepare for a new block inside the first `matched` frames. A blank
    /// line before it loosens the enclosing list.
    fn begin_block(&mut self, matched: usize, was_blank: &mut bool) -> Result<(), Error> {
        self.close_frames(matched)?;
        self.close_leaf();
        if std::mem::take(was_blank) {
            self.loosen(self.stack.len() - 1)?;
        }
        Ok(())
    }

    /// Mark the list owning frame `idx` (an item or the list itself) loose.
    fn loosen(&mut self, idx: usize) -> Result<(), Error> {
        let list = match self.stack[idx].kind {
            FrameKind::Item { .. } => idx - 1,
            FrameKind::List { .. } => idx,
            _ => return Ok(()),
        };
        match self.records.get_mut(self.stack[list].record) {
            Some(Record::Open(Container::List { loose, .. })) => {
                *loose = true;
                Ok(())
            }
            _ => Err(Error::Internal("list frame without list record")),
        }
    }

    fn open_leaf(&mut self, kind: OpenKind, first: Option<LeafLine>) {
        self.leaf = Some(OpenLeaf {
            kind,
            lines: first.into_iter().collect(),
        });
    }

    fn push_line(&mut self, line: LeafLine) {
        if let Some(leaf) = self.leaf.as_mut() {
            leaf.lines.push(line);
        }
    }

    fn close_leaf(&mut self) {
        let Some(leaf) = self.leaf.take() else {
            return;
        };
        let OpenLeaf { kind, mut lines } = leaf;
        let kind = match kind {
            OpenKind::Paragraph => {
                lines = self.strip_ref_defs(lines);
                if lines.is_empty() {
                    return;
                }
                LeafKind::Paragraph
            }
            OpenKind::IndentedCode => {
                while lines
                    .last()
                    .is_some_and(|l| l.span.slice(self.input).trim_matches([' ', '\t']).is_empty())
                {
                    lines.pop();
                }
                LeafKind::Code {
                    fence: None,
                    info: Span::default(),
                }
            }
            OpenKind::Fenced { ch, info, .. } => LeafKind::Code {
                fence: Some(ch),
                info,
            },
            OpenKind::Html(_) => LeafKind::Html,
            OpenKind::Table(aligns) => LeafKind::Table { aligns },
        };
        trace!("leaf {:?} with {} lines", kind, lines.len());
        self.records.push(Record::Leaf(Leaf { kind, lines }));
    }

    /// Consume reference definitions at the start of the open paragraph.
    /// Returns whether any paragraph text is left.
    fn take_paragraph_defs(&mut self) -> bool {
        let Some(mut leaf) = self.leaf.take() else {
            return false;
        };
        leaf.lines = self.strip_ref_defs(std::mem::take(&mut leaf.lines));
        if leaf.lines.is_empty() {
            return false;
        }
        self.leaf = Some(leaf);
        true
    }

    fn close_as_heading(&mut self, level: u8) {
        if let Some(leaf) = self.leaf.take() {
            self.records.push(Record::Leaf(Leaf {
                kind: LeafKind::Heading(level),
                lines: leaf.lines,
            }));
        }
    }

    fn strip_ref_defs(&mut self, mut lines: Vec<LeafLine>) -> Vec<LeafLine> {
        let starts_with_bracket = lines
            .first()
            .is_some_and(|l| self.input.as_bytes().get(l.span.start) == Some(&b'['));
        if !starts_with_bracket {
            return lines;
        }
        let text = join_lines(self.input, &lines);
        let mut pos = 0;
        let mut consumed = 0;
        while pos < text.len() {
            let Some(def) = scan_link_ref_def(&text, pos) else {
                break;
            };
            self.refs.insert(
                def.label.slice(&text),
                def.dest.slice(&text),
                def.title.map(|t| t.slice(&text)),
            );
            consumed += text[pos..def.end].matches('\n').count() + usize::from(def.end == text.len());
            pos = def.end;
        }
        lines.drain(..consumed.min(lines.len()));
        lines
    }

    // -----------------------------------------------------------------------
    // Block starts
    // -----------------------------------------------------------------------

    fn scan_list_marker(
        &self,
        cur: &LineCursor<'a>,
        indent: usize,
        para_here: bool,
    ) -> Option<ListMarker<'a>> {
        let mut c = *cur;
        c.skip_cols(indent);
        let rest = c.rest();
        let bytes = rest.as_bytes();
        let (ordered, mark, start, width) = match *bytes.first()? {
            b @ (b'-' | b'+' | b'*') => (false, b, 1, 1),
            b'0'..=b'9' => {
                let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
                if digits > 9 {
                    return None;
                }
                let delim = *bytes.get(digits)?;
                if delim != b'.' && delim != b')' {
                    return None;
                }
                let start: u32 = rest[..digits].parse().ok()?;
                (true, delim, start, digits + 1)
            }
            _ => return None,
        };
        c.advance(width);

        let blank_rest = c.is_blank();
        if !blank_rest && !matches!(c.peek(0), Some(b' ' | b'\t')) {
            return None;
        }
        if para_here && (blank_rest || (ordered && start != 1)) {
            return None;
        }

        let content_indent;
        if blank_rest {
            content_indent = indent + width + 1;
            c.skip_whitespace();
        } else {
            let (spaces, _) = c.indent();
            if spaces >= 5 {
                content_indent = indent + width + 1;
                c.skip_cols(1);
            } else {
                content_indent = indent + width + spaces;
                c.skip_cols(spaces);
            }
        }

        let mut task = None;
        if self.opts.contains(Options::TASK_LISTS) && !blank_rest {
            let r = c.rest().as_bytes();
            if r.len() >= 3
                && r[0] == b'['
                && r[2] == b']'
                && matches!(r[1], b' ' | b'x' | b'X')
                && matches!(r.get(3), None | Some(b' ' | b'\t'))
            {
                task = Some(TaskMark {
                    mark: r[1] as char,
                    offset: c.offset() + 1,
                });
                c.advance(3);
                c.skip_whitespace();
            }
        }

        Some(ListMarker {
            ordered,
            mark,
            start,
            content_indent,
            blank_rest,
            task,
            cursor: c,
        })
    }

    /// `#` to `######` followed by a space or the line end. Returns the
    /// level and the content range relative to `text`.
    fn atx_heading(&self, text: &str) -> Option<(u8, Span)> {
        let bytes = text.as_bytes();
        let level = bytes.iter().take_while(|&&b| b == b'#').count();
        if level == 0 || level > 6 {
            return None;
        }
        let permissive = self.opts.contains(Options::PERMISSIVE_ATX_HEADERS);
        if !permissive && !matches!(bytes.get(level), None | Some(b' ' | b'\t')) {
            return None;
        }
        let is_ws = |b: u8| b == b' ' || b == b'\t';
        let mut start = level;
        while start < bytes.len() && is_ws(bytes[start]) {
            start += 1;
        }
        let mut end = bytes.len();
        while end > start && is_ws(bytes[end - 1]) {
            end -= 1;
        }
        let mut hashes = end;
        while hashes > start && bytes[hashes - 1] == b'#' {
            hashes -= 1;
        }
        if hashes == start {
            end = start;
        } else if hashes < end && is_ws(bytes[hashes - 1]) {
            end = hashes;
            while end > start && is_ws(bytes[end - 1]) {
                end -= 1;
            }
        }
        Some((level as u8, Span::new(start, end)))
    }

    fn try_start_table(&mut self, delimiter: &str) -> bool {
        let Some(aligns) = table_delimiter(delimiter) else {
            return false;
        };
        let Some(leaf) = self.leaf.as_mut() else {
            return false;
        };
        let Some(header) = leaf.lines.first() else {
            return false;
        };
        let header_text = header.span.slice(self.input);
        if !header_text.contains('|') && !delimiter.contains('|') {
            return false;
        }
        if split_table_row(header_text).len() != aligns.len() {
            return false;
        }
        trace!("table with {} columns", aligns.len());
        leaf.kind = OpenKind::Table(aligns);
        true
    }
}

/// A code or HTML line starting at the cursor, with a partially consumed
/// tab reported as indentation.
fn verbatim_line(cur: &LineCursor<'_>, line: &Line<'_>) -> LeafLine {
    let partial = cur.partial_tab();
    let start = cur.offset() + usize::from(partial > 0);
    LeafLine {
        span: Span::new(start.min(line.span.end), line.span.end),
        indent: partial,
    }
}

fn join_lines(input: &str, lines: &[LeafLine]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.span.slice(input));
    }
    out
}

/// Three or more `*`, `-` or `_`, optionally separated by spaces or tabs.
pub(crate) fn is_thematic_break(text: &str) -> bool {
    let bytes = text.as_bytes();
    let Some(&ch) = bytes.first() else {
        return false;
    };
    if !matches!(ch, b'*' | b'-' | b'_') {
        return false;
    }
    let mut count = 0;
    for &b in bytes {
        match b {
            b' ' | b'\t' => {}
            b if b == ch => count += 1,
            _ => return false,
        }
    }
    count >= 3
}

/// `===` (level 1) or `---` (level 2) with optional trailing whitespace.
fn setext_level(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    let ch = *bytes.first()?;
    let level = match ch {
        b'=' => 1,
        b'-' => 2,
        _ => return None,
    };
    let run = bytes.iter().take_while(|&&b| b == ch).count();
    bytes[run..]
        .iter()
        .all(|&b| b == b' ' || b == b'\t')
        .then_some(level)
}

/// An opening code fence. Returns the fence character, its length and the
/// trimmed info string range relative to `text`.
fn fence_open(text: &str) -> Option<(u8, usize, Span)> {
    let bytes = text.as_bytes();
    let ch = *bytes.first()?;
    if ch != b'`' && ch != b'~' {
        return None;
    }
    let len = bytes.iter().take_while(|&&b| b == ch).count();
    if len < 3 {
        return None;
    }
    let is_ws = |b: u8| b == b' ' || b == b'\t';
    let mut start = len;
    while start < bytes.len() && is_ws(bytes[start]) {
        start += 1;
    }
    let mut end = bytes.len();
    while end > start && is_ws(bytes[end - 1]) {
        end -= 1;
    }
    if ch == b'`' && bytes[start..end].contains(&b'`') {
        return None;
    }
    Some((ch, len, Span::new(start, end)))
}

fn is_closing_fence(text: &str, ch: u8, len: usize) -> bool {
    let bytes = text.as_bytes();
    let run = bytes.iter().take_while(|&&b| b == ch).count();
    run >= len && bytes[run..].iter().all(|&b| b == b' ' || b == b'\t')
}

/// Cell ranges of a table row, relative to `row`, trimmed. Leading and
/// trailing pipes are optional; `\|` does not split.
pub(crate) fn split_table_row(row: &str) -> Vec<Span> {
    let bytes = row.as_bytes();
    let is_ws = |b: u8| b == b' ' || b == b'\t';
    let trim = |mut s: usize, mut e: usize| {
        while s < e && is_ws(bytes[s]) {
            s += 1;
        }
        while e > s && is_ws(bytes[e - 1]) {
            e -= 1;
        }
        Span::new(s, e)
    };

    let outer = trim(0, bytes.len());
    let (mut start, mut end) = (outer.start, outer.end);
    if start < end && bytes[start] == b'|' {
        start += 1;
    }
    if end > start && bytes[end - 1] == b'|' && !(end - 1 > start && bytes[end - 2] == b'\\') {
        end -= 1;
    }

    let mut cells = Vec::new();
    let mut cell_start = start;
    let mut i = start;
    while i < end {
        match bytes[i] {
            b'\\' => i += 2,
            b'|' => {
                cells.push(trim(cell_start, i));
                cell_start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    cells.push(trim(cell_start, end));
    cells
}

/// Column alignments from a delimiter row such as `| :-- | :-: | --: |`.
pub(crate) fn table_delimiter(text: &str) -> Option<Vec<Align>> {
    let cells = split_table_row(text);
    let mut aligns = Vec::with_capacity(cells.len());
    for cell in cells {
        let c = cell.slice(text).as_bytes();
        let left = c.first() == Some(&b':');
        let right = c.len() > 1 && c.last() == Some(&b':');
        let dashes = &c[usize::from(left)..c.len() - usize::from(right)];
        if dashes.is_empty() || !dashes.iter().all(|&b| b == b'-') {
            return None;
        }
        aligns.push(match (left, right) {
            (true, true) => Align::Center,
            (true, false) => Align::Left,
            (false, true) => Align::Right,
            (false, false) => Align::Default,
        });
    }
    Some(aligns)
}
