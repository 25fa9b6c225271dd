//! Inline assembler.
//!
//! Turns the text of one leaf block into a flat, doubly linked list of
//! pieces: text runs pointing back into the block buffer, plus enter/leave
//! markers for spans. Greedy constructs (escapes, code spans, math,
//! autolinks, raw HTML, entities, breaks) are resolved in a single
//! left-to-right pass; emphasis and links are resolved by the span scanner
//! as brackets close and once the pass ends.
//!
//! The list never reorders text. Resolving a span only inserts markers and
//! shrinks delimiter pieces, so emitting the list in order yields a
//! properly nested event stream.

use std::borrow::Cow;
use std::collections::HashMap;

use log::trace;
use memchr::{memchr, memchr2};

use crate::block::RefDefs;
use crate::error::{check, Error};
use crate::event::{Attribute, EventSink, Inline, TextKind};
use crate::options::Options;
use crate::scanner::{
    char_at, char_before, flanking, is_ascii_punct, is_punct, scan_autolink, scan_entity,
    scan_html_tag, scan_inline_link, scan_link_label, Delim, DelimStack, LINK_LABEL_MAX,
};
use crate::span::Span;

/// End-of-list marker for piece links.
const NIL: usize = usize::MAX;

/// Longest accepted wiki-link target, in bytes.
const WIKI_LINK_TARGET_MAX: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PieceKind {
    /// Text taken from the block buffer.
    Text(TextKind),
    /// Text that replaces buffer content (a newline inside a code span).
    Literal(TextKind, &'static str),
    Enter(usize),
    Leave(usize),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Piece {
    pub kind: PieceKind,
    pub span: Span,
    prev: usize,
    next: usize,
}

/// Where a link attribute comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrSource {
    Empty,
    Text(Span),
    /// Buffer text behind a literal scheme (`mailto:`, `http://`).
    Prefixed(&'static str, Span),
    DefDest(usize),
    DefTitle(usize),
}

/// Detail of a resolved span; attributes are built only at emission.
#[derive(Debug, Clone)]
pub(crate) enum SpanInfo {
    Plain(Inline<'static>),
    Link {
        image: bool,
        href: AttrSource,
        title: AttrSource,
        autolink: bool,
    },
    WikiLink {
        target: Span,
    },
}

/// The assembled pieces of one leaf block.
#[derive(Debug)]
pub(crate) struct PieceList {
    pieces: Vec<Piece>,
    spans: Vec<SpanInfo>,
    tail: usize,
}

impl PieceList {
    pub fn new() -> Self {
        // Index 0 is a sentinel head so every real piece has a predecessor.
        Self {
            pieces: vec![Piece {
                kind: PieceKind::Text(TextKind::Normal),
                span: Span::default(),
                prev: NIL,
                next: NIL,
            }],
            spans: Vec::new(),
            tail: 0,
        }
    }

    /// Append a piece at the end.
    pub fn push(&mut self, kind: PieceKind, span: Span) -> usize {
        self.link_after(self.tail, kind, span)
    }

    /// Insert a zero-width piece right after `at`.
    pub fn insert_after(&mut self, at: usize, kind: PieceKind) -> usize {
        self.link_after(at, kind, Span::default())
    }

    fn link_after(&mut self, at: usize, kind: PieceKind, span: Span) -> usize {
        let idx = self.pieces.len();
        let next = self.pieces[at].next;
        self.pieces.push(Piece {
            kind,
            span,
            prev: at,
            next,
        });
        self.pieces[at].next = idx;
        if next == NIL {
            self.tail = idx;
        } else {
            self.pieces[next].prev = idx;
        }
        idx
    }

    /// Insert a zero-width piece right before `at`.
    pub fn insert_before(&mut self, at: usize, kind: PieceKind) -> usize {
        let prev = self.pieces[at].prev;
        self.link_after(prev, kind, Span::default())
    }

    /// Give up `n` bytes at the end of a delimiter piece.
    pub fn shrink_end(&mut self, at: usize, n: usize) {
        self.pieces[at].span.end -= n;
    }

    /// Give up `n` bytes at the start of a delimiter piece.
    pub fn shrink_start(&mut self, at: usize, n: usize) {
        self.pieces[at].span.start += n;
    }

    /// Turn a bracket piece into a span marker.
    pub fn replace(&mut self, at: usize, kind: PieceKind) {
        let piece = &mut self.pieces[at];
        piece.kind = kind;
        piece.span = Span::new(piece.span.start, piece.span.start);
    }

    pub fn add_span(&mut self, info: SpanInfo) -> usize {
        self.spans.push(info);
        self.spans.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> + '_ {
        let mut cur = self.pieces[0].next;
        std::iter::from_fn(move || {
            if cur == NIL {
                return None;
            }
            let piece = &self.pieces[cur];
            cur = piece.next;
            Some(piece)
        })
    }

    fn build<'t>(&self, idx: usize, text: &'t str, refs: &'t RefDefs) -> Inline<'t> {
        let attr = |source: AttrSource| -> Attribute<'t> {
            match source {
                AttrSource::Empty => Attribute::empty(),
                AttrSource::Text(span) => Attribute::new(span.slice(text)),
                AttrSource::Prefixed(prefix, span) => Attribute::with_prefix(prefix, span.slice(text)),
                AttrSource::DefDest(def) => Attribute::new(&refs.get(def).dest),
                AttrSource::DefTitle(def) => refs
                    .get(def)
                    .title
                    .as_deref()
                    .map_or_else(Attribute::empty, Attribute::new),
            }
        };
        match &self.spans[idx] {
            SpanInfo::Plain(inline) => inline.clone(),
            SpanInfo::Link {
                image: true,
                href,
                title,
                ..
            } => Inline::Image {
                src: attr(*href),
                title: attr(*title),
            },
            SpanInfo::Link {
                href,
                title,
                autolink,
                ..
            } => Inline::Link {
                href: attr(*href),
                title: attr(*title),
                autolink: *autolink,
            },
            SpanInfo::WikiLink { target } => Inline::WikiLink {
                target: Attribute::new(target.slice(text)),
            },
        }
    }

    /// Deliver the pieces to `sink`. Adjacent normal text is merged into one
    /// run; empty runs are dropped.
    pub fn emit<S: EventSink>(
        &self,
        text: &str,
        refs: &RefDefs,
        opts: Options,
        sink: &mut S,
    ) -> Result<(), Error> {
        let mut open: Vec<Inline<'_>> = Vec::new();
        let mut pending: Option<Span> = None;

        for piece in self.iter() {
            if piece.kind == PieceKind::Text(TextKind::Normal) {
                if piece.span.is_empty() {
                    continue;
                }
                match pending {
                    Some(run) if run.end == piece.span.start => {
                        pending = Some(Span::new(run.start, piece.span.end));
                    }
                    prev => {
                        flush_normal(prev, text, opts, sink)?;
                        pending = Some(piece.span);
                    }
                }
                continue;
            }
            flush_normal(pending.take(), text, opts, sink)?;

            match piece.kind {
                PieceKind::Text(kind) => {
                    if !piece.span.is_empty() {
                        check(sink.text(kind, piece.span.slice(text)))?;
                    }
                }
                PieceKind::Literal(kind, s) => check(sink.text(kind, s))?,
                PieceKind::Enter(idx) => {
                    let inline = self.build(idx, text, refs);
                    check(sink.enter_span(&inline))?;
                    open.push(inline);
                }
                PieceKind::Leave(_) => {
                    let inline = open.pop().ok_or(Error::Internal("span leave without enter"))?;
                    check(sink.leave_span(&inline))?;
                }
            }
        }
        flush_normal(pending, text, opts, sink)?;

        if open.is_empty() {
            Ok(())
        } else {
            Err(Error::Internal("span left open"))
        }
    }
}

fn flush_normal<S: EventSink>(
    run: Option<Span>,
    text: &str,
    opts: Options,
    sink: &mut S,
) -> Result<(), Error> {
    let Some(run) = run else {
        return Ok(());
    };
    let s = run.slice(text);
    if opts.contains(Options::COLLAPSE_WHITESPACE) {
        check(sink.text(TextKind::Normal, &collapse_whitespace(s)))
    } else {
        check(sink.text(TextKind::Normal, s))
    }
}

fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let needs = bytes
        .windows(2)
        .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
        || bytes.iter().any(|&b| b.is_ascii_whitespace() && b != b' ');
    if !needs {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_ascii_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    Cow::Owned(out)
}

/// Assemble the inline pieces of `text`.
pub(crate) fn parse_inlines(text: &str, opts: Options, refs: &RefDefs) -> PieceList {
    let mut parser = InlineParser::new(text, opts, refs);
    parser.run(text.len());
    parser.finish()
}

struct InlineParser<'t, 'r> {
    text: &'t str,
    bytes: &'t [u8],
    opts: Options,
    refs: &'r RefDefs,
    pieces: PieceList,
    stack: DelimStack,
    pos: usize,
    /// Start of normal text not yet turned into a piece.
    text_start: usize,
    special: [bool; 256],
    /// Enter and leave pieces of open-ended autolinks, in creation order.
    autolinks: Vec<(usize, usize)>,
    /// Start of the last backtick run of each length, once a code span scan
    /// has reached the end of the text.
    tick_runs: HashMap<usize, usize>,
    ticks_scanned: bool,
}

impl<'t, 'r> InlineParser<'t, 'r> {
    fn new(text: &'t str, opts: Options, refs: &'r RefDefs) -> Self {
        let mut special = [false; 256];
        for &b in b"\\`<&\n\0*_[]!" {
            special[b as usize] = true;
        }
        if opts.contains(Options::STRIKETHROUGH) {
            special[b'~' as usize] = true;
        }
        if opts.contains(Options::LATEX_MATH_SPANS) {
            special[b'$' as usize] = true;
        }
        if opts.contains(Options::PERMISSIVE_EMAIL_AUTOLINKS) {
            special[b'@' as usize] = true;
        }
        if opts.contains(Options::PERMISSIVE_URL_AUTOLINKS) {
            for &b in b"hHfF" {
                special[b as usize] = true;
            }
        }
        if opts.contains(Options::PERMISSIVE_WWW_AUTOLINKS) {
            special[b'w' as usize] = true;
            special[b'W' as usize] = true;
        }
        Self {
            text,
            bytes: text.as_bytes(),
            opts,
            refs,
            pieces: PieceList::new(),
            stack: DelimStack::default(),
            pos: 0,
            text_start: 0,
            special,
            autolinks: Vec::new(),
            tick_runs: HashMap::new(),
            ticks_scanned: false,
        }
    }

    fn run(&mut self, end: usize) {
        while self.pos < end {
            match self.find_next_special(end) {
                Some(at) => self.pos = at,
                None => {
                    self.pos = end;
                    break;
                }
            }

            let parsed = match self.bytes[self.pos] {
                b'\\' => self.try_parse_escape(end),
                b'`' => self.parse_code_span(end),
                b'$' => self.parse_math(end),
                b'<' => self.try_parse_angle(end),
                b'&' => self.try_parse_entity(end),
                b'\n' => self.parse_line_break(end),
                b'\0' => self.parse_null(),
                b'*' | b'_' | b'~' => self.parse_delim_run(end),
                b'[' => self.parse_open_bracket(end),
                b'!' => self.try_parse_image_open(end),
                b']' => self.try_parse_close_bracket(end),
                b'@' => self.try_parse_email_autolink(end),
                _ => self.try_parse_url_autolink(end),
            };

            if !parsed {
                self.pos += 1;
            }
        }
    }

    fn finish(mut self) -> PieceList {
        self.flush(self.bytes.len());
        self.stack.process_emphasis(&mut self.pieces, 0, self.opts);
        self.pieces
    }

    #[inline]
    fn find_next_special(&self, end: usize) -> Option<usize> {
        self.bytes[self.pos..end]
            .iter()
            .position(|&b| self.special[b as usize])
            .map(|off| self.pos + off)
    }

    /// Turn pending normal text up to `upto` into a piece.
    #[inline]
    fn flush(&mut self, upto: usize) {
        if self.text_start < upto {
            self.pieces.push(
                PieceKind::Text(TextKind::Normal),
                Span::new(self.text_start, upto),
            );
        }
        self.text_start = upto;
    }

    /// Push a piece and continue after it.
    #[inline]
    fn push_at(&mut self, kind: PieceKind, span: Span) -> usize {
        self.flush(span.start);
        let idx = self.pieces.push(kind, span);
        self.pos = span.end;
        self.text_start = span.end;
        idx
    }

    /// Push `beg..end` as `kind`, with newlines reported as spaces and NULs
    /// split out.
    fn push_verbatim(&mut self, beg: usize, end: usize, kind: TextKind) {
        let mut i = beg;
        while i < end {
            match memchr2(b'\n', b'\0', &self.bytes[i..end]) {
                Some(off) => {
                    let at = i + off;
                    if at > i {
                        self.pieces.push(PieceKind::Text(kind), Span::new(i, at));
                    }
                    if self.bytes[at] == b'\n' {
                        self.pieces
                            .push(PieceKind::Literal(kind, " "), Span::new(at, at + 1));
                    } else {
                        self.pieces
                            .push(PieceKind::Text(TextKind::NullChar), Span::new(at, at + 1));
                    }
                    i = at + 1;
                }
                None => {
                    self.pieces.push(PieceKind::Text(kind), Span::new(i, end));
                    i = end;
                }
            }
        }
    }

    fn run_len(&self, from: usize, end: usize, ch: u8) -> usize {
        self.bytes[from..end].iter().take_while(|&&b| b == ch).count()
    }

    fn try_parse_escape(&mut self, end: usize) -> bool {
        let pos = self.pos;
        match self.bytes[..end].get(pos + 1) {
            Some(b'\n') => {
                self.flush(pos);
                self.push_at(PieceKind::Text(TextKind::HardBreak), Span::new(pos + 1, pos + 2));
                self.skip_line_indent(end);
                true
            }
            Some(&b) if is_ascii_punct(b) => {
                self.flush(pos);
                self.push_at(PieceKind::Text(TextKind::Normal), Span::new(pos + 1, pos + 2));
                true
            }
            _ => false,
        }
    }

    fn skip_line_indent(&mut self, end: usize) {
        while self.pos < end && matches!(self.bytes[self.pos], b' ' | b'\t') {
            self.pos += 1;
        }
        self.text_start = self.pos;
    }

    fn parse_code_span(&mut self, end: usize) -> bool {
        let start = self.pos;
        let n = self.run_len(start, end, b'`');
        let whole = end == self.bytes.len();
        let no_closer = self.tick_runs.get(&n).map_or(true, |&at| at <= start);
        if whole && self.ticks_scanned && no_closer {
            self.pos = start + n;
            return true;
        }

        let mut search = start + n;
        let close = loop {
            match memchr(b'`', &self.bytes[search..end]) {
                Some(off) => {
                    let at = search + off;
                    let m = self.run_len(at, end, b'`');
                    if whole {
                        let last = self.tick_runs.entry(m).or_insert(at);
                        *last = (*last).max(at);
                    }
                    if m == n {
                        break at;
                    }
                    search = at + m;
                }
                None => {
                    // No closer: the whole run is literal.
                    self.ticks_scanned |= whole;
                    self.pos = start + n;
                    return true;
                }
            }
        };

        let mut beg = start + n;
        let mut stop = close;
        let content = &self.bytes[beg..stop];
        let is_space = |b: &u8| *b == b' ' || *b == b'\n';
        if content.first().is_some_and(is_space)
            && content.last().is_some_and(is_space)
            && !content.iter().all(is_space)
        {
            beg += 1;
            stop -= 1;
        }

        self.flush(start);
        let span = self.pieces.add_span(SpanInfo::Plain(Inline::Code));
        self.pieces.push(PieceKind::Enter(span), Span::new(start, start));
        self.push_verbatim(beg, stop, TextKind::Code);
        self.pieces.push(PieceKind::Leave(span), Span::new(close, close));
        self.pos = close + n;
        self.text_start = self.pos;
        true
    }

    fn parse_math(&mut self, end: usize) -> bool {
        let start = self.pos;
        let n = self.run_len(start, end, b'$');
        let open_end = start + n;
        if n > 2 || (n == 1 && self.bytes[..end].get(open_end).map_or(true, u8::is_ascii_whitespace)) {
            self.pos = open_end;
            return true;
        }

        let mut search = open_end;
        let close = loop {
            let Some(off) = memchr(b'$', &self.bytes[search..end]) else {
                self.pos = open_end;
                return true;
            };
            let at = search + off;
            let m = self.run_len(at, end, b'$');
            let escaped = self.bytes[at - 1] == b'\\';
            let tight = n == 2 || !self.bytes[at - 1].is_ascii_whitespace();
            if m == n && at > open_end && !escaped && tight {
                break at;
            }
            search = at + m;
        };

        self.flush(start);
        let kind = if n == 2 {
            Inline::LatexMathDisplay
        } else {
            Inline::LatexMath
        };
        let span = self.pieces.add_span(SpanInfo::Plain(kind));
        self.pieces.push(PieceKind::Enter(span), Span::new(start, start));
        self.push_verbatim(open_end, close, TextKind::LatexMath);
        self.pieces.push(PieceKind::Leave(span), Span::new(close, close));
        self.pos = close + n;
        self.text_start = self.pos;
        true
    }

    fn try_parse_angle(&mut self, end: usize) -> bool {
        let bytes = &self.bytes[..end];
        let pos = self.pos;
        if let Some((inner, after, email)) = scan_autolink(bytes, pos) {
            let href = if email {
                AttrSource::Prefixed("mailto:", inner)
            } else {
                AttrSource::Text(inner)
            };
            self.push_autolink(pos, inner, href, after);
            return true;
        }
        if !self.opts.contains(Options::NO_HTML_SPANS) {
            if let Some(tag_end) = scan_html_tag(bytes, pos) {
                self.push_at(PieceKind::Text(TextKind::Html), Span::new(pos, tag_end));
                return true;
            }
        }
        false
    }

    /// Push an autolink span around `label` and continue at `after`.
    /// Returns the enter and leave pieces.
    fn push_autolink(
        &mut self,
        start: usize,
        label: Span,
        href: AttrSource,
        after: usize,
    ) -> (usize, usize) {
        self.flush(start);
        let span = self.pieces.add_span(SpanInfo::Link {
            image: false,
            href,
            title: AttrSource::Empty,
            autolink: true,
        });
        let enter = self.pieces.push(PieceKind::Enter(span), Span::new(start, start));
        self.pieces.push(PieceKind::Text(TextKind::Normal), label);
        let leave = self.pieces.push(PieceKind::Leave(span), Span::new(after, after));
        self.pos = after;
        self.text_start = after;
        (enter, leave)
    }

    /// Turn the open-ended autolinks created after piece `after` back into
    /// plain text. Links cannot contain links.
    fn demote_autolinks(&mut self, after: usize) {
        while let Some(&(enter, leave)) = self.autolinks.last() {
            if enter < after {
                break;
            }
            trace!("demote autolink piece {}", enter);
            self.pieces.replace(enter, PieceKind::Text(TextKind::Normal));
            self.pieces.replace(leave, PieceKind::Text(TextKind::Normal));
            self.autolinks.pop();
        }
    }

    fn try_parse_entity(&mut self, end: usize) -> bool {
        match scan_entity(&self.bytes[..end], self.pos) {
            Some(entity_end) => {
                self.push_at(PieceKind::Text(TextKind::Entity), Span::new(self.pos, entity_end));
                true
            }
            None => false,
        }
    }

    fn parse_line_break(&mut self, end: usize) -> bool {
        let pos = self.pos;
        let mut trimmed = pos;
        while trimmed > self.text_start && matches!(self.bytes[trimmed - 1], b' ' | b'\t') {
            trimmed -= 1;
        }
        let two_spaces = pos >= trimmed + 2 && self.bytes[pos - 2..pos] == *b"  ";
        let kind = if two_spaces || self.opts.contains(Options::HARD_SOFT_BREAKS) {
            TextKind::HardBreak
        } else {
            TextKind::SoftBreak
        };
        self.flush(trimmed);
        self.pieces.push(PieceKind::Text(kind), Span::new(pos, pos + 1));
        self.pos = pos + 1;
        self.skip_line_indent(end);
        true
    }

    fn parse_null(&mut self) -> bool {
        let pos = self.pos;
        self.push_at(PieceKind::Text(TextKind::NullChar), Span::new(pos, pos + 1));
        true
    }

    fn parse_delim_run(&mut self, end: usize) -> bool {
        let start = self.pos;
        let ch = self.bytes[start];
        let n = self.run_len(start, end, ch);
        if ch == b'~' && n > 2 {
            self.pos = start + n;
            return true;
        }

        let text = &self.text[..end];
        let (left, right) = flanking(text, start, start + n);
        let (can_open, can_close) = if ch == b'_' {
            (
                left && (!right || is_punct(char_before(text, start))),
                right && (!left || is_punct(char_at(text, start + n))),
            )
        } else {
            (left, right)
        };
        if !can_open && !can_close {
            self.pos = start + n;
            return true;
        }

        let piece = self.push_at(PieceKind::Text(TextKind::Normal), Span::new(start, start + n));
        self.stack.push_run(Delim {
            piece,
            ch,
            count: n,
            orig: n,
            can_open,
            can_close,
        });
        true
    }

    fn parse_open_bracket(&mut self, end: usize) -> bool {
        let pos = self.pos;
        if self.opts.contains(Options::WIKI_LINKS)
            && self.bytes[..end].get(pos + 1) == Some(&b'[')
            && self.try_parse_wiki_link(end)
        {
            return true;
        }
        let piece = self.push_at(PieceKind::Text(TextKind::Normal), Span::new(pos, pos + 1));
        self.stack.push_bracket(piece, false, pos + 1);
        true
    }

    fn try_parse_image_open(&mut self, end: usize) -> bool {
        let pos = self.pos;
        if self.bytes[..end].get(pos + 1) != Some(&b'[') {
            return false;
        }
        let piece = self.push_at(PieceKind::Text(TextKind::Normal), Span::new(pos, pos + 2));
        self.stack.push_bracket(piece, true, pos + 2);
        true
    }

    fn try_parse_close_bracket(&mut self, end: usize) -> bool {
        let start = self.pos;
        let Some(&opener) = self.stack.brackets.last() else {
            return false;
        };
        if !opener.active {
            self.stack.brackets.pop();
            return false;
        }

        let bytes = &self.bytes[..end];
        let after = start + 1;
        let mut target = None;

        if bytes.get(after) == Some(&b'(') {
            if let Some((dest, title, link_end)) = scan_inline_link(bytes, after) {
                let title = title.map_or(AttrSource::Empty, AttrSource::Text);
                target = Some((AttrSource::Text(dest), title, link_end));
            }
        }

        if target.is_none() {
            let own_label = Span::new(opener.text_start, start);
            let (label, link_end) = match scan_link_label(bytes, after) {
                Some((inner, label_end)) if !inner.is_empty() => (Some(inner), label_end),
                Some((_, label_end)) if !opener.bracket_after => (Some(own_label), label_end),
                None if !opener.bracket_after => (Some(own_label), after),
                _ => (None, after),
            };
            if let Some(label) = label.filter(|l| l.len() <= LINK_LABEL_MAX) {
                if let Some(def) = self.refs.lookup(label.slice(self.text)) {
                    target = Some((AttrSource::DefDest(def), AttrSource::DefTitle(def), link_end));
                }
            }
        }

        let Some((href, title, link_end)) = target else {
            self.stack.brackets.pop();
            return false;
        };

        trace!("link {}..{} image={}", opener.text_start, start, opener.image);
        self.flush(start);
        let span = self.pieces.add_span(SpanInfo::Link {
            image: opener.image,
            href,
            title,
            autolink: false,
        });
        self.pieces.replace(opener.piece, PieceKind::Enter(span));
        self.pieces.push(PieceKind::Leave(span), Span::new(start, start));
        self.demote_autolinks(opener.piece);
        self.stack
            .process_emphasis(&mut self.pieces, opener.delim_bottom, self.opts);
        self.stack.brackets.pop();
        if !opener.image {
            self.stack.deactivate_links();
        }
        self.pos = link_end;
        self.text_start = link_end;
        true
    }

    fn try_parse_wiki_link(&mut self, end: usize) -> bool {
        let start = self.pos;
        let bytes = &self.bytes[..end];
        let content_start = start + 2;

        let mut close = content_start;
        loop {
            match bytes.get(close) {
                None | Some(b'[') => return false,
                Some(b']') if bytes.get(close + 1) == Some(&b']') => break,
                Some(b']') => return false,
                Some(_) => close += 1,
            }
        }

        let (target, label) = match memchr(b'|', &bytes[content_start..close]) {
            Some(off) => (
                Span::new(content_start, content_start + off),
                Some(Span::new(content_start + off + 1, close)),
            ),
            None => (Span::new(content_start, close), None),
        };
        if target.is_empty()
            || target.len() > WIKI_LINK_TARGET_MAX
            || memchr(b'\n', &bytes[target.start..target.end]).is_some()
        {
            return false;
        }

        self.flush(start);
        let span = self.pieces.add_span(SpanInfo::WikiLink { target });
        let enter = self.pieces.push(PieceKind::Enter(span), Span::new(start, start));
        match label {
            Some(label) => {
                let delim_bottom = self.stack.delims.len();
                let bracket_bottom = self.stack.brackets.len();
                self.pos = label.start;
                self.text_start = label.start;
                self.run(label.end);
                self.flush(label.end);
                self.stack
                    .process_emphasis(&mut self.pieces, delim_bottom, self.opts);
                self.stack.brackets.truncate(bracket_bottom);
                self.demote_autolinks(enter);
            }
            None => {
                self.pieces.push(PieceKind::Text(TextKind::Normal), target);
            }
        }
        self.pieces.push(PieceKind::Leave(span), Span::new(close, close));
        self.pos = close + 2;
        self.text_start = self.pos;
        true
    }

    fn try_parse_email_autolink(&mut self, end: usize) -> bool {
        let bytes = &self.bytes[..end];
        let at = self.pos;
        let local_ok = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'-' | b'_');

        let mut start = at;
        while start > self.text_start && local_ok(bytes[start - 1]) {
            start -= 1;
        }
        if start == at {
            return false;
        }

        let mut i = at + 1;
        let mut dots = 0;
        while i < bytes.len() {
            match bytes[i] {
                b if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' => i += 1,
                b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_alphanumeric) => {
                    dots += 1;
                    i += 1;
                }
                _ => break,
            }
        }
        // A trailing `_` run that can close an open `_` emphasis belongs to
        // the emphasis, not the address.
        let underscore_open = self
            .stack
            .delims
            .iter()
            .any(|d| d.ch == b'_' && d.can_open && d.count > 0);
        if bytes[i - 1] == b'_' && underscore_open {
            while bytes[i - 1] == b'_' {
                i -= 1;
            }
        }
        if dots == 0 || matches!(bytes[i - 1], b'-' | b'_') {
            return false;
        }

        let label = Span::new(start, i);
        let pieces = self.push_autolink(start, label, AttrSource::Prefixed("mailto:", label), i);
        self.autolinks.push(pieces);
        true
    }

    fn try_parse_url_autolink(&mut self, end: usize) -> bool {
        let bytes = &self.bytes[..end];
        let pos = self.pos;
        if pos > 0 && !(bytes[pos - 1].is_ascii_whitespace() || matches!(bytes[pos - 1], b'*' | b'_' | b'~' | b'(')) {
            return false;
        }

        let rest = &bytes[pos..];
        let starts = |p: &[u8]| rest.len() >= p.len() && rest[..p.len()].eq_ignore_ascii_case(p);
        let url = self.opts.contains(Options::PERMISSIVE_URL_AUTOLINKS);
        let (prefix, domain_start, need_dot) = if url && starts(b"http://") {
            ("", pos + 7, false)
        } else if url && starts(b"https://") {
            ("", pos + 8, false)
        } else if url && starts(b"ftp://") {
            ("", pos + 6, false)
        } else if self.opts.contains(Options::PERMISSIVE_WWW_AUTOLINKS) && starts(b"www.") {
            ("http://", pos, true)
        } else {
            return false;
        };

        let Some(domain_end) = scan_domain(bytes, domain_start, need_dot) else {
            return false;
        };
        // Inside link text a `]` may close the bracket, so it ends the URL.
        let in_brackets = !self.stack.brackets.is_empty();
        let mut link_end = domain_end;
        while link_end < bytes.len()
            && !bytes[link_end].is_ascii_whitespace()
            && bytes[link_end] != b'<'
            && !(in_brackets && bytes[link_end] == b']')
        {
            link_end += 1;
        }
        let link_end = trim_autolink_tail(bytes, pos, link_end);
        if link_end <= domain_start {
            return false;
        }

        let label = Span::new(pos, link_end);
        let href = if prefix.is_empty() {
            AttrSource::Text(label)
        } else {
            AttrSource::Prefixed(prefix, label)
        };
        let pieces = self.push_autolink(pos, label, href, link_end);
        self.autolinks.push(pieces);
        true
    }
}

/// A dotted host name of ASCII alphanumerics, `-` and `_`. The last two
/// segments may not contain `_`.
fn scan_domain(bytes: &[u8], start: usize, need_dot: bool) -> Option<usize> {
    let seg_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'-' || b == b'_';
    let mut i = start;
    let mut dots = 0;
    let mut seg_len = 0;
    let (mut prev_underscore, mut cur_underscore) = (false, false);
    while i < bytes.len() {
        let b = bytes[i];
        if seg_byte(b) {
            cur_underscore |= b == b'_';
            seg_len += 1;
        } else if b == b'.' && seg_len > 0 && bytes.get(i + 1).is_some_and(|&n| seg_byte(n)) {
            dots += 1;
            prev_underscore = cur_underscore;
            cur_underscore = false;
            seg_len = 0;
        } else {
            break;
        }
        i += 1;
    }
    if seg_len == 0 || (need_dot && dots == 0) || prev_underscore || cur_underscore {
        return None;
    }
    Some(i)
}

/// Drop trailing punctuation, unbalanced `)` and a trailing entity-like
/// `&name;` from a permissive autolink.
fn trim_autolink_tail(bytes: &[u8], start: usize, mut end: usize) -> usize {
    while end > start {
        match bytes[end - 1] {
            b'?' | b'!' | b'.' | b',' | b':' | b'*' | b'_' | b'~' | b'\'' | b'"' => end -= 1,
            b')' => {
                let link = &bytes[start..end];
                let opens = link.iter().filter(|&&b| b == b'(').count();
                let closes = link.iter().filter(|&&b| b == b')').count();
                if closes > opens {
                    end -= 1;
                } else {
                    break;
                }
            }
            b';' => {
                let mut j = end - 1;
                while j > start && bytes[j - 1].is_ascii_alphanumeric() {
                    j -= 1;
                }
                if j > start && j < end - 1 && bytes[j - 1] == b'&' {
                    end = j - 1;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Recorder;
    use pretty_assertions::assert_eq;

    fn dump_with(text: &str, opts: Options, refs: &RefDefs) -> String {
        let pieces = parse_inlines(text, opts, refs);
        let mut rec = Recorder::new();
        pieces.emit(text, refs, opts, &mut rec).unwrap();
        rec.dump()
    }

    fn dump(text: &str) -> String {
        dump_with(text, Options::empty(), &RefDefs::default())
    }

    // ======================================================================
    // Emphasis
    // ======================================================================

    #[test]
    fn emphasis_and_strong() {
        assert_eq!(
            dump("*a* **b**"),
            "enter Emphasis\n  text Normal \"a\"\nleave Emphasis\ntext Normal \" \"\n\
             enter Strong\n  text Normal \"b\"\nleave Strong\n"
        );
    }

    #[test]
    fn triple_delimiters_nest_strong_inside_emphasis() {
        assert_eq!(
            dump("***a***"),
            "enter Emphasis\n  enter Strong\n    text Normal \"a\"\n  leave Strong\nleave Emphasis\n"
        );
    }

    #[test]
    fn unmatched_delimiters_stay_literal() {
        assert_eq!(
            dump("**a*"),
            "text Normal \"*\"\nenter Emphasis\n  text Normal \"a\"\nleave Emphasis\n"
        );
        assert_eq!(dump("a * b"), "text Normal \"a * b\"\n");
    }

    #[test]
    fn intraword_underscore_does_not_emphasize() {
        assert_eq!(dump("snake_case_name"), "text Normal \"snake_case_name\"\n");
    }

    #[test]
    fn underline_option_changes_underscore() {
        let out = dump_with("_a_ *b*", Options::UNDERLINE, &RefDefs::default());
        assert_eq!(
            out,
            "enter Underline\n  text Normal \"a\"\nleave Underline\ntext Normal \" \"\n\
             enter Emphasis\n  text Normal \"b\"\nleave Emphasis\n"
        );
    }

    #[test]
    fn strikethrough_needs_equal_runs() {
        let opts = Options::STRIKETHROUGH;
        assert_eq!(
            dump_with("~~a~~", opts, &RefDefs::default()),
            "enter Strikethrough\n  text Normal \"a\"\nleave Strikethrough\n"
        );
        assert_eq!(dump_with("~~a~", opts, &RefDefs::default()), "text Normal \"~~a~\"\n");
        assert_eq!(dump("~~a~~"), "text Normal \"~~a~~\"\n");
    }

    // ======================================================================
    // Code spans, escapes, entities, breaks
    // ======================================================================

    #[test]
    fn code_span_strips_one_space() {
        assert_eq!(
            dump("`` `a` ``"),
            "enter Code\n  text Code \"`a`\"\nleave Code\n"
        );
        assert_eq!(
            dump("`a\nb`"),
            "enter Code\n  text Code \"a\"\n  text Code \" \"\n  text Code \"b\"\nleave Code\n"
        );
        assert_eq!(dump("``a`"), "text Normal \"``a`\"\n");
    }

    #[test]
    fn code_span_beats_emphasis() {
        assert_eq!(
            dump("*a `*` b"),
            "text Normal \"*a \"\nenter Code\n  text Code \"*\"\nleave Code\ntext Normal \" b\"\n"
        );
    }

    #[test]
    fn unmatched_backtick_runs_stay_literal() {
        let text: String = (1..=64).map(|n| format!("{}x", "`".repeat(n))).collect();
        assert_eq!(dump(&text), format!("text Normal {:?}\n", text));
        assert_eq!(
            dump("`a `` b `` c"),
            "text Normal \"`a \"\nenter Code\n  text Code \"b\"\nleave Code\ntext Normal \" c\"\n"
        );
        assert_eq!(
            dump("`` a ` b ` c"),
            "text Normal \"`` a \"\nenter Code\n  text Code \"b\"\nleave Code\ntext Normal \" c\"\n"
        );
    }

    #[test]
    fn escapes_and_entities() {
        assert_eq!(
            dump(r"\*a\* &amp; &bogus"),
            "text Normal \"*a\"\ntext Normal \"* \"\ntext Entity \"&amp;\"\ntext Normal \" &bogus\"\n"
        );
    }

    #[test]
    fn line_breaks() {
        assert_eq!(
            dump("a  \nb\nc\\\nd"),
            "text Normal \"a\"\ntext HardBreak \"\\n\"\ntext Normal \"b\"\ntext SoftBreak \"\\n\"\n\
             text Normal \"c\"\ntext HardBreak \"\\n\"\ntext Normal \"d\"\n"
        );
        let hard = dump_with("a\nb", Options::HARD_SOFT_BREAKS, &RefDefs::default());
        assert_eq!(hard, "text Normal \"a\"\ntext HardBreak \"\\n\"\ntext Normal \"b\"\n");
    }

    #[test]
    fn null_bytes_are_split_out() {
        assert_eq!(
            dump("a\0b"),
            "text Normal \"a\"\ntext NullChar \"\\0\"\ntext Normal \"b\"\n"
        );
    }

    #[test]
    fn collapse_whitespace() {
        let out = dump_with("a \t  b", Options::COLLAPSE_WHITESPACE, &RefDefs::default());
        assert_eq!(out, "text Normal \"a b\"\n");
    }

    // ======================================================================
    // Links
    // ======================================================================

    #[test]
    fn inline_link() {
        assert_eq!(
            dump("[x](y \"t\")"),
            "enter Link(\"y\", title \"t\")\n  text Normal \"x\"\nleave Link(\"y\", title \"t\")\n"
        );
    }

    #[test]
    fn unfinished_link_is_literal() {
        assert_eq!(dump("[x]("), "text Normal \"[x](\"\n");
    }

    #[test]
    fn reference_links() {
        let mut refs = RefDefs::default();
        refs.insert("Foo", "/url", Some("T"));
        let opts = Options::empty();
        let link = "enter Link(\"/url\", title \"T\")\n  text Normal \"foo\"\nleave Link(\"/url\", title \"T\")\n";
        assert_eq!(dump_with("[foo]", opts, &refs), link);
        assert_eq!(dump_with("[foo][]", opts, &refs), link);
        assert_eq!(
            dump_with("[x][FOO]", opts, &refs),
            "enter Link(\"/url\", title \"T\")\n  text Normal \"x\"\nleave Link(\"/url\", title \"T\")\n"
        );
        assert_eq!(dump_with("[x][bar]", opts, &refs), "text Normal \"[x][bar]\"\n");
    }

    #[test]
    fn links_do_not_nest() {
        assert_eq!(
            dump("[a [b](c)](d)"),
            "text Normal \"[a \"\nenter Link(\"c\")\n  text Normal \"b\"\nleave Link(\"c\")\ntext Normal \"](d)\"\n"
        );
    }

    #[test]
    fn emphasis_does_not_cross_link_boundary() {
        assert_eq!(
            dump("*[a*](b)"),
            "text Normal \"*\"\nenter Link(\"b\")\n  text Normal \"a*\"\nleave Link(\"b\")\n"
        );
    }

    #[test]
    fn image_with_alt_text() {
        assert_eq!(
            dump("![a *b*](src)"),
            "enter Image(\"src\")\n  text Normal \"a \"\n  enter Emphasis\n    text Normal \"b\"\n  \
             leave Emphasis\nleave Image(\"src\")\n"
        );
    }

    // ======================================================================
    // Autolinks, raw HTML, extensions
    // ======================================================================

    #[test]
    fn angle_autolinks() {
        assert_eq!(
            dump("<http://a.b>"),
            "enter Link(\"http://a.b\", autolink)\n  text Normal \"http://a.b\"\nleave Link(\"http://a.b\", autolink)\n"
        );
        assert_eq!(
            dump("<me@x.org>"),
            "enter Link(\"mailto:me@x.org\", autolink)\n  text Normal \"me@x.org\"\nleave Link(\"mailto:me@x.org\", autolink)\n"
        );
    }

    #[test]
    fn raw_html_spans() {
        assert_eq!(
            dump("a <b>c</b>"),
            "text Normal \"a \"\ntext Html \"<b>\"\ntext Normal \"c\"\ntext Html \"</b>\"\n"
        );
        let out = dump_with("a <b>", Options::NO_HTML_SPANS, &RefDefs::default());
        assert_eq!(out, "text Normal \"a <b>\"\n");
    }

    #[test]
    fn permissive_autolinks() {
        let opts = Options::PERMISSIVE_AUTOLINKS;
        let refs = RefDefs::default();
        assert_eq!(
            dump_with("see www.example.com.", opts, &refs),
            "text Normal \"see \"\nenter Link(\"http://www.example.com\", autolink)\n  \
             text Normal \"www.example.com\"\nleave Link(\"http://www.example.com\", autolink)\n\
             text Normal \".\"\n"
        );
        assert_eq!(
            dump_with("(https://a.org/x_(y))", opts, &refs),
            "text Normal \"(\"\nenter Link(\"https://a.org/x_(y)\", autolink)\n  \
             text Normal \"https://a.org/x_(y)\"\nleave Link(\"https://a.org/x_(y)\", autolink)\n\
             text Normal \")\"\n"
        );
        assert_eq!(
            dump_with("mail me@x.org", opts, &refs),
            "text Normal \"mail \"\nenter Link(\"mailto:me@x.org\", autolink)\n  \
             text Normal \"me@x.org\"\nleave Link(\"mailto:me@x.org\", autolink)\n"
        );
        assert_eq!(dump_with("ahttp://a.org", opts, &refs), "text Normal \"ahttp://a.org\"\n");
    }

    #[test]
    fn bracketed_links_absorb_permissive_autolinks() {
        let opts = Options::PERMISSIVE_AUTOLINKS;
        let refs = RefDefs::default();
        assert_eq!(
            dump_with("[see http://a.com](http://x)", opts, &refs),
            "enter Link(\"http://x\")\n  text Normal \"see http://a.com\"\nleave Link(\"http://x\")\n"
        );
        assert_eq!(
            dump_with("[a@b.com](http://x)", opts, &refs),
            "enter Link(\"http://x\")\n  text Normal \"a@b.com\"\nleave Link(\"http://x\")\n"
        );
        assert_eq!(
            dump_with("![x http://a.com](i.png)", opts, &refs),
            "enter Image(\"i.png\")\n  text Normal \"x http://a.com\"\nleave Image(\"i.png\")\n"
        );
        // Without a destination the bracket stays literal and the autolink
        // survives.
        assert_eq!(
            dump_with("[see http://a.com]", opts, &refs),
            "text Normal \"[see \"\nenter Link(\"http://a.com\", autolink)\n  \
             text Normal \"http://a.com\"\nleave Link(\"http://a.com\", autolink)\n\
             text Normal \"]\"\n"
        );
    }

    #[test]
    fn email_autolink_inside_underscore_emphasis() {
        let opts = Options::PERMISSIVE_AUTOLINKS;
        let refs = RefDefs::default();
        assert_eq!(
            dump_with("_foo@bar.com_", opts, &refs),
            "enter Emphasis\n  enter Link(\"mailto:foo@bar.com\", autolink)\n    \
             text Normal \"foo@bar.com\"\n  leave Link(\"mailto:foo@bar.com\", autolink)\n\
             leave Emphasis\n"
        );
        assert_eq!(dump_with("a.b-c_d@a.b_", opts, &refs), "text Normal \"a.b-c_d@a.b_\"\n");
    }

    #[test]
    fn math_spans() {
        let opts = Options::LATEX_MATH_SPANS;
        let refs = RefDefs::default();
        assert_eq!(
            dump_with("$a*b$ $$c$$", opts, &refs),
            "enter LatexMath\n  text LatexMath \"a*b\"\nleave LatexMath\ntext Normal \" \"\n\
             enter LatexMathDisplay\n  text LatexMath \"c\"\nleave LatexMathDisplay\n"
        );
        assert_eq!(dump_with("$ a$", opts, &refs), "text Normal \"$ a$\"\n");
        assert_eq!(dump("$a$"), "text Normal \"$a$\"\n");
    }

    #[test]
    fn wiki_links() {
        let opts = Options::WIKI_LINKS;
        let refs = RefDefs::default();
        assert_eq!(
            dump_with("[[Page]]", opts, &refs),
            "enter WikiLink(\"Page\")\n  text Normal \"Page\"\nleave WikiLink(\"Page\")\n"
        );
        assert_eq!(
            dump_with("[[Page|the *page*]]", opts, &refs),
            "enter WikiLink(\"Page\")\n  text Normal \"the \"\n  enter Emphasis\n    text Normal \"page\"\n  \
             leave Emphasis\nleave WikiLink(\"Page\")\n"
        );
        assert_eq!(dump_with("[[]]", opts, &refs), "text Normal \"[[]]\"\n");
        assert_eq!(
            dump_with("[[Page|see www.a.com]]", opts | Options::PERMISSIVE_AUTOLINKS, &refs),
            "enter WikiLink(\"Page\")\n  text Normal \"see www.a.com\"\nleave WikiLink(\"Page\")\n"
        );
    }

    #[test]
    fn autolink_tail_trimming() {
        assert_eq!(trim_autolink_tail(b"a.b/c?!", 0, 7), 5);
        assert_eq!(trim_autolink_tail(b"a.b/c&amp;", 0, 10), 5);
        assert_eq!(trim_autolink_tail(b"a.b/(c)", 0, 7), 7);
        assert_eq!(trim_autolink_tail(b"a.b/c))", 0, 7), 5);
        assert_eq!(scan_domain(b"www.a_b.c", 0, true), None);
        assert_eq!(scan_domain(b"localhost/x", 0, false), Some(9));
        assert_eq!(scan_domain(b"localhost", 0, true), None);
    }
}
