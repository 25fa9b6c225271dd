//! Span scanner: delimiter bookkeeping, emphasis pairing, and the small
//! grammars inline parsing depends on (entities, link destinations, titles,
//! labels, autolinks, raw HTML tags, reference definitions).
//!
//! Delimiters live in a flat `Vec` for the duration of one leaf block.
//! Pairing never moves text around: it shrinks the opener and closer text
//! pieces and inserts enter/leave pieces next to them in the
//! [`PieceList`], so the result is always properly nested.

use log::trace;
use memchr::memmem;

use crate::event::Inline;
use crate::inline::{PieceKind, PieceList, SpanInfo};
use crate::options::Options;
use crate::span::Span;

/// Deepest parenthesis nesting accepted inside a link destination.
pub(crate) const LINK_MAX_NESTED_PARENS: usize = 32;

/// Longest accepted link label, in bytes.
pub(crate) const LINK_LABEL_MAX: usize = 999;

// ---------------------------------------------------------------------------
// Character classes
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn is_ascii_punct(b: u8) -> bool {
    b.is_ascii_punctuation()
}

/// Unicode whitespace for flanking purposes; the text boundary counts as
/// whitespace.
#[inline]
pub(crate) fn is_ws(c: Option<char>) -> bool {
    c.map_or(true, char::is_whitespace)
}

/// Punctuation for flanking purposes. Non-ASCII symbols count too.
#[inline]
pub(crate) fn is_punct(c: Option<char>) -> bool {
    match c {
        Some(c) if c.is_ascii() => c.is_ascii_punctuation(),
        Some(c) => !c.is_alphanumeric() && !c.is_whitespace(),
        None => false,
    }
}

#[inline]
pub(crate) fn char_before(text: &str, pos: usize) -> Option<char> {
    text[..pos].chars().next_back()
}

#[inline]
pub(crate) fn char_at(text: &str, pos: usize) -> Option<char> {
    text.get(pos..).and_then(|s| s.chars().next())
}

/// Left- and right-flanking status of the delimiter run `text[start..end]`.
pub(crate) fn flanking(text: &str, start: usize, end: usize) -> (bool, bool) {
    let prev = char_before(text, start);
    let next = char_at(text, end);
    let left = !is_ws(next) && (!is_punct(next) || is_ws(prev) || is_punct(prev));
    let right = !is_ws(prev) && (!is_punct(prev) || is_ws(next) || is_punct(next));
    (left, right)
}

#[inline]
fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\n') {
        pos += 1;
    }
    pos
}

#[inline]
fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
        pos += 1;
    }
    pos
}

// ---------------------------------------------------------------------------
// Small grammars
// ---------------------------------------------------------------------------

/// Entity reference at `pos` (`&name;`, `&#123;`, `&#x1F;`). Returns the
/// end offset, past the `;`.
pub(crate) fn scan_entity(bytes: &[u8], pos: usize) -> Option<usize> {
    let rest = bytes.get(pos + 1..)?;
    let (digits, min, max, hex) = match rest.first()? {
        b'#' => match rest.get(1)? {
            b'x' | b'X' => (&rest[2..], 1, 6, true),
            _ => (&rest[1..], 1, 7, false),
        },
        b if b.is_ascii_alphabetic() => (rest, 2, 48, false),
        _ => return None,
    };
    let named = rest[0] != b'#';
    let len = digits
        .iter()
        .take_while(|b| {
            if named {
                b.is_ascii_alphanumeric()
            } else if hex {
                b.is_ascii_hexdigit()
            } else {
                b.is_ascii_digit()
            }
        })
        .count();
    if len < min || len > max || digits.get(len) != Some(&b';') {
        return None;
    }
    let consumed = rest.len() - digits.len() + len + 1;
    Some(pos + 1 + consumed)
}

/// Link destination starting at `pos`. Returns the destination content
/// (without angle brackets) and the end offset.
pub(crate) fn scan_link_destination(bytes: &[u8], pos: usize) -> Option<(Span, usize)> {
    if bytes.get(pos) == Some(&b'<') {
        let mut i = pos + 1;
        while i < bytes.len() {
            match bytes[i] {
                b'>' => return Some((Span::new(pos + 1, i), i + 1)),
                b'\n' | b'<' => return None,
                b'\\' if i + 1 < bytes.len() && is_ascii_punct(bytes[i + 1]) => i += 2,
                _ => i += 1,
            }
        }
        return None;
    }

    let mut depth = 0usize;
    let mut i = pos;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() && is_ascii_punct(bytes[i + 1]) => {
                i += 2;
                continue;
            }
            b'(' => {
                depth += 1;
                if depth > LINK_MAX_NESTED_PARENS {
                    return None;
                }
            }
            b')' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            b if b <= b' ' || b == 0x7f => break,
            _ => {}
        }
        i += 1;
    }
    if i == pos || depth != 0 {
        return None;
    }
    Some((Span::new(pos, i), i))
}

/// Link title starting at `pos` (`"..."`, `'...'` or `(...)`).
pub(crate) fn scan_link_title(bytes: &[u8], pos: usize) -> Option<(Span, usize)> {
    let close = match bytes.get(pos)? {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let mut i = pos + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() && is_ascii_punct(bytes[i + 1]) => i += 2,
            b if b == close => return Some((Span::new(pos + 1, i), i + 1)),
            b'(' if close == b')' => return None,
            b'\n' => {
                // No blank line inside a title.
                let next = skip_spaces(bytes, i + 1);
                if bytes.get(next) == Some(&b'\n') {
                    return None;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Link label `[...]` starting at `pos`. Returns the inner span and the end
/// offset past `]`. The inner span may be empty.
pub(crate) fn scan_link_label(bytes: &[u8], pos: usize) -> Option<(Span, usize)> {
    if bytes.get(pos) != Some(&b'[') {
        return None;
    }
    let mut i = pos + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() && is_ascii_punct(bytes[i + 1]) => i += 2,
            b'[' => return None,
            b']' => {
                if i - pos - 1 > LINK_LABEL_MAX {
                    return None;
                }
                return Some((Span::new(pos + 1, i), i + 1));
            }
            _ => i += 1,
        }
    }
    None
}

/// Inline link tail `(dest "title")` starting at the `(`.
pub(crate) fn scan_inline_link(bytes: &[u8], pos: usize) -> Option<(Span, Option<Span>, usize)> {
    debug_assert_eq!(bytes.get(pos), Some(&b'('));
    let i = skip_ws(bytes, pos + 1);
    if bytes.get(i) == Some(&b')') {
        return Some((Span::new(i, i), None, i + 1));
    }
    let (dest, after_dest) = scan_link_destination(bytes, i)?;
    let j = skip_ws(bytes, after_dest);
    if bytes.get(j) == Some(&b')') {
        return Some((dest, None, j + 1));
    }
    if j == after_dest {
        return None;
    }
    let (title, after_title) = scan_link_title(bytes, j)?;
    let k = skip_ws(bytes, after_title);
    if bytes.get(k) == Some(&b')') {
        Some((dest, Some(title), k + 1))
    } else {
        None
    }
}

/// A link reference definition found at the start of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawRefDef {
    pub label: Span,
    pub dest: Span,
    pub title: Option<Span>,
    /// Offset just past the definition's last line.
    pub end: usize,
}

/// Parse `[label]: dest "title"` at `pos`. The definition must end at a
/// line end.
pub(crate) fn scan_link_ref_def(text: &str, pos: usize) -> Option<RawRefDef> {
    let bytes = text.as_bytes();
    let (label, after_label) = scan_link_label(bytes, pos)?;
    if label.slice(text).trim().is_empty() || bytes.get(after_label) != Some(&b':') {
        return None;
    }
    let dest_start = skip_ws(bytes, after_label + 1);
    let (dest, after_dest) = match scan_link_destination(bytes, dest_start) {
        Some(found) => found,
        None => return None,
    };

    let line_end = |at: usize| -> Option<usize> {
        let e = skip_spaces(bytes, at);
        match bytes.get(e) {
            None => Some(e),
            Some(b'\n') => Some(e + 1),
            _ => None,
        }
    };

    let title_start = skip_ws(bytes, after_dest);
    if title_start > after_dest {
        if let Some((title, after_title)) = scan_link_title(bytes, title_start) {
            if let Some(end) = line_end(after_title) {
                return Some(RawRefDef {
                    label,
                    dest,
                    title: Some(title),
                    end,
                });
            }
        }
    }
    let end = line_end(after_dest)?;
    Some(RawRefDef {
        label,
        dest,
        title: None,
        end,
    })
}

/// Normalize a link label for matching: case-fold and collapse whitespace.
pub(crate) fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for (i, word) in label.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(word);
    }
    // Round-tripping through upper case folds `ß` and `ẞ` together.
    out.to_lowercase().to_uppercase().to_lowercase()
}

/// `<scheme:...>` or `<user@host>` at `pos`. Returns the inner span, the end
/// offset and whether it is an e-mail autolink.
pub(crate) fn scan_autolink(bytes: &[u8], pos: usize) -> Option<(Span, usize, bool)> {
    let start = pos + 1;
    if let Some(end) = scan_uri_autolink(bytes, start) {
        return Some((Span::new(start, end), end + 1, false));
    }
    let end = scan_email_autolink(bytes, start)?;
    Some((Span::new(start, end), end + 1, true))
}

fn scan_uri_autolink(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    if !bytes.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    i += 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'+' | b'.' | b'-')) {
        i += 1;
    }
    let scheme_len = i - start;
    if !(2..=32).contains(&scheme_len) || bytes.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    while i < bytes.len() {
        match bytes[i] {
            b'>' => return Some(i),
            b'<' => return None,
            b if b <= b' ' || b == 0x7f => return None,
            _ => i += 1,
        }
    }
    None
}

fn scan_email_autolink(bytes: &[u8], start: usize) -> Option<usize> {
    const LOCAL_EXTRA: &[u8] = b".!#$%&'*+/=?^_`{|}~-";
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || LOCAL_EXTRA.contains(&bytes[i])) {
        i += 1;
    }
    if i == start || bytes.get(i) != Some(&b'@') {
        return None;
    }
    i += 1;
    loop {
        let label_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        let label = &bytes[label_start..i];
        if label.is_empty()
            || label.len() > 63
            || label[0] == b'-'
            || label[label.len() - 1] == b'-'
        {
            return None;
        }
        match bytes.get(i) {
            Some(b'.') => i += 1,
            Some(b'>') => return Some(i),
            _ => return None,
        }
    }
}

/// Raw inline HTML at `pos` (which holds `<`). Returns the end offset.
pub(crate) fn scan_html_tag(bytes: &[u8], pos: usize) -> Option<usize> {
    let rest = &bytes[pos..];
    if rest.starts_with(b"<!--") {
        if rest.starts_with(b"<!-->") {
            return Some(pos + 5);
        }
        if rest.starts_with(b"<!--->") {
            return Some(pos + 6);
        }
        return memmem::find(&rest[4..], b"-->").map(|i| pos + 4 + i + 3);
    }
    if rest.starts_with(b"<?") {
        return memmem::find(&rest[2..], b"?>").map(|i| pos + 2 + i + 2);
    }
    if rest.starts_with(b"<![CDATA[") {
        return memmem::find(&rest[9..], b"]]>").map(|i| pos + 9 + i + 3);
    }
    if rest.starts_with(b"<!") && rest.get(2).is_some_and(u8::is_ascii_alphabetic) {
        return memchr::memchr(b'>', &rest[2..]).map(|i| pos + 2 + i + 1);
    }
    if rest.starts_with(b"</") {
        let mut i = scan_tag_name(bytes, pos + 2)?;
        i = skip_ws(bytes, i);
        return (bytes.get(i) == Some(&b'>')).then_some(i + 1);
    }
    scan_open_tag(bytes, pos)
}

fn scan_tag_name(bytes: &[u8], pos: usize) -> Option<usize> {
    if !bytes.get(pos)?.is_ascii_alphabetic() {
        return None;
    }
    let mut i = pos + 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
        i += 1;
    }
    Some(i)
}

fn scan_open_tag(bytes: &[u8], pos: usize) -> Option<usize> {
    let mut i = scan_tag_name(bytes, pos + 1)?;
    loop {
        let after_ws = skip_ws(bytes, i);
        match bytes.get(after_ws)? {
            b'>' => return Some(after_ws + 1),
            b'/' => return (bytes.get(after_ws + 1) == Some(&b'>')).then_some(after_ws + 2),
            _ => {}
        }
        if after_ws == i {
            return None;
        }
        // attribute name
        let b = *bytes.get(after_ws)?;
        if !(b.is_ascii_alphabetic() || b == b'_' || b == b':') {
            return None;
        }
        i = after_ws + 1;
        while i < bytes.len()
            && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'.' | b':' | b'-'))
        {
            i += 1;
        }
        // optional value
        let eq = skip_ws(bytes, i);
        if bytes.get(eq) == Some(&b'=') {
            let v = skip_ws(bytes, eq + 1);
            match *bytes.get(v)? {
                q @ (b'"' | b'\'') => {
                    let close = memchr::memchr(q, &bytes[v + 1..])?;
                    i = v + 1 + close + 1;
                }
                _ => {
                    let mut e = v;
                    while e < bytes.len()
                        && !matches!(bytes[e], b' ' | b'\t' | b'\n' | b'"' | b'\'' | b'=' | b'<' | b'>' | b'`')
                    {
                        e += 1;
                    }
                    if e == v {
                        return None;
                    }
                    i = e;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delimiter and bracket stacks
// ---------------------------------------------------------------------------

/// A run of `*`, `_` or `~` that may open and/or close a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delim {
    /// Text piece holding the run's remaining characters.
    pub piece: usize,
    pub ch: u8,
    /// Characters not yet consumed by pairing; zero once removed.
    pub count: usize,
    /// Run length as scanned.
    pub orig: usize,
    pub can_open: bool,
    pub can_close: bool,
}

/// An unmatched `[` or `![`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bracket {
    /// Text piece holding `[` or `![`.
    pub piece: usize,
    pub image: bool,
    /// Cleared once a link closes after it (links do not nest).
    pub active: bool,
    /// Another bracket opened after this one.
    pub bracket_after: bool,
    /// Delimiter stack height when the bracket was pushed.
    pub delim_bottom: usize,
    /// Offset of the first byte of the link text.
    pub text_start: usize,
}

/// Delimiters and brackets awaiting resolution for one leaf block.
#[derive(Debug, Default)]
pub(crate) struct DelimStack {
    pub delims: Vec<Delim>,
    pub brackets: Vec<Bracket>,
}

impl DelimStack {
    pub fn push_run(&mut self, delim: Delim) {
        self.delims.push(delim);
    }

    pub fn push_bracket(&mut self, piece: usize, image: bool, text_start: usize) {
        if let Some(prev) = self.brackets.last_mut() {
            prev.bracket_after = true;
        }
        self.brackets.push(Bracket {
            piece,
            image,
            active: true,
            bracket_after: false,
            delim_bottom: self.delims.len(),
            text_start,
        });
    }

    /// After a link closes, no earlier `[` may form a link.
    pub fn deactivate_links(&mut self) {
        for bracket in self.brackets.iter_mut().filter(|b| !b.image) {
            bracket.active = false;
        }
    }

    /// Pair every delimiter above `bottom`, then drop them all; whatever is
    /// left unpaired stays in the piece list as literal text.
    pub fn process_emphasis(&mut self, pieces: &mut PieceList, bottom: usize, opts: Options) {
        if bottom > self.delims.len() {
            // Nothing was pushed above the bracket; the stack is intact.
            return;
        }
        let mut openers_bottom = [[bottom; 6]; 3];
        let mut closer = bottom;

        while closer < self.delims.len() {
            let c = self.delims[closer];
            if !c.can_close || c.count == 0 {
                closer += 1;
                continue;
            }
            let class = delim_class(c.ch);
            let key = usize::from(c.can_open) * 3 + c.orig % 3;
            let lower = openers_bottom[class][key].max(bottom);

            let mut found = None;
            let mut i = closer;
            while i > lower {
                i -= 1;
                let o = &self.delims[i];
                if o.ch != c.ch || !o.can_open || o.count == 0 {
                    continue;
                }
                if c.ch == b'~' {
                    if o.count == c.count {
                        found = Some(i);
                        break;
                    }
                    continue;
                }
                let odd_match = (c.can_open || o.can_close)
                    && c.orig % 3 != 0
                    && (o.orig + c.orig) % 3 == 0;
                if !odd_match {
                    found = Some(i);
                    break;
                }
            }

            let Some(opener) = found else {
                openers_bottom[class][key] = closer;
                closer += 1;
                continue;
            };

            let o = self.delims[opener];
            let used = if c.ch == b'~' {
                c.count
            } else if c.count >= 2 && o.count >= 2 {
                2
            } else {
                1
            };
            let kind = match (c.ch, used) {
                (b'~', _) => Inline::Strikethrough,
                (b'_', _) if opts.contains(Options::UNDERLINE) => Inline::Underline,
                (_, 2) => Inline::Strong,
                _ => Inline::Emphasis,
            };
            trace!(
                "pair {:?} x{} at pieces {}..{}",
                c.ch as char,
                used,
                o.piece,
                c.piece
            );

            pieces.shrink_end(o.piece, used);
            pieces.shrink_start(c.piece, used);
            let span = pieces.add_span(SpanInfo::Plain(kind));
            pieces.insert_after(o.piece, PieceKind::Enter(span));
            pieces.insert_before(c.piece, PieceKind::Leave(span));

            for between in &mut self.delims[opener + 1..closer] {
                between.count = 0;
            }
            self.delims[opener].count -= used;
            self.delims[closer].count -= used;
            if self.delims[closer].count == 0 {
                closer += 1;
            }
        }

        self.delims.truncate(bottom);
    }
}

#[inline]
fn delim_class(ch: u8) -> usize {
    match ch {
        b'*' => 0,
        b'_' => 1,
        _ => 2,
    }
}
