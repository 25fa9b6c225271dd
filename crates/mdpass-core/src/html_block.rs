//! Raw HTML block start and end conditions.
//!
//! Seven kinds of HTML block are recognized by how their first line
//! begins. Kinds 1 to 5 end at a line containing a specific marker; kinds 6
//! and 7 end at the first blank line. Kind 7 cannot interrupt a paragraph.

use memchr::memmem;

use crate::scanner::scan_html_tag;

/// Kind of an open HTML block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HtmlKind {
    /// `<pre`, `<script`, `<style`, `<textarea`
    Raw,
    /// `<!--`
    Comment,
    /// `<?`
    Instruction,
    /// `<!` followed by a letter
    Declaration,
    /// `<![CDATA[`
    Cdata,
    /// A known block-level tag name.
    BlockTag,
    /// Any other complete open or closing tag alone on its line.
    Other,
}

const RAW_TAGS: &[&str] = &["pre", "script", "style", "textarea"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption", "center",
    "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
    "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search", "section",
    "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "track", "ul",
];

impl HtmlKind {
    /// Whether the block ends at a blank line rather than an end marker.
    pub fn ends_at_blank(self) -> bool {
        matches!(self, HtmlKind::BlockTag | HtmlKind::Other)
    }

    /// Whether `line` closes a block of this kind.
    pub fn ends_on(self, line: &str) -> bool {
        let bytes = line.as_bytes();
        match self {
            HtmlKind::Raw => {
                let lower = line.to_ascii_lowercase();
                RAW_TAGS
                    .iter()
                    .any(|tag| lower.contains(&format!("</{tag}>")))
            }
            HtmlKind::Comment => memmem::find(bytes, b"-->").is_some(),
            HtmlKind::Instruction => memmem::find(bytes, b"?>").is_some(),
            HtmlKind::Declaration => memchr::memchr(b'>', bytes).is_some(),
            HtmlKind::Cdata => memmem::find(bytes, b"]]>").is_some(),
            HtmlKind::BlockTag | HtmlKind::Other => false,
        }
    }
}

/// Tag name at the start of `s`, as ASCII letters, digits and `-`.
fn tag_name(s: &[u8]) -> &[u8] {
    let len = s
        .iter()
        .enumerate()
        .take_while(|(i, b)| b.is_ascii_alphabetic() || (*i > 0 && (b.is_ascii_digit() || **b == b'-')))
        .count();
    &s[..len]
}

fn one_of(name: &[u8], list: &[&str]) -> bool {
    list.iter().any(|t| name.eq_ignore_ascii_case(t.as_bytes()))
}

/// The kind of HTML block starting at `line` (whose leading indentation is
/// already consumed), if any. `in_paragraph` is set when the line would
/// otherwise continue a paragraph.
pub(crate) fn start_kind(line: &str, in_paragraph: bool) -> Option<HtmlKind> {
    let bytes = line.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let rest = &bytes[1..];

    if rest.starts_with(b"!--") {
        return Some(HtmlKind::Comment);
    }
    if rest.starts_with(b"?") {
        return Some(HtmlKind::Instruction);
    }
    if rest.starts_with(b"![CDATA[") {
        return Some(HtmlKind::Cdata);
    }
    if rest.first() == Some(&b'!') && rest.get(1).is_some_and(u8::is_ascii_alphabetic) {
        return Some(HtmlKind::Declaration);
    }

    let closing = rest.first() == Some(&b'/');
    let name_start = if closing { &rest[1..] } else { rest };
    let name = tag_name(name_start);
    if name.is_empty() {
        return None;
    }
    let after = &name_start[name.len()..];
    let boundary = match after.first() {
        None | Some(b' ' | b'\t' | b'>') => true,
        Some(b'/') => after.get(1) == Some(&b'>'),
        _ => false,
    };

    if !closing && one_of(name, RAW_TAGS) && !matches!(after.first(), Some(b'/')) && boundary {
        return Some(HtmlKind::Raw);
    }
    if boundary && one_of(name, BLOCK_TAGS) {
        return Some(HtmlKind::BlockTag);
    }
    if in_paragraph || one_of(name, RAW_TAGS) {
        return None;
    }
    let end = scan_html_tag(bytes, 0)?;
    // A complete comment, declaration or instruction was handled above.
    let only_ws = bytes[end..].iter().all(|b| matches!(b, b' ' | b'\t'));
    only_ws.then_some(HtmlKind::Other)
}
