//! HTML rendering of the event stream.

use std::borrow::Cow;
use std::ops::ControlFlow;

use mdpass_core::{Align, AttrText, Attribute, Block, EventSink, Inline, Parser, TextKind};

bitflags::bitflags! {
    /// Output switches for [`HtmlRenderer`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RenderOptions: u32 {
        /// Copy entity references to the output as written.
        const VERBATIM_ENTITIES = 1 << 1;
        /// Drop a leading U+FEFF byte order mark before parsing.
        const SKIP_BOM = 1 << 2;
        /// Close void elements XHTML style: `<br />`, `<hr />`, `<img ... />`.
        const XHTML = 1 << 3;
    }
}

/// Sink that writes HTML into a string.
#[derive(Default)]
pub struct HtmlRenderer {
    out: String,
    options: RenderOptions,
    /// Nesting depth of images; inside one only alt text is written.
    image_depth: usize,
    /// Titles of open images, written when the image closes.
    image_titles: Vec<String>,
}

impl HtmlRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// End of a void element's tag.
    fn void_end(&self) -> &'static str {
        if self.options.contains(RenderOptions::XHTML) {
            " />"
        } else {
            ">"
        }
    }

    fn push_void(&mut self, tag: &str) {
        self.out.push_str(tag);
        self.out.push_str(self.void_end());
    }

    /// Start a block on its own line, e.g. after `<li>` or tight item text.
    fn block_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn push_attr(&mut self, attr: &Attribute<'_>, url: bool) {
        let verbatim = self.options.contains(RenderOptions::VERBATIM_ENTITIES);
        for (kind, s) in attr.segments() {
            let decoded: Cow<'_, str> = match kind {
                AttrText::Entity if verbatim => {
                    self.out.push_str(s);
                    continue;
                }
                AttrText::Normal => Cow::Borrowed(s),
                AttrText::Entity => Cow::Owned(decode_entity(s).unwrap_or_else(|| s.to_string())),
                AttrText::NullChar => Cow::Borrowed("\u{FFFD}"),
            };
            if url {
                let encoded = escape_url(&decoded);
                self.out.push_str(&escape_html(&encoded));
            } else {
                self.out.push_str(&escape_html(&decoded));
            }
        }
    }
}

fn align_attr(align: Align) -> &'static str {
    match align {
        Align::Default => "",
        Align::Left => " align=\"left\"",
        Align::Center => " align=\"center\"",
        Align::Right => " align=\"right\"",
    }
}

impl EventSink for HtmlRenderer {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        if !matches!(block, Block::Document) {
            self.block_break();
        }
        match block {
            Block::Document | Block::Html => {}
            Block::Quote => self.push("<blockquote>\n"),
            Block::UnorderedList { .. } => self.push("<ul>\n"),
            Block::OrderedList { start: 1, .. } => self.push("<ol>\n"),
            Block::OrderedList { start, .. } => {
                let tag = format!("<ol start=\"{start}\">\n");
                self.push(&tag);
            }
            Block::ListItem { task: None } => self.push("<li>"),
            Block::ListItem { task: Some(task) } => {
                self.push("<li class=\"task-list-item\"><input type=\"checkbox\" disabled");
                self.push_void(if task.is_checked() { " checked" } else { "" });
            }
            Block::ThematicBreak => {
                self.push_void("<hr");
                self.push("\n");
            }
            Block::Heading { level } => {
                let tag = format!("<h{level}>");
                self.push(&tag);
            }
            Block::Code { lang, .. } => {
                self.push("<pre><code");
                if !lang.is_empty() {
                    self.push(" class=\"language-");
                    self.push_attr(lang, false);
                    self.push("\"");
                }
                self.push(">");
            }
            Block::Paragraph => self.push("<p>"),
            Block::Table { .. } => self.push("<table>\n"),
            Block::TableHead => self.push("<thead>\n"),
            Block::TableBody => self.push("<tbody>\n"),
            Block::TableRow => self.push("<tr>\n"),
            Block::TableHeaderCell { align } => {
                self.push("<th");
                self.push(align_attr(*align));
                self.push(">");
            }
            Block::TableCell { align } => {
                self.push("<td");
                self.push(align_attr(*align));
                self.push(">");
            }
        }
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        match block {
            Block::Document | Block::Html | Block::ThematicBreak => {}
            Block::Quote => self.push("</blockquote>\n"),
            Block::UnorderedList { .. } => self.push("</ul>\n"),
            Block::OrderedList { .. } => self.push("</ol>\n"),
            Block::ListItem { .. } => self.push("</li>\n"),
            Block::Heading { level } => {
                let tag = format!("</h{level}>\n");
                self.push(&tag);
            }
            Block::Code { .. } => self.push("</code></pre>\n"),
            Block::Paragraph => self.push("</p>\n"),
            Block::Table { .. } => self.push("</table>\n"),
            Block::TableHead => self.push("</thead>\n"),
            Block::TableBody => self.push("</tbody>\n"),
            Block::TableRow => self.push("</tr>\n"),
            Block::TableHeaderCell { .. } => self.push("</th>\n"),
            Block::TableCell { .. } => self.push("</td>\n"),
        }
        ControlFlow::Continue(())
    }

    fn enter_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        if self.image_depth > 0 {
            if let Inline::Image { .. } = span {
                self.image_depth += 1;
            }
            return ControlFlow::Continue(());
        }
        match span {
            Inline::Emphasis => self.push("<em>"),
            Inline::Strong => self.push("<strong>"),
            Inline::Underline => self.push("<u>"),
            Inline::Strikethrough => self.push("<del>"),
            Inline::Code => self.push("<code>"),
            Inline::LatexMath => self.push("<x-equation>"),
            Inline::LatexMathDisplay => self.push("<x-equation type=\"display\">"),
            Inline::Link { href, title, .. } => {
                self.push("<a href=\"");
                self.push_attr(href, true);
                self.push("\"");
                if !title.is_empty() {
                    self.push(" title=\"");
                    self.push_attr(title, false);
                    self.push("\"");
                }
                self.push(">");
            }
            Inline::Image { src, title } => {
                self.push("<img src=\"");
                self.push_attr(src, true);
                self.push("\" alt=\"");
                let mut title_html = HtmlRenderer::new(self.options);
                title_html.push_attr(title, false);
                self.image_titles.push(title_html.into_string());
                self.image_depth = 1;
            }
            Inline::WikiLink { target } => {
                self.push("<x-wikilink data-target=\"");
                self.push_attr(target, false);
                self.push("\">");
            }
        }
        ControlFlow::Continue(())
    }

    fn leave_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        if self.image_depth > 0 {
            if let Inline::Image { .. } = span {
                self.image_depth -= 1;
                if self.image_depth == 0 {
                    self.push("\"");
                    if let Some(title) = self.image_titles.pop().filter(|t| !t.is_empty()) {
                        self.push(" title=\"");
                        self.push(&title);
                        self.push("\"");
                    }
                    self.push_void("");
                }
            }
            return ControlFlow::Continue(());
        }
        match span {
            Inline::Emphasis => self.push("</em>"),
            Inline::Strong => self.push("</strong>"),
            Inline::Underline => self.push("</u>"),
            Inline::Strikethrough => self.push("</del>"),
            Inline::Code => self.push("</code>"),
            Inline::LatexMath | Inline::LatexMathDisplay => self.push("</x-equation>"),
            Inline::Link { .. } => self.push("</a>"),
            Inline::WikiLink { .. } => self.push("</x-wikilink>"),
            Inline::Image { .. } => {}
        }
        ControlFlow::Continue(())
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        match kind {
            TextKind::NullChar => self.push("\u{FFFD}"),
            TextKind::HardBreak if self.image_depth == 0 => {
                self.push_void("<br");
                self.push("\n");
            }
            TextKind::HardBreak | TextKind::SoftBreak => {
                self.push(if self.image_depth > 0 { " " } else { "\n" })
            }
            TextKind::Entity if self.options.contains(RenderOptions::VERBATIM_ENTITIES) => {
                self.push(text)
            }
            TextKind::Entity => match decode_entity(text) {
                Some(decoded) => self.out.push_str(&escape_html(&decoded)),
                None => self.push(text),
            },
            TextKind::Html if self.image_depth == 0 => self.push(text),
            TextKind::Normal | TextKind::Code | TextKind::Html | TextKind::LatexMath => {
                self.out.push_str(&escape_html(text))
            }
        }
        ControlFlow::Continue(())
    }
}

/// Escape text for HTML content and attribute values.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.bytes().any(|b| matches!(b, b'<' | b'>' | b'&' | b'"')) {
        return Cow::Borrowed(input);
    }
    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Percent-encode bytes that may not appear in a URL attribute.
fn escape_url(input: &str) -> Cow<'_, str> {
    let safe = |b: u8| {
        b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'-' | b'.' | b'_' | b'~' | b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@' | b'!'
                    | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=' | b'%'
            )
    };
    if input.bytes().all(safe) {
        return Cow::Borrowed(input);
    }
    let mut result = String::with_capacity(input.len() + 16);
    for b in input.bytes() {
        if safe(b) {
            result.push(char::from(b));
        } else {
            result.push_str(&format!("%{b:02X}"));
        }
    }
    Cow::Owned(result)
}

/// Decode an entity reference including its `&` and `;`. Named references
/// cover the HTML5 entity table. Unknown names yield `None`; invalid code
/// points decode to U+FFFD.
pub fn decode_entity(entity: &str) -> Option<String> {
    let name = entity.strip_prefix('&')?.strip_suffix(';')?;
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num.parse::<u32>().ok(),
        };
        let c = code
            .filter(|&c| c != 0)
            .and_then(char::from_u32)
            .unwrap_or('\u{FFFD}');
        return Some(c.to_string());
    }
    let decoded = html_escape::decode_html_entities(entity);
    (decoded != entity).then(|| decoded.into_owned())
}

/// Render `input` to HTML.
pub fn render(
    input: &str,
    parser: &Parser,
    options: RenderOptions,
) -> Result<String, mdpass_core::Error> {
    let input = match input.strip_prefix('\u{FEFF}') {
        Some(rest) if options.contains(RenderOptions::SKIP_BOM) => rest,
        _ => input,
    };
    let mut renderer = HtmlRenderer::new(options);
    parser.parse(input, &mut renderer)?;
    Ok(renderer.into_string())
}
