//! Parser configuration.
//!
//! Every extension is an independent toggle in [`Options`]. A [`Dialect`]
//! bundles the toggles of a well-known Markdown flavor, and [`Extension`]
//! gives each toggle a name so front ends can build options from text such
//! as `"tables, strikethrough, math"`.

use std::fmt;
use std::str::FromStr;

bitflags::bitflags! {
    /// Independent feature toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Options: u32 {
        /// Collapse runs of whitespace in normal text into a single space.
        const COLLAPSE_WHITESPACE = 1 << 0;
        /// Accept `#Heading` without a space after the hashes.
        const PERMISSIVE_ATX_HEADERS = 1 << 1;
        /// Recognize bare `http://`, `https://` and `ftp://` URLs.
        const PERMISSIVE_URL_AUTOLINKS = 1 << 2;
        /// Recognize bare e-mail addresses.
        const PERMISSIVE_EMAIL_AUTOLINKS = 1 << 3;
        /// Disable indented code blocks.
        const NO_INDENTED_CODE_BLOCKS = 1 << 4;
        /// Disable raw HTML blocks.
        const NO_HTML_BLOCKS = 1 << 5;
        /// Disable raw inline HTML.
        const NO_HTML_SPANS = 1 << 6;
        /// GitHub-style tables.
        const TABLES = 1 << 8;
        /// `~strike~` and `~~strike~~`.
        const STRIKETHROUGH = 1 << 9;
        /// Recognize `www.` links without a scheme.
        const PERMISSIVE_WWW_AUTOLINKS = 1 << 10;
        /// `[ ]` / `[x]` task list items.
        const TASK_LISTS = 1 << 11;
        /// `$inline$` and `$$display$$` math spans.
        const LATEX_MATH_SPANS = 1 << 12;
        /// `[[target|label]]` wiki links.
        const WIKI_LINKS = 1 << 13;
        /// `_` produces underline instead of emphasis.
        const UNDERLINE = 1 << 14;
        /// Report every soft line break as a hard break.
        const HARD_SOFT_BREAKS = 1 << 15;

        /// All three permissive autolink flavors.
        const PERMISSIVE_AUTOLINKS = Self::PERMISSIVE_URL_AUTOLINKS.bits()
            | Self::PERMISSIVE_EMAIL_AUTOLINKS.bits()
            | Self::PERMISSIVE_WWW_AUTOLINKS.bits();
        /// No raw HTML of either kind.
        const NO_HTML = Self::NO_HTML_BLOCKS.bits() | Self::NO_HTML_SPANS.bits();
    }
}

/// Preset bundles of [`Options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Plain CommonMark, no extensions.
    #[default]
    CommonMark,
    /// GitHub-flavored Markdown: tables, strikethrough, task lists and
    /// permissive autolinks.
    Github,
}

impl Dialect {
    /// The toggles this dialect turns on.
    pub fn options(self) -> Options {
        match self {
            Dialect::CommonMark => Options::empty(),
            Dialect::Github => {
                Options::PERMISSIVE_AUTOLINKS
                    | Options::TABLES
                    | Options::STRIKETHROUGH
                    | Options::TASK_LISTS
            }
        }
    }
}

impl From<Dialect> for Options {
    fn from(dialect: Dialect) -> Self {
        dialect.options()
    }
}

impl FromStr for Dialect {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commonmark" | "cm" => Ok(Dialect::CommonMark),
            "github" | "gfm" => Ok(Dialect::Github),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

/// A named extension toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Tables,
    Strikethrough,
    TaskLists,
    Autolinks,
    UrlAutolinks,
    EmailAutolinks,
    WwwAutolinks,
    WikiLinks,
    Math,
    Underline,
    HardSoftBreaks,
    CollapseWhitespace,
    PermissiveAtxHeaders,
    NoIndentedCode,
    NoHtml,
    NoHtmlBlocks,
    NoHtmlSpans,
}

impl Extension {
    /// The flags this extension sets.
    pub fn flags(self) -> Options {
        match self {
            Extension::Tables => Options::TABLES,
            Extension::Strikethrough => Options::STRIKETHROUGH,
            Extension::TaskLists => Options::TASK_LISTS,
            Extension::Autolinks => Options::PERMISSIVE_AUTOLINKS,
            Extension::UrlAutolinks => Options::PERMISSIVE_URL_AUTOLINKS,
            Extension::EmailAutolinks => Options::PERMISSIVE_EMAIL_AUTOLINKS,
            Extension::WwwAutolinks => Options::PERMISSIVE_WWW_AUTOLINKS,
            Extension::WikiLinks => Options::WIKI_LINKS,
            Extension::Math => Options::LATEX_MATH_SPANS,
            Extension::Underline => Options::UNDERLINE,
            Extension::HardSoftBreaks => Options::HARD_SOFT_BREAKS,
            Extension::CollapseWhitespace => Options::COLLAPSE_WHITESPACE,
            Extension::PermissiveAtxHeaders => Options::PERMISSIVE_ATX_HEADERS,
            Extension::NoIndentedCode => Options::NO_INDENTED_CODE_BLOCKS,
            Extension::NoHtml => Options::NO_HTML,
            Extension::NoHtmlBlocks => Options::NO_HTML_BLOCKS,
            Extension::NoHtmlSpans => Options::NO_HTML_SPANS,
        }
    }
}

impl FromStr for Extension {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = match s.trim().to_ascii_lowercase().as_str() {
            "tables" | "table" => Extension::Tables,
            "strikethrough" | "del" => Extension::Strikethrough,
            "tasklists" | "tasks" => Extension::TaskLists,
            "autolinks" | "autolink" => Extension::Autolinks,
            "url-autolinks" => Extension::UrlAutolinks,
            "email-autolinks" => Extension::EmailAutolinks,
            "www-autolinks" => Extension::WwwAutolinks,
            "wikilinks" => Extension::WikiLinks,
            "math" | "latex-math" => Extension::Math,
            "underline" => Extension::Underline,
            "hard-soft-breaks" => Extension::HardSoftBreaks,
            "collapse-whitespace" => Extension::CollapseWhitespace,
            "permissive-atx-headers" => Extension::PermissiveAtxHeaders,
            "no-indented-code" => Extension::NoIndentedCode,
            "no-html" => Extension::NoHtml,
            "no-html-blocks" => Extension::NoHtmlBlocks,
            "no-html-spans" => Extension::NoHtmlSpans,
            other => return Err(UnknownName(other.to_string())),
        };
        Ok(ext)
    }
}

impl Options {
    /// Parse a comma-separated list of extension names.
    ///
    /// Empty entries are skipped.
    ///
    /// ```rust
    /// use mdpass_core::Options;
    ///
    /// let opts = Options::from_extensions("tables, math").unwrap();
    /// assert!(opts.contains(Options::TABLES | Options::LATEX_MATH_SPANS));
    /// ```
    pub fn from_extensions(list: &str) -> Result<Options, UnknownName> {
        let mut opts = Options::empty();
        for part in list.split(',') {
            if part.trim().is_empty() {
                continue;
            }
            opts |= part.parse::<Extension>()?.flags();
        }
        Ok(opts)
    }
}

/// A dialect or extension name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName(pub String);

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown name: {}", self.0)
    }
}

impl std::error::Error for UnknownName {}
