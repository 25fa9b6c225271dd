//! mdpass CLI - Render and inspect Markdown documents
//!
//! Usage:
//!   mdpass [OPTIONS] [COMMAND] [FILE]
//!
//! Commands:
//!   html      Render to HTML (default)
//!   tree      Print the document tree as JSON
//!   events    Print the raw event stream
//!   stats     Show document statistics

mod html;
mod json;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use std::process;

use html::RenderOptions;
use log::{debug, info};
use mdpass_core::{
    parse_document, Block, Dialect, EventSink, Inline, Options, Parser, Recorder, TextKind,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    match run(&args) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let config = parse_args(args)?;

    let input = read_input(&config.file)?;
    info!("read {} bytes from {}", input.len(), config.file);

    let parser = Parser::new(config.options);
    debug!("options: {:?}", parser.options());

    let output = match config.command {
        Command::Html => cmd_html(&parser, &input, config.render)?,
        Command::Tree => cmd_tree(&parser, &input)?,
        Command::Events => cmd_events(&parser, &input)?,
        Command::Stats => cmd_stats(&parser, &input)?,
    };

    write_output(config.output.as_deref(), &output)
}

#[derive(Debug, PartialEq)]
struct Config {
    command: Command,
    file: String,
    output: Option<String>,
    options: Options,
    render: RenderOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Html,
    Tree,
    Events,
    Stats,
}

fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut command = Command::Html;
    let mut dialect = Dialect::CommonMark;
    let mut extensions = Options::empty();
    let mut render = RenderOptions::empty();
    let mut output = None;
    let mut file = None;

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-V" | "--version" => {
                println!("mdpass {}", env!("CARGO_PKG_VERSION"));
                process::exit(0);
            }
            "-d" | "--dialect" => {
                let value = option_value(args, &mut i, arg)?;
                dialect = value
                    .parse()
                    .map_err(|_| format!("unknown dialect: {}", value))?;
            }
            "-e" | "--ext" => {
                let value = option_value(args, &mut i, arg)?;
                extensions |= Options::from_extensions(value)
                    .map_err(|e| format!("unknown extension: {}", e.0))?;
            }
            "-o" | "--output" => {
                output = Some(option_value(args, &mut i, arg)?.to_string());
            }
            "--xhtml" => render |= RenderOptions::XHTML,
            "--verbatim-entities" => render |= RenderOptions::VERBATIM_ENTITIES,
            "--skip-bom" => render |= RenderOptions::SKIP_BOM,
            "html" => command = Command::Html,
            "tree" => command = Command::Tree,
            "events" => command = Command::Events,
            "stats" => command = Command::Stats,
            "-" => file = set_file(file, arg)?,
            _ if arg.starts_with('-') => {
                return Err(format!("unknown option: {}", arg));
            }
            _ => file = set_file(file, arg)?,
        }
        i += 1;
    }

    Ok(Config {
        command,
        file: file.unwrap_or_else(|| "-".to_string()),
        output,
        options: dialect.options() | extensions,
        render,
    })
}

fn option_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn set_file(current: Option<String>, arg: &str) -> Result<Option<String>, String> {
    if current.is_some() {
        return Err("multiple files specified".to_string());
    }
    Ok(Some(arg.to_string()))
}

fn print_help() {
    eprintln!(
        r#"mdpass - single-pass Markdown parser

USAGE:
    mdpass [OPTIONS] [COMMAND] [FILE]

Reads standard input when FILE is omitted or is '-'.

COMMANDS:
    html        Render to HTML (default)
    tree        Print the document tree as JSON
    events      Print the raw event stream
    stats       Show document statistics

OPTIONS:
    -d, --dialect <NAME>    commonmark (default) or github
    -e, --ext <LIST>        Comma-separated extensions: tables, strikethrough,
                            tasklists, autolinks, wikilinks, math, underline,
                            hard-soft-breaks, collapse-whitespace,
                            permissive-atx-headers, no-indented-code, no-html
    -o, --output <FILE>     Write to FILE instead of standard output
        --xhtml             html: close void elements as <br />, <hr />, <img ... />
        --verbatim-entities html: copy entity references instead of decoding them
        --skip-bom          html: ignore a leading byte order mark
    -h, --help              Print help information
    -V, --version           Print version information

EXAMPLES:
    mdpass README.md                 Render a file to HTML
    mdpass -d github README.md       Render with GitHub extensions
    mdpass -e math,wikilinks notes.md
    mdpass events doc.md             Dump the event stream
    cat doc.md | mdpass tree         Tree as JSON from stdin
"#
    );
}

fn read_input(file: &str) -> Result<String, String> {
    if file == "-" {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| format!("failed to read standard input: {}", e))?;
        Ok(input)
    } else {
        fs::read_to_string(file).map_err(|e| format!("failed to read '{}': {}", file, e))
    }
}

fn write_output(path: Option<&str>, output: &str) -> Result<(), String> {
    match path {
        Some(path) => {
            fs::write(path, output).map_err(|e| format!("failed to write '{}': {}", path, e))
        }
        None => io::stdout()
            .write_all(output.as_bytes())
            .map_err(|e| format!("failed to write output: {}", e)),
    }
}

// =============================================================================
// Html Command
// =============================================================================

fn cmd_html(parser: &Parser, input: &str, render: RenderOptions) -> Result<String, String> {
    html::render(input, parser, render).map_err(|e| e.to_string())
}

// =============================================================================
// Tree Command
// =============================================================================

fn cmd_tree(parser: &Parser, input: &str) -> Result<String, String> {
    let doc = parse_document(input, parser.options()).map_err(|e| e.to_string())?;
    let mut text = serde_json::to_string_pretty(&json::JsonDocument::new(&doc))
        .map_err(|e| format!("failed to serialize tree: {}", e))?;
    text.push('\n');
    Ok(text)
}

// =============================================================================
// Events Command
// =============================================================================

fn cmd_events(parser: &Parser, input: &str) -> Result<String, String> {
    let mut recorder = Recorder::new();
    parser
        .parse(input, &mut recorder)
        .map_err(|e| e.to_string())?;
    Ok(recorder.dump())
}

// =============================================================================
// Stats Command
// =============================================================================

fn cmd_stats(parser: &Parser, input: &str) -> Result<String, String> {
    let mut stats = DocumentStats::default();
    parser.parse(input, &mut stats).map_err(|e| e.to_string())?;

    let mut out = String::new();
    out.push_str("Document Statistics\n");
    out.push_str("-------------------\n");
    out.push_str(&format!("Max depth:      {}\n", stats.max_depth));
    out.push_str("\nBlocks:\n");
    for (name, count) in &stats.blocks {
        out.push_str(&format!("  {:<14}{}\n", format!("{}:", name), count));
    }
    out.push_str("\nSpans:\n");
    for (name, count) in &stats.spans {
        out.push_str(&format!("  {:<14}{}\n", format!("{}:", name), count));
    }
    out.push_str("\nSize:\n");
    out.push_str(&format!("  Bytes:        {}\n", input.len()));
    out.push_str(&format!("  Words (est.): {}\n", stats.words));
    out.push_str(&format!("  Lines:        {}\n", input.lines().count()));
    Ok(out)
}

/// Counts blocks and spans by kind as the events arrive.
#[derive(Debug, Default)]
struct DocumentStats {
    blocks: BTreeMap<&'static str, usize>,
    spans: BTreeMap<&'static str, usize>,
    depth: usize,
    max_depth: usize,
    words: usize,
    in_word: bool,
}

impl EventSink for DocumentStats {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        let name = match block {
            Block::Quote => Some("Quotes"),
            Block::UnorderedList { .. } | Block::OrderedList { .. } => Some("Lists"),
            Block::ListItem { .. } => Some("Items"),
            Block::ThematicBreak => Some("Breaks"),
            Block::Heading { .. } => Some("Headings"),
            Block::Code { .. } => Some("Code blocks"),
            Block::Html => Some("HTML blocks"),
            Block::Paragraph => Some("Paragraphs"),
            Block::Table { .. } => Some("Tables"),
            _ => None,
        };
        if let Some(name) = name {
            *self.blocks.entry(name).or_default() += 1;
        }
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, _: &Block<'_>) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        self.in_word = false;
        ControlFlow::Continue(())
    }

    fn enter_span(&mut self, span: &Inline<'_>) -> ControlFlow<()> {
        let name = match span {
            Inline::Emphasis => "Emphasis",
            Inline::Strong => "Strong",
            Inline::Link { .. } => "Links",
            Inline::Image { .. } => "Images",
            Inline::Code => "Code spans",
            Inline::Strikethrough => "Strikethrough",
            Inline::LatexMath | Inline::LatexMathDisplay => "Math",
            Inline::WikiLink { .. } => "Wiki links",
            Inline::Underline => "Underline",
        };
        *self.spans.entry(name).or_default() += 1;
        ControlFlow::Continue(())
    }

    fn text(&mut self, kind: TextKind, text: &str) -> ControlFlow<()> {
        match kind {
            TextKind::Normal | TextKind::Code | TextKind::LatexMath => {
                for c in text.chars() {
                    if c.is_whitespace() {
                        self.in_word = false;
                    } else if !self.in_word {
                        self.in_word = true;
                        self.words += 1;
                    }
                }
            }
            TextKind::SoftBreak | TextKind::HardBreak => self.in_word = false,
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("mdpass")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_to_html_from_stdin() {
        let config = parse_args(&args(&[])).unwrap();
        assert_eq!(
            config,
            Config {
                command: Command::Html,
                file: "-".to_string(),
                output: None,
                options: Options::empty(),
                render: RenderOptions::empty(),
            }
        );
    }

    #[test]
    fn dialect_and_extensions_combine() {
        let config =
            parse_args(&args(&["--dialect", "gfm", "-e", "math,wikilinks", "tree", "doc.md"]))
                .unwrap();
        assert_eq!(config.command, Command::Tree);
        assert_eq!(config.file, "doc.md");
        assert!(config.options.contains(
            Dialect::Github.options() | Options::LATEX_MATH_SPANS | Options::WIKI_LINKS
        ));
    }

    #[test]
    fn render_flags() {
        let config = parse_args(&args(&["--xhtml", "--skip-bom", "doc.md"])).unwrap();
        assert_eq!(config.command, Command::Html);
        assert_eq!(config.render, RenderOptions::XHTML | RenderOptions::SKIP_BOM);
        let config = parse_args(&args(&["html", "--verbatim-entities"])).unwrap();
        assert_eq!(config.render, RenderOptions::VERBATIM_ENTITIES);

        let parser = Parser::new(Options::empty());
        let render = RenderOptions::SKIP_BOM | RenderOptions::XHTML;
        assert_eq!(cmd_html(&parser, "\u{FEFF}***", render).unwrap(), "<hr />\n");
        assert_eq!(cmd_html(&parser, "&copy;", config.render).unwrap(), "<p>&copy;</p>\n");
    }

    #[test]
    fn output_path() {
        let config = parse_args(&args(&["-o", "out.html", "stats", "-"])).unwrap();
        assert_eq!(config.command, Command::Stats);
        assert_eq!(config.output.as_deref(), Some("out.html"));
        assert_eq!(config.file, "-");
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            parse_args(&args(&["--frobnicate"])).unwrap_err(),
            "unknown option: --frobnicate"
        );
        assert_eq!(
            parse_args(&args(&["a.md", "b.md"])).unwrap_err(),
            "multiple files specified"
        );
        assert_eq!(
            parse_args(&args(&["--ext"])).unwrap_err(),
            "--ext requires a value"
        );
        assert_eq!(
            parse_args(&args(&["-e", "tables,bogus"])).unwrap_err(),
            "unknown extension: bogus"
        );
        assert_eq!(
            parse_args(&args(&["-d", "rst"])).unwrap_err(),
            "unknown dialect: rst"
        );
    }

    #[test]
    fn stats_count_kinds() {
        let parser = Parser::new(Dialect::Github);
        let out = cmd_stats(&parser, "# Title\n\n- *a* b\n- `c`\n\n> quote\n").unwrap();
        assert!(out.contains("Headings:     1\n"), "{}", out);
        assert!(out.contains("Items:        2\n"), "{}", out);
        assert!(out.contains("Quotes:       1\n"), "{}", out);
        assert!(out.contains("Emphasis:     1\n"), "{}", out);
        assert!(out.contains("Words (est.): 5\n"), "{}", out);
    }

    #[test]
    fn events_dump_nests() {
        let parser = Parser::new(Options::empty());
        let out = cmd_events(&parser, "*a*").unwrap();
        assert!(out.starts_with("enter Document\n"), "{}", out);
        assert!(out.contains("\n    enter Emphasis\n"), "{}", out);
    }
}
