//! Damaged-input robustness: mutate realistic documents, parse every
//! variant, and compare block counts against pulldown-cmark.
//!
//! Run `cargo test -p mdpass-core --test robustness_report -- --nocapture`
//! to see the per-case report.

use std::fmt;
use std::ops::ControlFlow;

use mdpass_core::{Block, Dialect, EventSink, Inline, Options, Parser, TextKind};
use pulldown_cmark::{Event, Options as MdOptions, Parser as MdParser, Tag, TagEnd};

#[derive(Clone, Copy, Debug)]
enum Kind {
    Heading,
    Paragraph,
    List,
    Item,
    Table,
    Code,
}

/// Block counts indexed by [`Kind`]. Paragraphs inside lists are not
/// counted, since tight items report none.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct Counts([u32; 6]);

impl Counts {
    fn of(pairs: &[(Kind, u32)]) -> Self {
        let mut counts = Counts::default();
        for &(kind, n) in pairs {
            counts.0[kind as usize] = n;
        }
        counts
    }

    fn bump(&mut self, kind: Kind) {
        self.0[kind as usize] += 1;
    }

    fn sum(&self) -> u32 {
        self.0.iter().sum()
    }

    fn distance(&self, other: &Counts) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.abs_diff(*b))
            .sum()
    }
}

impl fmt::Debug for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [h, p, l, i, t, c] = self.0;
        write!(f, "h{h} p{p} l{l} i{i} t{t} c{c}")
    }
}

/// Fraction of `reference` blocks that `counts` reproduces.
fn agreement(counts: &Counts, reference: &Counts) -> f64 {
    match reference.sum() {
        0 if counts.sum() == 0 => 1.0,
        0 => 0.0,
        total => (1.0 - counts.distance(reference) as f64 / total as f64).max(0.0),
    }
}

/// Counts blocks and checks event nesting at the same time.
#[derive(Default)]
struct Checker {
    counts: Counts,
    lists_open: u32,
    /// `true` for an open block, `false` for an open span.
    stack: Vec<bool>,
    broken: Option<&'static str>,
}

impl Checker {
    fn fail(&mut self, what: &'static str) -> ControlFlow<()> {
        self.broken = Some(what);
        ControlFlow::Break(())
    }
}

impl EventSink for Checker {
    fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        let kind = match block {
            Block::Heading { .. } => Some(Kind::Heading),
            Block::Paragraph if self.lists_open == 0 => Some(Kind::Paragraph),
            Block::UnorderedList { .. } | Block::OrderedList { .. } => {
                self.lists_open += 1;
                Some(Kind::List)
            }
            Block::ListItem { .. } => Some(Kind::Item),
            Block::Table { .. } => Some(Kind::Table),
            Block::Code { .. } => Some(Kind::Code),
            _ => None,
        };
        if let Some(kind) = kind {
            self.counts.bump(kind);
        }
        if self.stack.last() == Some(&false) {
            return self.fail("block opened inside a span");
        }
        self.stack.push(true);
        ControlFlow::Continue(())
    }

    fn leave_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
        if matches!(block, Block::UnorderedList { .. } | Block::OrderedList { .. }) {
            self.lists_open = self.lists_open.saturating_sub(1);
        }
        match self.stack.pop() {
            Some(true) => ControlFlow::Continue(()),
            _ => self.fail("unbalanced block"),
        }
    }

    fn enter_span(&mut self, _: &Inline<'_>) -> ControlFlow<()> {
        if self.stack.is_empty() {
            return self.fail("span outside any block");
        }
        self.stack.push(false);
        ControlFlow::Continue(())
    }

    fn leave_span(&mut self, _: &Inline<'_>) -> ControlFlow<()> {
        match self.stack.pop() {
            Some(false) => ControlFlow::Continue(()),
            _ => self.fail("unbalanced span"),
        }
    }

    fn text(&mut self, _: TextKind, text: &str) -> ControlFlow<()> {
        match (self.stack.is_empty(), text.is_empty()) {
            (true, _) => self.fail("text outside any block"),
            (_, true) => self.fail("empty text run"),
            _ => ControlFlow::Continue(()),
        }
    }
}

fn mdpass_counts(input: &str) -> Counts {
    let options = Dialect::Github.options() | Options::LATEX_MATH_SPANS | Options::WIKI_LINKS;
    let mut checker = Checker::default();
    let result = Parser::new(options).parse(input, &mut checker);
    if let Some(what) = checker.broken {
        panic!("{} in {:?}", what, input);
    }
    assert!(result.is_ok(), "parse failed for {:?}: {:?}", input, result);
    assert!(checker.stack.is_empty(), "unclosed events for {:?}", input);
    checker.counts
}

fn pulldown_counts(input: &str) -> Counts {
    let options =
        MdOptions::ENABLE_TABLES | MdOptions::ENABLE_STRIKETHROUGH | MdOptions::ENABLE_TASKLISTS;
    let mut counts = Counts::default();
    let mut lists_open = 0u32;
    for event in MdParser::new_ext(input, options) {
        let kind = match event {
            Event::Start(Tag::Heading { .. }) => Kind::Heading,
            Event::Start(Tag::Paragraph) if lists_open == 0 => Kind::Paragraph,
            Event::Start(Tag::List(_)) => {
                lists_open += 1;
                Kind::List
            }
            Event::Start(Tag::Item) => Kind::Item,
            Event::Start(Tag::Table(_)) => Kind::Table,
            Event::Start(Tag::CodeBlock(_)) => Kind::Code,
            Event::End(TagEnd::List(_)) => {
                lists_open = lists_open.saturating_sub(1);
                continue;
            }
            _ => continue,
        };
        counts.bump(kind);
    }
    counts
}

// =============================================================================
// Mutations
// =============================================================================

/// Deterministic xorshift generator, so every run sees the same variants.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            (self.next() % n as u64) as usize
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Mutation {
    /// Remove the last code fence line, closing or opening.
    DropFence,
    /// Turn `|---|` into a bare `---`.
    BreakDelimiterRow,
    /// Join the first two blocks separated by a blank line.
    JoinBlocks,
    /// Cut up to a quarter of the document off the end.
    CutTail,
    /// Remove the first bullet marker.
    StripBullet,
    /// Double every blank line.
    SpreadBlocks,
    /// Indent every line after the first by two spaces.
    Indent,
    /// Turn the first `](` into `(`.
    BreakLink,
}

const MUTATIONS: [Mutation; 8] = [
    Mutation::DropFence,
    Mutation::BreakDelimiterRow,
    Mutation::JoinBlocks,
    Mutation::CutTail,
    Mutation::StripBullet,
    Mutation::SpreadBlocks,
    Mutation::Indent,
    Mutation::BreakLink,
];

const STEPS_PER_VARIANT: usize = 3;
const VARIANTS: usize = 16;

fn replace_once(input: &mut String, find: &str, with: &str, last: bool) {
    let at = if last { input.rfind(find) } else { input.find(find) };
    if let Some(at) = at {
        input.replace_range(at..at + find.len(), with);
    }
}

impl Mutation {
    fn apply(self, input: &mut String, rng: &mut Rng) {
        match self {
            Mutation::DropFence => replace_once(input, "```\n", "", true),
            Mutation::BreakDelimiterRow => replace_once(input, "|---|", "---", false),
            Mutation::JoinBlocks => replace_once(input, "\n\n", "\n", false),
            Mutation::CutTail => {
                let mut keep = input.len() - rng.below(input.len() / 4 + 1);
                while !input.is_char_boundary(keep) {
                    keep -= 1;
                }
                input.truncate(keep);
            }
            Mutation::StripBullet => replace_once(input, "- ", "", false),
            Mutation::SpreadBlocks => *input = input.replace("\n\n", "\n\n\n"),
            Mutation::Indent => *input = input.replace('\n', "\n  "),
            Mutation::BreakLink => replace_once(input, "](", "(", false),
        }
    }
}

fn variants(input: &str, seed: u64) -> Vec<String> {
    let mut rng = Rng(seed);
    (0..VARIANTS)
        .map(|_| {
            let mut text = input.to_string();
            for _ in 0..STEPS_PER_VARIANT {
                MUTATIONS[rng.below(MUTATIONS.len())].apply(&mut text, &mut rng);
            }
            text
        })
        .collect()
}

// =============================================================================
// Cases
// =============================================================================

const CASES: &[(&str, &str)] = &[
    (
        "basic",
        "# Title\n\nSome text with a [link](/url) here.\n\n- one\n- two\n- three\n\n```rust\nfn main() {}\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
    ),
    (
        "nested",
        "# Outline\n\n- top\n  - inner one\n  - inner two\n- next\n\n> quoted paragraph\n> continues\n\n## Tail\n\nclosing words\n",
    ),
    (
        "missing_code_end",
        "Intro paragraph.\n\n```\nunterminated code\n\n# not a heading\n",
    ),
];

fn expected(name: &str) -> Counts {
    use Kind::*;
    match name {
        "basic" => Counts::of(&[(Heading, 1), (Paragraph, 1), (List, 1), (Item, 3), (Table, 1), (Code, 1)]),
        "nested" => Counts::of(&[(Heading, 2), (Paragraph, 2), (List, 2), (Item, 4)]),
        "missing_code_end" => Counts::of(&[(Paragraph, 1), (Code, 1)]),
        _ => unreachable!("no expectation for {name}"),
    }
}

#[test]
fn clean_documents_match_expected_counts() {
    for &(name, input) in CASES {
        let ours = mdpass_counts(input);
        let theirs = pulldown_counts(input);
        println!("{name}\tmdpass {ours:?}\tpulldown {theirs:?}");
        assert_eq!(ours, expected(name), "case {name}");
        assert_eq!(ours, theirs, "case {name}");
    }
}

#[test]
fn damaged_documents_parse_cleanly() {
    let mut total = 0.0;
    let mut count = 0usize;

    for (n, &(name, input)) in CASES.iter().enumerate() {
        let scores: Vec<f64> = variants(input, 0x5eed + n as u64)
            .iter()
            .map(|v| agreement(&mdpass_counts(v), &pulldown_counts(v)))
            .collect();
        let worst = scores.iter().copied().fold(1.0, f64::min);
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;
        println!("{name}_noisy\tagreement {avg:.2}\tworst {worst:.2}\tvariants {}", scores.len());
        total += scores.iter().sum::<f64>();
        count += scores.len();
    }

    let avg = total / count as f64;
    assert!(avg >= 0.5, "average agreement with pulldown-cmark {:.2}", avg);
}

#[test]
fn truncation_at_every_byte() {
    for &(_, input) in CASES {
        for len in 0..=input.len() {
            mdpass_counts(&input[..len]);
        }
    }
}
