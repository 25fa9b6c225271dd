//! # mdpass core
//!
//! A single-pass, callback-driven Markdown parser.
//!
//! The parser never builds a syntax tree of its own. It reports the
//! structure of the document to an [`EventSink`] as a stream of
//! enter/leave events for blocks and inline spans, with text runs in
//! between, and the sink decides what to build: HTML, a tree, statistics.
//!
//! CommonMark is always on; GitHub extensions (tables, strikethrough,
//! task lists, permissive autolinks), wiki links, math spans and a few
//! behavioral tweaks are independent [`Options`].
//!
//! ## Quick Start
//!
//! ```rust
//! use mdpass_core::{Dialect, Parser, Recorder};
//!
//! let parser = Parser::new(Dialect::Github);
//! let mut recorder = Recorder::new();
//! parser.parse("*a* **b**\n", &mut recorder).unwrap();
//!
//! print!("{}", recorder.dump());
//! ```
//!
//! ## Writing a Sink
//!
//! Every callback has a default that accepts the event, so a sink
//! implements only what it cares about. Returning `ControlFlow::Break`
//! stops the parse.
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use mdpass_core::{Block, EventSink, Options, Parser};
//!
//! #[derive(Default)]
//! struct Headings(usize);
//!
//! impl EventSink for Headings {
//!     fn enter_block(&mut self, block: &Block<'_>) -> ControlFlow<()> {
//!         if let Block::Heading { .. } = block {
//!             self.0 += 1;
//!         }
//!         ControlFlow::Continue(())
//!     }
//! }
//!
//! let mut count = Headings::default();
//! Parser::new(Options::empty())
//!     .parse("# One\n\ntext\n\nTwo\n===\n", &mut count)
//!     .unwrap();
//! assert_eq!(count.0, 2);
//! ```
//!
//! ## Owned Tree
//!
//! [`parse_document`] runs the parser with the [`ast::TreeBuilder`] sink.
//!
//! ```rust
//! use mdpass_core::{parse_document, Options};
//!
//! let doc = parse_document("> quoted", Options::empty()).unwrap();
//! assert_eq!(doc.children.len(), 1);
//! ```

pub mod ast;
mod block;
pub mod error;
pub mod event;
mod html_block;
mod inline;
pub mod lexer;
pub mod options;
pub mod parser;
mod scanner;
pub mod span;

pub use ast::{parse_document, Document, TreeBuilder};
pub use error::Error;
pub use event::{
    Align, AttrText, Attribute, Block, Event, EventSink, Inline, Recorder, TaskMark, TextKind,
};
pub use options::{Dialect, Extension, Options, UnknownName};
pub use parser::Parser;
pub use span::Span;
