//! Scans repository text for container image references and decides
//! which registry tags qualify as updates.
//!
//! The pipeline is rule-driven: a deserialized [`RuleSet`] compiles
//! into a single [search tree](image_templates::SearchTree), a
//! [`Scanner`] reports every occurrence in a text with line and column
//! spans, and a [`TagFilter`] narrows a repository's tag list down to
//! the template's own family. Registry access, VCS plumbing, and
//! change submission sit above this crate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod rules;
pub mod scanner;
pub mod tags;

pub use rules::{CompiledRules, Rule, RuleError, RuleErrorKind, RuleSet};
pub use scanner::{LineMatch, Scanner, Span, TextMatch};
pub use tags::TagFilter;
