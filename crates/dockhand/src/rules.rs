//! Rule sets: the deserialized configuration that compiles into one
//! search tree per scan.
//!
//! Configuration file discovery and loading are the embedding CLI's
//! concern; this module starts at the deserialized [`RuleSet`] and
//! validates everything exactly once, before any file is scanned.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use image_templates::{
    PatternError, PatternOptions, SearchTree, Template, TemplateError, TreeBuilder,
};

use crate::scanner::Scanner;

/// A rule-set compilation error, carrying the offending rule's position.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("rule {index}: {source}")]
pub struct RuleError {
    /// Zero-based index of the offending rule.
    pub index: usize,
    /// What went wrong.
    pub source: RuleErrorKind,
}

/// The kinds of rule compilation failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuleErrorKind {
    /// The rule's template text failed to parse.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The rule's pattern failed to compile against its template.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// One configured rule.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// The template reference text.
    pub template: String,

    /// Custom pattern text, for occurrences that do not look like the
    /// template's own written rendering.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Group label for batching proposed updates.
    #[serde(default)]
    pub group: Option<String>,
}

/// A deserialized rule set.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// The rules, in declaration order.
    pub rules: Vec<Rule>,
}

/// A rule set compiled into its runtime form.
///
/// Compilation happens once per scan; later rules win ties against
/// earlier ones when two rules produce patterns with an identical match
/// shape.
#[derive(Debug)]
pub struct CompiledRules {
    tree: SearchTree,
    groups: IndexMap<String, Vec<Arc<Template>>>,
}

impl CompiledRules {
    /// Compiles `rules`: parses every template, compiles every pattern,
    /// and merges them into one search tree.
    pub fn compile(rules: &RuleSet) -> Result<CompiledRules, RuleError> {
        let mut builder = TreeBuilder::new();
        let mut groups: IndexMap<String, Vec<Arc<Template>>> = IndexMap::new();

        for (index, rule) in rules.rules.iter().enumerate() {
            let template = rule
                .template
                .parse::<Template>()
                .map_err(|err| RuleError {
                    index,
                    source: err.into(),
                })?;
            let group = rule.group.as_deref();
            let pattern = match &rule.pattern {
                Some(text) => template.custom_pattern(text, group),
                None => template.pattern(PatternOptions {
                    group,
                    ..Default::default()
                }),
            }
            .map_err(|err| RuleError {
                index,
                source: err.into(),
            })?;

            debug!(template = %template, pattern = %pattern, "compiled rule");
            groups
                .entry(pattern.group().to_string())
                .or_default()
                .push(Arc::new(template));
            builder.add(pattern);
        }

        Ok(CompiledRules {
            tree: builder.build(),
            groups,
        })
    }

    /// The merged search tree.
    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    /// Group labels to their templates, in first-seen order.
    pub fn groups(&self) -> &IndexMap<String, Vec<Arc<Template>>> {
        &self.groups
    }

    /// A scanner borrowing this rule set's tree.
    pub fn scanner(&self) -> Scanner<'_> {
        Scanner::new(&self.tree)
    }
}
