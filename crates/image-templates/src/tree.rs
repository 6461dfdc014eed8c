//! The frozen runtime search tree and its query algorithm.

use std::sync::Arc;

use semver::Version;

use crate::builder::TreeBuilder;
use crate::image::Image;
use crate::pattern::Pattern;
use crate::range::FloatRange;

const DIGEST_MARKER: &str = "sha256:";
const DIGEST_HEX_LEN: usize = 64;

/// A successful query.
#[derive(Debug, Clone)]
pub struct Match {
    /// The pattern that matched.
    pub pattern: Arc<Pattern>,
    /// The pattern's template bound to the captured values.
    pub image: Image,
    /// Bytes of input the match consumed.
    pub consumed: usize,
}

/// The frozen, immutable form of a pattern trie.
///
/// Queries keep all per-call state on their own stack, so one tree may
/// serve any number of concurrent callers.
#[derive(Debug)]
pub struct SearchTree {
    root: Node,
}

impl SearchTree {
    pub(crate) fn new(children: Vec<Node>) -> SearchTree {
        SearchTree {
            root: Node::Choice { children },
        }
    }

    /// Builds a tree from `patterns` in one step.
    pub fn build(patterns: impl IntoIterator<Item = Pattern>) -> SearchTree {
        let mut builder = TreeBuilder::new();
        for pattern in patterns {
            builder.add(pattern);
        }
        builder.build()
    }

    /// Queries the tree against the start of `text`.
    ///
    /// Matching is anchored: a match must begin at offset zero. Scanning
    /// inside larger text is the caller's loop (see the engine crate's
    /// scanner). A successful match always consumes at least one byte,
    /// since patterns cannot be empty.
    pub fn search(&self, text: &str) -> Option<Match> {
        let mut captures = Captures::default();
        self.root.search(text, 0, &mut captures)
    }
}

/// In-progress captured values. Every node restores its own modifications
/// on failure, so sibling attempts start from a clean cursor.
#[derive(Debug, Default)]
struct Captures {
    versions: Vec<Version>,
    digest: Option<String>,
}

/// One frozen node. Each variant implements one arm of `search`.
#[derive(Debug)]
pub(crate) enum Node {
    /// Tries each child in priority order; the tree root.
    Choice { children: Vec<Node> },
    /// Matches literal text case-insensitively.
    Literal { text: String, children: Vec<Node> },
    /// Captures the longest parseable version token, backtracking to
    /// shorter prefixes when its branches reject.
    Version { branches: Vec<Node> },
    /// Re-checks the most recent capture against one float range.
    Range {
        range: FloatRange,
        children: Vec<Node>,
    },
    /// Captures a `sha256:` digest token.
    Digest { children: Vec<Node> },
    /// Completes a pattern.
    Leaf { pattern: Arc<Pattern> },
}

impl Node {
    fn search(&self, rest: &str, consumed: usize, captures: &mut Captures) -> Option<Match> {
        match self {
            Node::Choice { children } => children
                .iter()
                .find_map(|child| child.search(rest, consumed, captures)),
            Node::Literal { text, children } => {
                let prefix = rest.as_bytes().get(..text.len())?;
                if !prefix.eq_ignore_ascii_case(text.as_bytes()) {
                    return None;
                }
                let tail = &rest[text.len()..];
                children
                    .iter()
                    .find_map(|child| child.search(tail, consumed + text.len(), captures))
            }
            Node::Version { branches } => {
                let run = rest
                    .bytes()
                    .position(|b| !is_version_byte(b))
                    .unwrap_or(rest.len());
                for len in (1..=run).rev() {
                    let Ok(version) = Version::parse(&rest[..len]) else {
                        continue;
                    };
                    captures.versions.push(version);
                    let tail = &rest[len..];
                    let found = branches
                        .iter()
                        .find_map(|branch| branch.search(tail, consumed + len, captures));
                    if found.is_some() {
                        return found;
                    }
                    captures.versions.pop();
                }
                None
            }
            Node::Range { range, children } => {
                if !captures
                    .versions
                    .last()
                    .is_some_and(|version| range.satisfied_by(version))
                {
                    return None;
                }
                children
                    .iter()
                    .find_map(|child| child.search(rest, consumed, captures))
            }
            Node::Digest { children } => {
                let marker = rest.as_bytes().get(..DIGEST_MARKER.len())?;
                if !marker.eq_ignore_ascii_case(DIGEST_MARKER.as_bytes()) {
                    return None;
                }
                let hex = rest.as_bytes()[DIGEST_MARKER.len()..]
                    .iter()
                    .take_while(|b| is_digest_byte(**b))
                    .count();
                // A longer run means the 65th character would extend the
                // token, so the input is not a digest at all.
                if hex != DIGEST_HEX_LEN {
                    return None;
                }
                let token_len = DIGEST_MARKER.len() + DIGEST_HEX_LEN;
                let previous = captures.digest.replace(rest[..token_len].to_string());
                let tail = &rest[token_len..];
                let found = children
                    .iter()
                    .find_map(|child| child.search(tail, consumed + token_len, captures));
                if found.is_some() {
                    return found;
                }
                captures.digest = previous;
                None
            }
            Node::Leaf { pattern } => Some(Match {
                pattern: Arc::clone(pattern),
                image: Image::new(
                    pattern.template.clone(),
                    captures.versions.clone(),
                    captures.digest.clone(),
                ),
                consumed,
            }),
        }
    }
}

fn is_version_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'+')
}

fn is_digest_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
