//! The mutable trie that merges compiled patterns before freezing.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::pattern::{Part, Pattern};
use crate::range::FloatRange;
use crate::tree::{Node, SearchTree};

/// One node of the in-progress trie.
///
/// Literal parts are exploded into one node per character here, so that
/// patterns sharing any prefix share structure; the freeze pass collapses
/// unbranched character runs back into single literal nodes.
#[derive(Debug)]
enum BuildNode {
    /// One lowercased character of a literal.
    Char {
        ch: char,
        children: Vec<BuildNode>,
    },
    /// The version branch point at this position.
    Version { branches: Vec<BuildNode> },
    /// One range sub-branch under a version branch point.
    Range {
        range: FloatRange,
        children: Vec<BuildNode>,
    },
    /// The digest branch point at this position.
    Digest { children: Vec<BuildNode> },
    /// A completed pattern.
    Leaf { pattern: Arc<Pattern> },
}

/// Merges compiled patterns into one trie and freezes it into a
/// [`SearchTree`].
///
/// This is the only mutable form of the tree. [`TreeBuilder::build`]
/// consumes the builder, so a frozen tree can never be grown again.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    roots: Vec<BuildNode>,
    patterns: usize,
}

impl TreeBuilder {
    /// Creates an empty builder.
    pub fn new() -> TreeBuilder {
        TreeBuilder::default()
    }

    /// Registers `pattern`.
    ///
    /// Re-registering an equal pattern at the same trie position is a
    /// no-op. A distinct pattern with an identical match shape is prepended
    /// before its siblings, which is what makes the most recent
    /// registration win ties at query time.
    pub fn add(&mut self, pattern: Pattern) {
        let pattern = Arc::new(pattern);
        trace!(pattern = %pattern, group = pattern.group(), "registering pattern");

        let mut children = &mut self.roots;
        let mut part = pattern.parts();
        loop {
            match part {
                Part::Literal { text, next } => {
                    for ch in text.chars() {
                        let ch = ch.to_ascii_lowercase();
                        let at = match children.iter().position(
                            |node| matches!(node, BuildNode::Char { ch: existing, .. } if *existing == ch),
                        ) {
                            Some(at) => at,
                            None => {
                                children.push(BuildNode::Char {
                                    ch,
                                    children: Vec::new(),
                                });
                                children.len() - 1
                            }
                        };
                        children = match &mut children[at] {
                            BuildNode::Char { children, .. } => children,
                            _ => unreachable!(),
                        };
                    }
                    part = next;
                }
                Part::Version { range, next } => {
                    let at = match children
                        .iter()
                        .position(|node| matches!(node, BuildNode::Version { .. }))
                    {
                        Some(at) => at,
                        None => {
                            children.push(BuildNode::Version {
                                branches: Vec::new(),
                            });
                            children.len() - 1
                        }
                    };
                    let branches = match &mut children[at] {
                        BuildNode::Version { branches } => branches,
                        _ => unreachable!(),
                    };
                    let at = match branches.iter().position(
                        |node| matches!(node, BuildNode::Range { range: existing, .. } if existing == range),
                    ) {
                        Some(at) => at,
                        None => {
                            branches.push(BuildNode::Range {
                                range: *range,
                                children: Vec::new(),
                            });
                            branches.len() - 1
                        }
                    };
                    children = match &mut branches[at] {
                        BuildNode::Range { children, .. } => children,
                        _ => unreachable!(),
                    };
                    part = next;
                }
                Part::Digest { next } => {
                    let at = match children
                        .iter()
                        .position(|node| matches!(node, BuildNode::Digest { .. }))
                    {
                        Some(at) => at,
                        None => {
                            children.push(BuildNode::Digest {
                                children: Vec::new(),
                            });
                            children.len() - 1
                        }
                    };
                    children = match &mut children[at] {
                        BuildNode::Digest { children } => children,
                        _ => unreachable!(),
                    };
                    part = next;
                }
                Part::End => {
                    let registered = children.iter().any(
                        |node| matches!(node, BuildNode::Leaf { pattern: existing } if **existing == *pattern),
                    );
                    if !registered {
                        children.insert(0, BuildNode::Leaf { pattern });
                        self.patterns += 1;
                    }
                    break;
                }
            }
        }
    }

    /// Freezes the trie into its immutable runtime form.
    pub fn build(self) -> SearchTree {
        let children = freeze_children(self.roots);
        debug!(
            patterns = self.patterns,
            nodes = count_nodes(&children),
            "froze search tree"
        );
        SearchTree::new(children)
    }
}

fn freeze(node: BuildNode) -> Node {
    match node {
        BuildNode::Char { ch, children } => {
            let mut text = String::from(ch);
            let mut children = children;
            // Collapse unbranched character runs into one literal.
            while children.len() == 1 && matches!(children[0], BuildNode::Char { .. }) {
                match children.pop() {
                    Some(BuildNode::Char {
                        ch,
                        children: grandchildren,
                    }) => {
                        text.push(ch);
                        children = grandchildren;
                    }
                    _ => break,
                }
            }
            Node::Literal {
                text,
                children: freeze_children(children),
            }
        }
        BuildNode::Version { branches } => Node::Version {
            branches: freeze_children(branches),
        },
        BuildNode::Range { range, children } => Node::Range {
            range,
            children: freeze_children(children),
        },
        BuildNode::Digest { children } => Node::Digest {
            children: freeze_children(children),
        },
        BuildNode::Leaf { pattern } => Node::Leaf { pattern },
    }
}

/// Freezes a sibling set and orders it: terminals first, then literals
/// longest-first, then version and digest continuations. The sort is
/// stable, so equal-priority siblings keep their build order.
fn freeze_children(nodes: Vec<BuildNode>) -> Vec<Node> {
    let mut frozen: Vec<Node> = nodes.into_iter().map(freeze).collect();
    frozen.sort_by(|left, right| {
        rank(left)
            .cmp(&rank(right))
            .then_with(|| literal_len(right).cmp(&literal_len(left)))
    });
    frozen
}

fn rank(node: &Node) -> u8 {
    match node {
        Node::Leaf { .. } => 0,
        Node::Literal { .. } => 1,
        Node::Choice { .. } | Node::Version { .. } | Node::Range { .. } | Node::Digest { .. } => 2,
    }
}

fn literal_len(node: &Node) -> usize {
    match node {
        Node::Literal { text, .. } => text.len(),
        _ => 0,
    }
}

fn count_nodes(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|node| match node {
            Node::Choice { children }
            | Node::Literal { children, .. }
            | Node::Version { branches: children }
            | Node::Range { children, .. }
            | Node::Digest { children } => 1 + count_nodes(children),
            Node::Leaf { .. } => 1,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{TreeBuilder, count_nodes, freeze_children};
    use crate::template::Template;

    #[test]
    fn test_freeze_counts_shared_structure_once() {
        let mut builder = TreeBuilder::new();
        for name in ["abcd1234", "abcd12345"] {
            let template = Template::parse(name).unwrap();
            builder.add(template.default_pattern().unwrap());
        }
        assert_eq!(builder.patterns, 2);

        // One shared literal, then per branch a literal, a version
        // branch point, its range, and a leaf.
        let children = freeze_children(builder.roots);
        assert_eq!(count_nodes(&children), 9);
    }
}
