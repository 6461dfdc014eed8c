//! Scanning caller-supplied text for image references.
//!
//! File discovery and reading stay with the caller; this module only
//! walks already-loaded text, line by line, against one frozen tree.

use std::ops::Range;
use std::sync::Arc;

use image_templates::{Image, Pattern, SearchTree};
use serde::Serialize;
use tracing::trace;

/// A byte span within one line.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Starting byte offset, inclusive.
    pub start: usize,
    /// Ending byte offset, exclusive.
    pub end: usize,
}

impl Span {
    /// This span as a range, e.g. for slicing the matched text back out
    /// of its line.
    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One match within a single line.
#[derive(Serialize, Debug, Clone)]
pub struct LineMatch {
    /// Where in the line the match lies.
    pub span: Span,
    /// The bound image.
    pub image: Image,
    /// The pattern that matched; serialized as its group label.
    #[serde(rename = "group", serialize_with = "pattern_group")]
    pub pattern: Arc<Pattern>,
}

/// One match within a larger text.
#[derive(Serialize, Debug, Clone)]
pub struct TextMatch {
    /// 1-based line number.
    pub line: usize,
    /// Where in that line the match lies.
    pub span: Span,
    /// The bound image.
    pub image: Image,
    /// The pattern that matched; serialized as its group label.
    #[serde(rename = "group", serialize_with = "pattern_group")]
    pub pattern: Arc<Pattern>,
}

fn pattern_group<S>(pattern: &Arc<Pattern>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(pattern.group())
}

/// Scans lines and whole texts against one frozen search tree.
///
/// Scanners borrow their tree, so any number of them, on any number of
/// threads, can share one compiled rule set.
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'t> {
    tree: &'t SearchTree,
}

impl<'t> Scanner<'t> {
    /// Creates a scanner over `tree`.
    pub fn new(tree: &'t SearchTree) -> Scanner<'t> {
        Scanner { tree }
    }

    /// Returns every non-overlapping match in `line`, left to right.
    ///
    /// The tree is queried at each offset; a failed query advances one
    /// character, a successful one continues past the consumed text.
    pub fn scan_line(&self, line: &str) -> Vec<LineMatch> {
        let mut matches = Vec::new();
        let mut at = 0;
        while at < line.len() {
            match self.tree.search(&line[at..]) {
                Some(found) => {
                    let span = Span {
                        start: at,
                        end: at + found.consumed,
                    };
                    at = span.end;
                    matches.push(LineMatch {
                        span,
                        image: found.image,
                        pattern: found.pattern,
                    });
                }
                None => {
                    at += line[at..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        matches
    }

    /// Returns every match in `text`, tagged with 1-based line numbers.
    pub fn scan(&self, text: &str) -> Vec<TextMatch> {
        let mut matches = Vec::new();
        for (index, line) in text.lines().enumerate() {
            for found in self.scan_line(line) {
                matches.push(TextMatch {
                    line: index + 1,
                    span: found.span,
                    image: found.image,
                    pattern: found.pattern,
                });
            }
        }
        trace!(lines = text.lines().count(), matches = matches.len(), "scanned text");
        matches
    }
}

#[cfg(test)]
mod tests {
    use image_templates::{SearchTree, Template};
    use pretty_assertions::assert_eq;

    use super::Scanner;

    fn tree_for(references: &[&str]) -> SearchTree {
        SearchTree::build(references.iter().map(|reference| {
            Template::parse(reference)
                .unwrap()
                .default_pattern()
                .unwrap()
        }))
    }

    #[test]
    fn test_scan_line_offsets() {
        let tree = tree_for(&["nginx", "redis"]);
        let scanner = Scanner::new(&tree);

        let line = "    image: nginx:1.25.3 # was redis:7.2.4";
        let matches = scanner.scan_line(line);
        assert_eq!(matches.len(), 2);
        assert_eq!(&line[matches[0].span.as_range()], "nginx:1.25.3");
        assert_eq!(&line[matches[1].span.as_range()], "redis:7.2.4");
        assert_eq!(matches[0].image.tag(), Some("1.25.3".into()));
    }

    #[test]
    fn test_scan_line_does_not_overlap() {
        let tree = tree_for(&["nginx"]);
        let scanner = Scanner::new(&tree);

        // The second reference begins immediately after the first.
        let matches = scanner.scan_line("nginx:1.2.3nginx:4.5.6");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].span.as_range(), 0..11);
        assert_eq!(matches[1].span.as_range(), 11..22);
    }

    #[test]
    fn test_scan_line_survives_multibyte_text() {
        let tree = tree_for(&["nginx"]);
        let scanner = Scanner::new(&tree);

        let line = "# ☕ image nginx:1.2.3";
        let matches = scanner.scan_line(line);
        assert_eq!(matches.len(), 1);
        assert_eq!(&line[matches[0].span.as_range()], "nginx:1.2.3");
    }

    #[test]
    fn test_scan_numbers_lines_from_one() {
        let tree = tree_for(&["nginx", "postgres"]);
        let scanner = Scanner::new(&tree);

        let text = "services:\n  web: nginx:1.25.3\n\n  db: postgres:16.1.0\n";
        let lines: Vec<usize> = scanner.scan(text).iter().map(|found| found.line).collect();
        assert_eq!(lines, [2, 4]);
    }

    #[test]
    fn test_matches_serialize_with_group() {
        let template = Template::parse("nginx").unwrap();
        let tree = SearchTree::build([template
            .pattern(image_templates::PatternOptions {
                group: Some("web"),
                ..Default::default()
            })
            .unwrap()]);
        let matches = Scanner::new(&tree).scan("image: nginx:1.25.3\n");

        assert_eq!(
            serde_json::to_string(&matches).unwrap(),
            r#"[{"line":1,"span":{"start":7,"end":19},"image":"docker.io/library/nginx:1.25.3","group":"web"}]"#
        );
    }
}
