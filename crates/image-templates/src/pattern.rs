//! Patterns: compiled text matchers derived from templates.
//!
//! A pattern is a forward-linked chain of parts. The chain is what the
//! trie builder merges; the originating [`Template`] rides along so a
//! successful match can be bound into an [`Image`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::image::Image;
use crate::range::FloatRange;
use crate::template::{TagSegment, Template};

const VERSION_TOKEN: &str = "{v}";
const DIGEST_TOKEN: &str = "{digest}";

/// Errors raised while compiling a pattern against its template.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern text was empty.
    #[error("pattern text is empty")]
    Empty,

    /// The pattern's version placeholders disagree with the template's
    /// version segments.
    #[error("pattern `{pattern}` captures {found} versions but `{template}` declares {declared}")]
    VersionCountMismatch {
        /// The offending pattern text.
        pattern: String,
        /// Version placeholders found in the pattern text.
        found: usize,
        /// Version segments the template declares.
        declared: usize,
        /// The canonical rendering of the template.
        template: String,
    },
}

/// One link in a pattern's part chain.
///
/// Chains are singly linked and always end in [`Part::End`].
#[derive(Debug, PartialEq, Eq)]
pub enum Part {
    /// Literal text, matched case-insensitively.
    Literal {
        /// The text to match.
        text: String,
        /// The next link.
        next: Box<Part>,
    },
    /// A version capture, re-checked against a float range after capture.
    Version {
        /// The range the captured version must satisfy.
        range: FloatRange,
        /// The next link.
        next: Box<Part>,
    },
    /// A digest capture: `sha256:` plus exactly 64 lowercase alphanumerics.
    Digest {
        /// The next link.
        next: Box<Part>,
    },
    /// The end of the chain.
    End,
}

impl Part {
    /// The next link, or `None` at the end of the chain.
    pub fn next(&self) -> Option<&Part> {
        match self {
            Part::Literal { next, .. } | Part::Version { next, .. } | Part::Digest { next } => {
                Some(next)
            }
            Part::End => None,
        }
    }
}

/// A compiled matcher: a part chain bound to the template that produced it.
///
/// Equality considers the part chain and template only; the text and group
/// label are presentation.
#[derive(Debug)]
pub struct Pattern {
    pub(crate) template: Arc<Template>,
    pub(crate) head: Part,
    text: String,
    group: String,
}

impl Pattern {
    fn compile(
        template: Arc<Template>,
        text: &str,
        group: Option<&str>,
        any_version: bool,
    ) -> Result<Pattern, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }

        let tokens = tokenize(text);
        let found = tokens
            .iter()
            .filter(|token| matches!(token, Token::Version))
            .count();
        let has_digest = tokens.iter().any(|token| matches!(token, Token::Digest));
        let declared = template.version_slots();
        if found != declared && !(has_digest && found == 0) {
            return Err(PatternError::VersionCountMismatch {
                pattern: text.into(),
                found,
                declared,
                template: template.render(),
            });
        }

        let ranges: Vec<FloatRange> = if any_version {
            vec![FloatRange::Any; found]
        } else {
            template.float_ranges().collect()
        };

        Ok(Pattern {
            head: chain(&tokens, &ranges),
            template,
            text: text.into(),
            group: group.unwrap_or(text).into(),
        })
    }

    /// The originating template.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The canonical pattern text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The group label used downstream for batching proposed updates.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The first link of the part chain.
    pub fn parts(&self) -> &Part {
        &self.head
    }

    /// The number of version captures this pattern performs.
    pub fn version_slots(&self) -> usize {
        let mut count = 0;
        let mut part = Some(&self.head);
        while let Some(current) = part {
            if matches!(current, Part::Version { .. }) {
                count += 1;
            }
            part = current.next();
        }
        count
    }

    /// Whether this pattern captures a digest.
    pub fn captures_digest(&self) -> bool {
        let mut part = Some(&self.head);
        while let Some(current) = part {
            if matches!(current, Part::Digest { .. }) {
                return true;
            }
            part = current.next();
        }
        false
    }

    /// Renders this pattern's text with `image`'s captured values spliced
    /// into the placeholders, or `None` when the counts disagree. This is
    /// the replacement text used when proposing an update.
    pub fn instantiate(&self, image: &Image) -> Option<String> {
        let mut out = String::new();
        let mut versions = image.versions().iter();
        let mut part = &self.head;
        loop {
            match part {
                Part::Literal { text, next } => {
                    out.push_str(text);
                    part = next;
                }
                Part::Version { next, .. } => {
                    out.push_str(&versions.next()?.to_string());
                    part = next;
                }
                Part::Digest { next } => {
                    out.push_str(image.digest()?);
                    part = next;
                }
                Part::End => break,
            }
        }
        versions.next().is_none().then_some(out)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.template == other.template
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Selects which parts of a template's written rendering a derived pattern
/// matches.
#[derive(Debug, Clone, Copy)]
pub struct PatternOptions<'a> {
    /// Include the registry host (only present when the template wrote one).
    pub repository: bool,
    /// Include the image name.
    pub image: bool,
    /// Include the tag structure.
    pub tag: bool,
    /// Include the digest marker (only present when the template requires
    /// a digest).
    pub digest: bool,
    /// Widen every version capture to [`FloatRange::Any`].
    pub any_version: bool,
    /// Group label override.
    pub group: Option<&'a str>,
}

impl Default for PatternOptions<'_> {
    fn default() -> Self {
        PatternOptions {
            repository: true,
            image: true,
            tag: true,
            digest: true,
            any_version: false,
            group: None,
        }
    }
}

impl Template {
    /// Compiles `text` into a pattern bound to this template.
    ///
    /// Only `{v}` and `{digest}` are special in pattern text; braces that
    /// do not open one of those two tokens are ordinary literal text.
    /// Version captures take this template's declared ranges, in order.
    pub fn custom_pattern(&self, text: &str, group: Option<&str>) -> Result<Pattern, PatternError> {
        Pattern::compile(Arc::new(self.clone()), text, group, false)
    }

    /// Compiles the pattern selected by `options` from this template's
    /// written rendering.
    pub fn pattern(&self, options: PatternOptions<'_>) -> Result<Pattern, PatternError> {
        let mut text = String::new();
        if options.repository
            && let Some(host) = &self.written_registry
        {
            text.push_str(host);
            text.push('/');
        }
        if options.image {
            text.push_str(&self.written_name);
        }
        if options.tag {
            // A bare tag pattern has no name to separate from.
            if !text.is_empty() {
                text.push(':');
            }
            for segment in &self.tag {
                match segment {
                    TagSegment::Literal(literal) => text.push_str(literal),
                    TagSegment::Float(_) => text.push_str(VERSION_TOKEN),
                }
            }
        }
        if options.digest && self.requires_digest {
            text.push('@');
            text.push_str(DIGEST_TOKEN);
        }

        Pattern::compile(
            Arc::new(self.clone()),
            &text,
            options.group,
            options.any_version,
        )
    }

    /// The pattern matching this template's full written rendering.
    pub fn default_pattern(&self) -> Result<Pattern, PatternError> {
        self.pattern(PatternOptions::default())
    }

    /// The tag-only pattern with every version capture widened, used to
    /// test whether registry tags belong to this template's family.
    pub fn tag_pattern(&self) -> Result<Pattern, PatternError> {
        self.pattern(PatternOptions {
            repository: false,
            image: false,
            tag: true,
            digest: false,
            any_version: true,
            group: None,
        })
    }
}

enum Token {
    Literal(String),
    Version,
    Digest,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(VERSION_TOKEN) {
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Version);
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(DIGEST_TOKEN) {
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Digest);
            rest = tail;
        } else {
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                literal.push(ch);
            }
            rest = chars.as_str();
        }
    }
    flush(&mut literal, &mut tokens);

    tokens
}

fn flush(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

/// Links tokens into a chain, tail first, assigning ranges to version
/// captures positionally.
fn chain(tokens: &[Token], ranges: &[FloatRange]) -> Part {
    let mut ranges = ranges.iter().copied().rev();
    let mut next = Part::End;
    for token in tokens.iter().rev() {
        next = match token {
            Token::Literal(text) => Part::Literal {
                text: text.clone(),
                next: Box::new(next),
            },
            Token::Version => Part::Version {
                range: ranges.next().unwrap_or(FloatRange::Any),
                next: Box::new(next),
            },
            Token::Digest => Part::Digest {
                next: Box::new(next),
            },
        };
    }
    next
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use semver::Version;

    use super::{Part, PatternError, PatternOptions};
    use crate::image::Image;
    use crate::range::FloatRange;
    use crate::template::Template;

    #[test]
    fn test_default_pattern() {
        let template = Template::parse("nginx").unwrap();
        let pattern = template.default_pattern().unwrap();
        assert_eq!(pattern.text(), "nginx:{v}");
        assert_eq!(pattern.group(), "nginx:{v}");
        assert_eq!(pattern.version_slots(), 1);
        assert!(!pattern.captures_digest());
        assert_eq!(
            *pattern.parts(),
            Part::Literal {
                text: "nginx:".into(),
                next: Box::new(Part::Version {
                    range: FloatRange::Any,
                    next: Box::new(Part::End),
                }),
            }
        );
    }

    #[test]
    fn test_default_pattern_with_host_and_digest() {
        let template = Template::parse("quay.io/team/app:{v1.*}@{digest}").unwrap();
        let pattern = template.default_pattern().unwrap();
        assert_eq!(pattern.text(), "quay.io/team/app:{v}@{digest}");
        assert_eq!(pattern.version_slots(), 1);
        assert!(pattern.captures_digest());
        match pattern.parts() {
            Part::Literal { text, next } => {
                assert_eq!(text, "quay.io/team/app:");
                match next.as_ref() {
                    Part::Version { range, .. } => assert_eq!(*range, FloatRange::Major(1)),
                    part => panic!("unexpected part: {part:?}"),
                }
            }
            part => panic!("unexpected part: {part:?}"),
        }
    }

    #[test]
    fn test_custom_pattern_version_count() {
        let template = Template::parse("nginx").unwrap();
        assert!(template.custom_pattern("nginx-{v}", None).is_ok());
        assert_eq!(
            template.custom_pattern("nginx:latest", None),
            Err(PatternError::VersionCountMismatch {
                pattern: "nginx:latest".into(),
                found: 0,
                declared: 1,
                template: "docker.io/library/nginx:{v}".into(),
            })
        );
        assert_eq!(template.custom_pattern("", None), Err(PatternError::Empty));
    }

    #[test]
    fn test_digest_relaxes_version_count() {
        let template = Template::parse("nginx@{digest}").unwrap();
        // The template declares one version segment, but a digest capture
        // alone is enough to identify an occurrence.
        assert!(template.custom_pattern("nginx@{digest}", None).is_ok());
        assert!(template.custom_pattern("nginx:{v}@{digest}", None).is_ok());
        assert!(
            template
                .custom_pattern("nginx:{v}.{v}@{digest}", None)
                .is_err()
        );
    }

    #[test]
    fn test_stray_braces_are_literal() {
        let template = Template::parse("app").unwrap();
        let pattern = template.custom_pattern("app:{latest}-{v}", None).unwrap();
        assert_eq!(pattern.version_slots(), 1);
        match pattern.parts() {
            Part::Literal { text, .. } => assert_eq!(text, "app:{latest}-"),
            part => panic!("unexpected part: {part:?}"),
        }

        // `{v*}` is only placeholder syntax in template text, not here.
        let pattern = template.custom_pattern("app:{v*}{v}", None).unwrap();
        match pattern.parts() {
            Part::Literal { text, .. } => assert_eq!(text, "app:{v*}"),
            part => panic!("unexpected part: {part:?}"),
        }
    }

    #[test]
    fn test_tag_pattern_widens() {
        let template = Template::parse("nginx:{v1.*}").unwrap();
        let pattern = template.tag_pattern().unwrap();
        assert_eq!(pattern.text(), "{v}");
        match pattern.parts() {
            Part::Version { range, .. } => assert_eq!(*range, FloatRange::Any),
            part => panic!("unexpected part: {part:?}"),
        }
    }

    #[test]
    fn test_pattern_options_toggles() {
        let template = Template::parse("nginx:1.{v25.*}").unwrap();
        let tag_only = template
            .pattern(PatternOptions {
                repository: false,
                image: false,
                digest: false,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tag_only.text(), "1.{v}");

        // The digest toggle selects a template part; it cannot invent one.
        let with_digest = template.pattern(PatternOptions::default()).unwrap();
        assert_eq!(with_digest.text(), "nginx:1.{v}");
    }

    #[test]
    fn test_instantiate() {
        let template = Template::parse("nginx").unwrap();
        let pattern = template.default_pattern().unwrap();
        let image = Image::new(
            Arc::new(template.clone()),
            vec![Version::parse("1.25.3").unwrap()],
            None,
        );
        assert_eq!(pattern.instantiate(&image), Some("nginx:1.25.3".into()));

        // Capture counts must line up exactly.
        let bare = Image::new(Arc::new(template), vec![], None);
        assert_eq!(pattern.instantiate(&bare), None);
    }

    #[test]
    fn test_equality_is_chain_and_template() {
        let first = Template::parse("abcd1234:{v}").unwrap();
        let second = Template::parse("abcd12345:{v}").unwrap();
        let base = first.custom_pattern("abcd1234:{v}", None).unwrap();
        let relabeled = first.custom_pattern("abcd1234:{v}", Some("deploy")).unwrap();
        let other = second.custom_pattern("abcd1234:{v}", None).unwrap();
        assert_eq!(base, relabeled);
        assert_ne!(base, other);
    }
}
