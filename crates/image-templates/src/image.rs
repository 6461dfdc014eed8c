//! Bound images: a template plus the concrete values a match captured.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use semver::Version;
use serde::Serialize;

use crate::template::{TagSegment, Template};

/// A template bound to captured values: zero or more versions (one per
/// version placeholder, in encounter order) and/or a digest token.
///
/// Images are cheap value objects produced per match or per registry tag
/// considered. Their total order ([`Ord`]) underlies every "is this an
/// upgrade" decision; equality is defined by that order, not by field
/// identity, so case-folded hosts and tag literals compare equal.
#[derive(Debug, Clone)]
pub struct Image {
    template: Arc<Template>,
    versions: Vec<Version>,
    digest: Option<String>,
}

/// One concrete tag element, for ordering purposes.
enum Element<'a> {
    Literal(&'a str),
    Version(&'a Version),
}

impl Image {
    /// Binds `template` to captured values.
    pub fn new(template: Arc<Template>, versions: Vec<Version>, digest: Option<String>) -> Image {
        Image {
            template,
            versions,
            digest,
        }
    }

    /// The bound template.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The captured versions, in encounter order.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// The captured digest token (`sha256:` prefix included), if any.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The concrete tag, or `None` when the capture count does not line up
    /// with the template's placeholders (a digest-only binding).
    pub fn tag(&self) -> Option<String> {
        if self.versions.len() != self.template.version_slots() {
            return None;
        }
        let mut out = String::new();
        let mut versions = self.versions.iter();
        for segment in self.template.tag_segments() {
            match segment {
                TagSegment::Literal(text) => out.push_str(text),
                TagSegment::Float(_) => {
                    if let Some(version) = versions.next() {
                        out.push_str(&version.to_string());
                    }
                }
            }
        }
        Some(out)
    }

    /// Renders the canonical display form: slug, concrete tag when
    /// available, digest when captured.
    pub fn render(&self) -> String {
        let mut out = self.template.slug();
        if let Some(tag) = self.tag() {
            out.push(':');
            out.push_str(&tag);
        }
        if let Some(digest) = &self.digest {
            out.push('@');
            out.push_str(digest);
        }
        out
    }

    /// Whether replacing this image with `other` is an update this system
    /// would propose. Candidates must describe the same repository and
    /// image name; `allow_downgrade` admits any non-equal candidate rather
    /// than only strictly newer ones.
    pub fn can_upgrade_to(&self, other: &Image, allow_downgrade: bool) -> bool {
        if !self
            .template
            .registry()
            .eq_ignore_ascii_case(other.template.registry())
            || !self
                .template
                .name()
                .eq_ignore_ascii_case(other.template.name())
        {
            return false;
        }
        match self.cmp(other) {
            Ordering::Less => true,
            Ordering::Equal => false,
            Ordering::Greater => allow_downgrade,
        }
    }

    /// The concrete tag elements, or none at all for a binding whose
    /// capture count disagrees with its template.
    fn elements(&self) -> Vec<Element<'_>> {
        if self.versions.len() != self.template.version_slots() {
            return Vec::new();
        }
        let mut elements = Vec::with_capacity(self.template.tag_segments().len());
        let mut versions = self.versions.iter();
        for segment in self.template.tag_segments() {
            match segment {
                TagSegment::Literal(text) => elements.push(Element::Literal(text)),
                TagSegment::Float(_) => {
                    if let Some(version) = versions.next() {
                        elements.push(Element::Version(version));
                    }
                }
            }
        }
        elements
    }

    fn compare_elements(&self, other: &Self) -> Ordering {
        let ours = self.elements();
        let theirs = other.elements();
        for (left, right) in ours.iter().zip(&theirs) {
            let ordering = match (left, right) {
                (Element::Literal(left), Element::Literal(right)) => {
                    compare_ascii_ci(left, right)
                }
                (Element::Version(left), Element::Version(right)) => left.cmp(right),
                // A captured version sorts before literal text at the same
                // position, keeping the order total across templates.
                (Element::Version(_), Element::Literal(_)) => Ordering::Less,
                (Element::Literal(_), Element::Version(_)) => Ordering::Greater,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        ours.len().cmp(&theirs.len())
    }
}

impl Ord for Image {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ascii_ci(self.template.registry(), other.template.registry())
            .then_with(|| compare_ascii_ci(self.template.name(), other.template.name()))
            .then_with(|| self.compare_elements(other))
            .then_with(|| self.digest.cmp(&other.digest))
    }
}

impl PartialOrd for Image {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Image {}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Serialize for Image {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

fn compare_ascii_ci(left: &str, right: &str) -> Ordering {
    left.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(right.bytes().map(|b| b.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use semver::Version;

    use super::Image;
    use crate::template::Template;

    fn versioned(template: &Arc<Template>, version: &str) -> Image {
        Image::new(
            template.clone(),
            vec![Version::parse(version).unwrap()],
            None,
        )
    }

    #[test]
    fn test_render() {
        let template = Arc::new(Template::parse("nginx").unwrap());
        let image = versioned(&template, "1.25.3");
        assert_eq!(image.render(), "docker.io/library/nginx:1.25.3");
        assert_eq!(image.tag(), Some("1.25.3".into()));

        let digest = "sha256:".to_string() + &"a1".repeat(32);
        let pinned = Image::new(template, vec![], Some(digest.clone()));
        // No tag can be rendered for a digest-only binding.
        assert_eq!(pinned.tag(), None);
        assert_eq!(pinned.render(), format!("docker.io/library/nginx@{digest}"));
    }

    #[test]
    fn test_version_ordering() {
        let template = Arc::new(Template::parse("nginx").unwrap());
        assert!(versioned(&template, "1.2.3") < versioned(&template, "1.10.0"));
        assert!(versioned(&template, "1.10.0-rc.1") < versioned(&template, "1.10.0"));
        assert!(versioned(&template, "2.0.0") > versioned(&template, "1.99.99"));
        assert_eq!(versioned(&template, "1.2.3"), versioned(&template, "1.2.3"));
    }

    #[test]
    fn test_host_and_name_order_first() {
        let nginx = Arc::new(Template::parse("nginx").unwrap());
        let zlib = Arc::new(Template::parse("zlib").unwrap());
        let hosted = Arc::new(Template::parse("repository.com/nginx").unwrap());
        assert!(versioned(&nginx, "9.9.9") < versioned(&zlib, "0.0.1"));
        assert!(versioned(&nginx, "9.9.9") < versioned(&hosted, "0.0.1"));
    }

    #[test]
    fn test_literal_case_folds() {
        let upper = Arc::new(Template::parse("app:{v}-RC").unwrap());
        let lower = Arc::new(Template::parse("app:{v}-rc").unwrap());
        assert_eq!(versioned(&upper, "1.0.0"), versioned(&lower, "1.0.0"));
    }

    #[test]
    fn test_version_sorts_before_literal() {
        let floating = Arc::new(Template::parse("app").unwrap());
        let pinned = Arc::new(Template::parse("app:latest").unwrap());
        let tagged = Image::new(pinned, vec![], None);
        assert!(versioned(&floating, "99.0.0") < tagged);
    }

    #[test]
    fn test_shorter_segments_order_first() {
        let short = Arc::new(Template::parse("app").unwrap());
        let long = Arc::new(Template::parse("app:{v}-alpine").unwrap());
        assert!(versioned(&short, "1.0.0") < versioned(&long, "1.0.0"));
    }

    #[test]
    fn test_digest_breaks_ties() {
        let template = Arc::new(Template::parse("nginx").unwrap());
        let plain = versioned(&template, "1.0.0");
        let pinned = Image::new(
            template.clone(),
            vec![Version::parse("1.0.0").unwrap()],
            Some(format!("sha256:{}", "ab".repeat(32))),
        );
        assert!(plain < pinned);
    }

    #[test]
    fn test_can_upgrade_to() {
        let template = Arc::new(Template::parse("nginx").unwrap());
        let current = versioned(&template, "1.2.3");
        let newer = versioned(&template, "1.3.0");
        let equal = versioned(&template, "1.2.3");

        assert!(current.can_upgrade_to(&newer, false));
        assert!(!newer.can_upgrade_to(&current, false));
        assert!(newer.can_upgrade_to(&current, true));
        assert!(!current.can_upgrade_to(&equal, false));
        assert!(!current.can_upgrade_to(&equal, true));

        // Candidates must describe the same repository and image.
        let other = Arc::new(Template::parse("zlib").unwrap());
        assert!(!current.can_upgrade_to(&versioned(&other, "9.9.9"), false));
    }

    #[test]
    fn test_serialize() {
        let template = Arc::new(Template::parse("nginx").unwrap());
        let image = versioned(&template, "1.25.3");
        assert_eq!(
            serde_json::to_string(&image).unwrap(),
            r#""docker.io/library/nginx:1.25.3""#
        );
    }
}
