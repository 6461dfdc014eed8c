//! Tag filtering: deciding which registry tags belong to a template's
//! family.
//!
//! The planner fetches the full tag list for a repository and needs to
//! discard tags that do not even have the template's shape (`latest`,
//! architecture suffixes, nightly builds) before it can reason about
//! upgrades. A [`TagFilter`] does that with the template's own tag
//! pattern, widened so that out-of-range versions still bind; range
//! policy is applied later, against the candidate list.

use image_templates::{Image, PatternError, SearchTree, Template};
use tracing::trace;

/// A matcher over an image template's tag grammar.
#[derive(Debug)]
pub struct TagFilter {
    tree: SearchTree,
}

impl TagFilter {
    /// Builds a filter for `template`'s tag family.
    pub fn new(template: &Template) -> Result<TagFilter, PatternError> {
        Ok(TagFilter {
            tree: SearchTree::build([template.tag_pattern()?]),
        })
    }

    /// Binds one tag, returning the captured image if the whole tag
    /// has the template's shape.
    ///
    /// A prefix match is not enough: `1.2.3.4` starts with a valid
    /// semver version but is not a member of a `{v}` family.
    pub fn bind(&self, tag: &str) -> Option<Image> {
        let found = self.tree.search(tag)?;
        if found.consumed != tag.len() {
            trace!(tag, consumed = found.consumed, "partial tag match rejected");
            return None;
        }
        Some(found.image)
    }

    /// Binds every tag in `tags` and returns the members of the family
    /// in ascending order, so the best upgrade candidate is last.
    pub fn candidates<I, S>(&self, tags: I) -> Vec<Image>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut images: Vec<Image> = tags
            .into_iter()
            .filter_map(|tag| self.bind(tag.as_ref()))
            .collect();
        images.sort();
        images
    }
}

#[cfg(test)]
mod tests {
    use image_templates::Template;
    use pretty_assertions::assert_eq;
    use semver::Version;

    use super::TagFilter;

    fn filter(template: &str) -> TagFilter {
        TagFilter::new(&template.parse::<Template>().unwrap()).unwrap()
    }

    #[test]
    fn test_bind_requires_the_whole_tag() {
        let filter = filter("nginx");

        let image = filter.bind("1.25.3").unwrap();
        assert_eq!(image.versions(), [Version::new(1, 25, 3)]);

        // A semver prefix alone does not make a family member.
        assert_eq!(filter.bind("1.2.3.4"), None);
        assert_eq!(filter.bind("latest"), None);
        assert_eq!(filter.bind(""), None);
    }

    #[test]
    fn test_bind_honors_literal_tag_segments() {
        let filter = filter("app:{v}-alpine");

        assert!(filter.bind("1.2.3-alpine").is_some());
        assert_eq!(filter.bind("1.2.3"), None);
        assert_eq!(filter.bind("1.2.3-alpine-extra"), None);
    }

    #[test]
    fn test_bind_widens_float_ranges() {
        // Range policy belongs to the planner; the filter only asks
        // whether the tag has the family's shape.
        let filter = filter("postgres:{v16.*}");

        let image = filter.bind("17.2.0").unwrap();
        assert_eq!(image.versions(), [Version::new(17, 2, 0)]);
    }

    #[test]
    fn test_candidates_sort_ascending() {
        let filter = filter("nginx");

        let candidates = filter.candidates(["1.2.10", "latest", "1.10.0", "1.2.9"]);
        let tags: Vec<String> = candidates
            .iter()
            .map(|image| image.tag().unwrap())
            .collect();
        assert_eq!(tags, ["1.2.9", "1.2.10", "1.10.0"]);
    }
}
