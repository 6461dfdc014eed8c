//! Container image reference templates and the matching engine built on
//! them.
//!
//! A [`Template`] describes a family of image references
//! (`host/name:tag@{digest}`, with `{v...}` version placeholders in the
//! tag). Templates compile into [`Pattern`]s, whose part chains merge into
//! a single [`SearchTree`] that recognizes every configured reference in
//! one pass over arbitrary text, binding each hit into an orderable
//! [`Image`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod builder;
pub mod image;
pub mod pattern;
pub mod range;
pub mod template;
pub mod tree;

pub use builder::TreeBuilder;
pub use image::Image;
pub use pattern::{Part, Pattern, PatternError, PatternOptions};
pub use range::FloatRange;
pub use template::{DEFAULT_REGISTRY, TagSegment, Template, TemplateError};
pub use tree::{Match, SearchTree};
