//! Declarative page views over HTML documents
//!
//! A page is declared once as a tree of named nodes and resolved against
//! any number of fetched documents:
//! - Fields: the first element matching a CSS, XPath or tag selector
//! - Groups: every match, each resolved as a field or view
//! - Views: named children scoped to the first match of a selector
//!
//! Missing elements never abort a resolution; they come back as absent values
//! and, for required views, as errors keyed by their path.

pub mod dom;
pub mod error;
pub mod ffi;
pub mod nav;
pub mod phpbb;
pub mod view;

pub use dom::{Scope, Selector, SelectorKind};
pub use error::{ResolveError, SchemaError};
pub use ffi::*;
pub use view::*;
