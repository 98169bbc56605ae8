//! Schema nodes and page resolution
//!
//! Schemas are plain immutable values assembled with constructor functions:
//!
//! ```
//! use page_view::{Field, Group, Page, View};
//!
//! # fn main() -> Result<(), page_view::SchemaError> {
//! let page = Page::new()
//!     .with("title", Field::css(".p-title")?)
//!     .with(
//!         "posts",
//!         Group::new(View::css(".message--post")?.with("time", Field::css("time")?)),
//!     );
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

mod resolve;
mod spec;
mod value;

pub use resolve::*;
pub use spec::*;
pub use value::*;

use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::debug;

use crate::dom::{Scope, Selector};
use crate::error::SchemaError;

/// The first element matching a selector
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    selector: Selector,
}

impl Field {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }

    pub fn css(expression: &str) -> Result<Self, SchemaError> {
        Selector::css(expression).map(Self::new)
    }

    pub fn xpath(expression: &str) -> Result<Self, SchemaError> {
        Selector::xpath(expression).map(Self::new)
    }

    pub fn tag(expression: &str) -> Result<Self, SchemaError> {
        Selector::tag(expression).map(Self::new)
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// What a group repeats
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Field(Field),
    View(View),
}

impl Template {
    pub fn selector(&self) -> &Selector {
        match self {
            Template::Field(field) => field.selector(),
            Template::View(view) => view.selector(),
        }
    }
}

impl From<Field> for Template {
    fn from(field: Field) -> Self {
        Template::Field(field)
    }
}

impl From<View> for Template {
    fn from(view: View) -> Self {
        Template::View(view)
    }
}

/// Every match of a template's selector, each resolved as the template
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    template: Template,
}

impl Group {
    pub fn new(template: impl Into<Template>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn selector(&self) -> &Selector {
        self.template.selector()
    }
}

/// Named children resolved within the first match of a selector
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    selector: Selector,
    required: bool,
    children: Children,
}

impl View {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            required: false,
            children: Children::default(),
        }
    }

    pub fn css(expression: &str) -> Result<Self, SchemaError> {
        Selector::css(expression).map(Self::new)
    }

    /// A miss on this view's selector is recorded as an error instead of a
    /// plain absent value
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.children.insert(name.into(), node.into());
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn children(&self) -> &Children {
        &self.children
    }
}

/// Any schema node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Field(Field),
    Group(Group),
    View(View),
}

impl From<Field> for Node {
    fn from(field: Field) -> Self {
        Node::Field(field)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}

impl From<View> for Node {
    fn from(view: View) -> Self {
        Node::View(view)
    }
}

/// Ordered name -> node mapping
///
/// Declaring a name twice replaces the earlier node and keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Children {
    entries: Vec<(String, Node)>,
}

impl Children {
    fn insert(&mut self, name: String, node: Node) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = node,
            None => self.entries.push((name, node)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Schema entry point, anchored at the document root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    children: Children,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.children.insert(name.into(), node.into());
        self
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    /// Build a page from its JSON definition
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        PageSpec::from_json(json)?.compile()
    }

    /// Resolve against a parsed document, with the document node as context
    pub fn resolve<'a>(&self, document: &'a Html) -> ResolvedView<'a> {
        debug!(children = self.children.len(), "resolving page");
        resolve::resolve_children(&self.children, Scope::document(document))
    }

    /// Resolve within the descendants of `root`
    pub fn resolve_element<'a>(&self, root: ElementRef<'a>) -> ResolvedView<'a> {
        debug!(children = self.children.len(), root = root.value().name(), "resolving page");
        resolve::resolve_children(&self.children, Scope::Element(root))
    }

    /// Parse `html`, resolve, and return the JSON tree with its local errors
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);
        let resolved = self.resolve(&document);

        let errors = resolved
            .errors()
            .into_iter()
            .map(|(path, err)| ExtractionError {
                path,
                message: err.to_string(),
            })
            .collect();

        Extraction {
            data: resolved.to_json(),
            errors,
        }
    }
}

/// Owned result of [`Page::extract`]
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ExtractionError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionError {
    pub path: String,
    pub message: String,
}
