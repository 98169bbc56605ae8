//! Lazily materialized element handles

use std::cell::OnceCell;
use std::fmt;

use scraper::ElementRef;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::dom::Selector;
use crate::error::ResolveError;

/// A matched element. Text and inner HTML are computed on first access and
/// cached; nothing is read from the document until a property is requested.
#[derive(Clone)]
pub struct ExtractedValue<'a> {
    element: ElementRef<'a>,
    text: OnceCell<String>,
    inner_html: OnceCell<String>,
}

impl<'a> ExtractedValue<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self {
            element,
            text: OnceCell::new(),
            inner_html: OnceCell::new(),
        }
    }

    pub fn element(&self) -> ElementRef<'a> {
        self.element
    }

    pub fn tag(&self) -> &'a str {
        self.element.value().name()
    }

    /// Trimmed text content of the element and its descendants
    pub fn text(&self) -> &str {
        self.text
            .get_or_init(|| self.element.text().collect::<String>().trim().to_string())
    }

    pub fn inner_html(&self) -> &str {
        self.inner_html.get_or_init(|| self.element.inner_html())
    }

    pub fn html(&self) -> String {
        self.element.html()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Like [`attr`](Self::attr), for callers that need the attribute
    pub fn require_attr(&self, name: &str) -> Result<&'a str, ResolveError> {
        self.attr(name).ok_or_else(|| ResolveError::UnsupportedOperation {
            tag: self.tag().to_string(),
            attribute: name.to_string(),
        })
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.element.value().attrs()
    }

    pub fn children(&self) -> impl Iterator<Item = ExtractedValue<'a>> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .map(ExtractedValue::new)
    }

    /// Matches of `selector` scoped to this element
    pub fn select(&self, selector: &Selector) -> Vec<ExtractedValue<'a>> {
        selector
            .select(self.element)
            .into_iter()
            .map(ExtractedValue::new)
            .collect()
    }

    /// Whether the text has been materialized yet
    pub fn is_text_loaded(&self) -> bool {
        self.text.get().is_some()
    }
}

/// Two values are equal when they refer to the same node
impl PartialEq for ExtractedValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.element.id() == other.element.id()
    }
}

impl fmt::Debug for ExtractedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractedValue")
            .field("tag", &self.tag())
            .field("node", &self.element.id())
            .finish()
    }
}

impl Serialize for ExtractedValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("tag", self.tag())?;
        map.serialize_entry("text", self.text())?;
        map.serialize_entry("attrs", &Attrs(self.element))?;
        map.end()
    }
}

struct Attrs<'a>(ElementRef<'a>);

impl Serialize for Attrs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.value().attrs())
    }
}
