//! Selector dispatch
//!
//! A [`Selector`] pairs a query dialect with its expression. The expression is
//! compiled when the selector is built, so syntax errors surface while the
//! schema is declared and matching never fails at runtime.

mod xpath;

pub use xpath::XPathError;

use std::fmt;
use std::str::FromStr;

use scraper::{ElementRef, Html};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::SchemaError;

/// Query dialect of a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
    Tag,
}

/// Accepts any case (`"XPATH"`, `"xpath"`), like [`FromStr`]
impl<'de> Deserialize<'de> for SelectorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        kind.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectorKind::Css => "css",
            SelectorKind::Xpath => "xpath",
            SelectorKind::Tag => "tag",
        })
    }
}

impl FromStr for SelectorKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "css" => Ok(SelectorKind::Css),
            "xpath" => Ok(SelectorKind::Xpath),
            "tag" => Ok(SelectorKind::Tag),
            other => Err(SchemaError::Definition(format!(
                "unknown selector kind `{other}`"
            ))),
        }
    }
}

/// Where a selector is evaluated
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// The document node; the root element itself can match
    Document(ElementRef<'a>),
    /// Descendants of an element; the element itself never matches
    Element(ElementRef<'a>),
}

impl<'a> Scope<'a> {
    pub fn document(document: &'a Html) -> Self {
        Scope::Document(document.root_element())
    }

    /// The element standing for this scope; the root element for a document
    pub fn element(&self) -> ElementRef<'a> {
        match *self {
            Scope::Document(root) | Scope::Element(root) => root,
        }
    }
}

impl<'a> From<ElementRef<'a>> for Scope<'a> {
    fn from(element: ElementRef<'a>) -> Self {
        Scope::Element(element)
    }
}

/// A compiled query in one of the supported dialects
#[derive(Clone)]
pub struct Selector {
    kind: SelectorKind,
    expression: String,
    query: Query,
}

#[derive(Clone)]
enum Query {
    Css(scraper::Selector),
    XPath(xpath::Expr),
    Tag(String),
}

impl Selector {
    pub fn new(kind: SelectorKind, expression: impl Into<String>) -> Result<Self, SchemaError> {
        let expression = expression.into();
        let query = match kind {
            SelectorKind::Css => scraper::Selector::parse(&expression)
                .map(Query::Css)
                .map_err(|e| SchemaError::InvalidCss {
                    expression: expression.clone(),
                    message: e.to_string(),
                })?,
            SelectorKind::Xpath => xpath::compile_selector(&expression)
                .map(Query::XPath)
                .map_err(|source| SchemaError::InvalidXPath {
                    expression: expression.clone(),
                    source,
                })?,
            SelectorKind::Tag => Query::Tag(parse_tag(&expression)?),
        };

        Ok(Self {
            kind,
            expression,
            query,
        })
    }

    pub fn css(expression: impl Into<String>) -> Result<Self, SchemaError> {
        Self::new(SelectorKind::Css, expression)
    }

    pub fn xpath(expression: impl Into<String>) -> Result<Self, SchemaError> {
        Self::new(SelectorKind::Xpath, expression)
    }

    pub fn tag(expression: impl Into<String>) -> Result<Self, SchemaError> {
        Self::new(SelectorKind::Tag, expression)
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// All matches in `scope`, in document order
    pub fn select<'a>(&self, scope: impl Into<Scope<'a>>) -> Vec<ElementRef<'a>> {
        let scope = scope.into();
        let matches: Vec<ElementRef<'a>> = match (&self.query, scope) {
            (Query::Css(selector), Scope::Document(root)) => std::iter::once(root)
                .filter(|el| selector.matches(el))
                .chain(root.select(selector))
                .collect(),
            (Query::Css(selector), Scope::Element(context)) => context
                .select(selector)
                .filter(|el| el.id() != context.id())
                .collect(),
            (Query::Tag(name), _) => candidates(scope)
                .filter(|el| el.value().name().eq_ignore_ascii_case(name))
                .collect(),
            (Query::XPath(expr), _) => xpath::select(expr, scope),
        };

        trace!(selector = %self, matches = matches.len(), "selector matched");
        matches
    }

    /// First match in `scope`; CSS and tag queries stop at the first hit
    pub fn first<'a>(&self, scope: impl Into<Scope<'a>>) -> Option<ElementRef<'a>> {
        let scope = scope.into();
        match (&self.query, scope) {
            (Query::Css(selector), Scope::Document(root)) => {
                if selector.matches(&root) {
                    Some(root)
                } else {
                    root.select(selector).next()
                }
            }
            (Query::Css(selector), Scope::Element(context)) => {
                context.select(selector).find(|el| el.id() != context.id())
            }
            (Query::Tag(name), _) => {
                candidates(scope).find(|el| el.value().name().eq_ignore_ascii_case(name))
            }
            (Query::XPath(expr), _) => xpath::select(expr, scope).into_iter().next(),
        }
    }
}

/// Elements a query may match in `scope`, in document order
fn candidates<'a>(scope: Scope<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    let skip = match scope {
        Scope::Document(_) => 0,
        Scope::Element(_) => 1,
    };
    scope
        .element()
        .descendants()
        .skip(skip)
        .filter_map(ElementRef::wrap)
}

fn parse_tag(expression: &str) -> Result<String, SchemaError> {
    let name = expression.trim();
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(name.to_ascii_lowercase())
    } else {
        Err(SchemaError::InvalidTag(expression.to_string()))
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.expression == other.expression
    }
}

impl Eq for Selector {}

impl std::hash::Hash for Selector {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.expression.hash(state);
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("kind", &self.kind)
            .field("expression", &self.expression)
            .finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.kind, self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const HTML: &str = r#"
    <html>
    <body>
        <div class="post" id="first">
            <p class="body">One</p>
            <div class="post" id="nested"><p class="body">Nested</p></div>
        </div>
        <div class="post" id="second">
            <p class="body">Two</p>
        </div>
    </body>
    </html>
    "#;

    fn ids<'a>(elements: &[ElementRef<'a>]) -> Vec<&'a str> {
        elements.iter().filter_map(|el| el.value().id()).collect()
    }

    #[test]
    fn test_css_matches_in_document_order() {
        let document = Html::parse_document(HTML);
        let selector = Selector::css("div.post").unwrap();

        let matches = selector.select(document.root_element());
        assert_eq!(ids(&matches), vec!["first", "nested", "second"]);
    }

    #[test]
    fn test_css_excludes_context_itself() {
        let document = Html::parse_document(HTML);
        let posts = Selector::css("div.post").unwrap();
        let first = posts.first(document.root_element()).unwrap();

        let inner = posts.select(first);
        assert_eq!(ids(&inner), vec!["nested"]);
    }

    #[test]
    fn test_tag_matches_descendants() {
        let document = Html::parse_document(HTML);
        let paragraphs = Selector::tag("P").unwrap();
        let second = Selector::css("#second").unwrap().first(document.root_element()).unwrap();

        let texts: Vec<String> = paragraphs
            .select(second)
            .iter()
            .map(|el| el.text().collect())
            .collect();
        assert_eq!(texts, vec!["Two"]);
        assert!(Selector::tag("div").unwrap().first(second).is_none());
    }

    #[test]
    fn test_xpath_dispatch() {
        let document = Html::parse_document(HTML);
        let selector = Selector::xpath(".//div[@class='post'][p[text()='Two']]").unwrap();

        let matches = selector.select(document.root_element());
        assert_eq!(ids(&matches), vec!["second"]);
    }

    #[test]
    fn test_zero_matches_is_empty() {
        let document = Html::parse_document(HTML);
        for selector in [
            Selector::css(".missing").unwrap(),
            Selector::xpath("//table").unwrap(),
            Selector::tag("table").unwrap(),
        ] {
            assert!(selector.select(document.root_element()).is_empty());
            assert!(selector.first(document.root_element()).is_none());
        }
    }

    #[test]
    fn test_syntax_errors_are_schema_errors() {
        assert!(matches!(
            Selector::css("div[[").unwrap_err(),
            SchemaError::InvalidCss { .. }
        ));
        assert!(matches!(
            Selector::xpath("//div[").unwrap_err(),
            SchemaError::InvalidXPath { .. }
        ));
        assert_eq!(
            Selector::tag(".attachment-icon").unwrap_err(),
            SchemaError::InvalidTag(".attachment-icon".to_string())
        );
    }

    #[test]
    fn test_equality_by_value() {
        assert_eq!(Selector::css(".a").unwrap(), Selector::css(".a").unwrap());
        assert_ne!(Selector::css("a").unwrap(), Selector::tag("a").unwrap());
        assert_eq!(Selector::css(".a").unwrap().to_string(), "css `.a`");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("XPath".parse::<SelectorKind>().unwrap(), SelectorKind::Xpath);
        assert!("regex".parse::<SelectorKind>().is_err());
    }

    #[test]
    fn test_kind_json_accepts_any_case() {
        let kinds: Vec<SelectorKind> = serde_json::from_str(r#"["XPATH", "css", "Tag"]"#).unwrap();
        assert_eq!(kinds, vec![SelectorKind::Xpath, SelectorKind::Css, SelectorKind::Tag]);
        assert!(serde_json::from_str::<SelectorKind>(r#""regex""#).is_err());
        assert_eq!(serde_json::to_string(&SelectorKind::Xpath).unwrap(), r#""xpath""#);
    }

    #[test]
    fn test_document_scope_includes_root_element() {
        let document = Html::parse_document("<html><body><p>x</p></body></html>");
        let scope = Scope::document(&document);

        for selector in [
            Selector::css("html").unwrap(),
            Selector::css(":root").unwrap(),
            Selector::tag("html").unwrap(),
        ] {
            let found = selector.first(scope).unwrap();
            assert_eq!(found.value().name(), "html");
            assert_eq!(selector.select(scope).len(), 1);
            // an element scope never matches itself
            assert!(selector.first(document.root_element()).is_none());
        }

        let body = Selector::xpath("html/body").unwrap();
        assert_eq!(body.first(scope).unwrap().value().name(), "body");
        assert!(body.first(document.root_element()).is_none());
        assert_eq!(Selector::css("p").unwrap().select(scope).len(), 1);
    }

    #[test]
    fn test_xpath_must_select_elements() {
        for expression in [".//a/@href", "//p/text()", "count(//li)", "'literal'"] {
            assert!(matches!(
                Selector::xpath(expression),
                Err(SchemaError::InvalidXPath { .. })
            ));
        }
        assert!(Selector::xpath("//a[@href]").is_ok());
    }
}
