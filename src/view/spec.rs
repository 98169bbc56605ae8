//! JSON page definitions
//!
//! Hosts that cannot build schemas in Rust describe them as JSON:
//!
//! ```json
//! {"children": [
//!   {"name": "title", "field": {"kind": "css", "expression": ".p-title"}},
//!   {"name": "posts", "group": {"view": {
//!       "selector": {"kind": "css", "expression": ".message--post"},
//!       "children": [{"name": "time", "field": {"kind": "tag", "expression": "time"}}]
//!   }}}
//! ]}
//! ```

use serde::{Deserialize, Serialize};

use super::{Field, Group, Node, Page, View};
use crate::dom::{Selector, SelectorKind};
use crate::error::SchemaError;

/// Page definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

/// Named child of a page or view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildSpec {
    pub name: String,
    #[serde(flatten)]
    pub node: NodeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSpec {
    Field(SelectorSpec),
    /// Template must be a field or a view
    Group(Box<NodeSpec>),
    View(ViewSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub kind: SelectorKind,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSpec {
    pub selector: SelectorSpec,
    /// Optional unless set
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

impl PageSpec {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Definition(e.to_string()))
    }

    /// Compile every selector and assemble the page
    pub fn compile(&self) -> Result<Page, SchemaError> {
        let mut page = Page::new();
        for child in &self.children {
            page = page.with(child.name.clone(), child.node.compile()?);
        }
        Ok(page)
    }
}

impl NodeSpec {
    fn compile(&self) -> Result<Node, SchemaError> {
        match self {
            NodeSpec::Field(selector) => Ok(Field::new(selector.compile()?).into()),
            NodeSpec::View(view) => Ok(view.compile()?.into()),
            NodeSpec::Group(template) => match template.as_ref() {
                NodeSpec::Field(selector) => Ok(Group::new(Field::new(selector.compile()?)).into()),
                NodeSpec::View(view) => Ok(Group::new(view.compile()?).into()),
                NodeSpec::Group(_) => Err(SchemaError::Definition(
                    "group template must be a field or a view".to_string(),
                )),
            },
        }
    }
}

impl ViewSpec {
    fn compile(&self) -> Result<View, SchemaError> {
        let mut view = View::new(self.selector.compile()?);
        if self.required {
            view = view.required();
        }
        for child in &self.children {
            view = view.with(child.name.clone(), child.node.compile()?);
        }
        Ok(view)
    }
}

impl SelectorSpec {
    fn compile(&self) -> Result<Selector, SchemaError> {
        Selector::new(self.kind, self.expression.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const SCHEMA: &str = r#"
    {
        "children": [
            {"name": "title", "field": {"kind": "css", "expression": ".p-title"}},
            {"name": "posts", "group": {"view": {
                "selector": {"kind": "css", "expression": ".message--post"},
                "children": [
                    {"name": "time", "field": {"kind": "tag", "expression": "time"}},
                    {"name": "body", "group": {"field": {"kind": "xpath", "expression": ".//div[@class='message-body']"}}}
                ]
            }}},
            {"name": "nav", "view": {
                "selector": {"kind": "css", "expression": ".pageNav"},
                "required": true,
                "children": []
            }}
        ]
    }
    "#;

    #[test]
    fn test_load_and_resolve() {
        let page = Page::from_json(SCHEMA).unwrap();
        let names: Vec<&str> = page.children().iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "posts", "nav"]);
        assert!(matches!(
            page.children().get("nav"),
            Some(Node::View(view)) if view.is_required()
        ));

        let html = r#"
        <h1 class="p-title">Thread</h1>
        <article class="message--post">
            <time>today</time>
            <div class="message-body">Hello</div>
            <div class="message-body">Edit: typo</div>
        </article>
        "#;
        let document = Html::parse_document(html);
        let resolved = page.resolve(&document);

        assert_eq!(resolved.text("title"), Some("Thread"));
        let post = resolved.group("posts")[0].view().unwrap();
        assert_eq!(post.text("time"), Some("today"));
        assert_eq!(post.group("body").len(), 2);
        assert_eq!(resolved.errors().len(), 1);
    }

    #[test]
    fn test_kind_is_case_insensitive() {
        let json = r#"{"children": [
            {"name": "a", "field": {"kind": "XPATH", "expression": "//a"}},
            {"name": "b", "field": {"kind": "Css", "expression": "b"}}
        ]}"#;
        let page = Page::from_json(json).unwrap();
        assert!(matches!(
            page.children().get("a"),
            Some(Node::Field(field)) if field.selector().kind() == SelectorKind::Xpath
        ));
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let json = r#"{"children": [{"name": "x", "field": {"kind": "xpath", "expression": "//a["}}]}"#;
        assert!(matches!(
            Page::from_json(json),
            Err(SchemaError::InvalidXPath { .. })
        ));
    }

    #[test]
    fn test_definition_errors() {
        let nested_group = r#"{"children": [{"name": "x", "group": {"group": {"field": {"kind": "css", "expression": "a"}}}}]}"#;
        let unknown_kind = r#"{"children": [{"name": "x", "field": {"kind": "regex", "expression": "a"}}]}"#;

        for json in [nested_group, unknown_kind, "not json"] {
            assert!(matches!(
                Page::from_json(json),
                Err(SchemaError::Definition(_))
            ));
        }
    }
}
