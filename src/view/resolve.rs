//! Resolution of schema nodes against a document context
//!
//! Every child is resolved independently. Nothing here returns early on a
//! missing match: absence is recorded in the tree and resolution moves on to
//! the next child or the next group entry.

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{trace, warn};

use super::value::ExtractedValue;
use super::{Children, Field, Group, Node, Template, View};
use crate::dom::Scope;
use crate::error::ResolveError;

/// Resolved value of one schema node
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Field(Option<ExtractedValue<'a>>),
    /// One entry per match, in document order
    Group(Vec<Resolved<'a>>),
    View(Option<ResolvedView<'a>>),
    /// A required view matched nothing
    Missing(ResolveError),
}

impl<'a> Resolved<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Resolved::Field(None) | Resolved::View(None) | Resolved::Missing(_)
        )
    }

    pub fn value(&self) -> Option<&ExtractedValue<'a>> {
        match self {
            Resolved::Field(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.value().map(|value| value.text())
    }

    pub fn view(&self) -> Option<&ResolvedView<'a>> {
        match self {
            Resolved::View(view) => view.as_ref(),
            _ => None,
        }
    }

    /// Group entries; empty for anything that is not a group
    pub fn items(&self) -> &[Resolved<'a>] {
        match self {
            Resolved::Group(items) => items,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&ResolveError> {
        match self {
            Resolved::Missing(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolved children of a view or page, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedView<'a> {
    context: ExtractedValue<'a>,
    entries: Vec<(String, Resolved<'a>)>,
}

impl<'a> ResolvedView<'a> {
    /// The element the children were resolved against
    pub fn context(&self) -> &ExtractedValue<'a> {
        &self.context
    }

    pub fn get(&self, name: &str) -> Option<&Resolved<'a>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, resolved)| resolved)
    }

    pub fn value(&self, name: &str) -> Option<&ExtractedValue<'a>> {
        self.get(name)?.value()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)?.text()
    }

    pub fn attr(&self, name: &str, attribute: &str) -> Option<&'a str> {
        self.value(name)?.attr(attribute)
    }

    pub fn view(&self, name: &str) -> Option<&ResolvedView<'a>> {
        self.get(name)?.view()
    }

    pub fn group(&self, name: &str) -> &[Resolved<'a>] {
        self.get(name).map(|resolved| resolved.items()).unwrap_or(&[])
    }

    /// The value of a field the caller cannot do without
    pub fn require(&self, name: &str) -> Result<&ExtractedValue<'a>, ResolveError> {
        match self.get(name) {
            Some(Resolved::Missing(err)) => Err(err.clone()),
            Some(resolved) => resolved.value().ok_or_else(|| ResolveError::Absent {
                name: name.to_string(),
            }),
            None => Err(ResolveError::Absent {
                name: name.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved<'a>)> {
        self.entries
            .iter()
            .map(|(name, resolved)| (name.as_str(), resolved))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local failures anywhere below this view, keyed by path
    /// (`posts[3].meta`)
    pub fn errors(&self) -> Vec<(String, &ResolveError)> {
        let mut out = Vec::new();
        collect_view_errors(self, "", &mut out);
        out
    }

    /// JSON form; `null` (with a warning) if serialization fails
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            warn!(error = %err, "failed to serialize resolved view");
            serde_json::Value::Null
        })
    }
}

fn collect_view_errors<'v>(
    view: &'v ResolvedView<'_>,
    prefix: &str,
    out: &mut Vec<(String, &'v ResolveError)>,
) {
    for (name, resolved) in &view.entries {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        collect_errors(resolved, path, out);
    }
}

fn collect_errors<'v>(
    resolved: &'v Resolved<'_>,
    path: String,
    out: &mut Vec<(String, &'v ResolveError)>,
) {
    match resolved {
        Resolved::Missing(err) => out.push((path, err)),
        Resolved::View(Some(view)) => collect_view_errors(view, &path, out),
        Resolved::Group(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_errors(item, format!("{path}[{index}]"), out);
            }
        }
        Resolved::Field(_) | Resolved::View(None) => {}
    }
}

impl Serialize for Resolved<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Resolved::Field(Some(value)) => value.serialize(serializer),
            Resolved::View(Some(view)) => view.serialize(serializer),
            Resolved::Group(items) => serializer.collect_seq(items),
            Resolved::Field(None) | Resolved::View(None) | Resolved::Missing(_) => {
                serializer.serialize_unit()
            }
        }
    }
}

impl Serialize for ResolvedView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, resolved) in &self.entries {
            map.serialize_entry(name, resolved)?;
        }
        map.end()
    }
}

pub(crate) fn resolve_children<'a>(children: &Children, scope: Scope<'a>) -> ResolvedView<'a> {
    let entries = children
        .iter()
        .map(|(name, node)| (name.to_string(), node.resolve(scope)))
        .collect();

    ResolvedView {
        context: ExtractedValue::new(scope.element()),
        entries,
    }
}

impl Node {
    pub fn resolve<'a>(&self, scope: impl Into<Scope<'a>>) -> Resolved<'a> {
        let scope = scope.into();
        match self {
            Node::Field(field) => Resolved::Field(field.resolve(scope)),
            Node::Group(group) => Resolved::Group(group.resolve(scope)),
            Node::View(view) => match view.resolve(scope) {
                Ok(resolved) => Resolved::View(resolved),
                Err(err) => Resolved::Missing(err),
            },
        }
    }
}

impl Field {
    /// First match in document order, later matches are discarded
    pub fn resolve<'a>(&self, scope: impl Into<Scope<'a>>) -> Option<ExtractedValue<'a>> {
        self.selector().first(scope).map(ExtractedValue::new)
    }
}

impl Group {
    pub fn resolve<'a>(&self, scope: impl Into<Scope<'a>>) -> Vec<Resolved<'a>> {
        let matches = self.selector().select(scope);
        trace!(selector = %self.selector(), entries = matches.len(), "resolving group");

        matches
            .into_iter()
            .map(|element| match self.template() {
                Template::Field(_) => Resolved::Field(Some(ExtractedValue::new(element))),
                // the template's own selector produced `element`; only its
                // children are resolved against it
                Template::View(view) => {
                    Resolved::View(Some(resolve_children(view.children(), element.into())))
                }
            })
            .collect()
    }
}

impl View {
    /// `Ok(None)` when an optional view matches nothing,
    /// `Err(MissingRequired)` when a required one does
    pub fn resolve<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
    ) -> Result<Option<ResolvedView<'a>>, ResolveError> {
        match self.selector().first(scope) {
            Some(element) => Ok(Some(resolve_children(self.children(), element.into()))),
            None if self.is_required() => {
                warn!(selector = %self.selector(), "required view matched nothing");
                Err(ResolveError::MissingRequired {
                    selector: self.selector().to_string(),
                })
            }
            None => {
                trace!(selector = %self.selector(), "optional view absent");
                Ok(None)
            }
        }
    }
}
