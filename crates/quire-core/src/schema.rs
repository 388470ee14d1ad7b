//! Schema fragments and the schema builder.
//!
//! Node and mark extensions each contribute one [`SchemaFragment`]. The [`SchemaBuilder`]
//! collects them in sorted extension order (which also decides tie-breaks downstream, such as
//! which node is the default block), rejects duplicate type names, and finally merges shared
//! attributes into every matching type before freezing the result into a [`Schema`].
//!
//! The frozen schema is never mutated. The manager hands it out as an `Rc<Schema>`, and the same
//! `Rc` survives view attachment and recreation unless the rebuilt schema actually differs.

use crate::error::ConfigurationError;
use crate::extension::{ExtensionKind, Tag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An attribute of a node or mark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Default value. `None` means the attribute is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl AttributeSpec {
    /// An attribute that must be supplied on creation.
    pub fn required() -> Self {
        Self { default: None }
    }

    /// An attribute with a default value.
    pub fn with_default(value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
        }
    }

    /// Returns `true` if there is no default.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A rule describing how markup is parsed into this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseRule {
    /// CSS-style tag selector (`p`, `h1`, `a[href]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Style property match (`font-weight=bold`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Rule precedence; higher is tried earlier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Fixed attributes to assign when the rule matches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
}

impl ParseRule {
    /// Match by tag selector.
    pub fn tag(selector: impl Into<String>) -> Self {
        Self {
            tag: Some(selector.into()),
            ..Self::default()
        }
    }

    /// Match by style property.
    pub fn style(style: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            ..Self::default()
        }
    }

    /// Builder: set the precedence.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Builder: assign a fixed attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

/// How a type serializes to markup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSpec {
    /// Element tag.
    pub tag: String,
    /// Static element attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    /// Whether the content goes inside this element.
    #[serde(default)]
    pub hole: bool,
}

impl DomSpec {
    /// An element without content hole.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Builder: content goes inside.
    pub fn hole(mut self) -> Self {
        self.hole = true;
        self
    }

    /// Builder: add a static attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

/// Node type description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Content expression (`inline*`, `block+`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Space-separated groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Allowed marks (`_` for all, empty for none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<String>,
    /// Inline node.
    #[serde(default)]
    pub inline: bool,
    /// Leaf node edited as a unit.
    #[serde(default)]
    pub atom: bool,
    /// Defining node (kept when content is replaced).
    #[serde(default)]
    pub defining: bool,
    /// Isolating node (editing does not cross its boundary).
    #[serde(default)]
    pub isolating: bool,
    /// Holds code.
    #[serde(default)]
    pub code: bool,
    /// Node can be selected as a node selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    /// Node can be dragged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    /// Whitespace handling (`normal` or `pre`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitespace: Option<String>,
    /// Attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttributeSpec>,
    /// Parse rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_dom: Vec<ParseRule>,
    /// Serialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_dom: Option<DomSpec>,
}

impl NodeSpec {
    /// Empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: content expression.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Builder: group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Builder: allowed marks.
    pub fn marks(mut self, marks: impl Into<String>) -> Self {
        self.marks = Some(marks.into());
        self
    }

    /// Builder: inline node.
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Builder: atom node.
    pub fn atom(mut self) -> Self {
        self.atom = true;
        self
    }

    /// Builder: code node.
    pub fn code(mut self) -> Self {
        self.code = true;
        self
    }

    /// Builder: defining node.
    pub fn defining(mut self) -> Self {
        self.defining = true;
        self
    }

    /// Builder: add an attribute.
    pub fn attr(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attrs.insert(name.into(), spec);
        self
    }

    /// Builder: add a parse rule.
    pub fn parse(mut self, rule: ParseRule) -> Self {
        self.parse_dom.push(rule);
        self
    }

    /// Builder: serialization.
    pub fn to_dom(mut self, dom: DomSpec) -> Self {
        self.to_dom = Some(dom);
        self
    }
}

/// Mark type description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkSpec {
    /// Whether the mark extends to text typed at its end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusive: Option<bool>,
    /// Marks that cannot coexist with this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes: Option<String>,
    /// Space-separated groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Whether the mark spans multiple nodes when serialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spanning: Option<bool>,
    /// Attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttributeSpec>,
    /// Parse rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_dom: Vec<ParseRule>,
    /// Serialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_dom: Option<DomSpec>,
}

impl MarkSpec {
    /// Empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: inclusive flag.
    pub fn inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = Some(inclusive);
        self
    }

    /// Builder: excluded marks.
    pub fn excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = Some(excludes.into());
        self
    }

    /// Builder: group.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Builder: add an attribute.
    pub fn attr(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attrs.insert(name.into(), spec);
        self
    }

    /// Builder: add a parse rule.
    pub fn parse(mut self, rule: ParseRule) -> Self {
        self.parse_dom.push(rule);
        self
    }

    /// Builder: serialization.
    pub fn to_dom(mut self, dom: DomSpec) -> Self {
        self.to_dom = Some(dom);
        self
    }
}

/// The type an extension contributes.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaFragment {
    /// A node type.
    Node {
        /// Type name.
        name: String,
        /// Description.
        spec: NodeSpec,
    },
    /// A mark type.
    Mark {
        /// Type name.
        name: String,
        /// Description.
        spec: MarkSpec,
    },
}

impl SchemaFragment {
    /// A node fragment.
    pub fn node(name: impl Into<String>, spec: NodeSpec) -> Self {
        Self::Node {
            name: name.into(),
            spec,
        }
    }

    /// A mark fragment.
    pub fn mark(name: impl Into<String>, spec: MarkSpec) -> Self {
        Self::Mark {
            name: name.into(),
            spec,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Node { name, .. } | Self::Mark { name, .. } => name,
        }
    }

    fn kind(&self) -> ExtensionKind {
        match self {
            Self::Node { .. } => ExtensionKind::Node,
            Self::Mark { .. } => ExtensionKind::Mark,
        }
    }
}

/// Which types a shared attribute applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum Identifiers {
    /// Every node and mark.
    All,
    /// Every node.
    Nodes,
    /// Every mark.
    Marks,
    /// Types with these names.
    Names(Vec<String>),
    /// Types whose extension carries any of these tags.
    Tags(Vec<Tag>),
}

/// An attribute added to every matching node/mark after primary collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedAttribute {
    /// Target types.
    pub identifiers: Identifiers,
    /// Attribute name.
    pub name: String,
    /// Attribute description.
    #[serde(default)]
    pub spec: AttributeSpec,
}

impl SharedAttribute {
    /// Create a shared attribute.
    pub fn new(identifiers: Identifiers, name: impl Into<String>, spec: AttributeSpec) -> Self {
        Self {
            identifiers,
            name: name.into(),
            spec,
        }
    }
}

/// A named node type in the frozen schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeType {
    /// Type name.
    pub name: String,
    /// Contributing extension.
    #[serde(skip)]
    pub owner: String,
    /// Final description (groups and shared attributes merged).
    #[serde(flatten)]
    pub spec: NodeSpec,
}

/// A named mark type in the frozen schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkType {
    /// Type name.
    pub name: String,
    /// Contributing extension.
    #[serde(skip)]
    pub owner: String,
    /// Final description (groups and shared attributes merged).
    #[serde(flatten)]
    pub spec: MarkSpec,
}

/// The merged, immutable document schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    top_node: Option<String>,
    nodes: Vec<NodeType>,
    marks: Vec<MarkType>,
}

impl Schema {
    /// Node types in priority order.
    pub fn nodes(&self) -> &[NodeType] {
        &self.nodes
    }

    /// Mark types in priority order.
    pub fn marks(&self) -> &[MarkType] {
        &self.marks
    }

    /// Look up a node type.
    pub fn node(&self, name: &str) -> Option<&NodeType> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Look up a mark type.
    pub fn mark(&self, name: &str) -> Option<&MarkType> {
        self.marks.iter().find(|m| m.name == name)
    }

    /// The top node, if the configured top node type exists.
    pub fn top_node(&self) -> Option<&str> {
        self.top_node.as_deref()
    }

    /// Returns `true` if no extension contributed a type.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.marks.is_empty()
    }
}

/// One extension's input to the schema builder.
#[derive(Debug, Clone)]
pub struct SchemaContribution {
    /// Extension name.
    pub owner: String,
    /// Declared kind.
    pub kind: ExtensionKind,
    /// Extension tags.
    pub tags: Vec<Tag>,
    /// Returned fragment.
    pub fragment: Option<SchemaFragment>,
    /// Returned shared attributes.
    pub shared_attributes: Vec<SharedAttribute>,
}

/// Collects fragments in sorted order and freezes them into a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: Vec<(NodeType, Vec<Tag>)>,
    marks: Vec<(MarkType, Vec<Tag>)>,
    shared: Vec<SharedAttribute>,
}

impl SchemaBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one extension's contribution. Call in sorted extension order.
    pub fn add(&mut self, contribution: SchemaContribution) -> Result<(), ConfigurationError> {
        let SchemaContribution {
            owner,
            kind,
            tags,
            fragment,
            shared_attributes,
        } = contribution;

        let returned = fragment.as_ref().map(SchemaFragment::kind);
        let consistent = match (kind, returned) {
            (ExtensionKind::Plain, None) => true,
            (declared, Some(returned)) => declared == returned,
            (_, None) => false,
        };
        if !consistent {
            return Err(ConfigurationError::KindMismatch {
                extension: owner,
                declared: kind.as_str(),
                returned: returned.map_or("none", ExtensionKind::as_str),
            });
        }

        match fragment {
            Some(SchemaFragment::Node { name, mut spec }) => {
                if let Some((existing, _)) = self.nodes.iter().find(|(n, _)| n.name == name) {
                    return Err(ConfigurationError::DuplicateNode {
                        name,
                        first: existing.owner.clone(),
                        second: owner,
                    });
                }
                spec.group = merge_groups(spec.group.take(), &tags);
                self.nodes.push((NodeType { name, owner, spec }, tags));
            }
            Some(SchemaFragment::Mark { name, mut spec }) => {
                if let Some((existing, _)) = self.marks.iter().find(|(m, _)| m.name == name) {
                    return Err(ConfigurationError::DuplicateMark {
                        name,
                        first: existing.owner.clone(),
                        second: owner,
                    });
                }
                spec.group = merge_groups(spec.group.take(), &tags);
                self.marks.push((MarkType { name, owner, spec }, tags));
            }
            None => {}
        }

        self.shared.extend(shared_attributes);
        Ok(())
    }

    /// Register an attribute shared across types.
    pub fn shared_attribute(&mut self, attribute: SharedAttribute) {
        self.shared.push(attribute);
    }

    /// Merge shared attributes and freeze.
    ///
    /// A type's own attribute of the same name wins over a shared one.
    pub fn build(mut self, top_node: &str) -> Schema {
        for attribute in &self.shared {
            for (node, tags) in &mut self.nodes {
                if applies(&attribute.identifiers, &node.name, tags, true) {
                    merge_attribute(&mut node.spec.attrs, &node.name, attribute);
                }
            }
            for (mark, tags) in &mut self.marks {
                if applies(&attribute.identifiers, &mark.name, tags, false) {
                    merge_attribute(&mut mark.spec.attrs, &mark.name, attribute);
                }
            }
        }

        let nodes: Vec<NodeType> = self.nodes.into_iter().map(|(n, _)| n).collect();
        let marks: Vec<MarkType> = self.marks.into_iter().map(|(m, _)| m).collect();
        let top_node = nodes
            .iter()
            .any(|n| n.name == top_node)
            .then(|| top_node.to_string());

        tracing::debug!(
            nodes = nodes.len(),
            marks = marks.len(),
            shared = self.shared.len(),
            "schema frozen"
        );

        Schema {
            top_node,
            nodes,
            marks,
        }
    }
}

fn merge_groups(group: Option<String>, tags: &[Tag]) -> Option<String> {
    let mut names: Vec<String> = group
        .iter()
        .flat_map(|g| g.split_whitespace())
        .map(str::to_string)
        .collect();
    for tag in tags {
        let name = tag.group_name();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    (!names.is_empty()).then(|| names.join(" "))
}

fn applies(identifiers: &Identifiers, name: &str, tags: &[Tag], is_node: bool) -> bool {
    match identifiers {
        Identifiers::All => true,
        Identifiers::Nodes => is_node,
        Identifiers::Marks => !is_node,
        Identifiers::Names(names) => names.iter().any(|n| n == name),
        Identifiers::Tags(wanted) => wanted.iter().any(|t| tags.contains(t)),
    }
}

fn merge_attribute(
    attrs: &mut BTreeMap<String, AttributeSpec>,
    type_name: &str,
    attribute: &SharedAttribute,
) {
    if attrs.contains_key(&attribute.name) {
        tracing::debug!(
            type_name,
            attribute = %attribute.name,
            "own attribute shadows shared attribute"
        );
        return;
    }
    attrs.insert(attribute.name.clone(), attribute.spec.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(owner: &str, name: &str, spec: NodeSpec, tags: Vec<Tag>) -> SchemaContribution {
        SchemaContribution {
            owner: owner.to_string(),
            kind: ExtensionKind::Node,
            tags,
            fragment: Some(SchemaFragment::node(name, spec)),
            shared_attributes: Vec::new(),
        }
    }

    fn mark(owner: &str, name: &str) -> SchemaContribution {
        SchemaContribution {
            owner: owner.to_string(),
            kind: ExtensionKind::Mark,
            tags: vec![Tag::FormattingMark],
            fragment: Some(SchemaFragment::mark(name, MarkSpec::new())),
            shared_attributes: Vec::new(),
        }
    }

    #[test]
    fn test_nodes_keep_sorted_order_and_tag_groups() {
        let mut builder = SchemaBuilder::new();
        builder
            .add(node("doc", "doc", NodeSpec::new().content("block+"), vec![]))
            .unwrap();
        builder
            .add(node(
                "paragraph",
                "paragraph",
                NodeSpec::new().content("inline*").group("block"),
                vec![Tag::Block, Tag::TextBlock],
            ))
            .unwrap();
        builder.add(mark("bold", "bold")).unwrap();
        let schema = builder.build("doc");

        let names: Vec<&str> = schema.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["doc", "paragraph"]);
        assert_eq!(
            schema.node("paragraph").unwrap().spec.group.as_deref(),
            Some("block textBlock")
        );
        assert_eq!(
            schema.mark("bold").unwrap().spec.group.as_deref(),
            Some("formattingMark")
        );
        assert_eq!(schema.top_node(), Some("doc"));
    }

    #[test]
    fn test_duplicate_node_names_both_owners() {
        let mut builder = SchemaBuilder::new();
        builder
            .add(node("heading", "heading", NodeSpec::new(), vec![]))
            .unwrap();
        let err = builder
            .add(node("fancy-heading", "heading", NodeSpec::new(), vec![]))
            .unwrap_err();
        match err {
            ConfigurationError::DuplicateNode {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "heading");
                assert_eq!(first, "heading");
                assert_eq!(second, "fancy-heading");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_mark_names() {
        let mut builder = SchemaBuilder::new();
        builder.add(mark("bold", "strong")).unwrap();
        assert!(matches!(
            builder.add(mark("strong", "strong")),
            Err(ConfigurationError::DuplicateMark { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut builder = SchemaBuilder::new();
        let err = builder
            .add(SchemaContribution {
                owner: "image".into(),
                kind: ExtensionKind::Node,
                tags: vec![],
                fragment: None,
                shared_attributes: vec![],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::KindMismatch {
                declared: "node",
                returned: "none",
                ..
            }
        ));

        let err = builder
            .add(SchemaContribution {
                owner: "history".into(),
                kind: ExtensionKind::Plain,
                tags: vec![],
                fragment: Some(SchemaFragment::mark("history", MarkSpec::new())),
                shared_attributes: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::KindMismatch { .. }));
    }

    #[test]
    fn test_shared_attributes_merge_after_collection() {
        let mut builder = SchemaBuilder::new();
        // The provider sorts before the nodes it decorates.
        builder
            .add(SchemaContribution {
                owner: "node-id".into(),
                kind: ExtensionKind::Plain,
                tags: vec![],
                fragment: None,
                shared_attributes: vec![SharedAttribute::new(
                    Identifiers::Nodes,
                    "id",
                    AttributeSpec::with_default(Value::Null),
                )],
            })
            .unwrap();
        builder
            .add(node("paragraph", "paragraph", NodeSpec::new(), vec![Tag::Block]))
            .unwrap();
        builder
            .add(node(
                "heading",
                "heading",
                NodeSpec::new().attr("id", AttributeSpec::with_default("h")),
                vec![Tag::Block],
            ))
            .unwrap();
        builder.add(mark("bold", "bold")).unwrap();
        builder.shared_attribute(SharedAttribute::new(
            Identifiers::Tags(vec![Tag::FormattingMark]),
            "color",
            AttributeSpec::required(),
        ));
        let schema = builder.build("doc");

        assert_eq!(
            schema.node("paragraph").unwrap().spec.attrs.get("id"),
            Some(&AttributeSpec::with_default(Value::Null))
        );
        // Own attribute wins.
        assert_eq!(
            schema.node("heading").unwrap().spec.attrs.get("id"),
            Some(&AttributeSpec::with_default("h"))
        );
        assert!(schema.mark("bold").unwrap().spec.attrs.get("id").is_none());
        assert!(schema.mark("bold").unwrap().spec.attrs["color"].is_required());
        assert_eq!(schema.top_node(), None);
    }

    #[test]
    fn test_schema_serializes_flat() {
        let mut builder = SchemaBuilder::new();
        builder
            .add(node(
                "heading",
                "heading",
                NodeSpec::new()
                    .content("inline*")
                    .attr("level", AttributeSpec::with_default(1))
                    .parse(ParseRule::tag("h1").attr("level", 1))
                    .to_dom(DomSpec::new("h1").hole()),
                vec![],
            ))
            .unwrap();
        let value = serde_json::to_value(builder.build("doc")).unwrap();
        assert_eq!(value["nodes"][0]["name"], json!("heading"));
        assert_eq!(value["nodes"][0]["content"], json!("inline*"));
        assert_eq!(value["nodes"][0]["attrs"]["level"]["default"], json!(1));
        assert_eq!(value["nodes"][0]["parse_dom"][0]["tag"], json!("h1"));
        assert!(value["nodes"][0].get("owner").is_none());
    }
}
