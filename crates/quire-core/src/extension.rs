//! The extension contract.
//!
//! An extension is a named unit contributing any subset of: a schema fragment, shared attributes,
//! commands, helpers, key bindings, editing-engine plugins, handler events and lifecycle hooks.
//! Every capability has an empty default, so an extension only implements what it contributes.
//!
//! # Example
//!
//! ```rust
//! use quire_core::{Extension, ExtensionKind, NodeSpec, Priority, SchemaFragment, Surface, Tag};
//!
//! struct Paragraph;
//!
//! impl<S: Surface> Extension<S> for Paragraph {
//!     fn name(&self) -> &str {
//!         "paragraph"
//!     }
//!
//!     fn priority(&self) -> Priority {
//!         Priority::MEDIUM
//!     }
//!
//!     fn kind(&self) -> ExtensionKind {
//!         ExtensionKind::Node
//!     }
//!
//!     fn tags(&self) -> Vec<Tag> {
//!         vec![Tag::Block, Tag::TextBlock]
//!     }
//!
//!     fn create_schema(&self) -> Option<SchemaFragment> {
//!         Some(SchemaFragment::node("paragraph", NodeSpec::new().content("inline*")))
//!     }
//! }
//! ```

use crate::commands::{CommandSpec, HelperSpec};
use crate::error::{BoxError, ConfigurationError};
use crate::handlers::Handlers;
use crate::keymap::KeyBinding;
use crate::lifecycle::Disposer;
use crate::manager::{StateUpdate, StoreView};
use crate::options::{OptionChanges, Options};
use crate::priority::Priority;
use crate::schema::{SchemaFragment, SharedAttribute};
use crate::surface::Surface;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};

/// Result of a setup hook: an optional cleanup to run at teardown.
pub type LifecycleResult = Result<Option<Disposer>, BoxError>;

/// What kind of schema contribution an extension makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    /// No schema contribution.
    Plain,
    /// Contributes exactly one node type.
    Node,
    /// Contributes exactly one mark type.
    Mark,
}

impl ExtensionKind {
    /// Lower-case name, used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionKind::Plain => "plain",
            ExtensionKind::Node => "node",
            ExtensionKind::Mark => "mark",
        }
    }
}

/// Classification tags. Node and mark tags are added to the schema `group` of the contributed type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tag {
    /// Block-level node.
    Block,
    /// Inline node.
    Inline,
    /// Block node holding inline content.
    TextBlock,
    /// Node that formats its content (headings, blockquotes).
    FormattingNode,
    /// Mark that formats text (bold, italic).
    FormattingMark,
    /// Node containing list items.
    ListContainerNode,
    /// A list item node.
    ListItemNode,
    /// Code content.
    Code,
    /// Media (images, video).
    Media,
    /// Behavioral extension without content.
    Behavior,
    /// Node that may be the last child of the document.
    LastNodeCompatible,
    /// Any other tag.
    Custom(String),
}

impl Tag {
    /// Name used as a schema group.
    pub fn group_name(&self) -> &str {
        match self {
            Tag::Block => "block",
            Tag::Inline => "inline",
            Tag::TextBlock => "textBlock",
            Tag::FormattingNode => "formattingNode",
            Tag::FormattingMark => "formattingMark",
            Tag::ListContainerNode => "listContainerNode",
            Tag::ListItemNode => "listItemNode",
            Tag::Code => "code",
            Tag::Media => "media",
            Tag::Behavior => "behavior",
            Tag::LastNodeCompatible => "lastNodeCompatible",
            Tag::Custom(name) => name,
        }
    }
}

/// A unit of editor behavior.
///
/// Extensions are generic over the editing [`Surface`] so that commands, key bindings and plugins
/// can use its state and transaction types. Implementations for a specific surface are fine too.
pub trait Extension<S: Surface>: Any {
    /// Unique name within a manager.
    fn name(&self) -> &str;

    /// Sort key; lower values compose (and handle keys) first.
    fn priority(&self) -> Priority {
        Priority::DEFAULT
    }

    /// Schema contribution kind. Must agree with [`Extension::create_schema`].
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Plain
    }

    /// Classification tags.
    fn tags(&self) -> Vec<Tag> {
        Vec::new()
    }

    /// Option store, if the extension has options.
    fn options(&self) -> Option<&Options> {
        None
    }

    /// Mutable option store. Only the manager writes through this.
    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }

    /// Names of extensions that must be present in the same manager.
    fn required_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// The node or mark this extension contributes.
    fn create_schema(&self) -> Option<SchemaFragment> {
        None
    }

    /// Attributes added to other types' attribute sets.
    fn create_shared_attributes(&self) -> Vec<SharedAttribute> {
        Vec::new()
    }

    /// Commands.
    fn create_commands(&self) -> Vec<CommandSpec<S>> {
        Vec::new()
    }

    /// Pure state accessors.
    fn create_helpers(&self) -> Vec<HelperSpec<S>> {
        Vec::new()
    }

    /// Key bindings.
    fn create_keymap(&self) -> Vec<KeyBinding<S>> {
        Vec::new()
    }

    /// Editing-engine plugins.
    fn create_plugins(&self) -> Vec<S::Plugin> {
        Vec::new()
    }

    /// The events this extension raises, if any.
    fn handlers(&self) -> Option<&Handlers> {
        None
    }

    /// Called once after composition.
    fn on_create(&mut self, _store: &StoreView<'_, S>) -> LifecycleResult {
        Ok(None)
    }

    /// Called each time a surface is attached.
    fn on_view(&mut self, _store: &StoreView<'_, S>) -> LifecycleResult {
        Ok(None)
    }

    /// Called after every transaction dispatched through the manager.
    fn on_state_update(&mut self, _update: &StateUpdate<'_, S>) {}

    /// Called after dynamic options changed.
    fn on_set_options(&mut self, _changes: &OptionChanges) {}

    /// Called during [`Manager::destroy`](crate::Manager::destroy), after all disposers ran.
    fn on_destroy(&mut self) {}
}

/// A named bundle of extensions.
///
/// Preset members are deduplicated by name: an extension supplied directly always wins, and when
/// two presets contribute the same name the first one is kept.
pub struct Preset<S: Surface> {
    name: String,
    extensions: Vec<Box<dyn Extension<S>>>,
}

impl<S: Surface> Preset<S> {
    /// Create an empty preset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
        }
    }

    /// Builder: add a member.
    pub fn with(mut self, extension: impl Extension<S>) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Preset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns `true` if the preset has no members.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

enum Entry<S: Surface> {
    Direct(Box<dyn Extension<S>>),
    Preset(Preset<S>),
}

/// The ordered input list handed to [`Manager::create`](crate::Manager::create).
pub struct ExtensionList<S: Surface> {
    entries: Vec<Entry<S>>,
}

impl<S: Surface> Default for ExtensionList<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Surface> ExtensionList<S> {
    /// Empty list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder: add an extension.
    pub fn with(mut self, extension: impl Extension<S>) -> Self {
        self.push(extension);
        self
    }

    /// Builder: add a preset.
    pub fn preset(mut self, preset: Preset<S>) -> Self {
        self.entries.push(Entry::Preset(preset));
        self
    }

    /// Add an extension.
    pub fn push(&mut self, extension: impl Extension<S>) {
        self.entries.push(Entry::Direct(Box::new(extension)));
    }

    /// Add an already boxed extension.
    pub fn push_boxed(&mut self, extension: Box<dyn Extension<S>>) {
        self.entries.push(Entry::Direct(extension));
    }

    /// Number of entries (a preset counts once).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten presets into a registration-ordered list.
    ///
    /// `taken` holds names already present in the manager; preset members with those names are
    /// dropped. Directly supplied duplicates are an error.
    pub(crate) fn flatten(
        self,
        taken: &HashSet<String>,
    ) -> Result<Vec<Box<dyn Extension<S>>>, ConfigurationError> {
        let mut direct = HashSet::new();
        for entry in &self.entries {
            if let Entry::Direct(extension) = entry {
                let name = extension.name();
                if taken.contains(name) || !direct.insert(name.to_string()) {
                    return Err(ConfigurationError::DuplicateExtension(name.to_string()));
                }
            }
        }

        let mut seen: HashSet<String> = taken.iter().cloned().chain(direct).collect();
        let mut out = Vec::new();
        for entry in self.entries {
            match entry {
                Entry::Direct(extension) => out.push(extension),
                Entry::Preset(preset) => {
                    for extension in preset.extensions {
                        if seen.insert(extension.name().to_string()) {
                            out.push(extension);
                        } else {
                            tracing::debug!(
                                preset = %preset.name,
                                extension = extension.name(),
                                "dropping duplicate preset member"
                            );
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

impl<S: Surface> From<Vec<Box<dyn Extension<S>>>> for ExtensionList<S> {
    fn from(extensions: Vec<Box<dyn Extension<S>>>) -> Self {
        Self {
            entries: extensions.into_iter().map(Entry::Direct).collect(),
        }
    }
}

impl<S: Surface> From<Preset<S>> for ExtensionList<S> {
    fn from(preset: Preset<S>) -> Self {
        Self::new().preset(preset)
    }
}

/// Extension names grouped by tag, in sorted extension order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    by_tag: BTreeMap<Tag, Vec<String>>,
}

impl TagIndex {
    pub(crate) fn insert(&mut self, tag: Tag, extension: &str) {
        let names = self.by_tag.entry(tag).or_default();
        if !names.iter().any(|n| n == extension) {
            names.push(extension.to_string());
        }
    }

    /// Extensions carrying `tag`.
    pub fn get(&self, tag: &Tag) -> &[String] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if `extension` carries `tag`.
    pub fn has(&self, tag: &Tag, extension: &str) -> bool {
        self.get(tag).iter().any(|n| n == extension)
    }

    /// All tags in use.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.by_tag.keys()
    }
}
