#![warn(missing_docs)]
//! Quire Core - extension composition engine for headless rich-text editors
//!
//! # Overview
//!
//! `quire-core` sits between a document editing engine and the extensions that configure it.
//! Each extension contributes some subset of a schema fragment, commands, helpers, key bindings,
//! editing-engine plugins, shared attributes, event handlers and lifecycle hooks. The
//! [`Manager`] sorts extensions by priority, composes their contributions into one frozen
//! [`Schema`] and a set of lookup tables, resolves shortcuts through ordered fallthrough chains,
//! and tears everything down in reverse order.
//!
//! The crate never touches the document itself. The engine is reached through the [`Surface`]
//! trait, which supplies state, transactions and dispatch.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Manager (lifecycle, runtime operations)    │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Keymap chains │ Commands & helpers         │  ← Runtime resolution
//! ├─────────────────────────────────────────────┤
//! │  Schema builder (fragments + shared attrs)  │  ← Composition
//! ├─────────────────────────────────────────────┤
//! │  Priority sorter                            │  ← Ordering
//! ├─────────────────────────────────────────────┤
//! │  Extension trait │ Options │ Handlers       │  ← Contributions
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use quire_core::{
//!     Extension, ExtensionKind, ExtensionList, KeyBinding, Manager, ManagerSettings, NodeSpec,
//!     Priority, SchemaFragment, Surface,
//! };
//!
//! struct Editor;
//!
//! impl Surface for Editor {
//!     type State = ();
//!     type Transaction = ();
//!     type Plugin = ();
//!
//!     fn state(&self) -> &() { &() }
//!     fn transaction(&self) {}
//!     fn dispatch(&mut self, _tr: ()) {}
//! }
//!
//! struct Doc;
//!
//! impl<S: Surface> Extension<S> for Doc {
//!     fn name(&self) -> &str { "doc" }
//!     fn priority(&self) -> Priority { Priority::HIGHEST }
//!     fn kind(&self) -> ExtensionKind { ExtensionKind::Node }
//!     fn create_schema(&self) -> Option<SchemaFragment> {
//!         Some(SchemaFragment::node("doc", NodeSpec::new().content("block+")))
//!     }
//!     fn create_keymap(&self) -> Vec<KeyBinding<S>> {
//!         vec![KeyBinding::new("Mod-a", |_props, _next| true)]
//!     }
//! }
//!
//! let mut manager =
//!     Manager::<Editor>::create(ExtensionList::new().with(Doc), ManagerSettings::default()).unwrap();
//! assert_eq!(manager.schema().top_node(), Some("doc"));
//!
//! manager.add_view(Editor).unwrap();
//! assert!(manager.run_shortcut("Mod-a").unwrap());
//! assert_eq!(manager.version(), 1);
//! ```
//!
//! # Module Description
//!
//! - [`priority`] - priority levels and the stable sorter
//! - [`extension`] - the extension trait, presets and tags
//! - [`options`] - static and dynamic extension options
//! - [`schema`] - fragments, shared attributes and the schema builder
//! - [`commands`] - commands and helpers
//! - [`keymap`] - shortcut chains with `next` fallthrough
//! - [`handlers`] - named event subscriptions
//! - [`lifecycle`] - disposers and manager phases
//! - [`manager`] - composition and lifecycle coordination
//!
//! # Logging
//!
//! The crate emits `tracing` events (`debug` for composition, `trace` for key resolution and
//! handler dispatch, `warn` for failing disposers) and never installs a subscriber.

pub mod commands;
pub mod error;
pub mod extension;
pub mod handlers;
pub mod keymap;
pub mod lifecycle;
pub mod manager;
pub mod options;
pub mod priority;
pub mod schema;
mod surface;

pub use commands::{
    ActiveFn, Command, CommandFn, CommandProps, CommandSpec, CommandTable, HelperFn, HelperSpec,
    HelperTable,
};
pub use error::{
    BoxError, CommandError, ConfigurationError, DisposalError, HandlerError, ManagerError,
};
pub use extension::{Extension, ExtensionKind, ExtensionList, LifecycleResult, Preset, Tag, TagIndex};
pub use handlers::{DispatchMode, EventSpec, HandlerCallback, Handlers};
pub use keymap::{KeyBinding, KeyBindingEntry, KeyBindingProps, KeyHandler, Keymap, Next};
pub use lifecycle::{Disposer, Phase};
pub use manager::{
    Chain, Exclusions, Manager, ManagerSettings, ManagerStore, ManagerUpdate, RecreateOptions,
    StateUpdate, StoreView, UpdateCallback, UpdateSource,
};
pub use options::{OptionChange, OptionChanges, Options};
pub use priority::Priority;
pub use quire_keys::{KeyPress, Modifiers, Platform, Shortcut, ShortcutError};
pub use schema::{
    AttributeSpec, DomSpec, Identifiers, MarkSpec, MarkType, NodeSpec, NodeType, ParseRule,
    Schema, SchemaBuilder, SchemaContribution, SchemaFragment, SharedAttribute,
};
pub use surface::Surface;
