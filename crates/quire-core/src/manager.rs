//! The extension manager.
//!
//! # Overview
//!
//! [`Manager`] owns a set of extensions and everything derived from them:
//!
//! - the sorted extension order (priority ascending, registration order on ties)
//! - the frozen [`Schema`]
//! - the plugin list handed to the editing surface
//! - the command, helper and keymap tables
//! - the tag index
//!
//! It also drives the lifecycle: `on_create` once after composition, `on_view` on every surface
//! attachment, `on_state_update` after every dispatched transaction, and teardown in reverse
//! order on [`Manager::destroy`].
//!
//! # Example
//!
//! ```rust
//! use quire_core::{CommandSpec, Extension, ExtensionList, Manager, ManagerSettings, Surface};
//!
//! struct Editor { text: String }
//!
//! impl Surface for Editor {
//!     type State = String;
//!     type Transaction = Vec<String>;
//!     type Plugin = ();
//!
//!     fn state(&self) -> &String { &self.text }
//!     fn transaction(&self) -> Vec<String> { Vec::new() }
//!     fn dispatch(&mut self, tr: Vec<String>) { self.text.extend(tr) }
//! }
//!
//! struct Shout;
//!
//! impl Extension<Editor> for Shout {
//!     fn name(&self) -> &str { "shout" }
//!
//!     fn create_commands(&self) -> Vec<CommandSpec<Editor>> {
//!         vec![CommandSpec::<Editor>::new("shout", |props, _args| {
//!             if props.dispatch {
//!                 props.tr.push("!".to_string());
//!             }
//!             true
//!         })]
//!     }
//! }
//!
//! let mut manager = Manager::create(ExtensionList::new().with(Shout), ManagerSettings::default()).unwrap();
//! manager.add_view(Editor { text: "hi".into() }).unwrap();
//! assert!(manager.run_command("shout", &serde_json::Value::Null).unwrap());
//! assert_eq!(manager.surface().unwrap().state(), "hi!");
//! manager.destroy().unwrap();
//! ```

use crate::commands::{CommandProps, CommandTable, HelperTable};
use crate::error::{BoxError, CommandError, ConfigurationError, HandlerError, ManagerError};
use crate::extension::{Extension, ExtensionList, TagIndex};
use crate::keymap::{KeyBindingProps, Keymap, KeymapContribution};
use crate::lifecycle::{Disposer, DisposerStack, FailureCollector, Phase};
use crate::options::{self, OptionChanges};
use crate::priority::{self, Priority};
use crate::schema::{Schema, SchemaBuilder, SchemaContribution, SharedAttribute};
use crate::surface::Surface;
use quire_keys::{KeyPress, Platform};
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Parts of an extension's contribution to leave out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Exclusions {
    /// Drop the extension's commands.
    pub commands: bool,
    /// Drop the extension's helpers.
    pub helpers: bool,
    /// Drop the extension's key bindings.
    pub keymap: bool,
    /// Drop the extension's plugins.
    pub plugins: bool,
    /// Drop the extension's shared attributes.
    pub shared_attributes: bool,
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Priority overrides by extension name.
    pub priority: BTreeMap<String, Priority>,
    /// Name of the schema's top node.
    pub top_node: String,
    /// Platform used to resolve `Mod` in shortcuts.
    pub platform: Platform,
    /// Per-extension exclusions.
    pub exclude: BTreeMap<String, Exclusions>,
    /// Attributes added to matching types regardless of extension.
    pub shared_attributes: Vec<SharedAttribute>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            priority: BTreeMap::new(),
            top_node: "doc".to_string(),
            platform: Platform::current(),
            exclude: BTreeMap::new(),
            shared_attributes: Vec::new(),
        }
    }
}

impl ManagerSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(ConfigurationError::InvalidSettings)
    }

    /// Builder: override one extension's priority.
    pub fn with_priority(mut self, extension: impl Into<String>, priority: Priority) -> Self {
        self.priority.insert(extension.into(), priority);
        self
    }

    /// Builder: set the platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn exclusions(&self, extension: &str) -> Exclusions {
        self.exclude.get(extension).copied().unwrap_or_default()
    }
}

/// Options for [`Manager::recreate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecreateOptions {
    /// Priority overrides, applied on top of the current ones.
    pub priority: BTreeMap<String, Priority>,
}

/// What caused a dispatched transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    /// [`Manager::run_command`].
    Command(String),
    /// [`Chain::run`], with the command names in order.
    Chain(Vec<String>),
    /// A key binding chain, with its canonical shortcut.
    Key(String),
    /// [`Manager::dispatch`].
    External,
}

/// Notification sent to subscribers after every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerUpdate {
    /// Cause.
    pub source: UpdateSource,
    /// Version before the dispatch.
    pub old_version: u64,
    /// Version after the dispatch.
    pub new_version: u64,
}

/// Subscriber callback.
pub type UpdateCallback = Box<dyn FnMut(&ManagerUpdate)>;

type Factory<S> = Rc<dyn Fn() -> ExtensionList<S>>;

/// Everything derived from the sorted extensions.
pub struct ManagerStore<S: Surface> {
    schema: Rc<Schema>,
    plugins: Vec<S::Plugin>,
    plugin_owners: Vec<String>,
    commands: CommandTable<S>,
    helpers: HelperTable<S>,
    keymap: Keymap<S>,
    tags: TagIndex,
    names: Vec<String>,
}

impl<S: Surface> ManagerStore<S> {
    fn emptied(schema: Rc<Schema>) -> Self {
        Self {
            schema,
            plugins: Vec::new(),
            plugin_owners: Vec::new(),
            commands: CommandTable::default(),
            helpers: HelperTable::default(),
            keymap: Keymap::default(),
            tags: TagIndex::default(),
            names: Vec::new(),
        }
    }
}

/// Store access handed to lifecycle hooks.
///
/// Reads cover the whole store. The only write is [`StoreView::refresh_plugins`], scoped to the
/// extension whose hook is running.
pub struct StoreView<'a, S: Surface> {
    store: &'a ManagerStore<S>,
    surface: Option<&'a S>,
    // Hook owner and the manager's pending plugin refreshes.
    scope: Option<(&'a str, &'a RefCell<Vec<String>>)>,
}

impl<'a, S: Surface> StoreView<'a, S> {
    /// The frozen schema.
    pub fn schema(&self) -> &'a Rc<Schema> {
        &self.store.schema
    }

    /// Plugins in sorted extension order.
    pub fn plugins(&self) -> &'a [S::Plugin] {
        &self.store.plugins
    }

    /// Command table.
    pub fn commands(&self) -> &'a CommandTable<S> {
        &self.store.commands
    }

    /// Helper table.
    pub fn helpers(&self) -> &'a HelperTable<S> {
        &self.store.helpers
    }

    /// Keymap.
    pub fn keymap(&self) -> &'a Keymap<S> {
        &self.store.keymap
    }

    /// Tag index.
    pub fn tags(&self) -> &'a TagIndex {
        &self.store.tags
    }

    /// Extension names in sorted order.
    pub fn extension_names(&self) -> &'a [String] {
        &self.store.names
    }

    /// The attached surface. `None` during `on_create`.
    pub fn surface(&self) -> Option<&'a S> {
        self.surface
    }

    /// Evaluate a helper against the attached surface.
    pub fn helper(&self, name: &str, args: &Value) -> Result<Value, CommandError> {
        if !self.store.helpers.contains(name) {
            return Err(CommandError::UnknownHelper(name.to_string()));
        }
        let surface = self
            .surface
            .ok_or_else(|| CommandError::NotAttached(name.to_string()))?;
        self.store.helpers.call(name, surface.state(), args)
    }

    /// Rebuild the running hook's own plugins once the hook batch returns.
    ///
    /// Returns `false` when the view does not belong to a hook; call
    /// [`Manager::update_plugins`] directly there.
    pub fn refresh_plugins(&self) -> bool {
        let Some((owner, pending)) = self.scope else {
            return false;
        };
        let mut pending = pending.borrow_mut();
        if !pending.iter().any(|name| name == owner) {
            pending.push(owner.to_string());
        }
        true
    }
}

/// Passed to [`Extension::on_state_update`] after each dispatch.
pub struct StateUpdate<'a, S: Surface> {
    /// State after the dispatch.
    pub state: &'a S::State,
    /// What caused it.
    pub source: &'a UpdateSource,
}

/// Composes extensions and coordinates their lifecycle.
pub struct Manager<S: Surface> {
    // Registration order. Slots are appended by `recreate`, never reordered.
    slots: Vec<Box<dyn Extension<S>>>,
    // Sorted permutation of `slots`.
    order: Vec<usize>,
    settings: ManagerSettings,
    factory: Option<Factory<S>>,
    store: ManagerStore<S>,
    surface: Option<S>,
    create_disposers: DisposerStack,
    view_disposers: DisposerStack,
    phase: Phase,
    version: u64,
    callbacks: Vec<UpdateCallback>,
    plugin_refreshes: RefCell<Vec<String>>,
}

impl<S: Surface> fmt::Debug for Manager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("extensions", &self.extension_names())
            .field("phase", &self.phase)
            .field("version", &self.version)
            .field("attached", &self.surface.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Surface> Manager<S> {
    /// Compose `extensions` and run their `on_create` hooks.
    ///
    /// Any configuration error or failing hook aborts construction. Disposers returned by hooks
    /// that already ran are unwound first.
    pub fn create(
        extensions: impl Into<ExtensionList<S>>,
        settings: ManagerSettings,
    ) -> Result<Self, ManagerError> {
        let slots = extensions.into().flatten(&HashSet::new())?;
        let (order, store) = compose(&slots, &settings, None)?;

        let mut manager = Self {
            slots,
            order,
            settings,
            factory: None,
            store,
            surface: None,
            create_disposers: DisposerStack::default(),
            view_disposers: DisposerStack::default(),
            phase: Phase::Uninitialized,
            version: 0,
            callbacks: Vec::new(),
            plugin_refreshes: RefCell::default(),
        };

        let order = manager.order.clone();
        if let Err(err) = manager.run_on_create(&order) {
            let mut failures = FailureCollector::default();
            manager.create_disposers.unwind(&mut failures);
            return Err(err);
        }
        manager.phase = Phase::Created;
        Ok(manager)
    }

    /// Compose the list produced by `factory`. The factory is kept so that [`Manager::renew`] can
    /// build a manager with fresh extension instances.
    pub fn from_factory(
        factory: impl Fn() -> ExtensionList<S> + 'static,
        settings: ManagerSettings,
    ) -> Result<Self, ManagerError> {
        let factory: Factory<S> = Rc::new(factory);
        let mut manager = Self::create(factory(), settings)?;
        manager.factory = Some(factory);
        Ok(manager)
    }

    /// Build an independent manager with fresh extensions from the factory and the same settings.
    pub fn renew(&self) -> Result<Self, ManagerError> {
        let factory = self
            .factory
            .as_ref()
            .ok_or(ConfigurationError::NoFactory)?;
        let mut manager = Self::create(factory(), self.settings.clone())?;
        manager.factory = Some(Rc::clone(factory));
        Ok(manager)
    }

    fn ensure_alive(&self) -> Result<(), ManagerError> {
        if self.phase == Phase::Destroyed {
            return Err(ManagerError::Destroyed);
        }
        Ok(())
    }

    fn run_on_create(&mut self, indices: &[usize]) -> Result<(), ManagerError> {
        self.plugin_refreshes.borrow_mut().clear();
        for &i in indices {
            let owner = self.slots[i].name().to_string();
            let view = StoreView {
                store: &self.store,
                surface: self.surface.as_ref(),
                scope: Some((owner.as_str(), &self.plugin_refreshes)),
            };
            let disposer = self.slots[i].on_create(&view).map_err(HandlerError)?;
            if let Some(disposer) = disposer {
                self.create_disposers.push(&owner, disposer);
            }
        }
        self.apply_plugin_refreshes()
    }

    fn run_on_view(&mut self, indices: &[usize]) -> Result<(), ManagerError> {
        self.plugin_refreshes.borrow_mut().clear();
        for &i in indices {
            let owner = self.slots[i].name().to_string();
            let view = StoreView {
                store: &self.store,
                surface: self.surface.as_ref(),
                scope: Some((owner.as_str(), &self.plugin_refreshes)),
            };
            let disposer = self.slots[i].on_view(&view).map_err(HandlerError)?;
            if let Some(disposer) = disposer {
                self.view_disposers.push(&owner, disposer);
            }
        }
        self.apply_plugin_refreshes()
    }

    fn apply_plugin_refreshes(&mut self) -> Result<(), ManagerError> {
        for name in self.plugin_refreshes.take() {
            tracing::trace!(extension = %name, "plugin refresh requested by hook");
            self.update_plugins(&name)?;
        }
        Ok(())
    }

    /// Attach an editing surface.
    ///
    /// The surface receives the plugin list, then `on_view` runs in sorted order. Attaching again
    /// first unwinds the disposers of the previous attachment; `on_create` never re-runs. If a
    /// hook fails, the view disposers collected so far are unwound and the surface is detached.
    pub fn add_view(&mut self, mut surface: S) -> Result<(), ManagerError> {
        self.ensure_alive()?;
        if self.phase == Phase::Viewed {
            let mut failures = FailureCollector::default();
            self.view_disposers.unwind(&mut failures);
            if let Err(err) = failures.into_result() {
                self.surface = None;
                self.phase = Phase::Created;
                return Err(err.into());
            }
        }

        surface.update_plugins(&self.store.plugins);
        self.surface = Some(surface);
        self.phase = Phase::Viewed;

        let order = self.order.clone();
        if let Err(err) = self.run_on_view(&order) {
            let mut failures = FailureCollector::default();
            self.view_disposers.unwind(&mut failures);
            self.surface = None;
            self.phase = Phase::Created;
            return Err(err);
        }
        tracing::debug!(
            extensions = self.slots.len(),
            plugins = self.store.plugins.len(),
            "view attached"
        );
        Ok(())
    }

    /// Add `extra` extensions and/or change priorities, then rebuild every derived structure.
    ///
    /// Existing extensions keep their identity and options. Only the extra extensions receive
    /// `on_create` (and `on_view` if a surface is attached). The schema `Rc` is kept if the
    /// rebuilt schema is equal. On a configuration error the manager is left as it was.
    pub fn recreate(
        &mut self,
        extra: impl Into<ExtensionList<S>>,
        options: RecreateOptions,
    ) -> Result<(), ManagerError> {
        self.ensure_alive()?;
        let taken: HashSet<String> = self.slots.iter().map(|e| e.name().to_string()).collect();
        let extra = extra.into().flatten(&taken)?;

        let first_new = self.slots.len();
        self.slots.extend(extra);
        let mut settings = self.settings.clone();
        settings.priority.extend(options.priority);

        let (order, store) = match compose(&self.slots, &settings, Some(&self.store.schema)) {
            Ok(composed) => composed,
            Err(err) => {
                self.slots.truncate(first_new);
                return Err(err.into());
            }
        };
        self.order = order;
        self.store = store;
        self.settings = settings;
        if let Some(surface) = self.surface.as_mut() {
            surface.update_plugins(&self.store.plugins);
        }

        let added: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&i| i >= first_new)
            .collect();
        self.run_on_create(&added)?;
        if self.phase == Phase::Viewed {
            self.run_on_view(&added)?;
        }
        Ok(())
    }

    /// Tear everything down.
    ///
    /// Runs view disposers in reverse, then create disposers in reverse, then `on_destroy` in
    /// reverse sorted order. Every disposer runs even if some fail; the first failure is
    /// returned. The schema stays readable; every other derived structure is cleared. Calling
    /// `destroy` again does nothing.
    pub fn destroy(&mut self) -> Result<(), ManagerError> {
        if self.phase == Phase::Destroyed {
            return Ok(());
        }
        let mut failures = FailureCollector::default();
        let disposers = self.view_disposers.len() + self.create_disposers.len();
        self.view_disposers.unwind(&mut failures);
        self.create_disposers.unwind(&mut failures);

        for &i in self.order.iter().rev() {
            self.slots[i].on_destroy();
            if let Some(handlers) = self.slots[i].handlers() {
                handlers.clear();
            }
        }

        self.store = ManagerStore::emptied(Rc::clone(&self.store.schema));
        self.surface = None;
        self.callbacks.clear();
        self.phase = Phase::Destroyed;
        tracing::debug!(disposers, "manager destroyed");
        failures.into_result()?;
        Ok(())
    }

    /// Change dynamic options of one extension and notify it.
    ///
    /// `patch` must be a JSON object of dynamic keys. The patch is all-or-nothing.
    pub fn set_extension_options(
        &mut self,
        name: &str,
        patch: Value,
    ) -> Result<OptionChanges, ManagerError> {
        self.ensure_alive()?;
        let patch = options::object(patch)?;
        let extension = self
            .slots
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| ConfigurationError::UnknownExtension(name.to_string()))?;

        let changes = match extension.options_mut() {
            Some(options) => options.apply(name, patch)?,
            None => match patch.keys().next() {
                Some(key) => {
                    return Err(ConfigurationError::UnknownOption {
                        extension: name.to_string(),
                        key: key.clone(),
                    }
                    .into());
                }
                None => OptionChanges::default(),
            },
        };
        if !changes.is_empty() {
            extension.on_set_options(&changes);
        }
        Ok(changes)
    }

    /// Re-create one extension's plugins in place and hand the new list to the surface.
    pub fn update_plugins(&mut self, name: &str) -> Result<(), ManagerError> {
        self.ensure_alive()?;
        let extension = self
            .slots
            .iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| ConfigurationError::UnknownExtension(name.to_string()))?;
        let fresh = if self.settings.exclusions(name).plugins {
            Vec::new()
        } else {
            extension.create_plugins()
        };

        let owners = &self.store.plugin_owners;
        let range = match owners.iter().position(|o| o == name) {
            Some(start) => {
                let len = owners[start..].iter().take_while(|o| *o == name).count();
                start..start + len
            }
            None => {
                let names = &self.store.names;
                let rank = |n: &str| names.iter().position(|x| x == n);
                let own = rank(name);
                let at = owners.iter().take_while(|o| rank(o.as_str()) < own).count();
                at..at
            }
        };

        let count = fresh.len();
        self.store.plugins.splice(range.clone(), fresh);
        self.store
            .plugin_owners
            .splice(range, std::iter::repeat_n(name.to_string(), count));
        if let Some(surface) = self.surface.as_mut() {
            surface.update_plugins(&self.store.plugins);
        }
        Ok(())
    }

    /// Subscribe to an extension's event.
    pub fn add_handler(
        &self,
        extension: &str,
        event: &str,
        callback: impl Fn(&Value) -> Result<Value, BoxError> + 'static,
    ) -> Result<Disposer, ManagerError> {
        self.ensure_alive()?;
        let target = self
            .extension_by_name(extension)
            .ok_or_else(|| ConfigurationError::UnknownExtension(extension.to_string()))?;
        let Some(handlers) = target.handlers() else {
            return Err(ConfigurationError::UnknownEvent {
                extension: extension.to_string(),
                event: event.to_string(),
            }
            .into());
        };
        Ok(handlers.add(event, callback)?)
    }

    /// Run a command against the attached surface and dispatch its transaction if it applies.
    pub fn run_command(&mut self, name: &str, args: &Value) -> Result<bool, ManagerError> {
        self.ensure_alive()?;
        let command = self.store.commands.get(name)?;
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| CommandError::NotAttached(name.to_string()))?;
        let Some(tr) = command.execute(surface, args) else {
            return Ok(false);
        };
        self.apply(tr, UpdateSource::Command(name.to_string()));
        Ok(true)
    }

    /// Dry run: would the command apply right now?
    pub fn command_enabled(&self, name: &str, args: &Value) -> Result<bool, ManagerError> {
        self.ensure_alive()?;
        let command = self.store.commands.get(name)?;
        let surface = self.attached(name)?;
        Ok(command.can_execute(surface, args))
    }

    /// The command's active state, or `None` if it has no active query.
    pub fn command_active(&self, name: &str, args: &Value) -> Result<Option<bool>, ManagerError> {
        self.ensure_alive()?;
        let command = self.store.commands.get(name)?;
        let surface = self.attached(name)?;
        Ok(command.is_active(surface.state(), args))
    }

    /// Evaluate a helper.
    pub fn helper(&self, name: &str, args: &Value) -> Result<Value, ManagerError> {
        self.ensure_alive()?;
        Ok(self.store_view().helper(name, args)?)
    }

    /// Start a command chain: several commands, one transaction.
    pub fn chain(&mut self) -> Chain<'_, S> {
        Chain {
            manager: self,
            steps: Vec::new(),
        }
    }

    /// Resolve a key press from the surface.
    ///
    /// Each candidate name with a chain is tried in turn, each against a fresh transaction.
    pub fn handle_key(&mut self, press: &KeyPress) -> Result<bool, ManagerError> {
        self.ensure_alive()?;
        let candidates = press.candidates();
        let name = candidates.first().map_or("", String::as_str);
        self.attached(name)?;
        for shortcut in &candidates {
            if self.store.keymap.contains(shortcut) && self.resolve(shortcut)? {
                return Ok(true);
            }
        }
        tracing::trace!(key = %press.key, "key press unhandled");
        Ok(false)
    }

    /// Resolve a shortcut by name (`Mod-b`), normalized for the configured platform.
    pub fn run_shortcut(&mut self, shortcut: &str) -> Result<bool, ManagerError> {
        self.ensure_alive()?;
        let canonical = quire_keys::normalize(shortcut, self.settings.platform)?;
        self.attached(&canonical)?;
        self.resolve(&canonical)
    }

    fn resolve(&mut self, canonical: &str) -> Result<bool, ManagerError> {
        let surface = self.attached(canonical)?;
        let mut tr = surface.transaction();
        let handled = {
            let mut props =
                KeyBindingProps::new(surface.state(), &mut tr, canonical, &self.store.commands);
            self.store.keymap.resolve(&mut props)
        };
        tracing::trace!(shortcut = canonical, handled, "key chain resolved");
        if handled {
            self.apply(tr, UpdateSource::Key(canonical.to_string()));
        }
        Ok(handled)
    }

    /// Dispatch an externally built transaction through the manager.
    pub fn dispatch(&mut self, tr: S::Transaction) -> Result<(), ManagerError> {
        self.ensure_alive()?;
        self.attached("dispatch")?;
        self.apply(tr, UpdateSource::External);
        Ok(())
    }

    fn attached(&self, what: &str) -> Result<&S, CommandError> {
        self.surface
            .as_ref()
            .ok_or_else(|| CommandError::NotAttached(what.to_string()))
    }

    fn apply(&mut self, tr: S::Transaction, source: UpdateSource) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        surface.dispatch(tr);
        let old_version = self.version;
        self.version += 1;

        let update = StateUpdate {
            state: surface.state(),
            source: &source,
        };
        for &i in &self.order {
            self.slots[i].on_state_update(&update);
        }

        let change = ManagerUpdate {
            source,
            old_version,
            new_version: self.version,
        };
        self.notify_callbacks(&change);
    }

    /// Subscribe to post-dispatch notifications.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&ManagerUpdate) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    fn notify_callbacks(&mut self, change: &ManagerUpdate) {
        for callback in &mut self.callbacks {
            callback(change);
        }
    }

    /// Check if anything was dispatched since `version`.
    pub fn has_changed_since(&self, version: u64) -> bool {
        self.version > version
    }

    /// Dispatch counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Effective settings (including overrides added by `recreate`).
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// The frozen schema. Readable even after `destroy`.
    pub fn schema(&self) -> &Rc<Schema> {
        &self.store.schema
    }

    /// Plugins in sorted extension order.
    pub fn plugins(&self) -> &[S::Plugin] {
        &self.store.plugins
    }

    /// Command table.
    pub fn commands(&self) -> &CommandTable<S> {
        &self.store.commands
    }

    /// Helper table.
    pub fn helpers(&self) -> &HelperTable<S> {
        &self.store.helpers
    }

    /// Keymap.
    pub fn keymap(&self) -> &Keymap<S> {
        &self.store.keymap
    }

    /// Tag index.
    pub fn tags(&self) -> &TagIndex {
        &self.store.tags
    }

    /// View of the store as lifecycle hooks see it, without the hook-scoped writes.
    pub fn store_view(&self) -> StoreView<'_, S> {
        StoreView {
            store: &self.store,
            surface: self.surface.as_ref(),
            scope: None,
        }
    }

    /// Extensions in sorted order.
    pub fn extensions(&self) -> impl Iterator<Item = &dyn Extension<S>> {
        self.order.iter().map(|&i| &*self.slots[i])
    }

    /// Extension names in sorted order.
    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions().map(|e| e.name()).collect()
    }

    /// Look up an extension by name.
    pub fn extension_by_name(&self, name: &str) -> Option<&dyn Extension<S>> {
        self.slots
            .iter()
            .find(|e| e.name() == name)
            .map(|e| &**e)
    }

    /// Look up an extension by type.
    pub fn extension<E: Extension<S>>(&self) -> Option<&E> {
        self.slots.iter().find_map(|e| {
            let any: &dyn Any = &**e;
            any.downcast_ref::<E>()
        })
    }

    /// Look up an extension by type, mutably.
    pub fn extension_mut<E: Extension<S>>(&mut self) -> Option<&mut E> {
        self.slots.iter_mut().find_map(|e| {
            let any: &mut dyn Any = &mut **e;
            any.downcast_mut::<E>()
        })
    }

    /// The priority an extension is sorted by, overrides included.
    pub fn effective_priority(&self, name: &str) -> Option<Priority> {
        let extension = self.extension_by_name(name)?;
        Some(priority::effective_priority(
            name,
            extension.priority(),
            &self.settings.priority,
        ))
    }

    /// The attached surface.
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// The attached surface, mutably.
    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }
}

/// Several commands applied to one transaction, dispatched once.
///
/// If any command returns `false` the transaction is discarded and nothing is dispatched.
pub struct Chain<'m, S: Surface> {
    manager: &'m mut Manager<S>,
    steps: Vec<(String, Value)>,
}

impl<S: Surface> fmt::Debug for Chain<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(name, _)| name))
            .finish()
    }
}

impl<'m, S: Surface> Chain<'m, S> {
    /// Builder: append a command.
    pub fn add(mut self, name: impl Into<String>, args: Value) -> Self {
        self.steps.push((name.into(), args));
        self
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn prepare(&self) -> Result<&S, ManagerError> {
        self.manager.ensure_alive()?;
        for (name, _) in &self.steps {
            self.manager.store.commands.get(name)?;
        }
        Ok(self.manager.attached("chain")?)
    }

    /// Dry run of the whole chain against one transaction.
    pub fn enabled(&self) -> Result<bool, ManagerError> {
        let surface = self.prepare()?;
        let mut tr = surface.transaction();
        let commands = &self.manager.store.commands;
        for (name, args) in &self.steps {
            let command = commands.get(name)?;
            let mut props = CommandProps {
                state: surface.state(),
                tr: &mut tr,
                dispatch: false,
            };
            if !command.call(&mut props, args) {
                return Ok(false);
            }
        }
        Ok(!self.steps.is_empty())
    }

    /// Run every command. Returns `false` (and dispatches nothing) if any command does not apply
    /// or the chain is empty.
    pub fn run(self) -> Result<bool, ManagerError> {
        let surface = self.prepare()?;
        if self.steps.is_empty() {
            return Ok(false);
        }
        let mut tr = surface.transaction();
        let commands = &self.manager.store.commands;
        for (name, args) in &self.steps {
            let command = commands.get(name)?;
            let mut props = CommandProps {
                state: surface.state(),
                tr: &mut tr,
                dispatch: true,
            };
            if !command.call(&mut props, args) {
                tracing::trace!(command = %name, "chain aborted");
                return Ok(false);
            }
        }
        let names = self.steps.into_iter().map(|(name, _)| name).collect();
        self.manager.apply(tr, UpdateSource::Chain(names));
        Ok(true)
    }
}

/// Sort `slots` and build every derived structure from them.
///
/// `previous` is reused when the rebuilt schema is equal to it.
fn compose<S: Surface>(
    slots: &[Box<dyn Extension<S>>],
    settings: &ManagerSettings,
    previous: Option<&Rc<Schema>>,
) -> Result<(Vec<usize>, ManagerStore<S>), ConfigurationError> {
    let entries: Vec<(&str, Priority)> = slots.iter().map(|e| (e.name(), e.priority())).collect();
    let order = priority::sort_order(&entries, &settings.priority)?;

    let present: HashSet<&str> = entries.iter().map(|(name, _)| *name).collect();
    for &i in &order {
        for required in slots[i].required_extensions() {
            if !present.contains(required.as_str()) {
                return Err(ConfigurationError::MissingRequirement {
                    extension: slots[i].name().to_string(),
                    required,
                });
            }
        }
    }

    let mut builder = SchemaBuilder::new();
    let mut tags = TagIndex::default();
    let mut command_specs = Vec::new();
    let mut helper_specs = Vec::new();
    let mut keymap = Vec::new();
    let mut plugins = Vec::new();
    let mut plugin_owners = Vec::new();
    let mut names = Vec::with_capacity(order.len());

    for &i in &order {
        let extension = &slots[i];
        let name = extension.name().to_string();
        let excluded = settings.exclusions(&name);

        let extension_tags = extension.tags();
        for tag in &extension_tags {
            tags.insert(tag.clone(), &name);
        }
        builder.add(SchemaContribution {
            owner: name.clone(),
            kind: extension.kind(),
            tags: extension_tags,
            fragment: extension.create_schema(),
            shared_attributes: if excluded.shared_attributes {
                Vec::new()
            } else {
                extension.create_shared_attributes()
            },
        })?;

        if !excluded.commands {
            command_specs.push((name.clone(), extension.create_commands()));
        }
        if !excluded.helpers {
            helper_specs.push((name.clone(), extension.create_helpers()));
        }
        if !excluded.keymap {
            keymap.push(KeymapContribution {
                owner: name.clone(),
                priority: priority::effective_priority(
                    &name,
                    extension.priority(),
                    &settings.priority,
                ),
                bindings: extension.create_keymap(),
            });
        }
        if !excluded.plugins {
            for plugin in extension.create_plugins() {
                plugins.push(plugin);
                plugin_owners.push(name.clone());
            }
        }
        names.push(name);
    }

    for attribute in &settings.shared_attributes {
        builder.shared_attribute(attribute.clone());
    }
    let schema = builder.build(&settings.top_node);
    let schema = match previous {
        Some(previous) if **previous == schema => Rc::clone(previous),
        _ => Rc::new(schema),
    };

    let commands = CommandTable::build(command_specs)?;
    let keymap = Keymap::build(keymap, settings.platform, &commands)?;
    let store = ManagerStore {
        schema,
        plugins,
        plugin_owners,
        commands,
        helpers: HelperTable::build(helper_specs)?,
        keymap,
        tags,
        names,
    };
    tracing::debug!(
        order = ?store.names,
        nodes = store.schema.nodes().len(),
        marks = store.schema.marks().len(),
        commands = store.commands.len(),
        shortcuts = store.keymap.len(),
        plugins = store.plugins.len(),
        "extensions composed"
    );
    Ok((order, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Named, NullSurface};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_from_json() {
        let settings = ManagerSettings::from_json(
            r#"{
                "priority": { "bold": 10 },
                "platform": "mac",
                "exclude": { "history": { "keymap": true } },
                "shared_attributes": [
                    { "identifiers": { "type": "nodes" }, "name": "id", "spec": { "default": null } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.priority.get("bold"), Some(&Priority(10)));
        assert_eq!(settings.top_node, "doc");
        assert_eq!(settings.platform, Platform::Mac);
        assert!(settings.exclusions("history").keymap);
        assert!(!settings.exclusions("history").commands);
        assert_eq!(settings.shared_attributes.len(), 1);
    }

    #[test]
    fn test_invalid_settings() {
        let err = ManagerSettings::from_json(r#"{ "priority": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSettings(_)));
    }

    #[test]
    fn test_sorted_names_and_effective_priority() {
        let manager = Manager::<NullSurface>::create(
            ExtensionList::new()
                .with(Named::new("big").with_priority(Priority::LOWEST))
                .with(Named::new("dummy").with_priority(Priority::CRITICAL)),
            ManagerSettings::default(),
        )
        .unwrap();
        assert_eq!(manager.extension_names(), vec!["dummy", "big"]);
        assert_eq!(manager.effective_priority("big"), Some(Priority::LOWEST));
        assert_eq!(manager.phase(), Phase::Created);
        assert!(manager.extension::<Named>().is_some());
    }

    #[test]
    fn test_missing_requirement() {
        let err = Manager::<NullSurface>::create(
            ExtensionList::new().with(Named::new("table").requires("paragraph")),
            ManagerSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Configuration(ConfigurationError::MissingRequirement { ref required, .. })
                if required == "paragraph"
        ));
    }

    #[test]
    fn test_renew_needs_factory() {
        let manager =
            Manager::<NullSurface>::create(ExtensionList::new(), ManagerSettings::default())
                .unwrap();
        assert!(matches!(
            manager.renew(),
            Err(ManagerError::Configuration(ConfigurationError::NoFactory))
        ));

        let manager = Manager::<NullSurface>::from_factory(
            || ExtensionList::new().with(Named::new("doc")),
            ManagerSettings::default(),
        )
        .unwrap();
        let fresh = manager.renew().unwrap();
        assert_eq!(fresh.extension_names(), vec!["doc"]);
        assert!(fresh.renew().is_ok());
    }

    #[test]
    fn test_operations_after_destroy() {
        let mut manager =
            Manager::<NullSurface>::create(ExtensionList::new(), ManagerSettings::default())
                .unwrap();
        manager.destroy().unwrap();
        assert!(matches!(
            manager.add_view(NullSurface::default()),
            Err(ManagerError::Destroyed)
        ));
        assert!(matches!(
            manager.run_command("anything", &Value::Null),
            Err(ManagerError::Destroyed)
        ));
        assert!(manager.destroy().is_ok());
    }
}
